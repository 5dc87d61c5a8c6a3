//! Health state tracker.
//!
//! Detects healthy/unhealthy transitions by comparing the newest sample
//! against the last known state. Nothing is held in memory between cycles:
//! the last known state is rebuilt from the store each time, so a restart of
//! the supervisor picks up exactly where it left off.

use tracing::{info, warn};

use warden_state::{EventType, HealthSample, HealthState, ServiceEvent, StateResult, StateStore};

#[derive(Clone)]
pub struct HealthStateTracker {
    store: StateStore,
}

impl HealthStateTracker {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// State implied by the newest `failure`/`recovery` event, else by the
    /// newest sample, else `Unknown`.
    pub fn last_known_state(&self, service: &str) -> StateResult<HealthState> {
        if let Some(event) = self.store.last_transition(service)? {
            return Ok(match event.kind {
                EventType::Recovery => HealthState::Healthy,
                _ => HealthState::Unhealthy,
            });
        }
        Ok(self
            .store
            .latest_sample(service)?
            .map(|s| s.state())
            .unwrap_or(HealthState::Unknown))
    }

    /// Record a sample and return the transition event it caused, if any.
    ///
    /// `unknown → healthy` is not a transition; `unknown → unhealthy` is a
    /// `failure` so downtime is tracked from the first sweep.
    pub fn observe(&self, sample: &HealthSample) -> StateResult<Option<ServiceEvent>> {
        let previous = self.last_known_state(&sample.service)?;
        let current = sample.state();

        let transition = match (previous, current) {
            (HealthState::Unhealthy, HealthState::Healthy) => true,
            (HealthState::Healthy | HealthState::Unknown, HealthState::Unhealthy) => true,
            _ => false,
        };

        let event = if transition {
            let event = ServiceEvent::transition(&sample.service, sample.timestamp, previous, current);
            self.store.append_event(&event)?;
            match current {
                HealthState::Healthy => {
                    info!(service = %sample.service, %previous, "service recovered")
                }
                _ => warn!(
                    service = %sample.service,
                    %previous,
                    issues = %sample.issues().join(", "),
                    "service became unhealthy"
                ),
            }
            Some(event)
        } else {
            None
        };

        self.store.append_sample(sample)?;
        Ok(event)
    }

    /// Minutes since the newest unresolved `failure`, if there is one.
    pub fn downtime_minutes(&self, service: &str, now: u64) -> StateResult<Option<u64>> {
        Ok(self
            .store
            .unresolved_failure(service)?
            .map(|failure| now.saturating_sub(failure.timestamp) / 60))
    }
}
