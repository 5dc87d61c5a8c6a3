//! Read-only status views over the store.

use serde::Serialize;

use warden_core::{Priority, ServiceId};
use warden_state::{
    AlertRecord, AlertState, CertificateStatus, DAY_SECS, FailureHistory, HealthSample,
    HealthState, ServiceEvent, StateResult,
};

use crate::supervisor::Supervisor;

const RECENT_EVENTS: usize = 10;
const RECENT_ALERTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceId,
    pub priority: Priority,
    pub state: HealthState,
    pub last_sample: Option<HealthSample>,
    /// Minutes since the unresolved failure, if the service is down.
    pub downtime_minutes: Option<u64>,
    /// Failure-class events in the trailing 24 hours.
    pub failure_history: FailureHistory,
    pub alert_state: Option<AlertState>,
    pub silenced: bool,
    pub alerts_this_hour: u32,
    pub certificate: Option<CertificateStatus>,
    /// Newest first.
    pub recent_events: Vec<ServiceEvent>,
    /// Newest first.
    pub recent_alerts: Vec<AlertRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    pub generated_at: u64,
    pub total_alerts_sent: u64,
    pub last_cleanup: Option<u64>,
    pub services: Vec<ServiceStatus>,
}

impl Supervisor {
    /// Status for one service, or every configured service when `None`.
    pub fn status(&self, service: Option<&str>) -> anyhow::Result<FleetStatus> {
        let ids: Vec<&str> = match service {
            Some(id) => {
                anyhow::ensure!(self.config().service(id).is_some(), "unknown service {id}");
                vec![id]
            }
            None => self.config().services.iter().map(|s| s.id.as_str()).collect(),
        };

        let now = self.clock().now();
        let alerts = self.store().load_alert_state()?;
        let services = ids
            .into_iter()
            .map(|id| self.service_status(id, now, alerts.service(id).cloned()))
            .collect::<StateResult<Vec<_>>>()?;

        Ok(FleetStatus {
            generated_at: now,
            total_alerts_sent: alerts.total_sent,
            last_cleanup: alerts.last_cleanup,
            services,
        })
    }

    fn service_status(
        &self,
        id: &str,
        now: u64,
        alert_state: Option<AlertState>,
    ) -> StateResult<ServiceStatus> {
        let store = self.store();
        let last_sample = store.latest_sample(id)?;
        let state = last_sample
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(HealthState::Unknown);
        let downtime_minutes = match store.unresolved_failure(id)? {
            Some(failure) => Some(now.saturating_sub(failure.timestamp) / 60),
            None => None,
        };
        let priority = self
            .config()
            .service(id)
            .map(|svc| self.config().priority_for(svc))
            .unwrap_or_default();

        Ok(ServiceStatus {
            service: id.to_string(),
            priority,
            state,
            last_sample,
            downtime_minutes,
            failure_history: store.failure_history(id, now.saturating_sub(DAY_SECS), now)?,
            silenced: alert_state.as_ref().is_some_and(|a| a.is_silenced(now)),
            alerts_this_hour: alert_state.as_ref().map_or(0, |a| a.count_in_hour(now)),
            alert_state,
            certificate: store.get_certificate(id)?,
            recent_events: store.latest_events(id, RECENT_EVENTS)?,
            recent_alerts: store.latest_alerts(id, RECENT_ALERTS)?,
        })
    }
}
