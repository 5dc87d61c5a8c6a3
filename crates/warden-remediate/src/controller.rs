//! Remediation controller — drives the restart circuit breaker.
//!
//! ```text
//! Unhealthy ──gate──▶ RestartAttempting ──start ok──▶ RestartVerifying
//!     ▲                     │ start failed                │ probe passes
//!     │                     ▼                             ▼
//!     └──────────── restart_failed ◀──all probes fail── Healthy
//! ```
//!
//! Stop, kill, hooks and start are each bounded by a timeout. Only `start`
//! decides the attempt; the earlier steps are best-effort. Events are
//! persisted as they happen so the trail survives a crash mid-restart.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use warden_core::config::RemediationConfig;
use warden_core::{Clock, ServiceDescriptor};
use warden_health::Prober;
use warden_state::{DAY_SECS, EventType, HealthSample, ServiceEvent, StateStore};

use crate::policy::{BreakerState, RestartDecision, SkipReason, should_attempt_restart};
use crate::process::ProcessManager;

/// What one remediation pass did.
#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    pub state: BreakerState,
    /// Whether a restart sequence ran.
    pub attempted: bool,
    pub skipped: Option<SkipReason>,
    /// Events recorded during the pass, in order.
    pub events: Vec<ServiceEvent>,
    /// The newest verification sample, if verification ran.
    pub last_sample: Option<HealthSample>,
}

impl RemediationOutcome {
    fn new(state: BreakerState) -> Self {
        Self {
            state,
            attempted: false,
            skipped: None,
            events: Vec::new(),
            last_sample: None,
        }
    }

    pub fn recovered(&self) -> bool {
        self.state == BreakerState::Healthy
    }
}

pub struct RemediationController {
    store: StateStore,
    manager: Arc<dyn ProcessManager>,
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    step_timeout: Duration,
    hook_timeout: Duration,
    verify_delays: Vec<Duration>,
}

impl RemediationController {
    pub fn new(
        store: StateStore,
        manager: Arc<dyn ProcessManager>,
        prober: Arc<dyn Prober>,
        clock: Arc<dyn Clock>,
        config: &RemediationConfig,
    ) -> Self {
        let mut verify_delays = config.verify_delays();
        if verify_delays.is_empty() {
            verify_delays.push(Duration::ZERO);
        }
        Self {
            store,
            manager,
            prober,
            clock,
            step_timeout: config.step_timeout(),
            hook_timeout: config.hook_timeout(),
            verify_delays,
        }
    }

    /// Evaluate the restart gate for a service against its trailing-24h history.
    pub fn gate(&self, service: &ServiceDescriptor) -> RestartDecision {
        let now = self.clock.now();
        let history = self
            .store
            .failure_history(&service.id, now.saturating_sub(DAY_SECS), now);
        if let Err(e) = &history {
            warn!(service = %service.id, error = %e, "failure history unavailable");
        }
        should_attempt_restart(history.as_ref(), &service.remediation, now)
    }

    /// Remediate an unhealthy service: gate, then restart and verify.
    pub async fn remediate(&self, service: &ServiceDescriptor) -> RemediationOutcome {
        let decision = self.gate(service);
        if let RestartDecision::Reject(reason) = decision {
            let mut outcome = RemediationOutcome::new(BreakerState::Unhealthy);
            outcome.skipped = Some(reason);
            info!(service = %service.id, %reason, "restart skipped");
            self.record(
                &mut outcome,
                ServiceEvent::new(
                    &service.id,
                    EventType::RestartSkipped,
                    self.clock.now(),
                    reason.as_str(),
                ),
            );
            return outcome;
        }
        self.restart_sequence(service, "automatic restart").await
    }

    /// Restart without consulting the gate (operator request).
    pub async fn restart(&self, service: &ServiceDescriptor) -> RemediationOutcome {
        self.restart_sequence(service, "manual restart").await
    }

    /// Graceful stop, falling back to a forced kill.
    pub async fn stop(&self, service: &ServiceDescriptor) -> bool {
        if self
            .step(service, "stop", self.step_timeout, self.manager.stop(service))
            .await
        {
            return true;
        }
        warn!(service = %service.id, "graceful stop failed; killing");
        self.step(service, "kill", self.step_timeout, self.manager.kill(service))
            .await
    }

    pub async fn start(&self, service: &ServiceDescriptor) -> bool {
        self.step(service, "start", self.step_timeout, self.manager.start(service))
            .await
    }

    async fn restart_sequence(&self, service: &ServiceDescriptor, trigger: &str) -> RemediationOutcome {
        let mut outcome = RemediationOutcome::new(BreakerState::RestartAttempting);
        outcome.attempted = true;
        info!(service = %service.id, %trigger, "restarting service");
        self.record(
            &mut outcome,
            ServiceEvent::new(&service.id, EventType::RestartAttempt, self.clock.now(), trigger),
        );

        if !self.stop(service).await {
            warn!(service = %service.id, "could not stop service; starting anyway");
        }
        if let Some(argv) = &service.cleanup {
            self.step(service, "cleanup", self.hook_timeout, self.manager.run_hook(service, argv))
                .await;
        }
        if let Some(argv) = &service.provision {
            self.step(service, "provision", self.hook_timeout, self.manager.run_hook(service, argv))
                .await;
        }

        if !self.start(service).await {
            outcome.state = BreakerState::Unhealthy;
            self.record(
                &mut outcome,
                ServiceEvent::new(
                    &service.id,
                    EventType::RestartFailed,
                    self.clock.now(),
                    "start failed",
                ),
            );
            return outcome;
        }

        outcome.state = BreakerState::RestartVerifying;
        for (index, delay) in self.verify_delays.iter().enumerate() {
            let attempt = index + 1;
            tokio::time::sleep(*delay).await;
            let sample = self.prober.probe(service).await;
            let healthy = sample.healthy();
            outcome.last_sample = Some(sample);

            if healthy {
                outcome.state = BreakerState::Healthy;
                info!(service = %service.id, attempt, "restart verified");
                self.record(
                    &mut outcome,
                    ServiceEvent::new(
                        &service.id,
                        EventType::RestartSuccess,
                        self.clock.now(),
                        format!("healthy after verification attempt {attempt}"),
                    ),
                );
                return outcome;
            }
            debug!(service = %service.id, attempt, "still unhealthy after restart");
        }

        outcome.state = BreakerState::Unhealthy;
        warn!(
            service = %service.id,
            attempts = self.verify_delays.len(),
            "restart did not restore health"
        );
        self.record(
            &mut outcome,
            ServiceEvent::new(
                &service.id,
                EventType::RestartFailed,
                self.clock.now(),
                format!(
                    "still unhealthy after {} verification attempts",
                    self.verify_delays.len()
                ),
            ),
        );
        outcome
    }

    /// Run one collaborator call under a timeout; expiry is failure.
    async fn step(
        &self,
        service: &ServiceDescriptor,
        name: &str,
        timeout: Duration,
        call: impl Future<Output = bool>,
    ) -> bool {
        match tokio::time::timeout(timeout, call).await {
            Ok(true) => {
                debug!(service = %service.id, step = name, "step succeeded");
                true
            }
            Ok(false) => {
                warn!(service = %service.id, step = name, "step failed");
                false
            }
            Err(_) => {
                warn!(service = %service.id, step = name, ?timeout, "step timed out");
                false
            }
        }
    }

    fn record(&self, outcome: &mut RemediationOutcome, event: ServiceEvent) {
        if let Err(e) = self.store.append_event(&event) {
            warn!(service = %event.service, kind = %event.kind, error = %e, "failed to record event");
        }
        outcome.events.push(event);
    }
}
