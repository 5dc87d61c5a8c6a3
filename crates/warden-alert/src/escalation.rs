//! Escalation engine.
//!
//! Maps downtime and priority to an [`EscalationLevel`], then decides
//! whether to notify. The decision and its bookkeeping (hourly counter,
//! auto-silence, fleet total) are one redb write transaction over the
//! alert state document. Delivery happens after commit, so a failed
//! notification never rolls back the counter or the silence.

use std::sync::Arc;

use tracing::{debug, info, warn};

use warden_core::config::{EscalationConfig, EscalationThresholds};
use warden_core::{Clock, EscalationLevel, Priority, ServiceDescriptor};
use warden_state::{
    AlertRecord, DAY_SECS, HealthSample, StateResult, StateStore, format_timestamp,
};

use crate::notify::Notifier;

const HOUR_SECS: u64 = 3600;

/// Escalation level for a service of `priority` that has been down for
/// `downtime_minutes`.
pub fn escalation_level(
    priority: Priority,
    downtime_minutes: u64,
    thresholds: &EscalationThresholds,
) -> EscalationLevel {
    match priority {
        Priority::Critical => {
            if downtime_minutes >= thresholds.critical_priority_emergency_after {
                EscalationLevel::Emergency
            } else if downtime_minutes >= thresholds.critical_priority_critical_after {
                EscalationLevel::Critical
            } else {
                EscalationLevel::Warning
            }
        }
        Priority::Standard => {
            if downtime_minutes >= thresholds.standard_priority_critical_after {
                EscalationLevel::Critical
            } else if downtime_minutes >= thresholds.standard_priority_warning_after {
                EscalationLevel::Warning
            } else {
                EscalationLevel::Info
            }
        }
    }
}

/// What the engine did for one unhealthy service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Notification dispatched; `delivered` is the notifier's answer.
    Sent {
        level: EscalationLevel,
        downtime_minutes: u64,
        delivered: bool,
        silenced_until: u64,
    },
    /// Skipped before the rate check; nothing was counted.
    Silenced { until: u64 },
    /// The hourly budget for this level is spent.
    RateLimited { level: EscalationLevel, count: u32 },
}

enum Gate {
    Silenced(u64),
    RateLimited(u32),
    Open { silenced_until: u64 },
}

pub struct EscalationEngine {
    store: StateStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EscalationConfig,
}

impl EscalationEngine {
    pub fn new(
        store: StateStore,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EscalationConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
        }
    }

    /// Prune stale hour buckets and expired silences, at most once per 24h.
    ///
    /// Returns whether maintenance ran.
    pub fn maintain(&self) -> StateResult<bool> {
        let now = self.clock.now();
        self.store.update_alert_state(|doc| {
            if doc
                .last_cleanup
                .is_some_and(|last| now.saturating_sub(last) < DAY_SECS)
            {
                return false;
            }
            for (service, state) in doc.services.iter_mut() {
                state.prune_counts(now);
                if state.silenced_until.is_some_and(|until| now >= until) {
                    state.silenced_until = None;
                    info!(%service, "silence expired");
                }
            }
            doc.last_cleanup = Some(now);
            debug!("alert state maintenance complete");
            true
        })
    }

    /// Decide and, if eligible, send an alert for an unhealthy service.
    ///
    /// `downtime_minutes` is `None` when no unresolved failure is on record;
    /// the configured default is assumed.
    pub async fn evaluate(
        &self,
        service: &ServiceDescriptor,
        priority: Priority,
        sample: &HealthSample,
        downtime_minutes: Option<u64>,
    ) -> StateResult<AlertDecision> {
        let now = self.clock.now();
        let downtime = downtime_minutes.unwrap_or(self.config.unknown_downtime_minutes);
        let level = escalation_level(priority, downtime, &self.config.thresholds);
        let policy = self.config.levels.for_level(level);

        let gate = self.store.update_alert_state(|doc| {
            let state = doc.service_mut(&service.id);
            if state.is_silenced(now) {
                return Gate::Silenced(state.silenced_until.unwrap_or(now));
            }
            let count = state.count_in_hour(now);
            if count >= policy.max_alerts_per_hour {
                return Gate::RateLimited(count);
            }
            let silenced_until = hours_after(now, policy.silence_hours);
            state.record_alert(now, level);
            state.silence_until(silenced_until);
            doc.total_sent += 1;
            Gate::Open { silenced_until }
        })?;

        let silenced_until = match gate {
            Gate::Silenced(until) => {
                debug!(service = %service.id, until = %format_timestamp(until), "silenced; no alert");
                return Ok(AlertDecision::Silenced { until });
            }
            Gate::RateLimited(count) => {
                info!(service = %service.id, %level, count, "alert rate limit reached");
                return Ok(AlertDecision::RateLimited { level, count });
            }
            Gate::Open { silenced_until } => silenced_until,
        };

        let body = render_body(
            &service.id,
            priority,
            level,
            downtime,
            sample,
            policy.silence_hours,
            now,
        );
        let delivered = self.notifier.send(&service.id, level, &body).await;
        if !delivered {
            warn!(service = %service.id, %level, "alert delivery failed; bookkeeping kept");
        }

        let record = AlertRecord {
            service: service.id.clone(),
            escalation_level: level,
            downtime_minutes: downtime,
            sent: delivered,
            timestamp: now,
        };
        if let Err(e) = self.store.append_alert(&record) {
            warn!(service = %service.id, error = %e, "failed to record alert");
        }

        info!(
            service = %service.id,
            %level,
            downtime_minutes = downtime,
            silence_hours = policy.silence_hours,
            "alert sent"
        );
        Ok(AlertDecision::Sent {
            level,
            downtime_minutes: downtime,
            delivered,
            silenced_until,
        })
    }

    /// Silence a service for `hours`, replacing any existing silence.
    pub fn silence(&self, service: &str, hours: u64) -> StateResult<u64> {
        let until = hours_after(self.clock.now(), hours);
        self.store
            .update_alert_state(|doc| doc.service_mut(service).silence_until(until))?;
        info!(%service, hours, until = %format_timestamp(until), "service silenced");
        Ok(until)
    }

    /// Lift a silence. Returns whether one was active.
    pub fn unsilence(&self, service: &str) -> StateResult<bool> {
        let now = self.clock.now();
        let was_silenced = self.store.update_alert_state(|doc| {
            match doc.services.get_mut(service) {
                Some(state) => {
                    let active = state.is_silenced(now);
                    state.silenced_until = None;
                    active
                }
                None => false,
            }
        })?;
        if was_silenced {
            info!(%service, "service unsilenced");
        }
        Ok(was_silenced)
    }
}

/// `now + hours`, saturating at the end of time.
fn hours_after(now: u64, hours: u64) -> u64 {
    now.saturating_add(hours.saturating_mul(HOUR_SECS))
}

fn render_body(
    service: &str,
    priority: Priority,
    level: EscalationLevel,
    downtime_minutes: u64,
    sample: &HealthSample,
    silence_hours: u64,
    now: u64,
) -> String {
    let mark = |ok: bool| if ok { "yes" } else { "NO" };
    let mut body = format!(
        "{symbol} {level}: {service} down for {downtime_minutes}m\n\
         \n\
         Service:         {service}\n\
         Priority:        {priority}\n\
         Downtime:        {downtime_minutes} minutes\n\
         Time:            {time}\n\
         Last checked:    {checked}\n\
         \n\
         Port listening:  {port}\n\
         Process running: {process}\n\
         HTTP responding: {http}\n",
        symbol = level.symbol(),
        level = level.as_str().to_uppercase(),
        time = format_timestamp(now),
        checked = format_timestamp(sample.timestamp),
        port = mark(sample.port_listening),
        process = mark(sample.process_running),
        http = mark(sample.http_responding),
    );
    if let Some(error) = &sample.error {
        body.push_str(&format!("Errors:          {error}\n"));
    }
    body.push_str(&format!(
        "\nFurther alerts for {service} are silenced for {silence_hours} hours.\n"
    ));
    body
}
