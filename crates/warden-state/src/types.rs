//! Persisted records for the Warden store.
//!
//! Samples, events and alert records are append-only and never mutated.
//! [`AlertStateDocument`] is the single mutable aggregate: one JSON
//! document holding per-service alert bookkeeping.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{EscalationLevel, ServiceId};

/// Seconds in the trailing window used for failure history and hour buckets.
pub const DAY_SECS: u64 = 24 * 3600;

/// Health as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthState {
    pub fn from_healthy(healthy: bool) -> Self {
        if healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => f.write_str("healthy"),
            HealthState::Unhealthy => f.write_str("unhealthy"),
            HealthState::Unknown => f.write_str("unknown"),
        }
    }
}

// ── Samples ────────────────────────────────────────────────────────

/// Result of one composite probe of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSample {
    pub service: ServiceId,
    pub timestamp: u64,
    pub port_listening: bool,
    pub process_running: bool,
    pub http_responding: bool,
    /// Round-trip time of the HTTP probe, when it got that far.
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    /// Probe failures, joined with "; ".
    pub error: Option<String>,
}

impl HealthSample {
    /// Composite health: all three probes passed.
    pub fn healthy(&self) -> bool {
        self.port_listening && self.process_running && self.http_responding
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_healthy(self.healthy())
    }

    /// Human-readable list of the failed probes.
    pub fn issues(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if !self.port_listening {
            issues.push("port not listening");
        }
        if !self.process_running {
            issues.push("process not running");
        }
        if !self.http_responding {
            issues.push("http not responding");
        }
        issues
    }
}

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Failure,
    Recovery,
    RestartAttempt,
    RestartSuccess,
    RestartFailed,
    RestartSkipped,
}

impl EventType {
    /// Events that count against the restart circuit breaker.
    pub fn is_failure_class(&self) -> bool {
        matches!(self, EventType::Failure | EventType::RestartAttempt)
    }

    /// Events that change the tracked health state.
    pub fn is_transition(&self) -> bool {
        matches!(self, EventType::Failure | EventType::Recovery)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Failure => "failure",
            EventType::Recovery => "recovery",
            EventType::RestartAttempt => "restart_attempt",
            EventType::RestartSuccess => "restart_success",
            EventType::RestartFailed => "restart_failed",
            EventType::RestartSkipped => "restart_skipped",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only service event; the source of truth for failure history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceEvent {
    pub service: ServiceId,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub timestamp: u64,
    pub previous_state: Option<HealthState>,
    pub new_state: Option<HealthState>,
    pub details: String,
}

impl ServiceEvent {
    /// An event that does not change tracked health.
    pub fn new(service: &str, kind: EventType, timestamp: u64, details: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            kind,
            timestamp,
            previous_state: None,
            new_state: None,
            details: details.into(),
        }
    }

    /// A `failure` or `recovery` transition.
    pub fn transition(
        service: &str,
        timestamp: u64,
        previous: HealthState,
        new: HealthState,
    ) -> Self {
        let (kind, details) = match new {
            HealthState::Healthy => (EventType::Recovery, "service recovered and is now healthy"),
            _ => (EventType::Failure, "service became unhealthy"),
        };
        Self {
            service: service.to_string(),
            kind,
            timestamp,
            previous_state: Some(previous),
            new_state: Some(new),
            details: details.to_string(),
        }
    }
}

/// Failure-class events in a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureHistory {
    pub failure_count: u32,
    pub first_failure: Option<u64>,
    pub last_failure: Option<u64>,
}

// ── Alerts ─────────────────────────────────────────────────────────

/// One alert decision, written whether or not delivery succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    pub service: ServiceId,
    pub escalation_level: EscalationLevel,
    pub downtime_minutes: u64,
    pub sent: bool,
    pub timestamp: u64,
}

/// Per-service alert bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertState {
    pub last_alert_timestamp: Option<u64>,
    pub silenced_until: Option<u64>,
    pub escalation_level: Option<EscalationLevel>,
    /// Alerts sent per UTC hour, keyed `YYYY-MM-DD-HH`.
    pub hourly_alert_counts: BTreeMap<String, u32>,
}

impl AlertState {
    pub fn is_silenced(&self, now: u64) -> bool {
        self.silenced_until.is_some_and(|until| now < until)
    }

    /// Replace any existing silence.
    pub fn silence_until(&mut self, until: u64) {
        self.silenced_until = Some(until);
    }

    pub fn count_in_hour(&self, now: u64) -> u32 {
        self.hourly_alert_counts
            .get(&hour_bucket(now))
            .copied()
            .unwrap_or(0)
    }

    /// Count an alert in the current hour and drop buckets older than 24h.
    pub fn record_alert(&mut self, now: u64, level: EscalationLevel) {
        *self.hourly_alert_counts.entry(hour_bucket(now)).or_insert(0) += 1;
        self.last_alert_timestamp = Some(now);
        self.escalation_level = Some(level);
        self.prune_counts(now);
    }

    /// Keep the 24 hour buckets ending with the current hour.
    pub fn prune_counts(&mut self, now: u64) {
        let cutoff = hour_bucket(now.saturating_sub(DAY_SECS));
        self.hourly_alert_counts.retain(|hour, _| *hour > cutoff);
    }
}

/// The persisted alert document: per-service entries plus fleet totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertStateDocument {
    pub services: BTreeMap<ServiceId, AlertState>,
    pub total_sent: u64,
    pub last_cleanup: Option<u64>,
}

impl AlertStateDocument {
    pub fn service(&self, service: &str) -> Option<&AlertState> {
        self.services.get(service)
    }

    pub fn service_mut(&mut self, service: &str) -> &mut AlertState {
        self.services.entry(service.to_string()).or_default()
    }
}

// ── Certificates ───────────────────────────────────────────────────

/// Latest TLS certificate observation for a service's domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateStatus {
    pub service: ServiceId,
    pub domain: String,
    /// `notAfter` of the leaf certificate (unix seconds).
    pub expires_at: i64,
    pub days_remaining: i64,
    pub checked_at: u64,
}

// ── Time helpers ───────────────────────────────────────────────────

/// UTC calendar-hour bucket key for a unix timestamp, e.g. `2026-10-19-14`.
pub fn hour_bucket(ts: u64) -> String {
    to_datetime(ts).format("%Y-%m-%d-%H").to_string()
}

/// Format a unix timestamp for display.
pub fn format_timestamp(ts: u64) -> String {
    to_datetime(ts).format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn to_datetime(ts: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts as i64, 0).unwrap_or_default()
}
