//! Restart gating.
//!
//! The gate looks only at persisted failure history, so it gives the same
//! answer after a supervisor restart.

use std::fmt;

use warden_core::RemediationPolicy;
use warden_state::{FailureHistory, StateError};

/// Circuit-breaker state of one service within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Healthy,
    Unhealthy,
    RestartAttempting,
    RestartVerifying,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Healthy => f.write_str("healthy"),
            BreakerState::Unhealthy => f.write_str("unhealthy"),
            BreakerState::RestartAttempting => f.write_str("restart_attempting"),
            BreakerState::RestartVerifying => f.write_str("restart_verifying"),
        }
    }
}

/// Why an automatic restart was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Failure-class events in the trailing 24h reached the daily limit.
    TooManyFailures,
    /// The newest failure-class event is younger than the minimum interval.
    TooRecent,
    /// Failure history could not be read; the gate fails closed.
    HistoryUnavailable,
    AutoRestartDisabled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooManyFailures => "too_many_failures",
            SkipReason::TooRecent => "too_recent",
            SkipReason::HistoryUnavailable => "history_unavailable",
            SkipReason::AutoRestartDisabled => "auto_restart_disabled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Approve,
    Reject(SkipReason),
}

impl RestartDecision {
    pub fn approved(&self) -> bool {
        matches!(self, RestartDecision::Approve)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            RestartDecision::Approve => "ok",
            RestartDecision::Reject(reason) => reason.as_str(),
        }
    }
}

/// Decide whether an unhealthy service may be restarted automatically.
///
/// `history` covers the trailing 24h. A read error rejects.
pub fn should_attempt_restart(
    history: Result<&FailureHistory, &StateError>,
    policy: &RemediationPolicy,
    now: u64,
) -> RestartDecision {
    if !policy.auto_restart {
        return RestartDecision::Reject(SkipReason::AutoRestartDisabled);
    }
    let Ok(history) = history else {
        return RestartDecision::Reject(SkipReason::HistoryUnavailable);
    };

    if history.failure_count >= policy.max_restarts_per_day {
        return RestartDecision::Reject(SkipReason::TooManyFailures);
    }

    let min_interval = policy.min_restart_interval_minutes.saturating_mul(60);
    if let Some(last) = history.last_failure {
        if now.saturating_sub(last) < min_interval {
            return RestartDecision::Reject(SkipReason::TooRecent);
        }
    }

    RestartDecision::Approve
}
