//! warden-remediate — restart circuit breaker for Warden.
//!
//! [`should_attempt_restart`] gates automatic restarts on the trailing-24h
//! failure history. [`RemediationController`] runs the restart sequence
//! (stop → kill → cleanup → provision → start) through a
//! [`ProcessManager`] and verifies recovery with progressive backoff.

pub mod controller;
pub mod policy;
pub mod process;

pub use controller::{RemediationController, RemediationOutcome};
pub use policy::{BreakerState, RestartDecision, SkipReason, should_attempt_restart};
pub use process::{ProcessManager, SystemdProcessManager};
