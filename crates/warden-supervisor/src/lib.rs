//! warden-supervisor — the per-service pipeline and the fleet sweep loop.
//!
//! # Architecture
//!
//! ```text
//! run(interval, build, shutdown)
//!   └── every interval: build() → Supervisor::sweep_once()
//!         ├── EscalationEngine::maintain()       daily alert-state cleanup
//!         └── per service (≤ sweep.concurrency, busy services skipped)
//!               ├── Prober::probe()              port ∥ process ∥ http, cert
//!               ├── HealthStateTracker::observe  failure / recovery events
//!               ├── RemediationController        gated restart + verification
//!               └── EscalationEngine::evaluate   only if still unhealthy
//! ```

pub mod status;
pub mod supervisor;

pub use status::{FleetStatus, ServiceStatus};
pub use supervisor::{ServiceReport, Supervisor, SweepReport, run};
