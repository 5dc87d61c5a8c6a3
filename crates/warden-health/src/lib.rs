//! warden-health — probing and health state tracking for Warden.
//!
//! # Architecture
//!
//! ```text
//! ProbeSet (Prober)
//!   ├── check_port()        TCP connect to 127.0.0.1:<port>
//!   ├── check_process()     systemd unit or pid file
//!   ├── check_http()        GET <url>, RESPONDING_STATUS_CODES
//!   └── check_certificate() notAfter of <domain>:443 (log + store only)
//!         ↓ HealthSample
//! HealthStateTracker
//!   ├── last known state rebuilt from the store
//!   └── failure / recovery ServiceEvent on transitions
//! ```
//!
//! The [`client`] module is the shared hyper client, also used to deliver
//! webhook alerts.

pub mod cert;
pub mod client;
pub mod probe;
pub mod tracker;

pub use cert::{CERT_EXPIRY_WARNING_DAYS, CertificateInspector};
pub use client::{HttpClient, HttpError};
pub use probe::{ProbeSet, Prober, RESPONDING_STATUS_CODES};
pub use tracker::HealthStateTracker;
