//! redb table definitions for the Warden store.
//!
//! Time-series tables use `&str` keys of the form
//! `{service}:{timestamp:020}:{seq:020}` so a service's records sort by time
//! and a range scan answers both "latest N" and "between t0 and t1".
//! Values are JSON-serialized records.

use redb::TableDefinition;

/// Health samples.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// Service events.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Alert records.
pub const ALERTS: TableDefinition<&str, &[u8]> = TableDefinition::new("alerts");

/// Newest event per `{service}:{kind}`, plus the newest `failure` or
/// `recovery` under `{service}:transition`. Survives retention pruning.
pub const LATEST_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("latest_events");

/// Latest certificate status keyed by `{service}`.
pub const CERTIFICATES: TableDefinition<&str, &[u8]> = TableDefinition::new("certificates");

/// The alert state document under [`ALERT_STATE_KEY`].
pub const ALERT_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("alert_state");

/// Store counters (the time-series sequence under [`SEQ_KEY`]).
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

pub const ALERT_STATE_KEY: &str = "document";

pub const SEQ_KEY: &str = "seq";

pub const TRANSITION_KEY: &str = "transition";
