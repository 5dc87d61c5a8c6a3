//! warden-state — embedded metric/event store for Warden.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for health samples, service events, alert records, certificate
//! observations and the alert state document.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns. Time-series
//! keys (`{service}:{timestamp}:{seq}`) make "latest N" and "between t0 and
//! t1" a single range scan per service.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
