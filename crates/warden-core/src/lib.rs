//! warden-core — service registry, configuration and shared types.

pub mod clock;
pub mod config;
pub mod duration;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock, epoch_secs};
pub use config::{ConfigError, WardenConfig};
pub use duration::parse_duration;
pub use types::*;
