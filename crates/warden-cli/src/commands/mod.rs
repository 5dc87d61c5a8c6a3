pub mod check;
pub mod control;
pub mod list;
pub mod silence;
pub mod status;

use std::path::Path;

use anyhow::Context;
use warden_core::WardenConfig;
use warden_supervisor::Supervisor;

pub fn load_config(path: &Path) -> anyhow::Result<WardenConfig> {
    WardenConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

/// Open the store and wire up a supervisor. The store is exclusive, so this
/// fails while a wardend sweep is in progress.
pub fn open(config: WardenConfig) -> anyhow::Result<Supervisor> {
    Supervisor::from_config(config).context("state store unavailable (is a sweep running?)")
}
