//! Service registry types shared across Warden crates.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier of a supervised service.
pub type ServiceId = String;

/// Static description of one supervised service, loaded once from config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    /// Local TCP port the service listens on.
    pub port: u16,
    /// How the OS process backing this service is identified.
    pub process: ProcessIdentity,
    /// Reachability URL probed over HTTP(S).
    pub url: String,
    /// Public domain whose certificate expiry is tracked.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub remediation: RemediationPolicy,
    /// Command run after stopping and before starting, e.g. removing stale sockets.
    #[serde(default)]
    pub cleanup: Option<Vec<String>>,
    /// Command that re-provisions dependencies before start.
    #[serde(default)]
    pub provision: Option<Vec<String>>,
    /// How to launch a pid-file service; systemd units are started by unit.
    #[serde(default)]
    pub start: Option<StartCommand>,
}

impl ServiceDescriptor {
    /// Whether the process manager has a way to start this service.
    pub fn can_start(&self) -> bool {
        match self.process {
            ProcessIdentity::Unit(_) => true,
            ProcessIdentity::PidFile(_) => self.start.is_some(),
        }
    }
}

/// Detached launch of a service that is not managed by systemd.
///
/// The spawned pid is written to the service's pid file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartCommand {
    pub command: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// stdout and stderr are appended here; discarded when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Explicit identity of a service's process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessIdentity {
    /// A systemd unit, e.g. `conflost.service`.
    Unit(String),
    /// A pid file written by the service.
    PidFile(PathBuf),
}

impl ProcessIdentity {
    /// systemd unit used for stop/start, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            ProcessIdentity::Unit(unit) => Some(unit),
            ProcessIdentity::PidFile(_) => None,
        }
    }
}

/// Priority class of a service; drives the escalation ladder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    #[default]
    #[serde(alias = "warning")]
    Standard,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => f.write_str("critical"),
            Priority::Standard => f.write_str("standard"),
        }
    }
}

/// Circuit-breaker limits for automatic restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemediationPolicy {
    /// Whether unhealthy services are restarted automatically.
    pub auto_restart: bool,
    /// Failure-class events tolerated in the trailing 24h before giving up.
    pub max_restarts_per_day: u32,
    /// Minimum age of the latest failure-class event before a restart.
    pub min_restart_interval_minutes: u64,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            auto_restart: true,
            max_restarts_per_day: 10,
            min_restart_interval_minutes: 5,
        }
    }
}

/// Alert severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl EscalationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationLevel::Info => "info",
            EscalationLevel::Warning => "warning",
            EscalationLevel::Critical => "critical",
            EscalationLevel::Emergency => "emergency",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            EscalationLevel::Info => "ℹ️",
            EscalationLevel::Warning => "⚠️",
            EscalationLevel::Critical => "🚨",
            EscalationLevel::Emergency => "🆘",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscalationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EscalationLevel::Info),
            "warning" => Ok(EscalationLevel::Warning),
            "critical" => Ok(EscalationLevel::Critical),
            "emergency" => Ok(EscalationLevel::Emergency),
            other => Err(format!("unknown escalation level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_accepts_legacy_warning_alias() {
        #[derive(Deserialize)]
        struct Wrapper {
            priority: Priority,
        }
        let w: Wrapper = toml::from_str(r#"priority = "warning""#).unwrap();
        assert_eq!(w.priority, Priority::Standard);
        let w: Wrapper = toml::from_str(r#"priority = "critical""#).unwrap();
        assert_eq!(w.priority, Priority::Critical);
    }

    #[test]
    fn process_identity_parses_both_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            process: ProcessIdentity,
        }
        let w: Wrapper = toml::from_str(r#"process = { unit = "api.service" }"#).unwrap();
        assert_eq!(w.process.unit(), Some("api.service"));

        let w: Wrapper = toml::from_str(r#"process = { pid_file = "/run/api.pid" }"#).unwrap();
        assert_eq!(w.process, ProcessIdentity::PidFile(PathBuf::from("/run/api.pid")));
        assert_eq!(w.process.unit(), None);
    }

    #[test]
    fn escalation_levels_are_ordered() {
        assert!(EscalationLevel::Info < EscalationLevel::Warning);
        assert!(EscalationLevel::Critical < EscalationLevel::Emergency);
        assert_eq!("critical".parse::<EscalationLevel>(), Ok(EscalationLevel::Critical));
        assert!("loud".parse::<EscalationLevel>().is_err());
    }
}
