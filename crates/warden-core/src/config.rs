//! warden.toml configuration parser.
//!
//! The config is loaded once per process: the service registry, priority
//! overrides, escalation thresholds and per-level alert limits.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;
use crate::types::{EscalationLevel, Priority, ServiceDescriptor};

static SERVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("service id pattern compiles"));

/// Errors raised while loading warden.toml.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub store: StoreConfig,
    pub sweep: SweepConfig,
    pub probe: ProbeConfig,
    pub remediation: RemediationConfig,
    pub escalation: EscalationConfig,
    pub notifier: NotifierConfig,
    /// Priority overrides keyed by service id.
    pub priorities: HashMap<String, Priority>,
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Samples, events and alert records older than this many days are
    /// pruned once a day. 0 keeps everything.
    pub retention_days: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/warden/warden.redb"),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Time between fleet sweeps (e.g., "5m").
    pub interval: String,
    /// Services processed in parallel; 1 keeps the sweep sequential.
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: "5m".to_string(),
            concurrency: 1,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(300))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub connect_timeout: String,
    pub http_timeout: String,
    pub tls_timeout: String,
    pub command_timeout: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: "2s".to_string(),
            http_timeout: "10s".to_string(),
            tls_timeout: "10s".to_string(),
            command_timeout: "5s".to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(2))
    }

    pub fn http_timeout(&self) -> Duration {
        parse_duration(&self.http_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn tls_timeout(&self) -> Duration {
        parse_duration(&self.tls_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn command_timeout(&self) -> Duration {
        parse_duration(&self.command_timeout).unwrap_or(Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Timeout for each stop/kill/start call.
    pub step_timeout: String,
    /// Timeout for cleanup and provision hooks.
    pub hook_timeout: String,
    /// Delays before each post-restart health check.
    pub verify_delays: Vec<String>,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            step_timeout: "30s".to_string(),
            hook_timeout: "30s".to_string(),
            verify_delays: vec!["5s".to_string(), "10s".to_string(), "15s".to_string()],
        }
    }
}

impl RemediationConfig {
    pub fn step_timeout(&self) -> Duration {
        parse_duration(&self.step_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn hook_timeout(&self) -> Duration {
        parse_duration(&self.hook_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn verify_delays(&self) -> Vec<Duration> {
        self.verify_delays
            .iter()
            .filter_map(|d| parse_duration(d))
            .collect()
    }
}

/// Downtime thresholds (minutes) for each priority ladder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EscalationThresholds {
    pub critical_priority_critical_after: u64,
    pub critical_priority_emergency_after: u64,
    pub standard_priority_warning_after: u64,
    pub standard_priority_critical_after: u64,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            critical_priority_critical_after: 15,
            critical_priority_emergency_after: 30,
            standard_priority_warning_after: 30,
            standard_priority_critical_after: 60,
        }
    }
}

/// Rate limit and auto-silence for one escalation level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelPolicy {
    pub max_alerts_per_hour: u32,
    pub silence_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LevelPolicies {
    pub info: LevelPolicy,
    pub warning: LevelPolicy,
    pub critical: LevelPolicy,
    pub emergency: LevelPolicy,
}

impl Default for LevelPolicies {
    fn default() -> Self {
        let warning = LevelPolicy {
            max_alerts_per_hour: 2,
            silence_hours: 1,
        };
        Self {
            info: warning,
            warning,
            critical: LevelPolicy {
                max_alerts_per_hour: 1,
                silence_hours: 4,
            },
            emergency: LevelPolicy {
                max_alerts_per_hour: 1,
                silence_hours: 12,
            },
        }
    }
}

impl LevelPolicies {
    pub fn for_level(&self, level: EscalationLevel) -> LevelPolicy {
        match level {
            EscalationLevel::Info => self.info,
            EscalationLevel::Warning => self.warning,
            EscalationLevel::Critical => self.critical,
            EscalationLevel::Emergency => self.emergency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EscalationConfig {
    pub thresholds: EscalationThresholds,
    pub levels: LevelPolicies,
    /// Downtime assumed when no unresolved failure event exists.
    pub unknown_downtime_minutes: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            thresholds: EscalationThresholds::default(),
            levels: LevelPolicies::default(),
            unknown_downtime_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Alerts are written to the log only.
    #[default]
    Log,
    /// Alerts are POSTed as JSON to a webhook.
    Webhook { url: String },
}

fn check_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "{field}: {value:?} is not a duration (use e.g. \"500ms\", \"10s\", \"5m\", \"4h\")"
        ))
    })
}

impl WardenConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a warden.toml document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: WardenConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for svc in &self.services {
            if !SERVICE_ID.is_match(&svc.id) {
                return Err(ConfigError::Invalid(format!(
                    "service id {:?} may only contain letters, digits, '.', '_' and '-'",
                    svc.id
                )));
            }
            if !seen.insert(svc.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate service id {:?}", svc.id)));
            }
            if svc.port == 0 {
                return Err(ConfigError::Invalid(format!("service {:?} has port 0", svc.id)));
            }
            if !svc.url.starts_with("http://") && !svc.url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "service {:?} url must be http:// or https://",
                    svc.id
                )));
            }
            if svc.remediation.auto_restart && !svc.can_start() {
                return Err(ConfigError::Invalid(format!(
                    "service {:?} has auto_restart but no way to start it; \
                     add a [services.start] command or set auto_restart = false",
                    svc.id
                )));
            }
            if let Some(start) = &svc.start {
                if svc.process.unit().is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "service {:?} is a systemd unit; start commands only apply to pid-file services",
                        svc.id
                    )));
                }
                if start.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "service {:?} has an empty start command",
                        svc.id
                    )));
                }
            }
        }
        for id in self.priorities.keys() {
            if !seen.contains(id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "priority override for unknown service {id:?}"
                )));
            }
        }
        if self.sweep.concurrency == 0 {
            return Err(ConfigError::Invalid("sweep.concurrency must be at least 1".to_string()));
        }
        self.validate_durations()
    }

    fn validate_durations(&self) -> Result<(), ConfigError> {
        if check_duration("sweep.interval", &self.sweep.interval)?.is_zero() {
            return Err(ConfigError::Invalid("sweep.interval must be greater than zero".to_string()));
        }
        check_duration("probe.connect_timeout", &self.probe.connect_timeout)?;
        check_duration("probe.http_timeout", &self.probe.http_timeout)?;
        check_duration("probe.tls_timeout", &self.probe.tls_timeout)?;
        check_duration("probe.command_timeout", &self.probe.command_timeout)?;
        check_duration("remediation.step_timeout", &self.remediation.step_timeout)?;
        check_duration("remediation.hook_timeout", &self.remediation.hook_timeout)?;
        for (i, delay) in self.remediation.verify_delays.iter().enumerate() {
            check_duration(&format!("remediation.verify_delays[{i}]"), delay)?;
        }
        Ok(())
    }

    /// Look up a service descriptor by id.
    pub fn service(&self, id: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Effective priority: the override table wins over the descriptor.
    pub fn priority_for(&self, svc: &ServiceDescriptor) -> Priority {
        self.priorities.get(&svc.id).copied().unwrap_or(svc.priority)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessIdentity;

    const SAMPLE: &str = r#"
[store]
path = "/tmp/warden.redb"
retention_days = 14

[sweep]
interval = "1m"
concurrency = 2

[escalation.levels.critical]
max_alerts_per_hour = 3
silence_hours = 2

[notifier]
kind = "webhook"
url = "http://127.0.0.1:9000/hooks/warden"

[priorities]
blog = "critical"

[[services]]
id = "conflost"
port = 5006
url = "http://localhost:5006"
domain = "conflost.com"
priority = "critical"
process = { unit = "conflost.service" }

[[services]]
id = "blog"
port = 3001
url = "http://localhost:3001"
process = { pid_file = "/run/blog.pid" }
cleanup = ["rm", "-f", "/run/blog.sock"]

[services.start]
command = ["node", "server.js"]
working_dir = "/srv/blog"

[services.remediation]
max_restarts_per_day = 3
"#;

    #[test]
    fn example_config_is_valid() {
        let config = WardenConfig::parse(include_str!("../../../warden.example.toml")).unwrap();
        assert_eq!(config.services.len(), 2);
        let blog = config.service("blog").unwrap();
        assert_eq!(config.priority_for(blog), Priority::Critical);
        assert_eq!(config.notifier, NotifierConfig::Log);
    }

    #[test]
    fn parse_full_config() {
        let config = WardenConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.sweep.interval(), Duration::from_secs(60));
        assert_eq!(config.sweep.concurrency, 2);
        assert_eq!(config.store.retention_days, 14);
        assert_eq!(
            config.notifier,
            NotifierConfig::Webhook {
                url: "http://127.0.0.1:9000/hooks/warden".to_string()
            }
        );

        let blog = config.service("blog").unwrap();
        assert_eq!(blog.process, ProcessIdentity::PidFile(PathBuf::from("/run/blog.pid")));
        assert_eq!(blog.remediation.max_restarts_per_day, 3);
        assert_eq!(blog.remediation.min_restart_interval_minutes, 5);
        assert!(blog.remediation.auto_restart);
        assert_eq!(blog.cleanup.as_deref().map(|c| c.len()), Some(3));
        let start = blog.start.as_ref().unwrap();
        assert_eq!(start.command, vec!["node", "server.js"]);
        assert_eq!(start.working_dir, Some(PathBuf::from("/srv/blog")));
        assert!(blog.can_start());
    }

    #[test]
    fn defaults_apply_when_sections_missing() {
        let config = WardenConfig::parse("").unwrap();
        assert!(config.services.is_empty());
        assert_eq!(config.sweep.interval(), Duration::from_secs(300));
        assert_eq!(config.probe.http_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.remediation.verify_delays(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(15)
            ]
        );
        assert_eq!(config.notifier, NotifierConfig::Log);

        let levels = &config.escalation.levels;
        assert_eq!(levels.warning.max_alerts_per_hour, 2);
        assert_eq!(levels.critical.silence_hours, 4);
        assert_eq!(levels.emergency.silence_hours, 12);
        assert_eq!(levels.for_level(EscalationLevel::Info), levels.warning);
    }

    #[test]
    fn partial_level_override_keeps_other_levels() {
        let config = WardenConfig::parse(SAMPLE).unwrap();
        let levels = &config.escalation.levels;
        assert_eq!(levels.critical.max_alerts_per_hour, 3);
        assert_eq!(levels.emergency.silence_hours, 12);
    }

    #[test]
    fn priority_override_wins() {
        let config = WardenConfig::parse(SAMPLE).unwrap();
        let blog = config.service("blog").unwrap();
        assert_eq!(blog.priority, Priority::Standard);
        assert_eq!(config.priority_for(blog), Priority::Critical);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let toml_str = r#"
[[services]]
id = "a"
port = 1
url = "http://localhost:1"
process = { unit = "a.service" }

[[services]]
id = "a"
port = 2
url = "http://localhost:2"
process = { unit = "a.service" }
"#;
        let err = WardenConfig::parse(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_ids_that_break_store_keys() {
        let toml_str = r#"
[[services]]
id = "bad:id"
port = 1
url = "http://localhost:1"
process = { unit = "a.service" }
"#;
        assert!(matches!(
            WardenConfig::parse(toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_priority_override() {
        let toml_str = r#"
[priorities]
ghost = "critical"
"#;
        assert!(matches!(
            WardenConfig::parse(toml_str),
            Err(ConfigError::Invalid(msg)) if msg.contains("ghost")
        ));
    }

    const PID_SERVICE: &str = r#"
[[services]]
id = "blog"
port = 3001
url = "http://localhost:3001"
process = { pid_file = "/run/blog.pid" }
"#;

    #[test]
    fn rejects_auto_restart_without_start_command() {
        assert!(matches!(
            WardenConfig::parse(PID_SERVICE),
            Err(ConfigError::Invalid(msg)) if msg.contains("auto_restart")
        ));

        let manual = format!("{PID_SERVICE}\n[services.remediation]\nauto_restart = false\n");
        let config = WardenConfig::parse(&manual).unwrap();
        assert!(!config.services[0].can_start());
    }

    #[test]
    fn start_command_only_for_pid_file_services() {
        let toml_str = r#"
[[services]]
id = "api"
port = 4000
url = "http://localhost:4000"
process = { unit = "api.service" }

[services.start]
command = ["./api"]
"#;
        assert!(matches!(
            WardenConfig::parse(toml_str),
            Err(ConfigError::Invalid(msg)) if msg.contains("systemd unit")
        ));

        let empty = format!("{PID_SERVICE}\n[services.start]\ncommand = []\n");
        assert!(matches!(
            WardenConfig::parse(&empty),
            Err(ConfigError::Invalid(msg)) if msg.contains("empty start command")
        ));
    }

    #[test]
    fn rejects_unparseable_durations() {
        let cases = [
            ("[sweep]\ninterval = \"5 minutes\"", "sweep.interval"),
            ("[sweep]\ninterval = \"0s\"", "sweep.interval"),
            ("[probe]\nhttp_timeout = \"ten\"", "probe.http_timeout"),
            ("[remediation]\nstep_timeout = \"99999999999999999h\"", "remediation.step_timeout"),
            (
                "[remediation]\nverify_delays = [\"5s\", \"10x\", \"15s\"]",
                "remediation.verify_delays[1]",
            ),
        ];
        for (toml_str, field) in cases {
            match WardenConfig::parse(toml_str) {
                Err(ConfigError::Invalid(msg)) => assert!(msg.contains(field), "{msg}"),
                other => panic!("{toml_str:?} parsed: {other:?}"),
            }
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = WardenConfig::from_file(Path::new("/nonexistent/warden.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/warden.toml"));
    }
}
