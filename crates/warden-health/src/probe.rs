//! Composite health probe.
//!
//! A probe runs three independent checks against a service (TCP listen,
//! process existence, HTTP reachability) and folds them into a
//! [`HealthSample`]. Every check always runs, whatever the others report,
//! and every failure is a `false` plus an entry in the sample's error text.
//!
//! When the service declares a `domain`, the probe also reads the
//! certificate expiry for it. That check only logs and persists a
//! [`CertificateStatus`]; it never affects `healthy`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, warn};

use warden_core::config::ProbeConfig;
use warden_core::{Clock, ProcessIdentity, ServiceDescriptor};
use warden_state::{CertificateStatus, HealthSample, StateStore};

use crate::cert::{CERT_EXPIRY_WARNING_DAYS, CertificateInspector, days_remaining};
use crate::client::HttpClient;

/// Status codes that count as "a server answered".
///
/// 403 and 404 are included: the probe distinguishes a live server from a
/// dead one, not correct content from incorrect.
pub const RESPONDING_STATUS_CODES: [u16; 5] = [200, 301, 302, 403, 404];

/// Port used for certificate expiry checks.
const TLS_PORT: u16 = 443;

/// Produces a [`HealthSample`] for a service.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, service: &ServiceDescriptor) -> HealthSample;
}

/// Outcome of the HTTP check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheck {
    pub responding: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

/// The production probe set.
pub struct ProbeSet {
    config: ProbeConfig,
    http: HttpClient,
    certs: CertificateInspector,
    store: Option<StateStore>,
    clock: Arc<dyn Clock>,
}

impl ProbeSet {
    pub fn new(config: &ProbeConfig, clock: Arc<dyn Clock>) -> Result<Self, rustls::Error> {
        Ok(Self {
            http: HttpClient::new(config.http_timeout())?,
            certs: CertificateInspector::new(config.tls_timeout())?,
            config: config.clone(),
            store: None,
            clock,
        })
    }

    /// Persist certificate observations to the given store.
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// TCP connect to `127.0.0.1:<port>`.
    pub async fn check_port(&self, port: u16) -> Result<(), String> {
        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port))).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("port {port}: {e}")),
            Err(_) => Err(format!("port {port}: connect timed out after {timeout:?}")),
        }
    }

    /// Whether the process behind `identity` exists.
    pub async fn check_process(&self, identity: &ProcessIdentity) -> Result<(), String> {
        match identity {
            ProcessIdentity::Unit(unit) => self.check_unit(unit).await,
            ProcessIdentity::PidFile(path) => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| format!("pid file {}: {e}", path.display()))?;
                let pid: i32 = content
                    .trim()
                    .parse()
                    .map_err(|_| format!("pid file {}: not a pid", path.display()))?;
                pid_alive(pid)
            }
        }
    }

    async fn check_unit(&self, unit: &str) -> Result<(), String> {
        let timeout = self.config.command_timeout();
        let status = Command::new("systemctl")
            .args(["is-active", "--quiet", unit])
            .kill_on_drop(true)
            .status();
        match tokio::time::timeout(timeout, status).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(_)) => Err(format!("unit {unit} is not active")),
            Ok(Err(e)) => Err(format!("unit {unit}: {e}")),
            Err(_) => Err(format!("unit {unit}: systemctl timed out after {timeout:?}")),
        }
    }

    /// GET the reachability URL and classify the status code.
    pub async fn check_http(&self, url: &str) -> HttpCheck {
        let started = Instant::now();
        match self.http.get(url).await {
            Ok(status) => {
                let code = status.as_u16();
                let responding = RESPONDING_STATUS_CODES.contains(&code);
                HttpCheck {
                    responding,
                    status_code: Some(code),
                    response_time_ms: Some(started.elapsed().as_millis() as u64),
                    error: (!responding).then(|| format!("http status {code}")),
                }
            }
            Err(e) => HttpCheck {
                responding: false,
                status_code: None,
                response_time_ms: None,
                error: Some(format!("http: {e}")),
            },
        }
    }

    /// Read and record certificate expiry for the service's domain.
    pub async fn check_certificate(&self, service: &ServiceDescriptor) -> Option<CertificateStatus> {
        let domain = service.domain.as_deref()?;
        let not_after = match self.certs.not_after(domain, TLS_PORT).await {
            Ok(not_after) => not_after,
            Err(e) => {
                warn!(service = %service.id, %domain, error = %e, "certificate check failed");
                return None;
            }
        };

        let now = self.clock.now();
        let status = CertificateStatus {
            service: service.id.clone(),
            domain: domain.to_string(),
            expires_at: not_after,
            days_remaining: days_remaining(not_after, now),
            checked_at: now,
        };

        if status.days_remaining < CERT_EXPIRY_WARNING_DAYS {
            warn!(
                service = %service.id,
                %domain,
                days_remaining = status.days_remaining,
                "certificate expires soon"
            );
        } else {
            debug!(service = %service.id, %domain, days_remaining = status.days_remaining, "certificate ok");
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.put_certificate(&status) {
                warn!(service = %service.id, error = %e, "failed to record certificate status");
            }
        }
        Some(status)
    }
}

#[async_trait]
impl Prober for ProbeSet {
    async fn probe(&self, service: &ServiceDescriptor) -> HealthSample {
        let (port, process, http) = tokio::join!(
            self.check_port(service.port),
            self.check_process(&service.process),
            self.check_http(&service.url),
        );
        self.check_certificate(service).await;

        let mut errors = Vec::new();
        if let Err(e) = &port {
            errors.push(e.clone());
        }
        if let Err(e) = &process {
            errors.push(e.clone());
        }
        if let Some(e) = &http.error {
            errors.push(e.clone());
        }

        let sample = HealthSample {
            service: service.id.clone(),
            timestamp: self.clock.now(),
            port_listening: port.is_ok(),
            process_running: process.is_ok(),
            http_responding: http.responding,
            response_time_ms: http.response_time_ms,
            status_code: http.status_code,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        };
        debug!(
            service = %service.id,
            healthy = sample.healthy(),
            port = sample.port_listening,
            process = sample.process_running,
            http = sample.http_responding,
            "probe complete"
        );
        sample
    }
}

/// Signal 0: the process exists if the kernel accepts or denies the signal.
fn pid_alive(pid: i32) -> Result<(), String> {
    if pid <= 0 {
        return Err(format!("invalid pid {pid}"));
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(()),
        Err(e) => Err(format!("pid {pid}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use warden_core::{ManualClock, Priority, RemediationPolicy};

    const T0: u64 = 1_792_418_400;

    fn probe_set() -> ProbeSet {
        let config = ProbeConfig {
            connect_timeout: "1s".to_string(),
            http_timeout: "2s".to_string(),
            tls_timeout: "2s".to_string(),
            command_timeout: "2s".to_string(),
        };
        ProbeSet::new(&config, Arc::new(ManualClock::new(T0))).unwrap()
    }

    fn service(port: u16, pid_file: PathBuf) -> ServiceDescriptor {
        ServiceDescriptor {
            id: "api".to_string(),
            port,
            process: ProcessIdentity::PidFile(pid_file),
            url: format!("http://127.0.0.1:{port}/"),
            domain: None,
            priority: Priority::Critical,
            remediation: RemediationPolicy::default(),
            cleanup: None,
            provision: None,
            start: None,
        }
    }

    /// Answer every connection with the given status line.
    async fn serve(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                        return;
                    }
                    let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\n\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        port
    }

    fn own_pid_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("api.pid");
        std::fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        path
    }

    #[test]
    fn responding_codes_include_not_found() {
        assert!(RESPONDING_STATUS_CODES.contains(&404));
        assert!(RESPONDING_STATUS_CODES.contains(&403));
        assert!(!RESPONDING_STATUS_CODES.contains(&500));
        assert!(!RESPONDING_STATUS_CODES.contains(&204));
    }

    #[test]
    fn pid_alive_for_self_not_for_garbage() {
        assert!(pid_alive(std::process::id() as i32).is_ok());
        assert!(pid_alive(0).is_err());
        assert!(pid_alive(-5).is_err());
    }

    #[tokio::test]
    async fn healthy_service_passes_all_checks() {
        let dir = tempfile::tempdir().unwrap();
        let port = serve("404 Not Found").await;
        let sample = probe_set().probe(&service(port, own_pid_file(&dir))).await;

        assert!(sample.port_listening);
        assert!(sample.process_running);
        assert!(sample.http_responding);
        assert!(sample.healthy());
        assert_eq!(sample.status_code, Some(404));
        assert!(sample.response_time_ms.is_some());
        assert_eq!(sample.error, None);
        assert_eq!(sample.timestamp, T0);
    }

    #[tokio::test]
    async fn server_error_is_not_responding() {
        let dir = tempfile::tempdir().unwrap();
        let port = serve("500 Internal Server Error").await;
        let sample = probe_set().probe(&service(port, own_pid_file(&dir))).await;

        assert!(sample.port_listening);
        assert!(!sample.http_responding);
        assert!(!sample.healthy());
        assert_eq!(sample.status_code, Some(500));
        assert_eq!(sample.error.as_deref(), Some("http status 500"));
    }

    #[tokio::test]
    async fn all_checks_run_when_everything_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sample = probe_set()
            .probe(&service(port, dir.path().join("missing.pid")))
            .await;

        assert!(!sample.port_listening);
        assert!(!sample.process_running);
        assert!(!sample.http_responding);
        assert_eq!(sample.status_code, None);
        let error = sample.error.unwrap();
        assert_eq!(error.split("; ").count(), 3, "{error}");
        assert!(error.contains("missing.pid"));
    }

    #[tokio::test]
    async fn garbage_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.pid");
        std::fs::write(&path, "not-a-pid").unwrap();
        let err = probe_set()
            .check_process(&ProcessIdentity::PidFile(path))
            .await
            .unwrap_err();
        assert!(err.contains("not a pid"));
    }

    #[tokio::test]
    async fn no_domain_skips_certificate_check() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(1, own_pid_file(&dir));
        assert!(probe_set().check_certificate(&svc).await.is_none());
    }
}
