//! Process manager — the only place that touches OS processes.
//!
//! Every operation reports success as a `bool`; failures are logged here and
//! never surface as errors to the circuit breaker.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, info, warn};

use warden_core::{ProcessIdentity, ServiceDescriptor, StartCommand};

/// Stop/start collaborator driven by the remediation controller.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Graceful stop. Stopping an already-stopped service succeeds.
    async fn stop(&self, service: &ServiceDescriptor) -> bool;

    /// Forced stop, used when a graceful stop fails.
    async fn kill(&self, service: &ServiceDescriptor) -> bool;

    async fn start(&self, service: &ServiceDescriptor) -> bool;

    /// Run a cleanup or provisioning command for the service.
    async fn run_hook(&self, service: &ServiceDescriptor, argv: &[String]) -> bool;

    async fn is_running(&self, service: &ServiceDescriptor) -> bool;
}

/// Drives systemd units through `systemctl`. Pid-file services are
/// signalled directly and started from their `[services.start]` command.
#[derive(Debug, Clone, Default)]
pub struct SystemdProcessManager;

impl SystemdProcessManager {
    pub fn new() -> Self {
        Self
    }

    async fn systemctl(&self, args: &[&str]) -> bool {
        run(Command::new("systemctl").args(args)).await
    }
}

#[async_trait]
impl ProcessManager for SystemdProcessManager {
    async fn stop(&self, service: &ServiceDescriptor) -> bool {
        match &service.process {
            ProcessIdentity::Unit(unit) => self.systemctl(&["stop", unit.as_str()]).await,
            ProcessIdentity::PidFile(path) => signal_pid_file(path, Signal::SIGTERM),
        }
    }

    async fn kill(&self, service: &ServiceDescriptor) -> bool {
        match &service.process {
            ProcessIdentity::Unit(unit) => {
                self.systemctl(&["kill", "--signal=SIGKILL", unit.as_str()]).await
            }
            ProcessIdentity::PidFile(path) => signal_pid_file(path, Signal::SIGKILL),
        }
    }

    async fn start(&self, service: &ServiceDescriptor) -> bool {
        match &service.process {
            ProcessIdentity::Unit(unit) => self.systemctl(&["start", unit.as_str()]).await,
            ProcessIdentity::PidFile(path) => match &service.start {
                Some(start) => spawn_detached(service, start, path),
                None => {
                    warn!(
                        service = %service.id,
                        pid_file = %path.display(),
                        "no start command configured"
                    );
                    false
                }
            },
        }
    }

    async fn run_hook(&self, service: &ServiceDescriptor, argv: &[String]) -> bool {
        let Some((program, args)) = argv.split_first() else {
            return true;
        };
        debug!(service = %service.id, %program, "running hook");
        run(Command::new(program).args(args).env("WARDEN_SERVICE", &service.id)).await
    }

    async fn is_running(&self, service: &ServiceDescriptor) -> bool {
        match &service.process {
            ProcessIdentity::Unit(unit) => self.systemctl(&["is-active", "--quiet", unit.as_str()]).await,
            ProcessIdentity::PidFile(path) => {
                read_pid(path).is_some_and(|pid| matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM)))
            }
        }
    }
}

async fn run(command: &mut Command) -> bool {
    let program = command.as_std().get_program().to_string_lossy().to_string();
    match command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            warn!(
                %program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "command failed"
            );
            false
        }
        Err(e) => {
            warn!(%program, error = %e, "failed to spawn command");
            false
        }
    }
}

/// Launch `start` in its own process group and record its pid.
///
/// The child is not awaited; success means it was spawned and the pid file
/// written. Recovery is confirmed by the verification probes.
fn spawn_detached(service: &ServiceDescriptor, start: &StartCommand, pid_file: &Path) -> bool {
    let Some((program, args)) = start.command.split_first() else {
        return false;
    };

    let (stdout, stderr) = match log_streams(start.log_file.as_deref()) {
        Ok(streams) => streams,
        Err(e) => {
            warn!(service = %service.id, error = %e, "cannot open start log");
            return false;
        }
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .env("WARDEN_SERVICE", &service.id)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0);
    if let Some(dir) = &start.working_dir {
        command.current_dir(dir);
    }

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(service = %service.id, %program, error = %e, "failed to spawn service");
            return false;
        }
    };
    let Some(pid) = child.id() else {
        warn!(service = %service.id, "spawned process exited immediately");
        return false;
    };

    if let Err(e) = std::fs::write(pid_file, format!("{pid}\n")) {
        warn!(service = %service.id, pid_file = %pid_file.display(), error = %e, "cannot write pid file");
        return false;
    }
    info!(service = %service.id, pid, "service process started");
    true
}

fn log_streams(log_file: Option<&Path>) -> std::io::Result<(Stdio, Stdio)> {
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            Ok((Stdio::from(file.try_clone()?), Stdio::from(file)))
        }
        None => Ok((Stdio::null(), Stdio::null())),
    }
}

fn read_pid(path: &Path) -> Option<Pid> {
    let content = std::fs::read_to_string(path).ok()?;
    let pid: i32 = content.trim().parse().ok()?;
    (pid > 0).then(|| Pid::from_raw(pid))
}

/// Signal the pid in `path`. A missing pid file or process counts as stopped.
fn signal_pid_file(path: &Path, signal: Signal) -> bool {
    let Some(pid) = read_pid(path) else {
        debug!(pid_file = %path.display(), "no pid; treating as stopped");
        return true;
    };
    match kill(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => true,
        Err(e) => {
            warn!(%pid, ?signal, error = %e, "signal failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use warden_core::{Priority, RemediationPolicy};

    fn pid_service(path: PathBuf) -> ServiceDescriptor {
        ServiceDescriptor {
            id: "api".to_string(),
            port: 8080,
            process: ProcessIdentity::PidFile(path),
            url: "http://127.0.0.1:8080/".to_string(),
            domain: None,
            priority: Priority::Standard,
            remediation: RemediationPolicy::default(),
            cleanup: None,
            provision: None,
            start: None,
        }
    }

    #[tokio::test]
    async fn stop_without_pid_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let svc = pid_service(dir.path().join("gone.pid"));
        let manager = SystemdProcessManager::new();
        assert!(manager.stop(&svc).await);
        assert!(manager.stop(&svc).await);
        assert!(!manager.is_running(&svc).await);
    }

    #[tokio::test]
    async fn pid_file_of_live_process_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("self.pid");
        std::fs::write(&path, std::process::id().to_string()).unwrap();
        assert!(SystemdProcessManager::new().is_running(&pid_service(path)).await);
    }

    async fn wait_for_file(path: &Path) -> String {
        for _ in 0..100 {
            if let Ok(content) = std::fs::read_to_string(path) {
                if !content.is_empty() {
                    return content;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[tokio::test]
    async fn pid_file_service_without_start_command_cannot_start() {
        let dir = tempfile::tempdir().unwrap();
        let svc = pid_service(dir.path().join("api.pid"));
        assert!(!SystemdProcessManager::new().start(&svc).await);
    }

    #[tokio::test]
    async fn start_spawns_command_and_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("api.pid");
        let mut svc = pid_service(pid_file.clone());
        svc.start = Some(StartCommand {
            command: vec!["sleep".to_string(), "30".to_string()],
            working_dir: None,
            log_file: None,
        });
        let manager = SystemdProcessManager::new();

        assert!(manager.start(&svc).await);
        let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(pid > 0);
        assert!(manager.is_running(&svc).await);

        assert!(manager.kill(&svc).await);
    }

    #[tokio::test]
    async fn start_runs_in_working_dir_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("api.log");
        let mut svc = pid_service(dir.path().join("api.pid"));
        svc.start = Some(StartCommand {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo \"$WARDEN_SERVICE in $(pwd)\"".to_string(),
            ],
            working_dir: Some(dir.path().to_path_buf()),
            log_file: Some(log.clone()),
        });

        assert!(SystemdProcessManager::new().start(&svc).await);
        let output = wait_for_file(&log).await;
        let cwd = dir.path().canonicalize().unwrap();
        assert!(output.starts_with("api in "), "{output}");
        assert!(output.trim_end().ends_with(cwd.to_str().unwrap()), "{output}");
    }

    #[tokio::test]
    async fn start_fails_for_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("api.pid");
        let mut svc = pid_service(pid_file.clone());
        svc.start = Some(StartCommand {
            command: vec!["/nonexistent/warden-service".to_string()],
            working_dir: None,
            log_file: None,
        });

        assert!(!SystemdProcessManager::new().start(&svc).await);
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn hooks_report_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let svc = pid_service(dir.path().join("api.pid"));
        let manager = SystemdProcessManager::new();

        assert!(manager.run_hook(&svc, &[]).await);
        assert!(manager.run_hook(&svc, &["true".to_string()]).await);
        assert!(!manager.run_hook(&svc, &["false".to_string()]).await);
        assert!(!manager.run_hook(&svc, &["/nonexistent/warden-hook".to_string()]).await);
    }

    #[tokio::test]
    async fn hook_sees_service_id() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let svc = pid_service(dir.path().join("api.pid"));
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("printf %s \"$WARDEN_SERVICE\" > {}", marker.display()),
        ];
        assert!(SystemdProcessManager::new().run_hook(&svc, &argv).await);
        assert_eq!(std::fs::read_to_string(marker).unwrap(), "api");
    }
}
