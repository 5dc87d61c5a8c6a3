//! Supervisor — per-service pipeline and fleet sweep.
//!
//! Each sweep runs `probe → track → remediate → escalate` for every
//! configured service. Services run concurrently up to
//! `sweep.concurrency`; a service whose previous pipeline is still running
//! is skipped for the sweep. Nothing that goes wrong for one service stops
//! the sweep for the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use warden_alert::{AlertDecision, EscalationEngine, Notifier};
use warden_core::{Clock, ServiceDescriptor, ServiceId, SystemClock, WardenConfig};
use warden_health::{HealthStateTracker, ProbeSet, Prober};
use warden_remediate::{ProcessManager, RemediationController, RemediationOutcome, SystemdProcessManager};
use warden_state::{DAY_SECS, EventType, HealthSample, StateStore};

/// What the pipeline did for one service in one sweep.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub service: ServiceId,
    /// The previous pipeline for this service was still running.
    pub busy: bool,
    /// Health after the pipeline (true if a restart recovered it).
    pub healthy: bool,
    /// `failure` or `recovery` events emitted this cycle.
    pub transitions: Vec<EventType>,
    pub remediation: Option<RemediationOutcome>,
    pub alert: Option<AlertDecision>,
    /// Errors logged along the way.
    pub errors: Vec<String>,
}

impl ServiceReport {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            busy: false,
            healthy: false,
            transitions: Vec::new(),
            remediation: None,
            alert: None,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub started_at: u64,
    pub maintenance_ran: bool,
    /// Records dropped by the retention pass that follows maintenance.
    pub pruned: usize,
    /// One report per configured service, in config order.
    pub services: Vec<ServiceReport>,
}

impl SweepReport {
    pub fn unhealthy(&self) -> usize {
        self.services.iter().filter(|s| !s.busy && !s.healthy).count()
    }

    pub fn alerts_sent(&self) -> usize {
        self.services
            .iter()
            .filter(|s| matches!(s.alert, Some(AlertDecision::Sent { .. })))
            .count()
    }
}

struct Inner {
    config: WardenConfig,
    store: StateStore,
    prober: Arc<dyn Prober>,
    tracker: HealthStateTracker,
    remediation: RemediationController,
    escalation: EscalationEngine,
    clock: Arc<dyn Clock>,
    locks: HashMap<ServiceId, Arc<Mutex<()>>>,
    permits: Arc<Semaphore>,
}

/// Cheap to clone; clones share locks and collaborators.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(
        config: WardenConfig,
        store: StateStore,
        prober: Arc<dyn Prober>,
        manager: Arc<dyn ProcessManager>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let remediation = RemediationController::new(
            store.clone(),
            manager,
            prober.clone(),
            clock.clone(),
            &config.remediation,
        );
        let escalation = EscalationEngine::new(
            store.clone(),
            notifier,
            clock.clone(),
            config.escalation.clone(),
        );
        let locks = config
            .services
            .iter()
            .map(|svc| (svc.id.clone(), Arc::new(Mutex::new(()))))
            .collect();
        let permits = Arc::new(Semaphore::new(config.sweep.concurrency.max(1)));

        Self {
            inner: Arc::new(Inner {
                tracker: HealthStateTracker::new(store.clone()),
                config,
                store,
                prober,
                remediation,
                escalation,
                clock,
                locks,
                permits,
            }),
        }
    }

    /// Production wiring: redb store at `store.path`, real probes, systemd
    /// and the configured notifier.
    pub fn from_config(config: WardenConfig) -> anyhow::Result<Self> {
        let path = config.store.path.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let store = StateStore::open(&path)
            .with_context(|| format!("opening store {}", path.display()))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let prober = ProbeSet::new(&config.probe, clock.clone())
            .context("building TLS configuration")?
            .with_store(store.clone());
        let notifier = warden_alert::notify::from_config(&config.notifier, config.probe.http_timeout())
            .context("building notifier")?;

        Ok(Self::new(
            config,
            store,
            Arc::new(prober),
            Arc::new(SystemdProcessManager::new()),
            notifier,
            clock,
        ))
    }

    pub fn config(&self) -> &WardenConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn remediation(&self) -> &RemediationController {
        &self.inner.remediation
    }

    pub fn escalation(&self) -> &EscalationEngine {
        &self.inner.escalation
    }

    fn service(&self, id: &str) -> anyhow::Result<&ServiceDescriptor> {
        self.inner
            .config
            .service(id)
            .with_context(|| format!("unknown service {id}"))
    }

    // ── Sweep ──────────────────────────────────────────────────────

    /// Run one pipeline for every configured service.
    pub async fn sweep_once(&self) -> SweepReport {
        let started_at = self.inner.clock.now();
        let maintenance_ran = match self.inner.escalation.maintain() {
            Ok(ran) => ran,
            Err(e) => {
                warn!(error = %e, "alert state maintenance failed");
                false
            }
        };
        let pruned = if maintenance_ran { self.inner.prune(started_at) } else { 0 };

        let mut tasks = JoinSet::new();
        let mut task_services = HashMap::new();
        for (index, service) in self.inner.config.services.iter().cloned().enumerate() {
            let inner = self.inner.clone();
            let id = service.id.clone();
            let handle = tasks.spawn(async move {
                let report = match inner.permits.clone().acquire_owned().await {
                    Ok(_permit) => inner.check_service(&service).await,
                    Err(e) => {
                        let mut report = ServiceReport::new(&service.id);
                        report.errors.push(e.to_string());
                        report
                    }
                };
                (index, report)
            });
            task_services.insert(handle.id(), (index, id));
        }

        let mut reports: Vec<(usize, ServiceReport)> = Vec::with_capacity(task_services.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, entry)) => reports.push(entry),
                Err(e) => {
                    let Some((index, service)) = task_services.get(&e.id()).cloned() else {
                        error!(error = %e, "pipeline task failed");
                        continue;
                    };
                    error!(%service, error = %e, "service pipeline panicked");
                    let mut report = ServiceReport::new(&service);
                    report.errors.push(format!("pipeline panicked: {e}"));
                    reports.push((index, report));
                }
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        let report = SweepReport {
            started_at,
            maintenance_ran,
            pruned,
            services: reports.into_iter().map(|(_, r)| r).collect(),
        };
        info!(
            services = report.services.len(),
            unhealthy = report.unhealthy(),
            alerts = report.alerts_sent(),
            "sweep complete"
        );
        report
    }

    // ── Single-service operations ──────────────────────────────────

    /// Run the full pipeline for one service.
    pub async fn check_service(&self, id: &str) -> anyhow::Result<ServiceReport> {
        let service = self.service(id)?.clone();
        Ok(self.inner.check_service(&service).await)
    }

    /// Restart without the gate, then record the resulting health.
    pub async fn restart_service(&self, id: &str) -> anyhow::Result<RemediationOutcome> {
        let service = self.service(id)?.clone();
        let _guard = self.inner.lock(id)?;
        let outcome = self.inner.remediation.restart(&service).await;
        if let Some(sample) = &outcome.last_sample {
            self.inner.tracker.observe(sample)?;
        }
        Ok(outcome)
    }

    pub async fn stop_service(&self, id: &str) -> anyhow::Result<bool> {
        let service = self.service(id)?.clone();
        let _guard = self.inner.lock(id)?;
        Ok(self.inner.remediation.stop(&service).await)
    }

    pub async fn start_service(&self, id: &str) -> anyhow::Result<bool> {
        let service = self.service(id)?.clone();
        let _guard = self.inner.lock(id)?;
        Ok(self.inner.remediation.start(&service).await)
    }

    /// Silence alerts for a service; returns the silence end.
    pub fn silence(&self, id: &str, hours: u64) -> anyhow::Result<u64> {
        self.service(id)?;
        Ok(self.inner.escalation.silence(id, hours)?)
    }

    pub fn unsilence(&self, id: &str) -> anyhow::Result<bool> {
        self.service(id)?;
        Ok(self.inner.escalation.unsilence(id)?)
    }
}

/// Sweep every `interval` until shutdown.
///
/// `build` is called once per sweep and the supervisor is dropped when the
/// sweep ends, so the store file is only held while a sweep runs. A build
/// failure skips that sweep.
pub async fn run<F>(interval: Duration, mut build: F, mut shutdown: watch::Receiver<bool>)
where
    F: FnMut() -> anyhow::Result<Supervisor>,
{
    info!(?interval, "sweep loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        match build() {
            Ok(supervisor) => {
                supervisor.sweep_once().await;
            }
            Err(e) => warn!(error = format!("{e:#}"), "sweep skipped"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                debug!("sweep loop shutting down");
                break;
            }
        }
    }
    info!("sweep loop stopped");
}

impl Inner {
    /// Apply `store.retention_days`; failures are logged and skipped.
    fn prune(&self, now: u64) -> usize {
        let days = self.config.store.retention_days;
        if days == 0 {
            return 0;
        }
        let cutoff = now.saturating_sub(days.saturating_mul(DAY_SECS));
        match self.store.prune_before(cutoff) {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, days, "pruned records past retention");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "retention pruning failed");
                0
            }
        }
    }

    /// Take the service lock without waiting.
    fn lock(&self, id: &str) -> anyhow::Result<tokio::sync::OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .get(id)
            .with_context(|| format!("unknown service {id}"))?;
        lock.clone()
            .try_lock_owned()
            .map_err(|_| anyhow::anyhow!("service {id} is busy"))
    }

    async fn check_service(&self, service: &ServiceDescriptor) -> ServiceReport {
        let mut report = ServiceReport::new(&service.id);
        let Ok(_guard) = self.lock(&service.id) else {
            debug!(service = %service.id, "previous cycle still running; skipping");
            report.busy = true;
            return report;
        };

        let sample = self.prober.probe(service).await;
        report.healthy = sample.healthy();
        self.track(&sample, &mut report);
        if report.healthy {
            return report;
        }

        let outcome = self.remediation.remediate(service).await;
        let recovered = outcome.recovered();
        let alert_sample = outcome.last_sample.clone().unwrap_or(sample);
        report.remediation = Some(outcome);
        if recovered {
            report.healthy = true;
            self.track(&alert_sample, &mut report);
            return report;
        }

        let now = self.clock.now();
        let downtime = match self.tracker.downtime_minutes(&service.id, now) {
            Ok(downtime) => downtime,
            Err(e) => {
                warn!(service = %service.id, error = %e, "downtime unavailable");
                report.errors.push(e.to_string());
                None
            }
        };
        let priority = self.config.priority_for(service);
        match self
            .escalation
            .evaluate(service, priority, &alert_sample, downtime)
            .await
        {
            Ok(decision) => report.alert = Some(decision),
            Err(e) => {
                error!(service = %service.id, error = %e, "escalation failed");
                report.errors.push(e.to_string());
            }
        }
        report
    }

    fn track(&self, sample: &HealthSample, report: &mut ServiceReport) {
        match self.tracker.observe(sample) {
            Ok(Some(event)) => report.transitions.push(event.kind),
            Ok(None) => {}
            Err(e) => {
                error!(service = %sample.service, error = %e, "failed to record sample");
                report.errors.push(e.to_string());
            }
        }
    }
}
