//! StateStore — redb-backed metric/event store for Warden.
//!
//! Samples, events and alert records are appended to time-series tables
//! keyed by `(service, timestamp, seq)`. The alert state document lives in
//! its own table and is read-modify-written inside a single write
//! transaction. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{AccessGuard, Database, ReadableDatabase, ReadableTable, StorageError, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type SeriesTable = TableDefinition<'static, &'static str, &'static [u8]>;

type SeriesEntry<'a> =
    Result<(AccessGuard<'a, &'static str>, AccessGuard<'a, &'static [u8]>), StorageError>;

/// Thread-safe store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(LATEST_EVENTS).map_err(map_err!(Table))?;
        txn.open_table(ALERTS).map_err(map_err!(Table))?;
        txn.open_table(CERTIFICATES).map_err(map_err!(Table))?;
        txn.open_table(ALERT_STATE).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Samples ────────────────────────────────────────────────────

    pub fn append_sample(&self, sample: &HealthSample) -> StateResult<()> {
        self.append(SAMPLES, &sample.service, sample.timestamp, sample)
    }

    /// Most recent samples for a service, newest first.
    pub fn latest_samples(&self, service: &str, limit: usize) -> StateResult<Vec<HealthSample>> {
        self.scan(SAMPLES, service, 0, u64::MAX - 1, true, limit, |_| true)
    }

    pub fn latest_sample(&self, service: &str) -> StateResult<Option<HealthSample>> {
        Ok(self.latest_samples(service, 1)?.pop())
    }

    /// Samples with `from <= timestamp <= to`, oldest first.
    pub fn samples_between(&self, service: &str, from: u64, to: u64) -> StateResult<Vec<HealthSample>> {
        self.scan(SAMPLES, service, from, to, false, usize::MAX, |_| true)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an event and update the latest-event index in the same
    /// transaction.
    pub fn append_event(&self, event: &ServiceEvent) -> StateResult<()> {
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            insert_series(&txn, EVENTS, &event.service, event.timestamp, &value)?;
            let mut latest = txn.open_table(LATEST_EVENTS).map_err(map_err!(Table))?;
            index_if_newer(&mut latest, &index_key(&event.service, event.kind.as_str()), event, &value)?;
            if event.kind.is_transition() {
                index_if_newer(&mut latest, &index_key(&event.service, TRANSITION_KEY), event, &value)?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service = %event.service, kind = %event.kind, "event recorded");
        Ok(())
    }

    /// Most recent events for a service, newest first.
    pub fn latest_events(&self, service: &str, limit: usize) -> StateResult<Vec<ServiceEvent>> {
        self.scan(EVENTS, service, 0, u64::MAX - 1, true, limit, |_| true)
    }

    /// Events with `from <= timestamp <= to`, oldest first.
    pub fn events_between(&self, service: &str, from: u64, to: u64) -> StateResult<Vec<ServiceEvent>> {
        self.scan(EVENTS, service, from, to, false, usize::MAX, |_| true)
    }

    /// Most recent event of the given type.
    pub fn latest_event_of_type(
        &self,
        service: &str,
        kind: EventType,
    ) -> StateResult<Option<ServiceEvent>> {
        self.latest_indexed(&index_key(service, kind.as_str()))
    }

    /// Most recent `failure` or `recovery` event.
    pub fn last_transition(&self, service: &str) -> StateResult<Option<ServiceEvent>> {
        self.latest_indexed(&index_key(service, TRANSITION_KEY))
    }

    fn latest_indexed(&self, key: &str) -> StateResult<Option<ServiceEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LATEST_EVENTS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let event = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    /// The latest `failure` event with no later `recovery`.
    pub fn unresolved_failure(&self, service: &str) -> StateResult<Option<ServiceEvent>> {
        Ok(self
            .last_transition(service)?
            .filter(|e| e.kind == EventType::Failure))
    }

    /// Failure-class events (`failure`, `restart_attempt`) in `[since, until]`.
    pub fn failure_history(&self, service: &str, since: u64, until: u64) -> StateResult<FailureHistory> {
        let events = self.scan(EVENTS, service, since, until, false, usize::MAX, |e: &ServiceEvent| {
            e.kind.is_failure_class()
        })?;
        Ok(FailureHistory {
            failure_count: events.len() as u32,
            first_failure: events.first().map(|e| e.timestamp),
            last_failure: events.last().map(|e| e.timestamp),
        })
    }

    // ── Alerts ─────────────────────────────────────────────────────

    pub fn append_alert(&self, record: &AlertRecord) -> StateResult<()> {
        self.append(ALERTS, &record.service, record.timestamp, record)
    }

    /// Most recent alert records for a service, newest first.
    pub fn latest_alerts(&self, service: &str, limit: usize) -> StateResult<Vec<AlertRecord>> {
        self.scan(ALERTS, service, 0, u64::MAX - 1, true, limit, |_| true)
    }

    // ── Alert state ────────────────────────────────────────────────

    /// Load the alert state document (empty if never written).
    pub fn load_alert_state(&self) -> StateResult<AlertStateDocument> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALERT_STATE).map_err(map_err!(Table))?;
        match table.get(ALERT_STATE_KEY).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(AlertStateDocument::default()),
        }
    }

    /// Replace the alert state document.
    pub fn save_alert_state(&self, doc: &AlertStateDocument) -> StateResult<()> {
        self.update_alert_state(|current| *current = doc.clone())
    }

    /// Read, modify and persist the alert state document in one write
    /// transaction. Concurrent writers are serialized by redb.
    pub fn update_alert_state<R>(
        &self,
        f: impl FnOnce(&mut AlertStateDocument) -> R,
    ) -> StateResult<R> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result;
        {
            let mut table = txn.open_table(ALERT_STATE).map_err(map_err!(Table))?;
            let mut doc: AlertStateDocument = match table.get(ALERT_STATE_KEY).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => AlertStateDocument::default(),
            };
            result = f(&mut doc);
            let value = serde_json::to_vec(&doc).map_err(map_err!(Serialize))?;
            table
                .insert(ALERT_STATE_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(result)
    }

    // ── Certificates ───────────────────────────────────────────────

    /// Replace the certificate status for a service.
    pub fn put_certificate(&self, status: &CertificateStatus) -> StateResult<()> {
        let value = serde_json::to_vec(status).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CERTIFICATES).map_err(map_err!(Table))?;
            table
                .insert(status.service.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_certificate(&self, service: &str) -> StateResult<Option<CertificateStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CERTIFICATES).map_err(map_err!(Table))?;
        match table.get(service).map_err(map_err!(Read))? {
            Some(guard) => {
                let status = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    pub fn list_certificates(&self) -> StateResult<Vec<CertificateStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CERTIFICATES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let status: CertificateStatus =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(status);
        }
        Ok(results)
    }

    // ── Time series ────────────────────────────────────────────────

    fn append<T: Serialize>(
        &self,
        table: SeriesTable,
        service: &str,
        timestamp: u64,
        record: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        insert_series(&txn, table, service, timestamp, &value)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Delete samples, events and alert records older than `cutoff`.
    ///
    /// The latest-event index is kept, so an old unresolved failure still
    /// counts as downtime. Returns the number of records removed.
    pub fn prune_before(&self, cutoff: u64) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0;
        for definition in [SAMPLES, EVENTS, ALERTS] {
            let mut table = txn.open_table(definition).map_err(map_err!(Table))?;
            let mut stale = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key_timestamp(key.value()).is_some_and(|ts| ts < cutoff) {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed += stale.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if removed > 0 {
            debug!(removed, cutoff, "pruned old records");
        }
        Ok(removed)
    }

    #[allow(clippy::too_many_arguments)]
    fn scan<T: DeserializeOwned>(
        &self,
        table: SeriesTable,
        service: &str,
        from: u64,
        to: u64,
        newest_first: bool,
        limit: usize,
        keep: impl Fn(&T) -> bool,
    ) -> StateResult<Vec<T>> {
        let start = format!("{service}:{from:020}:");
        let end = format!("{service}:{:020}:", to.saturating_add(1));
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let series = txn.open_table(table).map_err(map_err!(Table))?;
        let range = series
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?;
        if newest_first {
            collect_records(range.rev(), limit, keep)
        } else {
            collect_records(range, limit, keep)
        }
    }
}

/// Insert into a time-series table under the next store-wide sequence.
fn insert_series(
    txn: &redb::WriteTransaction,
    table: SeriesTable,
    service: &str,
    timestamp: u64,
    value: &[u8],
) -> StateResult<()> {
    let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
    let seq = meta
        .get(SEQ_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0)
        + 1;
    meta.insert(SEQ_KEY, seq).map_err(map_err!(Write))?;

    let key = series_key(service, timestamp, seq);
    let mut series = txn.open_table(table).map_err(map_err!(Table))?;
    series.insert(key.as_str(), value).map_err(map_err!(Write))?;
    Ok(())
}

fn series_key(service: &str, timestamp: u64, seq: u64) -> String {
    format!("{service}:{timestamp:020}:{seq:020}")
}

/// Timestamp field of a series key. Parsed from the right, since service
/// ids may themselves contain `:`.
fn key_timestamp(key: &str) -> Option<u64> {
    key.rsplitn(3, ':').nth(1)?.parse().ok()
}

/// Point `key` at `event` unless the index already holds a later one.
fn index_if_newer(
    latest: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    event: &ServiceEvent,
    value: &[u8],
) -> StateResult<()> {
    let current: Option<ServiceEvent> = match latest.get(key).map_err(map_err!(Read))? {
        Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
        None => None,
    };
    if current.is_none_or(|current| current.timestamp <= event.timestamp) {
        latest.insert(key, value).map_err(map_err!(Write))?;
    }
    Ok(())
}

fn index_key(service: &str, kind: &str) -> String {
    format!("{service}:{kind}")
}

fn collect_records<'a, T: DeserializeOwned>(
    entries: impl Iterator<Item = SeriesEntry<'a>>,
    limit: usize,
    keep: impl Fn(&T) -> bool,
) -> StateResult<Vec<T>> {
    let mut results = Vec::new();
    for entry in entries {
        if results.len() >= limit {
            break;
        }
        let (_, value) = entry.map_err(map_err!(Read))?;
        let record: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if keep(&record) {
            results.push(record);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::EscalationLevel;

    const T0: u64 = 1_792_418_400;

    fn sample(service: &str, timestamp: u64, healthy: bool) -> HealthSample {
        HealthSample {
            service: service.to_string(),
            timestamp,
            port_listening: healthy,
            process_running: true,
            http_responding: healthy,
            response_time_ms: Some(5),
            status_code: healthy.then_some(200),
            error: (!healthy).then(|| "connection refused".to_string()),
        }
    }

    fn event(service: &str, kind: EventType, timestamp: u64) -> ServiceEvent {
        ServiceEvent::new(service, kind, timestamp, kind.as_str())
    }

    // ── Samples ────────────────────────────────────────────────────

    #[test]
    fn samples_latest_first_and_limited() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.append_sample(&sample("api", T0 + i * 60, i % 2 == 0)).unwrap();
        }
        store.append_sample(&sample("web", T0, true)).unwrap();

        let latest = store.latest_samples("api", 2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].timestamp, T0 + 240);
        assert_eq!(latest[1].timestamp, T0 + 180);

        assert_eq!(store.latest_sample("web").unwrap().unwrap().timestamp, T0);
        assert!(store.latest_sample("nope").unwrap().is_none());
    }

    #[test]
    fn samples_between_is_inclusive_and_ordered() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.append_sample(&sample("api", T0 + i * 60, true)).unwrap();
        }
        let window = store.samples_between("api", T0 + 60, T0 + 180).unwrap();
        let stamps: Vec<u64> = window.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![T0 + 60, T0 + 120, T0 + 180]);
    }

    #[test]
    fn same_second_records_are_all_kept() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_event(&event("api", EventType::Failure, T0)).unwrap();
        store.append_event(&event("api", EventType::RestartSkipped, T0)).unwrap();

        let events = store.latest_events("api", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventType::RestartSkipped);
    }

    #[test]
    fn service_ids_sharing_a_prefix_do_not_mix() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_sample(&sample("api", T0, true)).unwrap();
        store.append_sample(&sample("api-v2", T0, true)).unwrap();
        store.append_sample(&sample("api_old", T0, true)).unwrap();
        assert_eq!(store.latest_samples("api", 10).unwrap().len(), 1);
    }

    // ── Events ─────────────────────────────────────────────────────

    #[test]
    fn latest_event_of_type() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_event(&event("api", EventType::Failure, T0)).unwrap();
        store.append_event(&event("api", EventType::RestartAttempt, T0 + 300)).unwrap();
        store.append_event(&event("api", EventType::RestartFailed, T0 + 330)).unwrap();

        let found = store.latest_event_of_type("api", EventType::Failure).unwrap().unwrap();
        assert_eq!(found.timestamp, T0);
        assert!(store.latest_event_of_type("api", EventType::Recovery).unwrap().is_none());
    }

    #[test]
    fn unresolved_failure_cleared_by_recovery() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.unresolved_failure("api").unwrap().is_none());

        store
            .append_event(&ServiceEvent::transition("api", T0, HealthState::Healthy, HealthState::Unhealthy))
            .unwrap();
        store.append_event(&event("api", EventType::RestartSkipped, T0 + 10)).unwrap();
        assert_eq!(store.unresolved_failure("api").unwrap().unwrap().timestamp, T0);

        store
            .append_event(&ServiceEvent::transition("api", T0 + 600, HealthState::Unhealthy, HealthState::Healthy))
            .unwrap();
        assert!(store.unresolved_failure("api").unwrap().is_none());
        assert_eq!(
            store.last_transition("api").unwrap().unwrap().kind,
            EventType::Recovery
        );
    }

    #[test]
    fn late_arriving_event_does_not_replace_newer_index_entry() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_event(&event("api", EventType::Recovery, T0 + 600)).unwrap();
        store.append_event(&event("api", EventType::Failure, T0)).unwrap();

        assert_eq!(store.last_transition("api").unwrap().unwrap().kind, EventType::Recovery);
        assert!(store.unresolved_failure("api").unwrap().is_none());
        assert_eq!(
            store.latest_event_of_type("api", EventType::Failure).unwrap().unwrap().timestamp,
            T0
        );
    }

    #[test]
    fn prune_before_drops_old_records_only() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_sample(&sample("api", T0, false)).unwrap();
        store.append_sample(&sample("api", T0 + DAY_SECS, true)).unwrap();
        store.append_event(&event("api", EventType::RestartFailed, T0)).unwrap();
        store
            .append_alert(&AlertRecord {
                service: "api".to_string(),
                escalation_level: EscalationLevel::Critical,
                downtime_minutes: 5,
                sent: true,
                timestamp: T0,
            })
            .unwrap();
        store.append_sample(&sample("ns:api", T0, true)).unwrap();

        assert_eq!(store.prune_before(T0 + 1).unwrap(), 4);

        let samples = store.latest_samples("api", 10).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, T0 + DAY_SECS);
        assert!(store.latest_events("api", 10).unwrap().is_empty());
        assert!(store.latest_alerts("api", 10).unwrap().is_empty());
        assert!(store.latest_sample("ns:api").unwrap().is_none());
        assert_eq!(store.prune_before(T0 + 1).unwrap(), 0);
    }

    #[test]
    fn unresolved_failure_survives_pruning() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .append_event(&ServiceEvent::transition("api", T0, HealthState::Healthy, HealthState::Unhealthy))
            .unwrap();
        store.prune_before(T0 + 90 * DAY_SECS).unwrap();

        assert!(store.latest_events("api", 10).unwrap().is_empty());
        assert_eq!(store.unresolved_failure("api").unwrap().unwrap().timestamp, T0);
    }

    #[test]
    fn failure_history_counts_failure_class_in_window() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_event(&event("api", EventType::Failure, T0 - DAY_SECS - 1)).unwrap();
        store.append_event(&event("api", EventType::Failure, T0 + 10)).unwrap();
        store.append_event(&event("api", EventType::RestartSkipped, T0 + 20)).unwrap();
        store.append_event(&event("api", EventType::RestartAttempt, T0 + 400)).unwrap();
        store.append_event(&event("api", EventType::RestartFailed, T0 + 430)).unwrap();

        let now = T0 + 500;
        let history = store.failure_history("api", now - DAY_SECS, now).unwrap();
        assert_eq!(history.failure_count, 2);
        assert_eq!(history.first_failure, Some(T0 + 10));
        assert_eq!(history.last_failure, Some(T0 + 400));

        let empty = store.failure_history("web", now - DAY_SECS, now).unwrap();
        assert_eq!(empty, FailureHistory::default());
    }

    // ── Alerts ─────────────────────────────────────────────────────

    #[test]
    fn alert_records_append() {
        let store = StateStore::open_in_memory().unwrap();
        let record = AlertRecord {
            service: "api".to_string(),
            escalation_level: EscalationLevel::Critical,
            downtime_minutes: 16,
            sent: false,
            timestamp: T0,
        };
        store.append_alert(&record).unwrap();
        assert_eq!(store.latest_alerts("api", 5).unwrap(), vec![record]);
    }

    #[test]
    fn alert_state_defaults_then_updates() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.load_alert_state().unwrap(), AlertStateDocument::default());

        let total = store
            .update_alert_state(|doc| {
                doc.service_mut("api").record_alert(T0, EscalationLevel::Critical);
                doc.service_mut("api").silence_until(T0 + 4 * 3600);
                doc.total_sent += 1;
                doc.total_sent
            })
            .unwrap();
        assert_eq!(total, 1);

        let doc = store.load_alert_state().unwrap();
        let api = doc.service("api").unwrap();
        assert_eq!(api.silenced_until, Some(T0 + 4 * 3600));
        assert_eq!(api.count_in_hour(T0), 1);
    }

    // ── Certificates ───────────────────────────────────────────────

    #[test]
    fn certificate_status_is_replaced() {
        let store = StateStore::open_in_memory().unwrap();
        let mut status = CertificateStatus {
            service: "api".to_string(),
            domain: "api.example.com".to_string(),
            expires_at: (T0 + 40 * 86_400) as i64,
            days_remaining: 40,
            checked_at: T0,
        };
        store.put_certificate(&status).unwrap();
        status.days_remaining = 39;
        store.put_certificate(&status).unwrap();

        assert_eq!(store.get_certificate("api").unwrap(), Some(status));
        assert_eq!(store.list_certificates().unwrap().len(), 1);
        assert!(store.get_certificate("web").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("warden.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.append_event(&event("api", EventType::Failure, T0)).unwrap();
            store
                .update_alert_state(|doc| doc.service_mut("api").silence_until(T0 + 3600))
                .unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.latest_events("api", 10).unwrap().len(), 1);
        let doc = store.load_alert_state().unwrap();
        assert_eq!(doc.service("api").unwrap().silenced_until, Some(T0 + 3600));

        // Sequence numbers continue after reopen.
        store.append_event(&event("api", EventType::RestartAttempt, T0)).unwrap();
        assert_eq!(store.latest_events("api", 10).unwrap().len(), 2);
    }
}
