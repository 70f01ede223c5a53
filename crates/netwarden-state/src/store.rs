//! StateStore — redb-backed persistence for the netwarden inventory.
//!
//! Reads open their own read transaction and see a consistent
//! snapshot. Writes go through [`StateStore::write`]; the single-row
//! helpers below are thin wrappers around it. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::txn::{StoreTxn, get_json, scan_json};
use crate::types::*;

/// Thread-safe inventory store backed by redb.
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
        debug!(?path, "inventory store opened");
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
        debug!("in-memory inventory store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for def in [DEVICES, METRICS, CATALOG, TEMPLATES, REQUESTS, ALERTS, LATEST_READINGS] {
            txn.open_table(def).map_err(map_err!(Table))?;
        }
        txn.open_table(READINGS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `f` inside one write transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; on `Err` every
    /// change made through the [`StoreTxn`] is discarded.
    pub fn write<T, E>(&self, f: impl FnOnce(&StoreTxn<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StateError>,
    {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| E::from(StateError::Transaction(e.to_string())))?;
        let outcome = f(&StoreTxn::new(&txn));
        match outcome {
            Ok(value) => {
                txn.commit()
                    .map_err(|e| E::from(StateError::Transaction(e.to_string())))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    fn read_one<T: DeserializeOwned>(&self, def: IdTable, id: u64) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        get_json(&table, id)
    }

    fn read_all<T: DeserializeOwned>(&self, def: IdTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        scan_json(&table)
    }

    /// Newest rows of an id-keyed table first, optionally filtered.
    fn read_newest<T: DeserializeOwned>(
        &self,
        def: IdTable,
        limit: usize,
        keep: impl Fn(&T) -> bool,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&row) {
                results.push(row);
            }
        }
        Ok(results)
    }

    // ── Devices ────────────────────────────────────────────────────

    pub fn list_devices(&self) -> StateResult<Vec<Device>> {
        self.read_all(DEVICES)
    }

    pub fn get_device(&self, id: DeviceId) -> StateResult<Option<Device>> {
        self.read_one(DEVICES, id)
    }

    /// Delete a device and all of its metrics. Returns true if it existed.
    pub fn delete_device(&self, id: DeviceId) -> StateResult<bool> {
        self.write(|tx| Ok(tx.delete_device(id)?.is_some()))
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Metrics owned by a device, in id order.
    pub fn list_metrics(&self, device_id: DeviceId) -> StateResult<Vec<Metric>> {
        let mut metrics: Vec<Metric> = self.read_all(METRICS)?;
        metrics.retain(|m| m.device_id == device_id);
        Ok(metrics)
    }

    pub fn get_metric(&self, id: MetricId) -> StateResult<Option<Metric>> {
        self.read_one(METRICS, id)
    }

    pub fn delete_metric(&self, id: MetricId) -> StateResult<bool> {
        self.write(|tx| tx.delete_metric(id))
    }

    // ── Catalog & templates ────────────────────────────────────────

    pub fn get_catalog_entry(&self, id: CatalogEntryId) -> StateResult<Option<CatalogEntry>> {
        self.read_one(CATALOG, id)
    }

    pub fn list_catalog_entries(&self) -> StateResult<Vec<CatalogEntry>> {
        self.read_all(CATALOG)
    }

    pub fn set_catalog_entry_status(
        &self,
        id: CatalogEntryId,
        status: ReviewStatus,
    ) -> StateResult<CatalogEntry> {
        self.write(|tx| tx.set_catalog_entry_status(id, status))
    }

    pub fn get_template(&self, id: TemplateId) -> StateResult<Option<Template>> {
        self.read_one(TEMPLATES, id)
    }

    pub fn list_templates(&self) -> StateResult<Vec<Template>> {
        self.read_all(TEMPLATES)
    }

    // ── Change requests ────────────────────────────────────────────

    pub fn get_request(&self, id: RequestId) -> StateResult<Option<ChangeRequest>> {
        self.read_one(REQUESTS, id)
    }

    pub fn list_requests(&self) -> StateResult<Vec<ChangeRequest>> {
        self.read_all(REQUESTS)
    }

    pub fn pending_requests(&self) -> StateResult<Vec<ChangeRequest>> {
        let mut requests = self.list_requests()?;
        requests.retain(|r| r.status == ReviewStatus::Pending);
        Ok(requests)
    }

    pub fn set_request_status(
        &self,
        id: RequestId,
        status: ReviewStatus,
        resolved_by: &str,
        at: u64,
    ) -> StateResult<ChangeRequest> {
        self.write(|tx| tx.set_request_status(id, status, resolved_by, at))
    }

    // ── Readings ───────────────────────────────────────────────────

    pub fn insert_reading(
        &self,
        device_id: DeviceId,
        metric_id: MetricId,
        value: f64,
        at: u64,
    ) -> StateResult<Reading> {
        self.write(|tx| tx.insert_reading(device_id, metric_id, value, at))
    }

    /// Latest reading of every metric, optionally restricted to one device.
    pub fn latest_readings(&self, device_id: Option<DeviceId>) -> StateResult<Vec<Reading>> {
        let mut readings: Vec<Reading> = self.read_all(LATEST_READINGS)?;
        if let Some(device_id) = device_id {
            readings.retain(|r| r.device_id == device_id);
        }
        Ok(readings)
    }

    /// Reading history of one metric, newest first.
    pub fn readings_for_metric(&self, metric_id: MetricId, limit: usize) -> StateResult<Vec<Reading>> {
        let (start, end) = reading_range(metric_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(READINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let reading: Reading =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(reading);
        }
        Ok(results)
    }

    // ── Alert events ───────────────────────────────────────────────

    pub fn insert_alert_event(&self, event: &NewAlertEvent) -> StateResult<AlertEvent> {
        self.write(|tx| tx.insert_alert_event(event))
    }

    /// Most recent alert events first, optionally for a single device.
    pub fn recent_alert_events(
        &self,
        device_id: Option<DeviceId>,
        limit: usize,
    ) -> StateResult<Vec<AlertEvent>> {
        self.read_newest(ALERTS, limit, |e: &AlertEvent| {
            device_id.is_none_or(|id| e.device_id == id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_draft(name: &str) -> DeviceDraft {
        DeviceDraft {
            name: name.to_string(),
            address: "192.0.2.10".to_string(),
            community: "public".to_string(),
            interval_secs: 30,
        }
    }

    fn metric_draft(device_id: DeviceId, oid: &str) -> MetricDraft {
        MetricDraft {
            device_id,
            oid: oid.to_string(),
            name: format!("metric {oid}"),
            value_type: ValueType::Gauge,
            thresholds: Thresholds::default(),
            alerting_enabled: true,
            catalog_entry_id: None,
        }
    }

    fn seed_device(store: &StateStore, metrics: usize) -> (Device, Vec<Metric>) {
        store
            .write(|tx| {
                let device = tx.create_device(&test_draft("core-sw"), 1000)?;
                let metrics = (0..metrics)
                    .map(|i| tx.create_metric(&metric_draft(device.id, &format!("1.3.6.1.2.1.2.2.1.10.{i}")), 1000))
                    .collect::<StateResult<Vec<_>>>()?;
                Ok::<_, StateError>((device, metrics))
            })
            .unwrap()
    }

    // ── Device CRUD ────────────────────────────────────────────────

    #[test]
    fn device_create_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let (device, _) = seed_device(&store, 0);

        assert_eq!(device.id, 1);
        assert_eq!(store.get_device(device.id).unwrap(), Some(device));
    }

    #[test]
    fn ids_are_sequential_per_table() {
        let store = StateStore::open_in_memory().unwrap();
        let (a, _) = seed_device(&store, 2);
        let (b, metrics) = seed_device(&store, 1);

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(metrics[0].id, 3);
        assert_eq!(store.list_devices().unwrap().len(), 2);
    }

    #[test]
    fn device_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let (device, _) = seed_device(&store, 0);

        let mut draft = test_draft("edge-sw");
        draft.interval_secs = 5;
        let updated = store
            .write(|tx| tx.update_device(device.id, &draft, 2000))
            .unwrap();

        assert_eq!(updated.name, "edge-sw");
        assert_eq!(updated.interval_secs, 5);
        assert_eq!(updated.created_at, 1000);
        assert_eq!(updated.updated_at, 2000);
    }

    #[test]
    fn update_missing_device_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.write(|tx| tx.update_device(42, &test_draft("x"), 1));
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    #[test]
    fn device_delete_cascades_to_metrics() {
        let store = StateStore::open_in_memory().unwrap();
        let (device, metrics) = seed_device(&store, 3);
        let (other, _) = seed_device(&store, 1);

        assert_eq!(store.list_metrics(device.id).unwrap().len(), 3);
        assert!(store.delete_device(device.id).unwrap());

        assert!(store.get_device(device.id).unwrap().is_none());
        assert!(store.list_metrics(device.id).unwrap().is_empty());
        for metric in &metrics {
            assert!(store.get_metric(metric.id).unwrap().is_none());
        }
        assert_eq!(store.list_metrics(other.id).unwrap().len(), 1);
        assert!(!store.delete_device(device.id).unwrap());
    }

    #[test]
    fn metric_requires_existing_device() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.write(|tx| tx.create_metric(&metric_draft(9, "1.3.6.1"), 1));
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn failed_write_rolls_back_every_change() {
        let store = StateStore::open_in_memory().unwrap();
        let (device, metrics) = seed_device(&store, 2);

        let result: StateResult<()> = store.write(|tx| {
            tx.delete_metric(metrics[0].id)?;
            Err(StateError::Write("injected".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.list_metrics(device.id).unwrap().len(), 2);
    }

    #[test]
    fn sequence_is_not_consumed_by_aborted_write() {
        let store = StateStore::open_in_memory().unwrap();
        let _: StateResult<()> = store.write(|tx| {
            tx.create_device(&test_draft("ghost"), 1)?;
            Err(StateError::Write("injected".to_string()))
        });
        let (device, _) = seed_device(&store, 0);
        assert_eq!(device.id, 1);
    }

    // ── Change requests ────────────────────────────────────────────

    #[test]
    fn request_lifecycle_fields() {
        let store = StateStore::open_in_memory().unwrap();
        let request = store
            .write(|tx| {
                tx.create_request(
                    "alice",
                    ChangeAction::DeleteDevice { device_id: 3 },
                    Some("decommissioned".to_string()),
                    1000,
                )
            })
            .unwrap();
        assert_eq!(store.pending_requests().unwrap(), vec![request.clone()]);

        let resolved = store
            .set_request_status(request.id, ReviewStatus::Rejected, "admin", 2000)
            .unwrap();
        assert_eq!(resolved.status, ReviewStatus::Rejected);
        assert_eq!(resolved.resolved_by.as_deref(), Some("admin"));
        assert_eq!(resolved.resolved_at, Some(2000));
        assert!(store.pending_requests().unwrap().is_empty());
    }

    // ── Readings ───────────────────────────────────────────────────

    #[test]
    fn readings_history_is_newest_first_and_scoped_to_metric() {
        let store = StateStore::open_in_memory().unwrap();
        let (device, metrics) = seed_device(&store, 2);

        for (i, at) in [1000u64, 2000, 3000].into_iter().enumerate() {
            store
                .insert_reading(device.id, metrics[0].id, i as f64, at)
                .unwrap();
        }
        store
            .insert_reading(device.id, metrics[1].id, 99.0, 1500)
            .unwrap();

        let history = store.readings_for_metric(metrics[0].id, 10).unwrap();
        let stamps: Vec<u64> = history.iter().map(|r| r.at).collect();
        assert_eq!(stamps, vec![3000, 2000, 1000]);

        let limited = store.readings_for_metric(metrics[0].id, 2).unwrap();
        assert_eq!(limited.len(), 2);

        let latest = store.latest_readings(Some(device.id)).unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().any(|r| r.metric_id == metrics[0].id && r.value == 2.0));
    }

    #[test]
    fn reading_for_deleted_metric_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let (device, metrics) = seed_device(&store, 1);
        store.insert_reading(device.id, metrics[0].id, 1.0, 1000).unwrap();

        assert!(store.delete_metric(metrics[0].id).unwrap());
        let result = store.insert_reading(device.id, metrics[0].id, 2.0, 2000);

        assert!(matches!(result, Err(StateError::MetricDetached { .. })));
        assert!(store.latest_readings(None).unwrap().is_empty());
        // History is retained.
        assert_eq!(store.readings_for_metric(metrics[0].id, 10).unwrap().len(), 1);
    }

    #[test]
    fn reading_for_wrong_device_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let (_, metrics) = seed_device(&store, 1);
        let (other, _) = seed_device(&store, 0);

        let result = store.insert_reading(other.id, metrics[0].id, 1.0, 1000);
        assert!(matches!(result, Err(StateError::MetricDetached { .. })));
    }

    // ── Alert events ───────────────────────────────────────────────

    #[test]
    fn alert_events_newest_first_with_device_filter() {
        let store = StateStore::open_in_memory().unwrap();
        for (device_id, at) in [(1u64, 1000u64), (2, 2000), (1, 3000)] {
            store
                .insert_alert_event(&NewAlertEvent {
                    device_id,
                    metric_id: 10,
                    kind: AlertKind::AboveMax,
                    severity: Severity::Critical,
                    value: 120.0,
                    threshold: 100.0,
                    message: "too hot".to_string(),
                    at,
                })
                .unwrap();
        }

        let all = store.recent_alert_events(None, 10).unwrap();
        assert_eq!(all.iter().map(|e| e.at).collect::<Vec<_>>(), vec![3000, 2000, 1000]);

        let device1 = store.recent_alert_events(Some(1), 10).unwrap();
        assert_eq!(device1.len(), 2);

        let limited = store.recent_alert_events(None, 1).unwrap();
        assert_eq!(limited[0].at, 3000);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            seed_device(&store, 1);
        }

        let store = StateStore::open(&db_path).unwrap();
        let devices = store.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(store.list_metrics(devices[0].id).unwrap().len(), 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_devices().unwrap().is_empty());
        assert!(store.list_metrics(1).unwrap().is_empty());
        assert!(store.pending_requests().unwrap().is_empty());
        assert!(store.readings_for_metric(1, 10).unwrap().is_empty());
        assert!(store.recent_alert_events(None, 10).unwrap().is_empty());
        assert!(!store.delete_device(1).unwrap());
        assert!(!store.delete_metric(1).unwrap());
    }
}
