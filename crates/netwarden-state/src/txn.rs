//! StoreTxn — typed operations inside a single redb write transaction.
//!
//! Everything done through one `StoreTxn` commits or aborts together.
//! Obtain one via [`StateStore::write`](crate::StateStore::write).

use redb::{ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Decode one JSON row from any id-keyed table.
pub(crate) fn get_json<T, R>(table: &R, id: u64) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => {
            let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Decode every row of an id-keyed table, in id order.
pub(crate) fn scan_json<T, R>(table: &R) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
    }
    Ok(results)
}

/// A write transaction in progress.
pub struct StoreTxn<'a> {
    txn: &'a WriteTransaction,
}

impl<'a> StoreTxn<'a> {
    pub(crate) fn new(txn: &'a WriteTransaction) -> Self {
        Self { txn }
    }

    fn get<T: DeserializeOwned>(&self, def: IdTable, id: u64) -> StateResult<Option<T>> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        get_json(&table, id)
    }

    fn scan<T: DeserializeOwned>(&self, def: IdTable) -> StateResult<Vec<T>> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        scan_json(&table)
    }

    fn put<T: Serialize>(&self, def: IdTable, id: u64, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        table
            .insert(id, bytes.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    fn remove(&self, def: IdTable, id: u64) -> StateResult<bool> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        let existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        Ok(existed)
    }

    /// Allocate the next id from a named sequence (first id is 1).
    pub fn next_id(&self, sequence: &str) -> StateResult<u64> {
        let mut table = self.txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        let current = table
            .get(sequence)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(sequence, next).map_err(map_err!(Write))?;
        Ok(next)
    }

    // ── Devices ────────────────────────────────────────────────────

    pub fn create_device(&self, draft: &DeviceDraft, at: u64) -> StateResult<Device> {
        let device = Device {
            id: self.next_id("devices")?,
            name: draft.name.clone(),
            address: draft.address.clone(),
            community: draft.community.clone(),
            interval_secs: draft.interval_secs,
            created_at: at,
            updated_at: at,
        };
        self.put(DEVICES, device.id, &device)?;
        debug!(device_id = device.id, name = %device.name, "device stored");
        Ok(device)
    }

    pub fn get_device(&self, id: DeviceId) -> StateResult<Option<Device>> {
        self.get(DEVICES, id)
    }

    pub fn list_devices(&self) -> StateResult<Vec<Device>> {
        self.scan(DEVICES)
    }

    /// Overwrite the editable fields of an existing device.
    pub fn update_device(&self, id: DeviceId, draft: &DeviceDraft, at: u64) -> StateResult<Device> {
        let mut device = self
            .get_device(id)?
            .ok_or_else(|| StateError::NotFound(format!("device {id}")))?;
        device.name = draft.name.clone();
        device.address = draft.address.clone();
        device.community = draft.community.clone();
        device.interval_secs = draft.interval_secs;
        device.updated_at = at;
        self.put(DEVICES, id, &device)?;
        Ok(device)
    }

    /// Delete every metric owned by the device, then the device itself.
    ///
    /// Returns the ids of the removed metrics, or `None` if the device
    /// did not exist.
    pub fn delete_device(&self, id: DeviceId) -> StateResult<Option<Vec<MetricId>>> {
        if self.get_device(id)?.is_none() {
            return Ok(None);
        }
        let mut removed = Vec::new();
        for metric in self.list_metrics(id)? {
            self.delete_metric(metric.id)?;
            removed.push(metric.id);
        }
        self.remove(DEVICES, id)?;
        debug!(device_id = id, metrics = removed.len(), "device deleted");
        Ok(Some(removed))
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Attach a metric to an existing device.
    pub fn create_metric(&self, draft: &MetricDraft, at: u64) -> StateResult<Metric> {
        if self.get_device(draft.device_id)?.is_none() {
            return Err(StateError::NotFound(format!("device {}", draft.device_id)));
        }
        let metric = Metric {
            id: self.next_id("metrics")?,
            device_id: draft.device_id,
            oid: draft.oid.clone(),
            name: draft.name.clone(),
            value_type: draft.value_type,
            thresholds: draft.thresholds,
            alerting_enabled: draft.alerting_enabled,
            catalog_entry_id: draft.catalog_entry_id,
            created_at: at,
        };
        self.put(METRICS, metric.id, &metric)?;
        debug!(metric_id = metric.id, device_id = metric.device_id, oid = %metric.oid, "metric stored");
        Ok(metric)
    }

    pub fn get_metric(&self, id: MetricId) -> StateResult<Option<Metric>> {
        self.get(METRICS, id)
    }

    pub fn put_metric(&self, metric: &Metric) -> StateResult<()> {
        self.put(METRICS, metric.id, metric)
    }

    pub fn list_metrics(&self, device_id: DeviceId) -> StateResult<Vec<Metric>> {
        let mut metrics: Vec<Metric> = self.scan(METRICS)?;
        metrics.retain(|m| m.device_id == device_id);
        Ok(metrics)
    }

    /// Delete a metric and its latest-reading index entry. Reading
    /// history is kept. Returns true if the metric existed.
    pub fn delete_metric(&self, id: MetricId) -> StateResult<bool> {
        let existed = self.remove(METRICS, id)?;
        self.remove(LATEST_READINGS, id)?;
        Ok(existed)
    }

    // ── Catalog ────────────────────────────────────────────────────

    pub fn create_catalog_entry(
        &self,
        draft: &CatalogDraft,
        proposed_by: &str,
        at: u64,
    ) -> StateResult<CatalogEntry> {
        let entry = CatalogEntry {
            id: self.next_id("catalog")?,
            oid: draft.oid.clone(),
            name: draft.name.clone(),
            value_type: draft.value_type,
            status: ReviewStatus::Pending,
            proposed_by: proposed_by.to_string(),
            created_at: at,
        };
        self.put(CATALOG, entry.id, &entry)?;
        Ok(entry)
    }

    pub fn get_catalog_entry(&self, id: CatalogEntryId) -> StateResult<Option<CatalogEntry>> {
        self.get(CATALOG, id)
    }

    pub fn set_catalog_entry_status(
        &self,
        id: CatalogEntryId,
        status: ReviewStatus,
    ) -> StateResult<CatalogEntry> {
        let mut entry = self
            .get_catalog_entry(id)?
            .ok_or_else(|| StateError::NotFound(format!("catalog entry {id}")))?;
        entry.status = status;
        self.put(CATALOG, id, &entry)?;
        Ok(entry)
    }

    // ── Templates ──────────────────────────────────────────────────

    pub fn create_template(
        &self,
        draft: &TemplateDraft,
        proposed_by: &str,
        at: u64,
    ) -> StateResult<Template> {
        let template = Template {
            id: self.next_id("templates")?,
            name: draft.name.clone(),
            entry_ids: draft.entry_ids.clone(),
            status: ReviewStatus::Pending,
            proposed_by: proposed_by.to_string(),
            created_at: at,
        };
        self.put(TEMPLATES, template.id, &template)?;
        Ok(template)
    }

    pub fn get_template(&self, id: TemplateId) -> StateResult<Option<Template>> {
        self.get(TEMPLATES, id)
    }

    pub fn set_template_status(&self, id: TemplateId, status: ReviewStatus) -> StateResult<Template> {
        let mut template = self
            .get_template(id)?
            .ok_or_else(|| StateError::NotFound(format!("template {id}")))?;
        template.status = status;
        self.put(TEMPLATES, id, &template)?;
        Ok(template)
    }

    // ── Change requests ────────────────────────────────────────────

    pub fn create_request(
        &self,
        requester: &str,
        action: ChangeAction,
        comment: Option<String>,
        at: u64,
    ) -> StateResult<ChangeRequest> {
        let request = ChangeRequest {
            id: self.next_id("requests")?,
            requester: requester.to_string(),
            action,
            status: ReviewStatus::Pending,
            comment,
            created_at: at,
            resolved_at: None,
            resolved_by: None,
        };
        self.put(REQUESTS, request.id, &request)?;
        Ok(request)
    }

    pub fn get_request(&self, id: RequestId) -> StateResult<Option<ChangeRequest>> {
        self.get(REQUESTS, id)
    }

    pub fn list_requests(&self) -> StateResult<Vec<ChangeRequest>> {
        self.scan(REQUESTS)
    }

    pub fn set_request_status(
        &self,
        id: RequestId,
        status: ReviewStatus,
        resolved_by: &str,
        at: u64,
    ) -> StateResult<ChangeRequest> {
        let mut request = self
            .get_request(id)?
            .ok_or_else(|| StateError::NotFound(format!("request {id}")))?;
        request.status = status;
        request.resolved_at = Some(at);
        request.resolved_by = Some(resolved_by.to_string());
        self.put(REQUESTS, id, &request)?;
        Ok(request)
    }

    // ── Facts ──────────────────────────────────────────────────────

    /// Append a reading and refresh the latest-reading index.
    ///
    /// Fails with `MetricDetached` if the metric no longer exists or
    /// belongs to another device, so a reading never outlives its metric.
    pub fn insert_reading(
        &self,
        device_id: DeviceId,
        metric_id: MetricId,
        value: f64,
        at: u64,
    ) -> StateResult<Reading> {
        match self.get_metric(metric_id)? {
            Some(metric) if metric.device_id == device_id => {}
            _ => return Err(StateError::MetricDetached { metric_id, device_id }),
        }
        let reading = Reading {
            device_id,
            metric_id,
            value,
            at,
        };
        let seq = self.next_id("readings")?;
        let bytes = serde_json::to_vec(&reading).map_err(map_err!(Serialize))?;
        {
            let mut table = self.txn.open_table(READINGS).map_err(map_err!(Table))?;
            let key = reading_key(metric_id, at, seq);
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        self.put(LATEST_READINGS, metric_id, &reading)?;
        Ok(reading)
    }

    pub fn insert_alert_event(&self, event: &NewAlertEvent) -> StateResult<AlertEvent> {
        let stored = AlertEvent {
            id: self.next_id("alerts")?,
            device_id: event.device_id,
            metric_id: event.metric_id,
            kind: event.kind,
            severity: event.severity,
            value: event.value,
            threshold: event.threshold,
            message: event.message.clone(),
            at: event.at,
        };
        self.put(ALERTS, stored.id, &stored)?;
        Ok(stored)
    }
}
