//! Domain types for the netwarden inventory store.
//!
//! These types mirror the persisted tables: monitored devices and
//! their metrics, the reviewed metric catalog and templates, change
//! requests, and the append-only reading and alert event facts. All
//! timestamps are Unix epoch milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type DeviceId = u64;
pub type MetricId = u64;
pub type CatalogEntryId = u64;
pub type TemplateId = u64;
pub type RequestId = u64;
pub type AlertId = u64;

// ── Device ────────────────────────────────────────────────────────

/// A monitored network endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    /// `host` or `host:port`.
    pub address: String,
    /// SNMP community string.
    pub community: String,
    /// Seconds slept between poll cycles (>= 1).
    pub interval_secs: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Device {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Fields supplied when registering or editing a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceDraft {
    pub name: String,
    pub address: String,
    pub community: String,
    pub interval_secs: u64,
}

// ── Metric ────────────────────────────────────────────────────────

/// Declared type of a polled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Gauge,
    Counter,
    Float,
    Text,
}

/// Optional alert thresholds. Ordering between the three is not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// A single polled value attached to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    pub device_id: DeviceId,
    pub oid: String,
    pub name: String,
    pub value_type: ValueType,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub alerting_enabled: bool,
    /// Catalog entry this metric was attached from.
    pub catalog_entry_id: Option<CatalogEntryId>,
    pub created_at: u64,
}

/// Fields supplied when attaching a metric to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDraft {
    pub device_id: DeviceId,
    pub oid: String,
    pub name: String,
    pub value_type: ValueType,
    pub thresholds: Thresholds,
    pub alerting_enabled: bool,
    pub catalog_entry_id: Option<CatalogEntryId>,
}

// ── Review ────────────────────────────────────────────────────────

/// Review state shared by catalog entries, templates and change requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn is_resolved(self) -> bool {
        self != ReviewStatus::Pending
    }
}

/// A reusable metric definition awaiting or past administrator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogEntryId,
    pub oid: String,
    pub name: String,
    pub value_type: ValueType,
    pub status: ReviewStatus,
    pub proposed_by: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDraft {
    pub oid: String,
    pub name: String,
    pub value_type: ValueType,
}

/// A named bundle of catalog entries that can be applied to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub entry_ids: Vec<CatalogEntryId>,
    pub status: ReviewStatus,
    pub proposed_by: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub name: String,
    pub entry_ids: Vec<CatalogEntryId>,
}

// ── Facts ─────────────────────────────────────────────────────────

/// One timestamped numeric sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub value: f64,
    pub at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    BelowMin,
    AboveWarning,
    AboveMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Warning,
    Critical,
}

/// A reading that crossed a configured threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub at: u64,
}

/// An alert event before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlertEvent {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub at: u64,
}

// ── Change requests ───────────────────────────────────────────────

/// What a change request does once approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    NewMetricCatalogEntry { entry_id: CatalogEntryId },
    DeleteMetric { metric_id: MetricId },
    DeleteDevice { device_id: DeviceId },
    NewTemplate { template_id: TemplateId },
}

impl ChangeAction {
    /// Id of the record the action targets.
    pub fn target_id(&self) -> u64 {
        match *self {
            ChangeAction::NewMetricCatalogEntry { entry_id } => entry_id,
            ChangeAction::DeleteMetric { metric_id } => metric_id,
            ChangeAction::DeleteDevice { device_id } => device_id,
            ChangeAction::NewTemplate { template_id } => template_id,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            ChangeAction::DeleteMetric { .. } | ChangeAction::DeleteDevice { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChangeAction::NewMetricCatalogEntry { .. } => "NEW_METRIC_CATALOG_ENTRY",
            ChangeAction::DeleteMetric { .. } => "DELETE_METRIC",
            ChangeAction::DeleteDevice { .. } => "DELETE_DEVICE",
            ChangeAction::NewTemplate { .. } => "NEW_TEMPLATE",
        }
    }
}

/// A user-submitted proposal gated by administrator approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: RequestId,
    pub requester: String,
    pub action: ChangeAction,
    pub status: ReviewStatus,
    pub comment: Option<String>,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
    pub resolved_by: Option<String>,
}

/// Device-level consequence of an inventory mutation, used to keep
/// poll loops in step with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "device_id", rename_all = "snake_case")]
pub enum InventoryChange {
    DeviceAdded(DeviceId),
    DeviceUpdated(DeviceId),
    DeviceRemoved(DeviceId),
}

impl InventoryChange {
    pub fn device_id(&self) -> DeviceId {
        match *self {
            InventoryChange::DeviceAdded(id)
            | InventoryChange::DeviceUpdated(id)
            | InventoryChange::DeviceRemoved(id) => id,
        }
    }
}
