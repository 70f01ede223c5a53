//! redb table definitions for the netwarden inventory store.
//!
//! Entity tables use `u64` keys and `&[u8]` values (JSON-serialized
//! domain types). Readings use `{metric_id}:{at}:{seq}` string keys,
//! each part zero-padded to 20 digits.

use redb::TableDefinition;

/// Shape shared by every id-keyed entity table.
pub type IdTable = TableDefinition<'static, u64, &'static [u8]>;

/// Devices keyed by device id.
pub const DEVICES: IdTable = TableDefinition::new("devices");

/// Metrics keyed by metric id.
pub const METRICS: IdTable = TableDefinition::new("metrics");

/// Metric catalog entries keyed by entry id.
pub const CATALOG: IdTable = TableDefinition::new("catalog");

/// Templates keyed by template id.
pub const TEMPLATES: IdTable = TableDefinition::new("templates");

/// Change requests keyed by request id.
pub const REQUESTS: IdTable = TableDefinition::new("requests");

/// Alert events keyed by event id (append-only).
pub const ALERTS: IdTable = TableDefinition::new("alerts");

/// Most recent reading per metric, keyed by metric id.
pub const LATEST_READINGS: IdTable = TableDefinition::new("latest_readings");

/// Reading history keyed by `{metric_id}:{at}:{seq}`.
pub const READINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("readings");

/// Id sequences keyed by sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Build the history key for a reading.
pub fn reading_key(metric_id: u64, at: u64, seq: u64) -> String {
    format!("{metric_id:020}:{at:020}:{seq:020}")
}

/// Half-open key range `[start, end)` covering every reading of a metric.
pub fn reading_range(metric_id: u64) -> (String, String) {
    // ';' sorts directly after ':'.
    (format!("{metric_id:020}:"), format!("{metric_id:020};"))
}
