//! Inventory store errors.

use thiserror::Error;

use crate::types::{DeviceId, MetricId};

pub type StateResult<T> = Result<T, StateError>;

/// redb failures are flattened to strings; the variant says which step failed.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open inventory store: {0}")]
    Open(String),

    #[error("inventory transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open table: {0}")]
    Table(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("corrupt record: {0}")]
    Deserialize(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A reading arrived for a metric that was deleted or moved while
    /// it was being fetched.
    #[error("metric {metric_id} is no longer attached to device {device_id}")]
    MetricDetached { metric_id: MetricId, device_id: DeviceId },
}
