//! The value-fetch seam between the poller and the network.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Per-fetch timeout and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    /// Wait per attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
}

impl FetchBudget {
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retries: 1,
        }
    }
}

/// A value as returned by the agent, before numeric interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Integer(i64),
    /// Counter32, Gauge32, TimeTicks and Counter64.
    Unsigned(u64),
    Text(String),
    ObjectId(String),
    IpAddress(Ipv4Addr),
}

impl RawValue {
    /// Interpret the value as a finite floating-point number.
    ///
    /// Text is trimmed and parsed; identifiers and addresses never
    /// parse.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Integer(v) => *v as f64,
            RawValue::Unsigned(v) => *v as f64,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
            RawValue::ObjectId(_) | RawValue::IpAddress(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Integer(v) => write!(f, "{v}"),
            RawValue::Unsigned(v) => write!(f, "{v}"),
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::ObjectId(oid) => write!(f, "{oid}"),
            RawValue::IpAddress(ip) => write!(f, "{ip}"),
        }
    }
}

/// Fetches one value from one device.
///
/// Implementations own their timeout/retry handling; callers treat any
/// `Err` as a failed poll and never retry on their own.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn fetch_value(
        &self,
        address: &str,
        community: &str,
        oid: &str,
        budget: FetchBudget,
    ) -> Result<RawValue, ProtocolError>;
}
