//! Protocol client errors.

use thiserror::Error;

/// Why a value fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Name resolution, socket or ICMP-level failure.
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// No matching response within the retry budget.
    #[error("no response after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// The agent answered, but not with a usable value.
    #[error("request rejected: {0}")]
    ProtocolRejected(String),
}
