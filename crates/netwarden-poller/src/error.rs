use thiserror::Error;

use netwarden_state::{DeviceId, StateError};

/// Why a whole poll cycle could not run.
///
/// Per-metric failures are not errors; they are listed in the
/// [`PollReport`](crate::PollReport).
#[derive(Debug, Error)]
pub enum PollError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error(transparent)]
    Storage(#[from] StateError),
}
