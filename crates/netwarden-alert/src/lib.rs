//! netwarden-alert — threshold evaluation for polled readings.
//!
//! A pure function from `(metric, value)` to zero or one [`Breach`].
//! Persisting the resulting alert event is the caller's job.
//!
//! # Policy
//!
//! ```text
//! max set     and value > max      => AboveMax      CRITICAL
//! warning set and value > warning  => AboveWarning  WARNING
//! min set     and value < min      => BelowMin      LOW
//! otherwise                        => no alert
//! ```
//!
//! First match wins, so a value above both `warning` and `max` is
//! reported once, as `AboveMax`. Comparisons are strict: a value equal
//! to a threshold never alerts. Absent thresholds are skipped, never
//! read as zero.

pub mod error;
pub mod evaluator;

pub use error::EvaluationError;
pub use evaluator::{Breach, evaluate};
