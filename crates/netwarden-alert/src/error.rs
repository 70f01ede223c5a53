use thiserror::Error;

/// Inputs the evaluator refuses to compare.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EvaluationError {
    #[error("reading value {0} is not a finite number")]
    NonFiniteValue(f64),

    #[error("{field} threshold {value} is not a finite number")]
    NonFiniteThreshold { field: &'static str, value: f64 },
}
