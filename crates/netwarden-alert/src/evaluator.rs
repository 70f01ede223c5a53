//! Threshold evaluator.

use tracing::trace;

use netwarden_state::{AlertKind, Metric, NewAlertEvent, Severity, Thresholds};

use crate::error::EvaluationError;

/// A reading that crossed one of its metric's thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub kind: AlertKind,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
}

impl Breach {
    /// Human-readable alert text for `metric`.
    pub fn message(&self, metric: &Metric) -> String {
        let relation = match self.kind {
            AlertKind::AboveMax => "above max",
            AlertKind::AboveWarning => "above warning",
            AlertKind::BelowMin => "below min",
        };
        format!(
            "{} ({}) = {} is {relation} threshold {}",
            metric.name, metric.oid, self.value, self.threshold
        )
    }

    /// The alert event to persist for this breach.
    pub fn into_event(self, metric: &Metric, at: u64) -> NewAlertEvent {
        NewAlertEvent {
            device_id: metric.device_id,
            metric_id: metric.id,
            kind: self.kind,
            severity: self.severity,
            value: self.value,
            threshold: self.threshold,
            message: self.message(metric),
            at,
        }
    }
}

/// Evaluate one reading against a metric's thresholds.
///
/// Returns `Ok(None)` when nothing is crossed. A non-finite value or
/// threshold is an error and produces no alert.
pub fn evaluate(metric: &Metric, value: f64) -> Result<Option<Breach>, EvaluationError> {
    let breach = evaluate_thresholds(&metric.thresholds, value)?;
    if let Some(b) = &breach {
        trace!(metric_id = metric.id, kind = ?b.kind, value, threshold = b.threshold, "threshold crossed");
    }
    Ok(breach)
}

fn evaluate_thresholds(
    thresholds: &Thresholds,
    value: f64,
) -> Result<Option<Breach>, EvaluationError> {
    if !value.is_finite() {
        return Err(EvaluationError::NonFiniteValue(value));
    }
    let max = finite("max", thresholds.max)?;
    let warning = finite("warning", thresholds.warning)?;
    let min = finite("min", thresholds.min)?;

    let breach = |kind, severity, threshold| Breach {
        kind,
        severity,
        value,
        threshold,
    };

    if let Some(max) = max
        && value > max
    {
        return Ok(Some(breach(AlertKind::AboveMax, Severity::Critical, max)));
    }
    if let Some(warning) = warning
        && value > warning
    {
        return Ok(Some(breach(AlertKind::AboveWarning, Severity::Warning, warning)));
    }
    if let Some(min) = min
        && value < min
    {
        return Ok(Some(breach(AlertKind::BelowMin, Severity::Low, min)));
    }
    Ok(None)
}

fn finite(field: &'static str, threshold: Option<f64>) -> Result<Option<f64>, EvaluationError> {
    match threshold {
        Some(value) if !value.is_finite() => {
            Err(EvaluationError::NonFiniteThreshold { field, value })
        }
        other => Ok(other),
    }
}
