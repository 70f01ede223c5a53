//! One poll cycle for one device.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use netwarden_alert::evaluate;
use netwarden_core::epoch_millis;
use netwarden_snmp::{FetchBudget, ProtocolClient};
use netwarden_state::{AlertEvent, DeviceId, Metric, MetricId, Reading, StateError, StateStore};

use crate::error::PollError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unreachable, timed out or rejected by the agent.
    Protocol,
    /// The agent answered with something that is not a number.
    Parse,
    Evaluation,
    Storage,
}

/// A metric skipped for this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFailure {
    pub metric_id: MetricId,
    pub oid: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollReport {
    pub device_id: DeviceId,
    pub readings: Vec<Reading>,
    pub alerts: Vec<AlertEvent>,
    pub failures: Vec<MetricFailure>,
    /// Shutdown arrived before every metric was polled.
    pub cancelled: bool,
}

impl PollReport {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            readings: Vec::new(),
            alerts: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    fn skip(&mut self, metric: &Metric, kind: FailureKind, reason: String) {
        self.failures.push(MetricFailure {
            metric_id: metric.id,
            oid: metric.oid.clone(),
            kind,
            reason,
        });
    }
}

/// Resolves once `true` is sent or the sender is dropped.
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Everything a cycle needs, shared by every loop.
pub(crate) struct Collector {
    pub(crate) store: StateStore,
    pub(crate) client: Arc<dyn ProtocolClient>,
    pub(crate) budget: FetchBudget,
}

impl Collector {
    /// Poll every alerting-enabled metric of `device_id` once.
    ///
    /// The metric list is read fresh each call. Shutdown is checked
    /// before every fetch and abandons an in-flight fetch; nothing is
    /// written for a fetch that did not complete.
    pub(crate) async fn run(
        &self,
        device_id: DeviceId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PollReport, PollError> {
        let device = self
            .store
            .get_device(device_id)?
            .ok_or(PollError::DeviceNotFound(device_id))?;
        let metrics = self.store.list_metrics(device_id)?;

        let mut report = PollReport::new(device_id);
        for metric in metrics.iter().filter(|m| m.alerting_enabled) {
            if *shutdown.borrow() {
                report.cancelled = true;
                break;
            }

            let fetch = self.client.fetch_value(
                &device.address,
                &device.community,
                &metric.oid,
                self.budget,
            );
            let fetched = tokio::select! {
                biased;
                _ = cancelled(shutdown) => {
                    report.cancelled = true;
                    break;
                }
                result = fetch => result,
            };

            let raw = match fetched {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(device_id, metric_id = metric.id, oid = %metric.oid, error = %e, "fetch failed");
                    report.skip(metric, FailureKind::Protocol, e.to_string());
                    continue;
                }
            };
            let Some(value) = raw.as_f64() else {
                warn!(device_id, metric_id = metric.id, oid = %metric.oid, value = %raw, "value is not numeric");
                report.skip(metric, FailureKind::Parse, format!("not a number: {raw}"));
                continue;
            };

            let at = epoch_millis();
            match self.store.insert_reading(device_id, metric.id, value, at) {
                Ok(reading) => report.readings.push(reading),
                Err(e @ StateError::MetricDetached { .. }) => {
                    debug!(device_id, metric_id = metric.id, "metric removed mid-cycle, reading discarded");
                    report.skip(metric, FailureKind::Storage, e.to_string());
                    continue;
                }
                Err(e) => {
                    warn!(device_id, metric_id = metric.id, error = %e, "failed to store reading");
                    report.skip(metric, FailureKind::Storage, e.to_string());
                    continue;
                }
            }

            match evaluate(metric, value) {
                Ok(None) => {}
                Ok(Some(breach)) => {
                    match self.store.insert_alert_event(&breach.into_event(metric, at)) {
                        Ok(event) => {
                            debug!(device_id, metric_id = metric.id, severity = ?event.severity, "alert raised");
                            report.alerts.push(event);
                        }
                        Err(e) => {
                            warn!(device_id, metric_id = metric.id, error = %e, "failed to store alert event");
                            report.skip(metric, FailureKind::Storage, e.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(device_id, metric_id = metric.id, error = %e, "threshold evaluation failed");
                    report.skip(metric, FailureKind::Evaluation, e.to_string());
                }
            }
        }

        debug!(
            device_id,
            readings = report.readings.len(),
            alerts = report.alerts.len(),
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "poll cycle finished"
        );
        Ok(report)
    }
}
