//! REST API handlers for inventory and telemetry.
//!
//! Reads go straight to the `StateStore`; mutations go through
//! `Governance` so validation and approval gates apply, and device-level
//! changes are forwarded to the poller.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::info;

use netwarden_state::*;

use crate::ApiState;
use crate::response::{
    ApiResponse, actor, error_response, follow_changes, governance_error, poll_error, state_error,
};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

fn default_community() -> String {
    "public".to_string()
}

fn enabled() -> bool {
    true
}

/// Body of `POST /devices` and `PUT /devices/{id}`.
#[derive(Debug, Deserialize)]
pub struct DeviceBody {
    pub name: String,
    pub address: String,
    #[serde(default = "default_community")]
    pub community: String,
    /// Falls back to the configured default interval.
    pub interval_secs: Option<u64>,
}

impl DeviceBody {
    fn into_draft(self, default_interval_secs: u64) -> DeviceDraft {
        DeviceDraft {
            name: self.name,
            address: self.address,
            community: self.community,
            interval_secs: self.interval_secs.unwrap_or(default_interval_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachBody {
    pub catalog_entry_id: CatalogEntryId,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default = "enabled")]
    pub alerting_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AlertingBody {
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub device_id: Option<DeviceId>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestQuery {
    pub device_id: Option<DeviceId>,
}

fn limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

// ── Devices ────────────────────────────────────────────────────

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_devices() {
        Ok(devices) => ApiResponse::ok(devices).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/devices/{id}
pub async fn get_device(State(state): State<ApiState>, Path(id): Path<DeviceId>) -> impl IntoResponse {
    match state.store.get_device(id) {
        Ok(Some(device)) => ApiResponse::ok(device).into_response(),
        Ok(None) => error_response("device not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/devices
///
/// Administrators only. Starts the device's poll loop.
pub async fn create_device(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DeviceBody>,
) -> impl IntoResponse {
    let actor = match actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let admin = match state.authorizer.authorize(&actor) {
        Ok(cap) => cap,
        Err(e) => return governance_error(&e),
    };

    let draft = body.into_draft(state.default_interval_secs);
    match state.governance.add_device(&admin, draft) {
        Ok(mutation) => {
            follow_changes(&state.poller, &mutation.changes).await;
            (StatusCode::CREATED, ApiResponse::ok(mutation.value)).into_response()
        }
        Err(e) => governance_error(&e),
    }
}

/// PUT /api/v1/devices/{id}
///
/// Administrators only. Restarts the poll loop with the new settings.
pub async fn update_device(
    State(state): State<ApiState>,
    Path(id): Path<DeviceId>,
    headers: HeaderMap,
    Json(body): Json<DeviceBody>,
) -> impl IntoResponse {
    let actor = match actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let admin = match state.authorizer.authorize(&actor) {
        Ok(cap) => cap,
        Err(e) => return governance_error(&e),
    };

    let draft = body.into_draft(state.default_interval_secs);
    match state.governance.update_device(&admin, id, draft) {
        Ok(mutation) => {
            follow_changes(&state.poller, &mutation.changes).await;
            ApiResponse::ok(mutation.value).into_response()
        }
        Err(e) => governance_error(&e),
    }
}

/// POST /api/v1/devices/{id}/poll
pub async fn poll_device(State(state): State<ApiState>, Path(id): Path<DeviceId>) -> impl IntoResponse {
    match state.poller.poll_once(id).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => poll_error(&e),
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /api/v1/devices/{id}/metrics
pub async fn list_device_metrics(
    State(state): State<ApiState>,
    Path(id): Path<DeviceId>,
) -> impl IntoResponse {
    match state.store.get_device(id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("device not found", StatusCode::NOT_FOUND),
        Err(e) => return state_error(&e),
    }
    match state.store.list_metrics(id) {
        Ok(metrics) => ApiResponse::ok(metrics).into_response(),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/devices/{id}/metrics
pub async fn attach_metric(
    State(state): State<ApiState>,
    Path(id): Path<DeviceId>,
    Json(body): Json<AttachBody>,
) -> impl IntoResponse {
    match state
        .governance
        .attach_metric(id, body.catalog_entry_id, body.thresholds, body.alerting_enabled)
    {
        Ok(metric) => (StatusCode::CREATED, ApiResponse::ok(metric)).into_response(),
        Err(e) => governance_error(&e),
    }
}

/// POST /api/v1/devices/{id}/templates/{template_id}
pub async fn apply_template(
    State(state): State<ApiState>,
    Path((id, template_id)): Path<(DeviceId, TemplateId)>,
) -> impl IntoResponse {
    match state.governance.apply_template(id, template_id) {
        Ok(metrics) => {
            info!(device_id = id, template_id, attached = metrics.len(), "template applied");
            ApiResponse::ok(metrics).into_response()
        }
        Err(e) => governance_error(&e),
    }
}

/// GET /api/v1/metrics/{id}
pub async fn get_metric(State(state): State<ApiState>, Path(id): Path<MetricId>) -> impl IntoResponse {
    match state.store.get_metric(id) {
        Ok(Some(metric)) => ApiResponse::ok(metric).into_response(),
        Ok(None) => error_response("metric not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// PUT /api/v1/metrics/{id}/thresholds
pub async fn set_thresholds(
    State(state): State<ApiState>,
    Path(id): Path<MetricId>,
    Json(thresholds): Json<Thresholds>,
) -> impl IntoResponse {
    match state.governance.set_thresholds(id, thresholds) {
        Ok(metric) => ApiResponse::ok(metric).into_response(),
        Err(e) => governance_error(&e),
    }
}

/// PUT /api/v1/metrics/{id}/alerting
pub async fn set_alerting(
    State(state): State<ApiState>,
    Path(id): Path<MetricId>,
    Json(body): Json<AlertingBody>,
) -> impl IntoResponse {
    match state.governance.set_alerting(id, body.enabled) {
        Ok(metric) => ApiResponse::ok(metric).into_response(),
        Err(e) => governance_error(&e),
    }
}

// ── Telemetry ──────────────────────────────────────────────────

/// GET /api/v1/metrics/{id}/readings?limit=N
pub async fn metric_readings(
    State(state): State<ApiState>,
    Path(id): Path<MetricId>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.store.readings_for_metric(id, limit(query.limit)) {
        Ok(readings) => ApiResponse::ok(readings).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/readings/latest?device_id=N
pub async fn latest_readings(
    State(state): State<ApiState>,
    Query(query): Query<LatestQuery>,
) -> impl IntoResponse {
    match state.store.latest_readings(query.device_id) {
        Ok(readings) => ApiResponse::ok(readings).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/alerts?device_id=N&limit=N
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    match state.store.recent_alert_events(query.device_id, limit(query.limit)) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/poller/loops
pub async fn active_loops(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.poller.active_loops().await)
}

// ── Catalog ────────────────────────────────────────────────────

/// GET /api/v1/catalog
pub async fn list_catalog(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_catalog_entries() {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/templates
pub async fn list_templates(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_templates() {
        Ok(templates) => ApiResponse::ok(templates).into_response(),
        Err(e) => state_error(&e),
    }
}
