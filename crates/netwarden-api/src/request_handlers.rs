//! REST API handlers for change requests.
//!
//! Any named actor may submit; approve and reject need an administrator.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use netwarden_governance::{Proposal, SubmitOutcome};
use netwarden_state::RequestId;

use crate::ApiState;
use crate::response::{
    ApiResponse, actor, error_response, follow_changes, governance_error, state_error,
};

/// Body of `POST /requests`.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub proposal: Proposal,
    #[serde(default)]
    pub comment: Option<String>,
}

/// GET /api/v1/requests
pub async fn list_requests(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_requests() {
        Ok(requests) => ApiResponse::ok(requests).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/requests/pending
pub async fn pending_requests(State(state): State<ApiState>) -> impl IntoResponse {
    match state.governance.pending_requests() {
        Ok(requests) => ApiResponse::ok(requests).into_response(),
        Err(e) => governance_error(&e),
    }
}

/// GET /api/v1/requests/{id}
pub async fn get_request(State(state): State<ApiState>, Path(id): Path<RequestId>) -> impl IntoResponse {
    match state.store.get_request(id) {
        Ok(Some(request)) => ApiResponse::ok(request).into_response(),
        Ok(None) => error_response("change request not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/requests
///
/// 201 for a new request; 200 when an identical pending deletion
/// already existed and is returned instead.
pub async fn submit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> impl IntoResponse {
    let requester = match actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.governance.submit(&requester, body.proposal, body.comment) {
        Ok(outcome @ SubmitOutcome::Created(_)) => {
            (StatusCode::CREATED, ApiResponse::ok(outcome)).into_response()
        }
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => governance_error(&e),
    }
}

/// POST /api/v1/requests/{id}/approve
pub async fn approve_request(
    State(state): State<ApiState>,
    Path(id): Path<RequestId>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let actor = match actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let admin = match state.authorizer.authorize(&actor) {
        Ok(cap) => cap,
        Err(e) => return governance_error(&e),
    };
    match state.governance.approve(&admin, id) {
        Ok(resolution) => {
            follow_changes(&state.poller, &resolution.changes).await;
            ApiResponse::ok(resolution).into_response()
        }
        Err(e) => governance_error(&e),
    }
}

/// POST /api/v1/requests/{id}/reject
pub async fn reject_request(
    State(state): State<ApiState>,
    Path(id): Path<RequestId>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let actor = match actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let admin = match state.authorizer.authorize(&actor) {
        Ok(cap) => cap,
        Err(e) => return governance_error(&e),
    };
    match state.governance.reject(&admin, id) {
        Ok(resolution) => ApiResponse::ok(resolution).into_response(),
        Err(e) => governance_error(&e),
    }
}
