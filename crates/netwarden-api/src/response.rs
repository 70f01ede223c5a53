//! Response envelope and error mapping shared by every handler.

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use netwarden_governance::GovernanceError;
use netwarden_poller::{PollError, Poller};
use netwarden_state::{InventoryChange, StateError};

/// Header carrying the acting user's name.
pub const ACTOR_HEADER: &str = "x-netwarden-actor";

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

pub(crate) fn state_error(e: &StateError) -> Response {
    match e {
        StateError::NotFound(_) | StateError::MetricDetached { .. } => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND)
        }
        _ => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub(crate) fn governance_error(e: &GovernanceError) -> Response {
    let status = match e {
        GovernanceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        GovernanceError::RequestNotFound(_) | GovernanceError::TargetNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        GovernanceError::Validation(_) => StatusCode::BAD_REQUEST,
        GovernanceError::CatalogEntryNotApproved(_) | GovernanceError::TemplateNotApproved(_) => {
            StatusCode::CONFLICT
        }
        GovernanceError::State(inner) => return state_error(inner),
    };
    error_response(&e.to_string(), status)
}

pub(crate) fn poll_error(e: &PollError) -> Response {
    match e {
        PollError::DeviceNotFound(_) => error_response(&e.to_string(), StatusCode::NOT_FOUND),
        PollError::Storage(inner) => state_error(inner),
    }
}

/// The acting user, or a 401 response when the header is absent.
pub(crate) fn actor(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            error_response(
                &format!("missing {ACTOR_HEADER} header"),
                StatusCode::UNAUTHORIZED,
            )
        })
}

/// Bring poll loops in line with committed inventory changes.
///
/// The mutation is already durable, so a failure here is logged and the
/// request still succeeds; the loop catches up on its next restart.
pub(crate) async fn follow_changes(poller: &Poller, changes: &[InventoryChange]) {
    for &change in changes {
        if let Err(e) = poller.reconcile(change).await {
            warn!(?change, error = %e, "poll loop reconciliation failed");
        }
    }
}
