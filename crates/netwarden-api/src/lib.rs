//! netwarden-api — REST API for netwarden.
//!
//! Thin axum host over the inventory store, the change governance
//! workflow and the poller. The acting user is read from the
//! `x-netwarden-actor` header; administrator-only routes check it
//! against the configured admin list.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/devices` | List devices |
//! | POST | `/api/v1/devices` | Add a device (admin) |
//! | GET | `/api/v1/devices/{id}` | Get a device |
//! | PUT | `/api/v1/devices/{id}` | Modify a device (admin) |
//! | GET | `/api/v1/devices/{id}/metrics` | List a device's metrics |
//! | POST | `/api/v1/devices/{id}/metrics` | Attach an approved catalog entry |
//! | POST | `/api/v1/devices/{id}/templates/{template_id}` | Apply an approved template |
//! | POST | `/api/v1/devices/{id}/poll` | Poll a device once, now |
//! | GET | `/api/v1/metrics/{id}` | Get a metric |
//! | PUT | `/api/v1/metrics/{id}/thresholds` | Replace alert thresholds |
//! | PUT | `/api/v1/metrics/{id}/alerting` | Enable or disable alerting |
//! | GET | `/api/v1/metrics/{id}/readings` | Reading history, newest first |
//! | GET | `/api/v1/readings/latest` | Latest reading per metric |
//! | GET | `/api/v1/alerts` | Recent alert events |
//! | GET | `/api/v1/catalog` | Metric catalog |
//! | GET | `/api/v1/templates` | Templates |
//! | GET | `/api/v1/poller/loops` | Devices with a running poll loop |
//! | GET | `/api/v1/requests` | All change requests |
//! | POST | `/api/v1/requests` | Submit a change request |
//! | GET | `/api/v1/requests/pending` | Pending change requests |
//! | GET | `/api/v1/requests/{id}` | Get a change request |
//! | POST | `/api/v1/requests/{id}/approve` | Approve (admin) |
//! | POST | `/api/v1/requests/{id}/reject` | Reject (admin) |

pub mod handlers;
pub mod request_handlers;
mod response;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};

use netwarden_governance::{Authorizer, Governance};
use netwarden_poller::Poller;
use netwarden_state::StateStore;

pub use response::ACTOR_HEADER;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub governance: Governance,
    pub authorizer: Arc<Authorizer>,
    pub poller: Poller,
    /// Interval given to devices created without one.
    pub default_interval_secs: u64,
}

impl ApiState {
    pub fn new(store: StateStore, authorizer: Authorizer, poller: Poller, default_interval_secs: u64) -> Self {
        Self {
            governance: Governance::new(store.clone()),
            store,
            authorizer: Arc::new(authorizer),
            poller,
            default_interval_secs,
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/devices", get(handlers::list_devices).post(handlers::create_device))
        .route("/devices/{id}", get(handlers::get_device).put(handlers::update_device))
        .route(
            "/devices/{id}/metrics",
            get(handlers::list_device_metrics).post(handlers::attach_metric),
        )
        .route("/devices/{id}/templates/{template_id}", post(handlers::apply_template))
        .route("/devices/{id}/poll", post(handlers::poll_device))
        .route("/metrics/{id}", get(handlers::get_metric))
        .route("/metrics/{id}/thresholds", put(handlers::set_thresholds))
        .route("/metrics/{id}/alerting", put(handlers::set_alerting))
        .route("/metrics/{id}/readings", get(handlers::metric_readings))
        .route("/readings/latest", get(handlers::latest_readings))
        .route("/alerts", get(handlers::list_alerts))
        .route("/catalog", get(handlers::list_catalog))
        .route("/templates", get(handlers::list_templates))
        .route("/poller/loops", get(handlers::active_loops))
        .route(
            "/requests",
            get(request_handlers::list_requests).post(request_handlers::submit_request),
        )
        .route("/requests/pending", get(request_handlers::pending_requests))
        .route("/requests/{id}", get(request_handlers::get_request))
        .route("/requests/{id}/approve", post(request_handlers::approve_request))
        .route("/requests/{id}/reject", post(request_handlers::reject_request))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
