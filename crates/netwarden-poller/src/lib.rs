//! netwarden-poller — telemetry collection for monitored devices.
//!
//! The [`Poller`] owns an explicit registry mapping each device id to
//! one cancellable background loop. Loops are independent tasks: an
//! unreachable or slow device only ever delays itself.
//!
//! # Architecture
//!
//! ```text
//! Poller
//!   ├── registry: DeviceId → LoopSlot { JoinHandle, watch shutdown }
//!   ├── per-device cycle lock (loop and poll_once never overlap)
//!   └── per-device loop
//!       ├── sleep(interval) | shutdown
//!       └── cycle (panic-contained)
//!           ├── re-read metrics, keep alerting_enabled
//!           ├── ProtocolClient::fetch_value  | shutdown
//!           ├── RawValue → f64 (skip on parse failure)
//!           ├── insert_reading
//!           └── evaluate → insert_alert_event
//! ```
//!
//! Loop membership follows the store through [`Poller::start`],
//! [`Poller::stop`] and [`Poller::reconcile`], which the governance
//! host calls with the `InventoryChange`s each mutation reports.

pub mod cycle;
pub mod error;
pub mod poller;

pub use cycle::{FailureKind, MetricFailure, PollReport};
pub use error::PollError;
pub use poller::Poller;
