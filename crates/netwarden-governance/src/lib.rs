//! netwarden-governance — the change request workflow.
//!
//! Users propose inventory changes; administrators approve or reject
//! them. Each request moves `PENDING → APPROVED | REJECTED` exactly
//! once, and the side effect of an approval commits in the same store
//! transaction as the status change.
//!
//! # Architecture
//!
//! ```text
//! Authorizer ──authorize(actor)──▶ AdminCapability
//!                                      │
//! Governance                           ▼
//!   ├── submit(requester, Proposal)     approve / reject(cap, id)
//!   │     └── duplicate deletion guard      └── one write txn:
//!   │                                           dispatch ChangeAction
//!   │                                           + set request status
//!   └── inventory: add_device / update_device (cap),
//!       attach_metric, set_thresholds, set_alerting, apply_template
//! ```
//!
//! Operations that change the device set report the
//! `InventoryChange`s they caused so the host can keep poll loops in
//! step.

pub mod auth;
pub mod error;
pub mod inventory;
mod validate;
pub mod workflow;

pub use auth::{AdminCapability, Authorizer};
pub use error::{GovernanceError, GovernanceResult};
pub use inventory::Mutation;
pub use workflow::{Governance, Proposal, Resolution, ResolutionOutcome, SubmitOutcome};
