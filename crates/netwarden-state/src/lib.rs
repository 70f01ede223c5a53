//! netwarden-state — the device inventory store.
//!
//! Backed by [redb](https://docs.rs/redb), holds devices, metrics, the
//! metric catalog, templates, change requests, readings and alert
//! events.
//!
//! # Architecture
//!
//! Entity tables are keyed by `u64` ids handed out from a sequence table
//! inside the same write transaction that inserts the row. Values are
//! JSON-serialized domain types. Readings use a composite string key
//! `{metric_id}:{at}:{seq}` (zero-padded) so per-metric history is a
//! single ordered range scan.
//!
//! Composite mutations go through [`StateStore::write`], which hands a
//! [`StoreTxn`] to a closure and commits only if the closure succeeds.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub mod error;
pub mod store;
pub mod tables;
pub mod txn;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use txn::StoreTxn;
pub use types::*;
