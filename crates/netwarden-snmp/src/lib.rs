//! netwarden-snmp — the protocol client used by the poller.
//!
//! The poller only ever needs one primitive: fetch the current value of
//! one object identifier from one device. [`ProtocolClient`] is that
//! seam; [`SnmpClient`] implements it with SNMPv2c `GetRequest` PDUs
//! over UDP.
//!
//! # Failure budget
//!
//! Each fetch sends at most `1 + retries` requests, waiting `timeout`
//! for each. Socket and resolution errors surface as
//! [`ProtocolError::Unreachable`], an exhausted budget as
//! [`ProtocolError::Timeout`], and agent-side errors (`noSuchObject`,
//! non-zero error-status, undecodable packets) as
//! [`ProtocolError::ProtocolRejected`]. None of them is ever a zero
//! reading.

pub mod ber;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod v2c;

pub use client::{FetchBudget, ProtocolClient, RawValue};
pub use error::ProtocolError;
pub use v2c::SnmpClient;
