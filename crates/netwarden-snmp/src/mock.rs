//! Scripted in-memory [`ProtocolClient`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{FetchBudget, ProtocolClient, RawValue};
use crate::error::ProtocolError;

/// What the scripted device does when asked for one OID.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Value(RawValue),
    Fail(ProtocolError),
    /// Wait, then behave as the inner script.
    Delay(Duration, Box<Behaviour>),
    /// Sleep for the whole budget and report a timeout, like a device
    /// that never answers.
    Silent,
    Panic,
}

/// Answers fetches from a per-`(address, oid)` script. Unscripted
/// addresses are unreachable, unscripted OIDs on a scripted address are
/// `noSuchObject`.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<HashMap<(String, String), Behaviour>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: &str, oid: &str, behaviour: Behaviour) {
        if let Ok(mut script) = self.script.lock() {
            script.insert((address.to_string(), oid.to_string()), behaviour);
        }
    }

    pub fn set_value(&self, address: &str, oid: &str, value: RawValue) {
        self.set(address, oid, Behaviour::Value(value));
    }

    /// Number of fetches issued against `address`.
    pub fn calls_to(&self, address: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|(a, _)| a == address).count())
            .unwrap_or(0)
    }

    /// Number of fetches issued for one OID on `address`.
    pub fn calls_for(&self, address: &str, oid: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|(a, o)| a == address && o == oid).count())
            .unwrap_or(0)
    }

    fn lookup(&self, address: &str, oid: &str) -> Behaviour {
        let Ok(script) = self.script.lock() else {
            return Behaviour::Fail(ProtocolError::Unreachable("script poisoned".into()));
        };
        if let Some(behaviour) = script.get(&(address.to_string(), oid.to_string())) {
            return behaviour.clone();
        }
        if script.keys().any(|(a, _)| a == address) {
            Behaviour::Fail(ProtocolError::ProtocolRejected("noSuchObject".into()))
        } else {
            Behaviour::Fail(ProtocolError::Unreachable(address.to_string()))
        }
    }
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    async fn fetch_value(
        &self,
        address: &str,
        _community: &str,
        oid: &str,
        budget: FetchBudget,
    ) -> Result<RawValue, ProtocolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((address.to_string(), oid.to_string()));
        }
        let mut behaviour = self.lookup(address, oid);
        loop {
            match behaviour {
                Behaviour::Value(value) => return Ok(value),
                Behaviour::Fail(err) => return Err(err),
                Behaviour::Delay(wait, next) => {
                    tokio::time::sleep(wait).await;
                    behaviour = *next;
                }
                Behaviour::Silent => {
                    tokio::time::sleep(budget.timeout * budget.attempts()).await;
                    return Err(ProtocolError::Timeout {
                        attempts: budget.attempts(),
                    });
                }
                Behaviour::Panic => panic!("scripted panic fetching {oid} from {address}"),
            }
        }
    }
}
