//! SNMPv2c GET over UDP.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::ber::{self, VarValue};
use crate::client::{FetchBudget, ProtocolClient, RawValue};
use crate::error::ProtocolError;

pub const DEFAULT_PORT: u16 = 161;

/// Largest datagram we are prepared to receive.
const MAX_DATAGRAM: usize = 65_507;

/// Stateless SNMPv2c client. Every fetch uses its own socket, so one
/// client can be shared by any number of concurrent poll loops.
#[derive(Debug)]
pub struct SnmpClient {
    default_port: u16,
    next_request_id: AtomicU32,
}

impl SnmpClient {
    pub fn new(default_port: u16) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(1);
        Self {
            default_port,
            next_request_id: AtomicU32::new(seed),
        }
    }

    /// Request ids stay in the positive `i32` range.
    fn request_id(&self) -> i32 {
        let raw = self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF;
        raw.max(1) as i32
    }

    async fn resolve(&self, address: &str) -> Result<SocketAddr, ProtocolError> {
        let unreachable = |reason: String| ProtocolError::Unreachable(format!("{address}: {reason}"));
        match target(address, self.default_port) {
            Target::Socket(addr) => Ok(addr),
            Target::Host(host, port) => tokio::net::lookup_host((host.as_str(), port))
                .await
                .map_err(|e| unreachable(e.to_string()))?
                .next()
                .ok_or_else(|| unreachable("no addresses resolved".into())),
        }
    }
}

impl Default for SnmpClient {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

#[async_trait]
impl ProtocolClient for SnmpClient {
    async fn fetch_value(
        &self,
        address: &str,
        community: &str,
        oid: &str,
        budget: FetchBudget,
    ) -> Result<RawValue, ProtocolError> {
        let arcs = ber::parse_oid(oid).map_err(|e| ProtocolError::ProtocolRejected(e.to_string()))?;
        let peer = self.resolve(address).await?;
        let unreachable = |e: std::io::Error| ProtocolError::Unreachable(format!("{peer}: {e}"));

        let local: SocketAddr = match peer.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await.map_err(unreachable)?;
        socket.connect(peer).await.map_err(unreachable)?;

        // Retries reuse the request id so a late answer to an earlier
        // attempt still counts.
        let request_id = self.request_id();
        let request = ber::encode_get_request(community, request_id, &arcs);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        for attempt in 1..=budget.attempts() {
            trace!(%peer, oid, request_id, attempt, "sending GetRequest");
            socket.send(&request).await.map_err(unreachable)?;

            let receive = async {
                loop {
                    let len = socket.recv(&mut buf).await.map_err(unreachable)?;
                    match ber::decode_response(&buf[..len]) {
                        Ok(response) if response.request_id == request_id => {
                            return Ok::<_, ProtocolError>(response);
                        }
                        Ok(response) => debug!(
                            %peer,
                            expected = request_id,
                            got = response.request_id,
                            "ignoring stale response"
                        ),
                        Err(e) => {
                            return Err(ProtocolError::ProtocolRejected(format!(
                                "undecodable response: {e}"
                            )));
                        }
                    }
                }
            };
            let waited = tokio::time::timeout(budget.timeout, receive).await;

            match waited {
                Ok(response) => return interpret(response?),
                Err(_) => debug!(%peer, oid, attempt, "GetRequest timed out"),
            }
        }

        Err(ProtocolError::Timeout {
            attempts: budget.attempts(),
        })
    }
}

fn interpret(response: ber::Response) -> Result<RawValue, ProtocolError> {
    if response.error_status != 0 {
        return Err(ProtocolError::ProtocolRejected(format!(
            "{} (index {})",
            ber::error_status_name(response.error_status),
            response.error_index
        )));
    }
    let (_, value) = response
        .varbinds
        .into_iter()
        .next()
        .ok_or_else(|| ProtocolError::ProtocolRejected("empty varbind list".into()))?;
    match value {
        VarValue::Value(raw) => Ok(raw),
        VarValue::NoSuchObject => Err(ProtocolError::ProtocolRejected("noSuchObject".into())),
        VarValue::NoSuchInstance => Err(ProtocolError::ProtocolRejected("noSuchInstance".into())),
        VarValue::EndOfMibView => Err(ProtocolError::ProtocolRejected("endOfMibView".into())),
        VarValue::Null => Err(ProtocolError::ProtocolRejected("null value".into())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Socket(SocketAddr),
    Host(String, u16),
}

/// Split `host`, `host:port`, `ip`, `ip:port` or `[v6]:port`.
fn target(address: &str, default_port: u16) -> Target {
    let address = address.trim();
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Target::Socket(SocketAddr::new(ip, default_port));
    }
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Target::Socket(addr);
    }
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => Target::Host(host.to_string(), port),
            Err(_) => Target::Host(address.to_string(), default_port),
        },
        None => Target::Host(address.to_string(), default_port),
    }
}
