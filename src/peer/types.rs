use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::str::FromStr;
use thiserror::Error;

/// Address used by peers that must be reachable from other hosts.
pub const WILDCARD_ADDRESS: &str = "0.0.0.0";
/// Fallback address when no routable interface can be discovered.
pub const LOCALHOST_ADDRESS: &str = "localhost";

// Never contacted: connecting a UDP socket only selects the outbound interface.
const DISCOVERY_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("bad peer address provided: {0:?}")]
    BadAddress(String),
    #[error("bad peer port provided: {0}")]
    BadPort(String),
}

/// How a peer receives traffic from the node that registered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    #[default]
    Direct,
    Streamed,
}

impl PeerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerKind::Direct => "direct",
            PeerKind::Streamed => "streamed",
        }
    }
}

impl FromStr for PeerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(PeerKind::Direct),
            "streamed" => Ok(PeerKind::Streamed),
            other => Err(format!("unknown peer kind: {}", other)),
        }
    }
}

/// Network identity of a mesh participant.
///
/// Fields are private so a `Peer` can only come out of a validating constructor and never
/// changes afterwards, decoding included. Equality and hashing use `address` and `port` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PeerRecord")]
pub struct Peer {
    address: String,
    port: u16,
    kind: PeerKind,
}

impl Peer {
    /// Creates a `Direct` peer after validating the address and port.
    pub fn new(address: impl Into<String>, port: u16) -> Result<Self, PeerError> {
        let address = address.into();
        if address.trim().is_empty() || address.contains(['/', '?', '#', '@', ' ']) {
            return Err(PeerError::BadAddress(address));
        }
        if port == 0 {
            return Err(PeerError::BadPort(port.to_string()));
        }

        let peer = Self {
            address,
            port,
            kind: PeerKind::Direct,
        };

        match reqwest::Url::parse(&peer.hostname()) {
            Ok(url) if url.port_or_known_default() == Some(port) => Ok(peer),
            _ => Err(PeerError::BadAddress(peer.address)),
        }
    }

    /// Builds the identity of the local process.
    ///
    /// With `routable` the wildcard address is used, so the node listens on every interface.
    /// Otherwise the first non-loopback IPv4 address is used, falling back to `localhost`.
    pub fn resolve_self(port: u16, routable: bool) -> Result<Self, PeerError> {
        if routable {
            return Self::new(WILDCARD_ADDRESS, port);
        }

        match discover_ipv4() {
            Some(ip) => Self::new(ip.to_string(), port),
            None => {
                tracing::debug!("No routable IPv4 interface found, using {}", LOCALHOST_ADDRESS);
                Self::new(LOCALHOST_ADDRESS, port)
            }
        }
    }

    /// Parses an `address:port` pair.
    pub fn parse(host: &str) -> Result<Self, PeerError> {
        let (address, port) = host
            .rsplit_once(':')
            .ok_or_else(|| PeerError::BadAddress(host.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| PeerError::BadPort(port.to_string()))?;

        Self::new(address, port)
    }

    pub fn with_kind(mut self, kind: PeerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> PeerKind {
        self.kind
    }

    pub fn is_streamed(&self) -> bool {
        self.kind == PeerKind::Streamed
    }

    /// Base URI used to dial this peer.
    pub fn hostname(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    /// Registry key derived from the identity value.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

/// Unvalidated wire form of a `Peer`.
#[derive(Deserialize)]
struct PeerRecord {
    address: String,
    port: u16,
    #[serde(default)]
    kind: PeerKind,
}

impl TryFrom<PeerRecord> for Peer {
    type Error = PeerError;

    fn try_from(record: PeerRecord) -> Result<Self, Self::Error> {
        Ok(Peer::new(record.address, record.port)?.with_kind(record.kind))
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl FromStr for Peer {
    type Err = PeerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn discover_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(DISCOVERY_PROBE).ok()?;

    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
