//! Device descriptors: the structured form of one interface's
//! configuration, used both for desired state parsed from a file and for
//! live state fetched from a running interface.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::SystemTime;

use thiserror::Error;

use crate::key::Key;

/// Maximum interface name length in bytes (IFNAMSIZ minus the terminator).
pub const MAX_IFACE_NAME_LEN: usize = 15;

/// Errors produced while parsing addresses, endpoints and names.
#[derive(Debug, Error)]
pub enum DeviceParseError {
    /// Not a valid IPv4 or IPv6 address.
    #[error("invalid IP address: `{0}`")]
    InvalidAddress(String),

    /// The prefix length after `/` is not a number.
    #[error("invalid network prefix: `{0}`")]
    InvalidPrefix(String),

    /// The prefix length exceeds the address family's maximum.
    #[error("network prefix {prefix} exceeds maximum {max}")]
    PrefixOutOfRange {
        /// Prefix length as written.
        prefix: u8,
        /// Maximum for the address family.
        max: u8,
    },

    /// Endpoint text is not `host:port`, `ip:port` or `[ipv6]:port`.
    #[error("invalid endpoint: `{0}`")]
    InvalidEndpoint(String),

    /// The port part of an endpoint is missing or out of range.
    #[error("invalid port in endpoint: `{0}`")]
    InvalidPort(String),

    /// An interface name that the kernel would reject.
    #[error("invalid interface name: `{0}`")]
    InvalidInterfaceName(String),
}

/// Checks an interface name: non-empty, at most 15 bytes, no `/` or NUL.
pub fn validate_interface_name(name: &str) -> Result<(), DeviceParseError> {
    if name.is_empty()
        || name.len() > MAX_IFACE_NAME_LEN
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(DeviceParseError::InvalidInterfaceName(name.to_string()));
    }
    Ok(())
}

/// One allowed-IP network for a peer: an address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedIp {
    /// Network address.
    pub addr: IpAddr,
    /// Prefix length in bits.
    pub prefix: u8,
}

impl AllowedIp {
    /// Builds a network, checking the prefix against the address family.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, DeviceParseError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(DeviceParseError::PrefixOutOfRange { prefix, max });
        }
        Ok(AllowedIp { addr, prefix })
    }

    /// Builds a host route (`/32` or `/128`) for a bare address.
    pub fn host(addr: IpAddr) -> Self {
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        AllowedIp { addr, prefix }
    }
}

impl FromStr for AllowedIp {
    type Err = DeviceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr
                    .parse()
                    .map_err(|_| DeviceParseError::InvalidAddress(s.to_string()))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| DeviceParseError::InvalidPrefix(s.to_string()))?;
                AllowedIp::new(addr, prefix)
            }
            None => {
                let addr: IpAddr = s
                    .parse()
                    .map_err(|_| DeviceParseError::InvalidAddress(s.to_string()))?;
                Ok(AllowedIp::host(addr))
            }
        }
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// A peer's remote endpoint.
///
/// Hostnames stay unresolved until the moment a configuration is applied;
/// state fetched from a running interface always carries address literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A resolved socket address.
    Addr(SocketAddr),
    /// A DNS name plus port, resolved at apply time.
    Name {
        /// Host name to resolve.
        host: String,
        /// Destination port.
        port: u16,
    },
}

impl Endpoint {
    /// The endpoint's destination port.
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::Addr(addr) => addr.port(),
            Endpoint::Name { port, .. } => *port,
        }
    }
}

impl FromStr for Endpoint {
    type Err = DeviceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Address literals first: `1.2.3.4:51820` or `[::1]:51820`.
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Endpoint::Addr(addr));
        }
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            // Bracketed form with something unparseable inside.
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| DeviceParseError::InvalidEndpoint(s.to_string()))?;
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| DeviceParseError::InvalidEndpoint(s.to_string()))?;
            (host, port)
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| DeviceParseError::InvalidEndpoint(s.to_string()))?
        };
        if host.is_empty() || host.contains(':') {
            // Unbracketed IPv6 never reaches here as a valid name.
            return Err(DeviceParseError::InvalidEndpoint(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| DeviceParseError::InvalidPort(s.to_string()))?;
        Ok(Endpoint::Name {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Addr(addr) => write!(f, "{addr}"),
            Endpoint::Name { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// One peer's desired or observed configuration.
///
/// Optional fields model presence explicitly: `preshared_key` is `None`
/// when the peer has no preshared key, never an all-zero sentinel. The
/// counters and handshake timestamp are only meaningful on records fetched
/// from a running interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// The peer's public key; its identity for all comparisons.
    pub public_key: Key,
    /// Optional preshared key layered onto the peer's key exchange.
    pub preshared_key: Option<Key>,
    /// Remote endpoint, if pinned.
    pub endpoint: Option<Endpoint>,
    /// Networks this peer may use inside the tunnel.
    pub allowed_ips: Vec<AllowedIp>,
    /// Keepalive interval in seconds; `Some(0)` disables it explicitly.
    pub persistent_keepalive: Option<u16>,
    /// Delete the identified peer when this record is applied.
    pub remove: bool,
    /// Replace the peer's allowed-IP list instead of extending it.
    pub replace_allowed_ips: bool,
    /// Bytes received from this peer.
    pub rx_bytes: u64,
    /// Bytes sent to this peer.
    pub tx_bytes: u64,
    /// Time of the most recent handshake, if any.
    pub last_handshake: Option<SystemTime>,
}

impl Peer {
    /// A peer with only its identity set.
    pub fn new(public_key: Key) -> Self {
        Peer {
            public_key,
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
            remove: false,
            replace_allowed_ips: false,
            rx_bytes: 0,
            tx_bytes: 0,
            last_handshake: None,
        }
    }

    /// A synthetic record that deletes the identified peer when applied.
    pub fn removal(public_key: Key) -> Self {
        Peer {
            remove: true,
            ..Peer::new(public_key)
        }
    }
}

/// One interface's full configuration: interface-level settings plus its
/// peer list in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Name of the interface this descriptor targets.
    pub name: String,
    /// Interface private key; `Some(Key::ZERO)` clears the live key.
    pub private_key: Option<Key>,
    /// UDP listen port; `Some(0)` asks for an ephemeral port.
    pub listen_port: Option<u16>,
    /// Firewall mark; `Some(0)` clears the live mark.
    pub fwmark: Option<u32>,
    /// Drop every live peer not listed here when applied.
    pub replace_peers: bool,
    /// Peer records in insertion order.
    pub peers: Vec<Peer>,
}

impl DeviceConfig {
    /// An empty descriptor for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        DeviceConfig {
            name: name.into(),
            private_key: None,
            listen_port: None,
            fwmark: None,
            replace_peers: false,
            peers: Vec::new(),
        }
    }
}
