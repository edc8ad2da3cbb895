//! Textual wire codec for the device control protocol.
//!
//! The control socket speaks a line-oriented `key=value` protocol. A
//! request is either a dump:
//!
//! ```text
//! get=1
//! <blank line>
//! ```
//!
//! or a mutation:
//!
//! ```text
//! set=1
//! private_key=<hex>
//! replace_peers=true
//! public_key=<hex>
//! replace_allowed_ips=true
//! allowed_ip=10.0.0.2/32
//! <blank line>
//! ```
//!
//! The device answers a dump with its own `key=value` lines, and both
//! request kinds with a final `errno=<n>` line before the terminator. Key
//! material travels as lowercase hex, never base64, and an all-zero key
//! on the wire means "unset". Peer paragraphs begin at `public_key=`;
//! every line before the first of those belongs to the interface.
//!
//! ```
//! use wgsync_ipc::uapi;
//!
//! assert_eq!(uapi::encode_get_request(), "get=1\n\n");
//! ```

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, UNIX_EPOCH};

use wgsync_model::{AllowedIp, DeviceConfig, Endpoint, Key, Peer};

use crate::transport::{IpcError, IpcResult};

/// Encodes a dump request.
pub fn encode_get_request() -> String {
    "get=1\n\n".to_string()
}

/// Encodes a mutation request for `dev`.
///
/// Interface lines come first, then one paragraph per peer. Named
/// endpoints are rejected here; resolution happens before encoding.
pub fn encode_set_request(dev: &DeviceConfig) -> IpcResult<String> {
    let mut out = String::from("set=1\n");
    if let Some(key) = &dev.private_key {
        let _ = writeln!(out, "private_key={}", key.to_hex());
    }
    if let Some(port) = dev.listen_port {
        let _ = writeln!(out, "listen_port={port}");
    }
    if let Some(fwmark) = dev.fwmark {
        let _ = writeln!(out, "fwmark={fwmark}");
    }
    if dev.replace_peers {
        out.push_str("replace_peers=true\n");
    }
    for peer in &dev.peers {
        let _ = writeln!(out, "public_key={}", peer.public_key.to_hex());
        if peer.remove {
            // A removal is identity plus the directive, nothing else.
            out.push_str("remove=true\n");
            continue;
        }
        if let Some(psk) = &peer.preshared_key {
            let _ = writeln!(out, "preshared_key={}", psk.to_hex());
        }
        if let Some(endpoint) = &peer.endpoint {
            match endpoint {
                Endpoint::Addr(addr) => {
                    let _ = writeln!(out, "endpoint={addr}");
                }
                Endpoint::Name { .. } => {
                    return Err(IpcError::UnresolvedEndpoint(endpoint.to_string()));
                }
            }
        }
        if let Some(secs) = peer.persistent_keepalive {
            let _ = writeln!(out, "persistent_keepalive_interval={secs}");
        }
        if peer.replace_allowed_ips {
            out.push_str("replace_allowed_ips=true\n");
        }
        for net in &peer.allowed_ips {
            let _ = writeln!(out, "allowed_ip={net}");
        }
    }
    out.push('\n');
    Ok(out)
}

/// Parses a dump response into a device descriptor.
///
/// The descriptor comes back unnamed; the caller knows which interface it
/// asked about.
pub fn parse_get_response(response: &str) -> IpcResult<DeviceConfig> {
    let mut dev = DeviceConfig::new("");
    let mut current: Option<PeerLines> = None;
    let mut errno: Option<i32> = None;

    for line in response.lines() {
        let Some((key, value)) = line.split_once('=') else {
            return Err(IpcError::Protocol(format!("malformed line `{line}`")));
        };
        match key {
            "private_key" if current.is_none() => {
                let parsed = parse_key(key, value)?;
                dev.private_key = (!parsed.is_zero()).then_some(parsed);
            }
            "listen_port" if current.is_none() => {
                dev.listen_port = Some(parse_field(key, value)?);
            }
            "fwmark" if current.is_none() => {
                dev.fwmark = Some(parse_field(key, value)?);
            }
            "public_key" => {
                if let Some(done) = current.take() {
                    dev.peers.push(done.finish());
                }
                current = Some(PeerLines::new(parse_key(key, value)?));
            }
            "preshared_key" => {
                let peer = expect_peer(&mut current, key)?;
                let parsed = parse_key(key, value)?;
                peer.peer.preshared_key = (!parsed.is_zero()).then_some(parsed);
            }
            "endpoint" => {
                let peer = expect_peer(&mut current, key)?;
                let addr: SocketAddr = parse_field(key, value)?;
                peer.peer.endpoint = Some(Endpoint::Addr(addr));
            }
            "persistent_keepalive_interval" => {
                let peer = expect_peer(&mut current, key)?;
                peer.peer.persistent_keepalive = Some(parse_field(key, value)?);
            }
            "allowed_ip" => {
                let peer = expect_peer(&mut current, key)?;
                let net = AllowedIp::from_str(value)
                    .map_err(|err| IpcError::Protocol(format!("invalid `{key}`: {err}")))?;
                peer.peer.allowed_ips.push(net);
            }
            "rx_bytes" => {
                let peer = expect_peer(&mut current, key)?;
                peer.peer.rx_bytes = parse_field(key, value)?;
            }
            "tx_bytes" => {
                let peer = expect_peer(&mut current, key)?;
                peer.peer.tx_bytes = parse_field(key, value)?;
            }
            "last_handshake_time_sec" => {
                let peer = expect_peer(&mut current, key)?;
                peer.handshake_sec = parse_field(key, value)?;
            }
            "last_handshake_time_nsec" => {
                let peer = expect_peer(&mut current, key)?;
                peer.handshake_nsec = parse_field(key, value)?;
            }
            "protocol_version" => {}
            "errno" => {
                errno = Some(parse_field(key, value)?);
            }
            _ => {
                return Err(IpcError::Protocol(format!("unexpected key `{key}`")));
            }
        }
    }
    if let Some(done) = current.take() {
        dev.peers.push(done.finish());
    }

    match errno {
        Some(0) => Ok(dev),
        Some(code) => Err(IpcError::Device(code)),
        None => Err(IpcError::Protocol("response missing errno".to_string())),
    }
}

/// Parses a mutation response: just the status line.
pub fn parse_set_response(response: &str) -> IpcResult<()> {
    let mut errno: Option<i32> = None;
    for line in response.lines() {
        let Some((key, value)) = line.split_once('=') else {
            return Err(IpcError::Protocol(format!("malformed line `{line}`")));
        };
        if key == "errno" {
            errno = Some(parse_field(key, value)?);
        } else {
            return Err(IpcError::Protocol(format!("unexpected key `{key}`")));
        }
    }
    match errno {
        Some(0) => Ok(()),
        Some(code) => Err(IpcError::Device(code)),
        None => Err(IpcError::Protocol("response missing errno".to_string())),
    }
}

/// A peer paragraph in mid-parse. The handshake timestamp arrives as two
/// separate lines and is only assembled once the paragraph ends.
struct PeerLines {
    peer: Peer,
    handshake_sec: u64,
    handshake_nsec: u32,
}

impl PeerLines {
    fn new(public_key: Key) -> Self {
        PeerLines {
            peer: Peer::new(public_key),
            handshake_sec: 0,
            handshake_nsec: 0,
        }
    }

    fn finish(mut self) -> Peer {
        if self.handshake_sec != 0 || self.handshake_nsec != 0 {
            self.peer.last_handshake =
                Some(UNIX_EPOCH + Duration::new(self.handshake_sec, self.handshake_nsec));
        }
        self.peer
    }
}

fn expect_peer<'a>(
    current: &'a mut Option<PeerLines>,
    key: &str,
) -> IpcResult<&'a mut PeerLines> {
    current
        .as_mut()
        .ok_or_else(|| IpcError::Protocol(format!("`{key}` before any public_key")))
}

fn parse_key(key: &str, value: &str) -> IpcResult<Key> {
    Key::from_hex(value).map_err(|err| IpcError::Protocol(format!("invalid `{key}`: {err}")))
}

fn parse_field<T: FromStr>(key: &str, value: &str) -> IpcResult<T> {
    value
        .parse()
        .map_err(|_| IpcError::Protocol(format!("invalid value for `{key}`: `{value}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn key(seed: u8) -> Key {
        Key::from_bytes([seed; 32])
    }

    fn sample_response() -> String {
        format!(
            "private_key={}\n\
             listen_port=51820\n\
             fwmark=32\n\
             public_key={}\n\
             preshared_key={}\n\
             endpoint=203.0.113.5:51820\n\
             persistent_keepalive_interval=25\n\
             allowed_ip=10.0.0.2/32\n\
             allowed_ip=fd00::2/128\n\
             rx_bytes=1024\n\
             tx_bytes=2048\n\
             last_handshake_time_sec=1700000000\n\
             last_handshake_time_nsec=500\n\
             protocol_version=1\n\
             public_key={}\n\
             preshared_key={}\n\
             last_handshake_time_sec=0\n\
             last_handshake_time_nsec=0\n\
             errno=0\n",
            key(1).to_hex(),
            key(2).to_hex(),
            key(3).to_hex(),
            key(4).to_hex(),
            Key::ZERO.to_hex(),
        )
    }

    #[test]
    fn parses_full_dump() {
        let dev = parse_get_response(&sample_response()).unwrap();
        assert_eq!(dev.private_key, Some(key(1)));
        assert_eq!(dev.listen_port, Some(51820));
        assert_eq!(dev.fwmark, Some(32));
        assert_eq!(dev.peers.len(), 2);

        let first = &dev.peers[0];
        assert_eq!(first.public_key, key(2));
        assert_eq!(first.preshared_key, Some(key(3)));
        assert_eq!(
            first.endpoint,
            Some(Endpoint::Addr(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)),
                51820
            )))
        );
        assert_eq!(first.persistent_keepalive, Some(25));
        assert_eq!(first.allowed_ips.len(), 2);
        assert_eq!(first.rx_bytes, 1024);
        assert_eq!(first.tx_bytes, 2048);
        assert_eq!(
            first.last_handshake,
            Some(UNIX_EPOCH + Duration::new(1_700_000_000, 500))
        );

        // Zero preshared key and zero handshake both read as absent.
        let second = &dev.peers[1];
        assert_eq!(second.public_key, key(4));
        assert!(second.preshared_key.is_none());
        assert!(second.last_handshake.is_none());
    }

    #[test]
    fn zero_private_key_reads_as_unset() {
        let response = format!("private_key={}\nerrno=0\n", Key::ZERO.to_hex());
        let dev = parse_get_response(&response).unwrap();
        assert!(dev.private_key.is_none());
    }

    #[test]
    fn device_errno_becomes_an_error() {
        let err = parse_get_response("errno=1\n").unwrap_err();
        assert!(matches!(err, IpcError::Device(1)));
    }

    #[test]
    fn missing_errno_is_a_protocol_error() {
        let err = parse_get_response("listen_port=51820\n").unwrap_err();
        assert!(matches!(err, IpcError::Protocol(_)));
    }

    #[test]
    fn peer_key_before_public_key_is_rejected() {
        let response = format!("preshared_key={}\nerrno=0\n", key(5).to_hex());
        let err = parse_get_response(&response).unwrap_err();
        assert!(matches!(err, IpcError::Protocol(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_get_response("mystery=1\nerrno=0\n").unwrap_err();
        assert!(matches!(err, IpcError::Protocol(_)));
    }

    #[test]
    fn encodes_interface_lines_before_peers() {
        let mut dev = DeviceConfig::new("wg0");
        dev.private_key = Some(key(1));
        dev.listen_port = Some(51820);
        dev.fwmark = Some(0);
        dev.replace_peers = true;

        let mut peer = Peer::new(key(2));
        peer.preshared_key = Some(key(3));
        peer.endpoint = Some(Endpoint::Addr("203.0.113.5:51820".parse().unwrap()));
        peer.persistent_keepalive = Some(25);
        peer.replace_allowed_ips = true;
        peer.allowed_ips
            .push(AllowedIp::host(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        dev.peers.push(peer);

        let request = encode_set_request(&dev).unwrap();
        let expected = format!(
            "set=1\n\
             private_key={}\n\
             listen_port=51820\n\
             fwmark=0\n\
             replace_peers=true\n\
             public_key={}\n\
             preshared_key={}\n\
             endpoint=203.0.113.5:51820\n\
             persistent_keepalive_interval=25\n\
             replace_allowed_ips=true\n\
             allowed_ip=10.0.0.2/32\n\
             \n",
            key(1).to_hex(),
            key(2).to_hex(),
            key(3).to_hex(),
        );
        assert_eq!(request, expected);
    }

    #[test]
    fn removal_records_encode_identity_and_directive_only() {
        let mut dev = DeviceConfig::new("wg0");
        let mut removal = Peer::removal(key(9));
        // Even stray fields on a removal stay off the wire.
        removal.persistent_keepalive = Some(25);
        dev.peers.push(removal);

        let request = encode_set_request(&dev).unwrap();
        let expected = format!("set=1\npublic_key={}\nremove=true\n\n", key(9).to_hex());
        assert_eq!(request, expected);
    }

    #[test]
    fn named_endpoints_are_rejected_by_the_encoder() {
        let mut dev = DeviceConfig::new("wg0");
        let mut peer = Peer::new(key(2));
        peer.endpoint = Some(Endpoint::Name {
            host: "vpn.example.com".to_string(),
            port: 51820,
        });
        dev.peers.push(peer);

        let err = encode_set_request(&dev).unwrap_err();
        assert!(matches!(err, IpcError::UnresolvedEndpoint(_)));
    }

    #[test]
    fn set_response_parses_errno() {
        assert!(parse_set_response("errno=0\n").is_ok());
        assert!(matches!(
            parse_set_response("errno=22\n").unwrap_err(),
            IpcError::Device(22)
        ));
        assert!(matches!(
            parse_set_response("").unwrap_err(),
            IpcError::Protocol(_)
        ));
    }
}
