//! Parsing and composing the textual configuration format.
//!
//! The format is deliberately strict and small:
//!
//! ```text
//! [Interface]
//! PrivateKey = <base64>
//! ListenPort = 51820
//!
//! [Peer]
//! PublicKey = <base64>
//! AllowedIPs = 10.0.0.2/32, fd00::2/128
//! Endpoint = vpn.example.com:51820
//! ```
//!
//! Section and key names are case-insensitive, `#` starts a comment
//! anywhere on a line, and all whitespace is stripped before a line is
//! interpreted, so `AllowedIPs = a, b` and `allowedips=a,b` read the same.
//! Anything else is an error with a line number.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

use crate::device::{AllowedIp, DeviceConfig, DeviceParseError, Endpoint, Peer};
use crate::key::{Key, KeyError};

/// Result type for configuration file parsing.
pub type ConfigFileResult<T> = Result<T, ConfigFileError>;

/// Errors produced while parsing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// A `Key = Value` line appeared before any section header.
    #[error("line {line}: `{text}` is not inside a section")]
    OutsideSection {
        /// 1-based line number.
        line: usize,
        /// The offending line, cleaned.
        text: String,
    },

    /// A section header other than `[Interface]` or `[Peer]`.
    #[error("line {line}: unknown section `{text}`")]
    UnknownSection { line: usize, text: String },

    /// A non-empty line without a `=` separator.
    #[error("line {line}: expected `Key = Value`, got `{text}`")]
    MissingSeparator { line: usize, text: String },

    /// A key that does not belong to the current section.
    #[error("line {line}: unknown key `{key}`")]
    UnknownKey { line: usize, key: String },

    /// Base64 key material failed to decode.
    #[error("line {line}: {key}: {source}")]
    BadKey {
        line: usize,
        key: &'static str,
        #[source]
        source: KeyError,
    },

    /// An address, network or endpoint failed to parse.
    #[error("line {line}: {key}: {source}")]
    BadAddress {
        line: usize,
        key: &'static str,
        #[source]
        source: DeviceParseError,
    },

    /// A numeric field failed to parse or was out of range.
    #[error("line {line}: invalid value for {key}: `{value}`")]
    BadNumber {
        line: usize,
        key: &'static str,
        value: String,
    },

    /// A `[Peer]` section that never named a `PublicKey`.
    #[error("peer section starting at line {line} has no PublicKey")]
    PeerWithoutKey { line: usize },
}

/// How a parsed file is meant to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Wholesale replace: omitted interface fields clear live values and
    /// unlisted peers are dropped on apply.
    Replace,
    /// Additive: only touch what the file mentions.
    Append,
}

/// A `[Peer]` section being accumulated; peers become `Peer` records once
/// the section ends and the mandatory `PublicKey` is known.
struct PeerSection {
    /// Line the section header sits on, for error reporting.
    line: usize,
    public_key: Option<Key>,
    preshared_key: Option<Key>,
    endpoint: Option<Endpoint>,
    allowed_ips: Vec<AllowedIp>,
    persistent_keepalive: Option<u16>,
}

impl PeerSection {
    fn new(line: usize) -> Self {
        PeerSection {
            line,
            public_key: None,
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
        }
    }

    fn finish(self) -> ConfigFileResult<Peer> {
        let public_key = self
            .public_key
            .ok_or(ConfigFileError::PeerWithoutKey { line: self.line })?;
        Ok(Peer {
            public_key,
            preshared_key: self.preshared_key,
            endpoint: self.endpoint,
            allowed_ips: self.allowed_ips,
            persistent_keepalive: self.persistent_keepalive,
            remove: false,
            // File peers always carry a full allowed-IP list, never a delta.
            replace_allowed_ips: true,
            rx_bytes: 0,
            tx_bytes: 0,
            last_handshake: None,
        })
    }
}

enum Section {
    Preamble,
    Interface,
    Peer(PeerSection),
}

/// Parses configuration text into a device descriptor.
///
/// In [`ParseMode::Replace`] the descriptor is prefilled so that omitted
/// interface fields reset their live counterparts: private key and fwmark
/// zeroed, listen port released, peers replaced wholesale.
pub fn parse_config(text: &str, mode: ParseMode) -> ConfigFileResult<DeviceConfig> {
    let mut dev = DeviceConfig::new("");
    if mode == ParseMode::Replace {
        dev.replace_peers = true;
        dev.private_key = Some(Key::ZERO);
        dev.listen_port = Some(0);
        dev.fwmark = Some(0);
    }

    let mut section = Section::Preamble;
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = clean_line(raw);
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("[interface]") {
            if let Section::Peer(peer) = std::mem::replace(&mut section, Section::Interface) {
                dev.peers.push(peer.finish()?);
            }
        } else if line.eq_ignore_ascii_case("[peer]") {
            let started = Section::Peer(PeerSection::new(line_no));
            if let Section::Peer(peer) = std::mem::replace(&mut section, started) {
                dev.peers.push(peer.finish()?);
            }
        } else if line.starts_with('[') {
            return Err(ConfigFileError::UnknownSection {
                line: line_no,
                text: line,
            });
        } else {
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigFileError::MissingSeparator {
                    line: line_no,
                    text: line,
                });
            };
            match &mut section {
                Section::Preamble => {
                    return Err(ConfigFileError::OutsideSection {
                        line: line_no,
                        text: line.clone(),
                    });
                }
                Section::Interface => parse_interface_line(&mut dev, line_no, key, value)?,
                Section::Peer(peer) => parse_peer_line(peer, line_no, key, value)?,
            }
        }
    }
    if let Section::Peer(peer) = section {
        dev.peers.push(peer.finish()?);
    }

    debug!(peers = dev.peers.len(), mode = ?mode, "parsed configuration");
    Ok(dev)
}

/// Strips the comment and every whitespace character from a raw line.
fn clean_line(raw: &str) -> String {
    let uncommented = match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    uncommented.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_interface_line(
    dev: &mut DeviceConfig,
    line: usize,
    key: &str,
    value: &str,
) -> ConfigFileResult<()> {
    if key.eq_ignore_ascii_case("privatekey") {
        let parsed = Key::from_base64(value).map_err(|source| ConfigFileError::BadKey {
            line,
            key: "PrivateKey",
            source,
        })?;
        dev.private_key = Some(parsed);
    } else if key.eq_ignore_ascii_case("listenport") {
        let port: u16 = value.parse().map_err(|_| ConfigFileError::BadNumber {
            line,
            key: "ListenPort",
            value: value.to_string(),
        })?;
        dev.listen_port = Some(port);
    } else if key.eq_ignore_ascii_case("fwmark") {
        dev.fwmark = Some(parse_fwmark(line, value)?);
    } else {
        return Err(ConfigFileError::UnknownKey {
            line,
            key: key.to_string(),
        });
    }
    Ok(())
}

fn parse_peer_line(
    peer: &mut PeerSection,
    line: usize,
    key: &str,
    value: &str,
) -> ConfigFileResult<()> {
    if key.eq_ignore_ascii_case("publickey") {
        let parsed = Key::from_base64(value).map_err(|source| ConfigFileError::BadKey {
            line,
            key: "PublicKey",
            source,
        })?;
        peer.public_key = Some(parsed);
    } else if key.eq_ignore_ascii_case("presharedkey") {
        let parsed = Key::from_base64(value).map_err(|source| ConfigFileError::BadKey {
            line,
            key: "PresharedKey",
            source,
        })?;
        peer.preshared_key = Some(parsed);
    } else if key.eq_ignore_ascii_case("allowedips") {
        // Multiple AllowedIPs lines accumulate rather than overwrite.
        for part in value.split(',') {
            let net: AllowedIp = part.parse().map_err(|source| ConfigFileError::BadAddress {
                line,
                key: "AllowedIPs",
                source,
            })?;
            peer.allowed_ips.push(net);
        }
    } else if key.eq_ignore_ascii_case("endpoint") {
        let parsed: Endpoint = value.parse().map_err(|source| ConfigFileError::BadAddress {
            line,
            key: "Endpoint",
            source,
        })?;
        peer.endpoint = Some(parsed);
    } else if key.eq_ignore_ascii_case("persistentkeepalive") {
        peer.persistent_keepalive = Some(parse_keepalive(line, value)?);
    } else {
        return Err(ConfigFileError::UnknownKey {
            line,
            key: key.to_string(),
        });
    }
    Ok(())
}

fn parse_fwmark(line: usize, value: &str) -> ConfigFileResult<u32> {
    if value.eq_ignore_ascii_case("off") {
        return Ok(0);
    }
    let (digits, radix) = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (value, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|_| ConfigFileError::BadNumber {
        line,
        key: "FwMark",
        value: value.to_string(),
    })
}

fn parse_keepalive(line: usize, value: &str) -> ConfigFileResult<u16> {
    if value.eq_ignore_ascii_case("off") {
        return Ok(0);
    }
    value.parse().map_err(|_| ConfigFileError::BadNumber {
        line,
        key: "PersistentKeepalive",
        value: value.to_string(),
    })
}

/// Renders a descriptor back into configuration file form.
///
/// Intended for descriptors fetched from a running interface: zero-valued
/// fields read as "unset" and are omitted, and removal records are
/// skipped.
pub fn compose_config(dev: &DeviceConfig) -> String {
    let mut out = String::from("[Interface]\n");
    if let Some(port) = dev.listen_port.filter(|port| *port != 0) {
        let _ = writeln!(out, "ListenPort = {port}");
    }
    if let Some(fwmark) = dev.fwmark.filter(|fwmark| *fwmark != 0) {
        let _ = writeln!(out, "FwMark = 0x{fwmark:x}");
    }
    if let Some(key) = dev.private_key.filter(|key| !key.is_zero()) {
        let _ = writeln!(out, "PrivateKey = {}", key.to_base64());
    }
    for peer in dev.peers.iter().filter(|peer| !peer.remove) {
        out.push_str("\n[Peer]\n");
        let _ = writeln!(out, "PublicKey = {}", peer.public_key.to_base64());
        if let Some(psk) = &peer.preshared_key {
            let _ = writeln!(out, "PresharedKey = {}", psk.to_base64());
        }
        if !peer.allowed_ips.is_empty() {
            let networks: Vec<String> = peer.allowed_ips.iter().map(AllowedIp::to_string).collect();
            let _ = writeln!(out, "AllowedIPs = {}", networks.join(", "));
        }
        if let Some(endpoint) = &peer.endpoint {
            let _ = writeln!(out, "Endpoint = {endpoint}");
        }
        if let Some(secs) = peer.persistent_keepalive.filter(|secs| *secs != 0) {
            let _ = writeln!(out, "PersistentKeepalive = {secs}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_b64(seed: u8) -> String {
        Key::from_bytes([seed; 32]).to_base64()
    }

    #[test]
    fn parses_interface_and_peer_sections() {
        let text = format!(
            "[Interface]\n\
             PrivateKey = {}\n\
             ListenPort = 51820\n\
             FwMark = 0x20\n\
             \n\
             [Peer]\n\
             PublicKey = {}\n\
             AllowedIPs = 10.0.0.2/32, fd00::2/128\n\
             Endpoint = 203.0.113.5:51820\n\
             PersistentKeepalive = 25\n",
            key_b64(1),
            key_b64(2),
        );
        let dev = parse_config(&text, ParseMode::Replace).unwrap();
        assert_eq!(dev.private_key, Some(Key::from_bytes([1; 32])));
        assert_eq!(dev.listen_port, Some(51820));
        assert_eq!(dev.fwmark, Some(0x20));
        assert!(dev.replace_peers);
        assert_eq!(dev.peers.len(), 1);

        let peer = &dev.peers[0];
        assert_eq!(peer.public_key, Key::from_bytes([2; 32]));
        assert_eq!(peer.allowed_ips.len(), 2);
        assert_eq!(peer.persistent_keepalive, Some(25));
        assert!(peer.replace_allowed_ips);
        assert!(!peer.remove);
    }

    #[test]
    fn replace_mode_prefills_interface_resets() {
        let dev = parse_config("[Interface]\n", ParseMode::Replace).unwrap();
        assert_eq!(dev.private_key, Some(Key::ZERO));
        assert_eq!(dev.listen_port, Some(0));
        assert_eq!(dev.fwmark, Some(0));
        assert!(dev.replace_peers);
    }

    #[test]
    fn append_mode_leaves_omissions_alone() {
        let text = format!("[Peer]\nPublicKey = {}\n", key_b64(3));
        let dev = parse_config(&text, ParseMode::Append).unwrap();
        assert_eq!(dev.private_key, None);
        assert_eq!(dev.listen_port, None);
        assert_eq!(dev.fwmark, None);
        assert!(!dev.replace_peers);
        assert!(dev.peers[0].replace_allowed_ips);
    }

    #[test]
    fn keys_and_sections_are_case_insensitive() {
        let text = format!(
            "[interface]\nlistenport=1234\n[PEER]\npublickey={}\n",
            key_b64(4)
        );
        let dev = parse_config(&text, ParseMode::Append).unwrap();
        assert_eq!(dev.listen_port, Some(1234));
        assert_eq!(dev.peers.len(), 1);
    }

    #[test]
    fn comments_and_whitespace_are_stripped() {
        let text = format!(
            "  [Interface]  # interface settings\n\
             Listen Port = 51820  # spaces inside the key are fine\n\
             # a full-line comment\n\
             \n\
             [Peer]\n\
             PublicKey = {}  # trailing\n",
            key_b64(5)
        );
        let dev = parse_config(&text, ParseMode::Append).unwrap();
        assert_eq!(dev.listen_port, Some(51820));
        assert_eq!(dev.peers.len(), 1);
    }

    #[test]
    fn multiple_allowed_ips_lines_accumulate() {
        let text = format!(
            "[Peer]\nPublicKey = {}\nAllowedIPs = 10.0.0.2/32\nAllowedIPs = 10.0.0.3/32\n",
            key_b64(6)
        );
        let dev = parse_config(&text, ParseMode::Append).unwrap();
        assert_eq!(dev.peers[0].allowed_ips.len(), 2);
    }

    #[test]
    fn keepalive_and_fwmark_accept_off() {
        let text = format!(
            "[Interface]\nFwMark = off\n[Peer]\nPublicKey = {}\nPersistentKeepalive = off\n",
            key_b64(7)
        );
        let dev = parse_config(&text, ParseMode::Append).unwrap();
        assert_eq!(dev.fwmark, Some(0));
        assert_eq!(dev.peers[0].persistent_keepalive, Some(0));
    }

    #[test]
    fn second_peer_section_starts_a_new_peer() {
        let text = format!(
            "[Peer]\nPublicKey = {}\n[Peer]\nPublicKey = {}\n",
            key_b64(8),
            key_b64(9)
        );
        let dev = parse_config(&text, ParseMode::Append).unwrap();
        assert_eq!(dev.peers.len(), 2);
        assert_eq!(dev.peers[0].public_key, Key::from_bytes([8; 32]));
        assert_eq!(dev.peers[1].public_key, Key::from_bytes([9; 32]));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_config("[Interface]\nBogus = 1\n", ParseMode::Append).unwrap_err();
        assert!(matches!(err, ConfigFileError::UnknownKey { line: 2, .. }));

        let err = parse_config("ListenPort = 1\n", ParseMode::Append).unwrap_err();
        assert!(matches!(err, ConfigFileError::OutsideSection { line: 1, .. }));

        let err = parse_config("[Interface]\nListenPort\n", ParseMode::Append).unwrap_err();
        assert!(matches!(err, ConfigFileError::MissingSeparator { line: 2, .. }));

        let err = parse_config("[Tunnel]\n", ParseMode::Append).unwrap_err();
        assert!(matches!(err, ConfigFileError::UnknownSection { line: 1, .. }));
    }

    #[test]
    fn peer_without_public_key_is_rejected() {
        let err = parse_config("[Peer]\nPersistentKeepalive = 25\n", ParseMode::Append)
            .unwrap_err();
        assert!(matches!(err, ConfigFileError::PeerWithoutKey { line: 1 }));
    }

    #[test]
    fn peer_keys_in_interface_section_are_rejected() {
        let text = format!("[Interface]\nPublicKey = {}\n", key_b64(10));
        let err = parse_config(&text, ParseMode::Append).unwrap_err();
        assert!(matches!(err, ConfigFileError::UnknownKey { line: 2, .. }));
    }

    #[test]
    fn compose_skips_unset_and_removed() {
        let mut dev = DeviceConfig::new("wg0");
        dev.listen_port = Some(0);
        dev.private_key = Some(Key::from_bytes([1; 32]));
        dev.peers.push(Peer::new(Key::from_bytes([2; 32])));
        dev.peers.push(Peer::removal(Key::from_bytes([3; 32])));

        let text = compose_config(&dev);
        assert!(!text.contains("ListenPort"));
        assert!(text.contains(&format!("PrivateKey = {}", key_b64(1))));
        assert!(text.contains(&format!("PublicKey = {}", key_b64(2))));
        assert!(!text.contains(&key_b64(3)));
    }

    #[test]
    fn compose_orders_interface_fields_like_show_output() {
        let mut dev = DeviceConfig::new("wg0");
        dev.listen_port = Some(51820);
        dev.fwmark = Some(0x20);
        dev.private_key = Some(Key::from_bytes([1; 32]));

        let text = compose_config(&dev);
        let listen = text.find("ListenPort").unwrap();
        let fwmark = text.find("FwMark = 0x20").unwrap();
        let private = text.find("PrivateKey").unwrap();
        assert!(listen < fwmark && fwmark < private);
    }
}
