//! Tool-level operations: parse a file, optionally reconcile it, and push
//! it to the interface, plus the read-side counterparts.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::info;
use wgsync_ipc::{DeviceBackend, IpcError};
use wgsync_model::{
    compose_config, parse_config, validate_interface_name, ConfigFileError, DeviceConfig, Key,
    ParseMode, KEY_LEN,
};

use crate::reconcile::{sync_device, SyncError};

/// Result type for tool operations.
pub type OpResult<T> = Result<T, OpError>;

/// Errors surfaced by tool operations.
#[derive(Debug, Error)]
pub enum OpError {
    /// The interface name would be rejected by the kernel.
    #[error("invalid interface name `{0}`")]
    InterfaceName(String),

    /// The configuration file did not parse.
    #[error("configuration parsing error: {0}")]
    Config(#[from] ConfigFileError),

    /// Reconciliation against live state failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The interface rejected the configuration or could not be reached.
    #[error("unable to modify interface: {0}")]
    Apply(#[source] IpcError),

    /// The interface state could not be read.
    #[error("unable to read interface: {0}")]
    Fetch(#[source] IpcError),
}

/// How a parsed configuration is pushed to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Replace the whole configuration with the file's contents.
    Set,
    /// Add the file's contents on top of whatever is live.
    Append,
    /// Reconcile: apply the minimal delta between file and live state.
    Sync,
}

/// Parses `text` and applies it to `interface` according to `mode`.
pub async fn apply_conf(
    backend: &dyn DeviceBackend,
    interface: &str,
    text: &str,
    mode: ApplyMode,
) -> OpResult<()> {
    validate_interface_name(interface)
        .map_err(|_| OpError::InterfaceName(interface.to_string()))?;

    let parse_mode = match mode {
        ApplyMode::Append => ParseMode::Append,
        ApplyMode::Set | ApplyMode::Sync => ParseMode::Replace,
    };
    let mut desired = parse_config(text, parse_mode)?;
    desired.name = interface.to_string();

    if mode == ApplyMode::Sync {
        desired = sync_device(desired, backend).await?;
    }
    backend.set_device(&desired).await.map_err(OpError::Apply)?;
    info!(
        interface,
        mode = ?mode,
        peers = desired.peers.len(),
        "configuration applied"
    );
    Ok(())
}

/// Fetches the live configuration of `interface`.
pub async fn fetch_device(backend: &dyn DeviceBackend, interface: &str) -> OpResult<DeviceConfig> {
    validate_interface_name(interface)
        .map_err(|_| OpError::InterfaceName(interface.to_string()))?;
    backend.get_device(interface).await.map_err(OpError::Fetch)
}

/// Fetches the live configuration of `interface` and renders it in
/// configuration file form.
pub async fn show_conf(backend: &dyn DeviceBackend, interface: &str) -> OpResult<String> {
    let dev = fetch_device(backend, interface).await?;
    Ok(compose_config(&dev))
}

/// Generates a random preshared key.
pub fn generate_psk() -> Key {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    Key::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_random_and_sized() {
        let one = generate_psk();
        let two = generate_psk();
        assert_ne!(one, two);
        assert!(!one.is_zero());
        assert_eq!(one.to_base64().len(), 44);
    }
}
