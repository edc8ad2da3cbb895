//! Device backends: how the rest of wgsync reads and writes interface
//! state without knowing about sockets.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net;
use tracing::{debug, trace};
use wgsync_model::{DeviceConfig, Endpoint};

use crate::transport::{ControlSocket, IpcError, IpcResult, DEFAULT_SOCKET_DIR, DEFAULT_TIMEOUT};
use crate::uapi;

/// Reads and writes whole-interface configurations.
///
/// The production implementation is [`UapiBackend`]; tests substitute
/// their own.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Fetches the full current configuration of the named interface.
    async fn get_device(&self, name: &str) -> IpcResult<DeviceConfig>;

    /// Applies a configuration to the interface it names.
    async fn set_device(&self, dev: &DeviceConfig) -> IpcResult<()>;
}

/// Backend speaking the control protocol over per-interface Unix sockets.
#[derive(Debug, Clone)]
pub struct UapiBackend {
    socket_dir: PathBuf,
    timeout: Duration,
}

impl UapiBackend {
    /// A backend using the standard socket directory.
    pub fn new() -> Self {
        Self::with_socket_dir(DEFAULT_SOCKET_DIR)
    }

    /// A backend whose sockets live under `dir`.
    pub fn with_socket_dir(dir: impl Into<PathBuf>) -> Self {
        UapiBackend {
            socket_dir: dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-operation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The control socket path for `name`.
    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(format!("{name}.sock"))
    }
}

impl Default for UapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBackend for UapiBackend {
    async fn get_device(&self, name: &str) -> IpcResult<DeviceConfig> {
        let path = self.socket_path(name);
        debug!(interface = name, socket = %path.display(), "fetching device state");
        let mut socket = ControlSocket::connect(&path, self.timeout).await?;
        let response = socket.exchange(&uapi::encode_get_request()).await?;
        let mut dev = uapi::parse_get_response(&response)?;
        dev.name = name.to_string();
        trace!(interface = name, peers = dev.peers.len(), "fetched device state");
        Ok(dev)
    }

    async fn set_device(&self, dev: &DeviceConfig) -> IpcResult<()> {
        let mut resolved = dev.clone();
        resolve_endpoints(&mut resolved).await?;
        let request = uapi::encode_set_request(&resolved)?;

        let path = self.socket_path(&dev.name);
        debug!(
            interface = %dev.name,
            socket = %path.display(),
            peers = dev.peers.len(),
            "applying device configuration"
        );
        let mut socket = ControlSocket::connect(&path, self.timeout).await?;
        let response = socket.exchange(&request).await?;
        uapi::parse_set_response(&response)
    }
}

/// Resolves any named endpoints in `dev` to socket addresses. The first
/// address a lookup yields wins.
pub async fn resolve_endpoints(dev: &mut DeviceConfig) -> IpcResult<()> {
    for peer in &mut dev.peers {
        if let Some(Endpoint::Name { host, port }) = &peer.endpoint {
            let target = format!("{host}:{port}");
            let addr = net::lookup_host(&target)
                .await?
                .next()
                .ok_or_else(|| IpcError::Resolve(target.clone()))?;
            trace!(endpoint = %target, resolved = %addr, "resolved peer endpoint");
            peer.endpoint = Some(Endpoint::Addr(addr));
        }
    }
    Ok(())
}
