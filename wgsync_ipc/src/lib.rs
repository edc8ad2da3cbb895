//! Control-channel client for wgsync.
//!
//! Running interfaces are managed over per-interface Unix sockets that
//! speak a textual `key=value` protocol. This crate provides the
//! transport ([`transport`]), the wire codec ([`uapi`]), and the
//! [`DeviceBackend`] seam the higher layers program against.

pub mod backend;
pub mod transport;
pub mod uapi;

pub use backend::{resolve_endpoints, DeviceBackend, UapiBackend};
pub use transport::{
    ControlSocket, IpcError, IpcResult, DEFAULT_SOCKET_DIR, DEFAULT_TIMEOUT, MAX_RESPONSE_BYTES,
};
