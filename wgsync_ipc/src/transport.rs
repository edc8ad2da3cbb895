//! Control-socket transport.
//!
//! Each running interface exposes a Unix socket at
//! `<socket dir>/<interface>.sock`. A client connects, writes one request,
//! and reads response lines until a blank line. Connections are
//! per-operation; nothing is kept open between calls.
//!
//! Every read and write is wrapped in a timeout so a wedged device cannot
//! hang the tool, and responses are capped so a misbehaving device cannot
//! balloon memory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time;
use tracing::trace;

/// Directory where interface control sockets live by default.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single response. A device dump for even thousands of
/// peers stays far below this.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Result type for control-channel operations.
pub type IpcResult<T> = Result<T, IpcError>;

/// Errors that can occur on the control channel.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Could not reach the control socket. Usually the interface does not
    /// exist or the caller lacks permission.
    #[error("failed to connect to control socket {path}: {source}")]
    Connect {
        /// Socket path that was tried.
        path: PathBuf,
        /// Underlying connect error.
        source: io::Error,
    },

    /// An I/O error after the connection was established.
    #[error("I/O error on control socket: {0}")]
    Io(#[from] io::Error),

    /// An operation did not complete in time.
    #[error("control socket {operation} timed out after {timeout:?}")]
    Timeout {
        /// What was being attempted.
        operation: &'static str,
        /// The configured limit.
        timeout: Duration,
    },

    /// The device broke the line protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device processed the request and reported a failure.
    #[error("device returned errno {0}")]
    Device(i32),

    /// A named endpoint reached the wire encoder unresolved.
    #[error("endpoint `{0}` must be resolved before it can be applied")]
    UnresolvedEndpoint(String),

    /// DNS resolution for a named endpoint returned no addresses.
    #[error("could not resolve endpoint `{0}`")]
    Resolve(String),

    /// The response exceeded [`MAX_RESPONSE_BYTES`].
    #[error("control response too large: {0} bytes")]
    ResponseTooLarge(usize),
}

/// One connection to an interface's control socket.
pub struct ControlSocket {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl ControlSocket {
    /// Connects to the control socket at `path`.
    pub async fn connect(path: &Path, timeout: Duration) -> IpcResult<Self> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| IpcError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        trace!(path = %path.display(), "connected to control socket");
        let (reader, writer) = stream.into_split();
        Ok(ControlSocket {
            reader: BufReader::new(reader),
            writer,
            timeout,
        })
    }

    /// Sends one request and collects the response up to, but not
    /// including, the blank-line terminator.
    pub async fn exchange(&mut self, request: &str) -> IpcResult<String> {
        match time::timeout(self.timeout, self.writer.write_all(request.as_bytes())).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(IpcError::Timeout {
                    operation: "write",
                    timeout: self.timeout,
                })
            }
        }

        let mut response = String::new();
        loop {
            let mut line = String::new();
            let read = match time::timeout(self.timeout, self.reader.read_line(&mut line)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(IpcError::Timeout {
                        operation: "read",
                        timeout: self.timeout,
                    })
                }
            };
            if read == 0 {
                return Err(IpcError::Protocol(
                    "connection closed before response terminator".to_string(),
                ));
            }
            if line == "\n" {
                break;
            }
            response.push_str(&line);
            if response.len() > MAX_RESPONSE_BYTES {
                return Err(IpcError::ResponseTooLarge(response.len()));
            }
        }
        trace!(bytes = response.len(), "received control response");
        Ok(response)
    }
}
