//! Command-line interface for wgsync.
//!
//! Subcommands map one-to-one onto the tool operations: `syncconf`,
//! `addconf` and `setconf` push a configuration file to a running
//! interface with different apply semantics, `showconf` prints the live
//! state in file form, and `genpsk` emits a fresh preshared key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;
use wgsync_core::{apply_conf, generate_psk, show_conf, ApplyMode, OpError};
use wgsync_ipc::UapiBackend;

use crate::settings::Settings;

/// wgsync CLI application
#[derive(Parser)]
#[command(name = "wgsync", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the settings file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile a configuration file with a running interface
    Syncconf { interface: String, file: PathBuf },
    /// Append a configuration file to a running interface
    Addconf { interface: String, file: PathBuf },
    /// Replace a running interface's configuration wholesale
    Setconf { interface: String, file: PathBuf },
    /// Print a running interface's configuration in file form
    Showconf { interface: String },
    /// Generate a random preshared key
    Genpsk,
}

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Could not read the named configuration file.
    #[error("failed to read configuration file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tool operation failed.
    #[error(transparent)]
    Op(#[from] OpError),
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Runs the requested subcommand against the configured backend.
pub async fn run(cli: Cli, settings: &Settings) -> CliResult<()> {
    let backend = UapiBackend::with_socket_dir(&settings.control.socket_dir)
        .timeout(Duration::from_secs(settings.control.timeout_secs));

    match cli.command {
        Commands::Syncconf { interface, file } => {
            apply_file(&backend, &interface, &file, ApplyMode::Sync).await
        }
        Commands::Addconf { interface, file } => {
            apply_file(&backend, &interface, &file, ApplyMode::Append).await
        }
        Commands::Setconf { interface, file } => {
            apply_file(&backend, &interface, &file, ApplyMode::Set).await
        }
        Commands::Showconf { interface } => {
            let text = show_conf(&backend, &interface).await?;
            print!("{text}");
            Ok(())
        }
        Commands::Genpsk => {
            println!("{}", generate_psk().to_base64());
            Ok(())
        }
    }
}

/// Reads a configuration file and pushes it to `interface`.
async fn apply_file(
    backend: &UapiBackend,
    interface: &str,
    file: &Path,
    mode: ApplyMode,
) -> CliResult<()> {
    debug!(interface, file = %file.display(), mode = ?mode, "applying configuration file");
    let text = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| CliError::ReadConfig {
            path: file.to_path_buf(),
            source,
        })?;
    apply_conf(backend, interface, &text, mode).await?;
    Ok(())
}

/// True when the error chain bottoms out in a permission failure on the
/// control socket.
pub fn permission_denied(err: &CliError) -> bool {
    let mut cause: Option<&(dyn std::error::Error + 'static)> =
        Some(err as &(dyn std::error::Error + 'static));
    while let Some(current) = cause {
        if let Some(io_err) = current.downcast_ref::<std::io::Error>() {
            if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                return true;
            }
        }
        cause = current.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgsync_core::SyncError;
    use wgsync_ipc::IpcError;

    fn connect_error(kind: std::io::ErrorKind) -> IpcError {
        IpcError::Connect {
            path: PathBuf::from("/var/run/wireguard/wg0.sock"),
            source: std::io::Error::new(kind, "denied"),
        }
    }

    #[test]
    fn permission_errors_are_found_through_the_chain() {
        let err = CliError::Op(OpError::Sync(SyncError::Fetch(connect_error(
            std::io::ErrorKind::PermissionDenied,
        ))));
        assert!(permission_denied(&err));

        let err = CliError::Op(OpError::Apply(connect_error(
            std::io::ErrorKind::PermissionDenied,
        )));
        assert!(permission_denied(&err));
    }

    #[test]
    fn other_io_errors_are_not_permission_failures() {
        let err = CliError::Op(OpError::Fetch(connect_error(std::io::ErrorKind::NotFound)));
        assert!(!permission_denied(&err));

        let err = CliError::Op(OpError::Apply(IpcError::Device(11)));
        assert!(!permission_denied(&err));
    }
}
