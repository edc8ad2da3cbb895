//! wgsync: synchronize declarative tunnel configurations with running
//! interfaces.

mod cli;
mod logging;
mod settings;

use clap::Parser;
use nix::unistd::Uid;
use tracing::{error, warn};

use crate::cli::Cli;
use crate::logging::LogOptions;
use crate::settings::Settings;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            // Logging is not up yet; report directly.
            eprintln!("wgsync: {err}");
            std::process::exit(1);
        }
    };

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&settings.log_level);
    let _guard = logging::init(LogOptions {
        level: logging::parse_level(level),
        log_dir: settings.logging.directory.clone(),
        log_file_name: settings.logging.file_name.clone(),
    });

    if let Err(err) = cli::run(args, &settings).await {
        error!("{err}");
        if cli::permission_denied(&err) && !Uid::effective().is_root() {
            warn!("the control socket requires privileges, try again as root");
        }
        std::process::exit(1);
    }
}
