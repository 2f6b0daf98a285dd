pub mod autostart;
pub mod cli;
pub mod shutdown;

#[cfg(windows)]
mod app;
#[cfg(windows)]
mod desktop;
#[cfg(windows)]
mod elevation;
#[cfg(windows)]
mod signals;
#[cfg(windows)]
mod tray_backend;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub use cli::Cli;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Binary entry point. `--version` and `--help` exit inside argument
/// parsing, before logging or any component starts.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    run_app(cli)
}

#[cfg(windows)]
fn run_app(cli: Cli) -> ExitCode {
    app::run(cli)
}

#[cfg(not(windows))]
fn run_app(_cli: Cli) -> ExitCode {
    tracing::error!("{} only runs on Windows", bongo_core::app_title());
    ExitCode::from(1)
}
