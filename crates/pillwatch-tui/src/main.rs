//! `pillwatch` — terminal admin panel for a medication-tracking
//! home-automation integration.
//!
//! Built on [ratatui](https://ratatui.rs) with live data from
//! `pillwatch-core`'s [`Controller`](pillwatch_core::Controller): the full
//! entity snapshot is loaded over REST, then kept current through the
//! WebSocket event bus. The panel shows one card per medication sensor
//! with quick actions (mark taken, snooze, test notification) and a
//! chronological table of today's doses.
//!
//! Logs are written to a file (default `/tmp/pillwatch.log`) to avoid
//! corrupting the terminal UI.
//!
//! Entry point: CLI argument parsing, tracing setup, panic hooks, and app launch.

mod action;
mod app;
mod component;
mod data_bridge;
mod event;
mod panel;
mod surface;
mod theme;
mod tui;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use secrecy::SecretString;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pillwatch_core::{Controller, ControllerConfig};

use crate::app::App;
use crate::surface::PanelConfig;

/// Terminal admin panel for the pill_assistant integration.
#[derive(Parser, Debug)]
#[command(name = "pillwatch", version, about)]
struct Cli {
    /// Home Assistant URL (e.g., http://homeassistant.local:8123)
    #[arg(short = 'u', long, env = "PILLWATCH_URL")]
    url: Option<String>,

    /// Long-lived access token for an administrator account
    #[arg(short = 't', long, env = "PILLWATCH_TOKEN")]
    token: Option<String>,

    /// CSV dose-log location shown in the header badge
    #[arg(long, env = "PILLWATCH_LOG_PATH")]
    csv_log: Option<String>,

    /// Log file path (defaults to /tmp/pillwatch.log)
    #[arg(long, default_value = "/tmp/pillwatch.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Set up file-based tracing. We MUST NOT log to stdout/stderr — that would
/// corrupt the TUI output. Returns a guard that must be held for the
/// lifetime of the application to ensure logs are flushed.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pillwatch={log_level}")));

    let log_dir = cli
        .log_file
        .parent()
        .unwrap_or(std::path::Path::new("/tmp"));
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("pillwatch.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}

/// Build a [`Controller`] from CLI args, if both URL and token were given.
fn build_controller(cli: &Cli) -> Result<Option<Controller>> {
    let (Some(url_str), Some(token)) = (cli.url.as_deref(), cli.token.as_deref()) else {
        return Ok(None);
    };
    let url = url_str.parse()?;
    let config = ControllerConfig::new(url, SecretString::from(token.to_owned()));
    Ok(Some(Controller::new(config)))
}

/// Try loading a controller from the shared config file.
fn build_controller_from_config(config: &pillwatch_config::Config) -> Option<Controller> {
    let controller_config = pillwatch_config::to_controller_config(config).ok()?;
    Some(Controller::new(controller_config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Install panic/error hooks BEFORE entering the terminal
    tui::install_hooks()?;

    // Tracing to file — hold the guard so logs flush on exit
    let _log_guard = setup_tracing(&cli);

    info!(
        url = cli.url.as_deref().unwrap_or("(not set)"),
        "starting pillwatch"
    );

    let file_config = pillwatch_config::load_config_or_default();

    // Priority: CLI flags > config file
    let controller =
        build_controller(&cli)?.or_else(|| build_controller_from_config(&file_config));

    let panel_config = PanelConfig {
        log_path: cli.csv_log.clone().or(file_config.log_path),
    };

    let mut app = App::new(controller, panel_config);
    app.run().await?;

    Ok(())
}
