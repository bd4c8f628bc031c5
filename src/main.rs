//! # CRSF Bridge
//!
//! Command line entry point.
//!
//! - `crsf-bridge slave`: owns the flight controller's serial link, runs the
//!   control loop, publishes telemetry and accepts master connections.
//! - `crsf-bridge master`: serves the HTTP API and forwards it to a slave.
//! - `crsf-bridge command`: hands command lines to a local slave through
//!   the spool file.
//!
//! Expected output when starting a slave:
//! ```text
//! INFO crsf_bridge: CRSF Bridge v0.1.0 starting (slave)
//! INFO crsf_bridge::serial: Opened serial port /dev/serial0 at 420000 baud
//! INFO crsf_bridge::bridge::slave: Bridge listening on 0.0.0.0:5760
//! INFO crsf_bridge::control::runner: Control loop running: tick 1ms, send period 10ms, min gap 2ms
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crsf_bridge::bridge::{api, MasterClient, SlaveHandle, SlaveServer};
use crsf_bridge::config::Config;
use crsf_bridge::control::{command_channel, parse_line, CommandSpool, ControlLoop, LoopTiming, SharedState};
use crsf_bridge::controller::{ChannelMapper, Joystick};
use crsf_bridge::serial::CrsfSerial;
use crsf_bridge::telemetry::logger::TelemetryLogger;
use crsf_bridge::telemetry::{TelemetryPublisher, TelemetryStore};

/// Bridge a flight controller's CRSF link to a companion computer
#[derive(Parser, Debug)]
#[command(name = "crsf-bridge", version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true, env = "CRSF_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run on the computer wired to the flight controller
    Slave {
        /// Do not require telemetry from the flight controller before
        /// sending non-safe throttle
        #[arg(long)]
        no_telemetry: bool,
    },

    /// Serve the HTTP API and forward it to the slave
    Master,

    /// Queue command lines for a slave on this machine
    Command {
        /// Spool file (defaults to bridge.spool_path)
        #[arg(long, value_name = "FILE")]
        spool: Option<PathBuf>,

        /// Lines such as "setChannel 5 1700" or "sendChannels"
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    let Some(path) = log_file else {
        registry.init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("Invalid log file path {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
    registry
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load {}", path.display())),
        None => {
            info!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

async fn run_slave(config: Config, no_telemetry: bool) -> Result<()> {
    let serial = CrsfSerial::open(&config.serial.port, config.serial.baud_rate)
        .context("Flight controller serial link unavailable")?;
    info!("Serial link on {}", serial.device_path());

    let state = SharedState::from_config(&config, no_telemetry);
    if state.link_status().requires_failsafe {
        info!("Throttle held at {} until telemetry arrives", state.failsafe_throttle());
    }
    let sensors = TelemetryStore::new();

    let (mut publisher, reports) = TelemetryPublisher::new(
        state.clone(),
        sensors.clone(),
        Duration::from_millis(config.telemetry.publish_interval_ms),
    );
    if let Some(path) = &config.telemetry.record_path {
        publisher = publisher.with_record_path(path);
    }
    if config.telemetry.log_enabled {
        let logger = TelemetryLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )
        .context("Failed to set up telemetry log")?;
        publisher = publisher.with_logger(logger, Duration::from_millis(config.telemetry.log_interval_ms));
    }

    let (commands, queue) = command_channel(config.bridge.command_queue_capacity);
    let mut control = ControlLoop::new(serial, state, sensors, queue, LoopTiming::from_config(&config))
        .with_rc_passthrough(config.crsf.rc_passthrough);

    if let Some(path) = &config.bridge.spool_path {
        info!("Reading command spool {}", path);
        control = control.with_spool(CommandSpool::new(path));
    }

    if config.controller.enabled {
        match Joystick::open(&config.controller.device_path).and_then(Joystick::spawn_reader) {
            Ok(axes) => {
                control = control.with_joystick(axes, ChannelMapper::from_config(&config));
            }
            Err(e) => warn!("Joystick unavailable ({}); joystick mode will stay manual", e),
        }
    }

    let server = SlaveServer::bind(&config.bridge.listen, SlaveHandle::new(commands, reports))
        .await
        .with_context(|| format!("Failed to listen on {}", config.bridge.listen))?;

    tokio::spawn(publisher.run());
    let bridge = tokio::spawn(server.run());

    info!("Press Ctrl+C to exit");
    tokio::select! {
        _ = control.run() => {}
        result = bridge => {
            match result {
                Ok(Err(e)) => bail!("Bridge server stopped: {}", e),
                Err(e) => bail!("Bridge server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}

async fn run_master(config: Config) -> Result<()> {
    let client = MasterClient::connect_tcp(&config.bridge);
    let listener = TcpListener::bind(&config.bridge.api_listen)
        .await
        .with_context(|| format!("Failed to listen on {}", config.bridge.api_listen))?;

    info!("Press Ctrl+C to exit");
    tokio::select! {
        result = api::serve(listener, client) => result.context("API server stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}

fn submit_commands(config: &Config, spool: Option<PathBuf>, lines: &[String]) -> Result<()> {
    let path = spool
        .or_else(|| config.bridge.spool_path.as_ref().map(PathBuf::from))
        .context("No spool file: pass --spool or set bridge.spool_path")?;

    let mut accepted = Vec::new();
    for line in lines {
        match parse_line(line) {
            Ok(Some(command)) => accepted.push(command.to_string()),
            Ok(None) => {}
            Err(e) => warn!("Skipping '{}': {}", line, e),
        }
    }
    if accepted.is_empty() {
        bail!("No valid commands to submit");
    }

    CommandSpool::new(&path)
        .submit(&accepted)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Queued {} commands in {}", accepted.len(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref())?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Slave { no_telemetry } => {
            info!("CRSF Bridge v{} starting (slave)", env!("CARGO_PKG_VERSION"));
            run_slave(config, no_telemetry).await
        }
        Commands::Master => {
            info!("CRSF Bridge v{} starting (master)", env!("CARGO_PKG_VERSION"));
            run_master(config).await
        }
        Commands::Command { spool, lines } => submit_commands(&config, spool, &lines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_slave_flags() {
        let cli = Cli::parse_from(["crsf-bridge", "--log-level", "debug", "slave", "--no-telemetry"]);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Slave { no_telemetry: true }));
    }

    #[test]
    fn test_command_requires_lines() {
        assert!(Cli::try_parse_from(["crsf-bridge", "command"]).is_err());
    }

    #[test]
    fn test_submit_commands_writes_only_valid_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("spool.txt");
        let lines = vec!["setChannel 5 1700".to_string(), "bogus".to_string()];

        submit_commands(&Config::default(), Some(path.clone()), &lines).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "setChannel 5 1700\n");
    }

    #[test]
    fn test_submit_commands_needs_a_spool() {
        let lines = vec!["sendChannels".to_string()];
        assert!(submit_commands(&Config::default(), None, &lines).is_err());
    }
}
