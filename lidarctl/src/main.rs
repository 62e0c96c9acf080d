//! lidarctl
//!
//! Switch every LiDAR on the network on or off.
//!
//! # Usage
//!
//! ```bash
//! # Start scanning on every sensor found within the discovery window
//! lidarctl lidarctl.json on
//!
//! # Put them back to standby, report as JSON
//! lidarctl lidarctl.json off --json
//!
//! # Dry run against the simulated fleet described in the config file
//! lidarctl lidarctl.json on --simulate --log-level debug
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lidarctl::{
    ConfigError, ConsolePresenter, DeviceTransport, Error, FleetConfig, FleetController, FleetReport,
    JsonPresenter, Mode, SimulatedTransport, UdpTransport,
};

/// Discover LiDAR sensors and switch their work mode
#[derive(Parser, Debug)]
#[command(name = "lidarctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    config: PathBuf,

    /// Target state
    #[arg(value_enum)]
    mode: Switch,

    /// Use the simulated fleet from the configuration instead of the network
    #[arg(long)]
    simulate: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the discovery window from the configuration
    #[arg(long)]
    discovery_window_ms: Option<u64>,

    /// Override the command timeout from the configuration
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    /// Start scanning
    On,
    /// Go to standby
    Off,
}

impl From<Switch> for Mode {
    fn from(switch: Switch) -> Self {
        match switch {
            Switch::On => Mode::Active,
            Switch::Off => Mode::Standby,
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install log subscriber")
}

/// Config file with the command-line overrides applied, then validated
fn load_config(args: &Args) -> Result<FleetConfig, ConfigError> {
    info!("Loading config from {:?}", args.config);
    let mut config = FleetConfig::from_file(&args.config)?;

    if let Some(ms) = args.discovery_window_ms {
        config.discovery_window_ms = ms;
    }
    if let Some(ms) = args.timeout_ms {
        config.command_timeout_ms = ms;
    }
    config.validate()?;

    debug!(?config, "Effective configuration");
    Ok(config)
}

async fn run(args: Args) -> lidarctl::Result<FleetReport> {
    let config = load_config(&args)?;

    let transport: Arc<dyn DeviceTransport> = if args.simulate {
        Arc::new(SimulatedTransport::new(config.simulated_devices()?))
    } else {
        Arc::new(UdpTransport::with_config(config.udp()))
    };

    let mode = Mode::from(args.mode);
    let mut controller = FleetController::from_config(transport, &config);

    if args.json {
        controller.run(mode, &mut JsonPresenter::stdout()).await
    } else {
        controller.run(mode, &mut ConsolePresenter::stdout()).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("lidarctl: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(report) => {
            info!("Done: {}", report);
            ExitCode::SUCCESS
        }
        // Already presented as the report
        Err(e @ Error::NoDevicesFound) => e.exit_code(),
        Err(e) => {
            eprintln!("lidarctl: {}", e);
            e.exit_code()
        }
    }
}
