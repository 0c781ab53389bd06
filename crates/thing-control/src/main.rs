//! thing-agent - device agent keeping local state in sync with the cloud.
//!
//! `thing-agent run` starts the command and state report channels and runs
//! until interrupted with ctrl-c. `thing-agent report-once` prints the state
//! report the agent would send, without touching the network.
//!
//! Settings come from an optional JSON file (`--config`), then from
//! `THING_*` environment variables and flags, later sources winning.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thing_control::{
    Agent, AgentConfig, ChannelContext, Indicator, LedNames, LogIndicator, ShutdownCoordinator,
    SysfsRgbLed, TokioScheduler,
};
use thing_store::sensor::W1_DEVICES_DIR;
use thing_store::{render_report, MutexStateStore, StateStore, W1Sensor};
use thing_transport::TlsConnector;

/// Device agent synchronising local state with the cloud.
#[derive(Parser, Debug)]
#[command(name = "thing-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, short, env = "THING_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run both channels until ctrl-c (default).
    Run,
    /// Print one state report to stdout and exit.
    ReportOnce,
}

/// Settings that override the configuration file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Command channel host.
    #[arg(long, env = "THING_COMMAND_HOST")]
    command_host: Option<String>,

    /// Command channel port.
    #[arg(long, env = "THING_COMMAND_PORT")]
    command_port: Option<u16>,

    /// State report host.
    #[arg(long, env = "THING_REPORT_HOST")]
    report_host: Option<String>,

    /// State report port.
    #[arg(long, env = "THING_REPORT_PORT")]
    report_port: Option<u16>,

    /// Socket receive timeout in seconds (0 disables).
    #[arg(long, env = "THING_RECV_TIMEOUT")]
    recv_timeout: Option<u64>,

    /// Socket send timeout in seconds (0 disables).
    #[arg(long, env = "THING_SEND_TIMEOUT")]
    send_timeout: Option<u64>,

    /// Seconds between state reports.
    #[arg(long, env = "THING_UPDATE_PERIOD")]
    update_period: Option<u64>,

    /// Command channel buffer size in bytes.
    #[arg(long, env = "THING_COMMAND_BUFFER")]
    command_buffer: Option<usize>,

    /// Report channel buffer size in bytes.
    #[arg(long, env = "THING_REPORT_BUFFER")]
    report_buffer: Option<usize>,

    /// First reconnect delay in milliseconds.
    #[arg(long, env = "THING_RECONNECT_DELAY_MS")]
    reconnect_delay_ms: Option<u64>,

    /// Reconnect delay cap in milliseconds.
    #[arg(long, env = "THING_MAX_RECONNECT_DELAY_MS")]
    max_reconnect_delay_ms: Option<u64>,

    /// Channel exit poll interval in milliseconds.
    #[arg(long, env = "THING_EXIT_POLL_MS")]
    exit_poll_ms: Option<u64>,

    /// State lock timeout in milliseconds.
    #[arg(long, env = "THING_LOCK_TIMEOUT_MS")]
    lock_timeout_ms: Option<u64>,

    /// Thermometer `w1_slave` file; discovered when unset.
    #[arg(long, env = "THING_SENSOR_PATH")]
    sensor_path: Option<PathBuf>,

    /// Red indicator LED name under /sys/class/leds.
    #[arg(long, env = "THING_LED_RED")]
    led_red: Option<String>,

    /// Green indicator LED name.
    #[arg(long, env = "THING_LED_GREEN")]
    led_green: Option<String>,

    /// Blue indicator LED name.
    #[arg(long, env = "THING_LED_BLUE")]
    led_blue: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut AgentConfig) -> anyhow::Result<()> {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }

        set(&mut config.command_host, self.command_host);
        set(&mut config.command_port, self.command_port);
        set(&mut config.recv_timeout_seconds, self.recv_timeout);
        set(&mut config.send_timeout_seconds, self.send_timeout);
        set(&mut config.update_period_seconds, self.update_period);
        set(&mut config.command_buffer_size, self.command_buffer);
        set(&mut config.report_buffer_size, self.report_buffer);
        set(&mut config.reconnect_delay_ms, self.reconnect_delay_ms);
        set(&mut config.max_reconnect_delay_ms, self.max_reconnect_delay_ms);
        set(&mut config.exit_poll_ms, self.exit_poll_ms);
        set(&mut config.lock_timeout_ms, self.lock_timeout_ms);
        if self.report_host.is_some() {
            config.report_host = self.report_host;
        }
        if self.report_port.is_some() {
            config.report_port = self.report_port;
        }
        if self.sensor_path.is_some() {
            config.sensor_path = self.sensor_path;
        }

        match (self.led_red, self.led_green, self.led_blue) {
            (Some(red), Some(green), Some(blue)) => {
                config.led_names = Some(LedNames { red, green, blue });
            }
            (None, None, None) => {}
            _ => anyhow::bail!("indicator LEDs need all of red, green and blue"),
        }
        Ok(())
    }
}

fn load_config(cli: Cli) -> anyhow::Result<(AgentConfig, Command)> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    cli.overrides.apply(&mut config)?;
    config.validate()?;
    Ok((config, cli.command.unwrap_or(Command::Run)))
}

fn build_store(config: &AgentConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    let sensor = match &config.sensor_path {
        Some(path) => W1Sensor::new(path),
        None => W1Sensor::discover(W1_DEVICES_DIR)
            .with_context(|| format!("no 1-Wire thermometer found under {W1_DEVICES_DIR}"))?,
    };
    tracing::info!(path = %sensor.path().display(), "Using thermometer");
    Ok(Arc::new(MutexStateStore::new(sensor, config.lock_timeout())))
}

fn build_indicator(config: &AgentConfig) -> Arc<dyn Indicator> {
    match &config.led_names {
        Some(leds) => {
            tracing::info!(red = %leds.red, green = %leds.green, blue = %leds.blue, "Using LED indicator");
            Arc::new(SysfsRgbLed::new(
                thing_control::indicator::LEDS_DIR,
                &leds.red,
                &leds.green,
                &leds.blue,
            ))
        }
        None => {
            tracing::info!("No indicator LEDs configured, logging power changes");
            Arc::new(LogIndicator)
        }
    }
}

fn report_once(config: &AgentConfig) -> anyhow::Result<()> {
    let store = build_store(config)?;
    let report = render_report(&store.read()?)?;
    println!("{}", String::from_utf8_lossy(&report));
    Ok(())
}

async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let store = build_store(&config)?;
    let indicator = build_indicator(&config);
    let connector = TlsConnector::with_webpki_roots().context("failed to set up TLS")?;
    let coordinator = Arc::new(ShutdownCoordinator::new());

    let signals = Arc::clone(&coordinator);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                if signals.request_shutdown() {
                    tracing::info!("Interrupt received, shutting down");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c"),
        }
    });

    let exit_poll = config.exit_poll();
    let ctx = ChannelContext {
        connector: Arc::new(connector),
        coordinator: Arc::clone(&coordinator),
        scheduler: Arc::new(TokioScheduler::current()?),
        poll_interval: exit_poll,
    };
    let agent = Agent::new(config, ctx, store, indicator);
    let started = agent.start();

    coordinator.wait_for_exit(exit_poll).await;
    started?;
    tracing::info!("thing-agent stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,thing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, command) = load_config(Cli::parse())?;

    match command {
        Command::ReportOnce => report_once(&config),
        Command::Run => {
            tracing::info!(
                command = %config.command_endpoint(),
                report = %config.report_endpoint(),
                update_period_s = config.update_period_seconds,
                "Starting thing-agent"
            );
            run(config).await
        }
    }
}
