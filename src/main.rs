use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, EnvFilter};

use gemlogger::devices::{self, RiemannClient};
use gemlogger::{Config, Dispatcher, JsonSink, Pipeline, RiemannProtocol};

/// Reads a GEM energy monitor's serial feed, prints each reading as a JSON
/// line and forwards per-channel metrics to Riemann.
#[derive(Parser)]
#[command(name = "gemlogger")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Serial device the monitor is attached to [default: /dev/ttyUSB0]
    #[arg(long)]
    serial_port: Option<String>,

    /// Baud rate configured on the monitor [default: 19200]
    #[arg(long)]
    serial_baud: Option<u32>,

    /// Transport used to reach Riemann [default: tcp]
    #[arg(long, value_enum)]
    riemann_protocol: Option<ProtocolArg>,

    /// Riemann server host [default: riemann]
    #[arg(long)]
    riemann_host: Option<String>,

    /// Riemann server port [default: 5555]
    #[arg(long)]
    riemann_port: Option<u16>,

    /// Seconds each event stays valid in Riemann [default: 15]
    #[arg(long)]
    ttl: Option<f32>,

    /// `host` label attached to every event [default: "main electrical panel"]
    #[arg(long)]
    host: Option<String>,

    /// Read lines from a captured trace file instead of the serial port
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Write logs to a daily-rotated file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Tcp,
    Udp,
}

impl From<ProtocolArg> for RiemannProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => RiemannProtocol::Tcp,
            ProtocolArg::Udp => RiemannProtocol::Udp,
        }
    }
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            serial_port: self.serial_port.clone().unwrap_or(defaults.serial_port),
            serial_baud: self.serial_baud.unwrap_or(defaults.serial_baud),
            riemann_protocol: self
                .riemann_protocol
                .map(RiemannProtocol::from)
                .unwrap_or(defaults.riemann_protocol),
            riemann_host: self.riemann_host.clone().unwrap_or(defaults.riemann_host),
            riemann_port: self.riemann_port.unwrap_or(defaults.riemann_port),
            ttl: self.ttl.unwrap_or(defaults.ttl),
            event_host: self.host.clone().unwrap_or(defaults.event_host),
            replay: self.replay.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Held until exit so buffered log lines reach the file.
    let _guard = setup_logging(cli.log_dir.as_deref());
    let config = cli.config();
    info!("Starting gemlogger: {:?}", config);

    let source = devices::open_source(&config).context("Could not open the monitor feed")?;

    let address = config.riemann_addr();
    let client = RiemannClient::connect(config.riemann_protocol, &address)
        .with_context(|| format!("Could not connect to riemann at {}", address))?;

    let dispatcher = Dispatcher::new(client, config.event_host.clone(), config.ttl);
    let console = JsonSink::new(io::stdout().lock());
    let mut pipeline = Pipeline::new(console, dispatcher);

    let result = pipeline.run(source);
    let stats = pipeline.stats();
    info!(
        "Processed {} lines: {} requests, {} skipped, {} records, {} events sent, {} dispatch failures",
        stats.lines,
        stats.requests,
        stats.skipped,
        stats.emitted,
        stats.events_sent,
        stats.dispatch_failures
    );

    if let Err(e) = result {
        error!("Monitor feed failed: {}", e);
        return Err(e).context("Reading the monitor feed failed");
    }

    info!("Monitor feed ended, shutting down");
    Ok(())
}

fn setup_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the JSON records, so logs never go there
    match log_dir {
        Some(dir) => {
            let file_appender = rolling::daily(dir, "gemlogger.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_level(true)
                .init();
            Some(guard)
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_level(true)
                .init();
            None
        }
    }
}
