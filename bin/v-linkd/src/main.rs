//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "binary"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Binary entrypoint for the V-Link daemon."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::info;

use v_link_common::{init_tracing, Config, LogFormat};
use v_link_core::Service;
use v_link_serial::SerialEndpoint;
use v_link_store::RedisBus;

/// Settle time between the device handshake and the initial state push.
const INITIAL_PUSH_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "UART / state-bus bridge for the BLE co-processor",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "PATH", default_value = "/dev/ttymxc1", help = "Serial device path")]
    serial: String,

    #[arg(long, default_value_t = 115_200, help = "Serial baud rate")]
    baud: u32,

    #[arg(long = "redis-addr", default_value = "localhost:6379", help = "Redis server address")]
    redis_addr: String,

    #[arg(long = "redis-pass", default_value = "", help = "Redis password")]
    redis_pass: String,

    #[arg(long = "redis-db", default_value_t = 0, help = "Redis database number")]
    redis_db: i64,

    #[arg(long, value_enum, default_value = "structured-json", help = "Log output format")]
    log_format: CliLogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    StructuredJson,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::StructuredJson => LogFormat::StructuredJson,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Config {
            serial_device: cli.serial.clone(),
            baud_rate: cli.baud,
            redis_addr: cli.redis_addr.clone(),
            redis_password: cli.redis_pass.clone(),
            redis_db: cli.redis_db,
            log_format: cli.log_format.into(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from(&cli);
    init_tracing("v-linkd", config.log_format)?;
    info!(
        serial = %config.serial_device,
        baud = config.baud_rate,
        redis = %config.redis_addr,
        "starting bridge daemon"
    );

    // Both startup failures are fatal: without the bus or the port there is
    // nothing to bridge.
    let store = RedisBus::connect(&config)
        .await
        .context("failed to connect to the state bus")?;
    info!("connected to the state bus");

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let endpoint = Arc::new(
        SerialEndpoint::open(&config.serial_device, config.baud_rate, frames_tx)
            .context("failed to open the serial port")?,
    );

    let service = Arc::new(Service::new(Arc::new(store), endpoint.clone()));
    let handle = service.clone().start(frames_rx).await?;

    service.initialize_device().await;
    tokio::time::sleep(INITIAL_PUSH_DELAY).await;
    service.push_initial_state().await;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    info!("shutting down");
    handle.shutdown().await?;
    endpoint.close();
    Ok(())
}
