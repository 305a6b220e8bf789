use std::path::PathBuf;
use std::time::Duration;

use blocklink_frame::{DeviceRecord, Envelope};
use blocklink_session::{Bridge, BridgeConfig, LinkError, Listener};
use blocklink_transport::{Connector, SerialConnector, DEFAULT_BAUD_RATE};
use clap::{Args, Subcommand};

use crate::exit::{link_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod firmware;
pub mod monitor;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every device record the microcontroller reports.
    Monitor(MonitorArgs),
    /// Write one device record and print the acknowledgement.
    Send(SendArgs),
    /// Query the microcontroller firmware version.
    Firmware(FirmwareArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Firmware(args) => firmware::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the microcontroller is and how to talk to it.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device path (or socket path with --unix).
    pub path: PathBuf,
    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, env = "BLOCKLINK_BAUD")]
    pub baud: u32,
    /// Treat PATH as a Unix domain socket (device simulators).
    #[arg(long)]
    pub unix: bool,
    /// How long to wait for each acknowledgement (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub ack_timeout: String,
    /// Pause before reopening a dropped link (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub reconnect_backoff: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Group identifier (G).
    #[arg(long, short = 'g')]
    pub group: String,
    /// Variable index (V).
    #[arg(long, short = 'v', default_value_t = 0)]
    pub var: i64,
    /// Device or command code (D).
    #[arg(long, short = 'd')]
    pub code: i64,
    /// String payload (DA).
    #[arg(long, conflicts_with = "number")]
    pub data: Option<String>,
    /// Numeric payload (DA).
    #[arg(long, conflicts_with = "data")]
    pub number: Option<i64>,
}

#[derive(Args, Debug)]
pub struct FirmwareArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// What the commands need from a running bridge, independent of transport.
pub trait BridgeHandle {
    fn write(&self, envelope: &Envelope) -> Result<Vec<DeviceRecord>, LinkError>;
    fn get_version(&self) -> Result<String, LinkError>;
    fn endpoint(&self) -> &str;
}

impl<C: Connector> BridgeHandle for Bridge<C> {
    fn write(&self, envelope: &Envelope) -> Result<Vec<DeviceRecord>, LinkError> {
        Bridge::write(self, envelope)
    }

    fn get_version(&self) -> Result<String, LinkError> {
        Bridge::get_version(self)
    }

    fn endpoint(&self) -> &str {
        Bridge::endpoint(self)
    }
}

/// Open the bridge described by `args`.
pub fn connect(args: &DeviceArgs, listeners: Vec<Listener>) -> CliResult<Box<dyn BridgeHandle>> {
    let config = BridgeConfig {
        ack_timeout: parse_duration(&args.ack_timeout)?,
        reconnect_backoff: parse_duration(&args.reconnect_backoff)?,
        ..BridgeConfig::default()
    };

    if args.unix {
        return connect_unix(args, config, listeners);
    }
    let bridge = Bridge::connect(SerialConnector::new(&args.path, args.baud), config, listeners)
        .map_err(|err| link_error("connect failed", err))?;
    Ok(Box::new(bridge))
}

#[cfg(unix)]
fn connect_unix(
    args: &DeviceArgs,
    config: BridgeConfig,
    listeners: Vec<Listener>,
) -> CliResult<Box<dyn BridgeHandle>> {
    let connector = blocklink_transport::UnixSocketConnector::new(&args.path);
    let bridge = Bridge::connect(connector, config, listeners)
        .map_err(|err| link_error("connect failed", err))?;
    Ok(Box::new(bridge))
}

#[cfg(not(unix))]
fn connect_unix(
    _args: &DeviceArgs,
    _config: BridgeConfig,
    _listeners: Vec<Listener>,
) -> CliResult<Box<dyn BridgeHandle>> {
    Err(CliError::new(USAGE, "--unix requires Unix domain socket support"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
