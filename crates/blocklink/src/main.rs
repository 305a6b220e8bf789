mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "blocklink",
    version,
    about = "Talk to a serial-attached microcontroller"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "blocklink",
            "send",
            "/dev/ttyACM0",
            "-g",
            "1",
            "-v",
            "2",
            "-d",
            "5",
            "--number",
            "7",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send subcommand");
        };
        assert_eq!(args.group, "1");
        assert_eq!(args.var, 2);
        assert_eq!(args.code, 5);
        assert_eq!(args.number, Some(7));
        assert_eq!(args.device.baud, 9600);
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "blocklink",
            "send",
            "/dev/ttyACM0",
            "--group",
            "1",
            "--code",
            "5",
            "--number",
            "7",
            "--data",
            "on",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_firmware_with_unix_socket_and_timeout() {
        let cli = Cli::try_parse_from([
            "blocklink",
            "firmware",
            "/tmp/device.sock",
            "--unix",
            "--ack-timeout",
            "500ms",
            "--format",
            "json",
        ])
        .expect("firmware args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Command::Firmware(args) = cli.command else {
            panic!("expected firmware subcommand");
        };
        assert!(args.device.unix);
        assert_eq!(args.device.ack_timeout, "500ms");
    }

    #[test]
    fn parses_monitor_count() {
        let cli = Cli::try_parse_from(["blocklink", "monitor", "/dev/ttyUSB0", "--count", "3"])
            .expect("monitor args should parse");
        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor subcommand");
        };
        assert_eq!(args.count, Some(3));
        assert!(!args.device.unix);
    }
}
