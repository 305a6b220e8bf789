use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Per-target overrides, e.g. `blocklink_session=trace,blocklink_frame=debug`.
pub const LOG_ENV: &str = "BLOCKLINK_LOG";

/// Targets that follow `--log-level`; everything else is capped at `warn`.
const LINK_TARGETS: [&str; 4] = [
    "blocklink",
    "blocklink_transport",
    "blocklink_frame",
    "blocklink_session",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Build the target filter from `--log-level` and optional overrides.
///
/// Invalid override directives are reported on stderr and ignored.
pub fn log_filter(level: LogLevel, overrides: Option<&str>) -> Targets {
    if let Some(directives) = overrides.filter(|d| !d.trim().is_empty()) {
        match directives.parse::<Targets>() {
            Ok(targets) => return targets,
            Err(err) => eprintln!("warning: ignoring invalid {LOG_ENV}: {err}"),
        }
    }

    let level = LevelFilter::from(level);
    LINK_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Install the stderr subscriber. Stdout is reserved for command output.
///
/// Thread names are kept so supervisor and listener threads can be told apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let overrides = std::env::var(LOG_ENV).ok();
    let filter = log_filter(level, overrides.as_deref());
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(false);

    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json())
            .with(filter)
            .try_init(),
    };
}
