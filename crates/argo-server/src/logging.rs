//! Structured logging for the Argo query server
//!
//! Everything is driven by [`LoggingConfig`]: the filter comes from
//! `logging.level`, the layers from `logging.format` and `logging.output`.
//! Environment overrides (`RUST_LOG`, `LOG_FORMAT`, ...) are folded into the
//! config by [`crate::config::Config::load`] before [`init`] runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "argo-server.log";

/// Third-party targets held at `warn` whatever the configured level.
const QUIET_TARGETS: [&str; 5] = ["hyper", "tower", "h2", "reqwest", "rustls"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured; local development
    #[default]
    Pretty,
    /// One JSON object per line, current span included
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    /// Daily rolling files under `logging.directory`
    File,
    Both,
}

impl LogOutput {
    fn to_stdout(self) -> bool {
        matches!(self, LogOutput::Stdout | LogOutput::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// An unrecognised `format` or `output` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownSetting {
    kind: &'static str,
    value: String,
}

impl FromStr for LogFormat {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(UnknownSetting {
                kind: "log format",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LogOutput {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            _ => Err(UnknownSetting {
                kind: "log output",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        })
    }
}

impl fmt::Display for LogOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogOutput::Stdout => "stdout",
            LogOutput::File => "file",
            LogOutput::Both => "both",
        })
    }
}

/// Build the filter for `level` (anything `RUST_LOG` accepts), with the
/// quiet targets appended.
pub fn env_filter(level: &str) -> Result<EnvFilter, ParseError> {
    let mut directives = vec![level.trim().to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
    EnvFilter::try_new(directives.join(","))
}

fn stdout_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer();
    match format {
        LogFormat::Pretty => layer.pretty().with_thread_ids(true).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Install the global subscriber described by `config`.
///
/// An invalid `level` falls back to `info` and is reported once the
/// subscriber is up. A second call is a no-op.
pub fn init(config: &LoggingConfig) {
    let (filter, bad_level) = match env_filter(&config.level) {
        Ok(filter) => (filter, None),
        Err(err) => (
            env_filter("info").unwrap_or_else(|_| EnvFilter::new("info")),
            Some(err),
        ),
    };

    let stdout = config.output.to_stdout().then(|| stdout_layer(config.format));
    let file = config.output.to_file().then(|| {
        std::fs::create_dir_all(&config.directory).ok();
        let appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, LOG_FILE_PREFIX);
        tracing_subscriber::fmt::layer()
            .with_writer(appender)
            .with_ansi(false)
            .boxed()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init();

    if let Some(err) = bad_level {
        tracing::warn!(level = %config.level, error = %err, "Invalid log level, using info");
    }
    tracing::info!(
        format = %config.format,
        output = %config.output,
        directory = %config.directory,
        "Logging initialized"
    );
}

/// Emit a named structured event.
///
/// ```rust
/// argo_server::log_event!(INFO, "query_completed", rows = 12, duration_ms = 840);
/// ```
#[macro_export]
macro_rules! log_event {
    ($level:ident, $event:literal $(, $($fields:tt)+)?) => {
        tracing::event!(tracing::Level::$level, event = $event $(, $($fields)+)?)
    };
}
