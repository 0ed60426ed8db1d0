//! Tracing Infrastructure
//!
//! Structured, async-aware logging for applications using the probe drivers.
//! Library crates only emit `tracing` events; this module installs the
//! subscriber that renders them:
//! - Multiple output formats (pretty, compact, JSON)
//! - Environment-based filtering (`RUST_LOG` wins over the configured level)
//! - Level taken from `application.log_level`
//!
//! # Example
//! ```no_run
//! use ezo_daq::{config::EzoConfig, logging};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EzoConfig::load_validated("config/ezo.toml")?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Probe registry starting");
//! # Ok(())
//! # }
//! ```

use crate::config::EzoConfig;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Errors from logging setup.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The configured level is not one of trace, debug, info, warn, error.
    #[error("Invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLevel(String),

    /// A global subscriber is already installed.
    #[error("Failed to initialize tracing: {0}")]
    AlreadyInitialized(String),
}

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, human oriented. Honors [`LoggingConfig::with_ansi`].
    Pretty,
    /// One line per event, never colored.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Fallback level when `RUST_LOG` is unset.
    pub level: Level,
    /// Rendering of each event.
    pub format: OutputFormat,
    /// Emit an event when a span opens and closes.
    pub with_span_events: bool,
    /// Annotate events with source file and line.
    pub with_file_and_line: bool,
    /// Annotate events with the emitting thread's name.
    pub with_thread_names: bool,
    /// Color escape codes in [`OutputFormat::Pretty`] output.
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: false,
            with_file_and_line: true,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Settings whose level comes from `application.log_level`.
    pub fn from_config(config: &EzoConfig) -> Result<Self, LoggingError> {
        parse_log_level(&config.application.log_level).map(Self::new)
    }

    /// Defaults at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Render with `format`.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle span open/close events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Toggle source locations on events.
    pub fn with_file_and_line(mut self, enabled: bool) -> Self {
        self.with_file_and_line = enabled;
        self
    }

    /// Toggle color output.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// [`init`] at the level named in the application configuration.
pub fn init_from_config(config: &EzoConfig) -> Result<(), LoggingError> {
    init(LoggingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Only one subscriber can be installed per process; a second call returns
/// [`LoggingError::AlreadyInitialized`].
pub fn init(config: LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_thread_names(config.with_thread_names);

    let layer = match config.format {
        OutputFormat::Pretty => base
            .pretty()
            .with_ansi(config.with_ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => base
            .compact()
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Json => base.json().with_filter(env_filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Level named by `level`, ignoring case.
pub fn parse_log_level(level: &str) -> Result<Level, LoggingError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}
