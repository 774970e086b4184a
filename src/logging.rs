//! Tracing Infrastructure
//!
//! Structured logging for acquisition and processing runs, built on `tracing` and
//! `tracing-subscriber`:
//! - Pretty output for a deck laptop, compact output for long unattended runs,
//!   JSON for shipping logs elsewhere
//! - `RUST_LOG` overrides the configured level when set
//!
//! # Example
//! ```no_run
//! use sonar_daq::{config::Settings, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! logging::init_from_settings(&settings)?;
//! info!("acquisition starting");
//! # Ok(())
//! # }
//! ```

use crate::config::Settings;
use crate::error::{AppResult, DaqError};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors
    Pretty,
    /// Single-line format without colors
    Compact,
    /// JSON lines
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(DaqError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: pretty, compact, json",
                other
            ))),
        }
    }
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level used when `RUST_LOG` is not set
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to emit span open/close events
    pub with_span_events: bool,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors (Pretty only)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: false,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Create tracing config from loaded settings
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Ok(Self {
            level: parse_log_level(&settings.application.log_level)?,
            format: settings.application.log_format.parse()?,
            ..Default::default()
        })
    }

    /// Create tracing config with a level and default options
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from settings
pub fn init_from_settings(settings: &Settings) -> AppResult<()> {
    init(TracingConfig::from_settings(settings)?)
}

/// Initialize tracing with custom configuration
///
/// Calling this more than once is harmless: a second global subscriber is not installed.
pub fn init(config: TracingConfig) -> AppResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = match config.format {
        OutputFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_file(config.with_file_and_line)
                .with_line_number(config.with_file_and_line)
                .with_ansi(config.with_ansi)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
        OutputFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_file(config.with_file_and_line)
                .with_line_number(config.with_file_and_line)
                .with_ansi(false)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
        OutputFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_file(config.with_file_and_line)
                .with_line_number(config.with_file_and_line)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
    };

    tolerate_existing(result)
}

fn tolerate_existing(result: Result<(), TryInitError>) -> AppResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(DaqError::Configuration(format!(
            "Failed to initialize tracing: {}",
            e
        ))),
    }
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(DaqError::Configuration(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))),
    }
}
