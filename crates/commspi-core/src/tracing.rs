//! Tracing setup for commspi.
//!
//! Protocol providers only emit `tracing` events; the embedding application
//! decides where they go. [`init_tracing`] installs a global subscriber with
//! an `EnvFilter` and one of three output formats. [`build_subscriber`]
//! returns the same subscriber without installing it, for scoped use with
//! `tracing::subscriber::with_default`.
//!
//! ```ignore
//! use commspi_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::debug())?;
//! ```

use std::fmt as std_fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::Layered,
    prelude::*,
};

/// Target prefix shared by every commspi crate.
const TARGET_PREFIX: &str = "commspi";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log level: {name}")]
    UnknownLevel { name: String },

    #[error("unknown log format: {name}")]
    UnknownFormat { name: String },
}

/// Output format for tracing logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingOutputFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl TracingOutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl std_fmt::Display for TracingOutputFormat {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TracingOutputFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(TracingError::UnknownFormat { name: s.to_string() }),
        }
    }
}

/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the `commspi` targets when RUST_LOG is not set
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Include file and line
    pub include_location: bool,
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Emit span open/close events
    pub include_span_events: bool,
    /// Explicit filter directive; overrides both RUST_LOG and `default_level`
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_target: true,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Compact debug output with source locations, for interactive use.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            output_format: TracingOutputFormat::Compact,
            include_location: true,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// JSON output for applications that ship logs to a collector.
    #[must_use]
    pub fn structured() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Sets the level from its name (`"debug"`, `"WARN"`, ...).
    ///
    /// # Errors
    ///
    /// Fails with [`TracingError::UnknownLevel`] for anything that is not a
    /// `tracing` level.
    pub fn with_level_name(self, name: &str) -> Result<Self, TracingError> {
        let level = Level::from_str(name).map_err(|_| TracingError::UnknownLevel {
            name: name.to_string(),
        })?;
        Ok(self.with_level(level))
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_location(mut self, include: bool) -> Self {
        self.include_location = include;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Directive used when neither an explicit filter nor RUST_LOG is set.
    pub fn default_directive(&self) -> String {
        format!("{TARGET_PREFIX}={}", self.default_level)
    }

    fn build_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref filter) = self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive())))
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

fn fmt_layer(config: &TracingConfig) -> BoxedLayer {
    let base = fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target)
        .with_span_events(config.span_events());

    match (config.output_format, config.include_timestamp) {
        (TracingOutputFormat::Pretty, _) => base.pretty().boxed(),
        (TracingOutputFormat::Compact, true) => base.compact().boxed(),
        (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
        (TracingOutputFormat::Json, _) => base.json().boxed(),
    }
}

/// Builds the subscriber described by `config` without installing it.
///
/// # Errors
///
/// Fails if the filter directive is invalid.
pub fn build_subscriber(
    config: &TracingConfig,
) -> Result<impl Subscriber + Send + Sync + 'static, TracingError> {
    let filter = config.build_filter()?;
    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config)))
}

/// Installs the global tracing subscriber.
///
/// Call once at startup. `RUST_LOG` overrides the configured default level
/// unless an explicit filter was set.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or the filter directive
/// is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    tracing::subscriber::set_global_default(build_subscriber(&config)?)?;
    Ok(())
}
