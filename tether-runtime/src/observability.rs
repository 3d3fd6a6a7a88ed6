//! Logging setup for embedders and the CLI.
//!
//! Output format is chosen with `TETHER_LOG_FORMAT`:
//! - `json` - one JSON object per event
//! - `pretty` - multi-line, human-readable
//! - `compact` - single line per event
//!
//! The filter comes from `TETHER_LOG_LEVEL`, then `RUST_LOG`, then `info`.
//!
//! ```ignore
//! use tether_runtime::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Structured JSON.
    Json,
    /// Human-readable, multi-line.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    log_format: LogFormat,
    log_filter: String,
    include_location: bool,
    include_target: bool,
    include_thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            include_location: false,
            include_target: true,
            include_thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Create a new builder.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// Read `TETHER_LOG_FORMAT`, `TETHER_LOG_LEVEL` (or `RUST_LOG`),
    /// `TETHER_LOG_LOCATION` and `TETHER_LOG_THREAD_IDS`.
    ///
    /// Without an explicit format, terminals get `pretty` and everything else
    /// gets `json`.
    pub fn from_env() -> Self {
        let log_format = env::var("TETHER_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| {
                if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                    LogFormat::Pretty
                } else {
                    LogFormat::Json
                }
            });

        let log_filter = env::var("TETHER_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        Self {
            log_format,
            log_filter,
            include_location: env_flag("TETHER_LOG_LOCATION"),
            include_target: true,
            include_thread_ids: env_flag("TETHER_LOG_THREAD_IDS"),
        }
    }

    /// The output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// The filter directive, e.g. `info,tether_runtime=trace`.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Whether file and line are printed.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Whether the event target is printed.
    pub fn include_target(&self) -> bool {
        self.include_target
    }

    /// Whether thread IDs are printed.
    pub fn include_thread_ids(&self) -> bool {
        self.include_thread_ids
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Builder for [`TracingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TracingConfigBuilder {
    config: TracingConfig,
}

impl TracingConfigBuilder {
    /// Set the output format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Shorthand for `log_format(LogFormat::Json)`.
    pub fn json_format(self, enable: bool) -> Self {
        if enable {
            self.log_format(LogFormat::Json)
        } else {
            self
        }
    }

    /// Set the filter directive.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Print file and line.
    pub fn include_location(mut self, include: bool) -> Self {
        self.config.include_location = include;
        self
    }

    /// Print the event target.
    pub fn include_target(mut self, include: bool) -> Self {
        self.config.include_target = include;
        self
    }

    /// Print thread IDs.
    pub fn include_thread_ids(mut self, include: bool) -> Self {
        self.config.include_thread_ids = include;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TracingConfig {
        self.config
    }
}

/// Returned by [`init_tracing`] to report the installed format.
///
/// The subscriber is global once installed; dropping this changes nothing.
#[derive(Debug)]
pub struct TracingGuard {
    format: LogFormat,
}

impl TracingGuard {
    /// The format that was installed.
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: TracingConfig) -> Result<TracingGuard> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(&config))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(TracingGuard {
        format: config.log_format(),
    })
}

type FilteredRegistry = tracing_subscriber::layer::Layered<EnvFilter, Registry>;

fn fmt_layer(config: &TracingConfig) -> Box<dyn Layer<FilteredRegistry> + Send + Sync> {
    let layer = fmt::layer()
        .with_file(config.include_location())
        .with_line_number(config.include_location())
        .with_target(config.include_target())
        .with_thread_ids(config.include_thread_ids());

    match config.log_format() {
        LogFormat::Json => layer
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .flatten_event(true)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = TracingConfig::builder()
            .json_format(true)
            .log_filter("debug,tether_runtime=trace")
            .include_location(true)
            .build();

        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "debug,tether_runtime=trace");
        assert!(config.include_location());
        assert!(config.include_target());
        assert!(!config.include_thread_ids());
    }

    #[test]
    fn json_format_false_keeps_default() {
        let config = TracingConfig::builder().json_format(false).build();
        assert_eq!(config.log_format(), LogFormat::Compact);
    }

    #[test]
    fn config_from_env_has_filter() {
        let config = TracingConfig::from_env();
        assert!(!config.log_filter().is_empty());
    }
}
