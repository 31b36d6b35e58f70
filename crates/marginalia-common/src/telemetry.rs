//! Tracing setup for marginalia hosts.
//!
//! # Usage
//!
//! ```ignore
//! use marginalia_common::telemetry::{self, TelemetryConfig};
//!
//! fn main() {
//!     telemetry::init(TelemetryConfig::from_env("marginalia-cli"));
//!     tracing::info!("started");
//! }
//! ```
//!
//! `RUST_LOG` overrides the console level, e.g.
//! `RUST_LOG=marginalia::build=trace,info` to see every dropped decoration.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, logged once at startup.
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
    /// Write to stderr so stdout stays clean for command output.
    pub stderr: bool,
}

impl TelemetryConfig {
    /// Defaults for the current build profile.
    ///
    /// - `RUST_LOG`: Standard env filter (optional, overrides console_level)
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
            stderr: true,
        }
    }

    /// Raise or lower the console level, e.g. from a `-v` flag count.
    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.console_level.as_str().to_lowercase()))
    }
}

/// Initialize tracing with a compact console layer.
///
/// Call once at application startup. Later calls are ignored with a warning.
pub fn init(config: TelemetryConfig) {
    let env_filter = config.filter();

    let result = if config.stderr {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_filter(env_filter);
        tracing_subscriber::registry().with(console_layer).try_init()
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_filter(env_filter);
        tracing_subscriber::registry().with(console_layer).try_init()
    };

    match result {
        Ok(()) => tracing::debug!(
            service = %config.service_name,
            level = %config.console_level,
            "telemetry initialized"
        ),
        Err(e) => tracing::warn!(error = %e, "tracing already initialized"),
    }
}
