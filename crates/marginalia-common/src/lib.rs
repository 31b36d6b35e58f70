//! marginalia-common: plumbing shared by marginalia hosts.
//!
//! - `config` - file-backed configuration loading and saving
//! - `perf` - timing helpers that report through tracing
//! - `telemetry` - tracing subscriber setup (feature `telemetry`)

pub mod config;
pub mod error;
pub mod perf;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::error::ConfigError;
