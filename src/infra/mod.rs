//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, validation)
//! - `metrics` - Lock-free pass counters

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, ConfigError, DisplayKind, SensorKind};
pub use metrics::{Metrics, MetricsSummary};
