//! Infrastructure - configuration and metrics
//!
//! - `config` - Service configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod metrics;

pub use config::Config;
pub use metrics::Metrics;
