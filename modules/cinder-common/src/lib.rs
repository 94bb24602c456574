//! Shared plumbing for the cinder workspace: configuration and telemetry.
//!
//! Every other member depends on this crate. It has no knowledge of the
//! dispatch engine beyond the settings that tune it.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{CallResultRetention, Config, DispatchConfig, HostConfig, LoggingConfig};
pub use error::ConfigError;
