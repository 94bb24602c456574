use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Unknown log level: {0:?}")]
    UnknownLogLevel(String),

    #[error("Unknown call result retention policy: {0:?}")]
    UnknownRetention(String),

    #[error("host.pump_interval_ms must be greater than zero")]
    ZeroPumpInterval,
}
