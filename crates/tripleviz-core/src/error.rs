use thiserror::Error;

/// Top-level error type for tripleviz.
#[derive(Error, Debug)]
pub enum TriplevizError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TriplevizError>;
