//! Common error types for GeoKYC

use thiserror::Error;

/// Common result type for GeoKYC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across GeoKYC crates
#[derive(Error, Debug)]
pub enum Error {
    /// TOML document could not be parsed into the expected shape
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
