//! Error types for bodysync-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] ron::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
