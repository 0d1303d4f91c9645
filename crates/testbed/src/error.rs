//! Error types for testbed fixtures

use thiserror::Error;

use crate::factory::FactoryError;

/// Result type for fixture operations
pub type TestBedResult<T> = std::result::Result<T, TestBedError>;

#[derive(Debug, Error)]
pub enum TestBedError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Container error: {0}")]
    Container(#[from] testbed_di::DIError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Teardown failed: {0:#}")]
    Teardown(anyhow::Error),
}
