//! Error types for the research engine

use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum FraudError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FraudError {
    pub fn api(msg: impl Into<String>) -> Self {
        FraudError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        FraudError::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        FraudError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        FraudError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FraudError::Config(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        FraudError::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        FraudError::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        FraudError::Internal(msg.into())
    }
}

/// Result type alias for research operations
pub type FraudResult<T> = Result<T, FraudError>;
