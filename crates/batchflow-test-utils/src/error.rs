use batchflow_core::CoreError;
use thiserror::Error;

/// Error types for the test utilities
#[derive(Debug, Error)]
pub enum TestError {
    /// Engine error
    #[error("Engine error: {0}")]
    Core(#[from] CoreError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// A finished execution did not look as expected
    #[error("Assertion failed: {0}")]
    Assertion(String),
}
