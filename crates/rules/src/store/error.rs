//! Rule store error types.

use followup_core::RuleId;

use crate::validation::ValidationResult;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The rule violates the write-time invariants.
    #[error("validation failed: {0}")]
    Validation(ValidationResult),

    #[error("rule not found: {0}")]
    NotFound(RuleId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store cannot currently serve the request.
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for rule store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
