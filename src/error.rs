//! Error types for fieldform-audit

use thiserror::Error;

/// Errors that can occur in the audit core
#[derive(Debug, Error)]
pub enum AuditError {
    /// Caller-contract violation (e.g. missing tenant context)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store unavailable or write rejected
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive-file write failure. Aborts the policy execution before
    /// any deletion happens.
    #[error("Failed to write archive '{location}': {reason}")]
    Archive { location: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Retention policy name already taken for the tenant
    #[error("Retention policy already exists: {0}")]
    PolicyExists(String),

    /// Store call exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
