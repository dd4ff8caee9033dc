//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout askdb.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `Schema`: Schema introspection failed (fatal to the request, never retried)
//! - `Generation`: The query generator failed or returned unusable text
//! - `SafetyRejection`: The generated query was blocked by the safety screen
//! - `ValidationFailure`: Dry-run validation failed and repair could not heal it
//! - `Execution`: The engine rejected an already-validated query
//! - `ConnectionFailed`: Database connection or pool errors
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `Config`: Profile file or profile resolution errors

use thiserror::Error;

/// Prefix shown to callers whenever a generated query is refused
pub const REPHRASE_MESSAGE: &str = "Generated query is invalid, please rephrase your question";

/// Main error type for askdb operations
#[derive(Error, Debug)]
pub enum AskError {
    /// Schema introspection failed
    #[error("Schema introspection failed: {0}")]
    Schema(String),

    /// Query generation collaborator failed or returned nothing usable
    #[error("Query generation failed: {0}")]
    Generation(String),

    /// Query blocked by the safety screen before any validation attempt
    #[error("{}: {0}", REPHRASE_MESSAGE)]
    SafetyRejection(String),

    /// Dry-run validation failed and no repair succeeded
    #[error("{}: {0}", REPHRASE_MESSAGE)]
    ValidationFailure(String),

    /// Engine rejected an already-validated query at execution time
    #[error("Query execution failed: {0}")]
    Execution(String),

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, unknown profile, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AskError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "SCHEMA_ERROR",
            Self::Generation(_) => "GENERATION_ERROR",
            Self::SafetyRejection(_) => "SAFETY_REJECTION",
            Self::ValidationFailure(_) => "VALIDATION_FAILURE",
            Self::Execution(_) => "EXECUTION_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message (no credentials or connection strings)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the failure is attributable to the caller's question rather than the system
    #[must_use]
    pub const fn is_rephrasable(&self) -> bool {
        matches!(self, Self::SafetyRejection(_) | Self::ValidationFailure(_))
    }

    /// Create a schema introspection error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Create a safety rejection
    pub fn safety_rejection(reason: impl Into<String>) -> Self {
        Self::SafetyRejection(reason.into())
    }

    /// Create a validation failure
    pub fn validation_failure(message: impl Into<String>) -> Self {
        Self::ValidationFailure(message.into())
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for askdb operations
pub type Result<T> = std::result::Result<T, AskError>;
