//! JSON Output Envelope Types
//!
//! Every CLI command and HTTP response carries exactly one envelope.
//!
//! # Output Contract
//! - Success: `{"success": true, "data": {...}}`
//! - Error: `{"success": false, "error": "...", "code": "..."}`

use serde::{Deserialize, Serialize};

use crate::error::AskError;

/// Success envelope for operation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub success: bool,

    /// Operation-specific data
    pub data: T,
}

impl<T> SuccessEnvelope<T> {
    pub const fn new(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub success: bool,

    /// Human-readable message (no credentials or connection strings)
    pub error: String,

    /// Stable error code (e.g., "SAFETY_REJECTION", "CONNECTION_FAILED")
    pub code: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self { success: false, error: error.into(), code: code.into() }
    }

    /// Create error envelope from `AskError`
    pub fn from_error(err: &AskError) -> Self {
        Self::new(err.error_code(), err.message())
    }
}

impl From<&AskError> for ErrorEnvelope {
    fn from(err: &AskError) -> Self {
        Self::from_error(err)
    }
}
