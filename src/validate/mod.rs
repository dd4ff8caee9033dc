//! Dry-Run Validation
//!
//! Submits a statement to the live engine for plan generation only. This is the
//! authoritative correctness check: it exercises the real catalog, real types and
//! real permissions without materializing any rows.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::engine::DatabaseEngine;
use crate::error::AskError;
use crate::sql::strip_terminators;

/// Default bound on a single dry run
pub const DEFAULT_DRY_RUN_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Engine rejection of a dry run, message kept verbatim for the repair engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunFailure {
    pub message: String,
}

impl std::fmt::Display for DryRunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<AskError> for DryRunFailure {
    fn from(err: AskError) -> Self {
        let message = match err {
            AskError::Execution(message) => message,
            other => other.message(),
        };
        Self { message }
    }
}

/// Plan-only validator over the active engine
#[derive(Debug)]
pub struct DryRunValidator<'a, E> {
    engine: &'a E,
    timeout: Duration,
}

impl<'a, E: DatabaseEngine> DryRunValidator<'a, E> {
    /// Validator with the default timeout
    pub const fn new(engine: &'a E) -> Self {
        Self { engine, timeout: DEFAULT_DRY_RUN_TIMEOUT }
    }

    /// Override the per-call timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the engine to plan `sql`
    ///
    /// Trailing terminators are stripped first; on success the normalized query is
    /// returned. A timeout is reported as a failure, and the pending request is
    /// cancelled (its pooled connection is released when the future is dropped).
    ///
    /// # Errors
    /// Returns the engine's message as a [`DryRunFailure`].
    pub async fn validate(&self, sql: &str) -> Result<String, DryRunFailure> {
        let statement = strip_terminators(sql);
        if statement.is_empty() {
            return Err(DryRunFailure { message: "empty query".to_string() });
        }

        match tokio::time::timeout(self.timeout, self.engine.explain(statement)).await {
            Ok(Ok(())) => {
                debug!("dry run passed");
                Ok(statement.to_string())
            }
            Ok(Err(err)) => {
                let failure = DryRunFailure::from(err);
                debug!(message = %failure.message, "dry run rejected");
                Err(failure)
            }
            Err(_) => Err(DryRunFailure {
                message: format!("dry run exceeded timeout of {}ms", self.timeout.as_millis()),
            }),
        }
    }
}
