//! Query Orchestration
//!
//! One request runs strictly top to bottom:
//!
//! ```text
//! schema -> generate -> extract -> quote -> screen -> dry run
//!                                                     | fail
//!                                                     v
//!                                      repair (once) -> screen -> dry run
//!                                                                   |
//!                          row cap -> execute <----------------------+
//! ```
//!
//! Nothing reaches `execute` without passing the safety screen and then the dry
//! run, in that order. A repaired query passes both again.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::catalog::{self, Schema};
use crate::config::Profile;
use crate::engine::{DatabaseEngine, Engine, ExecutionResult};
use crate::error::{AskError, Result};
use crate::generate::{build_generator, extract_sql, QueryGenerator};
use crate::quote::IdentifierQuoter;
use crate::repair::{AutoRepairEngine, Substitution};
use crate::safety::SafetyScreen;
use crate::sql::{has_row_limit, Lexer, ScanLexer};
use crate::validate::{DryRunFailure, DryRunValidator};

/// Repairs allowed per request
pub const MAX_REPAIR_ATTEMPTS: u8 = 1;

/// Per-request bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Row ceiling for queries without their own limit
    pub max_rows: usize,
    pub dry_run_timeout_ms: u64,
    pub generation_timeout_ms: u64,
    /// Let `UNION SELECT` through the safety screen
    pub allow_union: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            dry_run_timeout_ms: 10_000,
            generation_timeout_ms: 60_000,
            allow_union: false,
        }
    }
}

/// The unit of work carried through one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateQuery {
    /// Text exactly as the generator returned it
    pub raw: String,
    /// Text after formatting removal and identifier quoting
    pub quoted: String,
    /// Text produced by the repair attempt, if one was made and changed anything
    pub repaired: Option<String>,
    /// Identifier swap made by the repair attempt
    pub substitution: Option<Substitution>,
    /// Text that passed the dry run
    pub validated: Option<String>,
    pub repair_attempts: u8,
}

impl CandidateQuery {
    fn new(raw: String) -> Self {
        Self { raw, ..Self::default() }
    }
}

/// Successful answer to a question
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// The question as asked
    pub query: String,
    /// Generator output before any rewriting
    pub generated_query: String,
    /// Statement actually executed (quoted, repaired, row-capped)
    pub executed_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<Substitution>,
    pub result: ExecutionResult,
    /// Wall-clock time from schema fetch to result
    pub execution_time_ms: u64,
}

/// Drives a question through every pipeline stage
pub struct QueryOrchestrator<E> {
    engine: E,
    generator: Box<dyn QueryGenerator>,
    limits: Limits,
}

impl<E> std::fmt::Debug for QueryOrchestrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("generator", &self.generator.name())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// The process-wide context: the active engine, its generator and limits
pub type AppContext = QueryOrchestrator<Engine>;

impl QueryOrchestrator<Engine> {
    /// Connect the profile's engine and build its generator
    ///
    /// # Errors
    /// Fails when the database cannot be reached.
    pub async fn connect(profile: &Profile) -> Result<Self> {
        let engine = Engine::connect(&profile.database).await?;
        let generator = build_generator(&profile.generator);
        info!(
            profile = %profile.name,
            provider = %profile.generator.provider,
            model = profile.generator.model(),
            "pipeline ready"
        );
        Ok(Self::new(engine, generator, profile.limits.clone()))
    }
}

impl<E: DatabaseEngine> QueryOrchestrator<E> {
    pub fn new(engine: E, generator: Box<dyn QueryGenerator>, limits: Limits) -> Self {
        Self { engine, generator, limits }
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Answer `question` with rows from the database
    ///
    /// # Errors
    /// - `InvalidInput` for a blank question
    /// - `Schema` when introspection fails
    /// - `Generation` when the generator fails, times out or returns no SQL
    /// - `SafetyRejection` when the screen blocks the query (original or repaired)
    /// - `ValidationFailure` when the dry run fails and repair cannot heal it
    /// - `Execution` when the engine rejects the validated query
    pub async fn process(&self, question: &str) -> Result<QueryOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::invalid_input("query must not be empty"));
        }

        let started = Instant::now();
        let dialect = self.engine.dialect();
        let quoter = IdentifierQuoter::new(dialect.quote_char());
        let screen = SafetyScreen::new(dialect).allow_union(self.limits.allow_union);

        let schema = catalog::extract(&self.engine).await?;

        let mut candidate = CandidateQuery::new(self.generate(question, &schema).await?);
        info!(generator = self.generator.name(), sql = %candidate.raw, "query generated");

        candidate.quoted = quoter.quote(&extract_sql(&candidate.raw)?, &schema);
        debug!(sql = %candidate.quoted, "identifiers quoted");

        if let Err(err) = screen.check(&candidate.quoted, &schema) {
            warn!("{}", err);
            return Err(err);
        }

        let validated = match self.validator().validate(&candidate.quoted).await {
            Ok(sql) => sql,
            Err(failure) => self.repair_once(&mut candidate, &schema, &screen, failure).await?,
        };
        candidate.validated = Some(validated.clone());

        let executed_query = self.apply_row_cap(&validated);
        let result = self.engine.execute(&executed_query, self.limits.max_rows).await?;

        let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(rows = result.row_count, elapsed_ms = execution_time_ms, "query answered");

        Ok(QueryOutcome {
            query: question.to_string(),
            generated_query: candidate.raw,
            executed_query,
            repair: candidate.substitution,
            result,
            execution_time_ms,
        })
    }

    async fn generate(&self, question: &str, schema: &Schema) -> Result<String> {
        let bound = Duration::from_millis(self.limits.generation_timeout_ms);
        let generation = self.generator.generate(question, schema, self.engine.dialect());

        match tokio::time::timeout(bound, generation).await {
            Ok(Ok(text)) if text.trim().is_empty() => {
                Err(AskError::generation("generator returned an empty response"))
            }
            Ok(result) => result,
            Err(_) => Err(AskError::generation(format!(
                "generator did not answer within {}ms",
                self.limits.generation_timeout_ms
            ))),
        }
    }

    fn validator(&self) -> DryRunValidator<'_, E> {
        DryRunValidator::new(&self.engine)
            .with_timeout(Duration::from_millis(self.limits.dry_run_timeout_ms))
    }

    /// The single repair attempt; its output is screened and dry-run again
    async fn repair_once(
        &self,
        candidate: &mut CandidateQuery,
        schema: &Schema,
        screen: &SafetyScreen,
        failure: DryRunFailure,
    ) -> Result<String> {
        debug!(message = %failure.message, "dry run failed");
        if candidate.repair_attempts >= MAX_REPAIR_ATTEMPTS {
            return Err(AskError::validation_failure(failure.message));
        }
        candidate.repair_attempts += 1;

        let repairer = AutoRepairEngine::new(self.engine.dialect().quote_char());
        let Some(repair) = repairer.repair(&candidate.quoted, schema, &failure.message) else {
            warn!(message = %failure.message, "no repair candidate, rejecting query");
            return Err(AskError::validation_failure(failure.message));
        };
        info!(sql = %repair.sql, "query repaired");

        screen.check(&repair.sql, schema)?;
        candidate.repaired = Some(repair.sql.clone());
        candidate.substitution = repair.substitution;

        self.validator().validate(&repair.sql).await.map_err(|still_failing| {
            warn!(message = %still_failing.message, "repaired query still fails the dry run");
            AskError::validation_failure(still_failing.message)
        })
    }

    /// Append `LIMIT max_rows` unless the statement already limits its rows
    fn apply_row_cap(&self, sql: &str) -> String {
        if has_row_limit(&ScanLexer.tokenize(sql)) {
            sql.to_string()
        } else {
            format!("{sql} LIMIT {}", self.limits.max_rows)
        }
    }
}
