//! askdb - Natural Language to Read-Only SQL
//!
//! askdb turns a natural-language question into a single read-only query, checks it
//! against the live schema, heals misspelled identifiers once, and executes it with a
//! bounded result size.
//!
//! # Pipeline
//! schema fetch -> generation -> identifier quoting -> safety screen -> dry run
//! -> (repair, re-screen, re-validate) -> row cap -> execution
//!
//! A query never executes unless it has passed the safety screen and then the dry
//! run, in that order.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`sql`] - Approximate SQL token scanner and keyword set
//! - [`catalog`] - Schema snapshot and extraction
//! - [`engine`] - Database engines (`PostgreSQL`, `MySQL`, `SQLite`) and pooling
//! - [`quote`] - Identifier quoting
//! - [`safety`] - Safety screen
//! - [`validate`] - Dry-run validation
//! - [`repair`] - Auto-repair of unknown identifiers
//! - [`generate`] - Query generation providers
//! - [`pipeline`] - Request orchestration
//! - [`config`] - Profile management
//! - [`server`] - HTTP boundary

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod quote;
pub mod repair;
pub mod safety;
pub mod server;
pub mod sql;
pub mod validate;

// Re-export commonly used types for convenience
pub use catalog::{Column, ForeignKey, Schema};
pub use config::{
    list_profiles, resolve_profile, save_profile, ConfigLocation, Profile, ProfileRegistry,
    StoredProfile,
};
pub use engine::{ConnectionConfig, DatabaseEngine, DatabaseType, Engine, ExecutionResult};
pub use error::{AskError, Result};
pub use generate::{build_generator, GeneratorConfig, Provider, QueryGenerator};
pub use output::{ErrorEnvelope, SuccessEnvelope};
pub use pipeline::{AppContext, Limits, QueryOrchestrator, QueryOutcome};
pub use quote::IdentifierQuoter;
pub use repair::{AutoRepairEngine, Repair};
pub use safety::SafetyScreen;
pub use server::ServerConfig;
pub use validate::{DryRunFailure, DryRunValidator};
