//! askdb CLI Entry Point
//!
//! Subcommands:
//! - `ask` - Answer one question and print the envelope
//! - `serve` - Run the HTTP boundary
//! - `schema` - Print the extracted schema
//! - `profiles` - List or save profiles
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use askdb::{
    catalog, config, AskError, ConfigLocation, DatabaseEngine, ErrorEnvelope, Profile,
    QueryOrchestrator, StoredProfile, SuccessEnvelope,
};

/// askdb - ask a database questions in plain language
#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Natural language to validated, read-only SQL")]
#[command(version)]
struct Cli {
    /// Profile to use (overrides ASKDB_PROFILE and the configured default)
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question, in plain language
        question: String,
    },

    /// Serve `POST /query` and `GET /health`
    Serve {
        /// Override the profile's port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the schema the generator will see
    Schema,

    /// Manage profiles
    Profiles {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List every available profile
    List,

    /// Save a profile read from a JSON file
    Save {
        name: String,

        /// JSON file holding `generator`, `database`, `server` and `limits`
        #[arg(long)]
        from: PathBuf,

        /// Save to the per-user config instead of `.askdb/`
        #[arg(long)]
        global: bool,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("could not serialize output")?);
    Ok(())
}

/// Print the envelope for `result`; the exit code reflects success
fn emit<T: Serialize>(result: askdb::Result<T>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(data) => {
            print_json(&SuccessEnvelope::new(data))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            print_json(&ErrorEnvelope::from_error(&err))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn connect(profile: &Profile) -> askdb::Result<QueryOrchestrator<askdb::Engine>> {
    QueryOrchestrator::connect(profile).await
}

async fn ask(profile: &Profile, question: &str) -> askdb::Result<askdb::QueryOutcome> {
    let orchestrator = connect(profile).await?;
    let outcome = orchestrator.process(question).await;
    orchestrator.engine().close().await;
    outcome
}

async fn schema(profile: &Profile) -> askdb::Result<askdb::Schema> {
    let orchestrator = connect(profile).await?;
    let schema = catalog::extract(orchestrator.engine()).await;
    orchestrator.engine().close().await;
    schema
}

fn save(name: &str, from: &Path, global: bool) -> askdb::Result<String> {
    let contents = std::fs::read_to_string(from)
        .map_err(|e| AskError::config(format!("Could not read {}: {e}", from.display())))?;
    let stored: StoredProfile = serde_json::from_str(&contents)
        .map_err(|e| AskError::config(format!("Invalid profile in {}: {e}", from.display())))?;

    let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
    config::save_profile(name, stored, location)?;
    Ok(name.to_string())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Profiles { action } = &cli.command {
        return match action {
            None | Some(ProfileAction::List) => emit(config::list_profiles()),
            Some(ProfileAction::Save { name, from, global }) => emit(save(name, from, *global)),
        };
    }

    let profile = match config::resolve_profile(cli.profile.as_deref()) {
        Ok(profile) => profile,
        Err(err) => return emit::<()>(Err(err)),
    };
    tracing::debug!(profile = %profile.name, "profile selected");

    match cli.command {
        Commands::Ask { question } => emit(ask(&profile, &question).await),
        Commands::Schema => emit(schema(&profile).await),
        Commands::Serve { port } => {
            let mut server = profile.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            let orchestrator = match connect(&profile).await {
                Ok(orchestrator) => Arc::new(orchestrator),
                Err(err) => return emit::<()>(Err(err)),
            };
            askdb::server::serve(orchestrator, &server)
                .await
                .context("HTTP server stopped with an error")?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Profiles { .. } => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    init_logging();

    run(Cli::parse()).await
}
