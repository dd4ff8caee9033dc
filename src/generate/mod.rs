//! Query Generation Collaborators
//!
//! A generator turns a natural-language question plus the schema into raw query
//! text. The text is untrusted: [`extract_sql`] strips formatting noise, and the
//! pipeline then quotes, screens and validates it like any other input.
//!
//! # Providers
//! - [`OllamaGenerator`] - local Ollama server (`/api/generate`)
//! - [`OpenAiGenerator`] - OpenAI-compatible chat completions
//! - [`GeminiGenerator`] - Google Generative Language API

pub mod gemini;
pub mod ollama;
pub mod openai;

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::Schema;
use crate::engine::DatabaseType;
use crate::error::{AskError, Result};

/// Sampling temperature used when a profile does not set one
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Natural-language to query-text collaborator
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Produce raw query text for `question`
    ///
    /// # Errors
    /// Returns `AskError::Generation` when the provider is unreachable or answers
    /// with something other than text.
    async fn generate(&self, question: &str, schema: &Schema, dialect: DatabaseType)
        -> Result<String>;
}

/// Supported generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
    Gemini,
}

impl Provider {
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2",
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-pro",
        }
    }

    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    /// Environment variable holding the API key, for providers that need one
    pub const fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GOOGLE_API_KEY"),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        })
    }
}

/// Generator section of a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub provider: Provider,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key (never the key itself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// HTTP request timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl GeneratorConfig {
    /// Configuration with every field at the provider default
    pub const fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: None,
            base_url: None,
            api_key_env: None,
            temperature: None,
            timeout_ms: None,
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.provider.default_model())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// API key read from the configured (or default) environment variable
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref().or(self.provider.default_api_key_env())?;
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }

    fn http_client(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        builder.build().unwrap_or_default()
    }
}

/// Build the generator selected by `config`
pub fn build_generator(config: &GeneratorConfig) -> Box<dyn QueryGenerator> {
    match config.provider {
        Provider::Ollama => Box::new(OllamaGenerator::new(config)),
        Provider::OpenAi => Box::new(OpenAiGenerator::new(config)),
        Provider::Gemini => Box::new(GeminiGenerator::new(config)),
    }
}

/// Instruction shared by every provider
pub const SYSTEM_INSTRUCTION: &str = "You are a SQL expert. Generate ONLY the SQL query without any explanation, markdown formatting, or preamble.";

/// Prompt text for `question` over `schema`
pub fn build_prompt(question: &str, schema: &Schema, dialect: DatabaseType) -> String {
    format!(
        "Given the following {} database schema and a natural language query, generate ONLY a single read-only {} SQL query without any explanation or markdown formatting.\n\n\
         Database Schema:\n{}\n\n\
         Natural Language Query: {}\n\n\
         Generate the SQL query:",
        dialect.display_name(),
        dialect.display_name(),
        schema.render(),
        question.trim()
    )
}

/// Words that open an explanatory line rather than SQL
const PROSE_OPENERS: &[&str] = &["HERE", "THE", "THIS", "QUERY"];

/// Strip markdown fences and explanatory lines from generated text
///
/// # Errors
/// Returns `AskError::Generation` when nothing that looks like SQL remains.
pub fn extract_sql(raw: &str) -> Result<String> {
    let unfenced = raw.trim().replace("```sql", "").replace("```SQL", "").replace("```", "");

    let kept: Vec<&str> = unfenced
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            let first_word: String =
                trimmed.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
            !trimmed.is_empty() && !PROSE_OPENERS.contains(&first_word.to_ascii_uppercase().as_str())
        })
        .collect();

    let sql = kept.join("\n").trim().to_string();
    if sql.is_empty() {
        return Err(AskError::generation("generator returned no SQL"));
    }
    Ok(sql)
}

/// POST `body` and decode the JSON answer, mapping every failure to a generation error
async fn post_json<B, T>(provider: Provider, request: reqwest::RequestBuilder, body: &B) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| AskError::generation(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        let detail: String = detail.chars().take(200).collect();
        return Err(AskError::generation(format!("{provider} API error {status}: {detail}")));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AskError::generation(format!("{provider} returned an unreadable response: {e}")))
}
