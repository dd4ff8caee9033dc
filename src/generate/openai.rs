//! OpenAI-compatible chat completions provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    build_prompt, post_json, GeneratorConfig, Provider, QueryGenerator, SYSTEM_INSTRUCTION,
};
use crate::catalog::Schema;
use crate::engine::DatabaseType;
use crate::error::{AskError, Result};

const MAX_TOKENS: u32 = 500;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: config.http_client(),
            model: config.model().to_string(),
            endpoint: format!("{}/chat/completions", config.base_url()),
            temperature: config.temperature(),
            api_key: config.api_key(),
        }
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message { role: "system", content: SYSTEM_INSTRUCTION },
                Message { role: "user", content: prompt },
            ],
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl QueryGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        question: &str,
        schema: &Schema,
        dialect: DatabaseType,
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AskError::generation("openai API key is not set"))?;

        let prompt = build_prompt(question, schema, dialect);
        debug!(model = %self.model, "requesting chat completion");

        let request = self.client.post(&self.endpoint).bearer_auth(api_key);
        let answer: ChatResponse =
            post_json(Provider::OpenAi, request, &self.request(&prompt)).await?;

        answer
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AskError::generation("openai response contained no message"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_body() {
        let generator = OpenAiGenerator::new(&GeneratorConfig {
            model: Some("gpt-4o".to_string()),
            ..GeneratorConfig::new(Provider::OpenAi)
        });
        assert_eq!(generator.endpoint, "https://api.openai.com/v1/chat/completions");

        let body = serde_json::to_value(generator.request("p")).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1], serde_json::json!({"role": "user", "content": "p"}));
    }

    #[test]
    fn test_response_shape() {
        let answer: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"SELECT 1"}}]}"#,
        )
        .unwrap();
        assert_eq!(answer.choices[0].message.content.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_missing_key_is_generation_error() {
        let generator = OpenAiGenerator {
            api_key: None,
            ..OpenAiGenerator::new(&GeneratorConfig::new(Provider::OpenAi))
        };
        let err = generator
            .generate("q", &Schema::new(), DatabaseType::Postgres)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "GENERATION_ERROR");
    }
}
