//! Ollama provider (`POST {base}/api/generate`, non-streaming)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_prompt, post_json, GeneratorConfig, Provider, QueryGenerator};
use crate::catalog::Schema;
use crate::engine::DatabaseType;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Generator backed by a local Ollama server
#[derive(Debug)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: config.http_client(),
            model: config.model().to_string(),
            endpoint: format!("{}/api/generate", config.base_url()),
            temperature: config.temperature(),
        }
    }

    fn request(&self, prompt: String) -> GenerateRequest<'_> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        }
    }
}

#[async_trait]
impl QueryGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        question: &str,
        schema: &Schema,
        dialect: DatabaseType,
    ) -> Result<String> {
        let body = self.request(build_prompt(question, schema, dialect));
        debug!(model = %self.model, endpoint = %self.endpoint, "requesting generation");

        let answer: GenerateResponse =
            post_json(Provider::Ollama, self.client.post(&self.endpoint), &body).await?;
        Ok(answer.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_body() {
        let generator = OllamaGenerator::new(&GeneratorConfig::new(Provider::Ollama));
        assert_eq!(generator.endpoint, "http://localhost:11434/api/generate");

        let body = serde_json::to_value(generator.request("p".to_string())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "llama3.2",
                "prompt": "p",
                "stream": false,
                "options": {"temperature": 0.1_f32}
            })
        );
    }

    #[test]
    fn test_response_shape() {
        let answer: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama3.2","response":"SELECT 1","done":true}"#)
                .unwrap();
        assert_eq!(answer.response, "SELECT 1");
    }
}
