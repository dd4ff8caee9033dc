//! Google Generative Language provider (`generateContent`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_prompt, post_json, GeneratorConfig, Provider, QueryGenerator};
use crate::catalog::Schema;
use crate::engine::DatabaseType;
use crate::error::{AskError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Generator backed by the Gemini API
#[derive(Debug)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: f32,
    api_key: Option<String>,
}

impl GeminiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: config.http_client(),
            model: config.model().to_string(),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url(),
                config.model()
            ),
            temperature: config.temperature(),
            api_key: config.api_key(),
        }
    }

    fn request<'a>(&self, prompt: &'a str) -> ContentRequest<'a> {
        ContentRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
            generation_config: GenerationConfig { temperature: self.temperature },
        }
    }
}

#[async_trait]
impl QueryGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
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
            .ok_or_else(|| AskError::generation("gemini API key is not set"))?;

        let prompt = build_prompt(question, schema, dialect);
        debug!(model = %self.model, "requesting content generation");

        let request = self.client.post(&self.endpoint).query(&[("key", api_key)]);
        let answer: ContentResponse =
            post_json(Provider::Gemini, request, &self.request(&prompt)).await?;

        let text: String = answer
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| AskError::generation("gemini response contained no candidates"))?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_endpoint_and_body() {
        let generator = GeminiGenerator::new(&GeneratorConfig::new(Provider::Gemini));
        assert_eq!(
            generator.endpoint,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );

        let body = serde_json::to_value(generator.request("p")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "p");
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn test_response_parts_are_joined() {
        let answer: ContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"SELECT "},{"text":"1"}]}}]}"#,
        )
        .unwrap();
        let parts: Vec<&str> =
            answer.candidates[0].content.parts.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(parts.concat(), "SELECT 1");
    }
}
