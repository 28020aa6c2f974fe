//! Answer generation providers.
//!
//! Defines the [`GenerationProvider`] trait and two implementations:
//! - **[`ExtractiveGenerator`]** — deterministic, offline. Selects the
//!   context sentences that best overlap the question terms. No model,
//!   no network, suitable for tests and air-gapped deployments.
//! - **[`OllamaGenerator`]** — calls a local Ollama instance's
//!   `/api/generate` endpoint with a bounded output length.
//!
//! Generation is invoked once per query. Transient provider failures are
//! reported to the caller rather than retried here, so the client sees a
//! prompt error instead of a stalled request.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;

/// Answer returned when the context does not contain the answer.
pub const DECLINE_ANSWER: &str = "I don't have enough information to answer that.";

/// Context placeholder used when retrieval returned nothing.
pub const EMPTY_CONTEXT: &str = "No context available.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),
}

/// Trait for answer generators. Takes a fully assembled prompt and
/// produces the answer text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Create the configured [`GenerationProvider`].
pub fn create_generator(
    config: &GenerationConfig,
) -> anyhow::Result<std::sync::Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "extractive" => Ok(std::sync::Arc::new(ExtractiveGenerator::new(
            config.max_output_tokens,
        ))),
        "ollama" => Ok(std::sync::Arc::new(OllamaGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

// ============ Extractive Generator ============

/// Deterministic generator that answers by quoting context sentences.
///
/// Splits the context into sentences, scores each by the number of distinct
/// question terms it contains, and returns the matching sentences in their
/// original order, bounded by `max_output_tokens` words. Questions with no
/// term overlap get the standard decline answer.
pub struct ExtractiveGenerator {
    max_output_tokens: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_output_tokens: usize) -> Self {
        Self { max_output_tokens }
    }
}

#[async_trait]
impl GenerationProvider for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let (context, question) = split_prompt(prompt);

        if context.trim().is_empty() || context.trim() == EMPTY_CONTEXT {
            return Ok(DECLINE_ANSWER.to_string());
        }

        let terms = question_terms(&question);
        if terms.is_empty() {
            return Ok(DECLINE_ANSWER.to_string());
        }

        let mut selected = Vec::new();
        let mut words_used = 0usize;

        for sentence in sentences(&context) {
            let lower = sentence.to_lowercase();
            let hits = terms.iter().filter(|t| lower.contains(*t)).count();
            if hits == 0 {
                continue;
            }

            let words = sentence.split_whitespace().count();
            if words_used + words > self.max_output_tokens && !selected.is_empty() {
                break;
            }
            words_used += words;
            selected.push(sentence);

            if words_used >= self.max_output_tokens {
                break;
            }
        }

        if selected.is_empty() {
            return Ok(DECLINE_ANSWER.to_string());
        }

        Ok(selected.join(" "))
    }
}

/// Pull the `Context:` and `Question:` sections out of an assembled prompt.
fn split_prompt(prompt: &str) -> (String, String) {
    let context = prompt
        .split_once("Context:\n")
        .map(|(_, rest)| rest)
        .and_then(|rest| rest.split_once("\n\nQuestion:"))
        .map(|(ctx, _)| ctx.to_string())
        .unwrap_or_default();

    let question = prompt
        .split_once("Question:")
        .map(|(_, rest)| rest)
        .map(|rest| match rest.split_once("\n\nAnswer:") {
            Some((q, _)) => q.trim().to_string(),
            None => rest.trim().to_string(),
        })
        .unwrap_or_default();

    (context, question)
}

fn question_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn sentences(context: &str) -> Vec<String> {
    let mut out = Vec::new();
    for block in context.split("\n\n---\n\n") {
        let mut current = String::new();
        for ch in block.chars() {
            current.push(ch);
            if matches!(ch, '.' | '!' | '?') {
                let s = current.trim().to_string();
                if !s.is_empty() {
                    out.push(s);
                }
                current.clear();
            }
        }
        let tail = current.trim().to_string();
        if !tail.is_empty() {
            out.push(tail);
        }
    }
    out
}

// ============ Ollama Generator ============

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// Generator backed by a local Ollama instance.
///
/// Calls `POST /api/generate` with `stream: false` and `num_predict` set
/// to the configured output bound.
pub struct OllamaGenerator {
    model: String,
    url: String,
    max_output_tokens: usize,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GenerationError::ProviderUnavailable(format!(
                    "cannot reach Ollama at {}: {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if !parsed.done {
            tracing::debug!(model = %self.model, "generation response not marked done");
        }

        Ok(parsed.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn prompt_with(context: &str, question: &str) -> String {
        format!(
            "You are an assistant that MUST use ONLY the supplied Context to answer. \
             If the answer does not appear in the Context, respond: \
             \"I don't have enough information to answer that.\"\n\n\
             Role: Finance\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
            context, question
        )
    }

    #[tokio::test]
    async fn extractive_selects_matching_sentence() {
        let gen = ExtractiveGenerator::new(300);
        let prompt = prompt_with(
            "The Q1 budget was approved in March. Office plants were watered.",
            "What happened to the Q1 budget?",
        );
        let answer = gen.generate(&prompt).await.unwrap();
        assert!(answer.contains("Q1 budget was approved"));
        assert!(!answer.contains("plants"));
    }

    #[tokio::test]
    async fn extractive_declines_on_placeholder_context() {
        let gen = ExtractiveGenerator::new(300);
        let prompt = prompt_with(EMPTY_CONTEXT, "What is the budget?");
        let answer = gen.generate(&prompt).await.unwrap();
        assert_eq!(answer, DECLINE_ANSWER);
    }

    #[tokio::test]
    async fn extractive_declines_without_term_overlap() {
        let gen = ExtractiveGenerator::new(300);
        let prompt = prompt_with(
            "The office closes at six in the evening.",
            "Describe zebra migration patterns?",
        );
        let answer = gen.generate(&prompt).await.unwrap();
        assert_eq!(answer, DECLINE_ANSWER);
    }

    #[tokio::test]
    async fn extractive_keeps_context_order_across_separators() {
        let gen = ExtractiveGenerator::new(300);
        let context = "Budget review starts Monday.\n\n---\n\nThe budget total is 4 million.";
        let prompt = prompt_with(context, "What about the budget?");
        let answer = gen.generate(&prompt).await.unwrap();
        let first = answer.find("starts Monday").unwrap();
        let second = answer.find("4 million").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn extractive_bounds_output_length() {
        let gen = ExtractiveGenerator::new(8);
        let context = "The budget covers salaries and travel. \
                       The budget also covers equipment and training for every team. \
                       The budget excludes catering.";
        let prompt = prompt_with(context, "What does the budget cover?");
        let answer = gen.generate(&prompt).await.unwrap();
        assert!(answer.split_whitespace().count() <= 12);
        assert!(answer.contains("salaries"));
    }

    #[test]
    fn split_prompt_extracts_sections() {
        let prompt = prompt_with("Some context here.", "What is here?");
        let (context, question) = split_prompt(&prompt);
        assert_eq!(context.trim(), "Some context here.");
        assert_eq!(question, "What is here?");
    }

    fn ollama_config(url: &str) -> GenerationConfig {
        GenerationConfig {
            provider: "ollama".to_string(),
            model: Some("llama3.2".to_string()),
            url: Some(url.to_string()),
            max_output_tokens: 300,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn ollama_generate_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(serde_json::json!({
                    "response": "  The budget was approved.  ",
                    "done": true
                }));
            })
            .await;

        let gen = OllamaGenerator::new(&ollama_config(&server.base_url())).unwrap();
        let answer = gen.generate("prompt").await.unwrap();

        mock.assert();
        assert_eq!(answer, "The budget was approved.");
    }

    #[tokio::test]
    async fn ollama_generate_error_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("overloaded");
            })
            .await;

        let gen = OllamaGenerator::new(&ollama_config(&server.base_url())).unwrap();
        let err = gen.generate("prompt").await.unwrap_err();

        mock.assert_hits(1);
        assert!(matches!(err, GenerationError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn ollama_generate_invalid_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).body("not json");
            })
            .await;

        let gen = OllamaGenerator::new(&ollama_config(&server.base_url())).unwrap();
        let err = gen.generate("prompt").await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }

    #[test]
    fn create_generator_defaults_to_extractive() {
        let gen = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(gen.model_name(), "extractive");
    }

    #[test]
    fn create_generator_unknown_rejected() {
        let config = GenerationConfig {
            provider: "telepathy".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
