//! LLM client abstraction and implementations.
//!
//! Defines the [`LlmClient`] trait and concrete implementations:
//! - **[`DisabledClient`]** — returns errors; used when no provider is configured.
//! - **[`GeminiClient`]** — calls the Gemini `generateContent` API with retry and backoff.
//!
//! # Retry Strategy
//!
//! The Gemini client uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

/// A hosted text-generation model behind a single blocking call.
///
/// Both halves of the pipeline — the delegated query agent and the answer
/// normalizer — speak to the model only through this trait, so tests swap
/// in scripted fakes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt, get one best-effort text reply.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;
}

// ============ Disabled Client ============

/// A no-op client that always returns errors.
///
/// Used when `llm.provider = "disabled"`. Lets the server start without
/// credentials; any request that reaches the model fails with a
/// descriptive error.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

// ============ Gemini Client ============

/// Client for the Gemini `generateContent` API.
///
/// Requires the `GEMINI_API_KEY` environment variable. Temperature, timeout,
/// and retry count come from `[llm]` config.
pub struct GeminiClient {
    model: String,
    temperature: f64,
    max_retries: u32,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `GEMINI_API_KEY` is not in the environment or
    /// the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            api_key,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_gemini_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Gemini API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("LLM call failed after retries")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract the reply text from a `generateContent` response.
///
/// Concatenates `candidates[0].content.parts[*].text`.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Gemini response: empty reply");
    }

    Ok(text)
}

/// Create the appropriate [`LlmClient`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the Gemini client
/// cannot be initialized (missing API key).
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
