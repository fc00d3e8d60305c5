//! Client for the remotely hosted LLaMA-3 instruction endpoint.
//!
//! The endpoint is a single POST route that takes a prompt plus sampling
//! options and returns `{"answer": "..."}`. Calls carry a generous timeout
//! and are never retried.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlamaConfig;
use crate::error::LlmError;
use crate::utils::truncate_str;

const SERVICE: &str = "llama";
const GENERATE_PATH: &str = "/llama/generate";
const ERROR_BODY_LIMIT: usize = 800;

/// Sampling options forwarded verbatim to the generation endpoint.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.2,
            top_p: 0.95,
        }
    }
}

impl GenerationOptions {
    /// Greedy settings for prompts that must come back as structured output.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    answer: Option<String>,
}

/// HTTP client for the generation endpoint.
pub struct LlamaClient {
    client: Client,
    generate_url: String,
}

impl LlamaClient {
    /// Create a client from configuration. The configured base URL may or
    /// may not already include the generate path.
    pub fn from_config(config: &LlamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LlmError::ClientBuild)?;

        let base = config.base_url.trim_end_matches('/');
        let generate_url = if base.ends_with(GENERATE_PATH) {
            base.to_string()
        } else {
            format!("{base}{GENERATE_PATH}")
        };

        Ok(Self {
            client,
            generate_url,
        })
    }

    pub fn generate_url(&self) -> &str {
        &self.generate_url
    }

    /// One generation round-trip. Returns the trimmed answer, which may be
    /// empty when the model produced nothing.
    pub async fn generate(
        &self,
        text: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let request = GenerateRequest {
            text,
            max_new_tokens: options.max_new_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let response = self
            .client
            .post(&self.generate_url)
            .json(&request)
            .send()
            .await
            .map_err(|source| LlmError::Request {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                body: truncate_str(&body, ERROR_BODY_LIMIT).to_string(),
            });
        }

        let parsed: GenerateResponse =
            response.json().await.map_err(|source| LlmError::Decode {
                service: SERVICE,
                source,
            })?;
        Ok(parsed.answer.unwrap_or_default().trim().to_string())
    }
}
