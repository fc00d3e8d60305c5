//! Typed client for the hosted model-inference HTTP API.
//!
//! Each chat task maps to one hosted model; this client shapes the per-task
//! request and response JSON and nothing else. Calls carry the configured
//! timeout and are never retried.

use crate::config::HuggingFaceConfig;
use crate::error::LlmError;
use crate::utils::truncate_str;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream error bodies are clipped to this length before logging.
const ERROR_BODY_LIMIT: usize = 800;

/// Answer span from an extractive question-answering model.
#[derive(Debug, Clone, Deserialize)]
pub struct QaAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub score: f64,
}

/// One label prediction from a text-classification model.
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

/// One grouped entity from a token-classification model.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityGroup {
    #[serde(alias = "entity")]
    pub entity_group: String,
    pub word: String,
    pub score: f64,
}

/// Sampling settings for the text-generation pipeline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub top_p: f32,
    pub top_k: u32,
    pub temperature: f32,
    /// The chat widget shows prompt and continuation as one message.
    pub return_full_text: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 80,
            do_sample: true,
            top_p: 0.92,
            top_k: 50,
            temperature: 0.8,
            return_full_text: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct QaRequest<'a> {
    inputs: QaInputs<'a>,
}

#[derive(Debug, Serialize)]
struct QaInputs<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Serialize)]
struct NerRequest<'a> {
    inputs: &'a str,
    parameters: NerParameters,
}

#[derive(Debug, Serialize)]
struct NerParameters {
    aggregation_strategy: &'static str,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Deserialize)]
struct TranslationOutput {
    translation_text: String,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    generated_text: String,
}

/// HTTP client for hosted inference models.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl InferenceClient {
    pub fn from_config(config: &HuggingFaceConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn post<B, T>(&self, service: &'static str, model_id: &str, body: &B) -> Result<T, LlmError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.api_base, model_id);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| LlmError::Request { service, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                service,
                status: status.as_u16(),
                body: truncate_str(&body, ERROR_BODY_LIMIT).to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|source| LlmError::Decode { service, source })
    }

    /// Extract an answer span for `question` from `context`.
    pub async fn question_answering(
        &self,
        model_id: &str,
        question: &str,
        context: &str,
    ) -> Result<QaAnswer, LlmError> {
        let request = QaRequest {
            inputs: QaInputs { question, context },
        };
        self.post("hf_qa", model_id, &request).await
    }

    /// Top-ranked label for a classification model.
    pub async fn classification(&self, model_id: &str, text: &str) -> Result<Classification, LlmError> {
        // The API nests candidates per input: [[{label, score}, ..]]
        let ranked: Vec<Vec<Classification>> =
            self.post("hf_sentiment", model_id, &TextRequest { inputs: text }).await?;
        ranked
            .into_iter()
            .flatten()
            .next()
            .ok_or(LlmError::EmptyAnswer("sentiment pipeline"))
    }

    /// Grouped entities for a token-classification model.
    pub async fn token_classification(
        &self,
        model_id: &str,
        text: &str,
    ) -> Result<Vec<EntityGroup>, LlmError> {
        let request = NerRequest {
            inputs: text,
            parameters: NerParameters {
                aggregation_strategy: "simple",
            },
        };
        self.post("hf_ner", model_id, &request).await
    }

    /// First translation candidate for `text`.
    pub async fn translation(&self, model_id: &str, text: &str) -> Result<String, LlmError> {
        let outputs: Vec<TranslationOutput> =
            self.post("hf_translation", model_id, &TextRequest { inputs: text }).await?;
        outputs
            .into_iter()
            .next()
            .map(|o| o.translation_text)
            .ok_or(LlmError::EmptyAnswer("translation pipeline"))
    }

    /// Generated continuation, prompt included when the parameters say so.
    pub async fn text_generation(
        &self,
        model_id: &str,
        text: &str,
        parameters: GenerationParameters,
    ) -> Result<String, LlmError> {
        let request = GenerationRequest {
            inputs: text,
            parameters,
        };
        let outputs: Vec<GenerationOutput> = self.post("hf_generation", model_id, &request).await?;
        outputs
            .into_iter()
            .next()
            .map(|o| o.generated_text.trim().to_string())
            .ok_or(LlmError::EmptyAnswer("generation pipeline"))
    }
}
