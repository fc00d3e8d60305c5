//! NLP task pipelines for the support chat widget.
//!
//! Five hosted-model tasks sit behind one registry: policy Q&A, sentiment,
//! named-entity recognition, ko→en translation, and free-form generation.
//! The registry is built once at startup and injected through the shared
//! application state; nothing here is a lazily-initialized global, so a
//! misconfigured client surfaces before the server accepts traffic.

mod inference;

pub use inference::{Classification, EntityGroup, GenerationParameters, InferenceClient, QaAnswer};

use crate::config::HuggingFaceConfig;
use crate::error::LlmError;
use std::fmt;
use std::str::FromStr;

/// Shown when Q&A produces no usable span.
const QA_FALLBACK: &str = "적절한 답변을 찾지 못했습니다.";

/// Shown when NER finds nothing.
const NER_EMPTY: &str = "인식된 개체명이 없습니다.";

/// Task selector accepted by the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTask {
    Generate,
    Translate,
    Sentiment,
    Ner,
    Qa,
}

impl ChatTask {
    pub const ALL: [ChatTask; 5] = [
        ChatTask::Generate,
        ChatTask::Translate,
        ChatTask::Sentiment,
        ChatTask::Ner,
        ChatTask::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatTask::Generate => "generate",
            ChatTask::Translate => "translate",
            ChatTask::Sentiment => "sentiment",
            ChatTask::Ner => "ner",
            ChatTask::Qa => "qa",
        }
    }
}

impl FromStr for ChatTask {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generate" => Ok(ChatTask::Generate),
            "translate" => Ok(ChatTask::Translate),
            "sentiment" => Ok(ChatTask::Sentiment),
            "ner" => Ok(ChatTask::Ner),
            "qa" => Ok(ChatTask::Qa),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ChatTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configured model per task, behind a shared inference client.
#[derive(Debug, Clone)]
pub struct PipelineRegistry {
    client: InferenceClient,
    config: HuggingFaceConfig,
}

impl PipelineRegistry {
    pub fn from_config(config: &HuggingFaceConfig) -> Result<Self, LlmError> {
        let client = InferenceClient::from_config(config)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Policy Q&A over the supplied context; a blank span becomes a fixed
    /// fallback message rather than an empty answer.
    pub async fn qa(&self, question: &str, context: &str) -> Result<String, LlmError> {
        let result = self
            .client
            .question_answering(&self.config.qa_model, question, context)
            .await?;
        let answer = result.answer.trim();
        if answer.is_empty() {
            Ok(QA_FALLBACK.to_string())
        } else {
            Ok(answer.to_string())
        }
    }

    pub async fn sentiment(&self, text: &str) -> Result<String, LlmError> {
        let top = self
            .client
            .classification(&self.config.sentiment_model, text)
            .await?;
        Ok(format_sentiment(&top.label, top.score))
    }

    pub async fn ner(&self, text: &str) -> Result<String, LlmError> {
        let entities = self
            .client
            .token_classification(&self.config.ner_model, text)
            .await?;
        Ok(format_entities(&entities))
    }

    pub async fn translate(&self, text: &str) -> Result<String, LlmError> {
        self.client
            .translation(&self.config.translation_model, text)
            .await
    }

    pub async fn generate(&self, text: &str) -> Result<String, LlmError> {
        self.client
            .text_generation(&self.config.generation_model, text, GenerationParameters::default())
            .await
    }
}

/// Map a star-rating label ("4 stars") to a Korean polarity bucket. Labels
/// that carry no leading integer are read as the neutral 3-star rating.
fn sentiment_polarity(label: &str) -> &'static str {
    let stars: u8 = label
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);
    match stars {
        0..=2 => "부정",
        3 => "중립",
        _ => "긍정",
    }
}

fn format_sentiment(label: &str, score: f64) -> String {
    format!("예측 감성: {} ({label}, score={score:.3})", sentiment_polarity(label))
}

fn format_entities(entities: &[EntityGroup]) -> String {
    if entities.is_empty() {
        return NER_EMPTY.to_string();
    }
    let lines: Vec<String> = entities
        .iter()
        .map(|e| format!("- {} ({}, score={:.3})", e.word, e.entity_group, e.score))
        .collect();
    format!("추출된 개체명 목록:\n{}", lines.join("\n"))
}
