//! Natural-language query interpretation.
//!
//! Turns a free-form Korean sentence into a lookup payload by prompting the
//! generation server for JSON. Models wrap answers in markdown fences or
//! leak prose around the object, so extraction is defensive: fences are
//! stripped and the text between the first `{` and the last `}` is taken.
//! A syntactically broken object gets exactly one repair round where the
//! model is shown its own output and asked for clean JSON; there is no
//! second attempt after that.

use crate::error::LlmError;
use crate::llm::llama::{GenerationOptions, LlamaClient};
use crate::utils::truncate_str;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Snippet length kept when reporting unparseable model output.
const MALFORMED_SNIPPET_LIMIT: usize = 200;

const SYSTEM_PROMPT: &str = r#"너는 부동산 예측 서비스의 JSON 생성기다.
반드시 JSON만 출력한다. 다른 텍스트/설명/마크다운 금지.

스키마:
{
  "contract": {"lease_type": "전세|월세"},
  "region": {"district_code": "string", "dong_name": "string(optional)"},
  "property": {"building_name": "string", "house_type": "string(optional)"},
  "db_context": {"district_code": "string(optional)", "building_name": "string(optional)"}
}"#;

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```(?:json)?\s*").expect("fence-open regex must compile")
});

static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("fence-close regex must compile"));

fn interpretation_prompt(user_prompt: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n사용자 입력:\n{user_prompt}\n\n규칙:\n- 반드시 JSON만 출력\n- JSON 바깥 텍스트(설명/마크다운/코드블록) 금지\n- 모든 키는 스키마 그대로 사용\n- 문자열 값은 반드시 큰따옴표로 감싸기\n"
    )
}

fn repair_prompt(broken: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n아래 출력은 JSON이 깨져있다.\n반드시 올바른 JSON \"한 개\"만 출력해라.\n추가 텍스트/설명/마크다운/코드블록 금지.\n\n깨진 출력:\n{broken}\n"
    )
}

/// Best-effort JSON carve-out from raw model text. When no brace pair is
/// found the defenced text itself is returned so the parse failure carries
/// what the model actually said.
fn extract_json(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = FENCE_OPEN.replace(trimmed, "");
    let without_fences = FENCE_CLOSE.replace(&without_open, "");
    match (without_fences.find('{'), without_fences.rfind('}')) {
        (Some(start), Some(end)) if start < end => without_fences[start..=end].to_string(),
        _ => without_fences.trim().to_string(),
    }
}

/// Interpret a free-form prompt into a lookup payload document.
///
/// Generation runs deterministically; the temperature knob in the server
/// config does not apply here.
pub async fn interpret_prompt(client: &LlamaClient, prompt: &str) -> Result<Value, LlmError> {
    let options = GenerationOptions::deterministic();

    let answer = client
        .generate(&interpretation_prompt(prompt), &options)
        .await?;
    if answer.is_empty() {
        return Err(LlmError::EmptyAnswer("query interpreter"));
    }

    let candidate = extract_json(&answer);
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Ok(value);
    }

    tracing::warn!(
        snippet = truncate_str(&candidate, MALFORMED_SNIPPET_LIMIT),
        "interpreter emitted invalid JSON, requesting a repaired copy"
    );

    let repaired = client.generate(&repair_prompt(&candidate), &options).await?;
    if repaired.is_empty() {
        return Err(LlmError::EmptyAnswer("query interpreter"));
    }

    let candidate = extract_json(&repaired);
    serde_json::from_str::<Value>(&candidate).map_err(|_| {
        LlmError::MalformedAnswer(truncate_str(&candidate, MALFORMED_SNIPPET_LIMIT).to_string())
    })
}
