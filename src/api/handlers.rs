//! HTTP handlers for the rentq API.
//!
//! Every handler keeps the response contract of its endpoint to itself:
//! the prediction routes wrap results in `{ok, ...}` envelopes, the form
//! endpoint returns a hint block on validation failures, and the support
//! routes answer with bare `{error}` objects. Store access always goes
//! through `spawn_blocking` so SQLite reads never sit on the async runtime.

use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use crate::assembler::{build_prediction_input, UserQuery};
use crate::config::Config;
use crate::error::{LookupError, RentqError, Result, ValidationError};
use crate::listing::{area_bounds, floor_bounds, ListingItem};
use crate::llm::{interpret_prompt, GenerationOptions, LlamaClient};
use crate::nlp::{ChatTask, PipelineRegistry};
use crate::property::ALLOWED_LEASE_TYPES;
use crate::resolver::{run_prediction_lookup, ResolverPayload};
use crate::store::{PropertyFilter, PropertyStore, SupportFilter, SupportStore};

/// Quarter used when the caller sends no `target_yq`.
const DEFAULT_TARGET_YQ: &str = "2025Q1";

/// Form keys the build-input endpoint insists on; returned in the hint block
/// of every validation failure.
const BUILD_INPUT_REQUIRED_KEYS: [&str; 6] = [
    "district_code",
    "dong_name",
    "house_type",
    "lease_type",
    "area_m2",
    "deposit_krw",
];

// ============================================================================
// Application state
// ============================================================================

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub properties: PropertyStore,
    pub support: SupportStore,
    pub llama: LlamaClient,
    pub pipelines: PipelineRegistry,
}

impl AppState {
    /// Build stores and remote clients up front. A client with broken
    /// configuration fails here, before the server accepts traffic.
    pub fn from_config(config: Config) -> Result<Self> {
        let properties = PropertyStore::new(&config.database.path);
        let support = SupportStore::new(&config.database.path);
        let llama = LlamaClient::from_config(&config.llama)?;
        let pipelines = PipelineRegistry::from_config(&config.huggingface)?;

        if !properties.db_exists() {
            tracing::warn!(
                path = %config.database.path,
                "snapshot database missing; lookups will report db_not_found"
            );
        }

        Ok(Self {
            config,
            properties,
            support,
            llama,
            pipelines,
        })
    }
}

/// Run a store call off the async runtime and flatten the join error.
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RentqError::Internal(format!("blocking task failed: {e}")))?
}

fn status_for(err: &RentqError) -> StatusCode {
    match err {
        RentqError::Validation(_) | RentqError::Quarter(_) => StatusCode::BAD_REQUEST,
        RentqError::Lookup(LookupError::SupportNotFound(_)) => StatusCode::NOT_FOUND,
        RentqError::Lookup(LookupError::MalformedDetail(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        RentqError::Lookup(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Message for a 4xx body: the inner error without the category prefix.
fn client_message(err: &RentqError) -> String {
    match err {
        RentqError::Validation(e) => e.to_string(),
        RentqError::Quarter(e) => e.to_string(),
        RentqError::Lookup(e) => e.to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Prediction input assembly
// ============================================================================

/// Raw form fields; everything arrives as strings and is parsed by hand so
/// error messages can name the offending key.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildInputForm {
    pub district_code: Option<String>,
    pub dong_name: Option<String>,
    pub house_type: Option<String>,
    pub lease_type: Option<String>,
    pub area_m2: Option<String>,
    pub deposit_krw: Option<String>,
    pub monthly_rent_krw: Option<String>,
    pub built_year: Option<String>,
    pub floor: Option<String>,
    pub building_name: Option<String>,
}

fn require_str(
    value: &Option<String>,
    key: &'static str,
) -> std::result::Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::Required(key)),
    }
}

fn optional_str(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_required_f64(
    value: &Option<String>,
    key: &'static str,
    min: f64,
    max: f64,
) -> std::result::Result<f64, ValidationError> {
    let raw = require_str(value, key)?;
    let parsed: f64 = raw.parse().map_err(|_| ValidationError::NotANumber(key))?;
    if parsed < min {
        return Err(ValidationError::BelowMinimum { field: key, min });
    }
    if parsed > max {
        return Err(ValidationError::AboveMaximum { field: key, max });
    }
    Ok(parsed)
}

/// Integers come from a form that formats large won amounts with thousands
/// separators, so commas are stripped before parsing.
fn parse_int(raw: &str, key: &'static str) -> std::result::Result<i64, ValidationError> {
    raw.replace(',', "")
        .trim()
        .parse()
        .map_err(|_| ValidationError::NotAnInteger(key))
}

fn parse_required_int(
    value: &Option<String>,
    key: &'static str,
    min: i64,
) -> std::result::Result<i64, ValidationError> {
    let raw = require_str(value, key)?;
    let parsed = parse_int(&raw, key)?;
    if parsed < min {
        return Err(ValidationError::BelowMinimum {
            field: key,
            min: min as f64,
        });
    }
    Ok(parsed)
}

fn parse_optional_int(
    value: &Option<String>,
    key: &'static str,
    min: Option<i64>,
) -> std::result::Result<Option<i64>, ValidationError> {
    let Some(raw) = optional_str(value) else {
        return Ok(None);
    };
    let parsed = parse_int(&raw, key)?;
    if let Some(min) = min {
        if parsed < min {
            return Err(ValidationError::BelowMinimum {
                field: key,
                min: min as f64,
            });
        }
    }
    Ok(Some(parsed))
}

fn parse_build_input_form(
    form: &BuildInputForm,
) -> std::result::Result<UserQuery, ValidationError> {
    let district_code = require_str(&form.district_code, "district_code")?;
    let dong_name = require_str(&form.dong_name, "dong_name")?;
    let house_type = require_str(&form.house_type, "house_type")?;
    let lease_type = require_str(&form.lease_type, "lease_type")?.parse()?;
    let area_m2 = parse_required_f64(&form.area_m2, "area_m2", 1.0, 1000.0)?;
    let deposit_krw = parse_required_int(&form.deposit_krw, "deposit_krw", 0)?;
    let monthly_rent_krw = parse_optional_int(&form.monthly_rent_krw, "monthly_rent_krw", Some(0))?;
    let built_year = parse_optional_int(&form.built_year, "built_year", None)?;
    let floor = parse_optional_int(&form.floor, "floor", None)?;

    Ok(UserQuery {
        district_code,
        dong_name,
        house_type,
        lease_type,
        area_m2,
        built_year,
        floor,
        building_name: optional_str(&form.building_name),
        deposit_krw: Some(deposit_krw),
        monthly_rent_krw,
    })
}

fn validation_error_body(message: String) -> Value {
    json!({
        "error": "validation_error",
        "message": message,
        "hint": {
            "required_keys": BUILD_INPUT_REQUIRED_KEYS,
            "allowed_lease_type": ALLOWED_LEASE_TYPES,
        }
    })
}

/// POST /predict/build-input
pub async fn build_input_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<BuildInputForm>,
) -> impl IntoResponse {
    let query = match parse_build_input_form(&form) {
        Ok(query) => query,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(validation_error_body(err.to_string())),
            )
                .into_response();
        }
    };

    let store = state.properties.clone();
    let result = run_blocking(move || build_prediction_input(&store, &query)).await;

    match result {
        Ok(document) => (StatusCode::OK, Json(document)).into_response(),
        Err(RentqError::Validation(err)) => (
            StatusCode::BAD_REQUEST,
            Json(validation_error_body(err.to_string())),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("build-input failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "server_error",
                    "message": "failed to build prediction input",
                })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Prediction lookup
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RunParams {
    pub target_yq: Option<String>,
}

/// POST /predict/run?target_yq=2025Q1
///
/// The body is an assembled prediction-input document or any subset of one;
/// only the hint sections matter. The debug block echoes what the resolver
/// was given so a surprising selection can be audited from the response.
pub async fn run_prediction_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunParams>,
    Json(payload): Json<ResolverPayload>,
) -> impl IntoResponse {
    let target_yq = params
        .target_yq
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TARGET_YQ)
        .to_string();

    let store = state.properties.clone();
    let task_payload = payload.clone();
    let task_target = target_yq.clone();
    let result =
        run_blocking(move || run_prediction_lookup(&store, &task_payload, &task_target)).await;

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "lease_type": outcome.selected_lease_type,
                "debug": {
                    "target_yq": target_yq,
                    "payload_lease_type": payload.contract.lease_type,
                    "payload_building_name": payload.db_context.building_name,
                    "selected_rowid": outcome.selected_rowid,
                    "selected_lease_type": outcome.selected_lease_type,
                },
                "result": outcome,
            })),
        )
            .into_response(),
        Err(err) => prediction_error_response(err),
    }
}

fn prediction_error_response(err: RentqError) -> Response {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("prediction lookup failed: {err}");
        (status, Json(json!({"ok": false, "error": "server_error"}))).into_response()
    } else {
        (
            status,
            Json(json!({"ok": false, "error": client_message(&err)})),
        )
            .into_response()
    }
}

// ============================================================================
// Listing search
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub gu: Option<String>,
    pub house_type: Option<String>,
    pub lease_type: Option<String>,
    pub area: Option<String>,
    pub floor: Option<String>,
}

/// Filter actually applied, echoed back so the page can mark the active
/// buttons after a reload.
#[derive(Debug, Clone, Serialize)]
pub struct SearchFilterEcho {
    pub gu: String,
    pub house_type: String,
    pub lease_type: String,
    pub area: String,
    pub floor: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub items: Vec<ListingItem>,
    pub filter: SearchFilterEcho,
}

fn param_or(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// GET /predict/search
///
/// Every parameter has a default, so the bare URL renders the canonical
/// first page: 은평구 빌라 월세, 10-19평, low floors.
pub async fn predict_search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let gu = param_or(&params.gu, "eunpyeong");
    let house_type = param_or(&params.house_type, "빌라");
    let lease_type = param_or(&params.lease_type, "월세");
    let area = param_or(&params.area, "10-19");
    let floor = param_or(&params.floor, "low");

    let mut filter = PropertyFilter {
        district: Some(gu.clone()),
        house_type: Some(house_type.clone()),
        lease_type: Some(lease_type.clone()),
        ..Default::default()
    };
    if let Some((min_m2, max_m2)) = area_bounds(&area) {
        filter.area_min_m2 = Some(min_m2);
        filter.area_max_m2 = Some(max_m2);
    }
    let (floor_min, floor_max) = floor_bounds(&floor);
    filter.floor_min = floor_min;
    filter.floor_max = floor_max;

    let store = state.properties.clone();
    let result = run_blocking(move || store.find_properties(&filter).map_err(Into::into)).await;

    match result {
        Ok(records) => {
            let items: Vec<ListingItem> = records.iter().map(ListingItem::from_record).collect();
            (
                StatusCode::OK,
                Json(SearchResponse {
                    items,
                    filter: SearchFilterEcho {
                        gu,
                        house_type,
                        lease_type,
                        area,
                        floor,
                    },
                }),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("listing search failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "server_error"})),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Natural-language query
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NlqRequest {
    pub prompt: Option<String>,
    pub target_yq: Option<String>,
}

/// POST /nlq
///
/// The interpreted payload is returned alongside the result: when the model
/// misreads a sentence, the client can show what was actually looked up.
pub async fn nlq_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NlqRequest>,
) -> impl IntoResponse {
    let prompt = request.prompt.as_deref().map(str::trim).unwrap_or("");
    if prompt.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "error": "prompt is required"})),
        )
            .into_response();
    }
    let target_yq = request
        .target_yq
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TARGET_YQ)
        .to_string();

    let payload_value = match interpret_prompt(&state.llama, prompt).await {
        Ok(value) => value,
        Err(err) => {
            tracing::error!("NLQ interpretation failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": err.to_string()})),
            )
                .into_response();
        }
    };

    let payload: ResolverPayload = match serde_json::from_value(payload_value.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!("interpreted payload does not fit the schema: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": format!("model payload does not match the expected schema: {err}"),
                })),
            )
                .into_response();
        }
    };

    let store = state.properties.clone();
    let task_target = target_yq.clone();
    let result = run_blocking(move || run_prediction_lookup(&store, &payload, &task_target)).await;

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "target_yq": target_yq,
                "payload": payload_value,
                "result": outcome,
            })),
        )
            .into_response(),
        Err(err) => prediction_error_response(err),
    }
}

// ============================================================================
// Support chat and generation proxy
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GenaiChatRequest {
    pub task: Option<String>,
    pub text: Option<String>,
    pub context: Option<String>,
}

/// POST /support/api/genai-chat
pub async fn genai_chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenaiChatRequest>,
) -> impl IntoResponse {
    let task_raw = request.task.as_deref().map(str::trim).unwrap_or("");
    if task_raw.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "task가 비어 있습니다."})),
        )
            .into_response();
    }

    let text = request.text.as_deref().map(str::trim).unwrap_or("");
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "프롬프트(text)를 입력해주세요."})),
        )
            .into_response();
    }

    let Ok(task) = ChatTask::from_str(task_raw) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("지원하지 않는 task입니다: {task_raw}")})),
        )
            .into_response();
    };

    let answer = match task {
        ChatTask::Qa => {
            let context = request.context.as_deref().map(str::trim).unwrap_or("");
            if context.is_empty() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "정책 Q&A는 context(정책 내용)가 필요합니다."})),
                )
                    .into_response();
            }
            state.pipelines.qa(text, context).await
        }
        ChatTask::Translate => state.pipelines.translate(text).await,
        ChatTask::Sentiment => state.pipelines.sentiment(text).await,
        ChatTask::Ner => state.pipelines.ner(text).await,
        ChatTask::Generate => state.pipelines.generate(text).await,
    };

    match answer {
        Ok(answer) => (StatusCode::OK, Json(json!({"answer": answer}))).into_response(),
        Err(err) => {
            tracing::error!("genai-chat {task} failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Llama3Request {
    pub text: Option<String>,
    pub max_new_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// POST /api/llama3 and /support/api/llama3
///
/// Thin proxy to the generation server. Sampling knobs fall back to the
/// configured defaults; an empty answer is still a 200.
pub async fn llama3_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Llama3Request>,
) -> impl IntoResponse {
    let text = request.text.as_deref().map(str::trim).unwrap_or("");
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "text가 비어 있습니다."})),
        )
            .into_response();
    }

    let defaults = &state.config.llama;
    let options = GenerationOptions {
        max_new_tokens: request.max_new_tokens.unwrap_or(defaults.max_new_tokens),
        temperature: request.temperature.unwrap_or(defaults.temperature),
        top_p: request.top_p.unwrap_or(defaults.top_p),
    };

    match state.llama.generate(text, &options).await {
        Ok(answer) => (StatusCode::OK, Json(json!({"answer": answer}))).into_response(),
        Err(err) => {
            tracing::error!("llama3 proxy failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Support articles
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SupportSearchParams {
    pub source_type: Option<String>,
    pub target: Option<String>,
    pub biz: Option<String>,
}

/// List row without the detail document.
#[derive(Debug, Clone, Serialize)]
pub struct SupportItem {
    pub id: i64,
    pub title: Option<String>,
    pub source_type: Option<String>,
    pub target: Option<String>,
    pub biz_category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SupportListResponse {
    pub items: Vec<SupportItem>,
    pub total: usize,
}

/// GET /support/search
pub async fn support_search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SupportSearchParams>,
) -> impl IntoResponse {
    let filter = SupportFilter {
        source_type: optional_str(&params.source_type),
        target: optional_str(&params.target),
        biz_category: optional_str(&params.biz),
    };

    let store = state.support.clone();
    let result = run_blocking(move || store.list(&filter).map_err(Into::into)).await;

    match result {
        Ok(records) => {
            let items: Vec<SupportItem> = records
                .into_iter()
                .map(|r| SupportItem {
                    id: r.id,
                    title: r.title,
                    source_type: r.source_type,
                    target: r.target,
                    biz_category: r.biz_category,
                })
                .collect();
            let total = items.len();
            (StatusCode::OK, Json(SupportListResponse { items, total })).into_response()
        }
        Err(err) => {
            tracing::error!("support search failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "server_error"})),
            )
                .into_response()
        }
    }
}

/// GET /support/:id
///
/// The stored detail document is parsed before the source type is checked,
/// so a corrupt row reports as a server error even when its type is also
/// unknown.
pub async fn support_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let store = state.support.clone();
    let result = run_blocking(move || store.get(id).map_err(Into::into)).await;

    let record = match result {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": LookupError::SupportNotFound(id).to_string()})),
            )
                .into_response();
        }
        Err(err) => {
            tracing::error!("support detail fetch failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "server_error"})),
            )
                .into_response();
        }
    };

    let detail: Value = match record
        .detail_json
        .as_deref()
        .ok_or(())
        .and_then(|raw| serde_json::from_str(raw).map_err(|_| ()))
    {
        Ok(value) => value,
        Err(()) => {
            tracing::error!(id, "support item carries unparseable detail_json");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": LookupError::MalformedDetail(id).to_string()})),
            )
                .into_response();
        }
    };

    let source_type = record.source_type.as_deref().unwrap_or("");
    if !matches!(source_type, "loan" | "policy") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": LookupError::UnsupportedSourceType(source_type.to_string()).to_string(),
            })),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": record.id,
            "title": record.title,
            "source_type": record.source_type,
            "target": record.target,
            "biz_category": record.biz_category,
            "detail": detail,
        })),
    )
        .into_response()
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "db": state.properties.db_exists(),
    }))
}
