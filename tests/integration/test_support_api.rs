//! Tests for the support endpoints: article search/detail and the chat
//! proxies' validation layer. Model-backed paths are exercised up to the
//! point where a remote call would happen.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

use rentq::api::{create_router, AppState};
use rentq::Config;

fn create_support_db(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE SUPPORT_LIST (id INTEGER PRIMARY KEY, title TEXT, source_type TEXT, \
         target TEXT, biz_category TEXT, detail_json TEXT);",
    )
    .unwrap();
    conn
}

fn insert_support(
    conn: &Connection,
    id: i64,
    title: &str,
    source_type: &str,
    target: &str,
    biz_category: &str,
    detail_json: Option<&str>,
) {
    conn.execute(
        "INSERT INTO SUPPORT_LIST (id, title, source_type, target, biz_category, detail_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, title, source_type, target, biz_category, detail_json],
    )
    .unwrap();
}

/// Router over a scratch database; model clients point at an unroutable
/// address so an accidental call fails fast instead of hanging.
fn test_router(db_path: &Path) -> Router {
    let mut config = Config::default();
    config.database.path = db_path.to_string_lossy().to_string();
    config.llama.base_url = "http://127.0.0.1:1".to_string();
    config.huggingface.api_base = "http://127.0.0.1:1".to_string();
    let state = AppState::from_config(config).unwrap();
    create_router(Arc::new(state))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn post_json(router: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(router, request).await
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

fn seeded_db(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("snapshot.db");
    let conn = create_support_db(&path);
    insert_support(
        &conn,
        1,
        "청년 전세자금 대출",
        "loan",
        "청년",
        "주거",
        Some(r#"{"rate": "1.8%", "limit_krw": 200000000}"#),
    );
    insert_support(
        &conn,
        2,
        "신혼부부 주거 지원 정책",
        "policy",
        "신혼부부",
        "주거",
        Some(r#"{"body": "임차보증금 이자 지원"}"#),
    );
    insert_support(&conn, 3, "창업 지원", "news", "청년", "창업", Some("{}"));
    path
}

// ============================================================================
// GET /support/search
// ============================================================================

#[tokio::test]
async fn test_support_search_lists_everything_by_default() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = get(test_router(&db), "/support/search").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    // ordered by id, detail_json never leaves the store
    assert_eq!(items[0]["id"], 1);
    assert_eq!(items[0]["title"], "청년 전세자금 대출");
    assert!(items[0].get("detail_json").is_none());
    assert!(items[0].get("detail").is_none());
    assert_eq!(items[2]["biz_category"], "창업");
}

#[tokio::test]
async fn test_support_search_filters_combine() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = get(test_router(&db), "/support/search?source_type=loan").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], 1);

    let query = serde_urlencoded::to_string([("target", "청년"), ("biz", "창업")]).unwrap();
    let (status, body) = get(test_router(&db), &format!("/support/search?{query}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], 3);

    let (status, body) = get(test_router(&db), "/support/search?source_type=grant").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert!(body["items"].as_array().unwrap().is_empty());
}

// ============================================================================
// GET /support/:id
// ============================================================================

#[tokio::test]
async fn test_support_detail_parses_stored_document() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = get(test_router(&db), "/support/1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["title"], "청년 전세자금 대출");
    assert_eq!(body["source_type"], "loan");
    assert_eq!(body["target"], "청년");
    assert_eq!(body["biz_category"], "주거");
    assert_eq!(body["detail"]["rate"], "1.8%");
    assert_eq!(body["detail"]["limit_krw"], 200_000_000);

    let (status, body) = get(test_router(&db), "/support/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source_type"], "policy");
    assert_eq!(body["detail"]["body"], "임차보증금 이자 지원");
}

#[tokio::test]
async fn test_support_detail_unknown_id_is_404() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = get(test_router(&db), "/support/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "support item 99 not found");
}

#[tokio::test]
async fn test_support_detail_rejects_unknown_source_type() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    // id 3 has valid detail_json but a source type the page cannot render
    let (status, body) = get(test_router(&db), "/support/3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported source type: news");
}

#[tokio::test]
async fn test_support_detail_malformed_document_is_a_server_error() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_support_db(&db);
    insert_support(&conn, 5, "깨진 항목", "loan", "청년", "주거", Some("{not json"));
    insert_support(&conn, 6, "빈 항목", "loan", "청년", "주거", None);
    drop(conn);

    // unparseable text and a NULL document both fail the same way, and the
    // document is checked before the source type
    let (status, body) = get(test_router(&db), "/support/5").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "malformed detail_json for support item 5");

    let (status, body) = get(test_router(&db), "/support/6").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "malformed detail_json for support item 6");
}

// ============================================================================
// POST /support/api/genai-chat (validation layer)
// ============================================================================

#[tokio::test]
async fn test_genai_chat_requires_a_task() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = post_json(
        test_router(&db),
        "/support/api/genai-chat",
        &json!({"text": "안녕하세요"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "task가 비어 있습니다.");

    let (status, body) = post_json(
        test_router(&db),
        "/support/api/genai-chat",
        &json!({"task": "  ", "text": "안녕하세요"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "task가 비어 있습니다.");
}

#[tokio::test]
async fn test_genai_chat_requires_text() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = post_json(
        test_router(&db),
        "/support/api/genai-chat",
        &json!({"task": "sentiment"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "프롬프트(text)를 입력해주세요.");
}

#[tokio::test]
async fn test_genai_chat_rejects_unknown_task() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = post_json(
        test_router(&db),
        "/support/api/genai-chat",
        &json!({"task": "summarize", "text": "이 정책을 요약해줘"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "지원하지 않는 task입니다: summarize");
}

#[tokio::test]
async fn test_genai_chat_qa_requires_context() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let (status, body) = post_json(
        test_router(&db),
        "/support/api/genai-chat",
        &json!({"task": "qa", "text": "지원 대상이 누구인가요?"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "정책 Q&A는 context(정책 내용)가 필요합니다.");
}

#[tokio::test]
async fn test_genai_chat_unreachable_model_is_a_server_error() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    // validation passes, the remote call fails; must not surface as a 4xx
    let (status, body) = post_json(
        test_router(&db),
        "/support/api/genai-chat",
        &json!({"task": "sentiment", "text": "집이 정말 마음에 들어요"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().is_some());
}

// ============================================================================
// POST /api/llama3 and /support/api/llama3
// ============================================================================

#[tokio::test]
async fn test_llama3_requires_text_on_both_routes() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    for route in ["/api/llama3", "/support/api/llama3"] {
        let (status, body) = post_json(test_router(&db), route, &json!({"text": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "text가 비어 있습니다.");

        let (status, body) = post_json(test_router(&db), route, &json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "text가 비어 있습니다.");
    }
}
