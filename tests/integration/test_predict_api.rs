//! Tests for the prediction endpoints: build-input, run, and search.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rusqlite::{Connection, ToSql};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

use rentq::api::{create_router, AppState};
use rentq::property::{forecast_quarters, ForecastKind};
use rentq::Config;

/// Schema mirroring the offline pipeline's output tables.
fn create_snapshot_db(path: &Path) -> Connection {
    let mut cols: Vec<String> = [
        "district TEXT",
        "dong_name TEXT",
        "house_type TEXT",
        "building_name TEXT",
        "lease_type TEXT",
        "floor INTEGER",
        "built_year INTEGER",
        "area_m2 REAL",
        "latitude REAL",
        "longitude REAL",
        "road_address TEXT",
        "jibun_address TEXT",
        "recent_yq TEXT",
        "recent_deposit REAL",
        "recent_monthly REAL",
        "monthly_rent REAL",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    for kind in ForecastKind::BOTH {
        for yq in forecast_quarters() {
            cols.push(format!("{} REAL", kind.column(yq)));
        }
    }

    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE HOUSE_INFO ({});\n\
         CREATE TABLE SUPPORT_LIST (id INTEGER PRIMARY KEY, title TEXT, source_type TEXT, \
         target TEXT, biz_category TEXT, detail_json TEXT);",
        cols.join(", ")
    ))
    .unwrap();
    conn
}

/// Insert a property row from (column, value) pairs; unlisted columns stay
/// NULL. Rowids are assigned in insertion order starting at 1.
fn insert_property(conn: &Connection, values: &[(&str, &dyn ToSql)]) {
    let cols: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO HOUSE_INFO ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let params: Vec<&dyn ToSql> = values.iter().map(|(_, v)| *v).collect();
    conn.execute(&sql, &params[..]).unwrap();
}

/// Router over a scratch snapshot; model clients point at an unroutable
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

async fn post_form(router: Router, uri: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
    let body = serde_urlencoded::to_string(fields).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
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

fn jeonse_form<'a>() -> Vec<(&'a str, &'a str)> {
    vec![
        ("district_code", "eunpyeong"),
        ("dong_name", "불광동"),
        ("house_type", "빌라"),
        ("lease_type", "전세"),
        ("area_m2", "33.0"),
        ("deposit_krw", "300,000,000"),
    ]
}

fn insert_hanbit_villa(conn: &Connection) {
    insert_property(
        conn,
        &[
            ("district", &"eunpyeong"),
            ("dong_name", &"불광동"),
            ("house_type", &"빌라"),
            ("building_name", &"한빛빌라"),
            ("lease_type", &"전세"),
            ("floor", &3i64),
            ("built_year", &2015i64),
            ("area_m2", &32.5f64),
            ("latitude", &37.61f64),
            ("longitude", &126.93f64),
            ("road_address", &"서울 은평구 통일로 1"),
            ("recent_yq", &"2024Q3"),
            ("recent_deposit", &450_000_000.0f64),
            ("deposit_25q1", &500_000_000.0f64),
        ],
    );
}

// ============================================================================
// POST /predict/build-input
// ============================================================================

#[tokio::test]
async fn test_build_input_returns_matched_document() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    insert_hanbit_villa(&conn);
    drop(conn);

    let (status, body) = post_form(test_router(&db), "/predict/build-input", &jeonse_form()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schema_version"], "v1.0");
    assert_eq!(body["meta"]["source"], "web_form");
    assert!(body["meta"]["requested_at"]
        .as_str()
        .unwrap()
        .ends_with("+09:00"));
    assert_eq!(body["region"]["district_display"], "은평구");
    assert_eq!(body["db_context"]["match_status"], "matched");
    assert_eq!(body["db_context"]["matched_rowid"], 1);
    assert_eq!(body["db_context"]["recent_deposit_krw"], 450_000_000.0);
    // the snapshot fills gaps the user left open
    assert_eq!(body["property"]["building_name"], "한빛빌라");
    assert_eq!(body["property"]["floor"], 3);
    assert_eq!(body["location"]["latitude"], 37.61);
    // full forecast grid, nulls included
    let history = body["db_context"]["deposit_history"].as_object().unwrap();
    assert_eq!(history.len(), 24);
    assert_eq!(history["deposit_25q1"], json!(500_000_000.0));
    assert!(history["deposit_25q2"].is_null());
}

#[tokio::test]
async fn test_build_input_no_match_keeps_user_fields() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    drop(create_snapshot_db(&db));

    let form = [
        ("district_code", "guro"),
        ("dong_name", "구로동"),
        ("house_type", "오피스텔"),
        ("lease_type", "월세"),
        ("area_m2", "33.0"),
        ("deposit_krw", "50000000"),
        ("monthly_rent_krw", "500000"),
    ];
    let (status, body) = post_form(test_router(&db), "/predict/build-input", &form).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db_context"]["match_status"], "no_match");
    assert!(body["db_context"]["matched_rowid"].is_null());
    assert_eq!(body["property"]["area_m2"], 33.0);
    assert_eq!(body["region"]["district_display"], "구로구");
    assert_eq!(body["contract"]["deposit_krw"], 50_000_000);
    assert_eq!(body["contract"]["monthly_rent_krw"], 500_000);
    // infra placeholders are present and null
    assert!(body["infra_features"]["subway_distance_m"].is_null());
}

#[tokio::test]
async fn test_build_input_validation_hint_shape() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    drop(create_snapshot_db(&db));

    let mut form = jeonse_form();
    form.retain(|(key, _)| *key != "dong_name");
    let (status, body) = post_form(test_router(&db), "/predict/build-input", &form).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "'dong_name' is required");
    assert_eq!(
        body["hint"]["required_keys"],
        json!([
            "district_code",
            "dong_name",
            "house_type",
            "lease_type",
            "area_m2",
            "deposit_krw"
        ])
    );
    assert_eq!(body["hint"]["allowed_lease_type"], json!(["전세", "월세"]));
}

#[tokio::test]
async fn test_build_input_rejects_unknown_vocabulary() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    drop(create_snapshot_db(&db));

    // unknown district is caught past form parsing, same response shape
    let mut form = jeonse_form();
    form[0] = ("district_code", "mapo");
    let (status, body) = post_form(test_router(&db), "/predict/build-input", &form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("district_code"));

    let mut form = jeonse_form();
    form[3] = ("lease_type", "반전세");
    let (status, body) = post_form(test_router(&db), "/predict/build-input", &form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("lease_type"));

    let mut form = jeonse_form();
    form[4] = ("area_m2", "0.2");
    let (status, body) = post_form(test_router(&db), "/predict/build-input", &form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "'area_m2' must be >= 1");
}

// ============================================================================
// POST /predict/run
// ============================================================================

#[tokio::test]
async fn test_run_round_trips_a_built_document() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    insert_hanbit_villa(&conn);
    drop(conn);

    let (status, document) =
        post_form(test_router(&db), "/predict/build-input", &jeonse_form()).await;
    assert_eq!(status, StatusCode::OK);

    // the assembled document feeds straight back into the resolver
    let (status, body) = post_json(
        test_router(&db),
        "/predict/run?target_yq=2025Q1",
        &document,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["lease_type"], "전세");
    assert_eq!(body["debug"]["target_yq"], "2025Q1");
    assert_eq!(body["debug"]["payload_building_name"], "한빛빌라");
    assert_eq!(body["debug"]["selected_rowid"], 1);
    assert_eq!(body["result"]["target_yq"], "25q1");
    assert_eq!(body["result"]["deposit_column"], "deposit_25q1");
    assert_eq!(body["result"]["predicted_deposit_krw"], 500_000_000.0);
    // 전세 results carry no monthly component at all
    assert!(body["result"].get("monthly_rent_column").is_none());
}

#[tokio::test]
async fn test_run_wolse_includes_monthly_component() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    insert_property(
        &conn,
        &[
            ("district", &"guro"),
            ("dong_name", &"구로동"),
            ("house_type", &"오피스텔"),
            ("building_name", &"대성오피스텔"),
            ("lease_type", &"월세"),
            ("deposit_26q2", &30_000_000.0f64),
            ("monthly_rent_26q2", &650_000.0f64),
        ],
    );
    drop(conn);

    let payload = json!({
        "contract": { "lease_type": "월세" },
        "region": { "district_code": "guro" },
        "property": { "building_name": "대성오피스텔" },
    });
    let (status, body) =
        post_json(test_router(&db), "/predict/run?target_yq=26q2", &payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lease_type"], "월세");
    assert_eq!(body["result"]["target_yq"], "26q2");
    assert_eq!(body["result"]["monthly_rent_column"], "monthly_rent_26q2");
    assert_eq!(body["result"]["predicted_monthly_rent_krw"], 650_000.0);
    assert_eq!(body["result"]["predicted_deposit_krw"], 30_000_000.0);
}

#[tokio::test]
async fn test_run_defaults_to_2025q1() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    insert_hanbit_villa(&conn);
    drop(conn);

    let payload = json!({
        "contract": { "lease_type": "전세" },
        "region": { "district_code": "eunpyeong" },
        "property": { "building_name": "한빛빌라" },
    });
    let (status, body) = post_json(test_router(&db), "/predict/run", &payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["debug"]["target_yq"], "2025Q1");
    assert_eq!(body["result"]["target_yq"], "25q1");
}

#[tokio::test]
async fn test_run_client_errors() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    insert_hanbit_villa(&conn);
    drop(conn);

    let payload = json!({
        "contract": { "lease_type": "전세" },
        "region": { "district_code": "eunpyeong" },
        "property": { "building_name": "한빛빌라" },
    });

    // malformed quarter
    let (status, body) = post_json(
        test_router(&db),
        "/predict/run?target_yq=2025-Q1",
        &payload,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("2025-Q1"));

    // missing building hint
    let partial = json!({
        "contract": { "lease_type": "전세" },
        "region": { "district_code": "eunpyeong" },
    });
    let (status, body) = post_json(test_router(&db), "/predict/run", &partial).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("property.building_name"));

    // unknown building
    let unknown = json!({
        "contract": { "lease_type": "전세" },
        "region": { "district_code": "eunpyeong" },
        "property": { "building_name": "없는빌라" },
    });
    let (status, body) = post_json(test_router(&db), "/predict/run", &unknown).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("없는빌라"));

    // unknown lease type
    let bad_lease = json!({
        "contract": { "lease_type": "반전세" },
        "region": { "district_code": "eunpyeong" },
        "property": { "building_name": "한빛빌라" },
    });
    let (status, body) = post_json(test_router(&db), "/predict/run", &bad_lease).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("lease_type"));
}

// ============================================================================
// GET /predict/search
// ============================================================================

#[tokio::test]
async fn test_search_applies_default_filters() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    // fits every default: 은평구 빌라 월세, 35m² (11평), 2층
    insert_property(
        &conn,
        &[
            ("district", &"eunpyeong"),
            ("dong_name", &"녹번동"),
            ("house_type", &"빌라"),
            ("building_name", &"녹번맨션"),
            ("lease_type", &"월세"),
            ("floor", &2i64),
            ("area_m2", &35.0f64),
            ("recent_yq", &"2024Q3"),
            ("recent_deposit", &30_000_000.0f64),
            ("recent_monthly", &600_000.0f64),
            ("deposit_25q1", &32_000_000.0f64),
            ("monthly_rent_25q1", &620_000.0f64),
        ],
    );
    // wrong district, must not appear
    insert_property(
        &conn,
        &[
            ("district", &"guro"),
            ("house_type", &"빌라"),
            ("lease_type", &"월세"),
            ("floor", &2i64),
            ("area_m2", &35.0f64),
        ],
    );
    // right district, floor outside the low band
    insert_property(
        &conn,
        &[
            ("district", &"eunpyeong"),
            ("house_type", &"빌라"),
            ("lease_type", &"월세"),
            ("floor", &7i64),
            ("area_m2", &35.0f64),
        ],
    );
    drop(conn);

    let (status, body) = get(test_router(&db), "/predict/search").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["filter"],
        json!({
            "gu": "eunpyeong",
            "house_type": "빌라",
            "lease_type": "월세",
            "area": "10-19",
            "floor": "low"
        })
    );
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["building_name"], "녹번맨션");
    assert_eq!(item["district"], "은평구");
    assert_eq!(item["floor"], "2층");
    assert_eq!(item["floor_raw"], 2);
    assert_eq!(item["area_p"], "11평");
    assert_eq!(item["recent_yq"], "2024년 3분기 계약");
    // forecast grid columns are flattened into the item
    assert_eq!(item["deposit_25q1"], 32_000_000.0);
    assert_eq!(item["monthly_rent_25q1"], 620_000.0);
    assert!(item["deposit_25q2"].is_null());
}

#[tokio::test]
async fn test_search_explicit_filters_and_blank_params() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    let conn = create_snapshot_db(&db);
    insert_property(
        &conn,
        &[
            ("district", &"guro"),
            ("house_type", &"오피스텔"),
            ("building_name", &"구로타워"),
            ("lease_type", &"전세"),
            ("floor", &12i64),
            ("area_m2", &70.0f64),
        ],
    );
    drop(conn);

    let query = serde_urlencoded::to_string([
        ("gu", "guro"),
        ("house_type", "오피스텔"),
        ("lease_type", "전세"),
        ("area", "20-29"),
        ("floor", "high"),
    ])
    .unwrap();
    let (status, body) = get(test_router(&db), &format!("/predict/search?{query}")).await;
    assert_eq!(status, StatusCode::OK);
    // 70m² is ~21평, inside the 20-29 bucket; floor 12 is in the high band
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["building_name"], "구로타워");
    assert_eq!(body["filter"]["gu"], "guro");

    // a blank parameter falls back to its default (eunpyeong), so nothing
    // matches the guro-only snapshot
    let (status, body) = get(test_router(&db), "/predict/search?gu=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filter"]["gu"], "eunpyeong");
    assert!(body["items"].as_array().unwrap().is_empty());
}

// ============================================================================
// POST /nlq (validation layer)
// ============================================================================

#[tokio::test]
async fn test_nlq_requires_prompt() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    drop(create_snapshot_db(&db));

    let (status, body) = post_json(test_router(&db), "/nlq", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "prompt is required");

    let (status, body) =
        post_json(test_router(&db), "/nlq", &json!({"prompt": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "prompt is required");
}

// ============================================================================
// GET /health
// ============================================================================

#[tokio::test]
async fn test_health_reports_snapshot_presence() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("snapshot.db");
    drop(create_snapshot_db(&db));

    let (status, body) = get(test_router(&db), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "db": true}));

    let missing = dir.path().join("missing.db");
    let (status, body) = get(test_router(&missing), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "db": false}));
}
