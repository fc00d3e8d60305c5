//! API router and server loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers::{
    build_input_handler, genai_chat_handler, health_handler, llama3_handler, nlq_handler,
    predict_search_handler, run_prediction_handler, support_detail_handler,
    support_search_handler, AppState,
};
use crate::error::Result;

/// Create the API router.
///
/// Endpoints:
/// - GET  /                        - API info
/// - GET  /health                  - Liveness plus snapshot presence
/// - POST /predict/build-input     - Assemble a prediction-input document
/// - POST /predict/run?target_yq=  - Resolve a stored forecast
/// - GET  /predict/search          - Filtered listing search
/// - POST /nlq                     - Natural-language lookup
/// - GET  /support/search          - Support article listing
/// - GET  /support/:id             - Support article detail
/// - POST /support/api/genai-chat  - NLP task chat
/// - POST /support/api/llama3      - Generation proxy
/// - POST /api/llama3              - Generation proxy (legacy path)
pub fn create_router(state: Arc<AppState>) -> Router {
    let enable_cors = state.config.server.enable_cors;

    let router = Router::new()
        .route("/", get(api_info_handler))
        .route("/health", get(health_handler))
        .route("/predict/build-input", post(build_input_handler))
        .route("/predict/run", post(run_prediction_handler))
        .route("/predict/search", get(predict_search_handler))
        .route("/nlq", post(nlq_handler))
        .route("/api/llama3", post(llama3_handler))
        .route("/support/search", get(support_search_handler))
        .route("/support/api/genai-chat", post(genai_chat_handler))
        .route("/support/api/llama3", post(llama3_handler))
        .route("/support/:id", get(support_detail_handler))
        .with_state(state);

    // The browser widgets are served from a separate origin in development
    if enable_cors {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .allow_origin(Any);

        router.layer(cors)
    } else {
        router
    }
}

/// Bind the configured port and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let port = state.config.server.port;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("rentq API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// API info handler.
async fn api_info_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "rentq API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Rent and deposit forecast lookups for Seoul villa/officetel listings",
        "endpoints": {
            "health": {
                "method": "GET",
                "path": "/health",
                "description": "Liveness check; reports whether the snapshot database is present"
            },
            "build_input": {
                "method": "POST",
                "path": "/predict/build-input",
                "description": "Assemble a prediction-input document from form fields",
                "params": {
                    "district_code": "eunpyeong or guro (required)",
                    "dong_name": "Neighborhood name (required)",
                    "house_type": "빌라 or 오피스텔 (required)",
                    "lease_type": "전세 or 월세 (required)",
                    "area_m2": "Area in m², 1-1000 (required)",
                    "deposit_krw": "Deposit in won, commas allowed (required)",
                    "monthly_rent_krw": "Monthly rent in won (월세 only)"
                }
            },
            "run": {
                "method": "POST",
                "path": "/predict/run",
                "description": "Resolve the stored forecast for a payload",
                "params": {
                    "target_yq": "Target quarter, 2025Q1..2030Q4 (default: 2025Q1)"
                }
            },
            "search": {
                "method": "GET",
                "path": "/predict/search",
                "description": "Filtered listing search",
                "params": {
                    "gu": "District code (default: eunpyeong)",
                    "house_type": "빌라 or 오피스텔 (default: 빌라)",
                    "lease_type": "전세 or 월세 (default: 월세)",
                    "area": "Pyeong bucket like 10-19 (default: 10-19)",
                    "floor": "basement, low, mid or high (default: low)"
                }
            },
            "nlq": {
                "method": "POST",
                "path": "/nlq",
                "description": "Interpret a Korean sentence and run the lookup"
            },
            "support_search": {
                "method": "GET",
                "path": "/support/search",
                "description": "List support articles",
                "params": {
                    "source_type": "loan or policy",
                    "target": "Audience filter",
                    "biz": "Business category filter"
                }
            },
            "support_detail": {
                "method": "GET",
                "path": "/support/:id",
                "description": "Support article with its parsed detail document"
            },
            "genai_chat": {
                "method": "POST",
                "path": "/support/api/genai-chat",
                "description": "NLP chat tasks: generate, translate, sentiment, ner, qa"
            },
            "llama3": {
                "method": "POST",
                "path": "/support/api/llama3",
                "description": "Proxy to the LLaMA generation server"
            }
        }
    }))
}
