//! HTTP surface.
//!
//! Two real endpoints plus a health check:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Static welcome JSON |
//! | `POST` | `/ask` | Run one query through the pipeline |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! A blank query is the only client error:
//!
//! ```json
//! { "detail": "Query cannot be empty" }
//! ```
//!
//! Every downstream failure — LLM unreachable, agent error, database down —
//! collapses into one 500 with the underlying error text:
//!
//! ```json
//! { "detail": "Error: <message>" }
//! ```
//!
//! Nothing is retried; a failed request is fatal to that request only.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::pipeline::{Assistant, EMPTY_QUERY_MSG};

/// Starts the HTTP server.
///
/// Builds the full pipeline from configuration, binds to `[server].bind`,
/// and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(Assistant::build(config).await?);
    let app = router(assistant);

    let bind_addr = &config.server.bind;
    println!("Product assistant listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router over an already-assembled pipeline.
///
/// Split out from [`run_server`] so integration tests can serve the app
/// on an ephemeral port with fake or disabled collaborators.
pub fn router(assistant: Arc<Assistant>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_home))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(assistant)
}

// ============ Error response ============

/// JSON error response body: `{"detail": "..."}`.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps pipeline errors onto the flat two-kind taxonomy: the blank-query
/// validation error is a 400, everything else is a 500 carrying the raw
/// error text.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg == EMPTY_QUERY_MSG {
        AppError {
            status: StatusCode::BAD_REQUEST,
            detail: msg,
        }
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Error: {:#}", err),
        }
    }
}

// ============ GET / ============

/// JSON response body for `GET /`.
#[derive(Serialize)]
struct HomeResponse {
    message: String,
}

/// Handler for `GET /`. Static welcome payload.
async fn handle_home() -> Json<HomeResponse> {
    Json(HomeResponse {
        message: "Welcome to the Product Info Assistant API".to_string(),
    })
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

/// JSON request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    user_query: String,
}

/// JSON response body for `POST /ask`.
///
/// `status` is present only when the turn was persisted; a history write
/// failure still returns the answer, minus this field.
#[derive(Serialize)]
struct AskResponse {
    user_query: String,
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

/// Handler for `POST /ask`.
///
/// Runs the full pipeline: history fetch, directive assembly, agent
/// invocation, normalization, persistence.
async fn handle_ask(
    State(assistant): State<Arc<Assistant>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let user_query = request.user_query.trim().to_string();

    let answer = assistant.ask(&user_query).await.map_err(classify_error)?;

    Ok(Json(AskResponse {
        user_query,
        response: answer.response,
        status: answer.saved.then(|| "saved to chat_history".to_string()),
    }))
}
