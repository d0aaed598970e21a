//! HTTP tool server.
//!
//! Every built-in tool is registered in a [`ToolRegistry`] and dispatched
//! through the same `POST /tools/{name}` handler.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "path notes/a.md not found: ..." } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `INVALID_INPUT` | 400 |
//! | `NOT_FOUND` | 404 |
//! | `CONFLICT` | 409 |
//! | `LIMIT_EXCEEDED` | 413 |
//! | `INTERNAL_ERROR` | 500 |

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use docledger_core::LedgerError;

use crate::config::Config;
use crate::engine::Ledger;
use crate::ingest::IndexOptions;
use crate::tools::{ToolContext, ToolInfo, ToolRegistry};

#[derive(Clone)]
struct AppState {
    ctx: Arc<ToolContext>,
    tools: Arc<ToolRegistry>,
}

/// Build the router. Split out so tests can serve it on an ephemeral port.
pub fn router(ledger: Arc<Ledger>, index_options: IndexOptions, tools: ToolRegistry) -> Router {
    let state = AppState {
        ctx: Arc::new(ToolContext::new(ledger, index_options)),
        tools: Arc::new(tools),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ledger = Arc::new(Ledger::open(config).await?);
    let tools = ToolRegistry::with_builtins();
    for t in tools.tools() {
        tracing::debug!(tool = t.name(), "registered tool");
    }
    let app = router(ledger, IndexOptions::from_config(config), tools);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "tool server listening");
    println!("DocLedger server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "INVALID_INPUT" => StatusCode::BAD_REQUEST,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "CONFLICT" => StatusCode::CONFLICT,
        "LIMIT_EXCEEDED" => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let code = err
        .downcast_ref::<LedgerError>()
        .map(|e| e.code())
        .unwrap_or("INTERNAL_ERROR");
    if code == "INTERNAL_ERROR" {
        tracing::error!(tool = tool_name, error = %err, "tool failed");
    }
    AppError {
        status: status_for(code),
        code,
        message: format!("{}: {}", tool_name, err),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state.tools.find(&name).ok_or_else(|| AppError {
        status: StatusCode::NOT_FOUND,
        code: "NOT_FOUND",
        message: format!("no tool registered with name: {}", name),
    })?;

    let params = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_INPUT",
            message: format!("{}: request body is not valid JSON: {}", name, e),
        })?
    };
    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(status_for("INVALID_INPUT"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("NOT_FOUND"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("CONFLICT"), StatusCode::CONFLICT);
        assert_eq!(status_for("LIMIT_EXCEEDED"), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_for("INTERNAL_ERROR"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ledger_errors_keep_their_code() {
        let err = anyhow::Error::from(LedgerError::not_found("path a.md", "index it first"));
        let app = classify_tool_error("read_note", err);
        assert_eq!(app.status, StatusCode::NOT_FOUND);
        assert_eq!(app.code, "NOT_FOUND");

        let app = classify_tool_error("read_note", anyhow::anyhow!("disk on fire"));
        assert_eq!(app.code, "INTERNAL_ERROR");
    }
}
