//! HTTP server: REST tool API plus the MCP streamable-HTTP endpoint.
//!
//! Every tool in the [`ToolRegistry`] is reachable two ways: as plain JSON
//! over `POST /tools/{name}`, and as an MCP tool over `/mcp`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/health` | Health check (returns version and cached page count) |
//! | `*`    | `/mcp` | MCP streamable HTTP (JSON-RPC) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `tool_error` (500).
//!
//! # MCP client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "notion": {
//!       "command": "notion-harness",
//!       "args": ["--config", "/path/to/notion.toml", "serve", "stdio"]
//!     }
//!   }
//! }
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::gateway::GatewayError;
use crate::mcp::McpBridge;
use crate::traits::{validate_params, ToolContext, ToolInfo, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// Start the server on `[server].bind` against the live Notion API.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = ToolContext::from_config(config)?;
    run_server_with_extensions(ctx, ToolRegistry::with_builtins()).await
}

/// Start the server with a prepared context and registry, e.g. one that
/// carries custom tools next to the built-ins.
pub async fn run_server_with_extensions(
    ctx: ToolContext,
    tools: ToolRegistry,
) -> anyhow::Result<()> {
    let bind_addr = ctx.config().server.bind.clone();

    for t in tools.tools() {
        let tag = if t.is_builtin() { "builtin" } else { "custom" };
        tracing::debug!(tool = t.name(), kind = tag, "registered tool");
    }

    let app = build_router(ctx, Arc::new(tools));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening (REST on /tools, MCP on /mcp)");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Router with every route and the CORS layer applied.
pub fn build_router(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Router {
    let bridge = McpBridge::new(ctx.clone(), tools.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(AppState { ctx, tools })
}

// ============ Errors ============

/// HTTP-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    BadRequest,
    NotFound,
    Timeout,
    Tool,
}

impl ErrorKind {
    fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Tool => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Tool => "tool_error",
        }
    }

    /// Category of a tool error. Gateway failures anywhere in the chain are
    /// classified by variant; anything else falls back to the message.
    fn from_error(err: &anyhow::Error) -> Self {
        let gateway = err
            .chain()
            .find_map(|e| e.downcast_ref::<GatewayError>());
        match gateway {
            Some(GatewayError::NotFound(_)) | Some(GatewayError::Status { status: 404, .. }) => {
                ErrorKind::NotFound
            }
            Some(GatewayError::Http(e)) if e.is_timeout() => ErrorKind::Timeout,
            Some(_) => ErrorKind::Tool,
            None => Self::from_message(&format!("{:#}", err)),
        }
    }

    /// Infer the category from an error message. Tools signal client
    /// errors through wording only.
    fn from_message(msg: &str) -> Self {
        const CLIENT_MARKERS: [&str; 4] = [
            "must not be empty",
            "must be",
            "invalid path",
            "missing required",
        ];

        if msg.contains("not found") {
            ErrorKind::NotFound
        } else if CLIENT_MARKERS.iter().any(|m| msg.contains(m)) {
            ErrorKind::BadRequest
        } else if msg.contains("timed out") {
            ErrorKind::Timeout
        } else {
            ErrorKind::Tool
        }
    }
}

#[derive(Debug)]
struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure raised while executing `tool`.
    fn from_tool(tool: &str, err: anyhow::Error) -> Self {
        let kind = ErrorKind::from_error(&err);
        Self::new(kind, format!("{}: {:#}", tool, err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.kind.code(), "message": self.message }
        });
        (self.kind.status(), Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    cached_pages: usize,
    cache_updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Reports the in-memory snapshot without triggering a rebuild.
async fn handle_health(State(state): State<AppState>) -> Json<Health> {
    let snapshot = state.ctx.cache().snapshot();
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cached_pages: snapshot.len(),
        cache_updated_at: snapshot.updated_at(),
    })
}

// ============ GET /tools/list ============

async fn handle_list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools: Vec<ToolInfo> = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(serde_json::json!({ "tools": tools }))
}

// ============ POST /tools/{name} ============

/// Returns `404` for unknown tools, `400` for parameter errors, and the
/// classified status for execution errors.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some(tool) = state.tools.find(&name) else {
        return Err(AppError::new(
            ErrorKind::NotFound,
            format!("no tool registered with name: {}", name),
        ));
    };

    let params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| AppError::new(ErrorKind::BadRequest, e.to_string()))?;

    match tool.execute(params, &state.ctx).await {
        Ok(result) => Ok(Json(serde_json::json!({ "result": result }))),
        Err(e) => {
            tracing::debug!(tool = %name, error = %e, "tool call failed");
            Err(AppError::from_tool(&name, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_message() {
        let cases = [
            ("page not found: X", StatusCode::NOT_FOUND),
            ("query must not be empty", StatusCode::BAD_REQUEST),
            ("invalid path: every element must be a string", StatusCode::BAD_REQUEST),
            ("operation timed out", StatusCode::REQUEST_TIMEOUT),
            ("API returned HTTP 502: bad gateway", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (msg, status) in cases {
            let e = AppError::from_tool("t", anyhow::anyhow!(msg));
            assert_eq!(e.kind.status(), status, "{msg}");
            assert!(e.message.starts_with("t: "));
        }
    }

    #[test]
    fn gateway_errors_are_classified_by_variant() {
        let decode = anyhow::Error::new(GatewayError::Decode("invalid type: string".into()))
            .context("Failed to read blocks of page x");
        let e = AppError::from_tool("read_page", decode);
        assert_eq!(e.kind.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.message.contains("invalid type: string"));

        let missing = anyhow::Error::new(GatewayError::NotFound("x".into()))
            .context("Failed to retrieve page x");
        assert_eq!(
            AppError::from_tool("read_page", missing).kind.status(),
            StatusCode::NOT_FOUND
        );

        let gone = anyhow::Error::new(GatewayError::Status {
            status: 404,
            body: "{}".into(),
        });
        assert_eq!(
            AppError::from_tool("read_page", gone).kind.status(),
            StatusCode::NOT_FOUND
        );

        let limited = anyhow::Error::new(GatewayError::RateLimited);
        assert_eq!(
            AppError::from_tool("search", limited).kind.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
