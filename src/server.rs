// ABOUTME: HTTP API server exposing the tools over REST and MCP
// ABOUTME: Layers bearer auth and per-client rate limiting in front of every tool route

use crate::chat::ChatClient;
use crate::dispatch::{ToolCall, ToolDispatcher};
use crate::error::BridgeError;
use crate::mcp::mcp_handler;
use crate::rate_limit::{Admission, RateLimiter};
use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared server state handed to every route.
pub struct AppState {
    pub dispatcher: ToolDispatcher,
    pub limiter: RateLimiter,
    pub api_key: String,
    pub chat: Arc<dyn ChatClient>,
}

/// Bearer-token check. Runs outermost so unauthenticated requests never
/// reach the rate limiter or a handler.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.api_key => next.run(request).await,
        _ => {
            tracing::warn!(remote_addr = %addr, "Request denied: missing or invalid API key");
            BridgeError::Unauthorized.into_response()
        }
    }
}

/// Sliding-window admission keyed by client IP.
async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let identity = addr.ip().to_string();
    match state.limiter.admit(&identity) {
        Admission::Granted => next.run(request).await,
        Admission::Denied { retry_after } => {
            tracing::warn!(
                remote_addr = %addr,
                retry_after_secs = retry_after.as_secs(),
                "Request denied: rate limit exceeded"
            );
            BridgeError::RateLimited { retry_after }.into_response()
        }
    }
}

/// Health endpoint. Unauthenticated so orchestrators can probe it.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": "herald",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "connected": state.chat.is_connected(),
    }))
}

async fn channels_handler(State(state): State<Arc<AppState>>) -> Response {
    let call = ToolCall {
        name: "list_channels".to_string(),
        arguments: json!({}),
    };
    match state.dispatcher.dispatch(&call).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Generic tool route: POST /<tool_name> with the arguments as the JSON body.
async fn tool_handler(
    State(state): State<Arc<AppState>>,
    Path(tool_name): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let call = ToolCall {
        name: tool_name,
        arguments: body.map(|Json(v)| v).unwrap_or_else(|| json!({})),
    };
    tracing::info!(tool = %call.name, "HTTP tool call");
    match state.dispatcher.dispatch(&call).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Assemble the router: an open health probe plus the protected tool surface.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/channels", get(channels_handler))
        .route("/mcp", post(mcp_handler))
        .route("/{tool}", post(tool_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(health_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
