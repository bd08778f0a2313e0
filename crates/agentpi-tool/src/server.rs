// crates/agentpi-tool/src/server.rs
// ============================================================================
// Module: AgentPI Tool HTTP Server
// Description: axum routes for discovery and the connect endpoint.
// Purpose: Translate handshake outcomes into wire responses at one boundary.
// Dependencies: agentpi-core, axum, crate::{audit, connect, discovery}, tokio
// ============================================================================

//! ## Overview
//! The router exposes the discovery document and the connect endpoint over
//! HTTP. Header extraction happens here; everything else is delegated to
//! [`ConnectHandshake`]. This module is the single place a [`ConnectError`]
//! becomes a wire response, and the place every outcome is audited, so
//! internal error text is logged in full without ever reaching the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use agentpi_core::core::types::DISCOVERY_PATH;
use agentpi_core::error::ConnectError;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::ConnectAuditEvent;
use crate::connect::ConnectHandshake;
use crate::discovery::discovery_document;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool server lifecycle errors.
#[derive(Debug, Error)]
pub enum ToolServerError {
    /// The bind address is missing or invalid.
    #[error("tool server config error: {0}")]
    Config(String),
    /// The listener or server loop failed.
    #[error("tool server transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Shared state for the tool's HTTP handlers.
struct ToolState {
    /// Connect handshake pipeline.
    handshake: Arc<ConnectHandshake>,
    /// Audit event destination.
    audit: Arc<dyn AuditSink>,
}

/// Builds the tool router serving discovery and connect.
#[must_use]
pub fn router(handshake: Arc<ConnectHandshake>, audit: Arc<dyn AuditSink>) -> Router {
    let connect_path = handshake.config().connect_endpoint.clone();
    let state = Arc::new(ToolState {
        handshake,
        audit,
    });
    Router::new()
        .route(DISCOVERY_PATH, get(handle_discovery))
        .route(&connect_path, post(handle_connect))
        .with_state(state)
}

/// Serves the router on the given bind address until the server fails.
///
/// # Errors
///
/// Returns [`ToolServerError`] when the address is invalid or the listener
/// cannot be established.
pub async fn serve(bind: &str, router: Router) -> Result<(), ToolServerError> {
    let addr: SocketAddr =
        bind.parse().map_err(|_| ToolServerError::Config(format!("invalid bind address: {bind}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ToolServerError::Transport(format!("bind failed: {err}")))?;
    axum::serve(listener, router)
        .await
        .map_err(|err| ToolServerError::Transport(format!("server failed: {err}")))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Serves the discovery document, re-derived on every request.
async fn handle_discovery(State(state): State<Arc<ToolState>>) -> Response {
    axum::Json(discovery_document(state.handshake.config())).into_response()
}

/// Runs the connect handshake and translates the outcome to the wire.
async fn handle_connect(State(state): State<Arc<ToolState>>, headers: HeaderMap) -> Response {
    let config = state.handshake.config();
    let authorization = header_value(&headers, AUTHORIZATION.as_str());
    let idempotency_key = header_value(&headers, &config.idempotency_header);
    let tool_id = config.tool_id.to_string();
    match state.handshake.execute(authorization, idempotency_key).await {
        Ok(response) => {
            state.audit.emit(&ConnectAuditEvent::success(&tool_id, response.status));
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, axum::Json(response.body)).into_response()
        }
        Err(err) => error_response(state.audit.as_ref(), &tool_id, &err),
    }
}

/// Translates a handshake error into its wire response, auditing it in full.
fn error_response(audit: &dyn AuditSink, tool_id: &str, err: &ConnectError) -> Response {
    audit.emit(&ConnectAuditEvent::failure(tool_id, err.status(), err.code(), err.to_string()));
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(err.to_body())).into_response()
}

/// Reads a header value as a string, treating non-UTF-8 values as absent.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
