// crates/agentpi-issuer/src/server.rs
// ============================================================================
// Module: AgentPI Issuer HTTP Server
// Description: axum routes for grant issuance and JWKS publication.
// Purpose: Translate issuance outcomes into wire responses at one boundary.
// Dependencies: agentpi-core, agentpi-keys, axum, tokio
// ============================================================================

//! ## Overview
//! The issuer router exposes `POST /v1/connect-grants` behind the pre-shared
//! agent header and `GET /.well-known/jwks.json` without auth. Request
//! bodies are parsed here so malformed JSON maps onto the same structured
//! error envelope as field violations; issuance outcomes are logged as JSON
//! lines on stderr with internal detail that never reaches the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use agentpi_core::core::time::now_unix_millis;
use agentpi_core::core::types::AGENT_KEY_HEADER;
use agentpi_core::core::types::ConnectGrantRequest;
use agentpi_core::core::types::JWKS_PATH;
use agentpi_keys::KeyManager;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use thiserror::Error;

use crate::grants::FieldViolation;
use crate::grants::GrantIssuer;
use crate::grants::IssueError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Issuer server lifecycle errors.
#[derive(Debug, Error)]
pub enum IssuerServerError {
    /// The bind address is missing or invalid.
    #[error("issuer server config error: {0}")]
    Config(String),
    /// The listener or server loop failed.
    #[error("issuer server transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Shared state for the issuer's HTTP handlers.
struct IssuerState {
    /// Grant issuance pipeline.
    issuer: GrantIssuer,
    /// Key manager publishing the JWKS document.
    keys: Arc<KeyManager>,
}

/// Builds the issuer router serving grant issuance and JWKS.
#[must_use]
pub fn router(issuer: GrantIssuer, keys: Arc<KeyManager>) -> Router {
    let state = Arc::new(IssuerState {
        issuer,
        keys,
    });
    Router::new()
        .route("/v1/connect-grants", post(handle_issue))
        .route(JWKS_PATH, get(handle_jwks))
        .with_state(state)
}

/// Serves the router on the given bind address until the server fails.
///
/// # Errors
///
/// Returns [`IssuerServerError`] when the address is invalid or the listener
/// cannot be established.
pub async fn serve(bind: &str, router: Router) -> Result<(), IssuerServerError> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| IssuerServerError::Config(format!("invalid bind address: {bind}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| IssuerServerError::Transport(format!("bind failed: {err}")))?;
    axum::serve(listener, router)
        .await
        .map_err(|err| IssuerServerError::Transport(format!("server failed: {err}")))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles grant issuance requests.
async fn handle_issue(
    State(state): State<Arc<IssuerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let agent_key =
        headers.get(AGENT_KEY_HEADER).and_then(|value| value.to_str().ok());
    let request: ConnectGrantRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let parse_error = IssueError::InvalidRequest {
                violations: vec![FieldViolation {
                    field: "body",
                    message: "must be a valid connect grant request",
                }],
            };
            log_issue_event("grant_rejected", parse_error.code(), Some(&err.to_string()));
            return error_response(&parse_error);
        }
    };
    match state.issuer.issue(agent_key, &request) {
        Ok(response) => {
            log_issue_event("grant_issued", "ok", None);
            (StatusCode::OK, axum::Json(response)).into_response()
        }
        Err(err) => {
            log_issue_event("grant_rejected", err.code(), Some(&err.to_string()));
            error_response(&err)
        }
    }
}

/// Serves the issuer's current public signing keys.
async fn handle_jwks(State(state): State<Arc<IssuerState>>) -> Response {
    axum::Json(state.keys.public_jwks()).into_response()
}

/// Translates an issuance error into its wire response.
fn error_response(err: &IssueError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(err.to_body())).into_response()
}

// ============================================================================
// SECTION: Issuance Logging
// ============================================================================

/// Issuance audit event written as a JSON line to stderr.
#[derive(Debug, Serialize)]
struct IssueAuditEvent<'a> {
    /// Event identifier.
    event: &'a str,
    /// Event timestamp (milliseconds since epoch).
    timestamp_ms: u128,
    /// Outcome label (`ok` or a wire error code).
    outcome: &'a str,
    /// Internal error text, absent on success.
    error_message: Option<&'a str>,
}

/// Emits one issuance audit event.
fn log_issue_event(event: &str, outcome: &str, error_message: Option<&str>) {
    let payload = IssueAuditEvent {
        event,
        timestamp_ms: now_unix_millis(),
        outcome,
        error_message,
    };
    if let Ok(line) = serde_json::to_string(&payload) {
        let mut stderr = io::stderr();
        let _ = writeln!(&mut stderr, "{line}");
    }
}
