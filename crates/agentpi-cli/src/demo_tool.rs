// crates/agentpi-cli/src/demo_tool.rs
// ============================================================================
// Module: AgentPI Demo Tool Service
// Description: Example tool with an in-memory provisioner and protected API.
// Purpose: Show the full tool-side integration, including credential checks.
// Dependencies: agentpi-core, agentpi-tool, axum, rand, sha2
// ============================================================================

//! ## Overview
//! The demo tool embeds the connect integration with in-memory stores and a
//! provisioner that mints `tk_live_` API keys, storing only the hashed
//! secret. Besides discovery and connect it serves a protected `/deploy`
//! endpoint that validates the issued key and its scopes, so the demo flow
//! can prove the credential actually works.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use agentpi_core::core::time::now_unix;
use agentpi_core::core::types::Limits;
use agentpi_core::interfaces::ProvisionContext;
use agentpi_core::interfaces::ProvisionError;
use agentpi_core::interfaces::Provisioned;
use agentpi_core::interfaces::Provisioner;
use agentpi_core::store::MemoryIdempotencyStore;
use agentpi_core::store::MemoryJtiStore;
use agentpi_core::store::SharedIdempotencyStore;
use agentpi_core::store::SharedJtiStore;
use agentpi_tool::ConnectHandshake;
use agentpi_tool::GrantVerifier;
use agentpi_tool::StderrAuditSink;
use agentpi_tool::ToolConfig;
use agentpi_tool::ToolOptions;
use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options for the demo tool service.
pub(crate) struct DemoToolOptions {
    /// Tool identifier to serve as.
    pub tool_id: String,
    /// Allowed scopes.
    pub scopes: Vec<String>,
    /// Maximum requests per minute.
    pub rpm: u32,
    /// Maximum daily quota.
    pub daily: u32,
    /// Maximum concurrency.
    pub concurrency: u32,
    /// Expected grant issuer.
    pub issuer: Option<String>,
    /// Issuer JWKS URL.
    pub jwks_url: Option<String>,
}

// ============================================================================
// SECTION: API Key Registry
// ============================================================================

/// Issued API key record, keyed by key prefix.
#[derive(Debug, Clone)]
struct ApiKeyRecord {
    /// Hex SHA-256 of the key secret.
    hashed_secret: String,
    /// Scopes the key carries.
    scopes: Vec<String>,
    /// Workspace the key belongs to.
    workspace_id: String,
}

/// In-memory registry of issued API keys.
#[derive(Debug, Clone, Default)]
struct KeyRegistry {
    /// Records keyed by key prefix, behind one lock.
    records: Arc<Mutex<BTreeMap<String, ApiKeyRecord>>>,
}

impl KeyRegistry {
    /// Stores a freshly issued key record.
    fn insert(&self, prefix: String, record: ApiKeyRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.insert(prefix, record);
        }
    }

    /// Looks up a record by key prefix.
    fn get(&self, prefix: &str) -> Option<ApiKeyRecord> {
        self.records.lock().ok().and_then(|guard| guard.get(prefix).cloned())
    }
}

/// Hashes an API key secret for storage and comparison.
fn hash_secret(secret: &str) -> String {
    hex_bytes(&Sha256::digest(secret.as_bytes()))
}

// ============================================================================
// SECTION: Demo Provisioner
// ============================================================================

/// Provisioner minting `tk_live_` API keys into the registry.
struct DemoProvisioner {
    /// Registry receiving issued keys.
    registry: KeyRegistry,
}

#[async_trait]
impl Provisioner for DemoProvisioner {
    async fn provision(&self, ctx: &ProvisionContext) -> Result<Provisioned, ProvisionError> {
        let workspace_id = format!("ws_{}", ctx.org_id);
        let agent_id = format!("ta_{}", ctx.agent_id);

        let mut prefix_bytes = [0_u8; 4];
        OsRng.fill_bytes(&mut prefix_bytes);
        let mut secret_bytes = [0_u8; 24];
        OsRng.fill_bytes(&mut secret_bytes);
        let prefix = format!("tk_live_{}", hex_bytes(&prefix_bytes));
        let secret = URL_SAFE_NO_PAD.encode(secret_bytes);
        let api_key = format!("{prefix}_{secret}");

        self.registry.insert(
            prefix,
            ApiKeyRecord {
                hashed_secret: hash_secret(&secret),
                scopes: ctx.scopes.clone(),
                workspace_id: workspace_id.clone(),
            },
        );
        Ok(Provisioned {
            workspace_id,
            agent_id,
            api_key,
        })
    }
}

/// Encodes bytes as lowercase hex.
fn hex_bytes(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Router Assembly
// ============================================================================

/// Builds the demo tool router: discovery, connect, and the protected API.
pub(crate) fn router(options: DemoToolOptions) -> Result<Router, String> {
    let config = ToolConfig::resolve(ToolOptions {
        tool_id: Some(options.tool_id),
        scopes: options.scopes,
        max_limits: Some(Limits {
            rpm: options.rpm,
            daily_quota: options.daily,
            concurrency: options.concurrency,
        }),
        issuer: options.issuer,
        jwks_url: options.jwks_url,
        ..ToolOptions::default()
    })
    .map_err(|err| format!("tool config invalid: {err}"))?;
    let verifier = GrantVerifier::new().map_err(|err| format!("verifier startup failed: {err}"))?;

    let registry = KeyRegistry::default();
    let handshake = Arc::new(ConnectHandshake::new(
        config,
        verifier,
        SharedJtiStore::from_store(MemoryJtiStore::new()),
        SharedIdempotencyStore::from_store(MemoryIdempotencyStore::new()),
        Arc::new(DemoProvisioner {
            registry: registry.clone(),
        }),
    ));
    let connect_router = agentpi_tool::router(handshake, Arc::new(StderrAuditSink));
    let api_router =
        Router::new().route("/deploy", post(handle_deploy)).with_state(Arc::new(registry));
    Ok(connect_router.merge(api_router))
}

// ============================================================================
// SECTION: Protected API
// ============================================================================

/// Validates the issued API key and requires the `deploy` scope.
async fn handle_deploy(State(registry): State<Arc<KeyRegistry>>, headers: HeaderMap) -> Response {
    let Some(api_key) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return api_error(StatusCode::UNAUTHORIZED, "unauthorized", "Missing Bearer token");
    };

    // Key format: tk_live_<8 hex>_<secret>.
    let parts: Vec<&str> = api_key.split('_').collect();
    if parts.len() < 4 {
        return api_error(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid API key format");
    }
    let prefix = parts[..3].join("_");
    let secret = parts[3..].join("_");

    let Some(record) = registry.get(&prefix) else {
        return api_error(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid API key");
    };
    if record.hashed_secret != hash_secret(&secret) {
        return api_error(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid API key");
    }
    if !record.scopes.iter().any(|scope| scope == "deploy") {
        return api_error(StatusCode::FORBIDDEN, "forbidden", "Missing deploy scope");
    }

    (
        StatusCode::OK,
        axum::Json(json!({
            "deployed": true,
            "message": "Deployment successful",
            "workspace_id": record.workspace_id,
            "timestamp": now_unix(),
        })),
    )
        .into_response()
}

/// Renders a structured API error.
fn api_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, axum::Json(json!({"error": {"code": code, "message": message}}))).into_response()
}
