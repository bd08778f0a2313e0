// system-tests/src/lib.rs
// ============================================================================
// Module: AgentPI System Test Harness
// Description: In-process issuer and tool services for end-to-end tests.
// Purpose: Boot the full protocol stack on ephemeral ports.
// Dependencies: agentpi-core, agentpi-issuer, agentpi-keys, agentpi-tool, axum
// ============================================================================

//! ## Overview
//! The harness starts a real issuing authority (fresh key pair in a temp
//! directory) and a real tool service (in-memory stores, counting
//! provisioner) on ephemeral loopback ports, wired together over actual
//! HTTP: the tool fetches the issuer's JWKS exactly as it would in
//! production. Tests drive both services with a plain HTTP client.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use agentpi_core::core::identifiers::PlanId;
use agentpi_core::core::identifiers::ToolId;
use agentpi_core::core::types::Limits;
use agentpi_core::interfaces::ProvisionContext;
use agentpi_core::interfaces::ProvisionError;
use agentpi_core::interfaces::Provisioned;
use agentpi_core::interfaces::Provisioner;
use agentpi_core::store::MemoryIdempotencyStore;
use agentpi_core::store::MemoryJtiStore;
use agentpi_core::store::SharedIdempotencyStore;
use agentpi_core::store::SharedJtiStore;
use agentpi_issuer::GrantIssuer;
use agentpi_issuer::IssuerConfig;
use agentpi_keys::KeyManager;
use agentpi_tool::ConnectHandshake;
use agentpi_tool::GrantVerifier;
use agentpi_tool::NullAuditSink;
use agentpi_tool::ToolConfig;
use async_trait::async_trait;
use axum::Router;
use tempfile::TempDir;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pre-shared agent credential used by the harness issuer.
pub const AGENT_KEY: &str = "agentpi_system_test_key";

/// Tool identifier the harness serves.
pub const TOOL_ID: &str = "tool_example";

/// Issuer identity the harness uses.
pub const ISSUER: &str = "https://agentpi.local";

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Provisioner counting calls and minting predictable credentials.
struct StackProvisioner {
    /// Number of provision calls performed.
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Provisioner for StackProvisioner {
    async fn provision(&self, ctx: &ProvisionContext) -> Result<Provisioned, ProvisionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Provisioned {
            workspace_id: format!("ws_{}", ctx.org_id),
            agent_id: format!("ta_{}", ctx.agent_id),
            api_key: format!("tk_live_system_{call}"),
        })
    }
}

// ============================================================================
// SECTION: Test Stack
// ============================================================================

/// Running issuer and tool services plus their observables.
pub struct TestStack {
    /// Base URL of the issuing authority.
    pub issuer_url: String,
    /// Base URL of the tool service.
    pub tool_url: String,
    /// Number of provision calls the tool performed.
    pub provision_calls: Arc<AtomicUsize>,
    /// Key material directory; dropped with the stack.
    _keys_dir: TempDir,
}

impl TestStack {
    /// Boots the issuer and tool on ephemeral loopback ports.
    ///
    /// # Errors
    ///
    /// Returns a string description when any component fails to start.
    pub async fn start() -> Result<Self, String> {
        let keys_dir = TempDir::new().map_err(|err| format!("temp dir failed: {err}"))?;
        let keys = Arc::new(
            KeyManager::load_or_generate(keys_dir.path())
                .map_err(|err| format!("key manager failed: {err}"))?,
        );

        let issuer_config = IssuerConfig {
            issuer: ISSUER.to_string(),
            bind: "127.0.0.1:0".to_string(),
            keys_dir: keys_dir.path().to_path_buf(),
            agent_api_key: AGENT_KEY.to_string(),
            tool_id: TOOL_ID.to_string(),
            org_id: "org_demo".to_string(),
            agent_id: "agent_demo".to_string(),
            plan_id: "free".to_string(),
            grant_ttl_seconds: 300,
        };
        let issuer_router =
            agentpi_issuer::router(GrantIssuer::new(issuer_config, Arc::clone(&keys)), keys);
        let issuer_addr = spawn_server(issuer_router).await?;
        let issuer_url = format!("http://{issuer_addr}");

        let tool_config = ToolConfig {
            tool_id: ToolId::new(TOOL_ID),
            tool_name: "Tool Example".to_string(),
            connect_endpoint: "/v1/agentpi/connect".to_string(),
            issuer: ISSUER.to_string(),
            jwks_url: format!("{issuer_url}/.well-known/jwks.json"),
            idempotency_header: "Idempotency-Key".to_string(),
            idempotency_ttl_seconds: 86_400,
            plan_id: PlanId::new("free"),
            max_scopes: vec!["read".to_string(), "deploy".to_string(), "write".to_string()],
            max_limits: Limits {
                rpm: 120,
                daily_quota: 1_000,
                concurrency: 5,
            },
        };
        let verifier = GrantVerifier::new().map_err(|err| format!("verifier failed: {err}"))?;
        let provision_calls = Arc::new(AtomicUsize::new(0));
        let handshake = Arc::new(ConnectHandshake::new(
            tool_config,
            verifier,
            SharedJtiStore::from_store(MemoryJtiStore::new()),
            SharedIdempotencyStore::from_store(MemoryIdempotencyStore::new()),
            Arc::new(StackProvisioner {
                calls: Arc::clone(&provision_calls),
            }),
        ));
        let tool_router = agentpi_tool::router(handshake, Arc::new(NullAuditSink));
        let tool_addr = spawn_server(tool_router).await?;

        Ok(Self {
            issuer_url,
            tool_url: format!("http://{tool_addr}"),
            provision_calls,
            _keys_dir: keys_dir,
        })
    }
}

/// Binds an ephemeral loopback port and serves the router in the background.
async fn spawn_server(router: Router) -> Result<SocketAddr, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {err}"))?;
    let addr = listener.local_addr().map_err(|err| format!("local addr failed: {err}"))?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}
