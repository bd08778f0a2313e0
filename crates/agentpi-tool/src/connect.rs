// crates/agentpi-tool/src/connect.rs
// ============================================================================
// Module: AgentPI Connect Handshake
// Description: The gate-by-gate connect pipeline from bearer token to result.
// Purpose: Enforce idempotency, single-use grants, and negotiated provisioning.
// Dependencies: agentpi-core, crate::{config, verify}, serde_json
// ============================================================================

//! ## Overview
//! [`ConnectHandshake`] runs the connect request pipeline as a sequence of
//! hard gates: extract the bearer grant, extract the idempotency key, verify
//! the grant, fingerprint the request, consult the idempotency cache, admit
//! the grant's `jti`, negotiate scopes and limits, provision, commit the
//! response, respond. Any gate failure aborts immediately.
//! Invariants:
//! - The idempotency cache is consulted before `jti` admission, so a cached
//!   replay never consumes a grant.
//! - The idempotency record is committed only after provisioning succeeds;
//!   the provisioning side effect is therefore at-least-once.
//! - A cached response is returned byte-for-byte as first stored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use agentpi_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use agentpi_core::core::hashing::HashDigest;
use agentpi_core::core::hashing::hash_canonical_json;
use agentpi_core::core::identifiers::OrgId;
use agentpi_core::core::identifiers::ToolId;
use agentpi_core::core::time::now_unix;
use agentpi_core::core::types::Claim;
use agentpi_core::core::types::ConnectResult;
use agentpi_core::core::types::ConnectStatus;
use agentpi_core::core::types::CredentialType;
use agentpi_core::core::types::Credentials;
use agentpi_core::core::types::Limits;
use agentpi_core::core::types::WorkspaceRef;
use agentpi_core::error::ConnectError;
use agentpi_core::interfaces::IdempotencyRecord;
use agentpi_core::interfaces::IdempotencyStore;
use agentpi_core::interfaces::JtiStore;
use agentpi_core::interfaces::ProvisionContext;
use agentpi_core::interfaces::Provisioner;
use agentpi_core::interfaces::StoreError;
use agentpi_core::negotiate::clamp_limits;
use agentpi_core::negotiate::validate_scopes;
use agentpi_core::store::SharedIdempotencyStore;
use agentpi_core::store::SharedJtiStore;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::config::ToolConfig;
use crate::verify::GrantVerifier;

// ============================================================================
// SECTION: Response
// ============================================================================

/// Wire-level outcome of a successful handshake gate sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectResponse {
    /// HTTP status to return (always 200 for success paths).
    pub status: u16,
    /// Response body, either freshly assembled or replayed from cache.
    pub body: Value,
}

// ============================================================================
// SECTION: Request Fingerprint
// ============================================================================

/// Semantically relevant claim fields hashed into the request fingerprint.
#[derive(Debug, Serialize)]
struct FingerprintInputs<'a> {
    /// Organization identifier.
    org_id: &'a OrgId,
    /// Tool identifier.
    tool_id: &'a ToolId,
    /// Requested scopes.
    scopes: &'a [String],
    /// Requested limits.
    limits: &'a Limits,
    /// Workspace descriptor.
    workspace: &'a WorkspaceRef,
    /// Caller-supplied nonce.
    nonce: &'a str,
}

/// Computes the canonical fingerprint of a claim's semantic inputs.
fn request_fingerprint(claim: &Claim) -> Result<HashDigest, ConnectError> {
    let inputs = FingerprintInputs {
        org_id: &claim.org_id,
        tool_id: &claim.tool_id,
        scopes: &claim.scopes,
        limits: &claim.limits,
        workspace: &claim.workspace,
        nonce: &claim.nonce,
    };
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &inputs)
        .map_err(|err| ConnectError::internal(format!("request fingerprint failed: {err}")))
}

// ============================================================================
// SECTION: Connect Handshake
// ============================================================================

/// Orchestrator of the connect request pipeline.
pub struct ConnectHandshake {
    /// Resolved tool configuration.
    config: ToolConfig,
    /// Grant verifier with its shared JWKS cache.
    verifier: GrantVerifier,
    /// Single-use admission store for grant identifiers.
    jti_store: SharedJtiStore,
    /// Response cache for idempotency keys.
    idempotency_store: SharedIdempotencyStore,
    /// Tool-supplied provisioning callback.
    provisioner: Arc<dyn Provisioner>,
}

impl ConnectHandshake {
    /// Builds a handshake over the given collaborators.
    #[must_use]
    pub fn new(
        config: ToolConfig,
        verifier: GrantVerifier,
        jti_store: SharedJtiStore,
        idempotency_store: SharedIdempotencyStore,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        Self {
            config,
            verifier,
            jti_store,
            idempotency_store,
            provisioner,
        }
    }

    /// Returns the resolved tool configuration.
    #[must_use]
    pub const fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Runs the full connect pipeline for one request.
    ///
    /// `authorization` is the raw `Authorization` header value and
    /// `idempotency_key` the raw idempotency header value, both as received.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectError`] of the first failing gate; the error's
    /// code and status map directly onto the wire taxonomy.
    pub async fn execute(
        &self,
        authorization: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<ConnectResponse, ConnectError> {
        let token = extract_bearer(authorization)?;
        let key = idempotency_key.map(str::trim).filter(|key| !key.is_empty()).ok_or_else(
            || ConnectError::MissingIdempotencyKey {
                header: self.config.idempotency_header.clone(),
            },
        )?;

        let grant = self
            .verifier
            .verify(token, &self.config.jwks_url, &self.config.issuer, &self.config.tool_id)
            .await?;
        let claim = grant.claim;
        let fingerprint = request_fingerprint(&claim)?;

        if let Some(cached) = self
            .idempotency_store
            .get(key, &claim.org_id, &self.config.tool_id)
            .map_err(store_failure)?
        {
            if cached.request_hash == fingerprint {
                return replay_response(&cached);
            }
            return Err(ConnectError::IdempotencyConflict);
        }

        self.jti_store.add(&grant.jti, grant.exp).map_err(|err| match err {
            StoreError::AlreadyExists(_) => ConnectError::invalid_grant_with_detail(
                "Connect grant has already been used (replay)",
                json!({"reason": "replay"}),
            ),
            StoreError::Store(message) => ConnectError::internal(message),
        })?;

        let applied_scopes = validate_scopes(&claim.scopes, &self.config.max_scopes)?;
        let applied_limits = clamp_limits(claim.limits, self.config.max_limits);

        let provisioned = self
            .provisioner
            .provision(&ProvisionContext {
                org_id: claim.org_id.clone(),
                agent_id: grant.sub,
                scopes: applied_scopes.clone(),
                limits: applied_limits,
                workspace: claim.workspace,
                grant_jti: grant.jti,
                grant_exp: grant.exp,
            })
            .await
            .map_err(|err| ConnectError::internal(err.to_string()))?;

        let wire_result = ConnectResult {
            status: ConnectStatus::Active,
            tool_workspace_id: provisioned.workspace_id,
            tool_agent_id: provisioned.agent_id,
            credentials: Credentials {
                credential_type: CredentialType::ApiKey,
                api_key: provisioned.api_key,
            },
            applied_plan_id: self.config.plan_id.clone(),
            applied_scopes,
            applied_limits,
        };
        let response_json = serde_json::to_string(&wire_result)
            .map_err(|err| ConnectError::internal(format!("result serialization failed: {err}")))?;
        let record = IdempotencyRecord {
            request_hash: fingerprint.clone(),
            response_json,
            expires_at: now_unix() + self.config.idempotency_ttl_seconds,
        };

        match self.idempotency_store.set(key, &claim.org_id, &self.config.tool_id, record) {
            Ok(()) => {}
            // Lost a commit race for the same key: honor whichever record won.
            Err(StoreError::AlreadyExists(_)) => {
                let winner = self
                    .idempotency_store
                    .get(key, &claim.org_id, &self.config.tool_id)
                    .map_err(store_failure)?;
                if let Some(cached) = winner {
                    if cached.request_hash == fingerprint {
                        return replay_response(&cached);
                    }
                    return Err(ConnectError::IdempotencyConflict);
                }
            }
            Err(StoreError::Store(message)) => return Err(ConnectError::internal(message)),
        }

        let body = serde_json::to_value(&wire_result)
            .map_err(|err| ConnectError::internal(format!("result serialization failed: {err}")))?;
        Ok(ConnectResponse {
            status: 200,
            body,
        })
    }
}

// ============================================================================
// SECTION: Gate Helpers
// ============================================================================

/// Extracts the bearer token from an `Authorization` header value.
fn extract_bearer(authorization: Option<&str>) -> Result<&str, ConnectError> {
    authorization
        .and_then(|value| value.trim().strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ConnectError::Unauthorized {
            message: "Missing Authorization Bearer token".to_string(),
        })
}

/// Replays a cached idempotency record verbatim.
fn replay_response(record: &IdempotencyRecord) -> Result<ConnectResponse, ConnectError> {
    let body = serde_json::from_str(&record.response_json)
        .map_err(|err| ConnectError::internal(format!("cached response malformed: {err}")))?;
    Ok(ConnectResponse {
        status: 200,
        body,
    })
}

/// Maps a store backend failure onto the internal-error class.
fn store_failure(err: StoreError) -> ConnectError {
    ConnectError::internal(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
