// crates/agentpi-core/src/interfaces/mod.rs
// ============================================================================
// Module: AgentPI Interfaces
// Description: Backend-agnostic interfaces for replay, idempotency, and provisioning.
// Purpose: Define the contract surfaces the connect handshake depends on.
// Dependencies: crate::core, async-trait, serde, thiserror
// ============================================================================

//! ## Overview
//! These interfaces are the seams between the handshake pipeline and its
//! backends. Any implementation is acceptable as long as it honors the
//! stated atomicity and expiry contracts: `JtiStore::add` must be an atomic
//! check-and-insert, and both stores treat expired entries as absent.
//! Provisioning is the only interface expected to perform durable external
//! side effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::ToolId;
use crate::core::time::UnixSeconds;
use crate::core::types::Limits;
use crate::core::types::WorkspaceRef;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors raised by replay and idempotency stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entry already exists and has not expired.
    #[error("entry already present: {0}")]
    AlreadyExists(String),
    /// Backend failure (lock poisoning, I/O, database errors).
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Replay Guard
// ============================================================================

/// At-most-once admission of grant identifiers.
///
/// # Invariants
/// - `add` is atomic: under concurrent admission of the same `jti`, exactly
///   one call succeeds and every other fails with
///   [`StoreError::AlreadyExists`].
/// - An entry whose expiry has passed may be re-admitted; a live entry never
///   admits twice.
pub trait JtiStore: Send + Sync {
    /// Returns whether a live entry exists for the grant identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the backend fails.
    fn has(&self, jti: &str) -> Result<bool, StoreError>;

    /// Records the grant identifier as used until `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when a live entry is already
    /// present, and [`StoreError::Store`] when the backend fails.
    fn add(&self, jti: &str, expires_at: UnixSeconds) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Idempotency Guard
// ============================================================================

/// Cached first response for an idempotency key.
///
/// # Invariants
/// - `request_hash` is the canonical fingerprint of the request that produced
///   `response_json`; it, not the key, detects conflicting reuse.
/// - The record is read-only until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Fingerprint of the semantically relevant request inputs.
    pub request_hash: HashDigest,
    /// Serialized response body to replay verbatim.
    pub response_json: String,
    /// Unix time after which the record is treated as absent.
    pub expires_at: UnixSeconds,
}

/// Keyed response cache scoped by (idempotency key, org, tool).
///
/// The store holds records; the conflict policy belongs to the handshake.
pub trait IdempotencyStore: Send + Sync {
    /// Returns the live record for the key tuple, treating expired records as
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the backend fails.
    fn get(
        &self,
        key: &str,
        org_id: &OrgId,
        tool_id: &ToolId,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Stores the record for the key tuple.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when a live record is already
    /// present for the tuple, and [`StoreError::Store`] when the backend
    /// fails.
    fn set(
        &self,
        key: &str,
        org_id: &OrgId,
        tool_id: &ToolId,
        record: IdempotencyRecord,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Context handed to the tool's provisioning callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionContext {
    /// Organization the workspace belongs to.
    pub org_id: OrgId,
    /// Verified agent identity (grant subject).
    pub agent_id: AgentId,
    /// Scopes after negotiation.
    pub scopes: Vec<String>,
    /// Limits after negotiation.
    pub limits: Limits,
    /// Workspace descriptor from the claim.
    pub workspace: WorkspaceRef,
    /// Grant identifier being redeemed.
    pub grant_jti: String,
    /// Grant expiry (unix seconds).
    pub grant_exp: UnixSeconds,
}

/// Identifiers and credential produced by provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioned {
    /// Workspace identifier assigned by the tool.
    pub workspace_id: String,
    /// Agent identifier assigned by the tool.
    pub agent_id: String,
    /// Issued API key.
    pub api_key: String,
}

/// Provisioning errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The provisioning backend reported an error.
    #[error("provisioning failed: {0}")]
    Failed(String),
}

/// Tool-supplied callback creating the workspace and credential.
///
/// Treated as all-or-nothing by the handshake; a failure propagates as an
/// internal error and nothing downstream is recorded. The handshake commits
/// its idempotency record only after this returns, so the side effect is
/// at-least-once; implementations should be idempotent on (org, agent)
/// identity where possible.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provisions the workspace and credential for a verified connect.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the backend cannot provision.
    async fn provision(&self, ctx: &ProvisionContext) -> Result<Provisioned, ProvisionError>;
}
