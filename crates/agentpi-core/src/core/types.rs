// crates/agentpi-core/src/core/types.rs
// ============================================================================
// Module: AgentPI Wire Types
// Description: Grant, discovery, and connect-result payloads plus protocol constants.
// Purpose: Provide the stable wire surface both protocol sides agree on.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Wire types for the connect-grant protocol: the grant request an agent
//! sends to the issuing authority, the claim embedded in a signed grant, the
//! discovery document a tool publishes, and the connect result a tool returns.
//! Field names are wire-stable; `limits` keeps the `dailyQuota` spelling on
//! the wire while the Rust field follows naming conventions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::ToolId;

// ============================================================================
// SECTION: Protocol Constants
// ============================================================================

/// Protocol version advertised in discovery documents.
pub const AGENTPI_VERSION: &str = "0.1";

/// Fixed lifetime of a connect grant in seconds.
pub const GRANT_TTL_SECONDS: u64 = 300;

/// Header carrying the caller-supplied idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Lifetime of a cached idempotency record in seconds.
pub const IDEMPOTENCY_TTL_SECONDS: u64 = 86_400;

/// Header carrying the pre-shared agent credential on grant requests.
pub const AGENT_KEY_HEADER: &str = "x-agentpi-agent-key";

/// Well-known path serving a tool's discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/agentpi.json";

/// Default tool endpoint accepting connect requests.
pub const DEFAULT_CONNECT_ENDPOINT: &str = "/v1/agentpi/connect";

/// Well-known path serving the issuer's public signing keys.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// The only agent mode this protocol issues grants for.
pub const AGENT_MODE_AUTONOMOUS: &str = "autonomous";

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Rate and quota limits requested by an agent or enforced by a tool.
///
/// # Invariants
/// - All fields are positive once validated at the issuer boundary.
/// - `daily_quota` serializes as `dailyQuota` for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Requests per minute.
    pub rpm: u32,
    /// Requests per day.
    #[serde(rename = "dailyQuota")]
    pub daily_quota: u32,
    /// Maximum concurrent in-flight requests.
    pub concurrency: u32,
}

// ============================================================================
// SECTION: Workspace Reference
// ============================================================================

/// Workspace descriptor supplied by the agent when requesting a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    /// Human-readable workspace name.
    pub name: String,
    /// Optional external identifier in the agent's own system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

// ============================================================================
// SECTION: Grant Request / Response
// ============================================================================

/// Body of a connect-grant request sent to the issuing authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectGrantRequest {
    /// Tool the grant should be scoped to.
    pub tool_id: ToolId,
    /// Scopes the agent is asking for.
    pub requested_scopes: Vec<String>,
    /// Limits the agent is asking for.
    pub requested_limits: Limits,
    /// Workspace the agent wants provisioned.
    pub workspace: WorkspaceRef,
    /// Caller-supplied nonce binding the request to the grant.
    pub nonce: String,
}

/// Response returned by the issuing authority on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectGrantResponse {
    /// Signed connect grant (compact JWT).
    pub connect_grant: String,
    /// Grant lifetime in seconds.
    pub expires_in: u64,
}

// ============================================================================
// SECTION: Claim
// ============================================================================

/// Protocol payload embedded in a signed grant under the `agentpi` claim.
///
/// # Invariants
/// - Immutable once signed; the tool treats every field as caller intent.
/// - `mode` is always [`AGENT_MODE_AUTONOMOUS`] for grants this issuer mints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Organization the agent belongs to.
    pub org_id: OrgId,
    /// Tool the grant is scoped to.
    pub tool_id: ToolId,
    /// Agent operating mode.
    pub mode: String,
    /// Plan the agent requested.
    pub requested_plan_id: PlanId,
    /// Scopes the agent requested.
    pub scopes: Vec<String>,
    /// Limits the agent requested.
    pub limits: Limits,
    /// Workspace descriptor.
    pub workspace: WorkspaceRef,
    /// Caller-supplied nonce.
    pub nonce: String,
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// One plan a tool offers, with its ceiling limits and allowed scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    /// Plan identifier.
    pub plan_id: PlanId,
    /// Maximum limits the plan permits.
    pub max_limits: Limits,
    /// Scopes the plan permits.
    pub scopes_allowed: Vec<String>,
}

/// Idempotency contract advertised in the discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyContract {
    /// Header the tool reads the idempotency key from.
    pub header: String,
    /// Seconds a cached response remains replayable.
    pub ttl_seconds: u64,
}

/// Static capability document agents read before requesting a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Protocol version the tool speaks.
    pub agentpi_version: String,
    /// Tool identifier.
    pub tool_id: ToolId,
    /// Human-readable tool name.
    pub tool_name: String,
    /// Path accepting connect requests.
    pub connect_endpoint: String,
    /// Plan catalogue.
    pub plans: Vec<PlanInfo>,
    /// Plan applied when the agent does not request one.
    pub default_plan_id: PlanId,
    /// Limits applied when the agent does not request any.
    pub default_limits: Limits,
    /// Idempotency contract for connect requests.
    pub idempotency: IdempotencyContract,
}

// ============================================================================
// SECTION: Connect Result
// ============================================================================

/// Lifecycle state of a provisioned connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStatus {
    /// Workspace and credential are ready for use.
    Active,
    /// Provisioning was accepted but is not yet complete.
    Pending,
}

/// Kind of credential a tool issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Bearer API key.
    ApiKey,
}

/// Typed credential returned from a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Credential kind.
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    /// The issued API key.
    pub api_key: String,
}

/// Final payload of a successful connect handshake.
///
/// # Invariants
/// - `applied_scopes`/`applied_limits` reflect post-negotiation values, never
///   the raw request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    /// Connection lifecycle state.
    pub status: ConnectStatus,
    /// Workspace identifier assigned by the tool.
    pub tool_workspace_id: String,
    /// Agent identifier assigned by the tool.
    pub tool_agent_id: String,
    /// Issued credential.
    pub credentials: Credentials,
    /// Plan actually applied.
    pub applied_plan_id: PlanId,
    /// Scopes actually applied.
    pub applied_scopes: Vec<String>,
    /// Limits actually applied.
    pub applied_limits: Limits,
}
