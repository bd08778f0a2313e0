// crates/agentpi-core/src/core/mod.rs
// ============================================================================
// Module: AgentPI Core Types
// Description: Canonical AgentPI protocol types and constants.
// Purpose: Provide stable, serializable types for grants, discovery, and results.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the AgentPI wire surface: grant requests and claims,
//! discovery documents, connect results, and the protocol constants both
//! sides must agree on. These types are the canonical source of truth for
//! any derived API surfaces (HTTP handlers, CLIs, or SDKs).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod hashing;
pub mod identifiers;
pub mod time;
pub mod types;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use identifiers::AgentId;
pub use identifiers::OrgId;
pub use identifiers::PlanId;
pub use identifiers::ToolId;
pub use time::UnixSeconds;
pub use time::now_unix;
pub use time::now_unix_millis;
pub use types::AGENTPI_VERSION;
pub use types::AGENT_KEY_HEADER;
pub use types::AGENT_MODE_AUTONOMOUS;
pub use types::Claim;
pub use types::ConnectGrantRequest;
pub use types::ConnectGrantResponse;
pub use types::ConnectResult;
pub use types::ConnectStatus;
pub use types::CredentialType;
pub use types::Credentials;
pub use types::DEFAULT_CONNECT_ENDPOINT;
pub use types::DISCOVERY_PATH;
pub use types::DiscoveryDocument;
pub use types::GRANT_TTL_SECONDS;
pub use types::IDEMPOTENCY_HEADER;
pub use types::IDEMPOTENCY_TTL_SECONDS;
pub use types::IdempotencyContract;
pub use types::JWKS_PATH;
pub use types::Limits;
pub use types::PlanInfo;
pub use types::WorkspaceRef;
