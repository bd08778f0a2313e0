// crates/agentpi-issuer/src/lib.rs
// ============================================================================
// Module: AgentPI Issuer Library
// Description: The issuing-authority service for connect grants.
// Purpose: Expose issuer configuration, grant issuance, and the HTTP surface.
// Dependencies: crate::{config, grants, server}
// ============================================================================

//! ## Overview
//! The issuing authority validates connect-grant requests from pre-shared-key
//! authenticated agents, builds the protocol claim, and signs it into a
//! short-lived EdDSA grant using the key manager. It publishes its public
//! signing keys at the well-known JWKS path for tools to verify against.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod grants;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::IssuerConfig;
pub use config::IssuerConfigError;
pub use grants::FieldViolation;
pub use grants::GrantIssuer;
pub use grants::IssueError;
pub use server::IssuerServerError;
pub use server::router;
pub use server::serve;
