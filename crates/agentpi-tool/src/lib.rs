// crates/agentpi-tool/src/lib.rs
// ============================================================================
// Module: AgentPI Tool Library
// Description: Tool-side integration surface for the connect-grant protocol.
// Purpose: Expose grant verification, the connect handshake, and discovery.
// Dependencies: crate::{audit, config, connect, discovery, server, verify}
// ============================================================================

//! ## Overview
//! This crate is what a tool service embeds to accept AgentPI connects: a
//! [`verify::GrantVerifier`] validating issuer-signed grants against a cached
//! JWKS, the [`connect::ConnectHandshake`] pipeline enforcing idempotency and
//! single-use grants, a stateless discovery publisher, and an axum router
//! wiring both endpoints with a single error-translation boundary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod config;
pub mod connect;
pub mod discovery;
pub mod server;
pub mod verify;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::ConnectAuditEvent;
pub use audit::NullAuditSink;
pub use audit::StderrAuditSink;
pub use config::ToolConfig;
pub use config::ToolConfigError;
pub use config::ToolOptions;
pub use connect::ConnectHandshake;
pub use connect::ConnectResponse;
pub use discovery::discovery_document;
pub use server::ToolServerError;
pub use server::router;
pub use server::serve;
pub use verify::FetchError;
pub use verify::GrantVerifier;
pub use verify::HttpJwksFetcher;
pub use verify::JwksClock;
pub use verify::JwksFetcher;
pub use verify::SystemClock;
pub use verify::VerifiedGrant;
