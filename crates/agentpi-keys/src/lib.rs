// crates/agentpi-keys/src/lib.rs
// ============================================================================
// Module: AgentPI Keys Library
// Description: Signing key lifecycle and JWKS publication for the issuer.
// Purpose: Expose the key manager and its JWK representations.
// Dependencies: crate::keys
// ============================================================================

//! ## Overview
//! This crate owns the issuing authority's Ed25519 signing key pair: loading
//! or generating it with crash-safe persistence, publishing the public JWKS,
//! and signing grant claims into compact EdDSA JWTs. Partial key material on
//! disk is a fatal startup condition; the manager refuses to regenerate a
//! key that JWKS consumers may still depend on.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod keys;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use keys::Jwks;
pub use keys::KeyError;
pub use keys::KeyManager;
pub use keys::PRIVATE_KEY_FILE;
pub use keys::PUBLIC_KEY_FILE;
pub use keys::PublicJwk;
