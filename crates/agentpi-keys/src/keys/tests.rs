// crates/agentpi-keys/src/keys/tests.rs
// ============================================================================
// Module: Key Manager Unit Tests
// Description: Unit tests for key persistence, kid stability, and signing.
// Purpose: Validate load-or-generate behavior against temporary key dirs.
// Dependencies: agentpi-keys, jsonwebtoken, tempfile
// ============================================================================

//! ## Overview
//! Exercises key generation, reload, partial-state refusal, and EdDSA token
//! signing against a JWKS-derived decoding key.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::fs;

use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use serde_json::Value;
use serde_json::json;
use tempfile::tempdir;

use super::KeyError;
use super::KeyManager;
use super::PRIVATE_KEY_FILE;
use super::PUBLIC_KEY_FILE;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a decoding key from the manager's published JWKS record.
fn decoding_key(manager: &KeyManager) -> DecodingKey {
    let jwks = manager.public_jwks();
    let raw = serde_json::to_value(&jwks.keys[0]).unwrap();
    let jwk: jsonwebtoken::jwk::Jwk = serde_json::from_value(raw).unwrap();
    DecodingKey::from_jwk(&jwk).unwrap()
}

/// Builds a validation accepting any issuer and audience.
fn open_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.required_spec_claims = HashSet::new();
    validation.validate_aud = false;
    validation.leeway = 0;
    validation
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

#[test]
fn generates_and_reloads_the_same_kid() {
    let dir = tempdir().unwrap();
    let generated = KeyManager::load_or_generate(dir.path()).unwrap();
    let written_kid = generated.kid().to_string();
    assert!(dir.path().join(PRIVATE_KEY_FILE).exists());
    assert!(dir.path().join(PUBLIC_KEY_FILE).exists());

    let loaded = KeyManager::load_or_generate(dir.path()).unwrap();
    assert_eq!(loaded.kid(), written_kid);
    assert_eq!(loaded.public_jwks(), generated.public_jwks());
}

#[test]
fn refuses_partial_key_material() {
    let dir = tempdir().unwrap();
    KeyManager::load_or_generate(dir.path()).unwrap();
    fs::remove_file(dir.path().join(PUBLIC_KEY_FILE)).unwrap();

    let err = KeyManager::load_or_generate(dir.path()).unwrap_err();
    match err {
        KeyError::PartialKeyMaterial {
            present,
            missing,
        } => {
            assert_eq!(present, PRIVATE_KEY_FILE);
            assert_eq!(missing, PUBLIC_KEY_FILE);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn publishes_a_signing_jwk() {
    let dir = tempdir().unwrap();
    let manager = KeyManager::load_or_generate(dir.path()).unwrap();
    let jwks = manager.public_jwks();
    assert_eq!(jwks.keys.len(), 1);
    let key = &jwks.keys[0];
    assert_eq!(key.kty, "OKP");
    assert_eq!(key.crv, "Ed25519");
    assert_eq!(key.key_use, "sig");
    assert_eq!(key.alg, "EdDSA");
    assert_eq!(key.kid, manager.kid());
}

// ============================================================================
// SECTION: Signing
// ============================================================================

#[test]
fn signs_verifiable_tokens_with_kid_and_expiry() {
    let dir = tempdir().unwrap();
    let manager = KeyManager::load_or_generate(dir.path()).unwrap();
    let token = manager.sign(&json!({"iss": "https://agentpi.local", "sub": "agent_demo"}), 300)
        .unwrap();

    let header = jsonwebtoken::decode_header(&token).unwrap();
    assert_eq!(header.alg, Algorithm::EdDSA);
    assert_eq!(header.kid.as_deref(), Some(manager.kid()));

    let decoded =
        jsonwebtoken::decode::<Value>(&token, &decoding_key(&manager), &open_validation()).unwrap();
    let iat = decoded.claims["iat"].as_u64().unwrap();
    let exp = decoded.claims["exp"].as_u64().unwrap();
    assert_eq!(exp - iat, 300);
    assert_eq!(decoded.claims["sub"], "agent_demo");
}

#[test]
fn rejects_non_object_claims() {
    let dir = tempdir().unwrap();
    let manager = KeyManager::load_or_generate(dir.path()).unwrap();
    let err = manager.sign(&json!(["not", "an", "object"]), 300).unwrap_err();
    assert!(matches!(err, KeyError::Signing(_)));
}
