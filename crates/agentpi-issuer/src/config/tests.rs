// crates/agentpi-issuer/src/config/tests.rs
// ============================================================================
// Module: Issuer Configuration Unit Tests
// Description: Unit tests for config loading, defaults, and validation.
// Purpose: Validate fail-closed issuer configuration resolution.
// Dependencies: agentpi-issuer, tempfile
// ============================================================================

//! ## Overview
//! Exercises TOML loading, default resolution, and the fail-closed
//! validation paths of the issuer configuration.

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

use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use super::IssuerConfig;
use super::IssuerConfigError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes a TOML config file into a fresh temp dir and returns its path.
fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agentpi-issuer.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn applies_defaults_over_an_empty_file() {
    let (_dir, path) = write_config("");
    let config = IssuerConfig::load_with_agent_key(Some(&path), Some("psk_test")).unwrap();
    assert_eq!(config.issuer, "https://agentpi.local");
    assert_eq!(config.bind, "127.0.0.1:4010");
    assert_eq!(config.tool_id, "tool_example");
    assert_eq!(config.org_id, "org_demo");
    assert_eq!(config.agent_id, "agent_demo");
    assert_eq!(config.plan_id, "free");
    assert_eq!(config.grant_ttl_seconds, 300);
    assert_eq!(config.agent_api_key, "psk_test");
}

#[test]
fn reads_values_from_the_file() {
    let (_dir, path) = write_config(
        r#"
issuer = "https://issuer.example"
bind = "127.0.0.1:5010"
tool_id = "tool_other"
agent_api_key = "psk_from_file"
grant_ttl_seconds = 120
"#,
    );
    let config = IssuerConfig::load(Some(&path)).unwrap();
    assert_eq!(config.issuer, "https://issuer.example");
    assert_eq!(config.bind, "127.0.0.1:5010");
    assert_eq!(config.tool_id, "tool_other");
    assert_eq!(config.agent_api_key, "psk_from_file");
    assert_eq!(config.grant_ttl_seconds, 120);
}

#[test]
fn an_explicit_override_beats_the_file() {
    let (_dir, path) = write_config("agent_api_key = \"psk_from_file\"\n");
    let config = IssuerConfig::load_with_agent_key(Some(&path), Some("psk_override")).unwrap();
    assert_eq!(config.agent_api_key, "psk_override");
}

#[test]
fn rejects_unknown_fields() {
    let (_dir, path) = write_config("agent_api_key = \"psk\"\nsurprise = true\n");
    let err = IssuerConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, IssuerConfigError::Malformed(_)));
}

#[test]
fn an_explicitly_named_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    let err = IssuerConfig::load_with_agent_key(Some(&path), Some("psk")).unwrap_err();
    assert!(matches!(err, IssuerConfigError::Io(_)));
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn refuses_to_start_without_an_agent_key() {
    let (_dir, path) = write_config("");
    let err = IssuerConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, IssuerConfigError::MissingAgentKey));
}

#[test]
fn rejects_an_unparseable_bind_address() {
    let (_dir, path) = write_config("agent_api_key = \"psk\"\nbind = \"not-an-addr\"\n");
    let err = IssuerConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, IssuerConfigError::InvalidBind(_)));
}

#[test]
fn rejects_an_out_of_range_grant_ttl() {
    let (_dir, path) = write_config("agent_api_key = \"psk\"\ngrant_ttl_seconds = 0\n");
    let err = IssuerConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, IssuerConfigError::InvalidGrantTtl(0)));
}
