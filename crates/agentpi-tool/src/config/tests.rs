// crates/agentpi-tool/src/config/tests.rs
// ============================================================================
// Module: Tool Configuration Unit Tests
// Description: Unit tests for option resolution, defaults, and validation.
// Purpose: Validate fail-closed resolution of tool options.
// Dependencies: agentpi-tool
// ============================================================================

//! ## Overview
//! Exercises option resolution: defaults, tool-name derivation, and the
//! fail-closed validation paths.

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

use agentpi_core::core::types::DEFAULT_CONNECT_ENDPOINT;
use agentpi_core::core::types::IDEMPOTENCY_HEADER;
use agentpi_core::core::types::Limits;

use super::ToolConfig;
use super::ToolConfigError;
use super::ToolOptions;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds minimal valid options for a test tool.
fn base_options() -> ToolOptions {
    ToolOptions {
        tool_id: Some("tool_example".to_string()),
        scopes: vec!["read".to_string(), "deploy".to_string()],
        ..ToolOptions::default()
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

#[test]
fn applies_protocol_defaults() {
    let config = ToolConfig::resolve(base_options()).unwrap();
    assert_eq!(config.tool_id.as_str(), "tool_example");
    assert_eq!(config.tool_name, "Tool Example");
    assert_eq!(config.connect_endpoint, DEFAULT_CONNECT_ENDPOINT);
    assert_eq!(config.idempotency_header, IDEMPOTENCY_HEADER);
    assert_eq!(config.plan_id.as_str(), "free");
    assert_eq!(config.max_limits.rpm, 60);
    assert_eq!(config.max_limits.daily_quota, 1_000);
    assert_eq!(config.max_limits.concurrency, 5);
}

#[test]
fn keeps_explicit_values() {
    let mut options = base_options();
    options.tool_name = Some("Example".to_string());
    options.plan_id = Some("pro".to_string());
    options.connect_endpoint = Some("/v2/connect".to_string());
    options.max_limits = Some(Limits {
        rpm: 120,
        daily_quota: 2_000,
        concurrency: 10,
    });
    options.issuer = Some("https://issuer.example".to_string());
    options.jwks_url = Some("https://issuer.example/jwks.json".to_string());
    let config = ToolConfig::resolve(options).unwrap();
    assert_eq!(config.tool_name, "Example");
    assert_eq!(config.plan_id.as_str(), "pro");
    assert_eq!(config.connect_endpoint, "/v2/connect");
    assert_eq!(config.max_limits.rpm, 120);
    assert_eq!(config.issuer, "https://issuer.example");
    assert_eq!(config.jwks_url, "https://issuer.example/jwks.json");
}

#[test]
fn derives_names_from_dashed_ids() {
    let mut options = base_options();
    options.tool_id = Some("my-ci-runner".to_string());
    let config = ToolConfig::resolve(options).unwrap();
    assert_eq!(config.tool_name, "My Ci Runner");
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn requires_a_tool_id() {
    let mut options = base_options();
    options.tool_id = None;
    // The TOOL_ID variable is not set in the test environment.
    let err = ToolConfig::resolve(options).unwrap_err();
    assert!(matches!(err, ToolConfigError::MissingToolId));
}

#[test]
fn requires_at_least_one_scope() {
    let mut options = base_options();
    options.scopes = Vec::new();
    let err = ToolConfig::resolve(options).unwrap_err();
    assert!(matches!(err, ToolConfigError::EmptyScopes));
}

#[test]
fn rejects_zero_limits() {
    let mut options = base_options();
    options.max_limits = Some(Limits {
        rpm: 0,
        daily_quota: 1,
        concurrency: 1,
    });
    let err = ToolConfig::resolve(options).unwrap_err();
    assert!(matches!(err, ToolConfigError::ZeroLimit("rpm")));
}

#[test]
fn rejects_relative_endpoints() {
    let mut options = base_options();
    options.connect_endpoint = Some("v1/connect".to_string());
    let err = ToolConfig::resolve(options).unwrap_err();
    assert!(matches!(err, ToolConfigError::InvalidEndpoint(_)));
}
