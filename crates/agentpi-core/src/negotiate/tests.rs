// crates/agentpi-core/src/negotiate/tests.rs
// ============================================================================
// Module: Negotiation Unit Tests
// Description: Unit tests for scope validation and limit clamping.
// Purpose: Validate the subset law and field-wise clamping behavior.
// Dependencies: agentpi-core
// ============================================================================

//! ## Overview
//! Exercises scope validation (subset acceptance, rejected/allowed detail)
//! and field-wise limit clamping.

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

use super::clamp_limits;
use super::validate_scopes;
use crate::core::types::Limits;
use crate::error::ConnectError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an owned scope list from string literals.
fn scopes(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

// ============================================================================
// SECTION: Scope Validation
// ============================================================================

#[test]
fn accepts_subset_in_request_order() {
    let requested = scopes(&["deploy", "read"]);
    let allowed = scopes(&["read", "write", "deploy"]);
    let applied = validate_scopes(&requested, &allowed).unwrap();
    assert_eq!(applied, requested);
}

#[test]
fn accepts_empty_request() {
    let applied = validate_scopes(&[], &scopes(&["read"])).unwrap();
    assert!(applied.is_empty());
}

#[test]
fn rejects_scopes_outside_allowed_set() {
    let requested = scopes(&["read", "admin", "delete"]);
    let allowed = scopes(&["read", "write"]);
    let err = validate_scopes(&requested, &allowed).unwrap_err();
    match err {
        ConnectError::ScopesNotAllowed {
            rejected,
            allowed: reported,
        } => {
            assert_eq!(rejected, scopes(&["admin", "delete"]));
            assert_eq!(reported, allowed);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rejection_maps_to_forbidden_wire_error() {
    let err = validate_scopes(&scopes(&["admin"]), &scopes(&["read"])).unwrap_err();
    assert_eq!(err.code(), "scopes_not_allowed");
    assert_eq!(err.status(), 403);
    let detail = err.detail().unwrap();
    assert_eq!(detail["rejected"][0], "admin");
    assert_eq!(detail["allowed"][0], "read");
}

#[test]
fn rejects_everything_when_allowed_set_is_empty() {
    let requested = scopes(&["read"]);
    let err = validate_scopes(&requested, &[]).unwrap_err();
    match err {
        ConnectError::ScopesNotAllowed {
            rejected, ..
        } => assert_eq!(rejected, requested),
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// SECTION: Limit Clamping
// ============================================================================

#[test]
fn clamps_each_field_independently() {
    let requested = Limits {
        rpm: 600,
        daily_quota: 100,
        concurrency: 8,
    };
    let max = Limits {
        rpm: 120,
        daily_quota: 1_000,
        concurrency: 5,
    };
    let effective = clamp_limits(requested, max);
    assert_eq!(effective.rpm, 120);
    assert_eq!(effective.daily_quota, 100);
    assert_eq!(effective.concurrency, 5);
}

#[test]
fn clamp_is_identity_when_within_maximum() {
    let requested = Limits {
        rpm: 60,
        daily_quota: 500,
        concurrency: 1,
    };
    let max = Limits {
        rpm: 120,
        daily_quota: 1_000,
        concurrency: 5,
    };
    assert_eq!(clamp_limits(requested, max), requested);
}
