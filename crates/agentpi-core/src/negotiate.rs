// crates/agentpi-core/src/negotiate.rs
// ============================================================================
// Module: AgentPI Scope/Limit Negotiation
// Description: Pure clamping of requested scopes and limits against tool policy.
// Purpose: Reduce agent requests to what the tool's plan actually permits.
// Dependencies: crate::{core, error}
// ============================================================================

//! ## Overview
//! Negotiation is pure computation: scope validation is a subset check that
//! fails closed with the full rejected/allowed sets, and limit clamping is a
//! field-wise minimum. A request may be partially clamped and still succeed;
//! scopes are all-or-nothing because a partially honored scope set would
//! change the meaning of the issued credential.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::types::Limits;
use crate::error::ConnectError;

// ============================================================================
// SECTION: Scope Validation
// ============================================================================

/// Validates that every requested scope is in the allowed set.
///
/// An empty request is valid and yields an empty result.
///
/// # Errors
///
/// Returns [`ConnectError::ScopesNotAllowed`] carrying the rejected scopes
/// (in request order) and the full allowed set when any requested scope is
/// outside the allowed set.
pub fn validate_scopes(
    requested: &[String],
    allowed: &[String],
) -> Result<Vec<String>, ConnectError> {
    let allowed_set: BTreeSet<&str> = allowed.iter().map(String::as_str).collect();
    let rejected: Vec<String> = requested
        .iter()
        .filter(|scope| !allowed_set.contains(scope.as_str()))
        .cloned()
        .collect();
    if rejected.is_empty() {
        Ok(requested.to_vec())
    } else {
        Err(ConnectError::ScopesNotAllowed {
            rejected,
            allowed: allowed.to_vec(),
        })
    }
}

// ============================================================================
// SECTION: Limit Clamping
// ============================================================================

/// Clamps requested limits to the tool maximum, field by field.
///
/// Each field is reduced independently; a request above the maximum in one
/// dimension still keeps its other dimensions.
#[must_use]
pub const fn clamp_limits(requested: Limits, max: Limits) -> Limits {
    Limits {
        rpm: min_u32(requested.rpm, max.rpm),
        daily_quota: min_u32(requested.daily_quota, max.daily_quota),
        concurrency: min_u32(requested.concurrency, max.concurrency),
    }
}

/// Const-friendly minimum of two `u32` values.
const fn min_u32(a: u32, b: u32) -> u32 {
    if a < b { a } else { b }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
