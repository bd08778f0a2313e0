// crates/agentpi-core/src/core/time.rs
// ============================================================================
// Module: AgentPI Time Model
// Description: Unix-time helpers for grant expiry and store bookkeeping.
// Purpose: Provide one place where wall-clock time is read.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Grant expiries and store records are kept as unix seconds. Wall-clock
//! reads go through this module so store implementations and tests share one
//! convention; pre-epoch clocks saturate to zero rather than failing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix timestamp in whole seconds.
pub type UnixSeconds = u64;

/// Returns the current unix time in seconds.
#[must_use]
pub fn now_unix() -> UnixSeconds {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

/// Returns the current unix time in milliseconds, for audit timestamps.
#[must_use]
pub fn now_unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis())
}
