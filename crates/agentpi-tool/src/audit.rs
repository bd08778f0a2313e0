// crates/agentpi-tool/src/audit.rs
// ============================================================================
// Module: AgentPI Connect Audit Logging
// Description: Structured audit events for connect request handling.
// Purpose: Emit redacted audit logs without hard logging dependencies.
// Dependencies: agentpi-core, serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines the audit event payload and sinks for connect request
//! logging. It is intentionally lightweight so deployments can route events
//! to their preferred logging pipeline without redesign. Internal error text
//! appears only here, never in wire responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;

use agentpi_core::core::time::now_unix_millis;
use serde::Serialize;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Connect request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tool identifier handling the request.
    pub tool_id: String,
    /// Request outcome label (`ok` or `error`).
    pub outcome: &'static str,
    /// HTTP status returned.
    pub status: u16,
    /// Wire error code when the request failed.
    pub error_code: Option<&'static str>,
    /// Full internal error text when the request failed.
    pub error_message: Option<String>,
}

impl ConnectAuditEvent {
    /// Builds a success event for a completed connect request.
    #[must_use]
    pub fn success(tool_id: &str, status: u16) -> Self {
        Self {
            event: "agentpi_connect",
            timestamp_ms: now_unix_millis(),
            tool_id: tool_id.to_string(),
            outcome: "ok",
            status,
            error_code: None,
            error_message: None,
        }
    }

    /// Builds a failure event carrying the internal error text.
    #[must_use]
    pub fn failure(tool_id: &str, status: u16, code: &'static str, message: String) -> Self {
        Self {
            event: "agentpi_connect",
            timestamp_ms: now_unix_millis(),
            tool_id: tool_id.to_string(),
            outcome: "error",
            status,
            error_code: Some(code),
            error_message: Some(message),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Emits one audit event.
    fn emit(&self, event: &ConnectAuditEvent);
}

/// Sink writing JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn emit(&self, event: &ConnectAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = io::stderr();
            let _ = writeln!(&mut stderr, "{line}");
        }
    }
}

/// Sink discarding all events, for tests and embedders with their own logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn emit(&self, _event: &ConnectAuditEvent) {}
}
