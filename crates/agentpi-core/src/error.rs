// crates/agentpi-core/src/error.rs
// ============================================================================
// Module: AgentPI Error Taxonomy
// Description: Tagged protocol errors and the structured wire error body.
// Purpose: Give every handshake failure a stable code, status, and detail.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every connect-handshake failure is one of the tagged variants below,
//! carrying its wire code, HTTP status, and optional structured detail.
//! Errors propagate as values through the pipeline; exactly one place (the
//! transport handler) translates a variant into a wire response. Internal
//! errors never leak their message to the caller; the full text is available
//! to audit logging via [`std::fmt::Display`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Wire Body
// ============================================================================

/// Structured error envelope returned on every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error payload.
    pub error: ErrorDetail,
}

/// Inner error payload of [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail for diagnostics and conformance tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

// ============================================================================
// SECTION: Connect Errors
// ============================================================================

/// Message returned to callers in place of internal error text.
const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Failures of the connect handshake and its collaborators.
///
/// # Invariants
/// - `code`/`status` pairs are wire-stable.
/// - [`ConnectError::Internal`] renders a generic wire message; the real text
///   only reaches audit logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectError {
    /// Missing or malformed grant presentation (no usable bearer token).
    #[error("{message}")]
    Unauthorized {
        /// Description of the failed presentation.
        message: String,
    },
    /// The presented grant failed verification or was replayed.
    #[error("{message}")]
    InvalidGrant {
        /// Description of the verification failure.
        message: String,
        /// Structured reason detail (reason code, expected values, ...).
        detail: Option<Value>,
    },
    /// Requested scopes fall outside the tool's allowed set.
    #[error("requested scopes exceed tool maximum")]
    ScopesNotAllowed {
        /// Scopes that were requested but not allowed, in request order.
        rejected: Vec<String>,
        /// The tool's full allowed scope set.
        allowed: Vec<String>,
    },
    /// The configured idempotency header was absent.
    #[error("header {header} is required")]
    MissingIdempotencyKey {
        /// Name of the required header.
        header: String,
    },
    /// The idempotency key was reused with different semantic inputs.
    #[error("idempotency key reused with different inputs")]
    IdempotencyConflict,
    /// Any unclassified failure (provisioning, I/O, serialization).
    #[error("{message}")]
    Internal {
        /// Internal description; never sent to the caller.
        message: String,
    },
}

impl ConnectError {
    /// Builds an invalid-grant error without structured detail.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
            detail: None,
        }
    }

    /// Builds an invalid-grant error with structured reason detail.
    #[must_use]
    pub fn invalid_grant_with_detail(message: impl Into<String>, detail: Value) -> Self {
        Self::InvalidGrant {
            message: message.into(),
            detail: Some(detail),
        }
    }

    /// Builds an internal error from any displayable cause.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the stable wire code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized {
                ..
            } => "unauthorized",
            Self::InvalidGrant {
                ..
            } => "invalid_grant",
            Self::ScopesNotAllowed {
                ..
            } => "scopes_not_allowed",
            Self::MissingIdempotencyKey {
                ..
            } => "missing_idempotency_key",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::Internal {
                ..
            } => "internal_error",
        }
    }

    /// Returns the HTTP status associated with this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Unauthorized {
                ..
            }
            | Self::InvalidGrant {
                ..
            } => 401,
            Self::ScopesNotAllowed {
                ..
            } => 403,
            Self::MissingIdempotencyKey {
                ..
            } => 400,
            Self::IdempotencyConflict => 409,
            Self::Internal {
                ..
            } => 500,
        }
    }

    /// Returns the structured detail payload, when the variant carries one.
    #[must_use]
    pub fn detail(&self) -> Option<Value> {
        match self {
            Self::InvalidGrant {
                detail, ..
            } => detail.clone(),
            Self::ScopesNotAllowed {
                rejected,
                allowed,
            } => Some(json!({
                "rejected": rejected,
                "allowed": allowed,
            })),
            Self::Unauthorized {
                ..
            }
            | Self::MissingIdempotencyKey {
                ..
            }
            | Self::IdempotencyConflict
            | Self::Internal {
                ..
            } => None,
        }
    }

    /// Renders the wire error body, scrubbing internal error text.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal {
                ..
            } => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                detail: self.detail(),
            },
        }
    }
}
