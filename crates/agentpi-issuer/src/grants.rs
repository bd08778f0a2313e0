// crates/agentpi-issuer/src/grants.rs
// ============================================================================
// Module: AgentPI Grant Issuance
// Description: Validation and signing of connect-grant requests.
// Purpose: Mint short-lived, single-tool grants for authenticated agents.
// Dependencies: agentpi-core, agentpi-keys, rand, subtle
// ============================================================================

//! ## Overview
//! [`GrantIssuer`] checks the pre-shared agent credential in constant time,
//! refuses requests for tools it does not serve, validates every request
//! field, and asks the key manager to sign the assembled claim with the
//! fixed protocol TTL. Each grant carries a fresh random `jti`; single-use
//! enforcement lives on the tool side.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use agentpi_core::core::identifiers::AgentId;
use agentpi_core::core::identifiers::OrgId;
use agentpi_core::core::identifiers::PlanId;
use agentpi_core::core::identifiers::ToolId;
use agentpi_core::core::types::AGENT_MODE_AUTONOMOUS;
use agentpi_core::core::types::Claim;
use agentpi_core::core::types::ConnectGrantRequest;
use agentpi_core::core::types::ConnectGrantResponse;
use agentpi_core::error::ErrorBody;
use agentpi_core::error::ErrorDetail;
use agentpi_keys::KeyManager;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::IssuerConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// One rejected field of a grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What was wrong with it.
    pub message: &'static str,
}

/// Grant issuance failures.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The pre-shared agent credential was absent or wrong.
    #[error("Invalid agent API key")]
    Unauthorized,
    /// The request names a tool this authority does not issue for.
    #[error("Unknown tool_id: {0}")]
    UnknownTool(String),
    /// One or more request fields are missing or malformed.
    #[error("Invalid connect grant request")]
    InvalidRequest {
        /// Every violated field, in request-schema order.
        violations: Vec<FieldViolation>,
    },
    /// Signing failed; never exposed verbatim to the caller.
    #[error("grant signing failed: {0}")]
    Signing(String),
}

impl IssueError {
    /// Returns the stable wire code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidRequest {
                ..
            } => "invalid_request",
            Self::Signing(_) => "internal_error",
        }
    }

    /// Returns the HTTP status associated with this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::UnknownTool(_) => 403,
            Self::InvalidRequest {
                ..
            } => 400,
            Self::Signing(_) => 500,
        }
    }

    /// Renders the wire error body, scrubbing internal error text.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let (message, detail) = match self {
            Self::Signing(_) => ("An unexpected error occurred".to_string(), None),
            Self::InvalidRequest {
                violations,
            } => (self.to_string(), Some(json!({"violations": violations}))),
            other => (other.to_string(), None),
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                detail,
            },
        }
    }
}

// ============================================================================
// SECTION: Grant Claims
// ============================================================================

/// JWT payload of a connect grant before `iat`/`exp` are stamped.
#[derive(Debug, Serialize)]
struct GrantClaims {
    /// Issuer identity.
    iss: String,
    /// Audience (tool identifier).
    aud: ToolId,
    /// Subject (agent identifier).
    sub: AgentId,
    /// Unique grant identifier.
    jti: String,
    /// Protocol claim payload.
    agentpi: Claim,
}

// ============================================================================
// SECTION: Grant Issuer
// ============================================================================

/// Validator and signer of connect-grant requests.
pub struct GrantIssuer {
    /// Resolved issuer configuration.
    config: IssuerConfig,
    /// Key manager signing the grants.
    keys: Arc<KeyManager>,
}

impl GrantIssuer {
    /// Builds an issuer over the configuration and key manager.
    #[must_use]
    pub fn new(config: IssuerConfig, keys: Arc<KeyManager>) -> Self {
        Self {
            config,
            keys,
        }
    }

    /// Returns the resolved issuer configuration.
    #[must_use]
    pub const fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Validates a grant request and signs it into a connect grant.
    ///
    /// `agent_key` is the raw pre-shared credential header value.
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Unauthorized`] on a bad credential,
    /// [`IssueError::UnknownTool`] for a foreign tool id,
    /// [`IssueError::InvalidRequest`] listing every violated field, and
    /// [`IssueError::Signing`] when the key manager fails.
    pub fn issue(
        &self,
        agent_key: Option<&str>,
        request: &ConnectGrantRequest,
    ) -> Result<ConnectGrantResponse, IssueError> {
        self.validate_agent_key(agent_key)?;
        if request.tool_id.as_str() != self.config.tool_id {
            return Err(IssueError::UnknownTool(request.tool_id.to_string()));
        }
        validate_request(request)?;

        let jti = fresh_jti();
        let claims = GrantClaims {
            iss: self.config.issuer.clone(),
            aud: request.tool_id.clone(),
            sub: AgentId::new(self.config.agent_id.clone()),
            jti,
            agentpi: Claim {
                org_id: OrgId::new(self.config.org_id.clone()),
                tool_id: request.tool_id.clone(),
                mode: AGENT_MODE_AUTONOMOUS.to_string(),
                requested_plan_id: PlanId::new(self.config.plan_id.clone()),
                scopes: request.requested_scopes.clone(),
                limits: request.requested_limits,
                workspace: request.workspace.clone(),
                nonce: request.nonce.clone(),
            },
        };
        let token = self
            .keys
            .sign(&claims, self.config.grant_ttl_seconds)
            .map_err(|err| IssueError::Signing(err.to_string()))?;
        Ok(ConnectGrantResponse {
            connect_grant: token,
            expires_in: self.config.grant_ttl_seconds,
        })
    }

    /// Compares the presented credential against configuration in constant
    /// time.
    fn validate_agent_key(&self, agent_key: Option<&str>) -> Result<(), IssueError> {
        let Some(presented) = agent_key else {
            return Err(IssueError::Unauthorized);
        };
        let expected = self.config.agent_api_key.as_bytes();
        let presented = presented.as_bytes();
        if presented.len() != expected.len() || presented.ct_eq(expected).unwrap_u8() != 1 {
            return Err(IssueError::Unauthorized);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Request Validation
// ============================================================================

/// Validates every request field, collecting all violations.
fn validate_request(request: &ConnectGrantRequest) -> Result<(), IssueError> {
    let mut violations = Vec::new();
    if request.requested_scopes.is_empty() {
        violations.push(FieldViolation {
            field: "requested_scopes",
            message: "must be a non-empty array",
        });
    } else if request.requested_scopes.iter().any(String::is_empty) {
        violations.push(FieldViolation {
            field: "requested_scopes",
            message: "must not contain empty scopes",
        });
    }
    if request.requested_limits.rpm == 0 {
        violations.push(FieldViolation {
            field: "requested_limits.rpm",
            message: "must be a positive integer",
        });
    }
    if request.requested_limits.daily_quota == 0 {
        violations.push(FieldViolation {
            field: "requested_limits.dailyQuota",
            message: "must be a positive integer",
        });
    }
    if request.requested_limits.concurrency == 0 {
        violations.push(FieldViolation {
            field: "requested_limits.concurrency",
            message: "must be a positive integer",
        });
    }
    if request.workspace.name.is_empty() {
        violations.push(FieldViolation {
            field: "workspace.name",
            message: "must be a non-empty string",
        });
    }
    if request.nonce.is_empty() {
        violations.push(FieldViolation {
            field: "nonce",
            message: "must be a non-empty string",
        });
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(IssueError::InvalidRequest {
            violations,
        })
    }
}

/// Mints a fresh random grant identifier (32 hex characters).
fn fresh_jti() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let mut jti = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        jti.push(HEX[(byte >> 4) as usize] as char);
        jti.push(HEX[(byte & 0x0f) as usize] as char);
    }
    jti
}

// ============================================================================
// SECTION: Tests
// ============================================================================
