// crates/agentpi-tool/src/config.rs
// ============================================================================
// Module: AgentPI Tool Configuration
// Description: Tool identity, plan policy, and issuer location resolution.
// Purpose: Resolve embedding-tool options into a validated runtime config.
// Dependencies: agentpi-core, thiserror
// ============================================================================

//! ## Overview
//! Tools configure the integration in code through [`ToolOptions`];
//! [`ToolConfig::resolve`] fills defaults, applies environment overrides for
//! deployment-specific values, and validates fail-closed. Missing or invalid
//! required fields abort resolution rather than falling back to permissive
//! behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;

use agentpi_core::core::identifiers::PlanId;
use agentpi_core::core::identifiers::ToolId;
use agentpi_core::core::types::DEFAULT_CONNECT_ENDPOINT;
use agentpi_core::core::types::IDEMPOTENCY_HEADER;
use agentpi_core::core::types::IDEMPOTENCY_TTL_SECONDS;
use agentpi_core::core::types::Limits;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable supplying the tool identifier.
pub(crate) const TOOL_ID_ENV_VAR: &str = "TOOL_ID";

/// Environment variable overriding the expected issuer.
pub(crate) const ISSUER_ENV_VAR: &str = "AGENTPI_ISSUER";

/// Environment variable overriding the issuer JWKS URL.
pub(crate) const JWKS_URL_ENV_VAR: &str = "AGENTPI_JWKS_URL";

/// Issuer identity assumed when neither options nor environment supply one.
const DEFAULT_ISSUER: &str = "https://agentpi.local";

/// JWKS location assumed when neither options nor environment supply one.
const DEFAULT_JWKS_URL: &str = "http://localhost:4010/.well-known/jwks.json";

/// Plan applied when the embedding tool does not name one.
const DEFAULT_PLAN_ID: &str = "free";

/// Limit ceiling applied when the embedding tool does not configure one.
const DEFAULT_MAX_LIMITS: Limits = Limits {
    rpm: 60,
    daily_quota: 1_000,
    concurrency: 5,
};

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool configuration resolution errors.
#[derive(Debug, Error)]
pub enum ToolConfigError {
    /// No tool identifier was provided by options or environment.
    #[error("tool id is required: set ToolOptions::tool_id or the {TOOL_ID_ENV_VAR} variable")]
    MissingToolId,
    /// The allowed scope set is empty.
    #[error("at least one allowed scope is required")]
    EmptyScopes,
    /// A limit ceiling is zero.
    #[error("max limits must be positive: {0} is zero")]
    ZeroLimit(&'static str),
    /// An endpoint path does not start with a slash.
    #[error("endpoint path must start with '/': {0}")]
    InvalidEndpoint(String),
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Embedding-tool supplied options, resolved into a [`ToolConfig`].
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    /// Tool identifier; falls back to the `TOOL_ID` environment variable.
    pub tool_id: Option<String>,
    /// Human-readable tool name; derived from the id when absent.
    pub tool_name: Option<String>,
    /// Scopes the tool allows agents to hold.
    pub scopes: Vec<String>,
    /// Limit ceiling; defaults apply when absent.
    pub max_limits: Option<Limits>,
    /// Plan identifier advertised in discovery.
    pub plan_id: Option<String>,
    /// Expected grant issuer; environment and defaults apply when absent.
    pub issuer: Option<String>,
    /// Issuer JWKS URL; environment and defaults apply when absent.
    pub jwks_url: Option<String>,
    /// Connect endpoint path; protocol default applies when absent.
    pub connect_endpoint: Option<String>,
}

// ============================================================================
// SECTION: Resolved Configuration
// ============================================================================

/// Fully resolved tool-side configuration.
///
/// # Invariants
/// - `max_scopes` is non-empty and `max_limits` fields are positive.
/// - `connect_endpoint` starts with `/`.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Tool identifier (grant audience).
    pub tool_id: ToolId,
    /// Human-readable tool name.
    pub tool_name: String,
    /// Endpoint path accepting connect requests.
    pub connect_endpoint: String,
    /// Expected grant issuer.
    pub issuer: String,
    /// Issuer JWKS URL.
    pub jwks_url: String,
    /// Header carrying the idempotency key.
    pub idempotency_header: String,
    /// Lifetime of cached idempotency records in seconds.
    pub idempotency_ttl_seconds: u64,
    /// Plan advertised and applied.
    pub plan_id: PlanId,
    /// Scopes the tool allows.
    pub max_scopes: Vec<String>,
    /// Limit ceiling the tool enforces.
    pub max_limits: Limits,
}

impl ToolConfig {
    /// Resolves options into a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolConfigError`] when required fields are missing or
    /// invalid after defaults and environment overrides are applied.
    pub fn resolve(options: ToolOptions) -> Result<Self, ToolConfigError> {
        let tool_id = options
            .tool_id
            .or_else(|| env_non_empty(TOOL_ID_ENV_VAR))
            .ok_or(ToolConfigError::MissingToolId)?;
        if options.scopes.is_empty() {
            return Err(ToolConfigError::EmptyScopes);
        }
        let max_limits = options.max_limits.unwrap_or(DEFAULT_MAX_LIMITS);
        validate_limits(max_limits)?;
        let connect_endpoint = options
            .connect_endpoint
            .unwrap_or_else(|| DEFAULT_CONNECT_ENDPOINT.to_string());
        if !connect_endpoint.starts_with('/') {
            return Err(ToolConfigError::InvalidEndpoint(connect_endpoint));
        }
        let tool_name = options.tool_name.unwrap_or_else(|| derive_tool_name(&tool_id));
        let issuer = options
            .issuer
            .or_else(|| env_non_empty(ISSUER_ENV_VAR))
            .unwrap_or_else(|| DEFAULT_ISSUER.to_string());
        let jwks_url = options
            .jwks_url
            .or_else(|| env_non_empty(JWKS_URL_ENV_VAR))
            .unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());
        Ok(Self {
            tool_id: ToolId::new(tool_id),
            tool_name,
            connect_endpoint,
            issuer,
            jwks_url,
            idempotency_header: IDEMPOTENCY_HEADER.to_string(),
            idempotency_ttl_seconds: IDEMPOTENCY_TTL_SECONDS,
            plan_id: PlanId::new(options.plan_id.unwrap_or_else(|| DEFAULT_PLAN_ID.to_string())),
            max_scopes: options.scopes,
            max_limits,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable, treating empty values as absent.
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Validates that every limit ceiling is positive.
const fn validate_limits(limits: Limits) -> Result<(), ToolConfigError> {
    if limits.rpm == 0 {
        return Err(ToolConfigError::ZeroLimit("rpm"));
    }
    if limits.daily_quota == 0 {
        return Err(ToolConfigError::ZeroLimit("dailyQuota"));
    }
    if limits.concurrency == 0 {
        return Err(ToolConfigError::ZeroLimit("concurrency"));
    }
    Ok(())
}

/// Derives a display name from a tool identifier.
///
/// Underscores and dashes become spaces and each word is capitalized, so
/// `tool_example` becomes `Tool Example`.
fn derive_tool_name(tool_id: &str) -> String {
    let mut name = String::with_capacity(tool_id.len());
    let mut at_word_start = true;
    for ch in tool_id.chars() {
        if ch == '_' || ch == '-' {
            name.push(' ');
            at_word_start = true;
        } else if at_word_start {
            name.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            name.push(ch);
        }
    }
    name
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
