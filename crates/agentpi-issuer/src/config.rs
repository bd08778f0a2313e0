// crates/agentpi-issuer/src/config.rs
// ============================================================================
// Module: AgentPI Issuer Configuration
// Description: Configuration loading and validation for the issuing authority.
// Purpose: Provide strict, fail-closed config parsing with env overrides.
// Dependencies: agentpi-core, serde, toml
// ============================================================================

//! ## Overview
//! Issuer configuration is loaded from an optional TOML file with strict
//! size limits, then environment overrides are applied for deployment
//! values. Missing or invalid configuration fails closed: in particular, an
//! absent agent credential refuses startup rather than running an issuer
//! that would sign grants for anyone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use agentpi_core::core::types::GRANT_TTL_SECONDS;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "AGENTPI_ISSUER_CONFIG";

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "agentpi-issuer.toml";

/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Environment variable overriding the issuer identity.
const ISSUER_ENV_VAR: &str = "AGENTPI_ISSUER";

/// Environment variable supplying the pre-shared agent credential.
const AGENT_KEY_ENV_VAR: &str = "AGENTPI_AGENT_API_KEY";

/// Environment variable overriding the key material directory.
const KEYS_DIR_ENV_VAR: &str = "AGENTPI_KEYS_DIR";

/// Environment variable overriding the tool this issuer serves.
const TOOL_ID_ENV_VAR: &str = "TOOL_ID";

/// Default issuer identity.
const DEFAULT_ISSUER: &str = "https://agentpi.local";

/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:4010";

/// Default key material directory.
const DEFAULT_KEYS_DIR: &str = ".keys";

/// Default tool identifier this demo authority issues grants for.
const DEFAULT_TOOL_ID: &str = "tool_example";

/// Default organization embedded in issued claims.
const DEFAULT_ORG_ID: &str = "org_demo";

/// Default agent subject embedded in issued grants.
const DEFAULT_AGENT_ID: &str = "agent_demo";

/// Default plan requested in issued claims.
const DEFAULT_PLAN_ID: &str = "free";

/// Maximum accepted grant TTL in seconds.
const MAX_GRANT_TTL_SECONDS: u64 = 3_600;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Issuer configuration errors.
#[derive(Debug, Error)]
pub enum IssuerConfigError {
    /// The config file could not be read.
    #[error("config file unreadable: {0}")]
    Io(String),
    /// The config file exceeds the size limit.
    #[error("config file too large: {actual} bytes (max {max})")]
    TooLarge {
        /// Actual file size in bytes.
        actual: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },
    /// The config file is not valid TOML for this schema.
    #[error("config file malformed: {0}")]
    Malformed(String),
    /// No agent credential was configured.
    #[error(
        "agent api key is required: set agent_api_key in the config file or the \
         {AGENT_KEY_ENV_VAR} variable"
    )]
    MissingAgentKey,
    /// The bind address does not parse.
    #[error("invalid bind address: {0}")]
    InvalidBind(String),
    /// The grant TTL is outside the accepted range.
    #[error("grant ttl out of range: {0} (expected 1..={MAX_GRANT_TTL_SECONDS})")]
    InvalidGrantTtl(u64),
}

// ============================================================================
// SECTION: Raw File Schema
// ============================================================================

/// On-disk TOML schema; every field optional, unknown fields rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIssuerConfig {
    /// Issuer identity (JWT `iss`).
    issuer: Option<String>,
    /// Bind address for the HTTP server.
    bind: Option<String>,
    /// Directory holding the persisted key pair.
    keys_dir: Option<PathBuf>,
    /// Pre-shared agent credential.
    agent_api_key: Option<String>,
    /// Tool this authority issues grants for.
    tool_id: Option<String>,
    /// Organization embedded in issued claims.
    org_id: Option<String>,
    /// Agent subject embedded in issued grants.
    agent_id: Option<String>,
    /// Plan requested in issued claims.
    plan_id: Option<String>,
    /// Grant lifetime in seconds.
    grant_ttl_seconds: Option<u64>,
}

// ============================================================================
// SECTION: Resolved Configuration
// ============================================================================

/// Fully resolved issuer configuration.
///
/// # Invariants
/// - `agent_api_key` is non-empty.
/// - `bind` parses as a socket address.
/// - `grant_ttl_seconds` is within `1..=3600`.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Issuer identity (JWT `iss`).
    pub issuer: String,
    /// Bind address for the HTTP server.
    pub bind: String,
    /// Directory holding the persisted key pair.
    pub keys_dir: PathBuf,
    /// Pre-shared agent credential.
    pub agent_api_key: String,
    /// Tool this authority issues grants for.
    pub tool_id: String,
    /// Organization embedded in issued claims.
    pub org_id: String,
    /// Agent subject embedded in issued grants.
    pub agent_id: String,
    /// Plan requested in issued claims.
    pub plan_id: String,
    /// Grant lifetime in seconds.
    pub grant_ttl_seconds: u64,
}

impl IssuerConfig {
    /// Loads configuration from the given path, the env-named path, or the
    /// default filename, then applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerConfigError`] when the file is unreadable or
    /// malformed, or when the resolved configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, IssuerConfigError> {
        Self::load_with_agent_key(path, None)
    }

    /// Loads configuration like [`IssuerConfig::load`], with an explicit
    /// agent credential taking precedence over file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerConfigError`] when the file is unreadable or
    /// malformed, or when the resolved configuration fails validation.
    pub fn load_with_agent_key(
        path: Option<&Path>,
        agent_key_override: Option<&str>,
    ) -> Result<Self, IssuerConfigError> {
        let raw = read_raw_config(path)?;
        let agent_api_key = agent_key_override
            .map(ToString::to_string)
            .or_else(|| env_non_empty(AGENT_KEY_ENV_VAR))
            .or(raw.agent_api_key)
            .filter(|key| !key.is_empty())
            .ok_or(IssuerConfigError::MissingAgentKey)?;
        let config = Self {
            issuer: env_non_empty(ISSUER_ENV_VAR)
                .or(raw.issuer)
                .unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            bind: raw.bind.unwrap_or_else(|| DEFAULT_BIND.to_string()),
            keys_dir: env_non_empty(KEYS_DIR_ENV_VAR)
                .map(PathBuf::from)
                .or(raw.keys_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYS_DIR)),
            agent_api_key,
            tool_id: env_non_empty(TOOL_ID_ENV_VAR)
                .or(raw.tool_id)
                .unwrap_or_else(|| DEFAULT_TOOL_ID.to_string()),
            org_id: raw.org_id.unwrap_or_else(|| DEFAULT_ORG_ID.to_string()),
            agent_id: raw.agent_id.unwrap_or_else(|| DEFAULT_AGENT_ID.to_string()),
            plan_id: raw.plan_id.unwrap_or_else(|| DEFAULT_PLAN_ID.to_string()),
            grant_ttl_seconds: raw.grant_ttl_seconds.unwrap_or(GRANT_TTL_SECONDS),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerConfigError`] on the first violated invariant.
    pub fn validate(&self) -> Result<(), IssuerConfigError> {
        if self.agent_api_key.is_empty() {
            return Err(IssuerConfigError::MissingAgentKey);
        }
        if self.bind.parse::<SocketAddr>().is_err() {
            return Err(IssuerConfigError::InvalidBind(self.bind.clone()));
        }
        if self.grant_ttl_seconds == 0 || self.grant_ttl_seconds > MAX_GRANT_TTL_SECONDS {
            return Err(IssuerConfigError::InvalidGrantTtl(self.grant_ttl_seconds));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: File Loading
// ============================================================================

/// Reads the raw TOML config from the resolved path, if one exists.
fn read_raw_config(path: Option<&Path>) -> Result<RawIssuerConfig, IssuerConfigError> {
    let resolved = path.map(Path::to_path_buf).or_else(|| {
        env_non_empty(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_NAME)))
    });
    let Some(resolved) = resolved else {
        return Ok(RawIssuerConfig::default());
    };
    // An explicitly named file must exist; the implicit default may not.
    if !resolved.exists() {
        if path.is_some() {
            return Err(IssuerConfigError::Io(format!("no such file: {}", resolved.display())));
        }
        return Ok(RawIssuerConfig::default());
    }
    let metadata =
        fs::metadata(&resolved).map_err(|err| IssuerConfigError::Io(err.to_string()))?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(IssuerConfigError::TooLarge {
            actual: metadata.len(),
            max: MAX_CONFIG_FILE_SIZE,
        });
    }
    let contents =
        fs::read_to_string(&resolved).map_err(|err| IssuerConfigError::Io(err.to_string()))?;
    toml::from_str(&contents).map_err(|err| IssuerConfigError::Malformed(err.to_string()))
}

/// Reads an environment variable, treating empty values as absent.
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
