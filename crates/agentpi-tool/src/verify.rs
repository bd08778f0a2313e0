// crates/agentpi-tool/src/verify.rs
// ============================================================================
// Module: AgentPI Grant Verifier
// Description: End-to-end validation of connect grants against issuer JWKS.
// Purpose: Verify signature, issuer, audience, expiry, and required claims.
// Dependencies: agentpi-core, async-trait, jsonwebtoken, reqwest
// ============================================================================

//! ## Overview
//! [`GrantVerifier`] validates an inbound connect grant: it resolves the
//! issuer's JWKS through a URL-keyed cache with a fixed freshness window,
//! checks the EdDSA signature against the token's `kid`, enforces issuer,
//! audience, and expiry, and requires the protocol claims (`jti`, `sub`,
//! `agentpi`). Every distinct failure maps to a stable reason code carried
//! in the error detail. Verification never mutates persistent state; the
//! JWKS cache is the only shared resource and a racing double refresh is
//! harmless because both converge on the same fetched set.
//!
//! Fetch failures surface as `invalid_grant` like every other verification
//! failure, so callers cannot distinguish issuer outage from forged tokens
//! at the protocol level; the reason code preserves the distinction for
//! diagnostics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use agentpi_core::core::identifiers::AgentId;
use agentpi_core::core::identifiers::ToolId;
use agentpi_core::core::time::UnixSeconds;
use agentpi_core::core::types::Claim;
use agentpi_core::error::ConnectError;
use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Freshness window of a cached JWKS document.
pub(crate) const JWKS_CACHE_TTL: Duration = Duration::from_secs(60);

/// Timeout applied to JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Fetcher Interface
// ============================================================================

/// JWKS fetch failures, split by transport versus response class.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The JWKS endpoint could not be reached at all.
    #[error("jwks unreachable: {0}")]
    Unreachable(String),
    /// The JWKS endpoint answered with a non-success status.
    #[error("jwks fetch failed with status {0}")]
    Status(u16),
    /// The JWKS payload could not be parsed.
    #[error("jwks payload malformed: {0}")]
    Malformed(String),
}

/// Source of JWKS documents, injectable for tests.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetches and parses the JWKS document at the URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the document cannot be retrieved or
    /// parsed.
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError>;
}

/// HTTP JWKS fetcher backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    /// HTTP client used for fetch requests.
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Builds a fetcher with a bounded-timeout client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unreachable`] when the HTTP client cannot be
    /// constructed.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;
        Ok(Self {
            client,
        })
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.json::<JwkSet>().await.map_err(|err| FetchError::Malformed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Clock Interface
// ============================================================================

/// Monotonic clock for cache freshness, injectable for tests.
pub trait JwksClock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`JwksClock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwksClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ============================================================================
// SECTION: Verified Grant
// ============================================================================

/// Result of a successful grant verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedGrant {
    /// Grant subject (agent identity).
    pub sub: AgentId,
    /// Unique grant identifier.
    pub jti: String,
    /// Grant expiry (unix seconds).
    pub exp: UnixSeconds,
    /// Protocol claim payload.
    pub claim: Claim,
}

/// Raw JWT payload decoded before required-claim checks.
#[derive(Debug, Deserialize)]
struct RawGrantClaims {
    /// Grant subject, absent when the issuer omitted it.
    sub: Option<String>,
    /// Grant identifier, absent when the issuer omitted it.
    jti: Option<String>,
    /// Grant expiry; presence is enforced by JWT validation.
    exp: UnixSeconds,
    /// Protocol claim payload, absent when the issuer omitted it.
    agentpi: Option<Claim>,
}

// ============================================================================
// SECTION: Grant Verifier
// ============================================================================

/// Cached JWKS entry.
struct CachedJwks {
    /// Parsed key set.
    set: JwkSet,
    /// Instant the set was fetched.
    fetched_at: Instant,
}

/// Verifier with a process-wide, URL-keyed JWKS cache.
///
/// # Invariants
/// - The cache never serves an entry older than [`JWKS_CACHE_TTL`].
/// - Verification performs no writes beyond the cache refresh.
pub struct GrantVerifier {
    /// JWKS document source.
    fetcher: Box<dyn JwksFetcher>,
    /// Clock used for cache freshness decisions.
    clock: Box<dyn JwksClock>,
    /// Fetched key sets keyed by JWKS URL.
    cache: Mutex<BTreeMap<String, CachedJwks>>,
}

impl GrantVerifier {
    /// Builds a verifier with the HTTP fetcher and system clock.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_parts(HttpJwksFetcher::new()?, SystemClock))
    }

    /// Builds a verifier from explicit fetcher and clock implementations.
    #[must_use]
    pub fn with_parts(
        fetcher: impl JwksFetcher + 'static,
        clock: impl JwksClock + 'static,
    ) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            clock: Box::new(clock),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Verifies a connect grant end to end.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::InvalidGrant`] with a stable reason code for
    /// every verification failure, and [`ConnectError::Internal`] when the
    /// shared cache is unusable.
    pub async fn verify(
        &self,
        token: &str,
        jwks_url: &str,
        expected_issuer: &str,
        expected_tool_id: &ToolId,
    ) -> Result<VerifiedGrant, ConnectError> {
        let header = jsonwebtoken::decode_header(token).map_err(|err| {
            ConnectError::invalid_grant_with_detail(
                format!("JWT verification failed: {err}"),
                json!({"reason": "verification_error"}),
            )
        })?;
        let jwk = self.key_for(jwks_url, header.kid.as_deref()).await?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|err| {
            ConnectError::invalid_grant_with_detail(
                format!("JWT verification failed: {err}"),
                json!({"reason": "verification_error"}),
            )
        })?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.leeway = 0;
        validation.set_issuer(&[expected_issuer]);
        validation.set_audience(&[expected_tool_id.as_str()]);
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let decoded = jsonwebtoken::decode::<RawGrantClaims>(token, &decoding_key, &validation)
            .map_err(|err| map_decode_error(&err, expected_issuer, expected_tool_id))?;

        let claims = decoded.claims;
        let jti = claims.jti.ok_or_else(|| missing_claim_error("jti"))?;
        let sub = claims.sub.ok_or_else(|| missing_claim_error("sub"))?;
        let claim = claims.agentpi.ok_or_else(|| missing_claim_error("agentpi"))?;
        Ok(VerifiedGrant {
            sub: AgentId::new(sub),
            jti,
            exp: claims.exp,
            claim,
        })
    }

    /// Resolves the verification key for a token's `kid`.
    ///
    /// A `kid` absent from a cached set forces one refresh before failing,
    /// so issuer key rotation does not strand tools for the cache window.
    async fn key_for(&self, jwks_url: &str, kid: Option<&str>) -> Result<Jwk, ConnectError> {
        let set = match self.cached(jwks_url)? {
            Some(set) => set,
            None => self.refresh(jwks_url).await?,
        };
        if let Some(jwk) = find_key(&set, kid) {
            return Ok(jwk);
        }
        let set = self.refresh(jwks_url).await?;
        find_key(&set, kid).ok_or_else(|| {
            ConnectError::invalid_grant_with_detail(
                "JWT verification failed: no key matches the token kid",
                json!({"reason": "unknown_kid", "kid": kid}),
            )
        })
    }

    /// Returns the cached key set for the URL when still fresh.
    fn cached(&self, jwks_url: &str) -> Result<Option<JwkSet>, ConnectError> {
        let guard = self
            .cache
            .lock()
            .map_err(|_| ConnectError::internal("jwks cache mutex poisoned"))?;
        let now = self.clock.now();
        Ok(guard.get(jwks_url).and_then(|cached| {
            (now.saturating_duration_since(cached.fetched_at) <= JWKS_CACHE_TTL)
                .then(|| cached.set.clone())
        }))
    }

    /// Fetches the key set and replaces the cache entry for the URL.
    async fn refresh(&self, jwks_url: &str) -> Result<JwkSet, ConnectError> {
        let set = self
            .fetcher
            .fetch(jwks_url)
            .await
            .map_err(|err| map_fetch_error(&err, jwks_url))?;
        let mut guard = self
            .cache
            .lock()
            .map_err(|_| ConnectError::internal("jwks cache mutex poisoned"))?;
        guard.insert(
            jwks_url.to_string(),
            CachedJwks {
                set: set.clone(),
                fetched_at: self.clock.now(),
            },
        );
        Ok(set)
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Finds the key matching the token `kid`, or the first key when the token
/// carries none.
fn find_key(set: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => set.find(kid).cloned(),
        None => set.keys.first().cloned(),
    }
}

/// Builds the missing-required-claim error naming the claim.
fn missing_claim_error(claim: &str) -> ConnectError {
    ConnectError::invalid_grant_with_detail(
        format!("Missing required JWT claim: {claim}"),
        json!({"reason": "missing_claim", "claim": claim}),
    )
}

/// Maps a JWKS fetch failure onto the invalid-grant taxonomy.
fn map_fetch_error(err: &FetchError, jwks_url: &str) -> ConnectError {
    match err {
        FetchError::Unreachable(source) => ConnectError::invalid_grant_with_detail(
            format!("JWKS unreachable at {jwks_url}"),
            json!({"reason": "jwks_unreachable", "jwks_url": jwks_url, "source": source}),
        ),
        FetchError::Status(status) => ConnectError::invalid_grant_with_detail(
            format!("JWKS fetch failed: status {status} from {jwks_url}"),
            json!({"reason": "jwks_fetch_failed", "jwks_url": jwks_url, "status": status}),
        ),
        FetchError::Malformed(source) => ConnectError::invalid_grant_with_detail(
            format!("JWKS fetch failed: malformed document from {jwks_url}"),
            json!({"reason": "jwks_fetch_failed", "jwks_url": jwks_url, "source": source}),
        ),
    }
}

/// Maps a JWT decode failure onto a stable reason code.
fn map_decode_error(
    err: &jsonwebtoken::errors::Error,
    expected_issuer: &str,
    expected_tool_id: &ToolId,
) -> ConnectError {
    match err.kind() {
        ErrorKind::ExpiredSignature => ConnectError::invalid_grant_with_detail(
            "Connect grant expired",
            json!({"reason": "expired"}),
        ),
        ErrorKind::InvalidAudience => ConnectError::invalid_grant_with_detail(
            format!("aud mismatch: expected {expected_tool_id}"),
            json!({"reason": "aud_mismatch", "expected": expected_tool_id.as_str()}),
        ),
        ErrorKind::InvalidIssuer => ConnectError::invalid_grant_with_detail(
            format!("iss mismatch: expected {expected_issuer}"),
            json!({"reason": "iss_mismatch", "expected": expected_issuer}),
        ),
        ErrorKind::InvalidSignature => ConnectError::invalid_grant_with_detail(
            "JWT signature verification failed: key mismatch or tampered token",
            json!({"reason": "bad_signature"}),
        ),
        ErrorKind::MissingRequiredClaim(claim) => ConnectError::invalid_grant_with_detail(
            format!("Missing or invalid required JWT claim: {claim}"),
            json!({"reason": "missing_claim", "claim": claim}),
        ),
        ErrorKind::Json(source) => ConnectError::invalid_grant_with_detail(
            format!("JWT claim validation failed: {source}"),
            json!({"reason": "claim_validation"}),
        ),
        _ => ConnectError::invalid_grant_with_detail(
            format!("JWT verification failed: {err}"),
            json!({"reason": "verification_error"}),
        ),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
