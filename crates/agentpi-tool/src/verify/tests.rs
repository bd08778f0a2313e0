// crates/agentpi-tool/src/verify/tests.rs
// ============================================================================
// Module: Grant Verifier Unit Tests
// Description: Unit tests for grant verification and the JWKS cache.
// Purpose: Validate reason codes, claim checks, and cache freshness.
// Dependencies: agentpi-tool, ed25519-dalek, jsonwebtoken
// ============================================================================

//! ## Overview
//! Exercises the verifier with a fake fetcher and fake clock: signature,
//! issuer, audience, and expiry reason codes, required-claim checks, fetch
//! failure classification, cache freshness, and kid-rotation refresh.

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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use agentpi_core::core::identifiers::ToolId;
use agentpi_core::core::time::now_unix;
use agentpi_core::error::ConnectError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::jwk::JwkSet;
use rand::rngs::OsRng;
use serde_json::Value;
use serde_json::json;

use super::FetchError;
use super::GrantVerifier;
use super::JwksClock;
use super::JwksFetcher;
use super::SystemClock;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Issuer identity used across tests.
const ISSUER: &str = "https://agentpi.local";

/// Tool identifier used across tests.
const TOOL: &str = "tool_example";

/// JWKS URL handed to the verifier; fake fetchers ignore it.
const JWKS_URL: &str = "http://issuer.test/.well-known/jwks.json";

// ============================================================================
// SECTION: Signing Helpers
// ============================================================================

/// Test signing identity with its published key set.
struct TestIssuer {
    /// JWT encoding key.
    encoding_key: EncodingKey,
    /// Key identifier placed in token headers.
    kid: String,
    /// Published key set containing the public key.
    jwks: JwkSet,
}

/// Generates a fresh Ed25519 signing identity under the given kid.
fn issuer_with_kid(kid: &str) -> TestIssuer {
    let signing_key = SigningKey::generate(&mut OsRng);
    let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
    let jwks: JwkSet = serde_json::from_value(json!({
        "keys": [{"kty": "OKP", "crv": "Ed25519", "x": x, "kid": kid, "use": "sig", "alg": "EdDSA"}]
    }))
    .unwrap();
    let document = signing_key.to_pkcs8_der().unwrap();
    TestIssuer {
        encoding_key: EncodingKey::from_ed_der(document.as_bytes()),
        kid: kid.to_string(),
        jwks,
    }
}

/// Signs a claims object with the issuer's key and kid.
fn sign(issuer: &TestIssuer, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(issuer.kid.clone());
    jsonwebtoken::encode(&header, claims, &issuer.encoding_key).unwrap()
}

/// Builds the protocol claim payload embedded under `agentpi`.
fn claim_json() -> Value {
    json!({
        "org_id": "org_demo",
        "tool_id": TOOL,
        "mode": "autonomous",
        "requested_plan_id": "free",
        "scopes": ["read", "deploy"],
        "limits": {"rpm": 60, "dailyQuota": 500, "concurrency": 1},
        "workspace": {"name": "Demo Workspace"},
        "nonce": "nonce-1",
    })
}

/// Builds a fully populated grant claims object expiring in the future.
fn grant_claims() -> Value {
    json!({
        "iss": ISSUER,
        "aud": TOOL,
        "sub": "agent_demo",
        "jti": "jti-1",
        "exp": now_unix() + 300,
        "agentpi": claim_json(),
    })
}

// ============================================================================
// SECTION: Fake Collaborators
// ============================================================================

/// Fetcher serving a scripted sequence of key sets and counting calls.
struct FakeFetcher {
    /// Remaining key sets; the final one is served repeatedly.
    sets: Mutex<Vec<JwkSet>>,
    /// Number of fetches performed.
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    /// Builds a fetcher over the scripted key sets.
    fn new(sets: Vec<JwkSet>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                sets: Mutex::new(sets),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl JwksFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str) -> Result<JwkSet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sets = self.sets.lock().unwrap();
        if sets.len() > 1 {
            Ok(sets.remove(0))
        } else {
            Ok(sets[0].clone())
        }
    }
}

/// Fetcher failing every call with a fixed error class.
struct FailingFetcher {
    /// Whether to fail as unreachable (true) or as a 500 status (false).
    unreachable: bool,
}

#[async_trait]
impl JwksFetcher for FailingFetcher {
    async fn fetch(&self, _url: &str) -> Result<JwkSet, FetchError> {
        if self.unreachable {
            Err(FetchError::Unreachable("connection refused".to_string()))
        } else {
            Err(FetchError::Status(500))
        }
    }
}

/// Manually advanced clock for cache freshness tests.
#[derive(Clone)]
struct FakeClock {
    /// Fixed base instant.
    base: Instant,
    /// Shared offset applied on every read.
    offset: Arc<Mutex<Duration>>,
}

impl FakeClock {
    /// Builds a clock at the current instant with zero offset.
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advances the clock by the given duration.
    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl JwksClock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

// ============================================================================
// SECTION: Assertion Helpers
// ============================================================================

/// Extracts the reason code from an invalid-grant error.
fn reason(err: &ConnectError) -> String {
    match err {
        ConnectError::InvalidGrant {
            detail, ..
        } => detail.as_ref().unwrap()["reason"].as_str().unwrap().to_string(),
        other => panic!("expected invalid_grant, got {other}"),
    }
}

/// Builds a verifier over a single static key set.
fn verifier_for(issuer: &TestIssuer) -> GrantVerifier {
    let (fetcher, _calls) = FakeFetcher::new(vec![issuer.jwks.clone()]);
    GrantVerifier::with_parts(fetcher, SystemClock)
}

// ============================================================================
// SECTION: Verification
// ============================================================================

#[tokio::test]
async fn accepts_a_well_formed_grant() {
    let issuer = issuer_with_kid("key-1");
    let token = sign(&issuer, &grant_claims());
    let verifier = verifier_for(&issuer);
    let grant =
        verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap();
    assert_eq!(grant.sub.as_str(), "agent_demo");
    assert_eq!(grant.jti, "jti-1");
    assert_eq!(grant.claim.tool_id.as_str(), TOOL);
    assert_eq!(grant.claim.scopes, vec!["read".to_string(), "deploy".to_string()]);
}

#[tokio::test]
async fn rejects_an_expired_grant() {
    let issuer = issuer_with_kid("key-1");
    let mut claims = grant_claims();
    claims["exp"] = Value::from(now_unix() - 100);
    let token = sign(&issuer, &claims);
    let verifier = verifier_for(&issuer);
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "expired");
    assert_eq!(err.status(), 401);
}

#[tokio::test]
async fn rejects_an_audience_mismatch_naming_the_expected_tool() {
    let issuer = issuer_with_kid("key-1");
    let token = sign(&issuer, &grant_claims());
    let verifier = verifier_for(&issuer);
    let err = verifier
        .verify(&token, JWKS_URL, ISSUER, &ToolId::new("other_tool"))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), "aud_mismatch");
    assert_eq!(err.detail().unwrap()["expected"], "other_tool");
}

#[tokio::test]
async fn rejects_an_issuer_mismatch() {
    let issuer = issuer_with_kid("key-1");
    let token = sign(&issuer, &grant_claims());
    let verifier = verifier_for(&issuer);
    let err = verifier
        .verify(&token, JWKS_URL, "https://someone-else.example", &ToolId::new(TOOL))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), "iss_mismatch");
}

#[tokio::test]
async fn rejects_a_token_signed_by_the_wrong_key() {
    let published = issuer_with_kid("key-1");
    let imposter = issuer_with_kid("key-1");
    let token = sign(&imposter, &grant_claims());
    let verifier = verifier_for(&published);
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "bad_signature");
}

#[tokio::test]
async fn rejects_garbage_tokens() {
    let issuer = issuer_with_kid("key-1");
    let verifier = verifier_for(&issuer);
    let err = verifier
        .verify("not-a-jwt", JWKS_URL, ISSUER, &ToolId::new(TOOL))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), "verification_error");
}

// ============================================================================
// SECTION: Required Claims
// ============================================================================

#[tokio::test]
async fn names_the_missing_protocol_claim() {
    let issuer = issuer_with_kid("key-1");
    let mut claims = grant_claims();
    claims.as_object_mut().unwrap().remove("agentpi");
    let token = sign(&issuer, &claims);
    let verifier = verifier_for(&issuer);
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "missing_claim");
    assert_eq!(err.detail().unwrap()["claim"], "agentpi");
    assert!(err.to_string().contains("agentpi"));
}

#[tokio::test]
async fn names_a_missing_jti() {
    let issuer = issuer_with_kid("key-1");
    let mut claims = grant_claims();
    claims.as_object_mut().unwrap().remove("jti");
    let token = sign(&issuer, &claims);
    let verifier = verifier_for(&issuer);
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "missing_claim");
    assert_eq!(err.detail().unwrap()["claim"], "jti");
}

#[tokio::test]
async fn names_a_missing_subject() {
    let issuer = issuer_with_kid("key-1");
    let mut claims = grant_claims();
    claims.as_object_mut().unwrap().remove("sub");
    let token = sign(&issuer, &claims);
    let verifier = verifier_for(&issuer);
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(err.detail().unwrap()["claim"], "sub");
}

// ============================================================================
// SECTION: Fetch Failures
// ============================================================================

#[tokio::test]
async fn classifies_an_unreachable_jwks_endpoint() {
    let issuer = issuer_with_kid("key-1");
    let token = sign(&issuer, &grant_claims());
    let verifier = GrantVerifier::with_parts(
        FailingFetcher {
            unreachable: true,
        },
        SystemClock,
    );
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "jwks_unreachable");
    assert_eq!(err.code(), "invalid_grant");
}

#[tokio::test]
async fn classifies_a_failed_jwks_fetch() {
    let issuer = issuer_with_kid("key-1");
    let token = sign(&issuer, &grant_claims());
    let verifier = GrantVerifier::with_parts(
        FailingFetcher {
            unreachable: false,
        },
        SystemClock,
    );
    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "jwks_fetch_failed");
    assert_eq!(err.detail().unwrap()["status"], 500);
}

// ============================================================================
// SECTION: JWKS Cache
// ============================================================================

#[tokio::test]
async fn serves_from_cache_within_the_freshness_window() {
    let issuer = issuer_with_kid("key-1");
    let token = sign(&issuer, &grant_claims());
    let (fetcher, calls) = FakeFetcher::new(vec![issuer.jwks.clone()]);
    let clock = FakeClock::new();
    let verifier = GrantVerifier::with_parts(fetcher, clock.clone());
    let tool = ToolId::new(TOOL);

    verifier.verify(&token, JWKS_URL, ISSUER, &tool).await.unwrap();
    verifier.verify(&token, JWKS_URL, ISSUER, &tool).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(61));
    verifier.verify(&token, JWKS_URL, ISSUER, &tool).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn refreshes_once_when_the_kid_is_unknown() {
    let old_issuer = issuer_with_kid("key-1");
    let new_issuer = issuer_with_kid("key-2");
    let token = sign(&new_issuer, &grant_claims());
    let (fetcher, calls) =
        FakeFetcher::new(vec![old_issuer.jwks.clone(), new_issuer.jwks.clone()]);
    let verifier = GrantVerifier::with_parts(fetcher, SystemClock);

    verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fails_with_unknown_kid_when_refresh_does_not_help() {
    let published = issuer_with_kid("key-1");
    let rotated = issuer_with_kid("key-9");
    let token = sign(&rotated, &grant_claims());
    let (fetcher, _calls) = FakeFetcher::new(vec![published.jwks.clone()]);
    let verifier = GrantVerifier::with_parts(fetcher, SystemClock);

    let err = verifier.verify(&token, JWKS_URL, ISSUER, &ToolId::new(TOOL)).await.unwrap_err();
    assert_eq!(reason(&err), "unknown_kid");
}
