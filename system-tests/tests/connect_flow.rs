// system-tests/tests/connect_flow.rs
// ============================================================================
// Module: Connect Flow System Tests
// Description: End-to-end tests across the issuer and tool services.
// Purpose: Validate the full discover/grant/connect cycle over real HTTP.
// Dependencies: system-tests, reqwest, serde_json
// ============================================================================

//! ## Overview
//! Drives the whole protocol over HTTP: discovery, grant issuance, JWKS
//! publication, the connect handshake, grant single-use, idempotent retries
//! with fresh grants, and conflicting key reuse.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::Ordering;

use serde_json::Value;
use serde_json::json;
use system_tests::AGENT_KEY;
use system_tests::TOOL_ID;
use system_tests::TestStack;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the standard grant request body with the given nonce.
fn grant_body(nonce: &str) -> Value {
    json!({
        "tool_id": TOOL_ID,
        "requested_scopes": ["read", "deploy"],
        "requested_limits": {"rpm": 60, "dailyQuota": 500, "concurrency": 1},
        "workspace": {"name": "My Workspace"},
        "nonce": nonce,
    })
}

/// Requests a grant from the running issuer.
async fn obtain_grant(client: &reqwest::Client, stack: &TestStack, nonce: &str) -> String {
    let response = client
        .post(format!("{}/v1/connect-grants", stack.issuer_url))
        .header("x-agentpi-agent-key", AGENT_KEY)
        .json(&grant_body(nonce))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["expires_in"], 300);
    body["connect_grant"].as_str().unwrap().to_string()
}

/// Posts a connect request and returns (status, body).
async fn connect(
    client: &reqwest::Client,
    stack: &TestStack,
    grant: &str,
    idempotency_key: &str,
) -> (u16, Value) {
    let response = client
        .post(format!("{}/v1/agentpi/connect", stack.tool_url))
        .bearer_auth(grant)
        .header("Idempotency-Key", idempotency_key)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap();
    (status, body)
}

// ============================================================================
// SECTION: Discovery and JWKS
// ============================================================================

#[tokio::test]
async fn publishes_discovery_and_jwks() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();

    let discovery: Value = client
        .get(format!("{}/.well-known/agentpi.json", stack.tool_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(discovery["agentpi_version"], "0.1");
    assert_eq!(discovery["tool_id"], TOOL_ID);
    assert_eq!(discovery["connect_endpoint"], "/v1/agentpi/connect");
    assert_eq!(discovery["idempotency"]["header"], "Idempotency-Key");
    assert_eq!(discovery["plans"][0]["scopes_allowed"], json!(["read", "deploy", "write"]));

    let jwks: Value = client
        .get(format!("{}/.well-known/jwks.json", stack.issuer_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let key = &jwks["keys"][0];
    assert_eq!(key["kty"], "OKP");
    assert_eq!(key["crv"], "Ed25519");
    assert_eq!(key["alg"], "EdDSA");
    assert_eq!(key["use"], "sig");
    assert!(key["kid"].as_str().is_some());
}

// ============================================================================
// SECTION: Connect Cycle
// ============================================================================

#[tokio::test]
async fn runs_the_full_connect_cycle() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();

    let grant = obtain_grant(&client, &stack, "nonce-cycle").await;
    let (status, body) = connect(&client, &stack, &grant, "k1").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "active");
    assert_eq!(body["tool_workspace_id"], "ws_org_demo");
    assert_eq!(body["tool_agent_id"], "ta_agent_demo");
    assert_eq!(body["credentials"]["type"], "api_key");
    assert_eq!(body["applied_plan_id"], "free");
    assert_eq!(body["applied_scopes"], json!(["read", "deploy"]));
    // Requested limits sit under the ceiling, so they apply unchanged.
    assert_eq!(body["applied_limits"], json!({"rpm": 60, "dailyQuota": 500, "concurrency": 1}));
    assert_eq!(stack.provision_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn consumes_a_grant_on_first_redemption() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();

    let grant = obtain_grant(&client, &stack, "nonce-replay").await;
    let (status, _body) = connect(&client, &stack, &grant, "k1").await;
    assert_eq!(status, 200);

    // The same grant under a fresh idempotency key is a replay.
    let (status, body) = connect(&client, &stack, &grant, "k2").await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "invalid_grant");
    assert_eq!(body["error"]["detail"]["reason"], "replay");
    assert_eq!(stack.provision_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replays_the_cached_result_for_a_retried_intent() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();

    let grant = obtain_grant(&client, &stack, "nonce-retry").await;
    let (_status, first) = connect(&client, &stack, &grant, "k1").await;

    // A fresh, un-redeemed grant for the same semantic inputs retried under
    // the same key returns the original cached result.
    let retry_grant = obtain_grant(&client, &stack, "nonce-retry").await;
    let (status, cached) = connect(&client, &stack, &retry_grant, "k1").await;
    assert_eq!(status, 200);
    assert_eq!(cached, first);
    assert_eq!(stack.provision_calls.load(Ordering::SeqCst), 1);

    // The retried grant was served from cache, so it was not consumed.
    let (status, _fresh) = connect(&client, &stack, &retry_grant, "k3").await;
    assert_eq!(status, 200);
    assert_eq!(stack.provision_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejects_a_key_reused_with_different_inputs() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();

    let grant = obtain_grant(&client, &stack, "nonce-a").await;
    let (status, _body) = connect(&client, &stack, &grant, "k1").await;
    assert_eq!(status, 200);

    let other = obtain_grant(&client, &stack, "nonce-b").await;
    let (status, body) = connect(&client, &stack, &other, "k1").await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "idempotency_conflict");
}

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

#[tokio::test]
async fn maps_header_and_token_failures_onto_the_taxonomy() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();
    let connect_url = format!("{}/v1/agentpi/connect", stack.tool_url);

    // No bearer token.
    let response = client
        .post(&connect_url)
        .header("Idempotency-Key", "k1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    // Bearer token but no idempotency key.
    let grant = obtain_grant(&client, &stack, "nonce-errors").await;
    let response = client.post(&connect_url).bearer_auth(&grant).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "missing_idempotency_key");

    // Garbage token.
    let response = client
        .post(&connect_url)
        .bearer_auth("garbage")
        .header("Idempotency-Key", "k1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_grant");
}

#[tokio::test]
async fn refuses_grants_for_foreign_tools_and_bad_credentials() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();
    let grants_url = format!("{}/v1/connect-grants", stack.issuer_url);

    // Wrong pre-shared key.
    let response = client
        .post(&grants_url)
        .header("x-agentpi-agent-key", "wrong")
        .json(&grant_body("nonce-x"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Unknown tool id.
    let mut body = grant_body("nonce-y");
    body["tool_id"] = Value::from("tool_unknown");
    let response = client
        .post(&grants_url)
        .header("x-agentpi-agent-key", AGENT_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unknown_tool");

    // Structured validation failure.
    let mut body = grant_body("");
    body["requested_scopes"] = json!([]);
    let response = client
        .post(&grants_url)
        .header("x-agentpi-agent-key", AGENT_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_request");
    let violations = body["error"]["detail"]["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 2);
}

#[tokio::test]
async fn rejects_scopes_outside_the_tool_policy() {
    let stack = TestStack::start().await.unwrap();
    let client = reqwest::Client::new();

    let mut body = grant_body("nonce-scopes");
    body["requested_scopes"] = json!(["read", "admin"]);
    let response = client
        .post(format!("{}/v1/connect-grants", stack.issuer_url))
        .header("x-agentpi-agent-key", AGENT_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    let grant = response.json::<Value>().await.unwrap()["connect_grant"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = connect(&client, &stack, &grant, "k1").await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "scopes_not_allowed");
    assert_eq!(body["error"]["detail"]["rejected"], json!(["admin"]));
    assert_eq!(
        body["error"]["detail"]["allowed"],
        json!(["read", "deploy", "write"])
    );
}
