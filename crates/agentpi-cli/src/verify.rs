// crates/agentpi-cli/src/verify.rs
// ============================================================================
// Module: AgentPI Conformance Verifier
// Description: Black-box protocol checks against a live tool deployment.
// Purpose: Report pass/fail per check for discovery, connect, and replay.
// Dependencies: agentpi-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! The verifier drives a live tool through the protocol surface and reports
//! one line per check: discovery document shape, the connect flow, connect
//! response shape, grant replay rejection, and idempotency conflict
//! detection. Any failed check turns the exit code non-zero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use agentpi_core::core::types::AGENTPI_VERSION;
use agentpi_core::core::types::ConnectResult;
use agentpi_core::core::types::CredentialType;
use agentpi_core::core::types::DiscoveryDocument;
use serde_json::Value;
use serde_json::json;

use crate::CliResult;
use crate::flows;
use crate::flows::GrantSpec;
use crate::write_stdout_line;

// ============================================================================
// SECTION: Check List
// ============================================================================

/// One conformance check outcome.
struct Check {
    /// Check name.
    name: &'static str,
    /// Whether the check passed.
    pass: bool,
    /// Supporting detail.
    detail: String,
}

/// Accumulator printing checks as they run.
struct CheckList {
    /// Recorded checks in run order.
    checks: Vec<Check>,
}

impl CheckList {
    /// Builds an empty check list.
    const fn new() -> Self {
        Self {
            checks: Vec::new(),
        }
    }

    /// Records and prints a passing check.
    fn pass(&mut self, name: &'static str, detail: impl Into<String>) -> CliResult<()> {
        let detail = detail.into();
        write_stdout_line(&format!("  ok   {name}: {detail}"))?;
        self.checks.push(Check {
            name,
            pass: true,
            detail,
        });
        Ok(())
    }

    /// Records and prints a failing check.
    fn fail(&mut self, name: &'static str, detail: impl Into<String>) -> CliResult<()> {
        let detail = detail.into();
        write_stdout_line(&format!("  FAIL {name}: {detail}"))?;
        self.checks.push(Check {
            name,
            pass: false,
            detail,
        });
        Ok(())
    }

    /// Prints the summary and returns the process exit code.
    fn summarize(&self) -> CliResult<ExitCode> {
        let total = self.checks.len();
        let failed: Vec<&Check> = self.checks.iter().filter(|check| !check.pass).collect();
        if failed.is_empty() {
            write_stdout_line(&format!("All {total} checks passed"))?;
            return Ok(ExitCode::SUCCESS);
        }
        write_stdout_line(&format!("{}/{total} passed, {} failed", total - failed.len(), failed.len()))?;
        for check in failed {
            write_stdout_line(&format!("  FAIL {}: {}", check.name, check.detail))?;
        }
        Ok(ExitCode::FAILURE)
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Runs the conformance checks against a tool deployment.
pub(crate) async fn verify(tool_base_url: &str) -> CliResult<ExitCode> {
    let mut checks = CheckList::new();
    let client = flows::http_client()?;
    write_stdout_line(&format!("AgentPI conformance verifier, target {tool_base_url}"))?;

    // Discovery.
    let discovery = match flows::discover(&client, tool_base_url).await {
        Ok(discovery) => {
            checks.pass("discovery", "document fetched")?;
            discovery
        }
        Err(err) => {
            checks.fail("discovery", err.to_string())?;
            return checks.summarize();
        }
    };
    check_discovery(&mut checks, &discovery)?;

    // Connect flow.
    let grant = match flows::request_grant(
        &client,
        &GrantSpec {
            tool_id: discovery.tool_id.to_string(),
            scopes: discovery.plans.first().map_or_else(
                || vec!["read".to_string()],
                |plan| plan.scopes_allowed.iter().take(2).cloned().collect(),
            ),
            rpm: discovery.default_limits.rpm,
            daily: discovery.default_limits.daily_quota,
            concurrency: discovery.default_limits.concurrency,
            workspace_name: "Verify Test".to_string(),
        },
    )
    .await
    {
        Ok(grant) => {
            checks.pass("obtain grant", format!("expires_in={}s", grant.expires_in))?;
            grant.connect_grant
        }
        Err(err) => {
            checks.fail("obtain grant", err.to_string())?;
            return checks.summarize();
        }
    };

    let idempotency_key = flows::random_token();
    let connect_url = format!("{tool_base_url}{}", discovery.connect_endpoint);
    let result = match post_connect(&client, &connect_url, &discovery, &grant, &idempotency_key)
        .await
    {
        Ok(result) => {
            checks.pass("connect", "status 200")?;
            result
        }
        Err(detail) => {
            checks.fail("connect", detail)?;
            return checks.summarize();
        }
    };
    check_connect_result(&mut checks, &result)?;

    // Replay protection: same grant, fresh idempotency key.
    let replay_status = raw_connect_status(
        &client,
        &connect_url,
        &discovery,
        &grant,
        &flows::random_token(),
    )
    .await;
    if replay_status == Some(401) {
        checks.pass("grant replay rejected", "401")?;
    } else {
        checks.fail("grant replay rejected", format!("expected 401, got {replay_status:?}"))?;
    }

    // Idempotency conflict: fresh grant with different inputs, same key.
    match flows::request_grant(
        &client,
        &GrantSpec {
            tool_id: discovery.tool_id.to_string(),
            scopes: discovery.plans.first().map_or_else(
                || vec!["read".to_string()],
                |plan| plan.scopes_allowed.clone(),
            ),
            rpm: discovery.default_limits.rpm,
            daily: discovery.default_limits.daily_quota,
            concurrency: discovery.default_limits.concurrency,
            workspace_name: "Different Workspace For Conflict".to_string(),
        },
    )
    .await
    {
        Ok(second_grant) => {
            let conflict_status = raw_connect_status(
                &client,
                &connect_url,
                &discovery,
                &second_grant.connect_grant,
                &idempotency_key,
            )
            .await;
            if conflict_status == Some(409) {
                checks.pass("idempotency conflict", "409")?;
            } else {
                checks
                    .fail("idempotency conflict", format!("expected 409, got {conflict_status:?}"))?;
            }
        }
        Err(err) => checks.fail("idempotency conflict", err.to_string())?,
    }

    checks.summarize()
}

// ============================================================================
// SECTION: Check Groups
// ============================================================================

/// Checks the discovery document fields.
fn check_discovery(checks: &mut CheckList, discovery: &DiscoveryDocument) -> CliResult<()> {
    if discovery.agentpi_version == AGENTPI_VERSION {
        checks.pass("agentpi_version", discovery.agentpi_version.clone())?;
    } else {
        checks.fail(
            "agentpi_version",
            format!("expected {AGENTPI_VERSION}, got {}", discovery.agentpi_version),
        )?;
    }
    if discovery.tool_id.as_str().is_empty() {
        checks.fail("tool_id", "missing")?;
    } else {
        checks.pass("tool_id", discovery.tool_id.to_string())?;
    }
    if discovery.tool_name.is_empty() {
        checks.fail("tool_name", "missing")?;
    } else {
        checks.pass("tool_name", discovery.tool_name.clone())?;
    }
    if discovery.connect_endpoint.starts_with('/') {
        checks.pass("connect_endpoint", discovery.connect_endpoint.clone())?;
    } else {
        checks.fail("connect_endpoint", "missing or relative")?;
    }
    if let Some(plan) = discovery.plans.first() {
        if plan.scopes_allowed.is_empty() {
            checks.fail("plans", "first plan has no scopes_allowed")?;
        } else {
            checks.pass(
                "plans",
                format!(
                    "{} plan(s), first allows [{}] rpm={}",
                    discovery.plans.len(),
                    plan.scopes_allowed.join(","),
                    plan.max_limits.rpm
                ),
            )?;
        }
    } else {
        checks.fail("plans", "missing or empty")?;
    }
    if discovery.idempotency.header.is_empty() {
        checks.fail("idempotency.header", "missing")?;
    } else {
        checks.pass("idempotency.header", discovery.idempotency.header.clone())?;
    }
    Ok(())
}

/// Checks the connect result fields.
fn check_connect_result(checks: &mut CheckList, result: &ConnectResult) -> CliResult<()> {
    if result.tool_workspace_id.is_empty() {
        checks.fail("tool_workspace_id", "missing")?;
    } else {
        checks.pass("tool_workspace_id", result.tool_workspace_id.clone())?;
    }
    if result.tool_agent_id.is_empty() {
        checks.fail("tool_agent_id", "missing")?;
    } else {
        checks.pass("tool_agent_id", result.tool_agent_id.clone())?;
    }
    if result.credentials.credential_type == CredentialType::ApiKey
        && !result.credentials.api_key.is_empty()
    {
        checks.pass("credentials", "type=api_key")?;
    } else {
        checks.fail("credentials", "missing or invalid type")?;
    }
    if result.applied_scopes.is_empty() {
        checks.fail("applied_scopes", "missing or empty")?;
    } else {
        checks.pass("applied_scopes", result.applied_scopes.join(", "))?;
    }
    checks.pass("applied_limits", format!("rpm={}", result.applied_limits.rpm))?;
    Ok(())
}

// ============================================================================
// SECTION: HTTP Helpers
// ============================================================================

/// Posts a connect request, returning the parsed result or error detail.
async fn post_connect(
    client: &reqwest::Client,
    connect_url: &str,
    discovery: &DiscoveryDocument,
    grant: &str,
    idempotency_key: &str,
) -> Result<ConnectResult, String> {
    let response = client
        .post(connect_url)
        .bearer_auth(grant)
        .header(discovery.idempotency.header.as_str(), idempotency_key)
        .send()
        .await
        .map_err(|err| format!("unreachable: {err}"))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.json::<Value>().await.unwrap_or_else(|_| json!({}));
        return Err(format!("HTTP {status}: {body}"));
    }
    response.json::<ConnectResult>().await.map_err(|err| format!("malformed response: {err}"))
}

/// Posts a connect request and returns only the HTTP status.
async fn raw_connect_status(
    client: &reqwest::Client,
    connect_url: &str,
    discovery: &DiscoveryDocument,
    grant: &str,
    idempotency_key: &str,
) -> Option<u16> {
    client
        .post(connect_url)
        .bearer_auth(grant)
        .header(discovery.idempotency.header.as_str(), idempotency_key)
        .send()
        .await
        .ok()
        .map(|response| response.status().as_u16())
}
