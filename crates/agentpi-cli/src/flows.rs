// crates/agentpi-cli/src/flows.rs
// ============================================================================
// Module: AgentPI Client Flows
// Description: Discover, grant, connect, and demo flows against live services.
// Purpose: Drive the connect protocol from the agent's side.
// Dependencies: agentpi-core, rand, reqwest, serde_json
// ============================================================================

//! ## Overview
//! Client flows mirror the protocol's data path: read the tool's discovery
//! document, obtain a grant from the issuing authority, redeem the grant at
//! the tool's connect endpoint, and optionally exercise the returned
//! credential. Each step prints what it is doing and surfaces structured
//! error bodies verbatim on failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use agentpi_core::core::types::AGENT_KEY_HEADER;
use agentpi_core::core::types::ConnectGrantResponse;
use agentpi_core::core::types::ConnectResult;
use agentpi_core::core::types::DISCOVERY_PATH;
use agentpi_core::core::types::DiscoveryDocument;
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;
use serde_json::json;

use crate::CliError;
use crate::CliResult;
use crate::write_stdout_line;

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Environment variable naming the issuing authority base URL.
const SERVICE_URL_ENV_VAR: &str = "AGENTPI_SERVICE_URL";

/// Environment variable supplying the pre-shared agent credential.
const AGENT_KEY_ENV_VAR: &str = "AGENTPI_AGENT_API_KEY";

/// Default issuing authority base URL for local demos.
const DEFAULT_SERVICE_URL: &str = "http://localhost:4010";

/// Default pre-shared agent credential for local demos.
const DEFAULT_AGENT_KEY: &str = "agentpi_dev_key_12345";

/// Timeout applied to every client request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Returns the issuing authority base URL.
pub(crate) fn issuer_url() -> String {
    env::var(SERVICE_URL_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string())
}

/// Returns the pre-shared agent credential.
pub(crate) fn agent_key() -> String {
    env::var(AGENT_KEY_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_AGENT_KEY.to_string())
}

/// Builds the shared HTTP client.
pub(crate) fn http_client() -> CliResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| CliError::new(format!("http client construction failed: {err}")))
}

/// Mints a random token for nonces and idempotency keys (32 hex characters).
pub(crate) fn random_token() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let mut token = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        token.push(HEX[(byte >> 4) as usize] as char);
        token.push(HEX[(byte & 0x0f) as usize] as char);
    }
    token
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Fetches a tool's discovery document.
pub(crate) async fn discover(
    client: &reqwest::Client,
    tool_base_url: &str,
) -> CliResult<DiscoveryDocument> {
    let url = format!("{tool_base_url}{DISCOVERY_PATH}");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|err| CliError::new(format!("discovery unreachable at {url}: {err}")))?;
    if !response.status().is_success() {
        return Err(CliError::new(format!("discovery failed: HTTP {}", response.status())));
    }
    response
        .json::<DiscoveryDocument>()
        .await
        .map_err(|err| CliError::new(format!("discovery document malformed: {err}")))
}

// ============================================================================
// SECTION: Grant Request
// ============================================================================

/// What to ask the issuing authority for.
pub(crate) struct GrantSpec {
    /// Tool the grant should be scoped to.
    pub tool_id: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Requested requests per minute.
    pub rpm: u32,
    /// Requested daily quota.
    pub daily: u32,
    /// Requested concurrency.
    pub concurrency: u32,
    /// Workspace name to provision.
    pub workspace_name: String,
}

/// Requests a connect grant from the issuing authority.
pub(crate) async fn request_grant(
    client: &reqwest::Client,
    spec: &GrantSpec,
) -> CliResult<ConnectGrantResponse> {
    let service = issuer_url();
    let url = format!("{service}/v1/connect-grants");
    let body = json!({
        "tool_id": spec.tool_id,
        "requested_scopes": spec.scopes,
        "requested_limits": {
            "rpm": spec.rpm,
            "dailyQuota": spec.daily,
            "concurrency": spec.concurrency,
        },
        "workspace": {"name": spec.workspace_name},
        "nonce": random_token(),
    });
    let response = client
        .post(&url)
        .header(AGENT_KEY_HEADER, agent_key())
        .json(&body)
        .send()
        .await
        .map_err(|err| CliError::new(format!("issuer unreachable at {service}: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.json::<Value>().await.unwrap_or_else(|_| json!({}));
        return Err(CliError::new(format!("grant request failed: HTTP {status} {detail}")));
    }
    response
        .json::<ConnectGrantResponse>()
        .await
        .map_err(|err| CliError::new(format!("grant response malformed: {err}")))
}

// ============================================================================
// SECTION: Connect Flow
// ============================================================================

/// Options for the connect flow.
pub(crate) struct ConnectOptions {
    /// Base URL of the tool.
    pub tool_base_url: String,
    /// Workspace name to provision.
    pub name: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Requested requests per minute.
    pub rpm: u32,
    /// Requested daily quota.
    pub daily: u32,
    /// Requested concurrency.
    pub concurrency: u32,
    /// Reuse this grant instead of requesting a fresh one.
    pub reuse_grant: Option<String>,
    /// Write the returned credentials to this JSON file.
    pub save: Option<PathBuf>,
}

/// Runs the full connect flow and prints the outcome.
pub(crate) async fn connect(options: &ConnectOptions) -> CliResult<ConnectResult> {
    let client = http_client()?;
    write_stdout_line(&format!("Discovering tool at {}...", options.tool_base_url))?;
    let discovery = discover(&client, &options.tool_base_url).await?;
    write_stdout_line(&format!("  tool: {} ({})", discovery.tool_name, discovery.tool_id))?;
    write_stdout_line(&format!("  plan: {}", discovery.default_plan_id))?;

    let connect_grant = if let Some(grant) = &options.reuse_grant {
        write_stdout_line("Reusing provided grant (replay test)...")?;
        grant.clone()
    } else {
        write_stdout_line("Requesting connect grant...")?;
        let grant = request_grant(
            &client,
            &GrantSpec {
                tool_id: discovery.tool_id.to_string(),
                scopes: options.scopes.clone(),
                rpm: options.rpm,
                daily: options.daily,
                concurrency: options.concurrency,
                workspace_name: options.name.clone(),
            },
        )
        .await?;
        write_stdout_line(&format!("  grant issued (expires in {}s)", grant.expires_in))?;
        grant.connect_grant
    };

    let idempotency_key = random_token();
    write_stdout_line(&format!("Connecting (idempotency key {idempotency_key})..."))?;
    let url = format!("{}{}", options.tool_base_url, discovery.connect_endpoint);
    let response = client
        .post(&url)
        .bearer_auth(&connect_grant)
        .header(discovery.idempotency.header.as_str(), &idempotency_key)
        .send()
        .await
        .map_err(|err| CliError::new(format!("connect unreachable at {url}: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.json::<Value>().await.unwrap_or_else(|_| json!({}));
        return Err(CliError::new(format!("connect failed: HTTP {status} {detail}")));
    }
    let result = response
        .json::<ConnectResult>()
        .await
        .map_err(|err| CliError::new(format!("connect response malformed: {err}")))?;

    write_stdout_line("Connected.")?;
    write_stdout_line(&format!("  workspace: {}", result.tool_workspace_id))?;
    write_stdout_line(&format!("  agent:     {}", result.tool_agent_id))?;
    write_stdout_line(&format!("  api key:   {}", result.credentials.api_key))?;
    write_stdout_line(&format!("  scopes:    {}", result.applied_scopes.join(", ")))?;
    write_stdout_line(&format!(
        "  limits:    rpm={} daily={} concurrency={}",
        result.applied_limits.rpm,
        result.applied_limits.daily_quota,
        result.applied_limits.concurrency
    ))?;

    if let Some(path) = &options.save {
        save_credentials(path, &options.tool_base_url, &result)?;
        write_stdout_line(&format!("Credentials saved to {}", path.display()))?;
    }
    Ok(result)
}

/// Writes the returned credentials to a JSON file keyed by tool URL.
fn save_credentials(path: &Path, tool_base_url: &str, result: &ConnectResult) -> CliResult<()> {
    let mut store: Value = match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|_| json!({})),
        Err(_) => json!({}),
    };
    let entry = json!({
        "tool_workspace_id": result.tool_workspace_id,
        "tool_agent_id": result.tool_agent_id,
        "api_key": result.credentials.api_key,
        "applied_scopes": result.applied_scopes,
        "applied_limits": result.applied_limits,
    });
    if let Some(map) = store.as_object_mut() {
        map.insert(tool_base_url.to_string(), entry);
    }
    let rendered = serde_json::to_string_pretty(&store)
        .map_err(|err| CliError::new(format!("credentials serialization failed: {err}")))?;
    fs::write(path, rendered)
        .map_err(|err| CliError::new(format!("credentials write failed: {err}")))
}

// ============================================================================
// SECTION: Demo Flow
// ============================================================================

/// Connects to the demo tool, then calls its protected deploy endpoint.
pub(crate) async fn demo(tool_base_url: &str) -> CliResult<()> {
    write_stdout_line("Step 1: connect (signup or login)")?;
    let result = connect(&ConnectOptions {
        tool_base_url: tool_base_url.to_string(),
        name: "Demo Workspace".to_string(),
        scopes: vec!["read".to_string(), "deploy".to_string()],
        rpm: 60,
        daily: 500,
        concurrency: 1,
        reuse_grant: None,
        save: None,
    })
    .await?;

    write_stdout_line("Step 2: call the tool API with the returned credential")?;
    let client = http_client()?;
    let url = format!("{tool_base_url}/deploy");
    let response = client
        .post(&url)
        .bearer_auth(&result.credentials.api_key)
        .send()
        .await
        .map_err(|err| CliError::new(format!("deploy unreachable at {url}: {err}")))?;
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or_else(|_| json!({}));
    if !status.is_success() {
        return Err(CliError::new(format!("deploy call failed: HTTP {status} {body}")));
    }
    write_stdout_line(&format!("Deploy succeeded: {body}"))?;
    write_stdout_line("Summary: agent connected, workspace created, API call works")?;
    Ok(())
}
