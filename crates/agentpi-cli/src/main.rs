// crates/agentpi-cli/src/main.rs
// ============================================================================
// Module: AgentPI CLI Entry Point
// Description: Command dispatcher for client flows and local demo services.
// Purpose: Drive discover/grant/connect/demo/verify and serve demo services.
// Dependencies: agentpi-core, agentpi-issuer, agentpi-tool, clap, reqwest, tokio
// ============================================================================

//! ## Overview
//! The AgentPI CLI exercises the connect protocol from the agent's side
//! (discover a tool, obtain a grant, redeem it, verify conformance) and can
//! run the two demo services locally: the issuing authority and an example
//! tool with an in-memory provisioner.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod demo_tool;
mod flows;
mod verify;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use agentpi_issuer::GrantIssuer;
use agentpi_issuer::IssuerConfig;
use agentpi_keys::KeyManager;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

use crate::demo_tool::DemoToolOptions;
use crate::flows::ConnectOptions;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Top-level CLI arguments.
#[derive(Debug, Parser)]
#[command(name = "agentpi", version, about = "AgentPI connect protocol client and demo services")]
struct Cli {
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch and print a tool's discovery document.
    Discover(DiscoverCommand),
    /// Request a connect grant from the issuing authority.
    Grant(GrantCommand),
    /// Run the connect flow against a tool.
    Connect(ConnectCommand),
    /// Connect, then exercise the issued credential against the demo tool.
    Demo(DemoCommand),
    /// Run protocol conformance checks against a tool.
    Verify(VerifyCommand),
    /// Issuing authority service commands.
    Issuer {
        /// Issuer subcommand.
        #[command(subcommand)]
        command: IssuerCommands,
    },
    /// Demo tool service commands.
    Tool {
        /// Tool subcommand.
        #[command(subcommand)]
        command: ToolCommands,
    },
}

/// Arguments for the `discover` command.
#[derive(Debug, Args)]
struct DiscoverCommand {
    /// Base URL of the tool.
    tool_base_url: String,
}

/// Arguments for the `grant` command.
#[derive(Debug, Args)]
struct GrantCommand {
    /// Tool identifier the grant should be scoped to.
    #[arg(long, default_value = "tool_example")]
    tool_id: String,
    /// Comma-separated requested scopes.
    #[arg(long, default_value = "read,deploy")]
    scopes: String,
    /// Requested requests per minute.
    #[arg(long, default_value_t = 60)]
    rpm: u32,
    /// Requested daily quota.
    #[arg(long, default_value_t = 500)]
    daily: u32,
    /// Requested concurrency.
    #[arg(long, default_value_t = 1)]
    concurrency: u32,
    /// Workspace name.
    #[arg(long, default_value = "My Workspace")]
    name: String,
}

/// Arguments for the `connect` command.
#[derive(Debug, Args)]
struct ConnectCommand {
    /// Base URL of the tool.
    tool_base_url: String,
    /// Workspace name.
    #[arg(long, default_value = "My Workspace")]
    name: String,
    /// Comma-separated requested scopes.
    #[arg(long, default_value = "read,deploy")]
    scopes: String,
    /// Requested requests per minute.
    #[arg(long, default_value_t = 60)]
    rpm: u32,
    /// Requested daily quota.
    #[arg(long, default_value_t = 500)]
    daily: u32,
    /// Requested concurrency.
    #[arg(long, default_value_t = 1)]
    concurrency: u32,
    /// Reuse a specific grant JWT (for replay testing).
    #[arg(long)]
    grant: Option<String>,
    /// Write the returned credentials to this JSON file.
    #[arg(long)]
    save: Option<PathBuf>,
}

/// Arguments for the `demo` command.
#[derive(Debug, Args)]
struct DemoCommand {
    /// Base URL of the demo tool.
    tool_base_url: String,
}

/// Arguments for the `verify` command.
#[derive(Debug, Args)]
struct VerifyCommand {
    /// Base URL of the tool under test.
    tool_base_url: String,
}

/// Issuer service subcommands.
#[derive(Debug, Subcommand)]
enum IssuerCommands {
    /// Run the issuing authority HTTP service.
    Serve(IssuerServeCommand),
}

/// Arguments for `issuer serve`.
#[derive(Debug, Args)]
struct IssuerServeCommand {
    /// Path to the issuer TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Pre-shared agent credential, overriding file and environment.
    #[arg(long)]
    agent_key: Option<String>,
}

/// Demo tool subcommands.
#[derive(Debug, Subcommand)]
enum ToolCommands {
    /// Run the example tool HTTP service with an in-memory provisioner.
    Serve(ToolServeCommand),
}

/// Arguments for `tool serve`.
#[derive(Debug, Args)]
struct ToolServeCommand {
    /// Bind address for the tool service.
    #[arg(long, default_value = "127.0.0.1:4011")]
    bind: String,
    /// Tool identifier to serve as.
    #[arg(long, default_value = "tool_example")]
    tool_id: String,
    /// Comma-separated allowed scopes.
    #[arg(long, default_value = "read,deploy,write")]
    scopes: String,
    /// Maximum requests per minute.
    #[arg(long, default_value_t = 120)]
    rpm: u32,
    /// Maximum daily quota.
    #[arg(long, default_value_t = 1_000)]
    daily: u32,
    /// Maximum concurrency.
    #[arg(long, default_value_t = 5)]
    concurrency: u32,
    /// Expected grant issuer.
    #[arg(long)]
    issuer: Option<String>,
    /// Issuer JWKS URL.
    #[arg(long)]
    jwks_url: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failure carrying a user-facing message.
#[derive(Debug)]
pub(crate) struct CliError {
    /// Message shown on stderr.
    message: String,
}

impl CliError {
    /// Builds a CLI error from any displayable message.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// Result alias for CLI command handlers.
pub(crate) type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Discover(command) => command_discover(command).await,
        Commands::Grant(command) => command_grant(command).await,
        Commands::Connect(command) => command_connect(command).await,
        Commands::Demo(command) => command_demo(command).await,
        Commands::Verify(command) => command_verify(command).await,
        Commands::Issuer {
            command: IssuerCommands::Serve(command),
        } => command_issuer_serve(command).await,
        Commands::Tool {
            command: ToolCommands::Serve(command),
        } => command_tool_serve(command).await,
    }
}

// ============================================================================
// SECTION: Client Commands
// ============================================================================

/// Executes the `discover` command.
async fn command_discover(command: DiscoverCommand) -> CliResult<ExitCode> {
    let client = flows::http_client()?;
    let doc = flows::discover(&client, &command.tool_base_url).await?;
    let rendered = serde_json::to_string_pretty(&doc)
        .map_err(|err| CliError::new(format!("discovery serialization failed: {err}")))?;
    write_stdout_line(&rendered)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `grant` command.
async fn command_grant(command: GrantCommand) -> CliResult<ExitCode> {
    let client = flows::http_client()?;
    let response = flows::request_grant(
        &client,
        &flows::GrantSpec {
            tool_id: command.tool_id,
            scopes: split_scopes(&command.scopes),
            rpm: command.rpm,
            daily: command.daily,
            concurrency: command.concurrency,
            workspace_name: command.name,
        },
    )
    .await?;
    write_stdout_line(&response.connect_grant)?;
    write_stdout_line(&format!("expires_in: {}s", response.expires_in))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `connect` command.
async fn command_connect(command: ConnectCommand) -> CliResult<ExitCode> {
    flows::connect(&ConnectOptions {
        tool_base_url: trim_base_url(&command.tool_base_url),
        name: command.name,
        scopes: split_scopes(&command.scopes),
        rpm: command.rpm,
        daily: command.daily,
        concurrency: command.concurrency,
        reuse_grant: command.grant,
        save: command.save,
    })
    .await?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `demo` command.
async fn command_demo(command: DemoCommand) -> CliResult<ExitCode> {
    flows::demo(&trim_base_url(&command.tool_base_url)).await?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `verify` command.
async fn command_verify(command: VerifyCommand) -> CliResult<ExitCode> {
    verify::verify(&trim_base_url(&command.tool_base_url)).await
}

// ============================================================================
// SECTION: Service Commands
// ============================================================================

/// Executes the `issuer serve` command.
async fn command_issuer_serve(command: IssuerServeCommand) -> CliResult<ExitCode> {
    let config =
        IssuerConfig::load_with_agent_key(command.config.as_deref(), command.agent_key.as_deref())
            .map_err(|err| CliError::new(format!("issuer config load failed: {err}")))?;
    let keys = Arc::new(
        KeyManager::load_or_generate(&config.keys_dir)
            .map_err(|err| CliError::new(format!("key manager startup failed: {err}")))?,
    );
    write_stdout_line(&format!(
        "AgentPI issuer listening on {} (kid {})",
        config.bind,
        keys.kid()
    ))?;
    let bind = config.bind.clone();
    let issuer = GrantIssuer::new(config, Arc::clone(&keys));
    let router = agentpi_issuer::router(issuer, keys);
    agentpi_issuer::serve(&bind, router)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `tool serve` command.
async fn command_tool_serve(command: ToolServeCommand) -> CliResult<ExitCode> {
    let options = DemoToolOptions {
        tool_id: command.tool_id,
        scopes: split_scopes(&command.scopes),
        rpm: command.rpm,
        daily: command.daily,
        concurrency: command.concurrency,
        issuer: command.issuer,
        jwks_url: command.jwks_url,
    };
    let router = demo_tool::router(options).map_err(CliError::new)?;
    write_stdout_line(&format!("AgentPI demo tool listening on {}", command.bind))?;
    agentpi_tool::serve(&command.bind, router)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Argument Helpers
// ============================================================================

/// Splits a comma-separated scope list, dropping empty entries.
fn split_scopes(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|scope| !scope.is_empty()).map(String::from).collect()
}

/// Strips a trailing slash from a base URL.
fn trim_base_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
pub(crate) fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("stdout write failed: {err}")))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
}

/// Reports a fatal error and returns the failure exit code.
fn emit_error(message: &str) -> ExitCode {
    write_stderr_line(&format!("error: {message}"));
    ExitCode::FAILURE
}
