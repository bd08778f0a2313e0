// crates/agentpi-tool/src/discovery.rs
// ============================================================================
// Module: AgentPI Discovery Publisher
// Description: Stateless derivation of the tool's capability document.
// Purpose: Tell agents what the tool offers before they request a grant.
// Dependencies: agentpi-core, crate::config
// ============================================================================

//! ## Overview
//! The discovery document is fully derived from configuration on every call;
//! nothing is cached, so configuration changes are visible immediately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use agentpi_core::core::types::AGENTPI_VERSION;
use agentpi_core::core::types::DiscoveryDocument;
use agentpi_core::core::types::IdempotencyContract;
use agentpi_core::core::types::PlanInfo;

use crate::config::ToolConfig;

// ============================================================================
// SECTION: Document Derivation
// ============================================================================

/// Derives the discovery document from the current configuration.
#[must_use]
pub fn discovery_document(config: &ToolConfig) -> DiscoveryDocument {
    DiscoveryDocument {
        agentpi_version: AGENTPI_VERSION.to_string(),
        tool_id: config.tool_id.clone(),
        tool_name: config.tool_name.clone(),
        connect_endpoint: config.connect_endpoint.clone(),
        plans: vec![PlanInfo {
            plan_id: config.plan_id.clone(),
            max_limits: config.max_limits,
            scopes_allowed: config.max_scopes.clone(),
        }],
        default_plan_id: config.plan_id.clone(),
        default_limits: config.max_limits,
        idempotency: IdempotencyContract {
            header: config.idempotency_header.clone(),
            ttl_seconds: config.idempotency_ttl_seconds,
        },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
