//! cache_activate tool implementation.
//!
//! Dispatches the activate event: stale generations are deleted and open
//! clients are claimed.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_core::GenerationInfo;

use super::super::json_result;
use crate::agent::Agent;

/// Parameters for the cache_activate tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheActivateParams {}

/// Output from the cache_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheActivateOutput {
    /// Current generation.
    pub version: String,
    /// Worker lifecycle state after the call.
    pub state: String,
    /// Stale generations removed by this activation.
    pub deleted: Vec<String>,
    /// Stale generations that could not be removed.
    pub failed: Vec<String>,
    /// Clients now controlled by this worker.
    pub claimed: usize,
    /// Generations left in the store.
    pub generations: Vec<GenerationInfo>,
}

/// Implementation of the cache_activate tool.
pub async fn activate_impl(agent: &Agent, _params: CacheActivateParams) -> Result<CallToolResult, McpError> {
    agent.scope.activate().await?;
    let report = agent.proxy.last_activate().await.unwrap_or_default();

    let output = CacheActivateOutput {
        version: agent.proxy.version().to_string(),
        state: agent.scope.state().await.to_string(),
        deleted: report.deleted,
        failed: report.failed,
        claimed: report.claimed,
        generations: agent.proxy.storage().generations().await?,
    };
    json_result(&output)
}
