//! cache_keys tool implementation.
//!
//! Lists cache generations, and optionally the entry URLs of one of them.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_core::{Error, GenerationInfo};

use super::super::json_result;
use crate::agent::Agent;

/// Parameters for the cache_keys tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysParams {
    /// Generation whose entry URLs should be listed.
    #[serde(default)]
    pub generation: Option<String>,
}

/// Output from the cache_keys tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysOutput {
    /// Generation the proxy installs into.
    pub current: String,
    /// Every generation in the store with its entry count.
    pub generations: Vec<GenerationInfo>,
    /// Entry URLs of the requested generation, sorted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<String>>,
}

/// Implementation of the cache_keys tool.
pub async fn keys_impl(agent: &Agent, params: CacheKeysParams) -> Result<CallToolResult, McpError> {
    let storage = agent.proxy.storage();
    let generations = storage.generations().await?;

    let entries = match params.generation {
        Some(name) => {
            if !generations.iter().any(|g| g.name == name) {
                return Err(Error::InvalidInput(format!("unknown generation: {name}")).into());
            }
            Some(storage.entry_urls(&name).await?)
        }
        None => None,
    };

    let output = CacheKeysOutput { current: agent.proxy.version().to_string(), generations, entries };
    json_result(&output)
}
