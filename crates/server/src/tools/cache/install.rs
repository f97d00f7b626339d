//! cache_install tool implementation.
//!
//! Populates the current cache generation from the manifest. A worker that
//! never installed, or whose install failed, goes through the full install
//! event; an installed worker re-populates its generation in place. Calls
//! made while an install or activate is running are rejected.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::WorkerState;
use shelter_core::Error;

use super::super::json_result;
use crate::agent::Agent;

/// Parameters for the cache_install tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheInstallParams {
    /// Activate right after a first or retried install (default: true).
    #[serde(default)]
    pub activate: Option<bool>,
}

/// Output from the cache_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInstallOutput {
    /// Generation that was populated.
    pub version: String,
    /// Number of entries stored in it.
    pub cached: usize,
    /// Worker lifecycle state after the call.
    pub state: String,
}

/// Implementation of the cache_install tool.
pub async fn install_impl(agent: &Agent, params: CacheInstallParams) -> Result<CallToolResult, McpError> {
    let version = agent.proxy.version().to_string();

    let state = agent.scope.state().await;
    let cached = match state {
        WorkerState::Parsed | WorkerState::Redundant => {
            agent.scope.install().await?;
            if params.activate.unwrap_or(true) && !agent.scope.is_waiting().await {
                agent.scope.activate().await?;
            }
            agent.proxy.storage().entry_urls(&version).await?.len()
        }
        WorkerState::Installed | WorkerState::Activated => agent.proxy.install().await?.cached,
        WorkerState::Installing | WorkerState::Activating => {
            return Err(Error::InvalidState {
                expected: "parsed, redundant, installed or activated".into(),
                actual: state.to_string(),
            }
            .into());
        }
    };

    let output = CacheInstallOutput { version, cached, state: agent.scope.state().await.to_string() };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use shelter_core::CacheStorage;

    use super::*;
    use crate::agent::testing::*;
    use crate::tools::output_json;

    #[tokio::test]
    async fn test_install_from_parsed_activates() {
        let fx = fixture("v1");

        let result = install_impl(&fx.agent, CacheInstallParams::default()).await.unwrap();
        let out = output_json(&result);

        assert_eq!(out["version"], "v1");
        assert_eq!(out["cached"], 3);
        assert_eq!(out["state"], "activated");
    }

    #[tokio::test]
    async fn test_install_without_activate() {
        let fx = fixture("v1");

        let params = CacheInstallParams { activate: Some(false) };
        let out = output_json(&install_impl(&fx.agent, params).await.unwrap());

        assert_eq!(out["state"], "installed");
    }

    #[tokio::test]
    async fn test_install_retries_after_failure() {
        let fx = fixture("v1");
        fx.network.fail("/static/logo.png");
        fx.agent.start().await;
        assert_eq!(fx.agent.scope.state().await, WorkerState::Redundant);

        let err = install_impl(&fx.agent, CacheInstallParams::default()).await.unwrap_err();
        assert!(err.message.starts_with("INSTALL_FAILED"));

        fx.network.recover();
        let out = output_json(&install_impl(&fx.agent, CacheInstallParams::default()).await.unwrap());
        assert_eq!(out["cached"], 3);
        assert_eq!(out["state"], "activated");
    }

    #[tokio::test]
    async fn test_install_when_active_repopulates() {
        let fx = fixture("v1");
        fx.agent.start().await;

        let out = output_json(&install_impl(&fx.agent, CacheInstallParams::default()).await.unwrap());
        assert_eq!(out["cached"], 3);
        assert_eq!(out["state"], "activated");
    }

    #[tokio::test]
    async fn test_install_rejected_while_install_runs() {
        let fx = fixture("v1");
        let hold = fx.network.hold().await;

        let agent = fx.agent.clone();
        let start = tokio::spawn(async move { agent.start().await });
        while fx.agent.scope.state().await != WorkerState::Installing {
            tokio::task::yield_now().await;
        }

        let err = install_impl(&fx.agent, CacheInstallParams::default()).await.unwrap_err();
        assert!(err.message.starts_with("INVALID_STATE"));
        assert!(fx.storage.entry_urls("v1").await.unwrap().is_empty());

        drop(hold);
        start.await.unwrap();
        assert_eq!(fx.agent.scope.state().await, WorkerState::Activated);
        assert_eq!(fx.agent.proxy.last_install().await.unwrap().cached, 3);
    }
}
