//! MCP surface of the offline agent.
use std::sync::Arc;

use crate::agent::Agent;
use crate::tools::cache::{CacheActivateParams, CacheInstallParams, CacheKeysParams, activate_impl, install_impl, keys_impl};
use crate::tools::proxy_fetch::{ProxyFetchParams, fetch_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for shelter.
#[derive(Clone)]
pub struct ShelterServer {
    agent: Arc<Agent>,
    tool_router: ToolRouter<Self>,
}

/// The four agent tools. Each one forwards to its `*_impl` function in
/// `crate::tools`.
#[tool_router]
impl ShelterServer {
    /// Create a new server handler around a running agent.
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Populate the current cache generation from the manifest. All URLs are cached or none are. Retries a failed install."
    )]
    async fn cache_install(&self, params: Parameters<CacheInstallParams>) -> Result<CallToolResult, McpError> {
        install_impl(&self.agent, params.0).await
    }

    #[tool(description = "Activate the installed worker: delete every stale cache generation, then claim open clients.")]
    async fn cache_activate(&self, params: Parameters<CacheActivateParams>) -> Result<CallToolResult, McpError> {
        activate_impl(&self.agent, params.0).await
    }

    /// Route a request through the worker.
    ///
    /// Paths under the API prefix go network-first with an offline marker;
    /// everything else goes cache-first with a navigation fallback to `/`.
    #[tool(
        description = "Fetch a URL through the offline proxy. Returns status, headers, body and the response source (network, cache, offline, fallback)."
    )]
    async fn proxy_fetch(&self, params: Parameters<ProxyFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.agent, params.0).await
    }

    #[tool(description = "List cache generations with entry counts, and optionally the entry URLs of one generation.")]
    async fn cache_keys(&self, params: Parameters<CacheKeysParams>) -> Result<CallToolResult, McpError> {
        keys_impl(&self.agent, params.0).await
    }
}

impl ServerHandler for ShelterServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shelter".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
