//! proxy_fetch tool implementation.
//!
//! Dispatches a fetch event through the worker, exactly as a controlled
//! page would, and reports where the response came from.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::resolve;
use shelter_core::{Error, Request};

use super::json_result;
use crate::agent::Agent;

/// Input parameters for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// URL to fetch. Root-relative paths resolve against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Treat the request as a top-level page navigation (default: false).
    #[serde(default)]
    pub navigate: Option<bool>,
}

/// Output structure for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchOutput {
    /// Resolved request URL.
    pub url: String,
    /// HTTP status of the response.
    pub status: u16,
    /// One of network, cache, offline or fallback.
    pub source: String,
    pub content_type: Option<String>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    /// Body length in bytes.
    pub bytes: usize,
    pub headers: Vec<(String, String)>,
}

/// Implementation of the proxy_fetch tool.
pub async fn fetch_impl(agent: &Agent, params: ProxyFetchParams) -> Result<CallToolResult, McpError> {
    let origin = &agent.proxy.config().origin;
    let url = resolve(origin, &params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;

    let method = params.method.as_deref().map(str::trim).unwrap_or("GET");
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::InvalidInput(format!("invalid method: {method:?}")).into());
    }

    let request = if params.navigate.unwrap_or(false) { Request::navigate(url) } else { Request::get(url) };
    let request = request.with_method(method);
    let requested = request.url.to_string();

    let routed = agent.scope.fetch(request).await?;
    tracing::info!(url = %requested, status = routed.response.status, source = %routed.source, "proxy fetch");

    let response = routed.response;
    let output = ProxyFetchOutput {
        url: requested,
        status: response.status,
        source: routed.source.to_string(),
        content_type: response.content_type().map(str::to_string),
        body: response.text(),
        bytes: response.body.len(),
        headers: response.headers,
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::*;
    use crate::tools::output_json;

    fn params(url: &str) -> ProxyFetchParams {
        ProxyFetchParams { url: url.into(), method: None, navigate: None }
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let fx = fixture("v1");

        let out = output_json(&fetch_impl(&fx.agent, params("/login")).await.unwrap());
        assert_eq!(out["source"], "network");
        assert_eq!(out["body"], "/login");
    }

    #[tokio::test]
    async fn test_fetch_cached_page_offline() {
        let fx = fixture("v1");
        fx.agent.start().await;
        fx.network.go_offline();

        let out = output_json(&fetch_impl(&fx.agent, params(&url("/login").to_string())).await.unwrap());
        assert_eq!(out["source"], "cache");
        assert_eq!(out["status"], 200);
        assert_eq!(out["url"], "http://localhost:5000/login");
    }

    #[tokio::test]
    async fn test_fetch_api_offline() {
        let fx = fixture("v1");
        fx.agent.start().await;
        fx.network.go_offline();

        let out = output_json(&fetch_impl(&fx.agent, params("/api/data")).await.unwrap());
        assert_eq!(out["source"], "offline");
        assert_eq!(out["content_type"], "application/json");
        assert_eq!(out["body"], r#"{"offline":true}"#);
    }

    #[tokio::test]
    async fn test_fetch_navigation_fallback() {
        let fx = fixture("v1");
        fx.agent.start().await;
        fx.network.go_offline();

        let p = ProxyFetchParams { url: "/patients/7".into(), method: None, navigate: Some(true) };
        let out = output_json(&fetch_impl(&fx.agent, p).await.unwrap());
        assert_eq!(out["source"], "fallback");
        assert_eq!(out["body"], "/");
    }

    #[tokio::test]
    async fn test_fetch_subresource_miss_offline_errors() {
        let fx = fixture("v1");
        fx.agent.start().await;
        fx.network.go_offline();

        let err = fetch_impl(&fx.agent, params("/static/app.js")).await.unwrap_err();
        assert!(err.message.starts_with("NO_RESPONSE"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_input() {
        let fx = fixture("v1");

        let err = fetch_impl(&fx.agent, params("ftp://example.com/file")).await.unwrap_err();
        assert!(err.message.starts_with("INVALID_URL"));

        let p = ProxyFetchParams { url: "/".into(), method: Some("GE T".into()), navigate: None };
        let err = fetch_impl(&fx.agent, p).await.unwrap_err();
        assert!(err.message.starts_with("INVALID_INPUT"));
    }
}
