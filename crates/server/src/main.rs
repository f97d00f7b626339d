//! shelter server entry point.
//!
//! Loads configuration, starts the offline agent and serves it as MCP tools
//! on stdio. Logging goes to stderr to avoid interfering with the JSON-RPC
//! protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shelter_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod agent;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.cache_version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "Starting shelter server on stdio transport"
    );

    let agent = Arc::new(agent::Agent::from_config(&config).await?);
    agent.start().await;

    let handler = handler::ShelterServer::new(agent);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
