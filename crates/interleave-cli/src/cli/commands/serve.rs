//! Serve command handler.

use std::sync::Arc;

use anyhow::{Context, Result};
use interleave_core::config::Config;
use interleave_core::core::Agent;
use interleave_server::AppState;

pub async fn run(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let host = config.server.host.clone();
    let port = config.server.port;

    let agent = Agent::from_config(config).context("create agent")?;
    tracing::info!(tools = ?agent.registry().tool_names(), "agent ready");

    interleave_server::run(AppState::new(Arc::new(agent)), &host, port).await
}
