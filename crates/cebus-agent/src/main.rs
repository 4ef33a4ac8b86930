//! # cebus Agent
//!
//! Agent for one managed cluster on the cebus topic bus.
//!
//! ## Behaviour
//!
//! 1. **Startup**: Broadcasts a resync request so every hub resends state
//! 2. **Ingress**: Receives hub events addressed to this cluster or to all
//! 3. **Status**: Answers status resync requests and sends heartbeats
//! 4. **Errors**: Logs transport and delivery failures as they arrive

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting cebus agent");

    // Load configuration
    let config = AgentConfig::from_env()?;

    let agent_id = config.agent_id_or_generate();
    tracing::info!(%agent_id, cluster_name = %config.cluster_name, "Agent initialized");

    let agent = Agent::new(config, agent_id)?;

    // Run agent
    agent.run().await?;

    Ok(())
}
