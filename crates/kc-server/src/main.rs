//! # Keycloak resource registry node
//!
//! Loads configuration from the environment, or from the TOML file given
//! as the first argument, and runs a registry node until shut down.

#![forbid(unsafe_code)]

use kc_core::Config;
use kc_server::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kc_core::init_tracing("info")?;

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    tracing::info!(node_id = %config.node.node_id, "Keycloak resource registry starting");

    let node = Node::build(&config).await?;
    node.run().await
}
