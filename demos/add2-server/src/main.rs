//! add2-server — sample external consumer of rpc-server.
//!
//! Registers a single `add2` procedure: `data1 = lhs + rhs`, where
//! `lhs = payload.data1` and `rhs = payload.data2[0]`.

use anyhow::{Context, Result};
use rpc_core::config::ServerConfig;
use rpc_core::Payload;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load().context("failed to load server config")?;
    tracing::info!(port = config.port, "add2-server starting");

    let server = rpc_server::Server::init(&config)
        .await
        .context("failed to initialize listen socket")?;

    server
        .register("add2", |p: &Payload| {
            let lhs = p.data1;
            let rhs = p.data2().map(|b| b[0] as i32).unwrap_or(0);
            Some(Payload::new(lhs + rhs))
        })
        .context("failed to register add2")?;

    tracing::info!(port = server.local_addr()?.port(), "add2-server listening");
    server.serve_all().await
}
