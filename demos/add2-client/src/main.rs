//! add2-client — sample external consumer of rpc-client.
//!
//! Connects to an add2-server, finds the `add2` procedure, and calls it
//! with operands taken from the command line (`lhs rhs`, defaulting to
//! `0 100`), printing the result.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use rpc_client::Client;
use rpc_core::{payload_free, Payload};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "::1".to_string());
    let port: u16 = args
        .next()
        .unwrap_or_else(|| "0".to_string())
        .parse()
        .context("port must be a u16")?;
    let lhs: i32 = args.next().unwrap_or_else(|| "0".to_string()).parse()?;
    let rhs: i32 = args.next().unwrap_or_else(|| "100".to_string()).parse()?;

    let mut client = Client::connect(&addr, port)
        .await
        .with_context(|| format!("failed to connect to {addr}:{port}"))?;

    let handle = client
        .find("add2")
        .await
        .context("find failed")?
        .context("server has no procedure named \"add2\"")?;

    let payload = Payload::with_blob(lhs, Bytes::from(vec![rhs as u8]));
    let response = match client.call(&handle, &payload).await.context("call failed")? {
        Some(p) => p,
        None => bail!("server returned a null response"),
    };

    tracing::info!(lhs, rhs, result = response.data1, "add2 call complete");
    println!("{} + {} = {}", lhs, rhs, response.data1);
    payload_free(response);

    client.close().await.context("failed to close connection")?;
    Ok(())
}
