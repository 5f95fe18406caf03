//! Remote-server launcher: connects to one hub and republishes its
//! serial API over TCP RPC.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use powerhub::hub::{HubClient, HubSettings};
use powerhub::serial::transport::DEFAULT_BAUD_RATE;

#[derive(Parser)]
#[command(name = "powerhub-rpcd", about = "Expose a USB power hub's serial API over TCP")]
struct Args {
    /// Hub USB serial number or serial device path
    #[arg(short, long)]
    device: String,

    /// Address to bind the RPC listener on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the RPC listener on
    #[arg(long, default_value_t = 8200)]
    port: u16,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Serial read timeout in seconds
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = HubSettings {
        baud_rate: args.baud,
        read_timeout: Duration::from_secs(args.timeout_secs),
        ..HubSettings::default()
    };
    let client = Arc::new(
        HubClient::connect(&args.device, settings)
            .await
            .with_context(|| format!("connecting to hub '{}'", args.device))?,
    );

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("binding {}:{}", args.host, args.port))?;

    tokio::select! {
        res = powerhub::rpc::serve(listener, client.clone()) => {
            res.context("RPC server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutdown signal received");
        }
    }

    if let Err(e) = client.disconnect().await {
        log::warn!("Disconnect failed: {}", e);
    }
    Ok(())
}
