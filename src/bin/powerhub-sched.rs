//! Charge-window scheduler: loads a policy file, connects to the hub it
//! names, and drives port modes to match the active windows.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tokio::sync::mpsc;

use powerhub::hub::HubClient;
use powerhub::schedule::{SchedulePolicy, Scheduler};

#[derive(Parser)]
#[command(name = "powerhub-sched", about = "Enforce timed charge windows on a USB power hub")]
struct Args {
    /// Path to the TOML policy file
    #[arg(short, long)]
    policy: PathBuf,

    /// Seconds between evaluation passes
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    /// Run a single pass and exit (for cron-driven setups)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let policy = SchedulePolicy::load(&args.policy)
        .with_context(|| format!("loading policy {}", args.policy.display()))?;
    let device = policy.hub.device.clone();
    let settings = policy.hub_settings();

    let client = Arc::new(
        HubClient::connect(&device, settings)
            .await
            .with_context(|| format!("connecting to hub '{}'", device))?,
    );
    policy
        .validate(client.port_count())
        .context("policy does not match the connected hub")?;

    let scheduler = Scheduler::new(
        client.clone(),
        policy,
        Duration::from_secs(args.interval_secs),
    );

    if args.once {
        let report = scheduler.tick(Local::now().time()).await;
        log::info!(
            "Pass complete: {} checked, {} corrected, {} failed",
            report.checked,
            report.corrected,
            report.failed
        );
    } else {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(()).await;
            }
        });
        scheduler.run(stop_rx).await;
    }

    if let Err(e) = client.disconnect().await {
        log::warn!("Disconnect failed: {}", e);
    }
    Ok(())
}
