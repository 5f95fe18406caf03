//! Periodic policy enforcement against the live hub.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::hub::{HubClient, Result};

use super::SchedulePolicy;

/// Outcome of one evaluation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Ports with a covering window at this instant.
    pub checked: usize,
    /// Ports whose observed mode differed and were corrected.
    pub corrected: usize,
    /// Ports whose check or correction failed.
    pub failed: usize,
}

pub struct Scheduler {
    client: Arc<HubClient>,
    policy: SchedulePolicy,
    interval: Duration,
}

impl Scheduler {
    pub fn new(client: Arc<HubClient>, policy: SchedulePolicy, interval: Duration) -> Self {
        Self {
            client,
            policy,
            interval,
        }
    }

    /// Tick until a stop signal arrives. Ticks are serialized: the
    /// next one starts only after the previous pass finished, and
    /// ticks that came due meanwhile are skipped, never stacked.
    pub async fn run(&self, mut stop_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "Scheduler started: {} windows, tick every {:?}",
            self.policy.windows.len(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    log::info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Local::now().time();
                    let report = self.tick(now).await;
                    log::debug!(
                        "Tick at {}: {} checked, {} corrected, {} failed",
                        now.format("%H:%M:%S"),
                        report.checked,
                        report.corrected,
                        report.failed
                    );
                }
            }
        }
    }

    /// One evaluation pass at wall-clock time `now`. A failure on one
    /// port is logged and does not abort corrections for the rest.
    pub async fn tick(&self, now: NaiveTime) -> TickReport {
        let desired = self.policy.desired_modes(now);
        let mut report = TickReport::default();

        for (port, mode) in desired {
            report.checked += 1;
            match self.apply(port, mode).await {
                Ok(true) => report.corrected += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    log::warn!("Port {} correction failed ({}): {}", port, e.kind(), e);
                }
            }
        }

        report
    }

    /// Correct one port if its observed mode differs from `mode`.
    /// Returns whether a correction command was issued.
    async fn apply(&self, port: u8, mode: crate::serial::PortMode) -> Result<bool> {
        let state = self.client.show_state(port).await?;
        if state.mode == mode {
            return Ok(false);
        }
        log::info!("Correcting port {}: {} -> {}", port, state.mode, mode);
        self.client.set_mode(mode, port).await?;
        Ok(true)
    }
}
