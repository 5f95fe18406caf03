use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serial::{PortMode, PortStateRow};
use crate::serial::transport::DEFAULT_BAUD_RATE;

/// Last-observed state of one hub port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortState {
    pub port: u8,
    pub mode: PortMode,
    pub attached: bool,
    pub current_ma: u32,
    pub profile_id: u32,
    pub time_charging_s: u32,
    pub time_charged_s: Option<u32>,
    pub energy_wh: f64,
    pub observed_at: DateTime<Utc>,
}

impl PortState {
    pub fn from_row(row: PortStateRow) -> Self {
        Self {
            port: row.port,
            mode: row.mode,
            attached: row.attached,
            current_ma: row.current_ma,
            profile_id: row.profile_id,
            time_charging_s: row.time_charging_s,
            time_charged_s: row.time_charged_s,
            energy_wh: row.energy_wh,
            observed_at: Utc::now(),
        }
    }
}

/// Connection settings for one hub.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub baud_rate: u32,
    /// Per-line read deadline; every transport wait is bounded by it.
    pub read_timeout: Duration,
    /// How long a cached port mode may short-circuit a `set_mode`
    /// no-op. The cache is never trusted for reads.
    pub cache_staleness: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(5),
            cache_staleness: Duration::from_secs(2),
        }
    }
}
