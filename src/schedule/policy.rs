//! Declarative charge-window policy.
//!
//! A policy file names the hub and lists time windows per port:
//!
//! ```toml
//! [hub]
//! device = "DQ3VZ8JF"
//!
//! [[window]]
//! port = 1
//! start = "09:00"
//! end = "17:00"
//! mode = "charge"
//! ```
//!
//! A policy is loaded wholesale and immutable for the run; reloading
//! replaces it, never patches it in place.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer};

use crate::hub::HubSettings;
use crate::serial::PortMode;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Cannot read policy file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse policy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Window {index}: {reason}")]
    InvalidWindow { index: usize, reason: String },

    #[error("Window {index} targets port {port}, but the hub has {port_count} ports")]
    UnknownPort {
        index: usize,
        port: u8,
        port_count: u8,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubSection {
    /// USB serial number or device path of the hub.
    pub device: String,
    #[serde(default)]
    pub baud: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// One `[[window]]` entry: force `port` to `mode` while the wall-clock
/// time is inside `[start, end)`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeWindow {
    pub port: u8,
    #[serde(deserialize_with = "deserialize_time")]
    pub start: NaiveTime,
    #[serde(deserialize_with = "deserialize_time")]
    pub end: NaiveTime,
    pub mode: PortMode,
}

impl ChargeWindow {
    /// Half-open containment. A window with `start > end` wraps past
    /// midnight (covers `[start, 24:00)` and `[00:00, end)`); a window
    /// with `start == end` covers nothing.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulePolicy {
    pub hub: HubSection,
    #[serde(default, rename = "window")]
    pub windows: Vec<ChargeWindow>,
}

impl SchedulePolicy {
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let policy: SchedulePolicy = toml::from_str(text)?;
        for (index, window) in policy.windows.iter().enumerate() {
            if window.port == 0 {
                return Err(PolicyError::InvalidWindow {
                    index,
                    reason: "port numbering starts at 1".to_string(),
                });
            }
        }
        Ok(policy)
    }

    /// Reject windows that target ports the connected hub does not
    /// have. Run once after connecting, before the first tick.
    pub fn validate(&self, port_count: u8) -> Result<(), PolicyError> {
        for (index, window) in self.windows.iter().enumerate() {
            if window.port > port_count {
                return Err(PolicyError::UnknownPort {
                    index,
                    port: window.port,
                    port_count,
                });
            }
        }
        Ok(())
    }

    /// Desired mode per port at instant `t`. When windows overlap for
    /// the same port, the entry declared later in the file wins;
    /// overlapping windows are a configuration mistake the scheduler
    /// resolves deterministically instead of rejecting. Ports with no
    /// covering window are absent from the map and left untouched.
    pub fn desired_modes(&self, t: NaiveTime) -> BTreeMap<u8, PortMode> {
        let mut desired = BTreeMap::new();
        for window in &self.windows {
            if window.contains(t) {
                desired.insert(window.port, window.mode);
            }
        }
        desired
    }

    /// Hub connection settings, file values over defaults.
    pub fn hub_settings(&self) -> HubSettings {
        let mut settings = HubSettings::default();
        if let Some(baud) = self.hub.baud {
            settings.baud_rate = baud;
        }
        if let Some(secs) = self.hub.timeout_secs {
            settings.read_timeout = Duration::from_secs(secs);
        }
        settings
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`.
fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&text, "%H:%M:%S"))
        .map_err(|_| {
            serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", text))
        })
}
