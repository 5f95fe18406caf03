//! Client for one hub's serial command interface.
//!
//! The client owns the single serial connection and enforces the wire
//! protocol's one-command-at-a-time discipline: every operation takes
//! the connection via `try_lock`, and a caller that loses the race
//! gets `HubError::Busy` immediately instead of queueing behind a
//! possibly hung device call.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::serial::{
    protocol, PortMode, PortStateRow, ResponseLine, SerialConnection, SerialError, SerialLink,
};

use super::{HubError, HubSettings, PortState, Result};

struct CacheEntry {
    mode: PortMode,
    refreshed: Instant,
}

struct ClientInner {
    link: Option<Box<dyn SerialLink>>,
    cache: HashMap<u8, CacheEntry>,
    settings: HubSettings,
}

pub struct HubClient {
    identifier: String,
    port_count: u8,
    inner: Mutex<ClientInner>,
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("identifier", &self.identifier)
            .field("port_count", &self.port_count)
            .finish_non_exhaustive()
    }
}

impl HubClient {
    /// Resolve `identifier` (USB serial number or device path) to a
    /// serial device, open it and probe the hub for its port count.
    pub async fn connect(identifier: &str, settings: HubSettings) -> Result<Self> {
        let path = SerialConnection::resolve_identifier(identifier).map_err(|e| match e {
            SerialError::PortNotFound(_) => HubError::DeviceNotFound(identifier.to_string()),
            other => HubError::Serial(other),
        })?;
        let connection = SerialConnection::open(&path, settings.baud_rate)?;
        Self::from_link(identifier, Box::new(connection), settings).await
    }

    /// Build a client over an already-open link. This is how tests
    /// substitute a scripted transport; the handshake is identical to
    /// `connect`.
    pub async fn from_link(
        identifier: &str,
        link: Box<dyn SerialLink>,
        settings: HubSettings,
    ) -> Result<Self> {
        let mut inner = ClientInner {
            link: Some(link),
            cache: HashMap::new(),
            settings,
        };

        // One all-ports state probe; the row count is the port count.
        let lines = inner.exchange(&protocol::encode_query_count()).await?;
        check_device_error(&lines, None)?;
        let rows = state_rows(lines)?;
        if rows.is_empty() {
            return Err(HubError::Malformed(
                "state probe returned no port rows".to_string(),
            ));
        }
        let port_count = u8::try_from(rows.len()).map_err(|_| {
            HubError::Malformed(format!("state probe returned {} port rows", rows.len()))
        })?;
        for row in &rows {
            inner.remember_mode(row.port, row.mode);
        }

        log::info!(
            "Connected to hub '{}' with {} ports",
            identifier,
            port_count
        );

        Ok(Self {
            identifier: identifier.to_string(),
            port_count,
            inner: Mutex::new(inner),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn port_count(&self) -> u8 {
        self.port_count
    }

    /// Set one port's mode. Out-of-range ports are rejected before any
    /// wire traffic. A fresh cache entry already at the target mode
    /// short-circuits the command (reissuing would be a no-op); a
    /// timeout is retried exactly once (the command is idempotent);
    /// device-reported rejections are surfaced immediately.
    pub async fn set_mode(&self, mode: PortMode, port: u8) -> Result<()> {
        let command = protocol::encode_set_mode(mode, Some(port), self.port_count)?;
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;

        if inner.cached_mode_is_fresh(port, mode) {
            log::debug!("Port {} already in mode {}, skipping command", port, mode);
            return Ok(());
        }

        log::info!("Setting port {} mode to {}", port, mode);
        let lines = inner.exchange_with_retry(&command).await?;
        check_device_error(&lines, Some(port))?;
        expect_empty_reply(lines)?;
        inner.remember_mode(port, mode);
        Ok(())
    }

    /// Set every port to `mode`. No cache short-circuit: the all-ports
    /// form is used exactly when the caller wants the whole hub forced.
    pub async fn set_mode_all(&self, mode: PortMode) -> Result<()> {
        let command = protocol::encode_set_mode(mode, None, self.port_count)?;
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;

        log::info!("Setting all {} ports to mode {}", self.port_count, mode);
        let lines = inner.exchange_with_retry(&command).await?;
        check_device_error(&lines, None)?;
        expect_empty_reply(lines)?;
        for port in 1..=self.port_count {
            inner.remember_mode(port, mode);
        }
        Ok(())
    }

    /// Query one port's live state. Always issues a fresh query; the
    /// cache is only refreshed from the reply, never consulted.
    pub async fn show_state(&self, port: u8) -> Result<PortState> {
        let command = protocol::encode_query_state(port, self.port_count)?;
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;

        let lines = inner.exchange(&command).await?;
        check_device_error(&lines, Some(port))?;
        let mut rows = state_rows(lines)?;
        if rows.len() != 1 || rows[0].port != port {
            return Err(HubError::Malformed(format!(
                "expected one state row for port {}, got {}",
                port,
                rows.len()
            )));
        }
        let row = rows.remove(0);
        inner.remember_mode(row.port, row.mode);
        Ok(PortState::from_row(row))
    }

    /// Query the live state of every port.
    pub async fn show_all(&self) -> Result<Vec<PortState>> {
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;

        let lines = inner.exchange(&protocol::encode_query_count()).await?;
        check_device_error(&lines, None)?;
        let rows = state_rows(lines)?;
        for row in &rows {
            inner.remember_mode(row.port, row.mode);
        }
        Ok(rows.into_iter().map(PortState::from_row).collect())
    }

    /// Hardware and firmware report, as printed by the hub.
    pub async fn system_info(&self) -> Result<String> {
        self.text_command(&protocol::encode_system()).await
    }

    /// Voltages, temperature, error and boot flags.
    pub async fn health(&self) -> Result<String> {
        self.text_command(&protocol::encode_health()).await
    }

    /// Per-port and total current limits, as printed by the hub.
    pub async fn limits(&self) -> Result<String> {
        self.text_command(&protocol::encode_limits()).await
    }

    /// Clear the latched error flags shown by `health`.
    pub async fn clear_error_flags(&self) -> Result<()> {
        self.flag_command(&protocol::encode_clear_error_flags()).await
    }

    /// Clear the rebooted flag shown by `health`.
    pub async fn clear_rebooted_flag(&self) -> Result<()> {
        self.flag_command(&protocol::encode_clear_rebooted_flag()).await
    }

    /// Reboot the hub firmware. The serial link usually drops mid-
    /// reply, so a timeout here counts as success.
    pub async fn reboot(&self) -> Result<()> {
        self.reboot_command(&protocol::encode_reboot()).await
    }

    /// Hard reset via the watchdog, for firmware hangs a plain reboot
    /// does not recover from.
    pub async fn reboot_watchdog(&self) -> Result<()> {
        self.reboot_command(&protocol::encode_reboot_watchdog()).await
    }

    async fn reboot_command(&self, command: &str) -> Result<()> {
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;

        log::info!("Rebooting hub '{}' ({})", self.identifier, command);
        match inner.exchange(command).await {
            Ok(lines) => check_device_error(&lines, None)?,
            Err(HubError::Serial(SerialError::Timeout)) => {}
            Err(e) => return Err(e),
        }
        inner.cache.clear();
        Ok(())
    }

    async fn flag_command(&self, command: &str) -> Result<()> {
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;
        let lines = inner.exchange(command).await?;
        check_device_error(&lines, None)?;
        expect_empty_reply(lines)
    }

    /// Release the serial handle. Idempotent: disconnecting twice is a
    /// no-op. The handle is also released when the client is dropped.
    pub async fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;
        if inner.link.take().is_some() {
            log::info!("Disconnected from hub '{}'", self.identifier);
        }
        inner.cache.clear();
        Ok(())
    }

    async fn text_command(&self, command: &str) -> Result<String> {
        let mut inner = self.inner.try_lock().map_err(|_| HubError::Busy)?;
        let lines = inner.exchange(command).await?;
        check_device_error(&lines, None)?;

        let mut report = Vec::new();
        for line in lines {
            match line {
                ResponseLine::Other(text) => report.push(text),
                ResponseLine::State(row) => {
                    return Err(HubError::Malformed(format!(
                        "unexpected state row for port {}",
                        row.port
                    )))
                }
                _ => {}
            }
        }
        Ok(report.join("\n"))
    }
}

impl ClientInner {
    /// One request/response exchange: write the command, then read and
    /// decode lines until the hub's prompt. The command echo is
    /// skipped; blank lines are dropped.
    async fn exchange(&mut self, command: &str) -> Result<Vec<ResponseLine>> {
        let deadline = self.settings.read_timeout;
        let link = self.link.as_mut().ok_or(HubError::NotConnected)?;

        link.write_line(command).await?;

        let mut lines = Vec::new();
        let mut echo_skipped = false;
        loop {
            let raw = link.read_line(deadline).await?;
            if !echo_skipped && raw.trim() == command {
                echo_skipped = true;
                continue;
            }
            match protocol::decode_line(&raw) {
                ResponseLine::Prompt => break,
                ResponseLine::Blank => continue,
                line => lines.push(line),
            }
        }
        Ok(lines)
    }

    /// Exchange with a single bounded retry on timeout. Only used for
    /// the idempotent `mode` command; reads are never retried.
    async fn exchange_with_retry(&mut self, command: &str) -> Result<Vec<ResponseLine>> {
        match self.exchange(command).await {
            Err(HubError::Serial(SerialError::Timeout)) => {
                log::warn!("Command '{}' timed out, retrying once", command);
                self.exchange(command).await
            }
            other => other,
        }
    }

    fn cached_mode_is_fresh(&self, port: u8, mode: PortMode) -> bool {
        self.cache
            .get(&port)
            .map(|entry| {
                entry.mode == mode && entry.refreshed.elapsed() <= self.settings.cache_staleness
            })
            .unwrap_or(false)
    }

    fn remember_mode(&mut self, port: u8, mode: PortMode) {
        self.cache.insert(
            port,
            CacheEntry {
                mode,
                refreshed: Instant::now(),
            },
        );
    }
}

/// Map the first device-reported error line, if any. Rejections whose
/// reason reads as a port/parameter range problem become
/// `UnsupportedPort` when the failing port is known.
fn check_device_error(lines: &[ResponseLine], port: Option<u8>) -> Result<()> {
    for line in lines {
        if let ResponseLine::DeviceError {
            code,
            reason,
            fatal,
        } = line
        {
            let lowered = reason.to_lowercase();
            if let Some(port) = port {
                if lowered.contains("out of range") || lowered.contains("invalid port") {
                    return Err(HubError::UnsupportedPort { port });
                }
            }
            return Err(HubError::Device {
                code: *code,
                reason: reason.clone(),
                fatal: *fatal,
            });
        }
    }
    Ok(())
}

/// Collect the state rows of a reply, rejecting any line that decoded
/// to neither a row nor an already-handled classification.
fn state_rows(lines: Vec<ResponseLine>) -> Result<Vec<PortStateRow>> {
    let mut rows = Vec::new();
    for line in lines {
        match line {
            ResponseLine::State(row) => rows.push(row),
            ResponseLine::Other(text) => return Err(HubError::Malformed(text)),
            _ => {}
        }
    }
    Ok(rows)
}

/// A `mode` command acknowledges with nothing but echo and prompt.
fn expect_empty_reply(lines: Vec<ResponseLine>) -> Result<()> {
    for line in lines {
        match line {
            ResponseLine::Other(text) => return Err(HubError::Malformed(text)),
            ResponseLine::State(row) => {
                return Err(HubError::Malformed(format!(
                    "unexpected state row for port {}",
                    row.port
                )))
            }
            _ => {}
        }
    }
    Ok(())
}
