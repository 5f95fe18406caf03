//! Scripted serial link for exercising the hub client without
//! hardware. A script is an ordered list of expected commands and the
//! reply each one gets; any deviation panics the test.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use powerhub::hub::{HubClient, HubSettings};
use powerhub::serial::{Result, SerialError, SerialLink};

pub enum Reply {
    /// Raw reply lines, exactly as the device would print them
    /// (command echo and trailing prompt included).
    Lines(Vec<String>),
    /// No reply at all; the next read times out.
    Timeout,
}

struct Exchange {
    expect: String,
    reply: Reply,
    /// When set, the first read of this exchange parks until notified.
    gate: Option<Arc<Notify>>,
}

pub struct ScriptedLink {
    script: VecDeque<Exchange>,
    pending: VecDeque<String>,
    timeout_next: bool,
    gate: Option<Arc<Notify>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            pending: VecDeque::new(),
            timeout_next: false,
            gate: None,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Expect `command` and reply with echo, `payload` lines and the
    /// prompt.
    pub fn expect(mut self, command: &str, payload: &[&str]) -> Self {
        let mut lines = vec![command.to_string()];
        lines.extend(payload.iter().map(|s| s.to_string()));
        lines.push(">>".to_string());
        self.script.push_back(Exchange {
            expect: command.to_string(),
            reply: Reply::Lines(lines),
            gate: None,
        });
        self
    }

    /// Expect `command` and let its read time out instead of replying.
    pub fn expect_timeout(mut self, command: &str) -> Self {
        self.script.push_back(Exchange {
            expect: command.to_string(),
            reply: Reply::Timeout,
            gate: None,
        });
        self
    }

    /// Like `expect`, but the reply is held back until `gate` is
    /// notified. Used to keep the connection occupied mid-command.
    pub fn expect_gated(mut self, command: &str, payload: &[&str], gate: Arc<Notify>) -> Self {
        let mut lines = vec![command.to_string()];
        lines.extend(payload.iter().map(|s| s.to_string()));
        lines.push(">>".to_string());
        self.script.push_back(Exchange {
            expect: command.to_string(),
            reply: Reply::Lines(lines),
            gate: Some(gate),
        });
        self
    }

    /// Prepend the connect-time `state` probe for an idle `port_count`
    /// port hub (all ports off, nothing attached).
    pub fn with_handshake(self, port_count: u8) -> Self {
        let rows: Vec<String> = (1..=port_count).map(idle_row).collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        self.expect("state", &refs)
    }

    /// Shared log of every command written, surviving the move of the
    /// link into the client.
    pub fn write_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.writes.clone()
    }
}

#[async_trait]
impl SerialLink for ScriptedLink {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writes.lock().unwrap().push(line.to_string());
        let exchange = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command written: '{}'", line));
        assert_eq!(line, exchange.expect, "command out of script order");
        self.gate = exchange.gate;
        match exchange.reply {
            Reply::Lines(lines) => self.pending.extend(lines),
            Reply::Timeout => self.timeout_next = true,
        }
        Ok(())
    }

    async fn read_line(&mut self, _deadline: Duration) -> Result<String> {
        if let Some(gate) = self.gate.take() {
            gate.notified().await;
        }
        if self.timeout_next {
            self.timeout_next = false;
            return Err(SerialError::Timeout);
        }
        self.pending.pop_front().ok_or(SerialError::Timeout)
    }
}

/// An idle `state` row for `port`: no current, detached, mode off.
pub fn idle_row(port: u8) -> String {
    format!("{}, 0, 0000 D O, 0, 0, x, 0.00", port)
}

/// Connect a client over `link` with default settings.
pub async fn connect(link: ScriptedLink) -> HubClient {
    HubClient::from_link("TESTHUB", Box::new(link), HubSettings::default())
        .await
        .unwrap()
}

/// Connect with a zero staleness budget, so the mode cache never
/// short-circuits a command.
pub async fn connect_uncached(link: ScriptedLink) -> HubClient {
    let settings = HubSettings {
        cache_staleness: Duration::ZERO,
        ..HubSettings::default()
    };
    HubClient::from_link("TESTHUB", Box::new(link), settings)
        .await
        .unwrap()
}
