//! Encoders and decoders for the hub's line-oriented command protocol.
//!
//! Commands are short ASCII words with numeric arguments (`mode c 3`,
//! `state 1`); every reply ends with the `>>` prompt and starts with an
//! echo of the command. This module is pure: encoding validates its
//! arguments before producing a wire string, and decoding classifies
//! any input line without ever failing.

use serde::{Deserialize, Serialize};

/// Prompt the hub prints after every reply.
pub const PROMPT: &str = ">>";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Power/data mode of one hub port. The wire vocabulary is fixed by
/// the vendor: `O` off, `C` charge, `S` sync, `B` sync+charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortMode {
    Off,
    Charge,
    Sync,
    SyncCharge,
}

impl PortMode {
    /// Lowercase letter used as the `mode` command argument.
    pub fn wire_letter(self) -> char {
        match self {
            PortMode::Off => 'o',
            PortMode::Charge => 'c',
            PortMode::Sync => 's',
            PortMode::SyncCharge => 'b',
        }
    }

    /// Decode the mode letter from a state-row flags field. The hub
    /// reports charging ports with a phase letter (`P` profiling, `I`
    /// idle, `C` charging, `F` finished), all of which are charge
    /// mode. Unknown letters decode to `None`, never to a guess.
    pub fn from_flag_letter(letter: char) -> Option<PortMode> {
        match letter {
            'O' => Some(PortMode::Off),
            'S' => Some(PortMode::Sync),
            'B' => Some(PortMode::SyncCharge),
            'C' | 'P' | 'I' | 'F' => Some(PortMode::Charge),
            _ => None,
        }
    }
}

impl std::fmt::Display for PortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PortMode::Off => "off",
            PortMode::Charge => "charge",
            PortMode::Sync => "sync",
            PortMode::SyncCharge => "sync_charge",
        };
        write!(f, "{}", name)
    }
}

/// One decoded `state` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortStateRow {
    pub port: u8,
    pub mode: PortMode,
    pub attached: bool,
    pub current_ma: u32,
    pub profile_id: u32,
    pub time_charging_s: u32,
    /// `None` when the hub reports `x` (not yet charged).
    pub time_charged_s: Option<u32>,
    pub energy_wh: f64,
}

/// Classification of one reply line. Decoding is total: unparseable
/// input lands in `Other`, which the client surfaces as a malformed
/// response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseLine {
    Blank,
    Prompt,
    State(PortStateRow),
    DeviceError {
        code: u16,
        reason: String,
        fatal: bool,
    },
    Other(String),
}

fn check_port(port: u8, port_count: u8) -> std::result::Result<(), ProtocolError> {
    if port == 0 || port > port_count {
        return Err(ProtocolError::InvalidArgument(format!(
            "port {} out of range [1, {}]",
            port, port_count
        )));
    }
    Ok(())
}

/// Encode a `mode` command for one port, or for all ports when `port`
/// is `None`. Validates before encoding; an invalid pair never
/// produces a wire command.
pub fn encode_set_mode(
    mode: PortMode,
    port: Option<u8>,
    port_count: u8,
) -> std::result::Result<String, ProtocolError> {
    match port {
        Some(p) => {
            check_port(p, port_count)?;
            Ok(format!("mode {} {}", mode.wire_letter(), p))
        }
        None => Ok(format!("mode {}", mode.wire_letter())),
    }
}

/// Encode a `state` query for one port.
pub fn encode_query_state(
    port: u8,
    port_count: u8,
) -> std::result::Result<String, ProtocolError> {
    check_port(port, port_count)?;
    Ok(format!("state {}", port))
}

/// Encode the all-ports `state` query. The number of rows in the reply
/// is the hub's port count, which is how `connect` learns it.
pub fn encode_query_count() -> String {
    "state".to_string()
}

pub fn encode_system() -> String {
    "system".to_string()
}

pub fn encode_health() -> String {
    "health".to_string()
}

pub fn encode_limits() -> String {
    "limits".to_string()
}

/// Clear the latched error flags reported by `health`.
pub fn encode_clear_error_flags() -> String {
    "cef".to_string()
}

/// Clear the rebooted flag set after every firmware restart.
pub fn encode_clear_rebooted_flag() -> String {
    "crf".to_string()
}

pub fn encode_reboot() -> String {
    "reboot".to_string()
}

/// Hard reset via the watchdog instead of the normal firmware path.
pub fn encode_reboot_watchdog() -> String {
    "reboot watchdog".to_string()
}

/// Classify one reply line. Never fails; anything unrecognized is
/// `ResponseLine::Other`.
pub fn decode_line(raw: &str) -> ResponseLine {
    let line = raw.trim();

    if line.is_empty() {
        return ResponseLine::Blank;
    }
    if line.starts_with(PROMPT) {
        return ResponseLine::Prompt;
    }
    if line.starts_with('*') {
        if let Some(resp) = parse_error_line(line) {
            return resp;
        }
        return ResponseLine::Other(line.to_string());
    }
    if let Some(row) = parse_state_row(line) {
        return ResponseLine::State(row);
    }
    ResponseLine::Other(line.to_string())
}

/// Parse `*Ennn: reason` and `*FATAL ... Ennn: reason` error lines.
fn parse_error_line(line: &str) -> Option<ResponseLine> {
    let body = line.strip_prefix('*')?;
    let fatal = body.starts_with("FATAL");

    // The code marker is an `E` followed by exactly three digits and a
    // colon. Earlier `E`s are prose (`*FATAL ERROR E102: ...`), so
    // every candidate is tried, not just the first.
    for (pos, _) in body.match_indices('E') {
        let after_e = &body[pos + 1..];
        let digits: String = after_e.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() != 3 {
            continue;
        }
        let rest = &after_e[digits.len()..];
        let reason = match rest.strip_prefix(':') {
            Some(r) => r.trim(),
            None => continue,
        };
        if reason.is_empty() {
            return None;
        }
        let code: u16 = digits.parse().ok()?;
        return Some(ResponseLine::DeviceError {
            code,
            reason: reason.to_string(),
            fatal,
        });
    }
    None
}

/// Parse one comma-separated state row:
/// `port, current_ma, flags, profile_id, time_charging, time_charged, energy`.
/// The flags field is space-separated with the attach flag and mode
/// letter last, e.g. `0000 D O`.
fn parse_state_row(line: &str) -> Option<PortStateRow> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 7 {
        return None;
    }

    let port: u8 = fields[0].parse().ok()?;
    let current_ma: u32 = fields[1].parse().ok()?;

    let flags: Vec<&str> = fields[2].split_whitespace().collect();
    if flags.len() < 2 {
        return None;
    }
    let mode_letter = flags[flags.len() - 1];
    let attach_letter = flags[flags.len() - 2];
    if mode_letter.len() != 1 {
        return None;
    }
    let mode = PortMode::from_flag_letter(mode_letter.chars().next()?)?;
    let attached = match attach_letter {
        "A" => true,
        "D" => false,
        _ => return None,
    };

    let profile_id: u32 = fields[3].parse().ok()?;
    let time_charging_s: u32 = fields[4].parse().ok()?;
    let time_charged_s = match fields[5] {
        "x" => None,
        v => Some(v.parse().ok()?),
    };
    let energy_wh: f64 = fields[6].parse().ok()?;

    Some(PortStateRow {
        port,
        mode,
        attached,
        current_ma,
        profile_id,
        time_charging_s,
        time_charged_s,
        energy_wh,
    })
}
