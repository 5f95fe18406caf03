pub mod client;
pub mod models;

pub use client::HubClient;
pub use models::{HubSettings, PortState};

use crate::serial::{ProtocolError, SerialError};

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("No hub matching '{0}' is present")]
    DeviceNotFound(String),

    #[error("Hub not connected")]
    NotConnected,

    #[error("Another command is in flight")]
    Busy,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Hub rejected port {port}")]
    UnsupportedPort { port: u8 },

    #[error("Hub reported error E{code:03}: {reason}")]
    Device {
        code: u16,
        reason: String,
        fatal: bool,
    },

    #[error("Serial communication error: {0}")]
    Serial(#[from] SerialError),
}

impl From<ProtocolError> for HubError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidArgument(msg) => HubError::InvalidArgument(msg),
        }
    }
}

impl HubError {
    /// Stable failure-kind label handed to remote callers.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::DeviceNotFound(_) => "device_not_found",
            HubError::NotConnected => "not_connected",
            HubError::Busy => "busy",
            HubError::InvalidArgument(_) => "invalid_argument",
            HubError::Malformed(_) => "malformed_response",
            HubError::UnsupportedPort { .. } => "unsupported_port",
            HubError::Device { .. } => "device_error",
            HubError::Serial(SerialError::Timeout) => "timeout",
            HubError::Serial(_) => "serial_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
