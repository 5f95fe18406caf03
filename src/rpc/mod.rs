//! Remote adapter: republishes the hub client's operations to network
//! callers as newline-delimited JSON over TCP. Failure kinds cross the
//! wire unchanged, so remote callers see the same taxonomy local ones
//! do — including `busy` when they lose the race for the connection.

pub mod server;

pub use server::serve;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::hub::{HubClient, HubError};
use crate::serial::PortMode;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, kind: &str, message: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                kind: kind.to_string(),
                message,
            }),
        }
    }
}

#[derive(Deserialize)]
struct SetModeParams {
    mode: PortMode,
    port: u8,
}

#[derive(Deserialize)]
struct ModeParams {
    mode: PortMode,
}

#[derive(Deserialize)]
struct PortParams {
    port: u8,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, HubError> {
    serde_json::from_value(params).map_err(|e| HubError::InvalidArgument(e.to_string()))
}

/// Route one request to the hub client. Unknown methods and parameter
/// shape errors come back as typed error responses, never as a dropped
/// connection.
pub async fn dispatch(client: &HubClient, request: RpcRequest) -> RpcResponse {
    let id = request.id;

    let outcome: Result<Value, HubError> = match request.method.as_str() {
        "ping" => Ok(json!("pong")),
        "port_count" => Ok(json!(client.port_count())),
        "set_mode" => {
            let p: SetModeParams = match parse_params(request.params) {
                Ok(p) => p,
                Err(e) => return RpcResponse::err(id, e.kind(), e.to_string()),
            };
            client.set_mode(p.mode, p.port).await.map(|_| Value::Null)
        }
        "set_mode_all" => {
            let p: ModeParams = match parse_params(request.params) {
                Ok(p) => p,
                Err(e) => return RpcResponse::err(id, e.kind(), e.to_string()),
            };
            client.set_mode_all(p.mode).await.map(|_| Value::Null)
        }
        "show_state" => {
            let p: PortParams = match parse_params(request.params) {
                Ok(p) => p,
                Err(e) => return RpcResponse::err(id, e.kind(), e.to_string()),
            };
            client
                .show_state(p.port)
                .await
                .map(|state| serde_json::to_value(state).unwrap_or(Value::Null))
        }
        "show_all" => client
            .show_all()
            .await
            .map(|states| serde_json::to_value(states).unwrap_or(Value::Null)),
        "system_info" => client.system_info().await.map(Value::String),
        "health" => client.health().await.map(Value::String),
        "limits" => client.limits().await.map(Value::String),
        "clear_error_flags" => client.clear_error_flags().await.map(|_| Value::Null),
        "clear_rebooted_flag" => client.clear_rebooted_flag().await.map(|_| Value::Null),
        "reboot" => client.reboot().await.map(|_| Value::Null),
        "reboot_watchdog" => client.reboot_watchdog().await.map(|_| Value::Null),
        other => {
            return RpcResponse::err(id, "unknown_method", format!("unknown method '{}'", other))
        }
    };

    match outcome {
        Ok(result) => RpcResponse::ok(id, result),
        Err(e) => RpcResponse::err(id, e.kind(), e.to_string()),
    }
}
