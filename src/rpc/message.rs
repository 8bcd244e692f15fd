//! Channel message shapes.
//!
//! Every unit crossing the channel is one JSON object tagged by `type`:
//!
//! ```text
//! {type:"command",  id, command, params}        client → remote
//! {type:"response", id, error, result}          remote → client
//! {type:"event",    event, payload, nanos}      remote → client
//! {type:"hello",    protocolVersion}            remote → client
//! {type:"error",    message}                    remote → client
//! ```
//!
//! Correlation ids travel as decimal strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the event the remote emits whenever simulated time stops.
pub const PAUSE_EVENT: &str = "sim:pause";

/// One message on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelMessage {
    Command(CommandMessage),
    Response(ResponseMessage),
    Event(EventMessage),
    Hello(HelloMessage),
    Error(ErrorMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub result: Value,
}

/// Unsolicited notification from the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub nanos: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
}

/// Uncorrelated failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// Error body carried in `result` when a response has `error: true`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl RemoteErrorBody {
    /// Read `{code, message}` from an error response's `result`; a result
    /// of any other shape becomes the message text with code 0.
    pub fn from_result(result: &Value) -> Self {
        serde_json::from_value(result.clone()).unwrap_or_else(|_| Self {
            code: 0,
            message: match result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
    }
}

impl EventMessage {
    /// Pause point named by a `sim:pause` payload, if any.
    pub fn pause_point_id(&self) -> Option<&str> {
        self.payload.get("pausePoint").and_then(Value::as_str)
    }

    /// Information attached to the pause point that fired (`null` if absent).
    pub fn pause_point_info(&self) -> Value {
        self.payload
            .get("pausePointInfo")
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl From<ErrorMessage> for ChannelMessage {
    fn from(m: ErrorMessage) -> Self {
        Self::Error(m)
    }
}

impl From<EventMessage> for ChannelMessage {
    fn from(m: EventMessage) -> Self {
        Self::Event(m)
    }
}

impl From<ResponseMessage> for ChannelMessage {
    fn from(m: ResponseMessage) -> Self {
        Self::Response(m)
    }
}

impl From<HelloMessage> for ChannelMessage {
    fn from(m: HelloMessage) -> Self {
        Self::Hello(m)
    }
}

impl From<CommandMessage> for ChannelMessage {
    fn from(m: CommandMessage) -> Self {
        Self::Command(m)
    }
}
