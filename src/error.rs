//! Unified error types for the simulator client.
//!
//! Every fallible client operation funnels into [`ClientError`]; adapters
//! report channel problems as [`TransportError`], which converts into
//! `ClientError::Transport`.  Errors are confined to the future of the
//! command that produced them and never tear down the engine.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level client error
// ---------------------------------------------------------------------------

/// Every fallible client operation resolves to this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A command result did not have the expected shape.
    Validation(String),
    /// The remote answered the command with its error flag set.
    Remote { code: i64, message: String },
    /// An uncorrelated `error` message was attributed to this command.
    Api(String),
    /// The engine was closed before the command could be sent.
    Closed,
    /// The transport refused to carry the command.
    Transport(TransportError),
    /// The channel went away while the command was outstanding.
    TransportLost(String),
    /// A payload could not be serialised or deserialised.
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Remote { code, message } => write!(f, "Error {code}: {message}"),
            Self::Api(msg) => write!(f, "api: {msg}"),
            Self::Closed => write!(f, "client closed"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::TransportLost(msg) => write!(f, "transport lost: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel has been closed (locally or by the peer).
    Closed,
    /// The outbound queue is full; the message was dropped.
    QueueFull,
    /// The channel could not be established.
    Unavailable(String),
    /// The underlying link failed.
    Io(String),
    /// A frame could not be built or parsed.
    Frame(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "channel closed"),
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::Unavailable(msg) => write!(f, "channel unavailable: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Frame(msg) => write!(f, "bad frame: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Client-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ClientError>;
