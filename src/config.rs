//! Client configuration parameters
//!
//! All tunable parameters of one engine instance.  Embedders usually take
//! the defaults; the struct is serde-enabled so it can be loaded from a
//! JSON settings blob.

use serde::{Deserialize, Serialize};

/// Wire protocol version this client speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Core client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    // --- Protocol ---
    /// Version expected in the remote's `hello` message
    pub protocol_version: u32,
    /// Prefix of generated pause-point ids (`pp` gives `pp0_time-relative`)
    pub pause_point_prefix: String,

    // --- Diagnostics ---
    /// Remote endpoint label used in connection-loss reports
    pub server: Option<String>,

    // --- Failure policy ---
    /// Reject every outstanding command when the channel closes unexpectedly
    pub reject_pending_on_close: bool,

    // --- Stream transport ---
    /// Largest accepted frame payload in bytes
    pub max_frame_size: usize,
    /// Idle poll interval of the stream reader (milliseconds)
    pub read_poll_interval_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            pause_point_prefix: "pp".into(),
            server: None,
            reject_pending_on_close: false,
            max_frame_size: 1024 * 1024, // 1 MiB
            read_poll_interval_ms: 1,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON settings blob; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pause_point_prefix.contains('_') {
            return Err(ConfigError::ValidationFailed(
                "pause_point_prefix must not contain '_'",
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::ValidationFailed("max_frame_size must be > 0"));
        }
        if self.max_frame_size > u32::MAX as usize {
            return Err(ConfigError::ValidationFailed(
                "max_frame_size must fit the 32-bit length prefix",
            ));
        }
        if self.read_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "read_poll_interval_ms must be > 0",
            ));
        }
        Ok(())
    }

    /// Label for the remote side in diagnostics.
    pub fn target(&self) -> &str {
        self.server.as_deref().unwrap_or("transport")
    }
}

/// Errors from loading a [`ClientConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The settings blob is not valid JSON for this struct.
    Parse(String),
    /// A field failed range validation.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "config parse failed: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
