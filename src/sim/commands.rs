//! Command vocabulary of the simulator API.
//!
//! Names of the commands the remote understands, plus the typed
//! parameters of the ones that take more than a single field.

use serde::{Deserialize, Serialize};

pub const FILE_UPLOAD: &str = "file:upload";
pub const FILE_DOWNLOAD: &str = "file:download";
pub const SIM_START: &str = "sim:start";
pub const SIM_PAUSE: &str = "sim:pause";
pub const SIM_RESUME: &str = "sim:resume";
pub const SIM_RESTART: &str = "sim:restart";
pub const SIM_STATUS: &str = "sim:status";
pub const SERIAL_MONITOR_LISTEN: &str = "serial-monitor:listen";
pub const SERIAL_MONITOR_WRITE: &str = "serial-monitor:write";
pub const FRAMEBUFFER_READ: &str = "framebuffer:read";
pub const CONTROL_SET: &str = "control:set";
pub const PIN_READ: &str = "pin:read";
pub const PAUSE_POINT_ADD: &str = "pause-point:add";
pub const PAUSE_POINT_REMOVE: &str = "pause-point:remove";

/// Contents of a simulator file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// UTF-8 text, carried as-is.
    Text(String),
    /// Raw bytes, carried base64-encoded.
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for FileContent {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// Parameters of `sim:start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStartParams {
    /// Name of the uploaded firmware image.
    pub firmware: String,
    /// Name of the uploaded ELF with debug symbols, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elf: Option<String>,
    /// Load the firmware but leave simulated time stopped.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub pause: bool,
}

impl SimStartParams {
    pub fn new(firmware: impl Into<String>) -> Self {
        Self {
            firmware: firmware.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_elf(mut self, elf: impl Into<String>) -> Self {
        self.elf = Some(elf.into());
        self
    }

    #[must_use]
    pub fn paused(mut self) -> Self {
        self.pause = true;
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ResumeParams {
    #[serde(rename = "pauseAfter", skip_serializing_if = "Option::is_none")]
    pub pause_after: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ControlSetParams<'a> {
    pub part: &'a str,
    pub control: &'a str,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct PinReadParams<'a> {
    pub part: &'a str,
    pub pin: &'a str,
}
