//! Message codec and length-prefix frame codec.
//!
//! Messages are JSON text.  Byte-oriented links carry them in frames:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ JSON payload (N B)       │
//! │ LE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The frame decoder accumulates incoming bytes and yields complete
//! payloads.  This handles partial reads gracefully — a single read may
//! return part of the header, part of the payload, or several frames
//! concatenated.

use crate::error::TransportError;

use super::message::ChannelMessage;

/// Frame header size (4-byte little-endian length).
const HEADER_SIZE: usize = 4;

/// Default maximum payload size (protects against memory exhaustion).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

// ── JSON ─────────────────────────────────────────────────────

/// Serialise a message to its JSON text form.
pub fn encode_message(message: &ChannelMessage) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(|e| TransportError::Frame(e.to_string()))
}

/// Parse one message from JSON bytes.
pub fn decode_message(payload: &[u8]) -> Result<ChannelMessage, TransportError> {
    serde_json::from_slice(payload).map_err(|e| TransportError::Frame(e.to_string()))
}

// ── Framing ──────────────────────────────────────────────────

/// Decoder state machine.
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading payload.
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
    max_frame_size: usize,
    /// Frames dropped for a zero or oversize length.
    rejected: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Vec::new(),
            max_frame_size,
            rejected: 0,
        }
    }

    /// Feed bytes into the decoder.
    ///
    /// Returns every frame payload completed by `data`, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let needed = HEADER_SIZE - *collected;
                    let to_copy = needed.min(data.len() - offset);

                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);

                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;

                        if expected == 0 || expected > self.max_frame_size {
                            // Invalid frame — reset.
                            self.rejected = self.rejected.saturating_add(1);
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }

                        self.payload_buf.clear();
                        self.payload_buf.reserve(expected);
                        self.state = DecoderState::ReadingPayload { expected };
                    }
                }

                DecoderState::ReadingPayload { expected } => {
                    let needed = *expected - self.payload_buf.len();
                    let to_copy = needed.min(data.len() - offset);

                    self.payload_buf
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload_buf.len() == *expected {
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        frames.push(core::mem::take(&mut self.payload_buf));
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after the link reconnects).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
    }

    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a payload into a length-prefixed frame.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>, TransportError> {
    if payload.is_empty() || payload.len() > max_frame_size {
        return Err(TransportError::Frame(format!(
            "payload of {} bytes outside 1..={}",
            payload.len(),
            max_frame_size
        )));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| TransportError::Frame("payload exceeds u32 length".into()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}
