//! Transport abstraction — any bidirectional message channel.
//!
//! Concrete implementations:
//! - In-process message port to an embedded simulator
//!   ([`PortTransport`](crate::adapters::port_transport::PortTransport))
//! - Length-prefixed JSON over a byte link
//!   ([`StreamTransport`](crate::adapters::stream_transport::StreamTransport))
//!
//! The engine is generic over `Transport`, so adding a new channel
//! requires zero changes to the RPC logic.  Inbound traffic flows the
//! other way: the adapter is handed an [`Inbound`] sink and calls it for
//! every message, close and error it observes.  Adapters do not retry or
//! reconnect.

use std::rc::Weak;

use futures_lite::future::BoxedLocal;
use futures_lite::FutureExt;
use log::debug;

use crate::error::TransportError;

use super::engine::EngineShared;
use super::message::ChannelMessage;

/// Bidirectional message channel.
pub trait Transport {
    /// Install the sink for inbound messages, closes and errors.
    /// Called once, when the engine takes ownership of the adapter.
    fn attach(&mut self, inbound: Inbound);

    /// Future that completes once the channel is usable.
    fn connect(&mut self) -> BoxedLocal<Result<(), TransportError>>;

    /// Enqueue `message` for delivery.  Fire-and-forget: `Ok` means
    /// accepted, not delivered.
    fn send(&mut self, message: &ChannelMessage) -> Result<(), TransportError>;

    /// Terminate the channel.  Must be idempotent.
    fn close(&mut self);
}

/// Engine-side sink for inbound channel traffic.
///
/// Holds only a weak reference: once the engine is dropped, deliveries
/// are discarded.
#[derive(Clone)]
pub struct Inbound {
    engine: Weak<EngineShared>,
}

impl Inbound {
    pub(crate) fn new(engine: Weak<EngineShared>) -> Self {
        Self { engine }
    }

    /// Deliver one decoded message.
    pub fn on_message(&self, message: ChannelMessage) {
        match self.engine.upgrade() {
            Some(engine) => engine.process_message(message),
            None => debug!("IO: engine gone, dropping inbound message"),
        }
    }

    /// Report that the channel closed.  Terminal.
    pub fn on_close(&self, code: u16, reason: &str) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_transport_close(code, reason);
        }
    }

    /// Report a channel-level failure.
    pub fn on_error(&self, error: &TransportError) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_transport_error(error);
        }
    }
}

impl core::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inbound")
            .field("attached", &(self.engine.strong_count() > 0))
            .finish()
    }
}

/// A null transport that discards all sends and never delivers anything.
/// Useful as a placeholder while no simulator is attached.
pub struct NullTransport;

impl Transport for NullTransport {
    fn attach(&mut self, _inbound: Inbound) {}

    fn connect(&mut self) -> BoxedLocal<Result<(), TransportError>> {
        async { Ok(()) }.boxed_local()
    }

    fn send(&mut self, _message: &ChannelMessage) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {}
}
