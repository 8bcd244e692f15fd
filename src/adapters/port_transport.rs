//! In-process message-port transport.
//!
//! Connects the engine to a simulator running in the same process (an
//! embedded frame, a worker, a test double) through a pair of bounded
//! `embassy-sync` channels.  Messages cross as structured values; nothing
//! is serialised.
//!
//! ```text
//!  ┌──────────────┐  ChannelMessage  ┌──────────────┐
//!  │ PortTransport│─────────────────▶│  RemotePort  │
//!  │  (engine)    │◀─────────────────│  (simulator) │
//!  └──────────────┘    PortEvent     └──────────────┘
//!          ▲                │
//!          │   PortDriver   │
//!          └────────────────┘
//! ```
//!
//! Inbound traffic is forwarded to the engine by a [`PortDriver`] future,
//! which the embedder spawns on its executor next to its other tasks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future::BoxedLocal;
use futures_lite::FutureExt;
use log::{debug, info, warn};

use crate::error::TransportError;
use crate::rpc::message::ChannelMessage;
use crate::rpc::transport::{Inbound, Transport};

/// Depth of each direction of the port.
pub const PORT_DEPTH: usize = 32;

/// Close code reported when the client side closes the port.
pub const CLOSE_NORMAL: u16 = 1000;

/// Something the simulator side of the port produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    Message(ChannelMessage),
    Closed { code: u16, reason: String },
    Error(String),
}

struct PortShared {
    to_remote: Channel<NoopRawMutex, ChannelMessage, PORT_DEPTH>,
    to_client: Channel<NoopRawMutex, PortEvent, PORT_DEPTH>,
    client_closed: Cell<bool>,
    remote_closed: Cell<bool>,
}

/// Create a connected port pair.
pub fn port_channel() -> (PortTransport, RemotePort) {
    let shared = Rc::new(PortShared {
        to_remote: Channel::new(),
        to_client: Channel::new(),
        client_closed: Cell::new(false),
        remote_closed: Cell::new(false),
    });
    (
        PortTransport {
            shared: Rc::clone(&shared),
            inbound: Rc::new(RefCell::new(None)),
        },
        RemotePort { shared },
    )
}

// ── Client end ───────────────────────────────────────────────

/// Engine side of the port.
pub struct PortTransport {
    shared: Rc<PortShared>,
    inbound: Rc<RefCell<Option<Inbound>>>,
}

impl PortTransport {
    /// Future-producing handle that forwards inbound port traffic to the
    /// engine.  Take it before handing the transport to the engine.
    pub fn driver(&self) -> PortDriver {
        PortDriver {
            shared: Rc::clone(&self.shared),
            inbound: Rc::clone(&self.inbound),
        }
    }
}

impl Transport for PortTransport {
    fn attach(&mut self, inbound: Inbound) {
        *self.inbound.borrow_mut() = Some(inbound);
    }

    fn connect(&mut self) -> BoxedLocal<Result<(), TransportError>> {
        // A port is usable as soon as it exists.
        let ready = if self.shared.client_closed.get() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        };
        async move { ready }.boxed_local()
    }

    fn send(&mut self, message: &ChannelMessage) -> Result<(), TransportError> {
        if self.shared.client_closed.get() || self.shared.remote_closed.get() {
            return Err(TransportError::Closed);
        }
        self.shared.to_remote.try_send(message.clone()).map_err(|_| {
            warn!("IO: port outbound queue full, dropping message");
            TransportError::QueueFull
        })
    }

    fn close(&mut self) {
        if self.shared.client_closed.replace(true) {
            return;
        }
        // Wake the driver so it can finish; the engine ignores this close.
        let _ = self.shared.to_client.try_send(PortEvent::Closed {
            code: CLOSE_NORMAL,
            reason: "closed by client".into(),
        });
        info!("IO: port closed by client");
    }
}

/// Forwards [`PortEvent`]s into the engine's inbound sink.
pub struct PortDriver {
    shared: Rc<PortShared>,
    inbound: Rc<RefCell<Option<Inbound>>>,
}

impl PortDriver {
    /// Deliver one event; returns `false` once the port is finished.
    fn deliver(&self, event: PortEvent) -> bool {
        let inbound = self.inbound.borrow().clone();
        let Some(inbound) = inbound else {
            debug!("IO: port event before attach, dropped");
            return true;
        };
        match event {
            PortEvent::Message(message) => {
                inbound.on_message(message);
                true
            }
            PortEvent::Error(message) => {
                inbound.on_error(&TransportError::Io(message));
                true
            }
            PortEvent::Closed { code, reason } => {
                inbound.on_close(code, &reason);
                false
            }
        }
    }

    /// Deliver everything already queued without waiting.  Returns the
    /// number of events delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.shared.to_client.try_receive() {
            delivered += 1;
            if !self.deliver(event) {
                break;
            }
        }
        delivered
    }

    /// Forward events until the port closes.
    pub async fn run(self) {
        loop {
            let event = self.shared.to_client.receive().await;
            if !self.deliver(event) {
                break;
            }
        }
        debug!("IO: port driver finished");
    }
}

// ── Simulator end ────────────────────────────────────────────

/// Simulator side of the port.
pub struct RemotePort {
    shared: Rc<PortShared>,
}

impl RemotePort {
    /// Send a message to the engine.
    pub fn post(&self, message: impl Into<ChannelMessage>) -> Result<(), TransportError> {
        self.push(PortEvent::Message(message.into()))
    }

    /// Wait for the next command from the engine.
    pub async fn recv(&self) -> ChannelMessage {
        self.shared.to_remote.receive().await
    }

    pub fn try_recv(&self) -> Option<ChannelMessage> {
        self.shared.to_remote.try_receive().ok()
    }

    /// Close the port from the simulator side.  The engine sees an
    /// unexpected close.
    pub fn close(&self, code: u16, reason: &str) {
        if self.shared.remote_closed.replace(true) {
            return;
        }
        let _ = self.shared.to_client.try_send(PortEvent::Closed {
            code,
            reason: reason.to_owned(),
        });
    }

    /// Report a channel-level failure to the engine.
    pub fn fail(&self, message: &str) -> Result<(), TransportError> {
        self.push(PortEvent::Error(message.to_owned()))
    }

    fn push(&self, event: PortEvent) -> Result<(), TransportError> {
        if self.shared.remote_closed.get() || self.shared.client_closed.get() {
            return Err(TransportError::Closed);
        }
        self.shared
            .to_client
            .try_send(event)
            .map_err(|_| TransportError::QueueFull)
    }
}
