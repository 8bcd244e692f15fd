//! RPC engine — correlates commands with responses over one channel.
//!
//! The engine owns everything the protocol needs and nothing else:
//!
//! 1. **Correlation table** — every command gets a fresh, strictly
//!    increasing id; responses are matched by id, never by arrival order.
//! 2. **Event bus** — unsolicited events are fanned out to subscribers.
//! 3. **Pause-point registry** — `sim:pause` events fulfil the point they
//!    name before the generic fan-out.
//! 4. **Run state** — the engine's belief that simulated time advances.
//!
//! All state lives behind `Rc`/`RefCell` and is touched only from the
//! inbound callbacks and the synchronous part of the public methods.  No
//! borrow is held across an `.await` or while user callbacks run, so
//! callbacks may re-enter the engine.
//!
//! The command vocabulary (file transfer, simulation control, pause
//! points, peripherals) lives in [`crate::sim`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::task::Poll;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future::{BoxedLocal, poll_fn};
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result, TransportError};
use crate::events::{EventBus, ListenOptions, Subscription};

use super::message::{
    ChannelMessage, CommandMessage, ErrorMessage, EventMessage, HelloMessage, PAUSE_EVENT,
    RemoteErrorBody, ResponseMessage,
};
use super::pause_point::PausePoint;
use super::pending::{PendingCommand, PendingTable};
use super::transport::{Inbound, Transport};

type ErrorCallback = Rc<dyn Fn(&ErrorMessage)>;
type ConnectedCallback = Rc<dyn Fn(u32)>;
type PauseSignal = Signal<NoopRawMutex, ()>;

// ── Shared engine state ──────────────────────────────────────

#[derive(Default)]
struct EngineState {
    /// `close()` was called.
    closed: bool,
    /// The channel closed without `close()` being called.
    lost: bool,
    running: bool,
    last_nanos: u64,
    remote_version: Option<u32>,
    next_id: u64,
    next_pause_point: u64,
    pending: PendingTable,
    pause_points: HashMap<String, PausePoint>,
}

/// State shared between the engine handle and its inbound sink.
pub(crate) struct EngineShared {
    config: ClientConfig,
    state: RefCell<EngineState>,
    events: Rc<RefCell<EventBus>>,
    on_error: RefCell<Option<ErrorCallback>>,
    on_connected: RefCell<Option<ConnectedCallback>>,
}

impl EngineShared {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: RefCell::new(EngineState::default()),
            events: Rc::new(RefCell::new(EventBus::new())),
            on_error: RefCell::new(None),
            on_connected: RefCell::new(None),
        }
    }

    // ── Inbound dispatch ─────────────────────────────────────

    pub(crate) fn process_message(&self, message: ChannelMessage) {
        match message {
            ChannelMessage::Error(msg) => self.process_error(msg),
            ChannelMessage::Hello(hello) => self.process_hello(hello),
            ChannelMessage::Event(event) => self.process_event(&event),
            ChannelMessage::Response(response) => self.process_response(response),
            ChannelMessage::Command(cmd) => {
                warn!("RPC: ignoring inbound command {} ({})", cmd.command, cmd.id);
            }
        }
    }

    /// Uncorrelated error: report it, then reject the oldest pending command.
    fn process_error(&self, msg: ErrorMessage) {
        error!("RPC: API error: {}", msg.message);
        self.report_error(&msg);

        let oldest = self.state.borrow_mut().pending.take_oldest();
        if let Some((id, slot)) = oldest {
            debug!("RPC: attributing API error to command {}", id);
            slot.signal(Err(ClientError::Api(msg.message)));
        }
    }

    fn process_hello(&self, hello: HelloMessage) {
        let expected = self.config.protocol_version;
        if hello.protocol_version == expected {
            info!("RPC: remote hello, protocol v{}", hello.protocol_version);
        } else {
            warn!(
                "RPC: unsupported protocol version {} (expected {})",
                hello.protocol_version, expected
            );
        }
        self.state.borrow_mut().remote_version = Some(hello.protocol_version);

        let callback = self.on_connected.borrow().clone();
        if let Some(callback) = callback {
            callback(hello.protocol_version);
        }
    }

    fn process_event(&self, event: &EventMessage) {
        let fired = {
            let mut st = self.state.borrow_mut();
            st.last_nanos = event.nanos;
            if event.event == PAUSE_EVENT {
                st.running = false;
                event
                    .pause_point_id()
                    .and_then(|id| st.pause_points.remove(id))
            } else {
                None
            }
        };

        if let Some(point) = fired {
            debug!("RPC: pause point {} reached at {}ns", point.id(), event.nanos);
            point.fulfill(event.pause_point_info());
        }

        EventBus::dispatch(&self.events, event);
    }

    fn process_response(&self, response: ResponseMessage) {
        let slot = response
            .id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.state.borrow_mut().pending.take(id));

        let Some(slot) = slot else {
            warn!("RPC: unknown response id {:?}, dropped", response.id);
            return;
        };

        let result = if response.error {
            let body = RemoteErrorBody::from_result(&response.result);
            Err(ClientError::Remote {
                code: body.code,
                message: body.message,
            })
        } else {
            Ok(response.result)
        };
        slot.signal(result);
    }

    pub(crate) fn handle_transport_close(&self, code: u16, reason: &str) {
        let drained = {
            let mut st = self.state.borrow_mut();
            if st.closed {
                debug!("RPC: channel closed after close() (code {})", code);
                return;
            }
            if st.lost {
                return;
            }
            st.lost = true;
            if self.config.reject_pending_on_close {
                st.pending.drain()
            } else {
                Vec::new()
            }
        };

        let mut message = format!(
            "Connection to {} closed unexpectedly: code {}",
            self.config.target(),
            code
        );
        if !reason.is_empty() {
            message = format!("{message} ({reason})");
        }
        warn!("RPC: {}", message);

        for (_, slot) in drained {
            slot.signal(Err(ClientError::TransportLost(message.clone())));
        }
        self.report_error(&ErrorMessage { message });
    }

    pub(crate) fn handle_transport_error(&self, err: &TransportError) {
        error!("RPC: transport error: {}", err);
        self.report_error(&ErrorMessage {
            message: err.to_string(),
        });
    }

    fn report_error(&self, msg: &ErrorMessage) {
        let callback = self.on_error.borrow().clone();
        if let Some(callback) = callback {
            callback(msg);
        }
    }

    // ── Run state ────────────────────────────────────────────

    pub(crate) fn set_running(&self, running: bool) {
        self.state.borrow_mut().running = running;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    // ── Pause-point registry ─────────────────────────────────

    pub(crate) fn next_pause_point_id(&self, kind: &str) -> String {
        let mut st = self.state.borrow_mut();
        let seq = st.next_pause_point;
        st.next_pause_point += 1;
        format!("{}{}_{}", self.config.pause_point_prefix, seq, kind)
    }

    pub(crate) fn register_pause_point(&self, point: PausePoint) {
        self.state
            .borrow_mut()
            .pause_points
            .insert(point.id().to_owned(), point);
    }

    pub(crate) fn unregister_pause_point(&self, id: &str) -> bool {
        self.state.borrow_mut().pause_points.remove(id).is_some()
    }
}

// ── Connection state ─────────────────────────────────────────

/// The connect future stays here until it completes, so whichever
/// `connected()` caller polls next drives it.
enum ConnectState {
    Pending(BoxedLocal<core::result::Result<(), TransportError>>),
    Done(core::result::Result<(), TransportError>),
}

// ── Engine handle ────────────────────────────────────────────

/// Client-side protocol engine over one exclusively owned transport.
///
/// Each instance has its own tables; several engines (several simulated
/// devices) can coexist in one process.
pub struct RpcEngine<T: Transport> {
    pub(crate) shared: Rc<EngineShared>,
    transport: RefCell<T>,
    connect: RefCell<ConnectState>,
}

impl<T: Transport> RpcEngine<T> {
    /// Take ownership of `transport`, attach the inbound sink and start
    /// connecting.  Await [`connected`](Self::connected) before relying
    /// on the channel.
    pub fn new(mut transport: T, config: ClientConfig) -> Self {
        let shared = Rc::new(EngineShared::new(config));
        transport.attach(Inbound::new(Rc::downgrade(&shared)));
        let connecting = transport.connect();

        Self {
            shared,
            transport: RefCell::new(transport),
            connect: RefCell::new(ConnectState::Pending(connecting)),
        }
    }

    pub fn with_defaults(transport: T) -> Self {
        Self::new(transport, ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Resolve once the transport is usable.  The outcome of the first
    /// connection attempt is cached for later calls.
    ///
    /// Dropping a waiter loses nothing: the attempt is owned by the
    /// engine and the next caller picks it up.
    pub async fn connected(&self) -> Result<()> {
        let outcome = poll_fn(|cx| {
            let mut state = self.connect.borrow_mut();
            let outcome = match &mut *state {
                ConnectState::Done(outcome) => return Poll::Ready(outcome.clone()),
                ConnectState::Pending(connecting) => match connecting.as_mut().poll(cx) {
                    Poll::Ready(outcome) => outcome,
                    Poll::Pending => return Poll::Pending,
                },
            };
            match &outcome {
                Ok(()) => info!("RPC: transport connected"),
                Err(e) => warn!("RPC: transport connect failed: {}", e),
            }
            *state = ConnectState::Done(outcome.clone());
            Poll::Ready(outcome)
        })
        .await;
        outcome.map_err(ClientError::from)
    }

    /// Send `command` with `params` and return the future of its result.
    ///
    /// The id is allocated and the message transmitted before this
    /// returns.  The future settles exactly once: with the result, with
    /// the remote's error, or at once if the engine is closed or the
    /// transport refuses the message.  No timeout is applied.
    pub fn send_command(&self, command: &str, params: Value) -> PendingCommand {
        let (id, slot) = {
            let mut st = self.shared.state.borrow_mut();
            if st.closed || st.lost {
                debug!("RPC: {} rejected, client closed", command);
                return PendingCommand::settled(Err(ClientError::Closed));
            }
            let id = st.next_id;
            st.next_id += 1;
            (id, st.pending.insert(id))
        };

        let message = ChannelMessage::Command(CommandMessage {
            id: id.to_string(),
            command: command.to_owned(),
            params,
        });

        let sent = match self.transport.try_borrow_mut() {
            Ok(mut transport) => transport.send(&message),
            Err(_) => Err(TransportError::Io("transport busy (re-entrant send)".into())),
        };

        if let Err(e) = sent {
            warn!("RPC: send of {} ({}) failed: {}", command, id, e);
            self.shared.state.borrow_mut().pending.take(id);
            return PendingCommand::settled(Err(e.into()));
        }

        debug!("RPC: -> {} ({})", command, id);
        PendingCommand::waiting(id, slot)
    }

    /// Subscribe to an event name.  The returned handle removes the
    /// listener again.
    pub fn listen(
        &self,
        event: &str,
        callback: impl Fn(&EventMessage) + 'static,
        options: ListenOptions,
    ) -> Subscription {
        EventBus::listen(&self.shared.events, event, callback, options)
    }

    /// Resolve when the simulation is stopped: at once if it already is,
    /// otherwise on the next `sim:pause` event.
    ///
    /// The subscription is made when this is called, so a pause arriving
    /// before the first poll is not missed.
    pub fn paused(&self) -> impl Future<Output = ()> {
        let waiter = if self.shared.is_running() {
            let signal = Rc::new(PauseSignal::new());
            let notify = Rc::clone(&signal);
            let _ = self.listen(PAUSE_EVENT, move |_| notify.signal(()), ListenOptions::ONCE);
            Some(signal)
        } else {
            None
        };

        async move {
            if let Some(signal) = waiter {
                signal.wait().await;
            }
        }
    }

    /// Install the process-wide error callback (API errors, transport
    /// loss, transport failures).
    pub fn set_on_error(&self, callback: impl Fn(&ErrorMessage) + 'static) {
        *self.shared.on_error.borrow_mut() = Some(Rc::new(callback));
    }

    /// Install the callback invoked with the remote protocol version on `hello`.
    pub fn set_on_connected(&self, callback: impl Fn(u32) + 'static) {
        *self.shared.on_connected.borrow_mut() = Some(Rc::new(callback));
    }

    /// Close the engine and its transport.  Idempotent.
    pub fn close(&self) {
        {
            let mut st = self.shared.state.borrow_mut();
            if st.closed {
                return;
            }
            st.closed = true;
        }
        match self.transport.try_borrow_mut() {
            Ok(mut transport) => transport.close(),
            Err(_) => warn!("RPC: transport busy during close"),
        }
        info!("RPC: client closed");
    }

    // ── Introspection ────────────────────────────────────────

    /// Whether simulated time is believed to be advancing.
    pub fn running(&self) -> bool {
        self.shared.is_running()
    }

    /// Simulated time stamp of the most recent event.
    pub fn last_nanos(&self) -> u64 {
        self.shared.state.borrow().last_nanos
    }

    /// Protocol version announced by the remote's `hello`, if seen.
    pub fn remote_version(&self) -> Option<u32> {
        self.shared.state.borrow().remote_version
    }

    pub fn pending_commands(&self) -> usize {
        self.shared.state.borrow().pending.len()
    }

    pub fn pause_point_count(&self) -> usize {
        self.shared.state.borrow().pause_points.len()
    }

    pub fn is_closed(&self) -> bool {
        let st = self.shared.state.borrow();
        st.closed || st.lost
    }
}

impl<T: Transport> Drop for RpcEngine<T> {
    fn drop(&mut self) {
        self.close();
    }
}
