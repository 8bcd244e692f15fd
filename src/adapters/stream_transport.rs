//! Length-prefixed JSON transport over a byte link.
//!
//! Carries [`ChannelMessage`]s across any byte-oriented link (a TCP
//! socket, a pipe, a serial line) using the frame format of
//! [`codec`](crate::rpc::codec).
//!
//! ## Connection model
//!
//! The link is connected before it is handed to the transport and is
//! operated non-blocking:
//!
//! 1. `send()` encodes and frames the message, appends it to the outbox
//!    and writes as much of the outbox as the link takes.  Frames leave
//!    the outbox whole and in order; a partly written frame is finished
//!    before the next one starts.
//! 2. A [`StreamReader`] first pushes any outbox backlog, then drains
//!    whatever bytes are available, feeds them through the frame decoder
//!    and delivers each complete message.  `poll()` never blocks; `run()`
//!    repeats it on a timer.
//! 3. End-of-stream is reported to the engine as close code 1006.  Any
//!    other read failure is reported as a channel error, then as a close.

use std::cell::{Cell, RefCell};
use std::net::{TcpStream, ToSocketAddrs};
use std::rc::Rc;
use std::time::Duration;

use async_io_mini::Timer;
use futures_lite::future::BoxedLocal;
use futures_lite::FutureExt;
use log::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::rpc::codec::{FrameDecoder, decode_message, encode_frame, encode_message};
use crate::rpc::message::ChannelMessage;
use crate::rpc::transport::{Inbound, Transport};

/// Close code reported when the link reaches end-of-stream.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Read chunk size.
const READ_CHUNK: usize = 1024;

/// Outbox backlog beyond which further frames are refused.
const OUTBOX_LIMIT: usize = 256 * 1024;

// ── Byte link ────────────────────────────────────────────────

/// Non-blocking byte-oriented link.
pub trait ByteLink {
    /// Read available bytes into `buf`.
    ///
    /// Returns `Ok(0)` when nothing is available and
    /// `Err(TransportError::Closed)` once the peer has closed the link.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write bytes.  May accept fewer than offered, or none.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    fn flush(&mut self) -> Result<(), TransportError>;

    /// Whether the link is still usable.
    fn available(&self) -> bool;

    /// Tear the link down.  Idempotent.
    fn shutdown(&mut self);
}

/// Plain TCP client link.
pub struct TcpLink {
    stream: Option<TcpStream>,
}

impl TcpLink {
    /// Connect to `addr` and switch the socket to non-blocking mode.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        stream
            .set_nonblocking(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        if let Ok(peer) = stream.peer_addr() {
            info!("IO: TCP link to {}", peer);
        }
        Ok(Self {
            stream: Some(stream),
        })
    }
}

impl ByteLink for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        use std::io::Read;

        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.read(buf) {
            Ok(0) => {
                info!("IO: TCP peer closed the link (EOF)");
                self.stream.take();
                Err(TransportError::Closed)
            }
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                self.stream.take();
                Err(TransportError::Io(e.to_string()))
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        use std::io::Write;

        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                self.stream.take();
                Err(TransportError::Io(e.to_string()))
            }
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        use std::io::Write;

        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.flush() {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }

    fn available(&self) -> bool {
        self.stream.is_some()
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

// ── Transport ────────────────────────────────────────────────

struct StreamShared<L> {
    link: RefCell<L>,
    decoder: RefCell<FrameDecoder>,
    /// Framed bytes accepted by `send()` but not yet taken by the link.
    outbox: RefCell<Vec<u8>>,
    inbound: RefCell<Option<Inbound>>,
    closed: Cell<bool>,
    max_frame_size: usize,
    poll_interval: Duration,
}

/// Message transport over a [`ByteLink`].
pub struct StreamTransport<L: ByteLink> {
    shared: Rc<StreamShared<L>>,
}

impl<L: ByteLink> StreamTransport<L> {
    pub fn new(link: L, config: &ClientConfig) -> Self {
        Self {
            shared: Rc::new(StreamShared {
                link: RefCell::new(link),
                decoder: RefCell::new(FrameDecoder::with_max_frame_size(config.max_frame_size)),
                outbox: RefCell::new(Vec::new()),
                inbound: RefCell::new(None),
                closed: Cell::new(false),
                max_frame_size: config.max_frame_size,
                poll_interval: Duration::from_millis(u64::from(config.read_poll_interval_ms)),
            }),
        }
    }

    /// Handle that pulls inbound frames off the link.  Take it before
    /// handing the transport to the engine.
    pub fn reader(&self) -> StreamReader<L> {
        StreamReader {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Bytes still waiting in the outbox.
    pub fn backlog(&self) -> usize {
        self.shared.outbox.borrow().len()
    }
}

impl<L: ByteLink> StreamShared<L> {
    /// Write as much of the outbox as the link accepts without blocking.
    /// Returns the number of bytes left behind.
    fn drain_outbox(&self) -> Result<usize, TransportError> {
        let mut outbox = self.outbox.borrow_mut();
        if outbox.is_empty() {
            return Ok(0);
        }
        let mut link = self.link.borrow_mut();
        let mut written = 0;
        while written < outbox.len() {
            let n = link.write(&outbox[written..])?;
            if n == 0 {
                break;
            }
            written += n;
        }
        outbox.drain(..written);
        if written > 0 {
            link.flush()?;
        }
        if !outbox.is_empty() {
            debug!("IO: link stalled, {} bytes queued", outbox.len());
        }
        Ok(outbox.len())
    }
}

impl<L: ByteLink> Transport for StreamTransport<L> {
    fn attach(&mut self, inbound: Inbound) {
        *self.shared.inbound.borrow_mut() = Some(inbound);
    }

    fn connect(&mut self) -> BoxedLocal<Result<(), TransportError>> {
        let ready = if self.shared.link.borrow().available() {
            Ok(())
        } else {
            Err(TransportError::Unavailable("link not connected".into()))
        };
        async move { ready }.boxed_local()
    }

    fn send(&mut self, message: &ChannelMessage) -> Result<(), TransportError> {
        if self.shared.closed.get() {
            return Err(TransportError::Closed);
        }
        let text = encode_message(message)?;
        let frame = encode_frame(text.as_bytes(), self.shared.max_frame_size)?;
        {
            let mut outbox = self.shared.outbox.borrow_mut();
            if !outbox.is_empty() && outbox.len() + frame.len() > OUTBOX_LIMIT {
                return Err(TransportError::QueueFull);
            }
            outbox.extend_from_slice(&frame);
        }
        self.shared.drain_outbox().map(|_| ())
    }

    fn close(&mut self) {
        if self.shared.closed.replace(true) {
            return;
        }
        self.shared.link.borrow_mut().shutdown();
        self.shared.decoder.borrow_mut().reset();
        self.shared.outbox.borrow_mut().clear();
        info!("IO: stream transport closed");
    }
}

// ── Reader ───────────────────────────────────────────────────

/// Result of one [`StreamReader::poll`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No complete message was available.
    Idle,
    /// This many messages were delivered to the engine.
    Delivered(usize),
    /// The link is finished; stop polling.
    Finished,
}

enum LinkStatus {
    Open,
    PeerClosed,
    Failed(TransportError),
}

/// Pulls frames off the link and delivers them to the engine.
pub struct StreamReader<L: ByteLink> {
    shared: Rc<StreamShared<L>>,
}

impl<L: ByteLink> StreamReader<L> {
    /// Drain available bytes and deliver every complete message.
    pub fn poll(&self) -> ReadOutcome {
        if self.shared.closed.get() {
            return ReadOutcome::Finished;
        }

        // Collect under the link borrow, deliver after releasing it: the
        // engine may send from inside a delivery.
        let mut frames = Vec::new();
        let status = if let Err(e) = self.shared.drain_outbox() {
            match e {
                TransportError::Closed => LinkStatus::PeerClosed,
                e => LinkStatus::Failed(e),
            }
        } else {
            let mut link = self.shared.link.borrow_mut();
            let mut decoder = self.shared.decoder.borrow_mut();
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match link.read(&mut buf) {
                    Ok(0) => break LinkStatus::Open,
                    Ok(n) => frames.extend(decoder.feed(&buf[..n])),
                    Err(TransportError::Closed) => break LinkStatus::PeerClosed,
                    Err(e) => break LinkStatus::Failed(e),
                }
            }
        };

        let inbound = self.shared.inbound.borrow().clone();
        let mut delivered = 0;
        for frame in frames {
            match decode_message(&frame) {
                Ok(message) => {
                    delivered += 1;
                    if let Some(inbound) = &inbound {
                        inbound.on_message(message);
                    }
                }
                Err(e) => warn!("IO: dropping undecodable frame: {}", e),
            }
        }

        match status {
            LinkStatus::Open if delivered > 0 => ReadOutcome::Delivered(delivered),
            LinkStatus::Open => ReadOutcome::Idle,
            LinkStatus::PeerClosed => {
                self.finish();
                if let Some(inbound) = &inbound {
                    inbound.on_close(CLOSE_ABNORMAL, "link closed");
                }
                ReadOutcome::Finished
            }
            LinkStatus::Failed(e) => {
                self.finish();
                if let Some(inbound) = &inbound {
                    inbound.on_error(&e);
                    inbound.on_close(CLOSE_ABNORMAL, &e.to_string());
                }
                ReadOutcome::Finished
            }
        }
    }

    fn finish(&self) {
        self.shared.closed.set(true);
        self.shared.link.borrow_mut().shutdown();
    }

    /// Poll until the link is finished, sleeping between idle passes.
    pub async fn run(self) {
        loop {
            match self.poll() {
                ReadOutcome::Finished => break,
                ReadOutcome::Delivered(_) => futures_lite::future::yield_now().await,
                ReadOutcome::Idle => {
                    Timer::after(self.shared.poll_interval).await;
                }
            }
        }
        debug!("IO: stream reader finished");
    }
}
