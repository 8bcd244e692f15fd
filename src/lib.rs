//! simlink — client-side RPC, event and pause-point layer for a remote
//! microcontroller simulator.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  sim::client     file · sim control · serial · pause points    │
//! │  ──────────────────────────────────────────────────────────    │
//! │  rpc::engine     correlation · run state · event dispatch      │
//! │  ──────────────── Transport trait boundary ────────────────    │
//! │  adapters        in-process port · framed byte stream (TCP)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one thread.  The engine is `!Send`; drive it and
//! its transport's reader from a local executor.

#![deny(unused_must_use)]

pub mod adapters;
pub mod base64;
pub mod config;
pub mod error;
pub mod events;
pub mod rpc;
pub mod sim;

pub use config::ClientConfig;
pub use error::{ClientError, Result, TransportError};
pub use events::{ListenOptions, Subscription};
pub use rpc::engine::RpcEngine;
pub use rpc::message::{ChannelMessage, EventMessage};
pub use rpc::pause_point::{PauseCondition, PausePoint};
pub use rpc::transport::{Inbound, Transport};
pub use sim::commands::{FileContent, SimStartParams};
