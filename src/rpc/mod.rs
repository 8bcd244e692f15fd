//! Transport-agnostic RPC subsystem.
//!
//! Request/response multiplexing, event fan-out and pause points over a
//! single bidirectional message channel.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RPC Stack                             │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐   │
//! │  │ Transport │──▶│ Inbound  │──▶│  Engine (dispatcher)  │   │
//! │  │ (trait)   │   │  (sink)  │   │  pending · pause pts  │   │
//! │  └──────────┘   └──────────┘   └───────────────────────┘   │
//! │       ▲                             │          │           │
//! │       │   command                   │          ▼           │
//! │       └─────────────────────────────┘   ┌────────────┐     │
//! │                                         │ Event bus  │     │
//! │                                         └────────────┘     │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod engine;
pub mod message;
pub mod pause_point;
pub mod pending;
pub mod transport;
