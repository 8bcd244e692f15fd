//! Adapters — concrete implementations of the [`Transport`] port.
//!
//! | Adapter            | Implements | Connects to                       |
//! |--------------------|------------|-----------------------------------|
//! | `port_transport`   | Transport  | In-process simulator (channels)   |
//! | `stream_transport` | Transport  | Length-prefixed JSON over bytes   |
//! |                    | ByteLink   | TCP socket (`TcpLink`)            |
//!
//! [`Transport`]: crate::rpc::transport::Transport

pub mod port_transport;
pub mod stream_transport;
