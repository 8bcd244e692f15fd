//! Simulator command vocabulary.
//!
//! [`client`] extends [`RpcEngine`](crate::rpc::engine::RpcEngine) with
//! file transfer, simulation control, serial I/O, peripheral access and
//! pause points.  [`commands`] holds the wire names and parameter types.

pub mod client;
pub mod commands;
