//! Transport Module
//!
//! The controller only ever talks to the network through the `Outbound` trait;
//! inbound traffic reaches it as raw frames on the event loop's channel.
//!
//! ## Implementations
//! - **`net`**: TCP listeners per channel (line-delimited JSON frames, first line
//!   is the peer's identity) plus a UDP socket for heartbeats.
//! - **`memory`**: records everything sent, for driving the controller without sockets.

pub mod memory;
pub mod net;
pub mod types;


use crate::message::types::{Identity, Message};
use types::Channel;

/// Fire-and-forget sends from the controller.
///
/// Implementations must not block: a send that cannot be delivered is logged
/// and dropped.
pub trait Outbound {
    /// Sends to one peer on a channel.
    fn send(&mut self, channel: Channel, to: &Identity, message: &Message);

    /// Sends to every peer connected on a channel.
    fn publish(&mut self, channel: Channel, message: &Message);

    /// Pings a heart for heartbeat round `beat`.
    fn ping(&mut self, heart: &Identity, beat: u64);
}
