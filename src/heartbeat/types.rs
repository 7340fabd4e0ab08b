use serde::{Deserialize, Serialize};

use crate::message::types::Identity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HeartState {
    /// Tracked but has not answered a round yet.
    Unknown,
    Alive,
    /// Missed at least one round, not yet declared dead.
    Suspect,
    Dead,
}

/// The wire protocol on the heartbeat channel.
///
/// - `Ping`: sent by the controller to each heart once per round.
/// - `Pong`: an engine's answer, echoing the round number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeartbeatMessage {
    Ping { beat: u64 },
    Pong { heart: Identity, beat: u64 },
}

/// Outcome of closing a round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tick {
    /// Number of the round just opened.
    pub beat: u64,
    /// Hearts to ping for the new round.
    pub pings: Vec<Identity>,
    /// Hearts that died when the previous round closed.
    pub failed: Vec<Identity>,
}
