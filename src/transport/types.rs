use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical channels the controller multiplexes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Engine registration and unregistration.
    Registration,
    /// Client requests and the replies relayed back to clients.
    Client,
    /// Point-to-point traffic with engines.
    Queue,
    /// Broadcast of registration changes to subscribed clients.
    Notification,
    /// Copies of traffic seen by a pass-through queue proxy.
    Monitor,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Registration => "registration",
            Channel::Client => "client",
            Channel::Queue => "queue",
            Channel::Notification => "notification",
            Channel::Monitor => "monitor",
        };
        f.write_str(name)
    }
}
