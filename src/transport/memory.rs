//! In-memory `Outbound` that keeps everything it is asked to send.

use super::Outbound;
use super::types::Channel;
use crate::message::types::{Identity, Message};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Direct {
        channel: Channel,
        to: Identity,
        message: Message,
    },
    Published {
        channel: Channel,
        message: Message,
    },
    Ping {
        heart: Identity,
        beat: u64,
    },
}

#[derive(Debug, Default)]
pub struct MemoryOutbound {
    pub sent: Vec<Sent>,
}

impl MemoryOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the record.
    pub fn take(&mut self) -> Vec<Sent> {
        std::mem::take(&mut self.sent)
    }

    /// Messages sent directly to `to` on `channel`, oldest first.
    pub fn direct_to(&self, channel: Channel, to: &Identity) -> Vec<&Message> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::Direct {
                    channel: c,
                    to: t,
                    message,
                } if *c == channel && t == to => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self, channel: Channel) -> Vec<&Message> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::Published { channel: c, message } if *c == channel => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn pings(&self) -> Vec<(&Identity, u64)> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::Ping { heart, beat } => Some((heart, *beat)),
                _ => None,
            })
            .collect()
    }
}

impl Outbound for MemoryOutbound {
    fn send(&mut self, channel: Channel, to: &Identity, message: &Message) {
        self.sent.push(Sent::Direct {
            channel,
            to: to.clone(),
            message: message.clone(),
        });
    }

    fn publish(&mut self, channel: Channel, message: &Message) {
        self.sent.push(Sent::Published {
            channel,
            message: message.clone(),
        });
    }

    fn ping(&mut self, heart: &Identity, beat: u64) {
        self.sent.push(Sent::Ping {
            heart: heart.clone(),
            beat,
        });
    }
}
