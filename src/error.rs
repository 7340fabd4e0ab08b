//! Error taxonomy shared by the registry and the dispatch core.

use crate::message::types::{Identity, MsgId};
use crate::registry::types::EngineId;

/// Everything that can go wrong while handling a single inbound message.
///
/// None of these are fatal to the event loop: client-facing failures become
/// an `error` reply, everything else is logged and the message dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("No such engine: {0:?}")]
    UnknownEngine(Vec<EngineId>),

    #[error("No engines registered")]
    NoEnginesRegistered,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unhandled message type: {0}")]
    UnhandledMessageType(String),

    #[error("Not a pending message: {0}")]
    UnroutableReply(MsgId),

    #[error("Queue identity already registered: {0}")]
    DuplicateQueue(Identity),
}

impl BrokerError {
    /// Stable name carried as `ename` in error replies.
    pub fn ename(&self) -> &'static str {
        match self {
            BrokerError::UnknownEngine(_) => "UnknownEngine",
            BrokerError::NoEnginesRegistered => "NoEnginesRegistered",
            BrokerError::MalformedMessage(_) => "MalformedMessage",
            BrokerError::UnhandledMessageType(_) => "UnhandledMessageType",
            BrokerError::UnroutableReply(_) => "UnroutableReply",
            BrokerError::DuplicateQueue(_) => "DuplicateQueue",
        }
    }

    /// Engine ids the error refers to, if any.
    pub fn targets(&self) -> Option<&[EngineId]> {
        match self {
            BrokerError::UnknownEngine(ids) => Some(ids),
            _ => None,
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
