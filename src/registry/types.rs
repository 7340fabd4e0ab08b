use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{BrokerError, BrokerResult};
use crate::message::types::{Header, Identity, MsgId};

/// Numeric engine id, assigned by the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EngineId(pub u32);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Engine {
    pub id: EngineId,
    /// Opaque id supplied (or generated) at registration.
    pub uuid: String,
    /// Identity used to reach the engine on the queue channel.
    pub queue: Identity,
    /// Identity the engine answers heartbeats with, if it has a heart.
    pub heartbeat: Option<Identity>,
    /// Outstanding request ids this engine owes a reply for.
    pub pending: BTreeSet<MsgId>,
}

/// Which engines a request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    All,
    One(EngineId),
    Many(Vec<EngineId>),
}

impl Targets {
    /// Reads a `targets` header value: `null` or `"all"`, one id, or a list of ids.
    pub fn from_value(value: &Value) -> BrokerResult<Self> {
        match value {
            Value::Null => Ok(Targets::All),
            Value::String(s) if s == "all" => Ok(Targets::All),
            Value::Number(_) => parse_id(value).map(Targets::One),
            Value::Array(items) => items
                .iter()
                .map(parse_id)
                .collect::<BrokerResult<Vec<_>>>()
                .map(Targets::Many),
            other => Err(BrokerError::MalformedMessage(format!(
                "invalid targets: {other}"
            ))),
        }
    }
}

fn parse_id(value: &Value) -> BrokerResult<EngineId> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .map(EngineId)
        .ok_or_else(|| BrokerError::MalformedMessage(format!("invalid engine id: {value}")))
}

/// An in-flight request awaiting an engine's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub request_id: MsgId,
    /// Client to deliver the reply to.
    pub client: Identity,
    /// Header of the client's own request; replies are parented on it.
    pub original_header: Header,
    pub engine: EngineId,
    /// `false` for records learned from the monitor channel, whose replies
    /// the proxy delivers itself.
    pub relayed: bool,
}
