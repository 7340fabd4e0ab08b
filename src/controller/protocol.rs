//! Controller Protocol Definitions
//!
//! Message type names, the typed content of each message the controller
//! consumes or produces, and the events the event loop feeds it.
//!
//! Incoming frames are validated into these types once, at the boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::{BrokerError, BrokerResult};
use crate::heartbeat::types::HeartState;
use crate::message::types::{Header, Identity, Message, MsgId};
use crate::registry::types::{EngineId, Targets};
use crate::transport::types::Channel;

pub const REGISTRATION_REQUEST: &str = "registration_request";
pub const REGISTRATION_REPLY: &str = "registration_reply";
pub const UNREGISTRATION_REQUEST: &str = "unregistration_request";
pub const REGISTRATION_NOTIFICATION: &str = "registration_notification";
pub const UNREGISTRATION_NOTIFICATION: &str = "unregistration_notification";

pub const RELAY_REQUEST: &str = "relay_request";
pub const RELAY_SUCCESS: &str = "relay_success";
pub const RELAY_RESULT: &str = "relay_result";
pub const TASK_REQUEST: &str = "task_request";
pub const TASK_SUCCESS: &str = "task_success";
pub const CONNECTION_REQUEST: &str = "connection_request";
pub const CONNECTION_REPLY: &str = "connection_reply";
pub const QUEUE_STATUS: &str = "queue_status";
pub const QUEUE_STATUS_REPLY: &str = "queue_status_reply";
pub const ERROR: &str = "error";

/// `ename` sent to clients whose engine went away mid-request.
pub const ENGINE_FAILURE: &str = "EngineFailure";

/// Everything the event loop hands to the controller.
#[derive(Debug)]
pub enum Inbound {
    /// One raw frame from a peer, not yet unpacked.
    Frame {
        channel: Channel,
        identity: Identity,
        payload: String,
    },
    /// A heartbeat answer.
    Heartbeat { heart: Identity, beat: u64 },
    /// A read-only status query, answered on the oneshot.
    Query(Query, oneshot::Sender<QueryReply>),
}

pub type InboundSender = mpsc::UnboundedSender<Inbound>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Engines,
    QueueStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryReply {
    Engines(Vec<EngineSummary>),
    QueueStatus(BTreeMap<EngineId, QueueStatusEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub id: EngineId,
    pub uuid: String,
    pub queue: Identity,
    pub heartbeat: Option<Identity>,
    pub state: Option<HeartState>,
    pub pending: usize,
}

// ============================================================
// Registration channel
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub queue: Identity,
    #[serde(default)]
    pub heartbeat: Option<Identity>,
    /// Engine-chosen opaque id; generated when absent.
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReply {
    pub status: String,
    pub id: EngineId,
    pub queue_addr: String,
    pub heartbeat_addr: String,
    pub task_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregistrationRequest {
    pub id: EngineId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationNotification {
    pub id: EngineId,
    pub queue: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregistrationNotification {
    pub id: EngineId,
}

// ============================================================
// Client channel
// ============================================================

/// Routing fields of a relay request, read from its header.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub targets: Targets,
    pub submsg_type: String,
}

impl RelayRequest {
    /// `targets` must be present (it may be `null`); `submsg_type` must be a string.
    pub fn from_header(header: &Header) -> BrokerResult<Self> {
        let targets = header
            .field("targets")
            .ok_or_else(|| BrokerError::MalformedMessage("relay_request without targets".into()))?;

        Ok(Self {
            targets: Targets::from_value(targets)?,
            submsg_type: submsg_type(header)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub submsg_type: String,
}

impl TaskRequest {
    pub fn from_header(header: &Header) -> BrokerResult<Self> {
        Ok(Self {
            submsg_type: submsg_type(header)?,
        })
    }
}

/// Reads optional `targets` for a status query; absent means all engines.
pub fn status_targets(header: &Header) -> BrokerResult<Targets> {
    header
        .field("targets")
        .map_or(Ok(Targets::All), Targets::from_value)
}

fn submsg_type(header: &Header) -> BrokerResult<String> {
    header
        .field("submsg_type")
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| BrokerError::MalformedMessage("missing submsg_type".into()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySuccess {
    pub relay_ids: Vec<MsgId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSuccess {
    pub task_id: MsgId,
    pub engine: EngineId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReply {
    pub status: String,
    pub queue: String,
    pub task: Option<String>,
    pub notification: String,
    pub engines: BTreeMap<EngineId, Identity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatusEntry {
    pub queue: usize,
}

/// Structured error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: String,
    pub ename: String,
    pub evalue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<EngineId>>,
}

impl ErrorReply {
    pub fn new(ename: &str, evalue: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            ename: ename.to_string(),
            evalue: evalue.into(),
            targets: None,
        }
    }
}

impl From<&BrokerError> for ErrorReply {
    fn from(error: &BrokerError) -> Self {
        Self {
            targets: error.targets().map(<[EngineId]>::to_vec),
            ..Self::new(error.ename(), error.to_string())
        }
    }
}

// ============================================================
// Monitor channel
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client request on its way to an engine.
    In,
    /// Engine reply on its way back.
    Out,
}

/// One copy of proxied queue traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub direction: Direction,
    pub client: Identity,
    pub queue: Identity,
    pub message: Message,
}

/// Deserializes message content into a typed request.
pub fn parse_content<T: serde::de::DeserializeOwned>(message: &Message) -> BrokerResult<T> {
    serde_json::from_value(message.content.clone()).map_err(|e| {
        BrokerError::MalformedMessage(format!("bad {} content: {}", message.msg_type(), e))
    })
}
