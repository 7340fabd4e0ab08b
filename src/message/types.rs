use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{BrokerError, BrokerResult};

/// Unique identifier of a single message.
///
/// Wrapper around a UUID string; a fresh one is generated for every message
/// the controller sends, including every relayed sub-request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MsgId(pub String);

impl MsgId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MsgId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque transport address of a peer on one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message header.
///
/// `msg_id` and `msg_type` are required on the wire; anything else the sender
/// put in the header lands in `subheader` untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub msg_id: MsgId,
    pub msg_type: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub session: String,
    #[serde(flatten)]
    pub subheader: Map<String, Value>,
}

impl Header {
    /// Looks up an extra header field by name.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.subheader.get(key)
    }
}

/// A complete envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub header: Header,
    #[serde(default, with = "parent_header")]
    pub parent_header: Option<Header>,
    #[serde(default)]
    pub content: Value,
}

impl Message {
    pub fn msg_id(&self) -> &MsgId {
        &self.header.msg_id
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Id of the request this message answers, if it is a reply.
    pub fn parent_id(&self) -> Option<&MsgId> {
        self.parent_header.as_ref().map(|parent| &parent.msg_id)
    }

    /// Decodes one JSON frame.
    pub fn unpack(frame: &str) -> BrokerResult<Self> {
        serde_json::from_str(frame).map_err(|e| BrokerError::MalformedMessage(e.to_string()))
    }

    /// Encodes the message as a single-line JSON frame.
    pub fn pack(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// An absent parent travels as `{}`, the way fresh requests are sent.
///
/// A parent only needs `msg_id` to correlate; engines may echo nothing else.
mod parent_header {
    use super::Header;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{Map, Value};

    pub fn serialize<S: Serializer>(parent: &Option<Header>, s: S) -> Result<S::Ok, S::Error> {
        match parent {
            Some(header) => header.serialize(s),
            None => Map::<String, Value>::new().serialize(s),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Header>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(mut map) => {
                map.entry("msg_type")
                    .or_insert_with(|| Value::String(String::new()));
                serde_json::from_value(Value::Object(map))
                    .map(Some)
                    .map_err(serde::de::Error::custom)
            }
            other => serde_json::from_value(other)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
