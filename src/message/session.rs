//! Message factory.
//!
//! A `Session` stamps outgoing messages with the controller's username and
//! session id and gives each one a fresh `MsgId`.

use serde_json::{Map, Value};

use super::types::{Header, Message, MsgId};

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub session: String,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            session: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Builds a fresh header of the given type.
    pub fn header(&self, msg_type: &str) -> Header {
        Header {
            msg_id: MsgId::new(),
            msg_type: msg_type.to_string(),
            username: self.username.clone(),
            session: self.session.clone(),
            subheader: Map::new(),
        }
    }

    /// Builds a message, optionally parented on `parent` and carrying extra
    /// header fields.
    pub fn msg(
        &self,
        msg_type: &str,
        content: Value,
        parent: Option<&Header>,
        subheader: Map<String, Value>,
    ) -> Message {
        let mut header = self.header(msg_type);
        header.subheader = subheader;

        Message {
            header,
            parent_header: parent.cloned(),
            content,
        }
    }

    /// Shorthand for a reply to `parent` with no extra header fields.
    pub fn reply(&self, msg_type: &str, content: Value, parent: &Header) -> Message {
        self.msg(msg_type, content, Some(parent), Map::new())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("controller")
    }
}
