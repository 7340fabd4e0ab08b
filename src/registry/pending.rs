//! Pending-Request Table
//!
//! Correlates replies with the client requests that caused them.

use std::collections::HashMap;

use super::types::PendingRequest;
use crate::message::types::MsgId;

#[derive(Debug, Default)]
pub struct PendingTable {
    requests: HashMap<MsgId, PendingRequest>,
}

impl PendingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outstanding request. A record with the same id is replaced.
    pub fn insert(&mut self, request: PendingRequest) -> Option<PendingRequest> {
        self.requests.insert(request.request_id.clone(), request)
    }

    /// Removes and returns the record for `request_id`, if outstanding.
    pub fn remove(&mut self, request_id: &MsgId) -> Option<PendingRequest> {
        self.requests.remove(request_id)
    }

    /// Looks up an outstanding request without removing it.
    pub fn get(&self, request_id: &MsgId) -> Option<&PendingRequest> {
        self.requests.get(request_id)
    }

    /// Checks whether `request_id` is still awaiting a reply.
    pub fn contains(&self, request_id: &MsgId) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Removes every listed id, returning the records that were present.
    pub fn remove_all<'a>(
        &mut self,
        request_ids: impl IntoIterator<Item = &'a MsgId>,
    ) -> Vec<PendingRequest> {
        request_ids
            .into_iter()
            .filter_map(|id| self.requests.remove(id))
            .collect()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
