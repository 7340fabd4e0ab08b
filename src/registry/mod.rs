//! Engine Registry & Pending-Request Table
//!
//! Bookkeeping owned by the dispatch core:
//!
//! - **`engines`**: `EngineRegistry` maps engine numeric id ⇄ queue identity ⇄
//!   heartbeat identity, assigns the lowest free id on registration and tracks
//!   which outstanding requests each engine owes.
//! - **`pending`**: `PendingTable` maps an outstanding request id to the client
//!   waiting for it and the header of that client's original request.
//!
//! Neither structure is shared. The controller is the only writer, and it keeps
//! the two in step: every id in an engine's pending set has a table entry and
//! every table entry names exactly one engine.

pub mod engines;
pub mod pending;
pub mod types;
