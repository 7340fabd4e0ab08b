//! Message Envelope Module
//!
//! Every frame exchanged with clients and engines is a structured record of
//! three parts:
//!
//! - **`header`**: the message's own identity (`msg_id`, `msg_type`) plus the
//!   sender's `username`/`session` and any extra routing fields (the
//!   "subheader", e.g. `targets` and `submsg_type` on a relay request).
//! - **`parent_header`**: empty for a fresh request, equal to the request's
//!   header on a reply. This is the correlation back-reference.
//! - **`content`**: opaque JSON payload, never inspected by the relay path.
//!
//! Frames are unpacked exactly once at the controller boundary; after that the
//! pipeline works on typed values.

pub mod session;
pub mod types;
