//! Controller Module
//!
//! The dispatch core of the broker.
//!
//! ## Core Mechanisms
//! - **Handler tables**: registration and client messages are routed by
//!   `msg_type` through tables of plain function pointers.
//! - **Relaying**: a client request is fanned out to its target engines, each
//!   copy recorded as pending until that engine's reply comes back.
//! - **Failure reconciliation**: when an engine goes away, whether it asked to
//!   or its heart stopped, its outstanding requests are dropped and the
//!   waiting clients told.
//!
//! ## Concurrency
//! All state lives in one `Controller` driven by a single `EventLoop` task.
//! Nothing is shared, so nothing is locked.

pub mod controller;
pub mod event_loop;
pub mod protocol;

#[cfg(test)]
mod tests;
