//! Engine Controller Library
//!
//! A broker that sits between clients and a pool of compute engines. Engines
//! register with the controller and are watched by heartbeat; clients send
//! requests that are relayed to one or more engines, and the engines' replies
//! are routed back to the client that asked.
//!
//! ## Architecture Modules
//! - **`message`**: the envelope every frame is unpacked into (header, parent
//!   header, content) and the `Session` that builds outgoing messages.
//! - **`registry`**: engine records with numeric id reuse, reverse identity
//!   lookups, and the table correlating outstanding requests with clients.
//! - **`heartbeat`**: round-based liveness state machine per engine heart.
//! - **`scheduler`**: weighted power-of-two-choices placement for task requests.
//! - **`controller`**: the dispatch core and the single-task event loop that
//!   drives it.
//! - **`transport`**: the `Outbound` seam plus TCP/UDP and in-memory
//!   implementations.
//! - **`http`**: read-only status endpoints.
//! - **`config`**: command line and environment configuration.

pub mod config;
pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod message;
pub mod registry;
pub mod scheduler;
pub mod transport;
