//! Heartbeat Monitor Module
//!
//! Tracks engine liveness with numbered heartbeat rounds.
//!
//! ## Core Mechanisms
//! - **Rounds**: every tick of the heartbeat interval closes the current round and
//!   opens the next one, pinging every heart that is not dead.
//! - **Failure Detection**: a heart that does not answer a round it was pinged in
//!   becomes `Suspect`; after `max_misses` consecutive silent rounds it is `Dead`
//!   and reported as failed exactly once.
//! - **Stale replies**: an answer carrying an old round number does not count.
//!
//! The monitor never touches the engine registry. Failures are handed back to
//! the controller, which unregisters the engine the same way a voluntary
//! unregistration would.

pub mod monitor;
pub mod types;
