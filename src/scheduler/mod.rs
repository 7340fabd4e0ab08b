//! Task Scheduler Module
//!
//! Picks a single destination engine for task requests, as opposed to the
//! explicit multi-target relay.
//!
//! - **`weighted`**: weighted "power of two choices". Two distinct candidates are
//!   drawn with probability proportional to their weight and the less loaded one
//!   wins.
//! - **`task`**: `TaskScheduler`, which feeds engine loads into the draw.

pub mod task;
pub mod weighted;
