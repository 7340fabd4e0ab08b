use rand::SeedableRng;
use rand::rngs::StdRng;

use super::weighted::{SchedulerError, weighted_two_choice};
use crate::registry::types::EngineId;

/// Chooses the engine a task request goes to.
#[derive(Debug)]
pub struct TaskScheduler {
    rng: StdRng,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic scheduler, for tests and reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks one engine from `(id, outstanding requests)` pairs.
    ///
    /// Each engine holds `outstanding + 1` tickets so an idle engine can still
    /// be drawn and the total is never zero.
    pub fn pick(&mut self, loads: &[(EngineId, usize)]) -> Result<EngineId, SchedulerError> {
        let weights: Vec<u64> = loads
            .iter()
            .map(|(_, load)| (*load as u64).saturating_add(1))
            .collect();

        let idx = weighted_two_choice(&weights, &mut self.rng)?;

        tracing::trace!("Scheduler picked engine {} from {:?}", loads[idx].0, loads);

        Ok(loads[idx].0)
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}
