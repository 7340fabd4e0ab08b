use std::collections::HashMap;

use super::types::{HeartState, Tick};
use crate::message::types::Identity;

#[derive(Debug, Clone)]
struct Heart {
    state: HeartState,
    missed: u32,
    /// Pinged in the current round.
    pinged: bool,
    /// Answered the current round.
    responded: bool,
}

/// Per-heart liveness state machine.
#[derive(Debug)]
pub struct HeartMonitor {
    hearts: HashMap<Identity, Heart>,
    beat: u64,
    max_misses: u32,
}

impl HeartMonitor {
    /// `max_misses` is the number of consecutive silent rounds that kills a
    /// heart; it is at least 1.
    pub fn new(max_misses: u32) -> Self {
        Self {
            hearts: HashMap::new(),
            beat: 0,
            max_misses: max_misses.max(1),
        }
    }

    /// Starts watching a heart. It is first pinged on the next round.
    pub fn track(&mut self, heart: Identity) {
        self.hearts.entry(heart).or_insert(Heart {
            state: HeartState::Unknown,
            missed: 0,
            pinged: false,
            responded: false,
        });
    }

    pub fn untrack(&mut self, heart: &Identity) -> Option<HeartState> {
        self.hearts.remove(heart).map(|h| h.state)
    }

    /// Records an answer. Returns the heart's state afterwards, or `None` if the
    /// heart is not tracked.
    pub fn beat(&mut self, heart: &Identity, beat: u64) -> Option<HeartState> {
        let Some(entry) = self.hearts.get_mut(heart) else {
            tracing::debug!("Heartbeat from untracked heart {}", heart);
            return None;
        };

        if entry.state == HeartState::Dead {
            tracing::debug!("Ignoring heartbeat from dead heart {}", heart);
            return Some(HeartState::Dead);
        }

        if beat != self.beat {
            tracing::trace!(
                "Stale heartbeat from {} (beat {}, current {})",
                heart,
                beat,
                self.beat
            );
            return Some(entry.state);
        }

        if entry.state != HeartState::Alive {
            tracing::info!("Heart {} is alive", heart);
        }

        entry.state = HeartState::Alive;
        entry.missed = 0;
        entry.responded = true;

        Some(entry.state)
    }

    /// Closes the current round and opens the next one.
    pub fn tick(&mut self) -> Tick {
        let mut failed = Vec::new();

        for (heart, entry) in self.hearts.iter_mut() {
            if entry.state == HeartState::Dead {
                continue;
            }

            if entry.pinged && !entry.responded {
                entry.missed += 1;

                if entry.missed >= self.max_misses {
                    tracing::warn!(
                        "Heart {} declared DEAD after {} missed beat(s)",
                        heart,
                        entry.missed
                    );
                    entry.state = HeartState::Dead;
                    failed.push(heart.clone());
                } else {
                    tracing::debug!("Heart {} missed beat {}", heart, self.beat);
                    entry.state = HeartState::Suspect;
                }
            }

            entry.responded = false;
        }

        self.beat += 1;

        let mut pings = Vec::new();
        for (heart, entry) in self.hearts.iter_mut() {
            if entry.state != HeartState::Dead {
                entry.pinged = true;
                pings.push(heart.clone());
            }
        }

        Tick {
            beat: self.beat,
            pings,
            failed,
        }
    }

    pub fn state(&self, heart: &Identity) -> Option<HeartState> {
        self.hearts.get(heart).map(|h| h.state)
    }

    pub fn current_beat(&self) -> u64 {
        self.beat
    }

    pub fn len(&self) -> usize {
        self.hearts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hearts.is_empty()
    }
}
