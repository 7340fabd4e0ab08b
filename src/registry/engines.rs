//! Engine Registry
//!
//! Owns every `Engine` record and the reverse indexes used to recognise
//! engines by the identity they show up with on the queue and heartbeat
//! channels.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::types::{Engine, EngineId, Targets};
use crate::error::{BrokerError, BrokerResult};
use crate::message::types::{Identity, MsgId};

#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<EngineId, Engine>,
    by_queue: HashMap<Identity, EngineId>,
    by_heartbeat: HashMap<Identity, EngineId>,
}

impl EngineRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine under the lowest unused id.
    pub fn register(
        &mut self,
        uuid: String,
        queue: Identity,
        heartbeat: Option<Identity>,
    ) -> EngineId {
        let id = self.next_free_id();

        self.by_queue.insert(queue.clone(), id);
        if let Some(heart) = &heartbeat {
            self.by_heartbeat.insert(heart.clone(), id);
        }

        self.engines.insert(
            id,
            Engine {
                id,
                uuid,
                queue,
                heartbeat,
                pending: BTreeSet::new(),
            },
        );

        tracing::info!("Engine {} registered ({} total)", id, self.engines.len());

        id
    }

    /// Removes an engine and its reverse indexes.
    ///
    /// The returned record still carries the engine's outstanding request ids
    /// so the caller can reconcile the pending table.
    pub fn unregister(&mut self, id: EngineId) -> BrokerResult<Engine> {
        let engine = self
            .engines
            .remove(&id)
            .ok_or_else(|| BrokerError::UnknownEngine(vec![id]))?;

        self.by_queue.remove(&engine.queue);
        if let Some(heart) = &engine.heartbeat {
            self.by_heartbeat.remove(heart);
        }

        tracing::info!(
            "Engine {} unregistered with {} outstanding request(s)",
            id,
            engine.pending.len()
        );

        Ok(engine)
    }

    /// Finds the engine reached through `queue` on the queue channel.
    pub fn lookup_by_queue_identity(&self, queue: &Identity) -> Option<EngineId> {
        self.by_queue.get(queue).copied()
    }

    /// Finds the engine whose heart answers as `heart`.
    pub fn lookup_by_heartbeat_identity(&self, heart: &Identity) -> Option<EngineId> {
        self.by_heartbeat.get(heart).copied()
    }

    /// Turns a `Targets` selection into the list of engines to address.
    ///
    /// Every unknown id is reported at once. Duplicates in an explicit list are
    /// collapsed, keeping first occurrence order.
    pub fn resolve_targets(&self, targets: &Targets) -> BrokerResult<Vec<EngineId>> {
        let resolved: Vec<EngineId> = match targets {
            Targets::All => self.engines.keys().copied().collect(),
            Targets::One(id) => vec![*id],
            Targets::Many(ids) => {
                let mut seen = BTreeSet::new();
                ids.iter().copied().filter(|id| seen.insert(*id)).collect()
            }
        };

        let unknown: Vec<EngineId> = resolved
            .iter()
            .copied()
            .filter(|id| !self.engines.contains_key(id))
            .collect();

        if !unknown.is_empty() {
            return Err(BrokerError::UnknownEngine(unknown));
        }

        if resolved.is_empty() {
            return Err(BrokerError::NoEnginesRegistered);
        }

        Ok(resolved)
    }

    /// Returns the engine record for `id`, if registered.
    pub fn get(&self, id: EngineId) -> Option<&Engine> {
        self.engines.get(&id)
    }

    /// Checks whether `id` is currently registered.
    pub fn contains(&self, id: EngineId) -> bool {
        self.engines.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<EngineId> {
        self.engines.keys().copied().collect()
    }

    /// Iterates over registered engines in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Engine> {
        self.engines.values()
    }

    /// Number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Returns `true` when no engine is registered.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Attributes an outstanding request to an engine.
    ///
    /// # Arguments
    /// * `id` - The engine that owes the reply.
    /// * `request` - Id of the message sent to that engine.
    ///
    /// # Returns
    /// `UnknownEngine` if `id` is not registered.
    pub fn add_pending(&mut self, id: EngineId, request: MsgId) -> BrokerResult<()> {
        let engine = self
            .engines
            .get_mut(&id)
            .ok_or_else(|| BrokerError::UnknownEngine(vec![id]))?;
        engine.pending.insert(request);
        Ok(())
    }

    /// Clears an outstanding request. Returns whether the engine owed it.
    pub fn remove_pending(&mut self, id: EngineId, request: &MsgId) -> bool {
        self.engines
            .get_mut(&id)
            .is_some_and(|engine| engine.pending.remove(request))
    }

    /// Outstanding request count per engine, in id order.
    pub fn loads(&self) -> Vec<(EngineId, usize)> {
        self.engines
            .values()
            .map(|engine| (engine.id, engine.pending.len()))
            .collect()
    }

    fn next_free_id(&self) -> EngineId {
        // keys are sorted, so the first gap is the lowest free id
        let mut candidate = 0u32;
        for id in self.engines.keys() {
            if id.0 != candidate {
                break;
            }
            candidate += 1;
        }
        EngineId(candidate)
    }
}
