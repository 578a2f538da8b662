//! Throttled view volume tracking
//!
//! One broadcast per throttle interval: poll the observer, rebuild the view
//! volume, then have every registered entity test itself against it.
//! - The registry is snapshotted before iterating, so entities may register or
//!   unregister from inside event callbacks
//! - Entries are visited in ascending id order
//! - Entities never receive a partially rebuilt volume

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use super::entity::{Cycle, SpatialEntity};
use super::events::{EntityId, EventSink};
use super::frustum::ViewVolume;
use super::observer::{Observer, ObserverSource};
use crate::config::TrackerConfig;

/// Entity handle shared between its owner and the tracker
pub type SharedEntity = Rc<RefCell<SpatialEntity>>;

#[derive(Debug)]
struct Entry {
    entity: Weak<RefCell<SpatialEntity>>,
    generation: u64,
    handles: usize,
}

#[derive(Debug, Default)]
struct Registry {
    entries: BTreeMap<EntityId, Entry>,
    next_generation: u64,
}

impl Registry {
    fn register(&mut self, id: EntityId, entity: &SharedEntity) -> u64 {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.entity = Rc::downgrade(entity);
            entry.handles += 1;
            return entry.generation;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(
            id,
            Entry {
                entity: Rc::downgrade(entity),
                generation,
                handles: 1,
            },
        );
        generation
    }

    fn release(&mut self, id: EntityId, generation: u64) {
        let remove = match self.entries.get_mut(&id) {
            Some(entry) if entry.generation == generation => {
                entry.handles = entry.handles.saturating_sub(1);
                entry.handles == 0
            }
            _ => false,
        };
        if remove {
            self.entries.remove(&id);
        }
    }

    fn is_current(&self, id: EntityId, generation: u64) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.generation == generation)
    }
}

/// Cloneable handle for registering entities, usable while a broadcast runs
#[derive(Debug, Clone)]
pub struct Registrar {
    registry: Rc<RefCell<Registry>>,
}

impl Registrar {
    /// Subscribe an entity under `id` (idempotent per id)
    ///
    /// Never borrows the entity, so it may be called for the very entity whose
    /// callback is running.
    pub fn register(&self, id: EntityId, entity: &SharedEntity) -> Registration {
        let generation = self.registry.borrow_mut().register(id, entity);
        Registration {
            id,
            generation,
            registry: Rc::downgrade(&self.registry),
        }
    }
}

/// Scoped subscription; dropping it unregisters the entity
#[derive(Debug)]
#[must_use = "dropping a Registration unregisters the entity immediately"]
pub struct Registration {
    id: EntityId,
    generation: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Registration {
    pub fn id(&self) -> EntityId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().release(self.id, self.generation);
        }
    }
}

/// An entity together with its tracker subscription
#[derive(Debug)]
pub struct TrackedEntity {
    entity: SharedEntity,
    registration: Registration,
}

impl TrackedEntity {
    pub fn id(&self) -> EntityId {
        self.registration.id()
    }

    pub fn entity(&self) -> &SharedEntity {
        &self.entity
    }
}

/// Throttled frustum tracker
#[derive(Debug)]
pub struct FrustumTracker {
    config: TrackerConfig,
    registry: Rc<RefCell<Registry>>,
    last_update: Option<f64>,
    last_view: Option<(Observer, ViewVolume)>,
}

impl Default for FrustumTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl FrustumTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            registry: Rc::new(RefCell::new(Registry::default())),
            last_update: None,
            last_view: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registrar(&self) -> Registrar {
        Registrar {
            registry: Rc::clone(&self.registry),
        }
    }

    /// Subscribe an entity under `id` (idempotent per id)
    pub fn register(&self, id: EntityId, entity: &SharedEntity) -> Registration {
        self.registrar().register(id, entity)
    }

    /// Wrap an entity in a shared handle and subscribe it
    pub fn track(&self, entity: SpatialEntity) -> TrackedEntity {
        let id = entity.id();
        let entity = Rc::new(RefCell::new(entity));
        let registration = self.register(id, &entity);
        TrackedEntity {
            entity,
            registration,
        }
    }

    /// Remove an entity regardless of outstanding handles; no-op if absent
    pub fn unregister(&self, id: EntityId) {
        self.registry.borrow_mut().entries.remove(&id);
    }

    pub fn is_registered(&self, id: EntityId) -> bool {
        self.registry.borrow().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time of the last completed broadcast
    pub fn last_update(&self) -> Option<f64> {
        self.last_update
    }

    /// Observer and volume used by the last broadcast
    pub fn last_view(&self) -> Option<&(Observer, ViewVolume)> {
        self.last_view.as_ref()
    }

    /// Run one tracker cycle; returns true if a broadcast happened
    pub fn tick<S>(&mut self, now_ms: f64, source: &S, events: &mut dyn EventSink) -> bool
    where
        S: ObserverSource + ?Sized,
    {
        if self
            .last_update
            .is_some_and(|last| now_ms - last < self.config.throttle_ms)
        {
            return false;
        }

        let Some(observer) = source.observer() else {
            // Not resolved yet; try again next frame
            return false;
        };

        let volume = observer.view_volume();
        self.last_update = Some(now_ms);

        let snapshot: Vec<_> = {
            let mut registry = self.registry.borrow_mut();
            registry
                .entries
                .retain(|_, entry| entry.entity.strong_count() > 0);
            registry
                .entries
                .iter()
                .map(|(&id, entry)| (id, entry.generation, entry.entity.clone()))
                .collect()
        };

        let cycle = Cycle {
            observer: &observer,
            volume: &volume,
        };
        for (id, generation, weak) in snapshot {
            // Unregistered by an earlier callback in this broadcast
            if !self.registry.borrow().is_current(id, generation) {
                continue;
            }
            let Some(entity) = weak.upgrade() else {
                continue;
            };
            let Ok(mut entity) = entity.try_borrow_mut() else {
                log::trace!("Entity {} busy, skipped this cycle", id);
                continue;
            };
            entity.test_visibility(&cycle, events);
        }

        self.last_view = Some((observer, volume));
        true
    }
}
