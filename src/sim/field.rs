//! Composition field: a population of respawning entities around the observer
//!
//! Owns the tracker and every entity it registers. Decorative content is
//! delegated to a `Decorator`, which is re-run whenever an entity respawns.
//! A periodic distance sweep catches entities the frustum test missed (e.g.
//! the observer was unresolved when they were placed).

use std::collections::HashMap;
use std::f32::consts::TAU;

use glam::{EulerRot, Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::entity::SpatialEntity;
use super::events::{EntityEvent, EntityId, EventKind};
use super::observer::{Observer, ObserverSource};
use super::tracker::{FrustumTracker, SharedEntity, TrackedEntity};
use crate::config::{ConfigError, FieldConfig};
use crate::consts::ANNULUS_ATTEMPTS;
use crate::{planar_distance, planar_offset};

/// Produces the decorative payload attached to each entity
///
/// May also replace the entity's visual parts so bounds follow the new content.
pub trait Decorator {
    type Payload;

    fn decorate(&mut self, entity: &mut SpatialEntity) -> Self::Payload;
}

/// Result of annulus sampling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnulusPlacement {
    pub position: Vec3,
    pub attempts: u32,
    /// True when sampling ran out and the last candidate was pulled into the band
    pub projected: bool,
}

/// Place a point on the ground plane with planar distance in `[min_radius, max_radius]`
///
/// Offsets are drawn from a square of side `spread` centered on `center`.
/// After `ANNULUS_ATTEMPTS` misses the last offset is moved radially into the
/// band, so the result always lies in it.
pub fn sample_annulus<R: Rng + ?Sized>(
    center: Vec3,
    spread: f32,
    min_radius: f32,
    max_radius: f32,
    y: f32,
    rng: &mut R,
) -> AnnulusPlacement {
    let half = spread.max(f32::EPSILON) * 0.5;
    let (mut x, mut z) = (0.0, 0.0);

    for attempt in 1..=ANNULUS_ATTEMPTS {
        x = rng.random_range(-half..=half);
        z = rng.random_range(-half..=half);
        let distance = (x * x + z * z).sqrt();
        if distance >= min_radius && distance <= max_radius {
            return AnnulusPlacement {
                position: planar_offset(center, x, z, y),
                attempts: attempt,
                projected: false,
            };
        }
    }

    let distance = (x * x + z * z).sqrt();
    let (dx, dz) = if distance > f32::EPSILON {
        (x / distance, z / distance)
    } else {
        (1.0, 0.0)
    };
    let r = distance.clamp(min_radius, max_radius);
    AnnulusPlacement {
        position: planar_offset(center, dx * r, dz * r, y),
        attempts: ANNULUS_ATTEMPTS,
        projected: true,
    }
}

/// One registered entity and its decorative payload
#[derive(Debug)]
pub struct Composition<P> {
    tracked: TrackedEntity,
    payload: P,
    regenerations: u32,
}

impl<P> Composition<P> {
    pub fn id(&self) -> EntityId {
        self.tracked.id()
    }

    pub fn entity(&self) -> &SharedEntity {
        self.tracked.entity()
    }

    pub fn position(&self) -> Vec3 {
        self.tracked.entity().borrow().position()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Times the payload was rebuilt after creation
    pub fn regenerations(&self) -> u32 {
        self.regenerations
    }
}

/// Population of respawning entities
pub struct CompositionField<D: Decorator> {
    config: FieldConfig,
    decorator: D,
    tracker: FrustumTracker,
    compositions: Vec<Composition<D::Payload>>,
    /// Back-reference from entity id to its composition slot
    index: HashMap<EntityId, usize>,
    rng: Pcg32,
    seed: u64,
    next_id: u32,
    last_sweep: Option<f64>,
}

impl<D: Decorator> CompositionField<D> {
    pub fn new(config: FieldConfig, decorator: D, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tracker: FrustumTracker::new(config.tracker),
            config,
            decorator,
            compositions: Vec::new(),
            index: HashMap::new(),
            rng: Pcg32::seed_from_u64(seed),
            seed,
            next_id: 1,
            last_sweep: None,
        })
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn tracker(&self) -> &FrustumTracker {
        &self.tracker
    }

    pub fn decorator(&self) -> &D {
        &self.decorator
    }

    pub fn len(&self) -> usize {
        self.compositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compositions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Composition<D::Payload>> {
        self.compositions.iter()
    }

    pub fn get(&self, id: EntityId) -> Option<&Composition<D::Payload>> {
        self.index.get(&id).map(|&i| &self.compositions[i])
    }

    /// Create `count` entities on the annulus around the observer
    ///
    /// Uses the origin when no observer is resolved yet; the sweep corrects
    /// anything that ends up too close once it is.
    pub fn populate<S: ObserverSource + ?Sized>(&mut self, source: &S) {
        let center = match source.observer() {
            Some(observer) => observer.position,
            None => {
                log::warn!("Observer not resolved at populate, placing around origin");
                Vec3::ZERO
            }
        };

        for _ in 0..self.config.count {
            self.spawn_at(center);
        }
        log::info!("Created {} compositions", self.compositions.len());
    }

    fn spawn_at(&mut self, center: Vec3) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        let seed = self
            .seed
            .wrapping_add((id.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

        let mut entity = SpatialEntity::new(id, self.config.respawn, seed);
        let placement = sample_annulus(
            center,
            self.config.spread,
            self.config.min_radius,
            self.config.max_radius,
            self.config.ground_y,
            &mut self.rng,
        );
        entity.set_position(placement.position);
        let payload = self.decorator.decorate(&mut entity);

        let tracked = self.tracker.track(entity);
        self.index.insert(id, self.compositions.len());
        self.compositions.push(Composition {
            tracked,
            payload,
            regenerations: 0,
        });
        id
    }

    /// Remove an entity (unregisters it) and hand back its payload
    pub fn despawn(&mut self, id: EntityId) -> Option<D::Payload> {
        let slot = self.index.remove(&id)?;
        let removed = self.compositions.swap_remove(slot);
        if let Some(moved) = self.compositions.get(slot) {
            self.index.insert(moved.id(), slot);
        }
        Some(removed.payload)
    }

    /// Advance one frame; returns every lifecycle event raised, in order
    pub fn tick<S: ObserverSource + ?Sized>(&mut self, now_ms: f64, source: &S) -> Vec<EntityEvent> {
        let mut events: Vec<EntityEvent> = Vec::new();
        self.tracker.tick(now_ms, source, &mut events);

        for event in &events {
            if event.kind == EventKind::Respawned {
                self.regenerate(event.entity);
            }
        }

        let sweep_due = self
            .last_sweep
            .is_none_or(|last| now_ms - last >= self.config.safety_interval_ms);
        if sweep_due {
            if let Some(observer) = source.observer() {
                self.last_sweep = Some(now_ms);
                self.safety_sweep(&observer);
            }
        }

        events
    }

    /// Rebuild an entity's payload and give it a fresh yaw
    fn regenerate(&mut self, id: EntityId) {
        let Some(&slot) = self.index.get(&id) else {
            return;
        };
        let yaw = self.rng.random_range(0.0..TAU);
        let composition = &mut self.compositions[slot];
        let mut entity = composition.tracked.entity().borrow_mut();

        composition.payload = self.decorator.decorate(&mut entity);
        composition.regenerations += 1;

        // Heading first so only yaw changes; pitch and roll are kept
        let (_, x, z) = entity.transform().rotation.to_euler(EulerRot::YXZ);
        entity.set_rotation(Quat::from_euler(EulerRot::YXZ, yaw, x, z));
    }

    /// Relocate every entity closer than `min_dist` (planar) to the observer
    ///
    /// Returns how many were moved.
    pub fn safety_sweep(&mut self, observer: &Observer) -> usize {
        let min_dist = self.config.respawn.min_dist;
        let too_close: Vec<EntityId> = self
            .compositions
            .iter()
            .filter(|c| planar_distance(c.position(), observer.position) < min_dist)
            .map(|c| c.id())
            .collect();

        for &id in &too_close {
            let placement = sample_annulus(
                observer.position,
                self.config.spread,
                self.config.min_radius.max(min_dist),
                self.config.max_radius.max(min_dist),
                self.config.ground_y,
                &mut self.rng,
            );
            if let Some(&slot) = self.index.get(&id) {
                let mut entity = self.compositions[slot].tracked.entity().borrow_mut();
                log::debug!(
                    "Entity {} too close ({:.1} < {}), repositioning",
                    id,
                    planar_distance(entity.position(), observer.position),
                    min_dist
                );
                entity.set_position(placement.position);
                entity.force_outside();
            }
            self.regenerate(id);
        }

        if !too_close.is_empty() {
            log::info!("Safety sweep repositioned {} compositions", too_close.len());
        }
        too_close.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RespawnConfig;
    use crate::sim::bounds::{Transform, VisualPart};
    use crate::sim::frustum::Aabb;
    use proptest::prelude::*;

    /// Payload is the decoration serial number
    #[derive(Default)]
    struct Serial {
        calls: u32,
    }

    impl Decorator for Serial {
        type Payload = u32;

        fn decorate(&mut self, entity: &mut SpatialEntity) -> u32 {
            self.calls += 1;
            entity.set_parts(vec![VisualPart::new(
                Transform::IDENTITY,
                Aabb::from_center_size(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 2.0, 1.0)),
            )]);
            self.calls
        }
    }

    fn config(count: usize) -> FieldConfig {
        FieldConfig {
            count,
            ..Default::default()
        }
    }

    fn observer() -> Observer {
        Observer::new(Vec3::ZERO, Vec3::NEG_Z, 60.0, 0.1, 1000.0)
    }

    fn field(count: usize) -> CompositionField<Serial> {
        let mut field = CompositionField::new(config(count), Serial::default(), 1234).unwrap();
        field.populate(&observer());
        field
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = FieldConfig {
            respawn: RespawnConfig {
                min_dist: 80.0,
                max_dist: 60.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(CompositionField::new(bad, Serial::default(), 0).is_err());
    }

    #[test]
    fn test_populate_places_all_on_annulus() {
        let cfg = FieldConfig {
            count: 20,
            min_radius: 20.0,
            max_radius: 50.0,
            ..Default::default()
        };
        let mut field = CompositionField::new(cfg, Serial::default(), 99).unwrap();
        field.populate(&observer());

        assert_eq!(field.len(), 20);
        assert_eq!(field.tracker().len(), 20);
        assert_eq!(field.decorator().calls, 20);
        for c in field.iter() {
            let d = planar_distance(c.position(), Vec3::ZERO);
            assert!((20.0 - 0.001..=50.0 + 0.001).contains(&d), "distance {d}");
            assert_eq!(c.position().y, 0.0);
        }
    }

    #[test]
    fn test_populate_without_observer_uses_origin() {
        let mut field = CompositionField::new(config(5), Serial::default(), 7).unwrap();
        let none: Option<Observer> = None;
        field.populate(&none);
        assert_eq!(field.len(), 5);
        for c in field.iter() {
            assert!(planar_distance(c.position(), Vec3::ZERO) >= 20.0 - 0.001);
        }
    }

    #[test]
    fn test_populate_centers_on_observer() {
        let mut field = CompositionField::new(config(10), Serial::default(), 3).unwrap();
        let obs = Observer::new(Vec3::new(100.0, 10.0, -40.0), Vec3::NEG_Z, 60.0, 0.1, 1000.0);
        field.populate(&obs);
        for c in field.iter() {
            let d = planar_distance(c.position(), obs.position);
            assert!((20.0 - 0.001..=50.0 + 0.001).contains(&d));
        }
    }

    #[test]
    fn test_safety_sweep_relocates_close_entity() {
        let mut field = field(3);
        let id = field.iter().next().unwrap().id();
        field.get(id).unwrap().entity().borrow_mut().set_position(Vec3::new(3.0, 0.0, 4.0));

        assert_eq!(field.safety_sweep(&observer()), 1);
        let c = field.get(id).unwrap();
        assert!(planar_distance(c.position(), Vec3::ZERO) >= 20.0 - 0.001);
        assert_eq!(c.regenerations(), 1);
        assert!(!c.entity().borrow().is_inside());
    }

    #[test]
    fn test_sweep_runs_on_its_own_interval() {
        let mut field = field(3);
        let obs = observer();
        field.tick(0.0, &obs);

        let id = field.iter().next().unwrap().id();
        {
            let mut entity = field.get(id).unwrap().entity().borrow_mut();
            entity.set_position(Vec3::new(0.0, 0.0, 5.0));
            entity.force_outside();
        }

        // Behind the observer, so the frustum never sees it; only the sweep can move it
        field.tick(1000.0, &obs);
        assert!(planar_distance(field.get(id).unwrap().position(), Vec3::ZERO) < 20.0);

        field.tick(5000.0, &obs);
        assert!(planar_distance(field.get(id).unwrap().position(), Vec3::ZERO) >= 20.0 - 0.001);
    }

    #[test]
    fn test_respawn_regenerates_payload() {
        let mut field = field(1);
        let id = field.iter().next().unwrap().id();
        field.get(id).unwrap().entity().borrow_mut().set_position(Vec3::new(0.0, 0.0, -30.0));
        let before = *field.get(id).unwrap().payload();

        let mut obs = observer();
        let events = field.tick(0.0, &obs);
        assert_eq!(events, vec![EntityEvent { entity: id, kind: EventKind::EnterView }]);

        obs.forward = Vec3::Z;
        let events = field.tick(100.0, &obs);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::ExitView, EventKind::Respawned]);

        let c = field.get(id).unwrap();
        assert_ne!(*c.payload(), before);
        assert_eq!(c.regenerations(), 1);
        // Upright content keeps pitch and roll at zero
        let up = c.entity().borrow().transform().rotation * Vec3::Y;
        assert!((up - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_despawn_unregisters_and_fixes_index() {
        let mut field = field(3);
        let ids: Vec<_> = field.iter().map(|c| c.id()).collect();

        assert!(field.despawn(ids[0]).is_some());
        assert!(field.despawn(ids[0]).is_none());
        assert_eq!(field.len(), 2);
        assert_eq!(field.tracker().len(), 2);
        assert!(!field.tracker().is_registered(ids[0]));
        // Swapped-in entry still resolves through the index
        assert_eq!(field.get(ids[2]).unwrap().id(), ids[2]);
        assert_eq!(field.get(ids[1]).unwrap().id(), ids[1]);
    }

    #[test]
    fn test_spread_is_full_width() {
        // Inner radius 0 accepts the first draw, so it shows the raw offset range
        let mut rng = Pcg32::seed_from_u64(8);
        for _ in 0..200 {
            let placement = sample_annulus(Vec3::ZERO, 10.0, 0.0, 100.0, 0.0, &mut rng);
            assert_eq!(placement.attempts, 1);
            assert!(placement.position.x.abs() <= 5.0 && placement.position.z.abs() <= 5.0);
        }
    }

    #[test]
    fn test_tiny_spread_projects_into_band() {
        let mut rng = Pcg32::seed_from_u64(4);
        let placement = sample_annulus(Vec3::ZERO, 1.0, 20.0, 50.0, 0.0, &mut rng);
        assert!(placement.projected);
        assert_eq!(placement.attempts, ANNULUS_ATTEMPTS);
        let d = planar_distance(placement.position, Vec3::ZERO);
        assert!((d - 20.0).abs() < 0.001);
    }

    proptest! {
        #[test]
        fn prop_annulus_always_in_band(
            spread in 0.0f32..200.0,
            min_radius in 0.0f32..80.0,
            width in 0.1f32..80.0,
            seed in any::<u64>(),
        ) {
            let mut rng = Pcg32::seed_from_u64(seed);
            let center = Vec3::new(5.0, 10.0, -5.0);
            let placement = sample_annulus(center, spread, min_radius, min_radius + width, 0.0, &mut rng);
            let d = planar_distance(placement.position, center);
            prop_assert!(d >= min_radius - 0.01 && d <= min_radius + width + 0.01);
            prop_assert!(placement.attempts <= ANNULUS_ATTEMPTS);
        }
    }
}
