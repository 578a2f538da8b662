//! Spatial entity: bounds, visibility state and respawn on exit

use glam::{Quat, Vec3};
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::bounds::{Bounds, BoundsTier, Transform, VisualPart};
use super::events::{EntityEvent, EntityId, EventKind, EventSink};
use super::frustum::{Aabb, BoundingSphere, ViewVolume};
use super::observer::Observer;
use super::respawn::{Placement, place_offscreen};
use crate::config::RespawnConfig;

/// Whether an entity is currently in view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    Inside,
    #[default]
    Outside,
}

/// Read-only inputs shared by every test in one tracker cycle
#[derive(Debug, Clone, Copy)]
pub struct Cycle<'a> {
    pub observer: &'a Observer,
    pub volume: &'a ViewVolume,
}

/// An object whose lifetime is gated by the observer's view
#[derive(Debug, Clone)]
pub struct SpatialEntity {
    id: EntityId,
    transform: Transform,
    parts: Vec<VisualPart>,
    bounds: Bounds,
    config: RespawnConfig,
    visibility: Visibility,
    rng: Pcg32,
    last_placement: Option<Placement>,
}

impl SpatialEntity {
    /// New entity at the origin, outside the view, with no visuals yet
    ///
    /// An invalid `config` is accepted (and logged); placement still terminates
    /// without panicking, though positions may fall outside the intended band.
    pub fn new(id: EntityId, config: RespawnConfig, seed: u64) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("Entity {} created with invalid respawn config: {}", id, e);
        }
        Self {
            id,
            transform: Transform::IDENTITY,
            parts: Vec::new(),
            bounds: Bounds::new(config.radius),
            config,
            visibility: Visibility::Outside,
            rng: Pcg32::seed_from_u64(seed),
            last_placement: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn config(&self) -> &RespawnConfig {
        &self.config
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.translation = position;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_inside(&self) -> bool {
        self.visibility == Visibility::Inside
    }

    /// Mark as out of view without raising events
    pub fn force_outside(&mut self) {
        self.visibility = Visibility::Outside;
    }

    /// Placement chosen by the most recent respawn
    pub fn last_placement(&self) -> Option<&Placement> {
        self.last_placement.as_ref()
    }

    /// Entity-owned RNG (seeded per entity)
    pub fn rng(&mut self) -> &mut Pcg32 {
        &mut self.rng
    }

    pub fn parts(&self) -> &[VisualPart] {
        &self.parts
    }

    /// Replace the visual subtree
    ///
    /// The cached local sphere belonged to the old subtree, so it is dropped and
    /// re-captured from the new parts if their geometry is already present.
    pub fn set_parts(&mut self, parts: Vec<VisualPart>) {
        self.parts = parts;
        self.bounds.invalidate();
        self.bounds.capture(&self.parts);
    }

    /// Geometry for a pending part arrived
    pub fn set_part_geometry(&mut self, index: usize, geometry: Aabb) {
        if let Some(part) = self.parts.get_mut(index) {
            part.geometry = Some(geometry);
            self.bounds.capture(&self.parts);
        }
    }

    pub fn bounds_tier(&self) -> BoundsTier {
        self.bounds.tier(&self.parts)
    }

    /// World-space bounding sphere at the current transform
    pub fn resolve_bounds(&self) -> BoundingSphere {
        self.bounds.resolve(&self.transform, &self.parts)
    }

    /// World-space bounding sphere if the entity were at `transform`
    pub fn resolve_bounds_at(&self, transform: &Transform) -> BoundingSphere {
        self.bounds.resolve(transform, &self.parts)
    }

    /// Test against this cycle's view volume and apply the enter/exit transition
    ///
    /// Returns true if the state changed.
    pub fn test_visibility(&mut self, cycle: &Cycle<'_>, events: &mut dyn EventSink) -> bool {
        let visible = cycle.volume.intersects_sphere(&self.resolve_bounds());

        match (visible, self.visibility) {
            (true, Visibility::Outside) => {
                self.visibility = Visibility::Inside;
                log::debug!("Entity {} entered view", self.id);
                events.emit(self.event(EventKind::EnterView));
                true
            }
            (false, Visibility::Inside) => {
                self.visibility = Visibility::Outside;
                log::debug!("Entity {} left view", self.id);
                events.emit(self.event(EventKind::ExitView));
                self.respawn(cycle, events);
                true
            }
            _ => false,
        }
    }

    /// Move to a fresh off-screen placement and raise `Respawned`
    pub fn respawn(&mut self, cycle: &Cycle<'_>, events: &mut dyn EventSink) -> Placement {
        let placement = {
            let bounds = &self.bounds;
            let parts = &self.parts;
            place_offscreen(
                cycle.observer,
                cycle.volume,
                &self.config,
                &self.transform,
                |t| bounds.resolve(t, parts),
                &mut self.rng,
            )
        };

        self.transform.translation = placement.position;
        self.transform.rotation = placement.rotation;
        self.last_placement = Some(placement);
        log::debug!(
            "Entity {} respawned at ({:.1}, {:.1}, {:.1}) {:?}",
            self.id,
            placement.position.x,
            placement.position.y,
            placement.position.z,
            placement.outcome
        );
        events.emit(self.event(EventKind::Respawned));
        placement
    }

    fn event(&self, kind: EventKind) -> EntityEvent {
        EntityEvent {
            entity: self.id,
            kind,
        }
    }
}
