//! Bounding volume resolution
//!
//! Three tiers, first match wins:
//! 1. Fixed radius around the entity position
//! 2. Local sphere of the first part with geometry, cached once and moved to world space
//! 3. World-space box around all geometry (unit sphere when there is none)

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::frustum::{Aabb, BoundingSphere};
use crate::consts::FALLBACK_SPHERE_RADIUS;

/// Translation, rotation and scale of an object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// One node of an entity's visual subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualPart {
    /// Transform relative to the owning entity
    pub local: Transform,
    /// Local-space extent of the part's geometry (None while loading)
    pub geometry: Option<Aabb>,
}

impl VisualPart {
    pub fn new(local: Transform, geometry: Aabb) -> Self {
        Self {
            local,
            geometry: Some(geometry),
        }
    }

    /// A part whose geometry has not arrived yet
    pub fn pending(local: Transform) -> Self {
        Self {
            local,
            geometry: None,
        }
    }
}

/// Which tier produced a sphere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsTier {
    Fixed,
    Cached,
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedSphere {
    part: usize,
    local: BoundingSphere,
}

/// Bounding volume policy state for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    radius: f32,
    cached: Option<CachedSphere>,
}

impl Bounds {
    /// `radius > 0` pins the sphere size; 0 derives it from geometry
    pub fn new(radius: f32) -> Self {
        Self {
            radius: radius.max(0.0),
            cached: None,
        }
    }

    /// Capture the local sphere of the first part with geometry
    ///
    /// Runs once: returns false if already captured, if a fixed radius is set,
    /// or if no geometry is available yet.
    pub fn capture(&mut self, parts: &[VisualPart]) -> bool {
        if self.radius > 0.0 || self.cached.is_some() {
            return false;
        }
        let found = parts.iter().enumerate().find_map(|(i, part)| {
            part.geometry
                .filter(|g| !g.is_empty())
                .map(|g| (i, g.bounding_sphere()))
        });
        match found {
            Some((part, local)) => {
                self.cached = Some(CachedSphere { part, local });
                true
            }
            None => false,
        }
    }

    /// Forget the cached sphere (the visual subtree was replaced)
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Tier that `resolve` will use
    pub fn tier(&self, parts: &[VisualPart]) -> BoundsTier {
        if self.radius > 0.0 {
            BoundsTier::Fixed
        } else if self.cached.is_some_and(|c| c.part < parts.len()) {
            BoundsTier::Cached
        } else {
            BoundsTier::Subtree
        }
    }

    /// World-space sphere for an entity placed at `transform`
    pub fn resolve(&self, transform: &Transform, parts: &[VisualPart]) -> BoundingSphere {
        if self.radius > 0.0 {
            return BoundingSphere::new(transform.translation, self.radius);
        }

        let entity_world = transform.matrix();

        if let Some(cached) = self.cached {
            if let Some(part) = parts.get(cached.part) {
                let world = entity_world * part.local.matrix();
                let center = world.transform_point3(cached.local.center);
                // Uniform-scale approximation
                let (scale, _, _) = world.to_scale_rotation_translation();
                let s = scale.abs().max_element();
                return BoundingSphere::new(center, cached.local.radius * s);
            }
        }

        let subtree = parts
            .iter()
            .filter_map(|part| {
                part.geometry
                    .map(|g| g.transformed(&(entity_world * part.local.matrix())))
            })
            .fold(Aabb::empty(), |acc, b| acc.union(&b));

        if subtree.is_empty() {
            BoundingSphere::new(transform.translation, FALLBACK_SPHERE_RADIUS)
        } else {
            subtree.bounding_sphere()
        }
    }
}
