//! Offscreen Respawn - frustum-gated object lifecycle
//!
//! Core modules:
//! - `sim`: Visibility tracking, bounding volumes and respawn placement
//! - `config`: Data-driven tuning for trackers, entities and the composition field

pub mod config;
pub mod sim;

pub use config::{ConfigError, FieldConfig, RespawnConfig, TrackerConfig};

use glam::Vec3;

/// Engine configuration constants
pub mod consts {
    /// Default interval between visibility broadcasts (~16 checks per second)
    pub const THROTTLE_MS: f64 = 60.0;
    /// Interval of the composition field's distance sweep
    pub const SAFETY_INTERVAL_MS: f64 = 5000.0;

    /// Counted placement attempts before the fallback position is used
    pub const RESPAWN_ATTEMPTS: u32 = 20;
    /// Cap on direction draws rejected by the exclusion cone, per respawn
    pub const MAX_CONE_REJECTIONS: u32 = 512;
    /// Respawns never land closer than `near + NEAR_BUFFER`
    pub const NEAR_BUFFER: f32 = 0.5;
    /// Respawns never land further than `far * FAR_SAFETY_FACTOR`
    pub const FAR_SAFETY_FACTOR: f32 = 0.9;

    /// Rejection-sampling attempts for annulus placement
    pub const ANNULUS_ATTEMPTS: u32 = 50;

    /// Radius used when an entity has no geometry at all
    pub const FALLBACK_SPHERE_RADIUS: f32 = 1.0;
    /// Squared length below which a sampled direction is considered degenerate
    pub const DEGENERATE_LENGTH_SQ: f32 = 1e-6;
}

/// Distance between two points ignoring the vertical (Y) axis
#[inline]
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

/// Offset `origin` horizontally by `(x, z)` and place the result at height `y`
#[inline]
pub fn planar_offset(origin: Vec3, x: f32, z: f32, y: f32) -> Vec3 {
    Vec3::new(origin.x + x, y, origin.z + z)
}
