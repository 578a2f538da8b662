//! Off-screen respawn placement
//!
//! Picks a position outside an enlarged view cone within a distance band:
//! - Exclusion cone: half angle = fov/2 + margin around the view direction
//! - Band: [max(min_dist, near + buffer), min(max_dist, far * safety)]
//! - Bounded rejection sampling, then a fixed spot behind the observer

use std::f32::consts::{PI, TAU};

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;

use super::bounds::Transform;
use super::frustum::{BoundingSphere, ViewVolume};
use super::observer::Observer;
use crate::config::RespawnConfig;
use crate::consts::*;
use crate::planar_distance;

/// Float slack on the distance band check
const BAND_EPSILON: f32 = 1e-3;

/// How a placement was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Accepted a sampled candidate after `attempts` counted attempts
    Sampled { attempts: u32 },
    /// No candidate passed; placed behind the observer
    Fallback,
}

/// A committed respawn pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
    pub outcome: PlacementOutcome,
}

impl Placement {
    pub fn is_fallback(&self) -> bool {
        self.outcome == PlacementOutcome::Fallback
    }
}

/// Cosine of the exclusion cone half angle
///
/// Directions with `dot(forward, d) >= cos_limit` are inside the cone.
pub fn exclusion_cos_limit(observer: &Observer, config: &RespawnConfig) -> f32 {
    (observer.half_fov() + config.margin_deg.to_radians()).cos()
}

/// True when `dir` lies inside the exclusion cone (boundary included)
#[inline]
pub fn in_exclusion_cone(forward: Vec3, dir: Vec3, cos_limit: f32) -> bool {
    forward.dot(dir) >= cos_limit
}

/// Effective `(min, max)` respawn distance for this observer
///
/// Collapses to `min` when the far plane is closer than the near bound.
pub fn distance_band(observer: &Observer, config: &RespawnConfig) -> (f32, f32) {
    let eff_min = config.min_dist.max(observer.near + NEAR_BUFFER);
    let eff_max = config.max_dist.min(observer.far * FAR_SAFETY_FACTOR);
    (eff_min, eff_max.max(eff_min))
}

/// Uniformly distributed unit vector
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let mut v = Vec3::ZERO;
    for _ in 0..16 {
        v = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        let len_sq = v.length_squared();
        if len_sq <= 1.0 && len_sq >= DEGENERATE_LENGTH_SQ {
            return v / len_sq.sqrt();
        }
    }
    // Out of tries: take the last draw anyway unless it collapsed
    if v.length_squared() < DEGENERATE_LENGTH_SQ {
        Vec3::X
    } else {
        v.normalize()
    }
}

/// Random yaw, or random rotation on all three axes
pub fn random_orientation<R: Rng + ?Sized>(rng: &mut R, yaw_only: bool) -> Quat {
    if yaw_only {
        Quat::from_rotation_y(rng.random_range(0.0..TAU))
    } else {
        Quat::from_euler(
            EulerRot::XYZ,
            rng.random_range(0.0..TAU),
            rng.random_range(0.0..TAU),
            rng.random_range(0.0..TAU),
        )
    }
}

/// Spot used when sampling fails: straight behind the observer at the band's far edge
pub fn fallback_position(observer: &Observer, config: &RespawnConfig) -> Vec3 {
    let (_, eff_max) = distance_band(observer, config);
    let mut position = observer.position - observer.direction() * eff_max;
    position.y = config.clamp_height(position.y);
    position
}

fn within_band(observer: &Observer, config: &RespawnConfig, candidate: Vec3, band: (f32, f32)) -> bool {
    let (eff_min, eff_max) = band;
    let dist = candidate.distance(observer.position);
    // Height-locked entities live on the ground plane, so their near bound is planar
    let near_dist = if config.vertical_lock {
        planar_distance(candidate, observer.position)
    } else {
        dist
    };
    near_dist >= eff_min - BAND_EPSILON && dist <= eff_max + BAND_EPSILON
}

/// Find an off-screen pose for an entity
///
/// `current` supplies the scale used for verification; `bounds_at` resolves
/// the entity's bounding sphere for a candidate transform.
pub fn place_offscreen<R, F>(
    observer: &Observer,
    volume: &ViewVolume,
    config: &RespawnConfig,
    current: &Transform,
    bounds_at: F,
    rng: &mut R,
) -> Placement
where
    R: Rng + ?Sized,
    F: Fn(&Transform) -> BoundingSphere,
{
    let forward = observer.direction();
    let band = distance_band(observer, config);
    let rotation = random_orientation(rng, config.yaw_only);

    let half_angle = observer.half_fov() + config.margin_deg.to_radians();
    if half_angle < PI {
        let cos_limit = half_angle.cos();
        let mut attempts = 0;
        let mut cone_rejections = 0;

        while attempts < RESPAWN_ATTEMPTS {
            let dir = random_unit_vector(rng);
            if in_exclusion_cone(forward, dir, cos_limit) {
                // Uncounted retry, but capped so a near-total cone still terminates
                cone_rejections += 1;
                if cone_rejections >= MAX_CONE_REJECTIONS {
                    break;
                }
                continue;
            }
            attempts += 1;

            let (eff_min, eff_max) = band;
            let dist = if eff_max > eff_min {
                rng.random_range(eff_min..=eff_max)
            } else {
                eff_min
            };
            let mut candidate = observer.position + dir * dist;
            candidate.y = config.clamp_height(candidate.y);

            if !within_band(observer, config, candidate, band) {
                continue;
            }

            let transform = Transform {
                translation: candidate,
                rotation,
                scale: current.scale,
            };
            if !volume.intersects_sphere(&bounds_at(&transform)) {
                return Placement {
                    position: candidate,
                    rotation,
                    outcome: PlacementOutcome::Sampled { attempts },
                };
            }
        }
        log::debug!(
            "Respawn sampling exhausted ({} attempts, {} cone rejections)",
            attempts,
            cone_rejections
        );
    } else {
        log::debug!("Exclusion cone covers every direction, using fallback");
    }

    Placement {
        position: fallback_position(observer, config),
        rotation,
        outcome: PlacementOutcome::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn scenario_observer() -> Observer {
        Observer::new(Vec3::ZERO, Vec3::NEG_Z, 60.0, 0.1, 1000.0)
    }

    fn scenario_config() -> RespawnConfig {
        RespawnConfig {
            radius: 1.0,
            min_dist: 20.0,
            max_dist: 60.0,
            margin_deg: 15.0,
            vertical_lock: false,
            yaw_only: true,
            ..Default::default()
        }
    }

    fn place(observer: &Observer, config: &RespawnConfig, rng: &mut Pcg32) -> Placement {
        let volume = observer.view_volume();
        let radius = config.radius;
        place_offscreen(
            observer,
            &volume,
            config,
            &Transform::IDENTITY,
            |t| BoundingSphere::new(t.translation, radius),
            rng,
        )
    }

    #[test]
    fn test_scenario_lands_behind_cone_within_band() {
        let observer = scenario_observer();
        let config = scenario_config();
        let mut rng = Pcg32::seed_from_u64(7);

        for _ in 0..200 {
            let placement = place(&observer, &config, &mut rng);
            if placement.is_fallback() {
                assert!((placement.position - Vec3::new(0.0, 0.0, 60.0)).length() < 0.001);
                continue;
            }
            let dist = placement.position.length();
            assert!((20.0 - 0.01..=60.0 + 0.01).contains(&dist), "dist {dist}");
            // Exclusion half angle = 60°/2 + 15°
            let angle = placement.position.normalize().dot(Vec3::NEG_Z).acos().to_degrees();
            assert!(angle >= 45.0 - 0.01, "angle {angle}");
        }
    }

    #[test]
    fn test_placement_is_outside_view_volume() {
        let observer = scenario_observer();
        let config = scenario_config();
        let volume = observer.view_volume();
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..100 {
            let placement = place(&observer, &config, &mut rng);
            if !placement.is_fallback() {
                let sphere = BoundingSphere::new(placement.position, config.radius);
                assert!(!volume.intersects_sphere(&sphere));
            }
        }
    }

    #[test]
    fn test_degenerate_cone_uses_fallback() {
        let observer = scenario_observer();
        let config = RespawnConfig {
            margin_deg: 150.0,
            ..scenario_config()
        };
        let mut rng = Pcg32::seed_from_u64(3);
        let placement = place(&observer, &config, &mut rng);
        assert_eq!(placement.outcome, PlacementOutcome::Fallback);
        assert!((placement.position - Vec3::new(0.0, 0.0, 60.0)).length() < 0.001);
    }

    #[test]
    fn test_near_total_cone_terminates() {
        // Cone half angle 179.9°: almost nothing is outside it
        let observer = scenario_observer();
        let config = RespawnConfig {
            margin_deg: 149.9,
            ..scenario_config()
        };
        let mut rng = Pcg32::seed_from_u64(5);
        let placement = place(&observer, &config, &mut rng);
        assert!(placement.position.is_finite());
    }

    #[test]
    fn test_unreachable_band_uses_fallback() {
        // A sphere so large it always reaches into view
        let observer = scenario_observer();
        let config = RespawnConfig {
            radius: 500.0,
            ..scenario_config()
        };
        let mut rng = Pcg32::seed_from_u64(9);
        let placement = place(&observer, &config, &mut rng);
        assert!(placement.is_fallback());
    }

    #[test]
    fn test_band_respects_near_and_far() {
        let observer = Observer::new(Vec3::ZERO, Vec3::NEG_Z, 60.0, 30.0, 50.0);
        let config = scenario_config();
        let (lo, hi) = distance_band(&observer, &config);
        assert!((lo - 30.5).abs() < 0.001);
        assert!((hi - 45.0).abs() < 0.001);

        // Far plane closer than near bound collapses the band
        let observer = Observer::new(Vec3::ZERO, Vec3::NEG_Z, 60.0, 0.1, 10.0);
        assert_eq!(distance_band(&observer, &config), (20.0, 20.0));
    }

    #[test]
    fn test_vertical_lock_clamps_height() {
        let observer = Observer::new(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Z, 60.0, 0.1, 1000.0);
        let config = RespawnConfig {
            vertical_lock: true,
            y_min: 0.0,
            y_max: 2.0,
            ..scenario_config()
        };
        let mut rng = Pcg32::seed_from_u64(21);
        for _ in 0..100 {
            let placement = place(&observer, &config, &mut rng);
            assert!((0.0..=2.0).contains(&placement.position.y));
            if !placement.is_fallback() {
                assert!(planar_distance(placement.position, observer.position) >= 20.0 - 0.01);
            }
        }
    }

    #[test]
    fn test_yaw_only_keeps_upright() {
        let mut rng = Pcg32::seed_from_u64(1);
        for _ in 0..20 {
            let q = random_orientation(&mut rng, true);
            assert!((q * Vec3::Y - Vec3::Y).length() < 0.0001);
        }
        let q = random_orientation(&mut rng, false);
        assert!(q.is_normalized());
    }

    #[test]
    fn test_random_unit_vector_is_unit() {
        let mut rng = Pcg32::seed_from_u64(2);
        for _ in 0..500 {
            assert!((random_unit_vector(&mut rng).length() - 1.0).abs() < 0.0001);
        }
    }

    #[test]
    fn test_cos_limit() {
        let limit = exclusion_cos_limit(&scenario_observer(), &scenario_config());
        assert!((limit - 45.0_f32.to_radians().cos()).abs() < 0.0001);
    }

    #[test]
    fn test_cone_boundary_is_excluded() {
        let forward = Vec3::NEG_Z;
        let dir = Vec3::new(0.6, 0.0, -0.8);
        let at = forward.dot(dir);
        assert!(in_exclusion_cone(forward, dir, at));
        assert!(in_exclusion_cone(forward, dir, at - 1e-4));
        assert!(!in_exclusion_cone(forward, dir, at + 1e-4));
        // Straight behind is never excluded by a cone narrower than 180°
        assert!(!in_exclusion_cone(forward, Vec3::Z, 45.0_f32.to_radians().cos()));
    }

    proptest! {
        #[test]
        fn prop_sampled_placements_respect_cone_and_band(
            margin in 0.0f32..179.9,
            min_dist in 1.0f32..100.0,
            span in 0.5f32..100.0,
            yaw in -180.0f32..180.0,
            pitch in -89.0f32..89.0,
            seed in any::<u64>(),
        ) {
            let observer = Observer::from_yaw_pitch(Vec3::new(3.0, 1.0, -2.0), yaw, pitch);
            let config = RespawnConfig {
                radius: 0.5,
                min_dist,
                max_dist: min_dist + span,
                margin_deg: margin,
                vertical_lock: false,
                yaw_only: false,
                ..Default::default()
            };
            let mut rng = Pcg32::seed_from_u64(seed);
            let placement = place(&observer, &config, &mut rng);
            prop_assert!(placement.position.is_finite());

            if placement.is_fallback() {
                prop_assert!((placement.position - fallback_position(&observer, &config)).length() < 0.001);
            } else {
                let offset = placement.position - observer.position;
                let (eff_min, eff_max) = distance_band(&observer, &config);
                let dist = offset.length();
                prop_assert!(dist >= eff_min - 0.01 && dist <= eff_max + 0.01);
                let cos_limit = exclusion_cos_limit(&observer, &config);
                prop_assert!(observer.direction().dot(offset / dist) <= cos_limit + 1e-4);
            }
        }
    }
}
