//! Observer (camera) pose supplied by the host each cycle

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::frustum::ViewVolume;

/// A perspective viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    /// World position
    pub position: Vec3,
    /// Viewing direction (normalized on use)
    pub forward: Vec3,
    /// Up hint for the view matrix
    pub up: Vec3,
    /// Vertical field of view (degrees)
    pub fov_deg: f32,
    /// Width / height of the viewport
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Observer {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov_deg: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Observer {
    /// Observer at `position` looking along `forward`
    pub fn new(position: Vec3, forward: Vec3, fov_deg: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            forward,
            fov_deg,
            near,
            far,
            ..Default::default()
        }
    }

    /// Observer oriented by yaw (around +Y) and pitch (around +X), degrees
    ///
    /// Yaw 0 / pitch 0 looks down -Z; positive pitch looks up.
    pub fn from_yaw_pitch(position: Vec3, yaw_deg: f32, pitch_deg: f32) -> Self {
        let rotation = Quat::from_euler(
            EulerRot::YXZ,
            yaw_deg.to_radians(),
            pitch_deg.to_radians(),
            0.0,
        );
        Self {
            position,
            forward: rotation * Vec3::NEG_Z,
            ..Default::default()
        }
    }

    /// Unit viewing direction (-Z when `forward` is degenerate)
    pub fn direction(&self) -> Vec3 {
        self.forward.try_normalize().unwrap_or(Vec3::NEG_Z)
    }

    /// Half of the vertical field of view (radians)
    #[inline]
    pub fn half_fov(&self) -> f32 {
        (self.fov_deg * 0.5).to_radians()
    }

    /// World → view transform
    pub fn view_matrix(&self) -> Mat4 {
        let dir = self.direction();
        let mut up = self.up.try_normalize().unwrap_or(Vec3::Y);
        if dir.dot(up).abs() > 0.999 {
            // Looking straight along the up hint: any perpendicular axis works
            up = if dir.y.abs() > 0.999 { Vec3::Z } else { Vec3::Y };
        }
        Mat4::look_to_rh(self.position, dir, up)
    }

    /// View → clip transform (OpenGL depth range)
    pub fn projection_matrix(&self) -> Mat4 {
        let fov = self.fov_deg.to_radians().clamp(1e-4, std::f32::consts::PI - 1e-4);
        let aspect = if self.aspect > 0.0 { self.aspect } else { 1.0 };
        let near = self.near.max(1e-4);
        let far = self.far.max(near * 1.001);
        Mat4::perspective_rh_gl(fov, aspect, near, far)
    }

    /// Current view volume
    pub fn view_volume(&self) -> ViewVolume {
        ViewVolume::from_view_projection(self.projection_matrix() * self.view_matrix())
    }
}

/// Something that can report the current observer, if one is resolved
pub trait ObserverSource {
    fn observer(&self) -> Option<Observer>;
}

impl ObserverSource for Observer {
    fn observer(&self) -> Option<Observer> {
        Some(*self)
    }
}

impl ObserverSource for Option<Observer> {
    fn observer(&self) -> Option<Observer> {
        *self
    }
}

impl<S: ObserverSource + ?Sized> ObserverSource for &S {
    fn observer(&self) -> Option<Observer> {
        (**self).observer()
    }
}
