// ============================================================================
// camera.rs — Morphtree
// Orbit camera steered by the hand pointer (auto-rotates when no hand is
// present) and the GPU uniform built from it.
// ============================================================================

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Quat, Vec3};

use crate::config::CameraConfig;
use crate::shapes::look_at_rotation;
use crate::state::HandPresence;

/// Light direction used by the particle/panel shaders (toward the light).
const LIGHT_DIR: [f32; 4] = [0.4, 0.8, 0.45, 0.0];

/// GPU-side camera uniforms uploaded every frame.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub light_dir: [f32; 4],
}

impl Default for CameraUniforms {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            eye: [0.0, 0.0, 0.0, 1.0],
            light_dir: LIGHT_DIR,
        }
    }
}

/// World placement of the viewpoint. The camera looks down its local -Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl CameraPose {
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// CPU-side orbit state (spherical coordinates around `target`).
pub struct OrbitCamera {
    pub target: Vec3,
    pub azimuth: f32,
    pub polar: f32,
    pub distance: f32,
    config: CameraConfig,
}

impl OrbitCamera {
    pub fn new(config: &CameraConfig) -> Self {
        let offset = Vec3::from_array(config.position);
        let distance = offset.length().max(1e-3);
        Self {
            target: Vec3::ZERO,
            azimuth: offset.x.atan2(offset.z),
            polar: (offset.y / distance).clamp(-1.0, 1.0).acos(),
            distance: distance.clamp(config.min_distance, config.max_distance),
            config: config.clone(),
        }
    }

    /// Steer toward the hand pointer, or drift slowly when no hand is seen.
    ///
    /// Pointer x sweeps the azimuth over ±1.5 rad and pointer y tilts the
    /// view around the horizon.
    pub fn update(&mut self, hand: HandPresence, dt: f32) {
        if hand.detected {
            let target_azimuth = hand.x * 1.5;
            let target_polar = PI / 2.0 - hand.y * 0.5;
            let t = (dt * self.config.follow_rate).clamp(0.0, 1.0);
            self.azimuth += (target_azimuth - self.azimuth) * t;
            self.polar += (target_polar - self.polar) * t;
        } else {
            self.azimuth -= TAU / 60.0 * self.config.auto_rotate_speed * dt;
            self.azimuth = wrap_angle(self.azimuth);
        }
        self.polar = self.polar.clamp(0.01, self.config.max_polar);
    }

    /// Mouse-wheel zoom.
    pub fn apply_scroll(&mut self, scroll_y: f32) {
        self.distance *= 1.0 - scroll_y * 0.1;
        self.distance = self
            .distance
            .clamp(self.config.min_distance, self.config.max_distance);
    }

    pub fn eye(&self) -> Vec3 {
        let sin_polar = self.polar.sin();
        self.target
            + self.distance
                * Vec3::new(
                    sin_polar * self.azimuth.sin(),
                    self.polar.cos(),
                    sin_polar * self.azimuth.cos(),
                )
    }

    pub fn pose(&self) -> CameraPose {
        let position = self.eye();
        CameraPose {
            position,
            rotation: look_at_rotation(position, self.target) * Quat::from_rotation_y(PI),
        }
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let proj = Mat4::perspective_rh(
            self.config.fov_degrees.to_radians(),
            aspect.max(1e-3),
            0.1,
            200.0,
        );
        let view = Mat4::look_at_rh(self.eye(), self.target, Vec3::Y);
        proj * view
    }

    /// Build the GPU uniform from current state.
    pub fn uniforms(&self, aspect: f32) -> CameraUniforms {
        let eye = self.eye();
        CameraUniforms {
            view_proj: self.view_proj(aspect).to_cols_array_2d(),
            eye: [eye.x, eye.y, eye.z, 1.0],
            light_dir: LIGHT_DIR,
        }
    }
}

fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> OrbitCamera {
        OrbitCamera::new(&CameraConfig::default())
    }

    #[test]
    fn starts_at_configured_position() {
        let cam = camera();
        assert!(cam.eye().distance(Vec3::new(0.0, 2.0, 25.0)) < 1e-3);
        assert!(cam.azimuth.abs() < 1e-6);
    }

    #[test]
    fn pose_looks_at_target() {
        let mut cam = camera();
        cam.azimuth = 0.7;
        let pose = cam.pose();
        let forward = pose.rotation * Vec3::NEG_Z;
        let to_target = (cam.target - pose.position).normalize();
        assert!(forward.dot(to_target) > 0.9999);
        assert!((pose.rotation * Vec3::Y).y > 0.0);

        let ahead = pose.world_matrix().transform_point3(Vec3::new(0.0, 0.0, -cam.distance));
        assert!(ahead.distance(cam.target) < 1e-3);
    }

    #[test]
    fn auto_rotates_without_hand() {
        let mut cam = camera();
        for _ in 0..60 {
            cam.update(HandPresence::default(), 1.0 / 60.0);
        }
        let expected = -TAU / 60.0 * 0.5;
        assert!((cam.azimuth - expected).abs() < 1e-4);
    }

    #[test]
    fn hand_steers_azimuth_and_polar() {
        let mut cam = camera();
        let hand = HandPresence {
            x: 1.0,
            y: 0.5,
            detected: true,
        };
        for _ in 0..600 {
            cam.update(hand, 1.0 / 60.0);
        }
        assert!((cam.azimuth - 1.5).abs() < 1e-3);
        assert!((cam.polar - (PI / 2.0 - 0.25)).abs() < 1e-3);
    }

    #[test]
    fn polar_is_clamped() {
        let mut cam = camera();
        let hand = HandPresence {
            x: 0.0,
            y: -10.0,
            detected: true,
        };
        for _ in 0..600 {
            cam.update(hand, 1.0 / 60.0);
        }
        assert!(cam.polar <= PI / 1.5 + 1e-6);
    }

    #[test]
    fn scroll_zoom_is_clamped() {
        let mut cam = camera();
        for _ in 0..100 {
            cam.apply_scroll(1.0);
        }
        assert_eq!(cam.distance, 10.0);
        for _ in 0..100 {
            cam.apply_scroll(-1.0);
        }
        assert_eq!(cam.distance, 40.0);
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        for a in [-10.0, -PI, 0.0, PI, 3.5, 12.0] {
            let w = wrap_angle(a);
            assert!(w > -PI - 1e-6 && w <= PI + 1e-6);
            assert!(((w - a) / TAU - ((w - a) / TAU).round()).abs() < 1e-4);
        }
    }
}
