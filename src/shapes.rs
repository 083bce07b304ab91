// ============================================================================
// shapes.rs — Morphtree
// Procedural point generators for the two formations (tree cone-spiral and
// scattered sphere volume) and the look-at orientation helper.
// ============================================================================

use std::f32::consts::TAU;

use glam::{Mat3, Quat, Vec3};
use rand::Rng;

/// Angular step per index along the cone. A constant step yields a spiral
/// rather than stacked rings.
pub const SPIRAL_STEP: f32 = 0.5;

/// Point on a cone-shaped spiral, bottom (index 0) to apex.
///
/// `y` runs linearly from `-height / 2` at index 0 toward `height / 2`, and the
/// radius tapers from `base_radius` at the base to zero at the apex.
pub fn generate_cone_position(index: usize, total: usize, height: f32, base_radius: f32) -> Vec3 {
    let total = total.max(1) as f32;
    let y = (index as f32 / total) * height - height / 2.0;
    let radius = ((height / 2.0 - y) / height) * base_radius;
    let azimuth = index as f32 * SPIRAL_STEP;

    Vec3::new(azimuth.cos() * radius, y, azimuth.sin() * radius)
}

/// Random point distributed uniformly by volume inside a sphere.
pub fn generate_sphere_position<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    let u: f32 = rng.gen();
    let v: f32 = rng.gen();
    let w: f32 = rng.gen();

    let theta = TAU * u;
    // acos(2v - 1) keeps the density even over each shell instead of
    // bunching toward the poles.
    let phi = (2.0 * v - 1.0).clamp(-1.0, 1.0).acos();
    // cbrt compensates for the r² growth of the volume element.
    let r = w.cbrt() * radius;

    Vec3::new(
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    )
}

/// Rotation whose local +Z axis points from `eye` toward `target`, with +Y as
/// the preferred up direction.
pub fn look_at_rotation(eye: Vec3, target: Vec3) -> Quat {
    let forward = (target - eye).try_normalize().unwrap_or(Vec3::Z);

    let mut right = Vec3::Y.cross(forward);
    if right.length_squared() < 1e-8 {
        // Looking straight up or down: nudge the up vector.
        right = Vec3::Z.cross(forward);
        if right.length_squared() < 1e-8 {
            right = Vec3::X;
        }
    }
    let right = right.normalize();
    let up = forward.cross(right);

    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

// ======================== Tests ========================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn radial(p: Vec3) -> f32 {
        Vec3::new(p.x, 0.0, p.z).length()
    }

    #[test]
    fn cone_height_is_monotonic_and_bounded() {
        let total = 500;
        let height = 12.0;
        let mut last = f32::NEG_INFINITY;
        for i in 0..total {
            let p = generate_cone_position(i, total, height, 4.5);
            assert!(p.y >= last, "y decreased at index {i}");
            assert!(p.y >= -height / 2.0 - 1e-5 && p.y <= height / 2.0 + 1e-5);
            last = p.y;
        }
    }

    #[test]
    fn cone_base_and_apex() {
        let base = generate_cone_position(0, 10, 12.0, 4.5);
        assert!((base.y + 6.0).abs() < 1e-5);
        assert!((radial(base) - 4.5).abs() < 1e-4);

        let top = generate_cone_position(9, 10, 12.0, 4.5);
        assert!((top.y - 4.8).abs() < 1e-4);
        assert!(radial(top) < 0.5);
        assert!(radial(top) < radial(generate_cone_position(8, 10, 12.0, 4.5)));
    }

    #[test]
    fn cone_is_deterministic() {
        for i in [0, 3, 77] {
            assert_eq!(
                generate_cone_position(i, 100, 10.0, 5.0),
                generate_cone_position(i, 100, 10.0, 5.0)
            );
        }
    }

    #[test]
    fn sphere_density_follows_volume() {
        let mut rng = StdRng::seed_from_u64(7);
        let radius = 20.0;
        let samples = 100_000;
        let mut inner = 0usize;
        for _ in 0..samples {
            let p = generate_sphere_position(&mut rng, radius);
            let d = p.length();
            assert!(d <= radius + 1e-3);
            if d < radius / 2.0 {
                inner += 1;
            }
        }
        let fraction = inner as f64 / samples as f64;
        assert!((fraction - 0.125).abs() < 0.006, "inner fraction {fraction}");
    }

    #[test]
    fn sphere_hemispheres_are_balanced() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples = 50_000;
        let upper = (0..samples)
            .filter(|_| generate_sphere_position(&mut rng, 1.0).z > 0.0)
            .count();
        let fraction = upper as f64 / samples as f64;
        assert!((fraction - 0.5).abs() < 0.01);
    }

    #[test]
    fn look_at_points_local_z_at_target() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let target = Vec3::new(-4.0, 0.5, 8.0);
        let q = look_at_rotation(eye, target);
        let dir = (target - eye).normalize();
        assert!((q * Vec3::Z).dot(dir) > 0.9999);
        assert!((q * Vec3::Y).y > 0.0);
    }

    #[test]
    fn look_at_handles_degenerate_directions() {
        let straight_up = look_at_rotation(Vec3::ZERO, Vec3::Y * 5.0);
        assert!((straight_up * Vec3::Z).dot(Vec3::Y) > 0.9999);
        assert!(straight_up.is_normalized());

        let same_point = look_at_rotation(Vec3::ONE, Vec3::ONE);
        assert!(same_point.is_normalized());
    }
}
