// ============================================================================
// particles.rs — Morphtree
// Instanced particle groups: precomputed tree/scatter positions and the
// per-frame morph of every particle transform.
// ============================================================================

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{MorphConfig, ParticleGroupConfig};
use crate::morph::{damp, FrameClock};
use crate::shapes::{generate_cone_position, generate_sphere_position};
use crate::state::MorphStore;

// ======================== Variants ========================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshKind {
    Box,
    Tetrahedron,
}

/// Closed set of particle looks. Everything that differs between them is
/// data in [`ParticleStyle`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleVariant {
    /// Glinting ornaments on the outer shell.
    Gold,
    /// Needles filling the cone.
    #[default]
    Emerald,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleStyle {
    pub mesh: MeshKind,
    /// Linear RGB.
    pub color: [f32; 3],
    pub emissive: f32,
    pub base_radius: f32,
}

impl ParticleVariant {
    pub fn style(self) -> ParticleStyle {
        match self {
            ParticleVariant::Gold => ParticleStyle {
                mesh: MeshKind::Box,
                color: srgb_to_linear(0xFF, 0xD7, 0x00),
                emissive: 0.5,
                base_radius: 4.5,
            },
            ParticleVariant::Emerald => ParticleStyle {
                mesh: MeshKind::Tetrahedron,
                color: srgb_to_linear(0x00, 0x4D, 0x33),
                emissive: 0.1,
                base_radius: 4.0,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParticleVariant::Gold => "gold",
            ParticleVariant::Emerald => "emerald",
        }
    }
}

pub fn srgb_to_linear(r: u8, g: u8, b: u8) -> [f32; 3] {
    let c = |v: u8| (v as f32 / 255.0).powf(2.2);
    [c(r), c(g), c(b)]
}

// ======================== GPU Instance ========================

/// Per-instance data uploaded to the vertex buffer every frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    /// rgb = base color, a = emissive intensity.
    pub color: [f32; 4],
}

impl InstanceRaw {
    pub fn new(model: Mat4, color: [f32; 3], emissive: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: [color[0], color[1], color[2], emissive],
        }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::from_slice(&self.model[3][..3])
    }
}

// ======================== Records ========================

/// Immutable per-particle data, generated once per group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleRecord {
    pub tree_position: Vec3,
    pub scatter_position: Vec3,
    pub base_scale: f32,
    pub seed_index: u32,
}

/// Position and orientation of one particle, before scale jitter.
///
/// Orientation is re-derived every frame from the group's spin clock instead
/// of integrating a per-particle angular velocity, so it never drifts. The
/// index offset stays outside the clock term, keeping every particle on the
/// same angular speed.
pub fn particle_pose(
    record: &ParticleRecord,
    progress: f32,
    elapsed: f32,
    spin_clock: f32,
    morph: &MorphConfig,
) -> (Vec3, Quat) {
    let i = record.seed_index as f32;
    let phase = elapsed + i * 0.1;

    let mut position = record.tree_position.lerp(record.scatter_position, progress);
    position.y += phase.sin() * morph.float_amplitude * (1.0 - progress);

    let rotation = Quat::from_euler(
        EulerRot::XYZ,
        spin_clock * 0.2 + i * 1.02,
        spin_clock * 0.1 + i * 1.01,
        spin_clock * 0.1 + i * 0.01,
    );

    (position, rotation)
}

/// Spin clock rate: 1 when gathered, `1 + spin_boost` at full scatter.
pub fn spin_rate(progress: f32, morph: &MorphConfig) -> f32 {
    1.0 + morph.spin_boost * progress
}

// ======================== Particle Group ========================

/// A homogeneous batch of particles sharing one mesh and one damped
/// progress value. All particles in the group morph in lockstep.
pub struct ParticleGroup {
    variant: ParticleVariant,
    style: ParticleStyle,
    records: Vec<ParticleRecord>,
    progress: f32,
    spin_clock: f32,
    morph: MorphConfig,
    origin: Vec3,
    store: Rc<MorphStore>,
}

impl ParticleGroup {
    pub fn new<R: Rng + ?Sized>(
        config: &ParticleGroupConfig,
        morph: &MorphConfig,
        origin: Vec3,
        store: Rc<MorphStore>,
        rng: &mut R,
    ) -> Self {
        let base_radius = config.base_radius();
        let records = (0..config.count)
            .map(|i| {
                let noise = Vec3::new(
                    rng.gen::<f32>() - 0.5,
                    rng.gen::<f32>() - 0.5,
                    rng.gen::<f32>() - 0.5,
                ) * config.tree_noise;
                ParticleRecord {
                    tree_position: generate_cone_position(
                        i,
                        config.count,
                        config.tree_height,
                        base_radius,
                    ) + noise,
                    scatter_position: generate_sphere_position(rng, config.scatter_radius),
                    base_scale: config.size,
                    seed_index: i as u32,
                }
            })
            .collect();

        log::info!(
            "Particle group '{}': {} particles, cone radius {:.1}",
            config.variant.name(),
            config.count,
            base_radius
        );

        Self {
            variant: config.variant,
            style: config.variant.style(),
            records,
            progress: 0.0,
            spin_clock: 0.0,
            morph: morph.clone(),
            origin,
            store,
        }
    }

    pub fn variant(&self) -> ParticleVariant {
        self.variant
    }

    pub fn style(&self) -> ParticleStyle {
        self.style
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Advance the shared progress and write one transform per particle
    /// into `out`, replacing its contents.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        clock: FrameClock,
        rng: &mut R,
        out: &mut Vec<InstanceRaw>,
    ) {
        let target = self.store.snapshot().target_formation.target();
        self.progress = damp(self.progress, target, self.morph.particle_rate, clock.delta);
        self.spin_clock += clock.delta * spin_rate(self.progress, &self.morph);

        out.clear();
        out.reserve(self.records.len());
        for record in &self.records {
            let (position, rotation) = particle_pose(
                record,
                self.progress,
                clock.elapsed,
                self.spin_clock,
                &self.morph,
            );
            let jitter = 1.0 - self.morph.shimmer * rng.gen::<f32>();
            let model = Mat4::from_scale_rotation_translation(
                Vec3::splat(record.base_scale * jitter),
                rotation,
                position + self.origin,
            );
            out.push(InstanceRaw::new(model, self.style.color, self.style.emissive));
        }
    }
}

// ======================== Tests ========================
