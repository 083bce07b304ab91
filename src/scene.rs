// ============================================================================
// scene.rs — Morphtree
// SceneState: the particle groups, the photo gallery and the orbit camera,
// all observing one MorphStore, advanced together once per render frame.
// ============================================================================

use std::rc::Rc;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::camera::OrbitCamera;
use crate::config::SceneConfig;
use crate::morph::FrameClock;
use crate::panels::{Gallery, PanelTransform};
use crate::particles::{InstanceRaw, ParticleGroup};
use crate::state::MorphStore;

/// Longest frame delta fed to the animation. Damping is exact for any delta,
/// so convergence time is unchanged down to 1 fps; only longer stalls (a
/// suspended or dragged window) are shortened.
pub const MAX_FRAME_DT: f32 = 1.0;

pub struct SceneState {
    pub store: Rc<MorphStore>,
    pub groups: Vec<ParticleGroup>,
    pub gallery: Gallery,
    pub camera: OrbitCamera,
    pub clock: FrameClock,
    pub frame: u64,

    /// Per-group instance transforms written by the last `step`.
    pub instances: Vec<Vec<InstanceRaw>>,
    /// Panel transforms written by the last `step`.
    pub panels: Vec<PanelTransform>,

    rng: StdRng,
}

impl SceneState {
    pub fn new(config: &SceneConfig, store: Rc<MorphStore>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let origin = Vec3::from_array(config.content_offset);

        let groups: Vec<ParticleGroup> = config
            .particles
            .iter()
            .map(|g| ParticleGroup::new(g, &config.morph, origin, store.clone(), &mut rng))
            .collect();
        let gallery = Gallery::new(&config.gallery, &config.morph, origin, store.clone(), &mut rng);

        log::info!(
            "Scene ready: {} particle groups ({} particles), {} panels",
            groups.len(),
            config.total_particles(),
            gallery.len()
        );

        Self {
            instances: groups.iter().map(|g| Vec::with_capacity(g.len())).collect(),
            panels: Vec::with_capacity(gallery.len()),
            store,
            groups,
            gallery,
            camera: OrbitCamera::new(&config.camera),
            clock: FrameClock::default(),
            frame: 0,
            rng,
        }
    }

    /// Advance the whole scene by `dt` seconds of wall-clock time.
    pub fn step(&mut self, dt: f32) {
        let clock = self.clock.tick(dt.min(MAX_FRAME_DT));

        self.camera.update(self.store.hand(), clock.delta);
        let pose = self.camera.pose();

        for (group, out) in self.groups.iter_mut().zip(self.instances.iter_mut()) {
            group.update(clock, &mut self.rng, out);
        }
        self.gallery.update(clock, &pose, &mut self.panels);

        self.frame += 1;
    }

    pub fn total_instances(&self) -> usize {
        self.instances.iter().map(Vec::len).sum()
    }
}
