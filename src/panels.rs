// ============================================================================
// panels.rs — Morphtree
// Photo panels: background formation blend plus a pinch-driven blend toward
// a camera-anchored focus grid. Each panel damps its own progress values.
// ============================================================================

use std::rc::Rc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use image::{imageops, RgbaImage};
use rand::Rng;

use crate::camera::CameraPose;
use crate::config::{GalleryConfig, MorphConfig};
use crate::morph::{damp, FrameClock};
use crate::shapes::{generate_cone_position, generate_sphere_position, look_at_rotation};
use crate::state::MorphStore;

/// Outer frame of a panel, in panel-local units.
pub const FRAME_SIZE: [f32; 2] = [1.2, 1.5];
pub const FRAME_OFFSET: Vec3 = Vec3::new(0.0, 0.0, -0.01);
/// Photo area, slightly raised toward the top of the frame.
pub const PHOTO_SIZE: [f32; 2] = [1.0, 1.0];
pub const PHOTO_OFFSET: Vec3 = Vec3::new(0.0, 0.1, 0.02);

/// Pinch progress above which a panel counts as focused.
const FOCUSED_THRESHOLD: f32 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct PanelRecord {
    pub tree_position: Vec3,
    pub scatter_position: Vec3,
    /// Focus position in camera space (camera looks down -Z).
    pub camera_offset: Vec3,
    pub image: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PanelState {
    pub morph_progress: f32,
    pub pinch_progress: f32,
}

/// World transform of one panel for the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanelTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl PanelTransform {
    fn world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn frame_model(&self) -> Mat4 {
        self.world()
            * Mat4::from_scale_rotation_translation(
                Vec3::new(FRAME_SIZE[0], FRAME_SIZE[1], 1.0),
                Quat::IDENTITY,
                FRAME_OFFSET,
            )
    }

    pub fn photo_model(&self) -> Mat4 {
        self.world()
            * Mat4::from_scale_rotation_translation(
                Vec3::new(PHOTO_SIZE[0], PHOTO_SIZE[1], 1.0),
                Quat::IDENTITY,
                PHOTO_OFFSET,
            )
    }
}

/// Facing direction in the background formation: outward when gathered,
/// tumbling with time when scattered.
fn background_rotation(base: Vec3, morph_progress: f32, elapsed: f32) -> Quat {
    let outward = look_at_rotation(base, Vec3::new(base.x * 2.0, base.y, base.z * 2.0));
    let tumble = Quat::from_euler(EulerRot::XYZ, elapsed * 0.5, elapsed * 0.3, 0.0);
    outward.slerp(tumble, morph_progress)
}

// ======================== Gallery ========================

pub struct Gallery {
    records: Vec<PanelRecord>,
    states: Vec<PanelState>,
    morph: MorphConfig,
    origin: Vec3,
    store: Rc<MorphStore>,
}

impl Gallery {
    pub fn new<R: Rng + ?Sized>(
        config: &GalleryConfig,
        morph: &MorphConfig,
        origin: Vec3,
        store: Rc<MorphStore>,
        rng: &mut R,
    ) -> Self {
        let columns = config.grid_columns.max(1);
        let center_col = (columns as f32 - 1.0) / 2.0;
        let center_row = config.grid_center_row;

        let records: Vec<PanelRecord> = (0..config.count)
            .map(|i| {
                let row = (i / columns) as f32;
                let col = (i % columns) as f32;
                let camera_offset = Vec3::new(
                    (col - center_col) * config.grid_spacing_x + rng.gen::<f32>() * 0.2,
                    -(row - center_row) * config.grid_spacing_y + rng.gen::<f32>() * 0.2,
                    -config.focus_distance - rng.gen::<f32>() * 2.0,
                );

                let image = if config.images.is_empty() {
                    None
                } else {
                    Some(config.images[i % config.images.len()].clone())
                        .filter(|path| !path.trim().is_empty())
                };

                PanelRecord {
                    tree_position: generate_cone_position(
                        i,
                        config.count,
                        config.tree_height,
                        config.tree_radius,
                    ) * config.tree_scale,
                    scatter_position: generate_sphere_position(rng, config.scatter_radius),
                    camera_offset,
                    image,
                }
            })
            .collect();

        log::info!("Gallery: {} panels in a {}-column focus grid", records.len(), columns);

        Self {
            states: vec![PanelState::default(); records.len()],
            records,
            morph: morph.clone(),
            origin,
            store,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PanelRecord] {
        &self.records
    }

    pub fn states(&self) -> &[PanelState] {
        &self.states
    }

    pub fn focused_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.pinch_progress > FOCUSED_THRESHOLD)
            .count()
    }

    /// Advance every panel and write its world transform into `out`.
    pub fn update(&mut self, clock: FrameClock, camera: &CameraPose, out: &mut Vec<PanelTransform>) {
        let snap = self.store.snapshot();
        let morph_target = snap.target_formation.target();
        let pinch_target = if snap.pinching { 1.0 } else { 0.0 };
        let camera_world = camera.world_matrix();

        out.clear();
        out.reserve(self.records.len());
        for (record, state) in self.records.iter().zip(self.states.iter_mut()) {
            state.morph_progress = damp(
                state.morph_progress,
                morph_target,
                self.morph.panel_morph_rate,
                clock.delta,
            );
            state.pinch_progress = damp(
                state.pinch_progress,
                pinch_target,
                self.morph.panel_pinch_rate,
                clock.delta,
            );

            let base = record
                .tree_position
                .lerp(record.scatter_position, state.morph_progress);
            let focus = camera_world.transform_point3(record.camera_offset);
            let position = (base + self.origin).lerp(focus, state.pinch_progress);

            let base_rot = background_rotation(base, state.morph_progress, clock.elapsed);
            let focus_rot = look_at_rotation(position, camera.position);
            let rotation = base_rot.slerp(focus_rot, state.pinch_progress).normalize();

            out.push(PanelTransform { position, rotation });
        }
    }
}

// ======================== Images ========================

/// Decoded photo for a panel, or the neutral placeholder.
pub enum PanelImage {
    Photo(RgbaImage),
    Placeholder,
}

impl PanelImage {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, PanelImage::Placeholder)
    }
}

/// Load a panel's photo, downscaled to fit within `max_dim` on both axes.
/// Any failure yields the placeholder.
pub fn load_panel_image(path: Option<&str>, max_dim: u32) -> PanelImage {
    let Some(path) = path else {
        return PanelImage::Placeholder;
    };
    let img = match image::open(path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            log::warn!("Photo {} unavailable ({}); using placeholder", path, e);
            return PanelImage::Placeholder;
        }
    };

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || max_dim == 0 {
        log::warn!("Photo {} is empty; using placeholder", path);
        return PanelImage::Placeholder;
    }
    let (fit_w, fit_h) = fit_within(width, height, max_dim);
    if (fit_w, fit_h) == (width, height) {
        return PanelImage::Photo(img);
    }
    log::info!(
        "Photo {} is {}x{}; downscaling to {}x{}",
        path,
        width,
        height,
        fit_w,
        fit_h
    );
    PanelImage::Photo(imageops::resize(&img, fit_w, fit_h, imageops::FilterType::Triangle))
}

/// Largest size with the same aspect ratio that fits in `max_dim` x `max_dim`.
fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dim {
        return (width, height);
    }
    let scale = max_dim as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_dim);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_dim);
    (w, h)
}

// ======================== Tests ========================
