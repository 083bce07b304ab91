// ============================================================================
// metrics.rs — Morphtree
// Per-frame scene diagnostics: morph progress, particle cloud shape and
// panel focus, computed from the transforms written by the last step.
// ============================================================================

use glam::Vec3;
use serde::Serialize;

use crate::scene::SceneState;
use crate::state::Formation;

/// Diagnostics snapshot for one frame.
#[derive(Clone, Debug, Serialize)]
pub struct FrameMetrics {
    pub frame: u64,
    pub elapsed: f32,
    pub formation: Formation,
    pub pinching: bool,
    pub hand_detected: bool,

    // Morph
    pub particle_progress: f32, // mean over groups
    pub panel_morph: f32,       // mean over panels
    pub panel_pinch: f32,       // mean over panels
    pub focused_panels: usize,

    // Shape of the particle cloud
    pub centroid: [f32; 3],
    pub mean_radius: f32, // mean distance from the centroid
    pub height_span: f32,
}

impl FrameMetrics {
    pub fn from_scene(scene: &SceneState) -> Self {
        let snap = scene.store.snapshot();

        let particle_progress = mean(scene.groups.iter().map(|g| g.progress()));
        let panel_morph = mean(scene.gallery.states().iter().map(|s| s.morph_progress));
        let panel_pinch = mean(scene.gallery.states().iter().map(|s| s.pinch_progress));

        let positions: Vec<Vec3> = scene
            .instances
            .iter()
            .flatten()
            .map(|inst| inst.translation())
            .collect();

        let (centroid, mean_radius, height_span) = if positions.is_empty() {
            (Vec3::ZERO, 0.0, 0.0)
        } else {
            let n = positions.len() as f32;
            let centroid = positions.iter().copied().sum::<Vec3>() / n;
            let mean_radius = positions.iter().map(|p| p.distance(centroid)).sum::<f32>() / n;
            let (min_y, max_y) = positions
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
            (centroid, mean_radius, max_y - min_y)
        };

        FrameMetrics {
            frame: scene.frame,
            elapsed: scene.clock.elapsed,
            formation: snap.target_formation,
            pinching: snap.pinching,
            hand_detected: scene.store.hand().detected,
            particle_progress,
            panel_morph,
            panel_pinch,
            focused_panels: scene.gallery.focused_count(),
            centroid: centroid.to_array(),
            mean_radius,
            height_span,
        }
    }

    pub fn csv_header() -> &'static str {
        "frame,elapsed,formation,pinching,hand_detected,particle_progress,panel_morph,panel_pinch,focused_panels,centroid_x,centroid_y,centroid_z,mean_radius,height_span"
    }

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{:.3},{},{},{},{:.4},{:.4},{:.4},{},{:.3},{:.3},{:.3},{:.3},{:.3}",
            self.frame,
            self.elapsed,
            self.formation.name(),
            self.pinching,
            self.hand_detected,
            self.particle_progress,
            self.panel_morph,
            self.panel_pinch,
            self.focused_panels,
            self.centroid[0],
            self.centroid[1],
            self.centroid[2],
            self.mean_radius,
            self.height_span,
        )
    }

    /// Log diagnostics at INFO level, with the delta from the previous sample.
    pub fn log(&self, prev: Option<&FrameMetrics>) {
        log::info!("══════════════ Frame {} Diagnostics ══════════════", self.frame);

        if let Some(p) = prev {
            log::info!(
                "TRENDS: Δprogress={:+.3} | Δradius={:+.2} | Δfocused={:+}",
                self.particle_progress - p.particle_progress,
                self.mean_radius - p.mean_radius,
                self.focused_panels as i64 - p.focused_panels as i64,
            );
        }

        log::info!(
            "STATE: formation={} | pinching={} | hand={}",
            self.formation.name(),
            self.pinching,
            if self.hand_detected { "detected" } else { "none" },
        );
        log::info!(
            "MORPH: particles={:.3} | panels morph={:.3} pinch={:.3} | focused={}",
            self.particle_progress,
            self.panel_morph,
            self.panel_pinch,
            self.focused_panels,
        );
        log::info!(
            "CLOUD: centroid=({:.2}, {:.2}, {:.2}) | mean_radius={:.2} | height={:.2}",
            self.centroid[0],
            self.centroid[1],
            self.centroid[2],
            self.mean_radius,
            self.height_span,
        );
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}
