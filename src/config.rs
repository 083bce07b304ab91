// ============================================================================
// config.rs — Morphtree
// Scene configuration (particle groups, gallery, damping, gestures, camera),
// JSON loading, and runtime toggles adjustable via keyboard.
// ============================================================================

use std::fs;

use serde::{Deserialize, Serialize};

use crate::particles::ParticleVariant;

/// Runtime toggles adjustable via keyboard.
#[derive(Clone, Debug, Serialize)]
pub struct RuntimeParams {
    pub paused: bool,
    pub show_extended_ui: bool,
    pub vsync: bool,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            paused: false,
            show_extended_ui: false,
            vsync: true,
        }
    }
}

// ======================== Scene Configuration ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleGroupConfig {
    pub variant: ParticleVariant,
    pub count: usize,
    pub size: f32,
    pub tree_height: f32,
    /// Overrides the variant's own base radius when set.
    pub tree_radius: Option<f32>,
    pub tree_noise: f32,
    pub scatter_radius: f32,
}

impl Default for ParticleGroupConfig {
    fn default() -> Self {
        Self::emerald(2500)
    }
}

impl ParticleGroupConfig {
    pub fn emerald(count: usize) -> Self {
        Self {
            variant: ParticleVariant::Emerald,
            count,
            size: 0.15,
            tree_height: 12.0,
            tree_radius: None,
            tree_noise: 0.5,
            scatter_radius: 20.0,
        }
    }

    pub fn gold(count: usize) -> Self {
        Self {
            variant: ParticleVariant::Gold,
            count,
            size: 0.12,
            ..Self::emerald(count)
        }
    }

    pub fn base_radius(&self) -> f32 {
        self.tree_radius
            .unwrap_or_else(|| self.variant.style().base_radius)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub count: usize,
    pub tree_height: f32,
    pub tree_radius: f32,
    pub tree_scale: f32,
    pub scatter_radius: f32,
    pub grid_columns: usize,
    pub grid_spacing_x: f32,
    pub grid_spacing_y: f32,
    /// Row index that sits at eye level; rows above it get positive y.
    pub grid_center_row: f32,
    pub focus_distance: f32,
    /// Photo paths, assigned round-robin. Empty entries render a placeholder.
    pub images: Vec<String>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            count: 15,
            tree_height: 10.0,
            tree_radius: 5.0,
            tree_scale: 1.2,
            scatter_radius: 12.0,
            grid_columns: 5,
            grid_spacing_x: 1.6,
            grid_spacing_y: 2.0,
            grid_center_row: 1.5,
            focus_distance: 12.0,
            images: (1..=15).map(|i| format!("photos/{i}.jpg")).collect(),
        }
    }
}

/// Damping rates, in 1/s.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    pub particle_rate: f32,
    pub panel_morph_rate: f32,
    pub panel_pinch_rate: f32,
    pub float_amplitude: f32,
    /// Per-frame scale jitter: scale is multiplied by a factor in `[1 - shimmer, 1)`.
    pub shimmer: f32,
    /// Multiplier on tumble speed at full scatter.
    pub spin_boost: f32,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            particle_rate: 4.0,
            panel_morph_rate: 3.0,
            panel_pinch_rate: 4.0,
            float_amplitude: 0.1,
            shimmer: 0.2,
            spin_boost: 10.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub enabled: bool,
    /// Mean fingertip-to-wrist distance above which the hand counts as open.
    pub open_threshold: f32,
    /// Thumb-to-index distance below which the hand counts as pinching.
    pub pinch_threshold: f32,
    pub detector_interval_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            open_threshold: 0.25,
            pinch_threshold: 0.08,
            detector_interval_ms: 33,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub fov_degrees: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub max_polar: f32,
    pub follow_rate: f32,
    pub auto_rotate_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.0, 25.0],
            fov_degrees: 45.0,
            min_distance: 10.0,
            max_distance: 40.0,
            max_polar: std::f32::consts::PI / 1.5,
            follow_rate: 2.0,
            auto_rotate_speed: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub particles: Vec<ParticleGroupConfig>,
    pub gallery: GalleryConfig,
    pub morph: MorphConfig,
    pub gesture: GestureConfig,
    pub camera: CameraConfig,
    /// World offset of the whole formation.
    pub content_offset: [f32; 3],
    /// Fixed seed for the scatter/noise generators; random when absent.
    pub seed: Option<u64>,
    pub diag_interval: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            particles: vec![ParticleGroupConfig::emerald(2500), ParticleGroupConfig::gold(1500)],
            gallery: GalleryConfig::default(),
            morph: MorphConfig::default(),
            gesture: GestureConfig::default(),
            camera: CameraConfig::default(),
            content_offset: [0.0, 0.5, 0.0],
            seed: None,
            diag_interval: 300,
        }
    }
}

impl SceneConfig {
    /// Reduced particle counts for weak GPUs.
    pub fn low_power() -> Self {
        Self {
            particles: vec![ParticleGroupConfig::emerald(500), ParticleGroupConfig::gold(300)],
            ..Self::default()
        }
    }

    pub fn total_particles(&self) -> usize {
        self.particles.iter().map(|g| g.count).sum()
    }
}

/// Load a scene config from a JSON file. Missing fields take their defaults.
pub fn load_config(path: &str) -> Result<SceneConfig, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid config {}: {}", path, e))
}
