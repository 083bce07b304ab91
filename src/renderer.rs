// ============================================================================
// renderer.rs — Morphtree
// HUD text rendering via glyphon: title, sensor status, morph state and
// gesture instructions.
// ============================================================================

use glyphon::{
    Attrs, Buffer as TextBuffer, Cache as GlyphCache, Color as GlyphColor, Family, FontSystem,
    Metrics, Resolution, Shaping, SwashCache, TextArea, TextAtlas, TextBounds, TextRenderer,
    Viewport as GlyphViewport,
};

use crate::config::RuntimeParams;
use crate::gesture::PipelineStatus;
use crate::state::{Formation, MorphSnapshot};

/// Everything the HUD shows for one frame.
pub struct HudStatus<'a> {
    pub params: &'a RuntimeParams,
    pub pipeline: &'a PipelineStatus,
    pub snapshot: MorphSnapshot,
    pub hand_detected: bool,
    pub frame: u64,
    pub fps: f32,
    pub particles: usize,
    pub panels: usize,
    pub focused_panels: usize,
    pub camera_distance: f32,
}

/// All glyphon resources needed for HUD text rendering.
pub struct HudRenderer {
    pub font_system: FontSystem,
    pub swash_cache: SwashCache,
    pub glyph_viewport: GlyphViewport,
    pub text_atlas: TextAtlas,
    pub text_renderer: TextRenderer,
}

impl HudRenderer {
    /// Initialize the HUD text rendering subsystem.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let mut font_system = FontSystem::new();
        let swash_cache = SwashCache::new();
        let glyph_cache = GlyphCache::new(device);
        let glyph_viewport = GlyphViewport::new(device, &glyph_cache);
        let mut text_atlas = TextAtlas::new(device, queue, &glyph_cache, surface_format);
        let text_renderer = TextRenderer::new(
            &mut text_atlas,
            device,
            wgpu::MultisampleState::default(),
            Some(wgpu::DepthStencilState {
                format: crate::pipeline::DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
        );

        // Prime font system so first frame renders correctly
        let mut primer = TextBuffer::new(&mut font_system, Metrics::new(16.0, 20.0));
        primer.set_text(
            &mut font_system,
            "Morphtree",
            Attrs::new().family(Family::Monospace),
            Shaping::Basic,
        );

        Self {
            font_system,
            swash_cache,
            glyph_viewport,
            text_atlas,
            text_renderer,
        }
    }

    /// Prepare HUD text for the current frame.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        status: &HudStatus,
        win_w: u32,
        win_h: u32,
    ) {
        self.glyph_viewport.update(
            queue,
            Resolution {
                width: win_w,
                height: win_h,
            },
        );

        let hud_text = build_hud_text(status);

        let mut text_buf = TextBuffer::new(&mut self.font_system, Metrics::new(14.0, 18.0));
        text_buf.set_size(&mut self.font_system, Some(win_w as f32), Some(win_h as f32));
        text_buf.set_text(
            &mut self.font_system,
            &hud_text,
            Attrs::new().family(Family::Monospace),
            Shaping::Basic,
        );
        text_buf.shape_until_scroll(&mut self.font_system, false);

        let prepared = self.text_renderer.prepare(
            device,
            queue,
            &mut self.font_system,
            &mut self.text_atlas,
            &self.glyph_viewport,
            [TextArea {
                buffer: &text_buf,
                left: 12.0,
                top: 10.0,
                scale: 1.0,
                bounds: TextBounds {
                    left: 0,
                    top: 0,
                    right: win_w as i32,
                    bottom: win_h as i32,
                },
                default_color: GlyphColor::rgb(255, 224, 150),
                custom_glyphs: &[],
            }],
            &mut self.swash_cache,
        );
        if let Err(e) = prepared {
            log::error!("HUD prepare failed: {}", e);
        }
    }

    /// Render HUD overlay into an active render pass.
    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        if let Err(e) = self
            .text_renderer
            .render(&self.text_atlas, &self.glyph_viewport, pass)
        {
            log::error!("HUD render failed: {}", e);
        }
    }

    /// Trim the glyph atlas after presenting.
    pub fn trim(&mut self) {
        self.text_atlas.trim();
    }
}

// ======================== HUD Text Builder ========================

pub fn sensor_label(pipeline: &PipelineStatus, hand_detected: bool) -> &'static str {
    match pipeline {
        PipelineStatus::Running { .. } if hand_detected => "Sensor active",
        PipelineStatus::Running { .. } => "Waiting for gesture",
        PipelineStatus::CameraDenied => "Gesture unavailable (camera denied)",
        PipelineStatus::Unavailable | PipelineStatus::Stopped => "Gesture unavailable",
    }
}

/// "Memories" while pinching, otherwise the formation the scene is heading to.
pub fn state_label(snapshot: MorphSnapshot) -> &'static str {
    if snapshot.pinching {
        return "Memories";
    }
    match snapshot.target_formation {
        Formation::Tree => "Gathered",
        Formation::Scattered => "Bloom",
    }
}

fn build_hud_text(status: &HudStatus) -> String {
    let pause_status = if status.params.paused { " [PAUSED]" } else { "" };
    let header = format!(
        "MORPHTREE{}\n\
         Sensor: {}   State: {}\n\
         Open hand: bloom | Fist: gather | Pinch: memories",
        pause_status,
        sensor_label(status.pipeline, status.hand_detected),
        state_label(status.snapshot),
    );

    if status.params.show_extended_ui {
        let backend = match status.pipeline {
            PipelineStatus::Running { backend } => backend.as_str(),
            other => other.label(),
        };
        format!(
            "{}\n\
             \n\
             Frame: {}   FPS: {:.0}   Camera distance: {:.1}\n\
             Particles: {}   Panels: {} ({} focused)   Detector: {}\n\
             \n\
             SIMULATED HAND:\n\
             • H: show/hide hand  |  O: open/close  |  hold P: pinch\n\
             • Mouse: move hand  |  Wheel: zoom\n\
             \n\
             SCENE:\n\
             • T: tree  |  G: scatter  |  Space: {}  |  F12: screenshot\n\
             • F1: compact HUD  |  VSync: {} (V)  |  ESC: Quit",
            header,
            status.frame,
            status.fps,
            status.camera_distance,
            status.particles,
            status.panels,
            status.focused_panels,
            backend,
            if status.params.paused { "Resume" } else { "Pause" },
            if status.params.vsync { "ON" } else { "OFF" },
        )
    } else {
        format!("{}\nFPS: {:.0} | F1: Help", header, status.fps)
    }
}
