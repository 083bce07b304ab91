// ============================================================================
// app.rs — Morphtree
// Application state and winit event-loop handler: GPU setup, the detector
// loop, the per-frame scene step and the render pass.
// ============================================================================

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    event::{MouseScrollDelta, WindowEvent},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes},
};

use crate::config::{RuntimeParams, SceneConfig};
use crate::gesture::{DetectorBackend, DisabledBackend, GesturePipeline, SimHandPose, SimulatedBackend};
use crate::input::SimHandInput;
use crate::metrics::FrameMetrics;
use crate::panels::load_panel_image;
use crate::particles::{srgb_to_linear, InstanceRaw, MeshKind};
use crate::pipeline::{create_depth_view, create_pipelines, InstanceBatch, ScenePipelines};
use crate::recorder::{SessionRecorder, DEFAULT_RUNS_DIR};
use crate::renderer::{HudRenderer, HudStatus};
use crate::scene::SceneState;
use crate::state::{Formation, MorphStore};

/// Emissive boost on photos so they read as lit prints.
const PHOTO_EMISSIVE: f32 = 0.35;

// ======================== Application ========================

pub struct App {
    state: Option<AppState>,
    config: AppConfig,
}

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub scene: SceneConfig,
    /// Export metrics, events and a summary here on exit.
    pub export_dir: Option<PathBuf>,
}

struct AppState {
    // GPU
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    pipelines: ScenePipelines,

    // Per-frame GPU data
    particle_batches: Vec<InstanceBatch>,
    frame_batch: InstanceBatch,
    photo_batch: InstanceBatch,
    panel_textures: Vec<wgpu::BindGroup>,
    frame_instances: Vec<InstanceRaw>,
    photo_instances: Vec<InstanceRaw>,

    // Window
    window: Arc<Window>,

    // Scene & gestures
    scene: SceneState,
    gestures: GesturePipeline,
    hand_input: SimHandInput,
    params: RuntimeParams,

    // HUD
    hud: HudRenderer,

    // Session
    recorder: SessionRecorder,
    export_on_exit: bool,
    screenshot_requested: bool,

    // Timing
    started: Instant,
    last_redraw: Instant,
    fps: f32,

    // Diagnostics
    last_metrics: Option<FrameMetrics>,
    diag_interval: u64,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self { state: None, config }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("Morphtree")
            .with_inner_size(winit::dpi::LogicalSize::new(1280u32, 800u32));

        let window = Arc::new(event_loop.create_window(window_attrs).unwrap());

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone()).unwrap();

        let params = RuntimeParams::default();
        let (device, queue, surface_config) =
            match pollster::block_on(init_gpu(&instance, &surface, &window, params.vsync)) {
                Ok(gpu) => gpu,
                Err(e) => {
                    log::error!("{}", e);
                    event_loop.exit();
                    return;
                }
            };

        surface.configure(&device, &surface_config);

        let pipelines = create_pipelines(&device, &queue, surface_config.format);
        let depth_view = create_depth_view(&device, surface_config.width, surface_config.height);
        let hud = HudRenderer::new(&device, &queue, surface_config.format);

        // ---- Scene ----
        let scene_config = &self.config.scene;
        let store = Rc::new(MorphStore::new());
        let scene = SceneState::new(scene_config, store.clone());

        let particle_batches = scene
            .groups
            .iter()
            .map(|g| InstanceBatch::new(&device, &format!("{}_instances", g.variant().name()), g.len()))
            .collect();
        let panel_count = scene.gallery.len();
        let mut placeholders = 0;
        let max_dim = device.limits().max_texture_dimension_2d;
        let panel_textures = scene
            .gallery
            .records()
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let image = load_panel_image(record.image.as_deref(), max_dim);
                if image.is_placeholder() {
                    placeholders += 1;
                }
                pipelines.panel_texture(&device, &queue, &format!("panel_texture_{i}"), &image)
            })
            .collect();
        if placeholders > 0 {
            log::warn!("{} of {} panels show the placeholder", placeholders, panel_count);
        }

        // ---- Gestures ----
        let pose = Rc::new(Cell::new(SimHandPose::default()));
        let simulated = SimulatedBackend::new(pose.clone());
        let primary: &dyn DetectorBackend = if scene_config.gesture.enabled {
            &simulated
        } else {
            &DisabledBackend
        };
        let gestures = GesturePipeline::start(primary, None, scene_config.gesture.clone(), store);

        let base = self
            .config
            .export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNS_DIR));
        let mut recorder = SessionRecorder::new(base);
        recorder.log_event(0, "DETECTOR", gestures.status().label());

        log::info!(
            "Morphtree initialized: {}x{}, {} particles, {} panels",
            surface_config.width,
            surface_config.height,
            scene_config.total_particles(),
            panel_count
        );

        let frame_batch = InstanceBatch::new(&device, "frame_instances", panel_count);
        let photo_batch = InstanceBatch::new(&device, "photo_instances", panel_count);

        self.state = Some(AppState {
            device,
            queue,
            surface,
            depth_view,
            particle_batches,
            frame_batch,
            photo_batch,
            panel_textures,
            frame_instances: Vec::with_capacity(panel_count),
            photo_instances: Vec::with_capacity(panel_count),
            surface_config,
            pipelines,
            window: window.clone(),
            scene,
            gestures,
            hand_input: SimHandInput::new(pose),
            params,
            hud,
            recorder,
            export_on_exit: self.config.export_dir.is_some(),
            screenshot_requested: false,
            started: Instant::now(),
            last_redraw: Instant::now(),
            fps: 0.0,
            last_metrics: None,
            diag_interval: self.config.scene.diag_interval.max(1) as u64,
        });

        // Initial redraw — required on macOS with winit 0.30
        window.request_redraw();
    }

    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            poll_detector(state);
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput { event, .. } => {
                handle_keyboard(state, event_loop, &event);
            }

            WindowEvent::CursorMoved { position, .. } => {
                state.hand_input.move_cursor(
                    position.x,
                    position.y,
                    state.surface_config.width,
                    state.surface_config.height,
                );
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match &delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
                state.scene.camera.apply_scroll(scroll);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    state.surface_config.width = new_size.width;
                    state.surface_config.height = new_size.height;
                    state.surface.configure(&state.device, &state.surface_config);
                    state.depth_view =
                        create_depth_view(&state.device, new_size.width, new_size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                redraw(state);
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        let Some(state) = &mut self.state else {
            return;
        };
        if state.gestures.is_running() {
            state.gestures.stop();
        }
        let frame = state.scene.frame;
        state.recorder.log_event(frame, "DETECTOR", state.gestures.status().label());
        if state.export_on_exit {
            state.recorder.finalize(frame, &self.config.scene);
        }
        log::info!("Morphtree shut down after {} frames", frame);
    }
}

// ======================== GPU Init ========================

async fn init_gpu(
    instance: &wgpu::Instance,
    surface: &wgpu::Surface<'_>,
    window: &Window,
    vsync: bool,
) -> Result<(wgpu::Device, wgpu::Queue, wgpu::SurfaceConfiguration), String> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(surface),
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| String::from("Failed to find a suitable GPU adapter"))?;

    log::info!("GPU: {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("morphtree_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| format!("Failed to create device: {e}"))?;

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .or_else(|| surface_caps.formats.first().copied())
        .ok_or_else(|| String::from("Surface reports no supported formats"))?;

    let present_mode = select_present_mode(vsync, &surface_caps.present_modes);

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode,
        alpha_mode: surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };

    Ok((device, queue, surface_config))
}

fn select_present_mode(vsync: bool, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        log::info!("Present mode: AutoVsync");
        wgpu::PresentMode::AutoVsync
    } else if available.contains(&wgpu::PresentMode::Mailbox) {
        log::info!("Present mode: Mailbox (uncapped FPS)");
        wgpu::PresentMode::Mailbox
    } else if available.contains(&wgpu::PresentMode::Immediate) {
        log::info!("Present mode: Immediate (uncapped FPS)");
        wgpu::PresentMode::Immediate
    } else {
        log::info!("Present mode: Fifo (VSync ON)");
        wgpu::PresentMode::Fifo
    }
}

// ======================== Detector Loop ========================

fn poll_detector(state: &mut AppState) {
    let Some((_, changed)) = state.gestures.poll(state.started.elapsed()) else {
        return;
    };
    if let Some(formation) = changed {
        state
            .recorder
            .log_event(state.scene.frame, "FORMATION", formation.name());
    }
}

// ======================== Keyboard ========================

fn handle_keyboard(
    state: &mut AppState,
    event_loop: &winit::event_loop::ActiveEventLoop,
    event: &winit::event::KeyEvent,
) {
    let pressed = event.state.is_pressed();
    let frame = state.scene.frame;

    match &event.logical_key {
        Key::Named(NamedKey::Escape) if pressed => event_loop.exit(),
        Key::Named(NamedKey::F1) if pressed => {
            state.params.show_extended_ui = !state.params.show_extended_ui;
        }
        Key::Named(NamedKey::F12) if pressed => {
            state.screenshot_requested = true;
        }
        Key::Named(NamedKey::Space) if pressed => {
            state.params.paused = !state.params.paused;
            state.recorder.log_event(
                frame,
                "CONTROL",
                if state.params.paused { "Paused" } else { "Resumed" },
            );
        }

        Key::Character(c) => match c.as_str() {
            "h" | "H" if pressed && !event.repeat => {
                let present = state.hand_input.toggle_hand();
                log::info!("Simulated hand: {}", if present { "shown" } else { "hidden" });
            }
            "o" | "O" if pressed && !event.repeat => {
                let open = state.hand_input.toggle_open();
                log::info!("Simulated hand: {}", if open { "open" } else { "closed" });
            }
            "p" | "P" if !event.repeat => state.hand_input.set_pinch(pressed),
            "t" | "T" if pressed => override_formation(state, Formation::Tree),
            "g" | "G" if pressed => override_formation(state, Formation::Scattered),
            "v" | "V" if pressed => {
                state.params.vsync = !state.params.vsync;
                let mode = if state.params.vsync {
                    wgpu::PresentMode::AutoVsync
                } else {
                    wgpu::PresentMode::Immediate
                };
                state.surface_config.present_mode = mode;
                state.surface.configure(&state.device, &state.surface_config);
            }
            _ => {}
        },

        _ => {}
    }
}

fn override_formation(state: &mut AppState, formation: Formation) {
    state.scene.store.set_formation(formation);
    log::info!("Formation override -> {}", formation.name());
    state
        .recorder
        .log_event(state.scene.frame, "OVERRIDE", formation.name());
}

// ======================== Frame ========================

fn redraw(state: &mut AppState) {
    let now = Instant::now();
    let dt = now.duration_since(state.last_redraw).as_secs_f32().max(0.0001);
    state.last_redraw = now;
    state.fps = state.fps * 0.95 + (1.0 / dt) * 0.05;

    if !state.params.paused {
        state.scene.step(dt);
    }

    let win_w = state.surface_config.width;
    let win_h = state.surface_config.height;
    let aspect = win_w as f32 / win_h.max(1) as f32;

    state.queue.write_buffer(
        &state.pipelines.camera_buffer,
        0,
        bytemuck::bytes_of(&state.scene.camera.uniforms(aspect)),
    );
    upload_instances(state);

    let hand = state.scene.store.hand();
    let status = HudStatus {
        params: &state.params,
        pipeline: state.gestures.status(),
        snapshot: state.scene.store.snapshot(),
        hand_detected: hand.detected,
        frame: state.scene.frame,
        fps: state.fps,
        particles: state.scene.total_instances(),
        panels: state.scene.panels.len(),
        focused_panels: state.scene.gallery.focused_count(),
        camera_distance: state.scene.camera.distance,
    };
    state.hud.prepare(&state.device, &state.queue, &status, win_w, win_h);

    let output = match state.surface.get_current_texture() {
        Ok(t) => t,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            state.surface.configure(&state.device, &state.surface_config);
            return;
        }
        Err(e) => {
            log::error!("Surface error: {:?}", e);
            return;
        }
    };

    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = state
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });
    encode_scene_pass(state, &mut encoder, &view);

    let screenshot = if state.screenshot_requested {
        Some(encode_screenshot_copy(state, &mut encoder, &output.texture))
    } else {
        None
    };

    state.queue.submit(std::iter::once(encoder.finish()));

    if let Some((staging, padded_bpr)) = screenshot {
        save_screenshot(state, &staging, padded_bpr);
        state.screenshot_requested = false;
    }

    output.present();
    state.hud.trim();

    if !state.params.paused && state.scene.frame % state.diag_interval == 0 {
        let metrics = FrameMetrics::from_scene(&state.scene);
        metrics.log(state.last_metrics.as_ref());
        state.recorder.record_metrics(metrics.clone());
        state.last_metrics = Some(metrics);
    }
}

fn upload_instances(state: &mut AppState) {
    for (batch, instances) in state
        .particle_batches
        .iter_mut()
        .zip(state.scene.instances.iter())
    {
        batch.write(&state.device, &state.queue, instances);
    }

    let ivory = srgb_to_linear(0xFF, 0xFF, 0xF0);
    state.frame_instances.clear();
    state.photo_instances.clear();
    for panel in &state.scene.panels {
        state
            .frame_instances
            .push(InstanceRaw::new(panel.frame_model(), ivory, 0.0));
        state
            .photo_instances
            .push(InstanceRaw::new(panel.photo_model(), [1.0; 3], PHOTO_EMISSIVE));
    }
    state
        .frame_batch
        .write(&state.device, &state.queue, &state.frame_instances);
    state
        .photo_batch
        .write(&state.device, &state.queue, &state.photo_instances);
}

fn encode_scene_pass(state: &AppState, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("scene_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: 0.0,
                    g: 0.01,
                    b: 0.008,
                    a: 1.0,
                }),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &state.depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    let p = &state.pipelines;

    // ---- Particles ----
    pass.set_pipeline(&p.particle_pipeline);
    pass.set_bind_group(0, &p.camera_bind_group, &[]);
    for (group, batch) in state.scene.groups.iter().zip(&state.particle_batches) {
        if group.is_empty() {
            continue;
        }
        let mesh = match group.style().mesh {
            MeshKind::Box => &p.box_mesh,
            MeshKind::Tetrahedron => &p.tetra_mesh,
        };
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, batch.buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..mesh.index_count, 0, 0..batch.count);
    }

    // ---- Panels ----
    if !state.scene.gallery.is_empty() {
        let quad = &p.quad_mesh;
        pass.set_pipeline(&p.panel_pipeline);
        pass.set_bind_group(0, &p.camera_bind_group, &[]);
        pass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
        pass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);

        pass.set_bind_group(1, &p.white_texture, &[]);
        pass.set_vertex_buffer(1, state.frame_batch.buffer.slice(..));
        pass.draw_indexed(0..quad.index_count, 0, 0..state.frame_batch.count);

        pass.set_vertex_buffer(1, state.photo_batch.buffer.slice(..));
        for (i, texture) in state
            .panel_textures
            .iter()
            .enumerate()
            .take(state.photo_batch.count as usize)
        {
            let i = i as u32;
            pass.set_bind_group(1, texture, &[]);
            pass.draw_indexed(0..quad.index_count, 0, i..i + 1);
        }
    }

    state.hud.render(&mut pass);
}

// ======================== Screenshot ========================

fn encode_screenshot_copy(
    state: &AppState,
    encoder: &mut wgpu::CommandEncoder,
    texture: &wgpu::Texture,
) -> (wgpu::Buffer, u32) {
    let win_w = state.surface_config.width;
    let win_h = state.surface_config.height;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bpr = (win_w * 4).div_ceil(align) * align;

    let staging = state.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("screenshot_staging"),
        size: (padded_bpr * win_h) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(win_h),
            },
        },
        wgpu::Extent3d {
            width: win_w,
            height: win_h,
            depth_or_array_layers: 1,
        },
    );
    (staging, padded_bpr)
}

fn save_screenshot(state: &mut AppState, staging: &wgpu::Buffer, padded_bpr: u32) {
    let win_w = state.surface_config.width;
    let win_h = state.surface_config.height;
    let bgra = matches!(
        state.surface_config.format,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    );

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    state.device.poll(wgpu::Maintain::Wait);

    if !matches!(rx.recv(), Ok(Ok(()))) {
        log::error!("Screenshot readback failed");
        return;
    }

    let data = slice.get_mapped_range();
    let mut rgba = Vec::with_capacity((win_w * win_h * 4) as usize);
    for row in 0..win_h {
        let start = (row * padded_bpr) as usize;
        let end = start + (win_w * 4) as usize;
        for px in data[start..end].chunks_exact(4) {
            if bgra {
                rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            } else {
                rgba.extend_from_slice(px);
            }
        }
    }
    drop(data);
    staging.unmap();

    if let Err(e) = state
        .recorder
        .save_screenshot(state.scene.frame, win_w, win_h, &rgba)
    {
        log::error!("Screenshot failed: {}", e);
    }
}
