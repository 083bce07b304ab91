// ============================================================================
// pipeline.rs — Morphtree
// GPU pipeline creation (particles & panels), mesh geometry, instance
// buffers, textures and bind-group-layout helpers.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::camera::CameraUniforms;
use crate::panels::PanelImage;
use crate::particles::InstanceRaw;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Placeholder tint for panels without a photo (#222222).
const PLACEHOLDER_RGBA: [u8; 4] = [0x22, 0x22, 0x22, 0xFF];

// ======================== Vertex Formats ========================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

const INSTANCE_ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4, // model columns
    7 => Float32x4,                                                   // color + emissive
];

pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBS,
    }
}

// ======================== Geometry ========================

pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

/// Unit cube centered on the origin, flat-shaded (4 vertices per face).
pub fn box_mesh() -> MeshData {
    // (normal, u, v) with u × v = normal, so quads wind counter-clockwise
    // seen from outside.
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u16;
        for (su, sv) in corners {
            let p = normal * 0.5 + u * (su * 0.5) + v * (sv * 0.5);
            vertices.push(MeshVertex {
                position: p.to_array(),
                normal: normal.to_array(),
                uv: [(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData { vertices, indices }
}

/// Regular tetrahedron with unit circumradius, flat-shaded.
pub fn tetrahedron_mesh() -> MeshData {
    let corners = [
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
    ]
    .map(Vec3::normalize);

    let mut vertices = Vec::with_capacity(12);
    let mut indices = Vec::with_capacity(12);
    for excluded in 0..4 {
        let mut tri: Vec<Vec3> = (0..4).filter(|&i| i != excluded).map(|i| corners[i]).collect();
        let outward = -corners[excluded];
        if (tri[1] - tri[0]).cross(tri[2] - tri[0]).dot(outward) < 0.0 {
            tri.swap(1, 2);
        }
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize();

        let base = vertices.len() as u16;
        for (p, uv) in tri.iter().zip([[0.0, 1.0], [1.0, 1.0], [0.5, 0.0]]) {
            vertices.push(MeshVertex {
                position: p.to_array(),
                normal: normal.to_array(),
                uv,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2]);
    }
    MeshData { vertices, indices }
}

/// Unit quad in the XY plane facing +Z. `uv` (0, 0) is the top-left corner.
pub fn quad_mesh() -> MeshData {
    let v = |x: f32, y: f32, u: f32, t: f32| MeshVertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        uv: [u, t],
    };
    MeshData {
        vertices: vec![
            v(-0.5, -0.5, 0.0, 1.0),
            v(0.5, -0.5, 1.0, 1.0),
            v(0.5, 0.5, 1.0, 0.0),
            v(-0.5, 0.5, 0.0, 0.0),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, label: &str, mesh: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }
}

// ======================== Instance Buffers ========================

/// Per-frame instance data for one draw batch. Grows on demand.
pub struct InstanceBatch {
    label: String,
    pub buffer: wgpu::Buffer,
    capacity: usize,
    pub count: u32,
}

impl InstanceBatch {
    pub fn new(device: &wgpu::Device, label: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            label: label.to_string(),
            buffer: create_instance_buffer(device, label, capacity),
            capacity,
            count: 0,
        }
    }

    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, instances: &[InstanceRaw]) {
        if instances.len() > self.capacity {
            self.capacity = instances.len().next_power_of_two();
            self.buffer = create_instance_buffer(device, &self.label, self.capacity);
            log::debug!("Grew instance buffer '{}' to {}", self.label, self.capacity);
        }
        if !instances.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(instances));
        }
        self.count = instances.len() as u32;
    }
}

fn create_instance_buffer(device: &wgpu::Device, label: &str, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (capacity * std::mem::size_of::<InstanceRaw>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

// ======================== Pipelines ========================

/// All GPU pipelines, shared meshes and their associated bind groups.
pub struct ScenePipelines {
    pub particle_pipeline: wgpu::RenderPipeline,
    pub panel_pipeline: wgpu::RenderPipeline,

    pub camera_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,

    pub texture_bgl: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
    /// Plain white texture, tinted per instance (panel frames).
    pub white_texture: wgpu::BindGroup,

    pub box_mesh: GpuMesh,
    pub tetra_mesh: GpuMesh,
    pub quad_mesh: GpuMesh,
}

pub fn create_pipelines(device: &wgpu::Device, queue: &wgpu::Queue, surface_format: wgpu::TextureFormat) -> ScenePipelines {
    // ---- Load shaders ----
    let particle_shader = load_shader(device, "particles", include_str!("shaders/particles.wgsl"));
    let panel_shader = load_shader(device, "panels", include_str!("shaders/panels.wgsl"));

    // ---- Camera ----
    let camera_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("camera_bgl"),
        entries: &[bgl_uniform(0)],
    });
    let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("camera_uniforms"),
        contents: bytemuck::bytes_of(&CameraUniforms::default()),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("camera_bg"),
        layout: &camera_bgl,
        entries: &[bg_buffer(0, &camera_buffer)],
    });

    // ---- Panel textures ----
    let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("panel_texture_bgl"),
        entries: &[bgl_texture(0), bgl_sampler(1)],
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("panel_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    // ================================================================
    // PARTICLE PIPELINE
    // ================================================================
    let particle_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("particle_pipeline_layout"),
        bind_group_layouts: &[&camera_bgl],
        push_constant_ranges: &[],
    });
    let particle_pipeline = create_mesh_pipeline(
        device,
        "particle",
        &particle_layout,
        &particle_shader,
        surface_format,
        Some(wgpu::Face::Back),
    );

    // ================================================================
    // PANEL PIPELINE (frames and photos; both faces visible)
    // ================================================================
    let panel_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("panel_pipeline_layout"),
        bind_group_layouts: &[&camera_bgl, &texture_bgl],
        push_constant_ranges: &[],
    });
    let panel_pipeline =
        create_mesh_pipeline(device, "panel", &panel_layout, &panel_shader, surface_format, None);

    let white_texture = create_texture_bind_group(
        device,
        queue,
        &texture_bgl,
        &sampler,
        "white_texture",
        1,
        1,
        &[0xFF; 4],
    );

    ScenePipelines {
        particle_pipeline,
        panel_pipeline,
        camera_buffer,
        camera_bind_group,
        texture_bgl,
        sampler,
        white_texture,
        box_mesh: GpuMesh::upload(device, "box", &box_mesh()),
        tetra_mesh: GpuMesh::upload(device, "tetrahedron", &tetrahedron_mesh()),
        quad_mesh: GpuMesh::upload(device, "quad", &quad_mesh()),
    }
}

impl ScenePipelines {
    /// Upload a panel's photo, or the placeholder swatch.
    pub fn panel_texture(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        image: &PanelImage,
    ) -> wgpu::BindGroup {
        match image {
            PanelImage::Photo(img) => create_texture_bind_group(
                device,
                queue,
                &self.texture_bgl,
                &self.sampler,
                label,
                img.width(),
                img.height(),
                img.as_raw(),
            ),
            PanelImage::Placeholder => create_texture_bind_group(
                device,
                queue,
                &self.texture_bgl,
                &self.sampler,
                label,
                1,
                1,
                &PLACEHOLDER_RGBA,
            ),
        }
    }
}

/// Depth attachment matching the surface size.
pub fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

// ======================== Helpers ========================

fn load_shader(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn create_mesh_pipeline(
    device: &wgpu::Device,
    name: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    surface_format: wgpu::TextureFormat,
    cull_mode: Option<wgpu::Face>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{name}_pipeline")),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[MeshVertex::layout(), instance_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn create_texture_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_texture(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn bgl_sampler(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn bg_buffer(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangles(mesh: &MeshData) -> impl Iterator<Item = [&MeshVertex; 3]> + '_ {
        mesh.indices.chunks(3).map(|t| {
            [
                &mesh.vertices[t[0] as usize],
                &mesh.vertices[t[1] as usize],
                &mesh.vertices[t[2] as usize],
            ]
        })
    }

    /// Every triangle winds counter-clockwise around its stored normal, and
    /// the normal points away from the mesh center.
    fn assert_outward(mesh: &MeshData) {
        for [a, b, c] in triangles(mesh) {
            let (pa, pb, pc) = (
                Vec3::from(a.position),
                Vec3::from(b.position),
                Vec3::from(c.position),
            );
            let n = Vec3::from(a.normal);
            assert!((n.length() - 1.0).abs() < 1e-5);
            assert!((pb - pa).cross(pc - pa).dot(n) > 0.0);
            assert!(((pa + pb + pc) / 3.0).dot(n) > 0.0);
        }
    }

    #[test]
    fn box_is_closed_and_outward() {
        let mesh = box_mesh();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert_outward(&mesh);
        for v in &mesh.vertices {
            assert!(v.position.iter().all(|c| (c.abs() - 0.5).abs() < 1e-6));
        }
    }

    #[test]
    fn tetrahedron_is_flat_shaded_and_outward() {
        let mesh = tetrahedron_mesh();
        assert_eq!(mesh.vertices.len(), 12);
        assert_eq!(mesh.indices.len(), 12);
        assert_outward(&mesh);
        for v in &mesh.vertices {
            assert!((Vec3::from(v.position).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn quad_faces_forward_with_image_uvs() {
        let mesh = quad_mesh();
        assert_outward_quad(&mesh);
        let top_left = mesh
            .vertices
            .iter()
            .find(|v| v.position[0] < 0.0 && v.position[1] > 0.0)
            .unwrap();
        assert_eq!(top_left.uv, [0.0, 0.0]);
    }

    fn assert_outward_quad(mesh: &MeshData) {
        for [a, b, c] in triangles(mesh) {
            let e = (Vec3::from(b.position) - Vec3::from(a.position))
                .cross(Vec3::from(c.position) - Vec3::from(a.position));
            assert!(e.z > 0.0);
        }
    }

    #[test]
    fn vertex_layouts_match_structs() {
        assert_eq!(MeshVertex::layout().array_stride, 32);
        assert_eq!(instance_layout().array_stride, 80);
        assert_eq!(instance_layout().step_mode, wgpu::VertexStepMode::Instance);
        let locations: Vec<u32> = MeshVertex::ATTRIBS
            .iter()
            .chain(INSTANCE_ATTRIBS.iter())
            .map(|a| a.shader_location)
            .collect();
        assert_eq!(locations, (0..8).collect::<Vec<u32>>());
    }
}
