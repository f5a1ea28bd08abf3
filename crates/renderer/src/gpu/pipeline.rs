use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

use crate::shader::{ProgramInfo, ProgramKind, ProgramTable, StageKind, Symbol};

use super::uniforms::UNIFORM_SLOT;

/// Interleaved quad vertex: position then texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Unit quad centred on the origin, in triangle-strip order.
pub(crate) const QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [-0.5, 0.5, 0.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [0.5, 0.5, 0.0],
        tex_coord: [1.0, 0.0],
    },
    QuadVertex {
        position: [-0.5, -0.5, 0.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [0.5, -0.5, 0.0],
        tex_coord: [1.0, 1.0],
    },
];

pub(crate) struct ProgramPipeline {
    pub info: ProgramInfo,
    pub pipeline: wgpu::RenderPipeline,
    /// Group 1 layout; absent for programs without textures.
    pub texture_layout: Option<wgpu::BindGroupLayout>,
}

/// Every built-in program that compiled on this device.
pub(crate) struct ProgramRegistry {
    pub uniform_layout: wgpu::BindGroupLayout,
    programs: HashMap<ProgramKind, ProgramPipeline>,
    table: ProgramTable,
}

impl ProgramRegistry {
    pub fn build(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SLOT as u64),
                },
                count: None,
            }],
        });

        let mut table = ProgramTable::reflect_builtin();
        let mut programs = HashMap::new();
        for kind in ProgramKind::ALL {
            let Some(info) = table.get(kind).cloned() else {
                continue;
            };
            match build_pipeline(device, surface_format, &uniform_layout, info) {
                Some(program) => {
                    programs.insert(kind, program);
                }
                None => {
                    table.remove(kind);
                }
            }
        }
        tracing::debug!(programs = programs.len(), "program registry ready");

        Self {
            uniform_layout,
            programs,
            table,
        }
    }

    /// Reflection for the programs that have a live pipeline.
    pub fn table(&self) -> &ProgramTable {
        &self.table
    }

    pub fn get(&self, kind: ProgramKind) -> Option<&ProgramPipeline> {
        self.programs.get(&kind)
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    uniform_layout: &wgpu::BindGroupLayout,
    info: ProgramInfo,
) -> Option<ProgramPipeline> {
    let kind = info.kind();
    let (vertex_source, fragment_source) = kind.sources();
    let vertex_module = create_module(device, kind, StageKind::Vertex, vertex_source)?;
    let fragment_module = create_module(device, kind, StageKind::Fragment, fragment_source)?;

    let texture_entries = texture_layout_entries(&info);
    let texture_layout = (!texture_entries.is_empty()).then(|| {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(kind.label()),
            entries: &texture_entries,
        })
    });
    let mut bind_group_layouts = vec![uniform_layout];
    if let Some(layout) = texture_layout.as_ref() {
        bind_group_layouts.push(layout);
    }
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(kind.label()),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    let attributes = vertex_attributes(&info);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(kind.label()),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        tracing::error!(program = %kind, "failed to link program: {err}");
        return None;
    }

    Some(ProgramPipeline {
        info,
        pipeline,
        texture_layout,
    })
}

fn create_module(
    device: &wgpu::Device,
    kind: ProgramKind,
    stage: StageKind,
    source: &'static str,
) -> Option<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(kind.label()),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage: stage.naga(),
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => {
            tracing::error!(program = %kind, %stage, "failed to compile shader: {err}");
            None
        }
        None => Some(module),
    }
}

fn vertex_attributes(info: &ProgramInfo) -> Vec<wgpu::VertexAttribute> {
    let mut attributes = Vec::with_capacity(2);
    if let Some(location) = info.attribute(Symbol::Position) {
        attributes.push(wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: location,
        });
    }
    if let Some(location) = info.attribute(Symbol::TexCoord) {
        attributes.push(wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            shader_location: location,
        });
    }
    attributes
}

fn texture_layout_entries(info: &ProgramInfo) -> Vec<wgpu::BindGroupLayoutEntry> {
    info.resource_bindings()
        .into_iter()
        .map(|(symbol, _group, binding)| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: match symbol {
                Symbol::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                _ => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
            },
            count: None,
        })
        .collect()
}
