use std::time::{Duration, Instant};

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, trace, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::compositor::{DrawCommand, FramePlan};
use crate::shader::{ProgramTable, Symbol};
use crate::types::GpuPowerPreference;

use super::context::GpuContext;
use super::pipeline::{ProgramPipeline, ProgramRegistry, QUAD};
use super::textures::TextureRegistry;
use super::uniforms::{pack_uniforms, UNIFORM_SLOT};

/// Upper bound on draws per frame; the uniform buffer holds one slot each.
const MAX_DRAWS: usize = 16;

pub(crate) struct GpuState {
    context: GpuContext,
    programs: ProgramRegistry,
    textures: TextureRegistry,
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    frame_count: u64,
    last_fps_update: Instant,
    frames_since_last_update: u32,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        gpu_power: GpuPowerPreference,
        vsync: bool,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size, gpu_power, vsync)?;
        let programs = ProgramRegistry::build(&context.device, context.surface_format);
        let textures =
            TextureRegistry::new(&context.device, &context.queue, context.max_texture_dimension);

        let vertex_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad vertices"),
                contents: bytemuck::cast_slice(&QUAD),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw uniforms"),
            size: (UNIFORM_SLOT * MAX_DRAWS) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &programs.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(UNIFORM_SLOT as u64),
                    }),
                }],
            });

        Ok(Self {
            context,
            programs,
            textures,
            vertex_buffer,
            uniform_buffer,
            uniform_bind_group,
            frame_count: 0,
            last_fps_update: Instant::now(),
            frames_since_last_update: 0,
        })
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    /// Texture store and program reflection, borrowed together for one frame.
    pub(crate) fn frame_parts(&mut self) -> (&mut TextureRegistry, &ProgramTable) {
        (&mut self.textures, self.programs.table())
    }

    pub(crate) fn live_textures(&self) -> usize {
        self.textures.live()
    }

    pub(crate) fn render(&mut self, plan: &FramePlan) -> Result<(), wgpu::SurfaceError> {
        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        if plan.draws.len() > MAX_DRAWS {
            warn!(
                requested = plan.draws.len(),
                max = MAX_DRAWS,
                "frame plan truncated"
            );
        }

        let mut prepared = Vec::with_capacity(plan.draws.len().min(MAX_DRAWS));
        let mut uniform_bytes = Vec::with_capacity(UNIFORM_SLOT * MAX_DRAWS);
        for draw in plan.draws.iter().take(MAX_DRAWS) {
            let Some(program) = self.programs.get(draw.program) else {
                trace!(program = %draw.program, "no pipeline for draw; skipped");
                continue;
            };
            let Some(textures) = self.texture_bind_group(program, draw) else {
                trace!(program = %draw.program, "missing texture for draw; skipped");
                continue;
            };
            let slot = pack_uniforms(&program.info, &draw.uniforms);
            let offset = uniform_bytes.len() as u32;
            uniform_bytes.extend_from_slice(&slot.bytes);
            prepared.push((program, offset, textures));
        }
        if !uniform_bytes.is_empty() {
            self.context
                .queue
                .write_buffer(&self.uniform_buffer, 0, &uniform_bytes);
        }

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        {
            let [r, g, b, a] = plan.clear;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("zone pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let (width, height) = plan.viewport;
            render_pass.set_viewport(
                0.0,
                0.0,
                width.min(self.context.config.width) as f32,
                height.min(self.context.config.height) as f32,
                0.0,
                1.0,
            );
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            for (program, offset, textures) in &prepared {
                render_pass.set_pipeline(&program.pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[*offset]);
                if let Some(textures) = textures {
                    render_pass.set_bind_group(1, textures, &[]);
                }
                render_pass.draw(0..QUAD.len() as u32, 0..1);
            }
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.record_frame();
        Ok(())
    }

    /// Builds the group 1 bind group. `Some(None)` for programs without
    /// textures, `None` when a required texture is missing.
    fn texture_bind_group(
        &self,
        program: &ProgramPipeline,
        draw: &DrawCommand,
    ) -> Option<Option<wgpu::BindGroup>> {
        let Some(layout) = program.texture_layout.as_ref() else {
            return Some(None);
        };
        let first = draw.textures.first().map(|(_, handle)| *handle)?;
        let mut entries = Vec::new();
        for (symbol, _group, binding) in program.info.resource_bindings() {
            let resource = match symbol {
                Symbol::Sampler => wgpu::BindingResource::Sampler(self.textures.sampler_for(first)),
                _ => {
                    let handle = draw
                        .textures
                        .iter()
                        .find(|(bound, _)| *bound == symbol)
                        .map(|(_, handle)| *handle)?;
                    wgpu::BindingResource::TextureView(&self.textures.get(handle)?.view)
                }
            };
            entries.push(wgpu::BindGroupEntry { binding, resource });
        }
        Some(Some(self.context.device.create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some(program.info.kind().label()),
                layout,
                entries: &entries,
            },
        )))
    }

    fn record_frame(&mut self) {
        self.frame_count += 1;
        self.frames_since_last_update += 1;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_fps_update);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames_since_last_update as f32 / elapsed.as_secs_f32();
            debug!(
                fps = fps.round(),
                frame_count = self.frame_count,
                textures = self.textures.live(),
                "render stats"
            );
            self.frames_since_last_update = 0;
            self.last_fps_update = now;
        }
    }
}
