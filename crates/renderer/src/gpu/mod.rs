//! wgpu backend for the zone compositor.
//!
//! - `context` owns instance, device and surface wiring.
//! - `pipeline` turns the reflected programs into render pipelines.
//! - `textures` implements [`GpuResources`](crate::texture::GpuResources)
//!   on real wgpu textures.
//! - `uniforms` packs per-draw values at their reflected offsets.
//! - `state` executes a [`FramePlan`](crate::compositor::FramePlan).

mod context;
mod pipeline;
mod state;
mod textures;
mod uniforms;

pub(crate) use state::GpuState;
