//! Renderer crate for zonewall, a three-zone signage display.
//!
//! The screen is split into a picture zone with crossfading stills, a video
//! zone and a scrolling ticker, plus an FPS overlay. The overall flow is:
//!
//! ```text
//!   zonewall binary
//!          │ RendererConfig
//!          ▼
//!   WindowRuntime::spawn ──▶ render thread ──▶ winit event loop ──▶ RedrawRequested
//!          ▲                                                              │
//!          │ RenderPoster / FrameMailbox            RenderContext::on_frame ◀┘
//!   video worker                                            │ FramePlan
//!                                                           ▼
//!                                                      GpuState::render
//! ```
//!
//! Everything outside `gpu` is GPU-agnostic: [`RenderContext`] mutates state
//! and textures through the [`GpuResources`] trait and returns a
//! [`FramePlan`], so the frame logic runs under test without a device. The
//! render thread owns every GPU object. Other threads reach it only through
//! [`RenderPoster`] tasks and the latest-wins [`FrameMailbox`].

pub mod clock;
pub mod compositor;
pub mod context;
mod gpu;
pub mod runtime;
pub mod shader;
pub mod text;
pub mod texture;
pub mod ticker;
pub mod timeline;
pub mod types;
pub mod video;
mod window;

pub use compositor::{DrawCommand, FramePlan, ZoneCompositor};
pub use context::{RenderContext, Scene};
pub use runtime::{AnimationDriver, FrameRequester, RenderPoster, RenderQueue, RenderTask};
pub use shader::{CompileError, ProgramKind, ProgramTable};
pub use text::{FontdueRasterizer, TextError, TextRasterizer};
pub use texture::{GpuResources, TextureHandle, TextureLifecycle};
pub use types::{
    CrossfadeCurve, GpuPowerPreference, ImageSource, RendererConfig, Rgba, SceneSettings, Zone,
    ZoneId,
};
pub use video::{
    DecodedFrame, FrameMailbox, MuteFlag, PlaybackEngine, PlaybackError, PlaybackEvent,
};
pub use window::{WindowRuntime, WindowSignal};
