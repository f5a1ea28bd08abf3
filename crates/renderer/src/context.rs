//! The owning render-state struct.
//!
//! `RenderContext` holds every piece of mutable render state and is driven
//! from exactly one thread. Each frame the host drains queued tasks, calls
//! [`RenderContext::on_frame`] and executes the returned plan. GPU effects go
//! through the [`GpuResources`] passed in, so the whole frame path runs
//! against a fake in tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use scheduler::RotationTimer;
use tracing::{debug, info, warn};

use crate::clock::{AnimationClock, ClockTick};
use crate::compositor::{FrameInputs, FramePlan, TickerView, ZoneCompositor};
use crate::runtime::RenderTask;
use crate::shader::ProgramTable;
use crate::text::{dump_png, RasterizedText, TextRasterizer};
use crate::texture::{GpuResources, TextureLifecycle};
use crate::ticker::TickerAnimator;
use crate::types::{ImageSource, SceneSettings, Zone};
use crate::video::{FrameMailbox, VideoFrameBridge};

/// Pixel height of the FPS overlay bitmap.
const OVERLAY_TEXT_HEIGHT: u32 = 64;

/// State the animation clock advances each frame.
#[derive(Debug)]
pub struct Scene {
    pub textures: TextureLifecycle,
    pub ticker: TickerAnimator,
    pub rotation: RotationTimer,
}

impl Scene {
    pub fn new(settings: &SceneSettings) -> Self {
        Self {
            textures: TextureLifecycle::new(settings.crossfade),
            ticker: TickerAnimator::new(settings.ticker_speed, settings.ticker_smoothing),
            rotation: RotationTimer::new(settings.rotation_interval),
        }
    }
}

pub struct RenderContext {
    scene: Scene,
    clock: AnimationClock,
    compositor: ZoneCompositor,
    video: VideoFrameBridge,
    rasterizer: Option<Box<dyn TextRasterizer>>,
    ticker_text: String,
    ticker_height: u32,
    dump_dir: Option<PathBuf>,
    show_fps: bool,
    surface_inits: u32,
    torn_down: bool,
}

impl RenderContext {
    pub fn new(
        settings: &SceneSettings,
        mailbox: Arc<FrameMailbox>,
        rasterizer: Option<Box<dyn TextRasterizer>>,
    ) -> Self {
        if rasterizer.is_none() {
            warn!("no text rasterizer; ticker and FPS overlay are disabled");
        }
        Self {
            scene: Scene::new(settings),
            clock: AnimationClock::new(),
            compositor: ZoneCompositor::new(settings.clear_color, settings.curve),
            video: VideoFrameBridge::new(mailbox),
            rasterizer,
            ticker_text: settings.ticker_text.clone(),
            ticker_height: settings.ticker_height,
            dump_dir: settings.ticker_dump_dir.clone(),
            show_fps: settings.show_fps,
            surface_inits: 0,
            torn_down: false,
        }
    }

    /// Creates all content textures for a fresh surface.
    ///
    /// Returns true on the first initialisation only; callers start video
    /// playback on that signal and not on later re-inits.
    pub fn init_surface(&mut self, gpu: &mut dyn GpuResources, images: &[ImageSource]) -> bool {
        self.torn_down = false;
        let loaded = self.scene.textures.load_all(gpu, images);
        if loaded == 0 {
            warn!("no still images loaded; the picture zone shows its fallback colour");
        }
        self.refresh_ticker(gpu);
        if self.show_fps {
            self.refresh_overlay(gpu, 0.0);
        }
        self.clock.rewind();
        self.surface_inits += 1;
        info!(images = loaded, init = self.surface_inits, "surface content ready");
        self.surface_inits == 1
    }

    pub fn handle_task(&mut self, task: RenderTask, gpu: &mut dyn GpuResources) {
        if self.torn_down {
            debug!(?task, "ignoring task after teardown");
            return;
        }
        match task {
            RenderTask::BindVideoTarget => {
                self.video.bind_target(gpu);
            }
            RenderTask::ReleaseVideoTarget => self.video.release(gpu),
            RenderTask::SetTickerText(text) => {
                self.ticker_text = text;
                self.refresh_ticker(gpu);
            }
        }
    }

    /// Runs one frame: advance time, pull video, plan the draws.
    pub fn on_frame(
        &mut self,
        now: Instant,
        gpu: &mut dyn GpuResources,
        programs: &ProgramTable,
    ) -> FramePlan {
        let tick: ClockTick = self.clock.tick(now, &mut self.scene);
        if let Some(fps) = tick.overlay_refresh {
            if self.show_fps {
                self.refresh_overlay(gpu, fps);
            }
        }

        if self.video.is_bound() {
            self.video.update_frame(gpu);
        }

        let ticker_zone = Zone::TICKER;
        let inputs = FrameInputs {
            pic: self.scene.textures.current_draw_plan(),
            video: self.video.target().map(|target| target.handle),
            ticker: TickerView {
                texture: self.scene.textures.ticker().map(|texture| texture.handle),
                offset: self.scene.ticker.offset(),
                smoothing: self.scene.ticker.smoothing(),
                repeat: self.scene.ticker.repeat_for(ticker_zone.aspect()),
            },
            overlay: self
                .show_fps
                .then(|| self.scene.textures.overlay())
                .flatten(),
        };
        self.compositor.compose(&inputs, programs)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.compositor.resize(width, height);
    }

    /// Releases every texture this context owns. Later calls are no-ops.
    pub fn teardown(&mut self, gpu: &mut dyn GpuResources) {
        if self.torn_down {
            return;
        }
        self.scene.textures.release_all(gpu);
        self.video.release(gpu);
        self.torn_down = true;
        info!("render context torn down");
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn video(&self) -> &VideoFrameBridge {
        &self.video
    }

    fn refresh_ticker(&mut self, gpu: &mut dyn GpuResources) {
        let Some(bitmap) = self.rasterize_fitting(&self.ticker_text, self.ticker_height, gpu)
        else {
            return;
        };
        if let Some(dir) = &self.dump_dir {
            match dump_png(&bitmap, dir, Local::now()) {
                Ok(path) => debug!(path = %path.display(), "ticker bitmap saved"),
                Err(err) => warn!(dir = %dir.display(), error = %err, "failed to save ticker bitmap"),
            }
        }
        if self.scene.textures.set_ticker(gpu, &bitmap) {
            self.scene.ticker.set_texture_extent(bitmap.width, bitmap.height);
        }
    }

    fn refresh_overlay(&mut self, gpu: &mut dyn GpuResources, fps: f32) {
        let label = format!("FPS: {fps:.1}");
        if let Some(bitmap) = self.rasterize_fitting(&label, OVERLAY_TEXT_HEIGHT, gpu) {
            self.scene.textures.set_overlay(gpu, &bitmap);
        }
    }

    /// Rasterizes `text`, shrinking the height until the bitmap fits the
    /// device's texture size limit.
    fn rasterize_fitting(
        &self,
        text: &str,
        height: u32,
        gpu: &dyn GpuResources,
    ) -> Option<RasterizedText> {
        let rasterizer = self.rasterizer.as_ref()?;
        let limit = gpu.max_texture_dimension();
        let mut height = height.min(limit);
        loop {
            let bitmap = match rasterizer.rasterize(text, height) {
                Ok(bitmap) => bitmap,
                Err(err) => {
                    warn!(error = %err, "text rasterization failed");
                    return None;
                }
            };
            if bitmap.width <= limit {
                return Some(bitmap);
            }
            let shrunk = (height as u64 * limit as u64 / bitmap.width as u64) as u32;
            if shrunk == 0 || shrunk >= height {
                warn!(width = bitmap.width, limit, "text is too wide for any texture");
                return None;
            }
            debug!(from = height, to = shrunk, "shrinking text to fit texture limit");
            height = shrunk;
        }
    }
}
