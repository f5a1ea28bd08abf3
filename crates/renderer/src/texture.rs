//! Texture ownership for the zone display.
//!
//! Types:
//!
//! - `GpuResources` is the only way render-side code creates, writes or frees
//!   textures. The wgpu registry implements it on the render thread; tests
//!   implement it with a recording fake.
//! - `TextureLifecycle` owns the still-image pool, the crossfade state, the
//!   ticker texture and the FPS overlay texture.
//! - `DrawPlan` is the pure answer to "what should the Pic zone show now".

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::text::RasterizedText;
use crate::timeline::{TransitionState, TransitionTick};
use crate::types::ImageSource;

/// Opaque, never-zero texture handle issued by a [`GpuResources`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(NonZeroU32);

impl TextureHandle {
    /// Wraps a raw id; zero means allocation failed and yields `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

/// Which owner a texture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Image(usize),
    Ticker,
    Overlay,
    Video,
}

/// How texture coordinates outside `[0, 1]` are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureWrap {
    Clamp,
    /// Repeat horizontally, clamp vertically.
    RepeatX,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub slot: TextureSlot,
    pub width: u32,
    pub height: u32,
    pub wrap: TextureWrap,
}

impl TextureDesc {
    /// Byte length of a tightly packed RGBA8 upload.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// GPU texture operations available on the render thread.
pub trait GpuResources {
    /// Creates an RGBA8 texture, optionally filled with `pixels`.
    /// Returns `None` when the allocation fails.
    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Option<TextureHandle>;

    /// Replaces the full contents of an existing texture.
    fn write_texture(&mut self, handle: TextureHandle, pixels: &[u8]) -> bool;

    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Largest width or height a texture may have.
    fn max_texture_dimension(&self) -> u32;
}

/// A GPU texture together with the size it was created at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
}

impl SizedTexture {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// What the Pic zone should draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawPlan {
    Empty,
    Single(TextureHandle),
    Blend {
        from: TextureHandle,
        to: TextureHandle,
        progress: f32,
    },
}

#[derive(Debug)]
pub struct TextureLifecycle {
    pool: Vec<SizedTexture>,
    transition: TransitionState,
    ticker: Option<SizedTexture>,
    overlay: Option<SizedTexture>,
}

impl TextureLifecycle {
    pub fn new(crossfade: Duration) -> Self {
        Self {
            pool: Vec::new(),
            transition: TransitionState::idle(crossfade),
            ticker: None,
            overlay: None,
        }
    }

    /// Decodes and uploads every source, replacing the current pool.
    ///
    /// Items that fail to decode or allocate are logged and skipped. Returns
    /// the number of textures now in the pool.
    pub fn load_all(&mut self, gpu: &mut dyn GpuResources, sources: &[ImageSource]) -> usize {
        self.release_images(gpu);
        let max_dimension = gpu.max_texture_dimension();

        for source in sources {
            let decoded = match image::load_from_memory(&source.bytes) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(image = %source.name, error = %err, "failed to decode image; skipping");
                    continue;
                }
            };
            let mut rgba = decoded.to_rgba8();
            if rgba.width() > max_dimension || rgba.height() > max_dimension {
                debug!(
                    image = %source.name,
                    width = rgba.width(),
                    height = rgba.height(),
                    max_dimension,
                    "downscaling oversized image"
                );
                let scale = max_dimension as f32 / rgba.width().max(rgba.height()) as f32;
                let width = ((rgba.width() as f32 * scale) as u32).clamp(1, max_dimension);
                let height = ((rgba.height() as f32 * scale) as u32).clamp(1, max_dimension);
                rgba = image::imageops::thumbnail(&rgba, width, height);
            }

            let desc = TextureDesc {
                slot: TextureSlot::Image(self.pool.len()),
                width: rgba.width(),
                height: rgba.height(),
                wrap: TextureWrap::Clamp,
            };
            match gpu.create_texture(&desc, Some(rgba.as_raw())) {
                Some(handle) => self.pool.push(SizedTexture {
                    handle,
                    width: desc.width,
                    height: desc.height,
                }),
                None => warn!(image = %source.name, "texture allocation failed; dropping image"),
            }
        }

        info!(loaded = self.pool.len(), requested = sources.len(), "image pool ready");
        self.pool.len()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn transition(&self) -> &TransitionState {
        &self.transition
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.active
    }

    /// Starts a crossfade to the next pool entry. No-op while one is running.
    pub fn begin_transition(&mut self, now: Instant) -> bool {
        let started = self.transition.begin(self.pool.len(), now);
        if started {
            debug!(
                from = self.transition.current_index,
                to = self.transition.next_index,
                "crossfade started"
            );
        }
        started
    }

    /// Advances the crossfade; true on the tick that completes it.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.transition.tick(now) == TransitionTick::Completed
    }

    pub fn current_draw_plan(&self) -> DrawPlan {
        let current = match self.pool.get(self.transition.current_index) {
            Some(texture) => texture.handle,
            None => return DrawPlan::Empty,
        };
        if !self.transition.active {
            return DrawPlan::Single(current);
        }
        match self.pool.get(self.transition.next_index) {
            Some(next) => DrawPlan::Blend {
                from: current,
                to: next.handle,
                progress: self.transition.progress,
            },
            None => DrawPlan::Single(current),
        }
    }

    /// Uploads a new ticker bitmap, replacing the previous one.
    pub fn set_ticker(&mut self, gpu: &mut dyn GpuResources, text: &RasterizedText) -> bool {
        let old = self.ticker.take();
        self.ticker = upload_text(gpu, text, TextureSlot::Ticker, TextureWrap::RepeatX);
        if let Some(old) = old {
            gpu.destroy_texture(old.handle);
        }
        self.ticker.is_some()
    }

    /// Uploads a new FPS overlay bitmap, replacing the previous one.
    pub fn set_overlay(&mut self, gpu: &mut dyn GpuResources, text: &RasterizedText) -> bool {
        let old = self.overlay.take();
        self.overlay = upload_text(gpu, text, TextureSlot::Overlay, TextureWrap::Clamp);
        if let Some(old) = old {
            gpu.destroy_texture(old.handle);
        }
        self.overlay.is_some()
    }

    pub fn ticker(&self) -> Option<SizedTexture> {
        self.ticker
    }

    pub fn overlay(&self) -> Option<SizedTexture> {
        self.overlay
    }

    fn release_images(&mut self, gpu: &mut dyn GpuResources) {
        for texture in self.pool.drain(..) {
            gpu.destroy_texture(texture.handle);
        }
        self.transition.reset();
    }

    /// Frees every owned texture. Safe to call more than once.
    pub fn release_all(&mut self, gpu: &mut dyn GpuResources) {
        self.release_images(gpu);
        for texture in [self.ticker.take(), self.overlay.take()].into_iter().flatten() {
            gpu.destroy_texture(texture.handle);
        }
    }
}

fn upload_text(
    gpu: &mut dyn GpuResources,
    text: &RasterizedText,
    slot: TextureSlot,
    wrap: TextureWrap,
) -> Option<SizedTexture> {
    let desc = TextureDesc {
        slot,
        width: text.width,
        height: text.height,
        wrap,
    };
    match gpu.create_texture(&desc, Some(&text.pixels)) {
        Some(handle) => Some(SizedTexture {
            handle,
            width: text.width,
            height: text.height,
        }),
        None => {
            warn!(?slot, width = text.width, height = text.height, "text texture allocation failed");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every call and hands out sequential handles.
    #[derive(Debug, Default)]
    pub struct RecordingGpu {
        pub(crate) next: u32,
        pub live: Vec<(TextureHandle, TextureDesc)>,
        pub created: Vec<TextureDesc>,
        pub writes: Vec<TextureHandle>,
        pub destroyed: Vec<TextureHandle>,
        /// Zero-based `create_texture` calls that should fail.
        pub fail_attempts: Vec<usize>,
        pub max_dimension: Option<u32>,
    }

    impl RecordingGpu {
        pub fn live_count(&self) -> usize {
            self.live.len()
        }

        pub fn desc_of(&self, handle: TextureHandle) -> Option<TextureDesc> {
            self.live
                .iter()
                .find(|(live, _)| *live == handle)
                .map(|(_, desc)| *desc)
        }
    }

    impl GpuResources for RecordingGpu {
        fn create_texture(
            &mut self,
            desc: &TextureDesc,
            pixels: Option<&[u8]>,
        ) -> Option<TextureHandle> {
            let attempt = self.created.len();
            self.created.push(*desc);
            if self.fail_attempts.contains(&attempt) {
                return None;
            }
            if let Some(pixels) = pixels {
                assert_eq!(pixels.len(), desc.byte_len(), "upload size mismatch");
            }
            self.next += 1;
            let handle = TextureHandle::from_raw(self.next)?;
            self.live.push((handle, *desc));
            Some(handle)
        }

        fn write_texture(&mut self, handle: TextureHandle, pixels: &[u8]) -> bool {
            let Some(desc) = self.desc_of(handle) else {
                return false;
            };
            assert_eq!(pixels.len(), desc.byte_len(), "write size mismatch");
            self.writes.push(handle);
            true
        }

        fn destroy_texture(&mut self, handle: TextureHandle) {
            let before = self.live.len();
            self.live.retain(|(live, _)| *live != handle);
            assert_ne!(before, self.live.len(), "destroyed unknown texture {handle:?}");
            self.destroyed.push(handle);
        }

        fn max_texture_dimension(&self) -> u32 {
            self.max_dimension.unwrap_or(8192)
        }
    }

    /// A tiny encoded PNG of the given size.
    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .expect("encode png");
        bytes.into_inner()
    }

    pub fn text(width: u32, height: u32) -> RasterizedText {
        RasterizedText {
            pixels: vec![255; (width * height * 4) as usize],
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn sources(count: usize) -> Vec<ImageSource> {
        (0..count)
            .map(|index| ImageSource {
                name: format!("image-{index}.png"),
                bytes: png(4 + index as u32, 3),
            })
            .collect()
    }

    #[test]
    fn handle_zero_is_never_a_texture() {
        assert!(TextureHandle::from_raw(0).is_none());
        assert_eq!(TextureHandle::from_raw(7).map(TextureHandle::raw), Some(7));
    }

    #[test]
    fn load_all_skips_undecodable_and_failed_items() {
        let mut gpu = RecordingGpu {
            fail_attempts: vec![1],
            ..Default::default()
        };
        let mut items = sources(3);
        items.insert(
            1,
            ImageSource {
                name: "corrupt.jpg".into(),
                bytes: b"not an image".to_vec(),
            },
        );

        let mut textures = TextureLifecycle::new(Duration::from_secs(2));
        let loaded = textures.load_all(&mut gpu, &items);

        // corrupt.jpg never reaches the GPU; the next upload is made to fail.
        assert_eq!(loaded, 2);
        assert_eq!(gpu.live_count(), 2);
        assert!(matches!(textures.current_draw_plan(), DrawPlan::Single(_)));
    }

    #[test]
    fn reload_releases_previous_pool() {
        let mut gpu = RecordingGpu::default();
        let mut textures = TextureLifecycle::new(Duration::from_secs(2));
        textures.load_all(&mut gpu, &sources(3));
        textures.begin_transition(Instant::now());
        textures.load_all(&mut gpu, &sources(2));

        assert_eq!(gpu.destroyed.len(), 3);
        assert_eq!(gpu.live_count(), 2);
        assert!(!textures.is_transitioning());
    }

    #[test]
    fn empty_pool_plans_nothing_and_never_transitions() {
        let mut textures = TextureLifecycle::new(Duration::from_secs(2));
        assert_eq!(textures.current_draw_plan(), DrawPlan::Empty);
        assert!(!textures.begin_transition(Instant::now()));
        assert_eq!(textures.current_draw_plan(), DrawPlan::Empty);
    }

    #[test]
    fn draw_plan_follows_the_transition() {
        let mut gpu = RecordingGpu::default();
        let mut textures = TextureLifecycle::new(Duration::from_secs(2));
        textures.load_all(&mut gpu, &sources(2));
        let start = Instant::now();
        let DrawPlan::Single(first) = textures.current_draw_plan() else {
            panic!("expected a single texture");
        };

        assert!(textures.begin_transition(start));
        textures.tick(start + Duration::from_secs(1));
        match textures.current_draw_plan() {
            DrawPlan::Blend { from, to, progress } => {
                assert_eq!(from, first);
                assert_ne!(to, first);
                assert!((progress - 0.5).abs() < 1e-3);
            }
            other => panic!("expected a blend, got {other:?}"),
        }

        assert!(textures.tick(start + Duration::from_secs(2)));
        let DrawPlan::Single(second) = textures.current_draw_plan() else {
            panic!("expected a single texture");
        };
        assert_ne!(second, first);
    }

    #[test]
    fn text_textures_replace_and_release() {
        let mut gpu = RecordingGpu::default();
        let mut textures = TextureLifecycle::new(Duration::from_secs(2));
        textures.load_all(&mut gpu, &sources(1));
        assert!(textures.set_ticker(&mut gpu, &text(300, 20)));
        assert!(textures.set_overlay(&mut gpu, &text(40, 10)));
        assert!(textures.set_overlay(&mut gpu, &text(48, 10)));

        let ticker = textures.ticker().unwrap();
        assert_eq!(gpu.desc_of(ticker.handle).unwrap().wrap, TextureWrap::RepeatX);
        assert_eq!(textures.overlay().unwrap().width, 48);
        assert_eq!(gpu.live_count(), 3);

        textures.release_all(&mut gpu);
        textures.release_all(&mut gpu);
        assert_eq!(gpu.live_count(), 0);
        assert_eq!(gpu.destroyed.len(), 4);
    }
}
