use std::path::PathBuf;
use std::time::Duration;

use glam::Vec2;

/// RGBA colour with straight (non-premultiplied) alpha.
pub type Rgba = [f32; 4];

pub const PIC_FALLBACK: Rgba = [1.0, 0.0, 0.0, 1.0];
pub const VIDEO_FALLBACK: Rgba = [0.0, 1.0, 0.0, 1.0];
pub const TICKER_BACKGROUND: Rgba = [0.0, 0.0, 1.0, 0.5];
pub const DEFAULT_CLEAR: Rgba = [0.2, 0.2, 0.2, 1.0];

/// Half extents of the orthographic world: 16 x 9 units centred on the origin.
pub const WORLD_HALF_WIDTH: f32 = 8.0;
pub const WORLD_HALF_HEIGHT: f32 = 4.5;

/// Identity of a screen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneId {
    Pic,
    Video,
    Ticker,
}

/// What a zone shows, which decides its draw path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneContent {
    Image,
    Video,
    Ticker,
}

/// A fixed rectangle of the display in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub content: ZoneContent,
    pub center: Vec2,
    pub scale: Vec2,
    /// Fallback for `Pic`/`Video`, background for `Ticker`.
    pub color: Rgba,
}

impl Zone {
    pub const PIC: Zone = Zone {
        id: ZoneId::Pic,
        content: ZoneContent::Image,
        center: Vec2::new(-4.0, 0.0),
        scale: Vec2::new(8.0, 9.0),
        color: PIC_FALLBACK,
    };

    pub const VIDEO: Zone = Zone {
        id: ZoneId::Video,
        content: ZoneContent::Video,
        center: Vec2::new(4.0, 0.0),
        scale: Vec2::new(8.0, 9.0),
        color: VIDEO_FALLBACK,
    };

    pub const TICKER: Zone = Zone {
        id: ZoneId::Ticker,
        content: ZoneContent::Ticker,
        center: Vec2::new(0.0, -4.0),
        scale: Vec2::new(16.0, 1.0),
        color: TICKER_BACKGROUND,
    };

    /// Layout in draw order: opaque zones first, the blended ticker last.
    pub const LAYOUT: [Zone; 3] = [Zone::PIC, Zone::VIDEO, Zone::TICKER];

    /// Width over height of the zone rectangle.
    pub fn aspect(&self) -> f32 {
        self.scale.x / self.scale.y
    }
}

/// Easing applied to crossfade progress before it reaches the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadeCurve {
    Linear,
    Smoothstep,
    EaseInOut,
}

impl Default for CrossfadeCurve {
    fn default() -> Self {
        Self::Linear
    }
}

/// Adapter selection hint forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Tunables for the animated content of the display.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    /// Time between still-image switches.
    pub rotation_interval: Duration,
    /// Length of the crossfade between two stills.
    pub crossfade: Duration,
    pub curve: CrossfadeCurve,
    pub ticker_text: String,
    /// Ticker scroll speed in texture widths per second.
    pub ticker_speed: f64,
    pub ticker_smoothing: f32,
    /// Pixel height the ticker text is rasterized at.
    pub ticker_height: u32,
    pub font_path: Option<PathBuf>,
    /// When set, every rasterized ticker bitmap is also written here as PNG.
    pub ticker_dump_dir: Option<PathBuf>,
    pub show_fps: bool,
    pub clear_color: Rgba,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(3),
            crossfade: Duration::from_secs(2),
            curve: CrossfadeCurve::default(),
            ticker_text: String::new(),
            ticker_speed: 0.2,
            ticker_smoothing: 0.3,
            ticker_height: 256,
            font_path: None,
            ticker_dump_dir: None,
            show_fps: true,
            clear_color: DEFAULT_CLEAR,
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    pub vsync: bool,
    pub power: GpuPowerPreference,
    pub title: String,
    pub scene: SceneSettings,
    /// Encoded still images, already in display order.
    pub images: Vec<ImageSource>,
    pub start_muted: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1600, 900),
            vsync: true,
            power: GpuPowerPreference::default(),
            title: "zonewall".to_string(),
            scene: SceneSettings::default(),
            images: Vec::new(),
            start_muted: false,
        }
    }
}

/// One encoded still image handed to the texture pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub name: String,
    pub bytes: Vec<u8>,
}
