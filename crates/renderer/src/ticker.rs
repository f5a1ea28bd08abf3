use std::time::Duration;

/// Scroll state for the ticker zone.
///
/// The target offset is a sawtooth of total elapsed time; the displayed
/// offset chases it with a first-order exponential smoother so a long frame
/// never makes the text jump.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerAnimator {
    speed: f64,
    smoothing: f32,
    total_time: f64,
    target_offset: f32,
    current_offset: f32,
    texture_width: Option<u32>,
    texture_height: u32,
}

impl TickerAnimator {
    pub fn new(speed: f64, smoothing: f32) -> Self {
        Self {
            speed: speed.max(0.0),
            smoothing: smoothing.clamp(f32::MIN_POSITIVE, 1.0),
            total_time: 0.0,
            target_offset: 0.0,
            current_offset: 0.0,
            texture_width: None,
            texture_height: 1,
        }
    }

    pub fn advance(&mut self, delta: Duration) {
        self.total_time += delta.as_secs_f64();
        self.target_offset = (self.total_time * self.speed).fract() as f32;
        // fract of a huge f64 can round up to exactly 1.0 once narrowed.
        if self.target_offset >= 1.0 {
            self.target_offset = 0.0;
        }
        self.current_offset += (self.target_offset - self.current_offset) * self.smoothing;
    }

    pub fn offset(&self) -> f32 {
        self.current_offset
    }

    pub fn target(&self) -> f32 {
        self.target_offset
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Records the pixel size of the uploaded ticker texture.
    pub fn set_texture_extent(&mut self, width: u32, height: u32) {
        self.texture_width = Some(width.max(1));
        self.texture_height = height.max(1);
    }

    /// How many texture widths fit across a quad of `quad_aspect` (width/height)
    /// without stretching the text. One copy before any texture exists.
    pub fn repeat_for(&self, quad_aspect: f32) -> f32 {
        match self.texture_width {
            Some(width) => quad_aspect * self.texture_height as f32 / width as f32,
            None => 1.0,
        }
    }
}
