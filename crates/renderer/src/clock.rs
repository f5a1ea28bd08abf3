use std::time::{Duration, Instant};

use tracing::debug;

use crate::context::Scene;

/// Frame length assumed for the very first callback.
pub const NOMINAL_FRAME: Duration = Duration::from_nanos(16_666_667);

/// Length of one FPS sampling window.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Smallest FPS change worth re-rasterizing the overlay for.
pub const OVERLAY_THRESHOLD: f32 = 1.0;

/// Frame counter that publishes a rate once per window.
#[derive(Debug, Clone, Default)]
pub struct FpsSampler {
    frame_count: u32,
    window_start: Option<Instant>,
}

impl FpsSampler {
    /// Counts one frame; returns the new rate when a window closes.
    pub fn record_frame(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frame_count += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < FPS_WINDOW {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.window_start = Some(now);
        Some(fps)
    }
}

/// Decides when a new FPS value is far enough from the displayed one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGate {
    displayed: f32,
}

impl OverlayGate {
    pub fn new(displayed: f32) -> Self {
        Self { displayed }
    }

    pub fn displayed(&self) -> f32 {
        self.displayed
    }

    /// True, and adopts `fps` as displayed, when it differs by at least the threshold.
    pub fn offer(&mut self, fps: f32) -> bool {
        if (fps - self.displayed).abs() < OVERLAY_THRESHOLD {
            return false;
        }
        self.displayed = fps;
        true
    }
}

/// Everything one clock tick changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub delta: Duration,
    pub transition_started: bool,
    pub transition_completed: bool,
    /// Set when an FPS window closed this frame.
    pub fps: Option<f32>,
    /// Set when the overlay should be regenerated with this value.
    pub overlay_refresh: Option<f32>,
}

/// The single per-frame time integrator.
#[derive(Debug, Clone)]
pub struct AnimationClock {
    last_frame: Option<Instant>,
    fps: FpsSampler,
    gate: OverlayGate,
}

impl Default for AnimationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationClock {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            fps: FpsSampler::default(),
            gate: OverlayGate::new(0.0),
        }
    }

    /// Advances the ticker, the crossfade, the rotation check and FPS
    /// sampling, strictly in that order.
    pub fn tick(&mut self, now: Instant, scene: &mut Scene) -> ClockTick {
        let delta = match self.last_frame {
            Some(previous) => now.saturating_duration_since(previous),
            None => NOMINAL_FRAME,
        };
        self.last_frame = Some(now);

        scene.ticker.advance(delta);

        let transition_completed = scene.textures.tick(now);
        scene.rotation.arm(now);
        let mut transition_started = false;
        if scene.rotation.is_due(now) && !scene.textures.is_transitioning() {
            transition_started = scene.textures.begin_transition(now);
            scene.rotation.reset(now);
        }

        let fps = self.fps.record_frame(now);
        let overlay_refresh = fps.filter(|value| self.gate.offer(*value));
        if let Some(value) = fps {
            debug!(fps = value, refresh = overlay_refresh.is_some(), "fps window closed");
        }

        ClockTick {
            delta,
            transition_started,
            transition_completed,
            fps,
            overlay_refresh,
        }
    }

    /// Forgets the previous timestamp so the next tick uses the nominal delta.
    pub fn rewind(&mut self) {
        self.last_frame = None;
    }
}
