use std::time::{Duration, Instant};

use crate::types::CrossfadeCurve;

impl CrossfadeCurve {
    /// Maps linear progress in `[0, 1]` onto the eased mix factor.
    pub fn sample(self, t: f32) -> f32 {
        let clamped = t.clamp(0.0, 1.0);
        match self {
            CrossfadeCurve::Linear => clamped,
            CrossfadeCurve::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            CrossfadeCurve::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
        }
    }
}

/// Crossfade bookkeeping for the still-image pool.
///
/// `current_index` is always the image on display. While `active`, the pool
/// blends from `current_index` towards `next_index` by `progress`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionState {
    pub current_index: usize,
    pub next_index: usize,
    pub progress: f32,
    pub started_at: Option<Instant>,
    pub duration: Duration,
    pub active: bool,
}

/// Result of advancing a transition by one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionTick {
    Idle,
    Running,
    /// Progress hit 1 on this tick and `current_index` now equals the old `next_index`.
    Completed,
}

impl TransitionState {
    pub fn idle(duration: Duration) -> Self {
        Self {
            current_index: 0,
            next_index: 0,
            progress: 0.0,
            started_at: None,
            duration,
            active: false,
        }
    }

    /// Starts blending towards the following pool entry.
    ///
    /// Returns `false` without touching the state when a transition is already
    /// running or the pool is empty.
    pub fn begin(&mut self, pool_size: usize, now: Instant) -> bool {
        if self.active || pool_size == 0 {
            return false;
        }
        self.next_index = (self.current_index + 1) % pool_size;
        self.progress = 0.0;
        self.started_at = Some(now);
        self.active = true;
        true
    }

    pub fn tick(&mut self, now: Instant) -> TransitionTick {
        if !self.active {
            return TransitionTick::Idle;
        }
        let start = self.started_at.unwrap_or(now);
        let elapsed = now.saturating_duration_since(start);
        let progress = if elapsed >= self.duration {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
        };
        // Instants are monotonic, but keep progress from ever moving backwards.
        self.progress = progress.max(self.progress);

        if self.progress >= 1.0 {
            self.progress = 1.0;
            self.current_index = self.next_index;
            self.active = false;
            TransitionTick::Completed
        } else {
            TransitionTick::Running
        }
    }

    /// Drops any transition and returns to the first pool entry.
    pub fn reset(&mut self) {
        *self = Self::idle(self.duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_curve_increases_monotonically() {
        let curve = CrossfadeCurve::Linear;
        let mut last = 0.0;
        for step in 0..=10 {
            let sample = curve.sample(step as f32 / 10.0);
            assert!(sample >= last - f32::EPSILON);
            last = sample;
        }
    }

    #[test]
    fn smoothstep_and_ease_hit_endpoints() {
        for curve in [CrossfadeCurve::Smoothstep, CrossfadeCurve::EaseInOut] {
            assert!((curve.sample(0.0) - 0.0).abs() < 1e-6);
            assert!((curve.sample(0.5) - 0.5).abs() < 1e-6);
            assert!((curve.sample(1.0) - 1.0).abs() < 1e-6);
        }
        let ease = CrossfadeCurve::EaseInOut;
        assert!(ease.sample(0.25) < 0.25);
        assert!(ease.sample(0.75) > 0.75);
    }

    #[test]
    fn next_index_wraps_for_every_pool_size() {
        let now = Instant::now();
        for pool_size in 1..=6 {
            for current in 0..pool_size {
                let mut state = TransitionState::idle(Duration::from_secs(2));
                state.current_index = current;
                assert!(state.begin(pool_size, now));
                assert_eq!(state.next_index, (current + 1) % pool_size);
            }
        }
    }

    #[test]
    fn begin_while_active_leaves_state_unchanged() {
        let start = Instant::now();
        let mut state = TransitionState::idle(Duration::from_secs(2));
        assert!(state.begin(3, start));
        state.tick(start + Duration::from_millis(500));
        let snapshot = state;
        assert!(!state.begin(3, start + Duration::from_secs(1)));
        assert_eq!(state, snapshot);
    }

    #[test]
    fn progress_is_monotonic_and_commits_once() {
        let start = Instant::now();
        let duration = Duration::from_millis(2000);
        let mut state = TransitionState::idle(duration);
        state.begin(4, start);

        let mut last = 0.0;
        let mut completions = 0;
        for step in 0..=30 {
            let now = start + Duration::from_millis(step * 100);
            match state.tick(now) {
                TransitionTick::Completed => {
                    completions += 1;
                    assert_eq!(state.progress, 1.0);
                    assert_eq!(state.current_index, 1);
                    assert!(now >= start + duration);
                }
                TransitionTick::Running => assert_eq!(state.current_index, 0),
                TransitionTick::Idle => {}
            }
            assert!(state.progress >= last);
            last = state.progress;
        }
        assert_eq!(completions, 1);
        assert!(!state.active);
    }

    #[test]
    fn zero_duration_completes_on_first_tick() {
        let now = Instant::now();
        let mut state = TransitionState::idle(Duration::ZERO);
        state.begin(2, now);
        assert_eq!(state.tick(now), TransitionTick::Completed);
        assert_eq!(state.current_index, 1);
    }
}
