use std::time::{Duration, Instant};

use rand::prelude::*;
use zoneconfig::PlaylistMode;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("playlist '{0}' has no items")]
    EmptyPlaylist(String),
}

/// Wrap-around playlist whose order is fixed once at construction.
///
/// Shuffle mode permutes the items a single time; every later pass replays
/// that same permutation, so the sixth call on a five-item list repeats the
/// first item returned.
#[derive(Debug, Clone)]
pub struct Playlist<T> {
    name: String,
    items: Vec<T>,
    cursor: usize,
}

impl<T> Playlist<T> {
    pub fn new(
        name: impl Into<String>,
        items: Vec<T>,
        mode: PlaylistMode,
        seed: u64,
    ) -> Result<Self, SchedulerError> {
        let name = name.into();
        if items.is_empty() {
            return Err(SchedulerError::EmptyPlaylist(name));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self {
            name,
            items: arrange(items, mode, &mut rng),
            cursor: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the next item and advances, wrapping to the start after the last.
    pub fn play_next(&mut self) -> &T {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.items.len();
        &self.items[index]
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

/// Orders `items` according to `mode` using a seeded generator.
pub fn arrange<T>(mut items: Vec<T>, mode: PlaylistMode, rng: &mut StdRng) -> Vec<T> {
    match mode {
        PlaylistMode::Continuous => {}
        PlaylistMode::Shuffle => items.shuffle(rng),
    }
    items
}

/// Convenience wrapper around [`arrange`] for one-shot orderings.
pub fn arrange_seeded<T>(items: Vec<T>, mode: PlaylistMode, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    arrange(items, mode, &mut rng)
}

/// Wall-clock gate for still-image rotation.
#[derive(Debug, Clone, Copy)]
pub struct RotationTimer {
    interval: Duration,
    last_switch: Option<Instant>,
}

impl RotationTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_switch: None,
        }
    }

    /// Starts timing from `now` unless the timer is already running.
    pub fn arm(&mut self, now: Instant) {
        if self.last_switch.is_none() {
            self.last_switch = Some(now);
        }
    }

    /// True once more than the interval has passed since the last reset.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_switch {
            Some(last) => now.saturating_duration_since(last) > self.interval,
            None => false,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last_switch = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffled_playlist_plays_every_item_then_wraps() {
        let mut playlist =
            Playlist::new("videos", vec!["a", "b", "c", "d", "e"], PlaylistMode::Shuffle, 7)
                .unwrap();
        let mut seen: Vec<&str> = (0..5).map(|_| *playlist.play_next()).collect();
        let first = seen[0];
        let sixth = *playlist.play_next();
        assert_eq!(sixth, first);
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn continuous_playlist_keeps_source_order() {
        let mut playlist =
            Playlist::new("videos", vec![1, 2, 3], PlaylistMode::Continuous, 0).unwrap();
        let played: Vec<i32> = (0..4).map(|_| *playlist.play_next()).collect();
        assert_eq!(played, vec![1, 2, 3, 1]);
    }

    #[test]
    fn same_seed_gives_same_order() {
        let items: Vec<u32> = (0..16).collect();
        let a = arrange_seeded(items.clone(), PlaylistMode::Shuffle, 99);
        let b = arrange_seeded(items, PlaylistMode::Shuffle, 99);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_playlist_is_rejected() {
        let err = Playlist::<String>::new("videos", Vec::new(), PlaylistMode::Shuffle, 1)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::EmptyPlaylist(name) if name == "videos"));
    }

    #[test]
    fn rotation_timer_fires_after_interval() {
        let start = Instant::now();
        let mut timer = RotationTimer::new(Duration::from_secs(3));
        assert!(!timer.is_due(start + Duration::from_secs(10)));
        timer.arm(start);
        assert!(!timer.is_due(start + Duration::from_secs(3)));
        assert!(timer.is_due(start + Duration::from_millis(3001)));
        timer.reset(start + Duration::from_millis(3001));
        assert!(!timer.is_due(start + Duration::from_secs(5)));
    }
}
