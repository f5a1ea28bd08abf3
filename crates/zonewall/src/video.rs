//! Background video pipeline: playlist, cache staging and engine control.
//!
//! The worker never touches GPU objects. It asks the render thread to bind or
//! release the video texture through [`RenderPoster`], and the engine hands
//! decoded frames over through the renderer's mailbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use assets::{AssetId, AssetKind, AssetSource, VideoCache};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use renderer::{MuteFlag, PlaybackEngine, PlaybackEvent, RenderPoster, RenderTask};
use scheduler::Playlist;
use tracing::{debug, info, warn};
use zoneconfig::PlaylistMode;

/// How often the worker checks for stop requests and mute changes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why the worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// No playable videos; the zone keeps its fallback colour.
    EmptyPlaylist,
    /// Every item in a full pass failed.
    PersistentFailure,
    Stopped,
    /// The render thread shut down.
    RendererGone,
}

pub struct VideoWorkerParts {
    pub source: Arc<dyn AssetSource>,
    pub cache: VideoCache,
    pub engine: Box<dyn PlaybackEngine>,
    pub poster: RenderPoster,
    pub mute: MuteFlag,
    pub mode: PlaylistMode,
    pub seed: u64,
}

pub struct VideoWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<WorkerExit>>,
}

impl VideoWorker {
    pub fn spawn(parts: VideoWorkerParts) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("zonewall-video".into())
            .spawn(move || {
                let mut parts = parts;
                let exit = run_worker(&mut parts, &thread_stop);
                info!(?exit, "video worker finished");
                exit
            })
            .map_err(|err| anyhow!("failed to spawn video worker: {err}"))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) -> Option<WorkerExit> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<WorkerExit> {
        self.stop.store(true, Ordering::Release);
        self.handle.take().and_then(|handle| handle.join().ok())
    }
}

impl Drop for VideoWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Plays the video playlist until stopped, idle or orphaned.
pub fn run_worker(parts: &mut VideoWorkerParts, stop: &AtomicBool) -> WorkerExit {
    let ids = match parts.source.list(AssetKind::Video) {
        Ok(ids) => ids,
        Err(err) => {
            warn!("video listing failed: {err}; video zone stays idle");
            return WorkerExit::EmptyPlaylist;
        }
    };
    let mut playlist = match Playlist::new("video", ids, parts.mode, parts.seed) {
        Ok(playlist) => playlist,
        Err(err) => {
            info!("{err}; video zone stays idle");
            return WorkerExit::EmptyPlaylist;
        }
    };
    info!(videos = playlist.len(), "video playlist ready");

    let mut bound = false;
    let mut consecutive_failures = 0;
    let exit = loop {
        if stop.load(Ordering::Acquire) {
            break WorkerExit::Stopped;
        }
        if !parts.poster.is_alive() {
            break WorkerExit::RendererGone;
        }
        if consecutive_failures >= playlist.len() {
            warn!(
                failures = consecutive_failures,
                "every video failed; video zone stays idle"
            );
            break WorkerExit::PersistentFailure;
        }

        let id = playlist.play_next().clone();
        match play_one(parts, &id, &mut bound, stop) {
            Ok(Played::Finished) => consecutive_failures = 0,
            Ok(Played::Interrupted) => {}
            Err(reason) => {
                warn!(video = %id.name, "{reason}; advancing to the next video");
                consecutive_failures += 1;
            }
        }
    };

    parts.engine.stop();
    if bound {
        parts.poster.post(RenderTask::ReleaseVideoTarget);
    }
    exit
}

enum Played {
    Finished,
    Interrupted,
}

/// Stages and plays one item to completion or interruption.
fn play_one(
    parts: &mut VideoWorkerParts,
    id: &AssetId,
    bound: &mut bool,
    stop: &AtomicBool,
) -> Result<Played, String> {
    let mut reader = parts.source.open(id).map_err(|err| err.to_string())?;
    let staged = parts
        .cache
        .stage(&id.name, &mut reader)
        .map_err(|err| format!("staging failed: {err}"))?;
    drop(reader);

    let mut muted = parts.mute.is_muted();
    parts.engine.set_muted(muted);
    let (events_tx, events_rx) = unbounded();
    parts
        .engine
        .start(&staged.path, events_tx)
        .map_err(|err| err.to_string())?;
    if !*bound {
        if !parts.poster.post(RenderTask::BindVideoTarget) {
            parts.engine.stop();
            return Ok(Played::Interrupted);
        }
        *bound = true;
    }
    debug!(video = %id.name, size = staged.size, "playback started");

    loop {
        match events_rx.recv_timeout(POLL_INTERVAL) {
            Ok(PlaybackEvent::Completed) => return Ok(Played::Finished),
            Ok(PlaybackEvent::Failed(reason)) => return Err(format!("decode failed: {reason}")),
            Err(RecvTimeoutError::Disconnected) => {
                return Err("engine ended without reporting".to_string())
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if stop.load(Ordering::Acquire) || !parts.poster.is_alive() {
            parts.engine.stop();
            return Ok(Played::Interrupted);
        }
        let now_muted = parts.mute.is_muted();
        if now_muted != muted {
            muted = now_muted;
            parts.engine.set_muted(muted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assets::{DirectoryAssets, SpaceProbe};
    use crossbeam_channel::Sender;
    use renderer::{FrameRequester, PlaybackError, RenderQueue};
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct NoFrames;

    impl FrameRequester for NoFrames {
        fn request_frame(&self) {}
    }

    struct FixedProbe(u64);

    impl SpaceProbe for FixedProbe {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Complete,
        FailEvent,
        RefuseStart,
    }

    /// Records every call; raises the stop flag after `stop_after` starts.
    struct ScriptedEngine {
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<String>>>,
        stop: Arc<AtomicBool>,
        stop_after: usize,
        starts: usize,
    }

    impl PlaybackEngine for ScriptedEngine {
        fn start(
            &mut self,
            path: &Path,
            events: Sender<PlaybackEvent>,
        ) -> Result<(), PlaybackError> {
            self.starts += 1;
            if self.starts >= self.stop_after {
                self.stop.store(true, Ordering::Release);
            }
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.log.lock().unwrap().push(format!("start {name}"));
            match self.behaviour {
                Behaviour::Complete => {
                    events.send(PlaybackEvent::Completed).unwrap();
                    Ok(())
                }
                Behaviour::FailEvent => {
                    events.send(PlaybackEvent::Failed("bad".into())).unwrap();
                    Ok(())
                }
                Behaviour::RefuseStart => Err(PlaybackError::Start("refused".into())),
            }
        }

        fn stop(&mut self) {}

        fn set_muted(&mut self, muted: bool) {
            self.log.lock().unwrap().push(format!("muted {muted}"));
        }

        fn extensions(&self) -> &[&'static str] {
            &["gif"]
        }
    }

    struct Harness {
        _root: TempDir,
        cache_dir: PathBuf,
        queue: RenderQueue,
        log: Arc<Mutex<Vec<String>>>,
        stop: Arc<AtomicBool>,
        parts: VideoWorkerParts,
    }

    fn harness(videos: &[&str], behaviour: Behaviour, free: u64, stop_after: usize) -> Harness {
        let root = TempDir::new().unwrap();
        let video_dir = root.path().join("videos");
        std::fs::create_dir_all(&video_dir).unwrap();
        for name in videos {
            std::fs::write(video_dir.join(name), b"GIF89a").unwrap();
        }
        let cache_dir = root.path().join("cache");
        let queue = RenderQueue::new(Arc::new(NoFrames));
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let parts = VideoWorkerParts {
            source: Arc::new(DirectoryAssets::new(None, Some(video_dir))),
            cache: VideoCache::with_probe(&cache_dir, 1 << 20, 1024, Box::new(FixedProbe(free))),
            engine: Box::new(ScriptedEngine {
                behaviour,
                log: Arc::clone(&log),
                stop: Arc::clone(&stop),
                stop_after,
                starts: 0,
            }),
            poster: queue.poster(),
            mute: MuteFlag::new(false),
            mode: PlaylistMode::Continuous,
            seed: 1,
        };
        Harness {
            _root: root,
            cache_dir,
            queue,
            log,
            stop,
            parts,
        }
    }

    fn starts(log: &Mutex<Vec<String>>) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with("start"))
            .cloned()
            .collect()
    }

    #[test]
    fn empty_playlist_stays_idle_without_binding() {
        let mut h = harness(&[], Behaviour::Complete, u64::MAX, usize::MAX);
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::EmptyPlaylist);
        assert!(h.queue.drain().is_empty());
    }

    #[test]
    fn missing_video_dir_stays_idle() {
        let mut h = harness(&[], Behaviour::Complete, u64::MAX, usize::MAX);
        h.parts.source = Arc::new(DirectoryAssets::new(None, Some("/no/such/dir".into())));
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::EmptyPlaylist);
        assert!(h.queue.drain().is_empty());
    }

    #[test]
    fn completion_advances_and_wraps() {
        let mut h = harness(&["a.gif", "b.gif", "c.gif"], Behaviour::Complete, u64::MAX, 4);
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::Stopped);

        assert_eq!(starts(&h.log).len(), 4);
        assert_eq!(
            h.queue.drain(),
            vec![RenderTask::BindVideoTarget, RenderTask::ReleaseVideoTarget]
        );
        // Each staging clears the cache first.
        assert_eq!(std::fs::read_dir(&h.cache_dir).unwrap().count(), 1);
    }

    #[test]
    fn decode_failures_advance_until_a_full_pass_fails() {
        let mut h = harness(&["a.gif", "b.gif"], Behaviour::FailEvent, u64::MAX, usize::MAX);
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::PersistentFailure);
        assert_eq!(starts(&h.log).len(), 2);
    }

    #[test]
    fn refused_start_never_binds() {
        let mut h = harness(&["a.gif"], Behaviour::RefuseStart, u64::MAX, usize::MAX);
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::PersistentFailure);
        assert!(h.queue.drain().is_empty());
    }

    #[test]
    fn insufficient_space_aborts_staging() {
        let mut h = harness(&["a.gif", "b.gif"], Behaviour::Complete, 10, usize::MAX);
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::PersistentFailure);
        assert!(starts(&h.log).is_empty());
        assert!(h.queue.drain().is_empty());
    }

    #[test]
    fn engine_follows_mute_flag() {
        let mut h = harness(&["a.gif"], Behaviour::Complete, u64::MAX, 1);
        h.parts.mute = MuteFlag::new(true);
        run_worker(&mut h.parts, &h.stop);
        let log = h.log.lock().unwrap();
        assert_eq!(log.first().map(String::as_str), Some("muted true"));
    }

    #[test]
    fn renderer_shutdown_ends_the_worker() {
        let mut h = harness(&["a.gif"], Behaviour::Complete, u64::MAX, usize::MAX);
        h.queue.shutdown();
        assert_eq!(run_worker(&mut h.parts, &h.stop), WorkerExit::RendererGone);
    }
}
