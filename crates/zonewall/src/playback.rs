//! Reference playback engine for animated GIFs.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use renderer::{DecodedFrame, FrameMailbox, PlaybackEngine, PlaybackError, PlaybackEvent};
use tracing::{debug, warn};

const GIF_EXTENSIONS: &[&str] = &["gif"];

/// Frames with a zero or missing delay play at this interval.
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);
/// Granularity of cancellation checks while waiting between frames.
const CANCEL_POLL: Duration = Duration::from_millis(10);

struct Session {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Decodes GIFs on a dedicated thread and publishes each frame into the
/// mailbox at the file's own pace.
pub struct GifEngine {
    mailbox: Arc<FrameMailbox>,
    muted: bool,
    session: Option<Session>,
}

impl GifEngine {
    pub fn new(mailbox: Arc<FrameMailbox>) -> Self {
        Self {
            mailbox,
            muted: false,
            session: None,
        }
    }
}

impl PlaybackEngine for GifEngine {
    fn start(&mut self, path: &Path, events: Sender<PlaybackEvent>) -> Result<(), PlaybackError> {
        self.stop();
        let is_gif = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                GIF_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if !is_gif {
            return Err(PlaybackError::Unsupported(path.display().to_string()));
        }

        let file = File::open(path)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let mailbox = Arc::clone(&self.mailbox);
        let thread_cancel = Arc::clone(&cancel);
        let name = path.display().to_string();
        let handle = thread::Builder::new()
            .name("zonewall-gif".into())
            .spawn(move || {
                let outcome = play(file, &mailbox, &thread_cancel);
                if thread_cancel.load(Ordering::Acquire) {
                    return;
                }
                let event = match outcome {
                    Ok(frames) => {
                        debug!(video = %name, frames, "playback completed");
                        PlaybackEvent::Completed
                    }
                    Err(reason) => PlaybackEvent::Failed(reason),
                };
                let _ = events.send(event);
            })
            .map_err(|err| PlaybackError::Start(err.to_string()))?;

        self.session = Some(Session { cancel, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.store(true, Ordering::Release);
            if session.handle.join().is_err() {
                warn!("GIF playback thread panicked");
            }
        }
    }

    /// GIFs carry no audio; the flag is tracked for parity with other engines.
    fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            debug!(muted, "GIF engine mute changed");
        }
        self.muted = muted;
    }

    fn extensions(&self) -> &[&'static str] {
        GIF_EXTENSIONS
    }
}

impl Drop for GifEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Publishes every frame, returning how many were shown.
fn play(file: File, mailbox: &FrameMailbox, cancel: &AtomicBool) -> Result<usize, String> {
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|err| err.to_string())?;
    let mut shown = 0;
    for frame in decoder.into_frames() {
        if cancel.load(Ordering::Acquire) {
            return Ok(shown);
        }
        let frame = frame.map_err(|err| err.to_string())?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay = match denom {
            0 => DEFAULT_FRAME_DELAY,
            _ => Duration::from_secs_f64(numer as f64 / denom as f64 / 1000.0),
        };
        let delay = if delay.is_zero() { DEFAULT_FRAME_DELAY } else { delay };

        let buffer = frame.into_buffer();
        mailbox.publish(DecodedFrame {
            width: buffer.width(),
            height: buffer.height(),
            pixels: buffer.into_raw(),
        });
        shown += 1;
        wait_cancellable(delay, cancel);
    }
    if shown == 0 {
        return Err("animation contains no frames".to_string());
    }
    Ok(shown)
}

fn wait_cancellable(total: Duration, cancel: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() && !cancel.load(Ordering::Acquire) {
        let step = remaining.min(CANCEL_POLL);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_gif(dir: &Path, frames: usize) -> PathBuf {
        let path = dir.join("clip.gif");
        let file = File::create(&path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = (0..frames).map(|index| {
            let shade = (index * 80) as u8;
            Frame::from_parts(
                RgbaImage::from_pixel(4, 2, Rgba([shade, 0, 0, 255])),
                0,
                0,
                Delay::from_numer_denom_ms(20, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
        path
    }

    #[test]
    fn plays_every_frame_then_completes() {
        let dir = TempDir::new().unwrap();
        let path = write_gif(dir.path(), 3);
        let mailbox = Arc::new(FrameMailbox::new(None));
        let mut engine = GifEngine::new(Arc::clone(&mailbox));
        let (tx, rx) = unbounded();

        engine.start(&path, tx).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(event, PlaybackEvent::Completed);
        assert_eq!(mailbox.published(), 3);
        let last = mailbox.take().unwrap();
        assert_eq!((last.width, last.height), (4, 2));
        assert_eq!(last.pixels.len(), 4 * 2 * 4);
    }

    #[test]
    fn corrupt_file_reports_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.gif");
        std::fs::write(&path, b"not a gif at all").unwrap();
        let mut engine = GifEngine::new(Arc::new(FrameMailbox::new(None)));
        let (tx, rx) = unbounded();

        engine.start(&path, tx).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, PlaybackEvent::Failed(_)));
    }

    #[test]
    fn rejects_non_gif_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let mut engine = GifEngine::new(Arc::new(FrameMailbox::new(None)));
        let (tx, _rx) = unbounded();
        assert!(matches!(
            engine.start(&dir.path().join("clip.mp4"), tx.clone()),
            Err(PlaybackError::Unsupported(_))
        ));
        assert!(matches!(
            engine.start(&dir.path().join("absent.gif"), tx),
            Err(PlaybackError::Open(_))
        ));
    }

    #[test]
    fn stop_suppresses_the_completion_event() {
        let dir = TempDir::new().unwrap();
        let path = write_gif(dir.path(), 50);
        let mut engine = GifEngine::new(Arc::new(FrameMailbox::new(None)));
        let (tx, rx) = unbounded();

        engine.start(&path, tx).unwrap();
        engine.stop();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn mute_flag_is_tracked() {
        let mut engine = GifEngine::new(Arc::new(FrameMailbox::new(None)));
        engine.set_muted(true);
        assert!(engine.muted);
    }
}
