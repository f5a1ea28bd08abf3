//! Video frame handoff between the decode thread and the render thread.
//!
//! Decoders publish RGBA frames into a [`FrameMailbox`]; the render thread
//! pulls the newest one into a texture through [`VideoFrameBridge`]. The
//! mailbox holds a single frame, so a slow renderer simply skips frames.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{debug, warn};

use crate::runtime::FrameRequester;
use crate::texture::{GpuResources, SizedTexture, TextureDesc, TextureSlot, TextureWrap};

/// One decoded RGBA8 video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedFrame {
    fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

/// Single-slot, latest-wins frame handoff.
pub struct FrameMailbox {
    slot: Mutex<Option<DecodedFrame>>,
    published: AtomicU64,
    dropped: AtomicU64,
    requester: Option<Arc<dyn FrameRequester>>,
}

impl FrameMailbox {
    pub fn new(requester: Option<Arc<dyn FrameRequester>>) -> Self {
        Self {
            slot: Mutex::new(None),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            requester,
        }
    }

    /// Stores `frame`, replacing any frame the renderer has not taken yet,
    /// and asks for a redraw.
    pub fn publish(&self, frame: DecodedFrame) {
        let replaced = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.replace(frame).is_some()
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(requester) = &self.requester {
            requester.request_frame();
        }
    }

    pub fn take(&self) -> Option<DecodedFrame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before the renderer picked them up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Mute state shared between the UI and the playback engine.
#[derive(Debug, Clone, Default)]
pub struct MuteFlag(Arc<AtomicBool>);

impl MuteFlag {
    pub fn new(muted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(muted)))
    }

    pub fn is_muted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, muted: bool) {
        self.0.store(muted, Ordering::Release);
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Completed,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("unsupported video {0}")]
    Unsupported(String),
    #[error("failed to open video: {0}")]
    Open(#[from] std::io::Error),
    #[error("failed to start playback: {0}")]
    Start(String),
}

/// A decoder that plays one file at a time into a [`FrameMailbox`].
///
/// Exactly one [`PlaybackEvent`] is sent per successful `start`, unless
/// `stop` is called first.
pub trait PlaybackEngine: Send {
    fn start(&mut self, path: &Path, events: Sender<PlaybackEvent>) -> Result<(), PlaybackError>;

    fn stop(&mut self);

    fn set_muted(&mut self, muted: bool);

    /// Lower-case file extensions, without the dot, this engine can play.
    fn extensions(&self) -> &[&'static str];
}

/// Render-thread side of the video zone.
pub struct VideoFrameBridge {
    mailbox: Arc<FrameMailbox>,
    target: Option<SizedTexture>,
    uploaded: u64,
}

impl VideoFrameBridge {
    pub fn new(mailbox: Arc<FrameMailbox>) -> Self {
        Self {
            mailbox,
            target: None,
            uploaded: 0,
        }
    }

    pub fn mailbox(&self) -> Arc<FrameMailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<SizedTexture> {
        self.target
    }

    pub fn frames_uploaded(&self) -> u64 {
        self.uploaded
    }

    /// Ensures a video texture exists. A second call while bound is a no-op.
    pub fn bind_target(&mut self, gpu: &mut dyn GpuResources) -> Option<SizedTexture> {
        if self.target.is_some() {
            return self.target;
        }
        let black = [0u8, 0, 0, 255];
        self.target = create_video_texture(gpu, 1, 1, &black);
        if self.target.is_some() {
            debug!("video target bound");
        }
        self.target
    }

    /// Moves the newest decoded frame into the bound texture.
    ///
    /// Does nothing when unbound or when no new frame arrived, leaving the
    /// previous frame on screen. Returns true when a frame was uploaded.
    pub fn update_frame(&mut self, gpu: &mut dyn GpuResources) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let Some(frame) = self.mailbox.take() else {
            return false;
        };
        if !frame.is_well_formed() {
            warn!(
                width = frame.width,
                height = frame.height,
                len = frame.pixels.len(),
                "discarding malformed video frame"
            );
            return false;
        }

        if frame.width == target.width && frame.height == target.height {
            if !gpu.write_texture(target.handle, &frame.pixels) {
                return false;
            }
        } else {
            let resized = create_video_texture(gpu, frame.width, frame.height, &frame.pixels);
            let Some(resized) = resized else {
                return false;
            };
            gpu.destroy_texture(target.handle);
            self.target = Some(resized);
        }
        self.uploaded += 1;
        true
    }

    pub fn release(&mut self, gpu: &mut dyn GpuResources) {
        if let Some(target) = self.target.take() {
            gpu.destroy_texture(target.handle);
            debug!(uploaded = self.uploaded, "video target released");
        }
        // Anything left over belongs to the session that just ended.
        let _ = self.mailbox.take();
    }
}

fn create_video_texture(
    gpu: &mut dyn GpuResources,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Option<SizedTexture> {
    let desc = TextureDesc {
        slot: TextureSlot::Video,
        width,
        height,
        wrap: TextureWrap::Clamp,
    };
    match gpu.create_texture(&desc, Some(pixels)) {
        Some(handle) => Some(SizedTexture {
            handle,
            width,
            height,
        }),
        None => {
            warn!(width, height, "video texture allocation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::CountingRequester;
    use crate::texture::testing::RecordingGpu;

    fn frame(width: u32, height: u32, shade: u8) -> DecodedFrame {
        DecodedFrame {
            width,
            height,
            pixels: vec![shade; (width * height * 4) as usize],
        }
    }

    #[test]
    fn mailbox_keeps_only_the_latest_frame() {
        let requester = Arc::new(CountingRequester::default());
        let mailbox = FrameMailbox::new(Some(requester.clone() as Arc<dyn FrameRequester>));
        mailbox.publish(frame(2, 2, 1));
        mailbox.publish(frame(2, 2, 2));
        mailbox.publish(frame(2, 2, 3));

        assert_eq!(mailbox.take(), Some(frame(2, 2, 3)));
        assert_eq!(mailbox.take(), None);
        assert_eq!(mailbox.published(), 3);
        assert_eq!(mailbox.dropped(), 2);
        assert_eq!(requester.count(), 3);
    }

    #[test]
    fn bind_target_is_idempotent() {
        let mut gpu = RecordingGpu::default();
        let mut bridge = VideoFrameBridge::new(Arc::new(FrameMailbox::new(None)));
        let first = bridge.bind_target(&mut gpu).unwrap();
        let second = bridge.bind_target(&mut gpu).unwrap();
        assert_eq!(first, second);
        assert_eq!(gpu.created.len(), 1);
    }

    #[test]
    fn update_without_new_frame_keeps_previous_texture() {
        let mut gpu = RecordingGpu::default();
        let mailbox = Arc::new(FrameMailbox::new(None));
        let mut bridge = VideoFrameBridge::new(mailbox.clone());
        bridge.bind_target(&mut gpu);

        mailbox.publish(frame(4, 2, 9));
        assert!(bridge.update_frame(&mut gpu));
        let shown = bridge.target().unwrap();
        assert_eq!((shown.width, shown.height), (4, 2));

        assert!(!bridge.update_frame(&mut gpu));
        assert_eq!(bridge.target(), Some(shown));

        mailbox.publish(frame(4, 2, 10));
        assert!(bridge.update_frame(&mut gpu));
        assert_eq!(gpu.writes, vec![shown.handle]);
        assert_eq!(bridge.frames_uploaded(), 2);
    }

    #[test]
    fn unbound_bridge_leaves_frames_queued() {
        let mut gpu = RecordingGpu::default();
        let mailbox = Arc::new(FrameMailbox::new(None));
        let mut bridge = VideoFrameBridge::new(mailbox.clone());
        mailbox.publish(frame(1, 1, 0));
        assert!(!bridge.update_frame(&mut gpu));
        assert!(gpu.created.is_empty());
        assert!(mailbox.take().is_some());
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut gpu = RecordingGpu::default();
        let mailbox = Arc::new(FrameMailbox::new(None));
        let mut bridge = VideoFrameBridge::new(mailbox.clone());
        bridge.bind_target(&mut gpu);
        mailbox.publish(DecodedFrame {
            width: 3,
            height: 3,
            pixels: vec![0; 5],
        });
        assert!(!bridge.update_frame(&mut gpu));
        assert_eq!(gpu.created.len(), 1);
    }

    #[test]
    fn release_frees_texture_once() {
        let mut gpu = RecordingGpu::default();
        let mut bridge = VideoFrameBridge::new(Arc::new(FrameMailbox::new(None)));
        bridge.bind_target(&mut gpu);
        bridge.release(&mut gpu);
        bridge.release(&mut gpu);
        assert_eq!(gpu.destroyed.len(), 1);
        assert!(!bridge.is_bound());
    }

    #[test]
    fn mute_flag_toggles_across_clones() {
        let flag = MuteFlag::new(false);
        let shared = flag.clone();
        assert!(shared.toggle());
        assert!(flag.is_muted());
        assert!(!flag.toggle());
        assert!(!shared.is_muted());
    }
}
