use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Asks the host to run one more frame callback.
///
/// Requests coalesce: any number of calls before the next callback yield a
/// single frame.
pub trait FrameRequester: Send + Sync {
    fn request_frame(&self);
}

/// Work another thread needs performed with GPU access.
///
/// Tasks carry plain data only; the render thread turns them into GPU calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTask {
    /// Make sure the video texture exists before frames start arriving.
    BindVideoTarget,
    /// Playback went idle; free the video texture and show the fallback.
    ReleaseVideoTarget,
    /// Replace the ticker text and re-rasterize it.
    SetTickerText(String),
}

/// Render-thread end of the task queue.
///
/// Once [`RenderQueue::shutdown`] runs, posted tasks are discarded, so late
/// continuations from workers become no-ops.
pub struct RenderQueue {
    sender: Sender<RenderTask>,
    receiver: Receiver<RenderTask>,
    alive: Arc<AtomicBool>,
    requester: Arc<dyn FrameRequester>,
}

impl RenderQueue {
    pub fn new(requester: Arc<dyn FrameRequester>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            alive: Arc::new(AtomicBool::new(true)),
            requester,
        }
    }

    /// Cloneable handle for worker threads.
    pub fn poster(&self) -> RenderPoster {
        RenderPoster {
            sender: self.sender.clone(),
            alive: Arc::clone(&self.alive),
            requester: Arc::clone(&self.requester),
        }
    }

    /// Takes every pending task in posting order.
    pub fn drain(&self) -> Vec<RenderTask> {
        if !self.is_alive() {
            return Vec::new();
        }
        self.receiver.try_iter().collect()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the render side gone and drops anything still queued.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::Release);
        let dropped = self.receiver.try_iter().count();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded render tasks at shutdown");
        }
    }
}

/// Worker-side handle for posting [`RenderTask`]s.
#[derive(Clone)]
pub struct RenderPoster {
    sender: Sender<RenderTask>,
    alive: Arc<AtomicBool>,
    requester: Arc<dyn FrameRequester>,
}

impl RenderPoster {
    /// Queues `task` and requests a frame so it runs promptly.
    /// Returns `false` once the render side has shut down.
    pub fn post(&self, task: RenderTask) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            return false;
        }
        if self.sender.send(task).is_err() {
            return false;
        }
        self.requester.request_frame();
        true
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Running,
    Paused,
}

/// On-demand frame driver.
///
/// While running, every rendered frame requests the next one. Pausing or
/// stopping detaches it; other sources may still request single frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationDriver {
    state: DriverState,
}

impl Default for AnimationDriver {
    fn default() -> Self {
        Self {
            state: DriverState::Stopped,
        }
    }
}

impl AnimationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    /// Returns true when the caller should request a frame to restart the loop.
    pub fn start(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = DriverState::Running;
        !was_running
    }

    pub fn pause(&mut self) {
        if self.state == DriverState::Running {
            self.state = DriverState::Paused;
        }
    }

    /// Returns true when the loop restarted and needs a kick.
    pub fn resume(&mut self) -> bool {
        if self.state == DriverState::Paused {
            self.state = DriverState::Running;
            true
        } else {
            false
        }
    }

    pub fn stop(&mut self) {
        self.state = DriverState::Stopped;
    }

    /// Called after a frame is presented; true if another frame should follow.
    pub fn after_frame(&self) -> bool {
        self.is_running()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingRequester;
    use super::*;

    #[test]
    fn posting_queues_task_and_requests_frame() {
        let requester = Arc::new(CountingRequester::default());
        let queue = RenderQueue::new(requester.clone());
        let poster = queue.poster();

        assert!(poster.post(RenderTask::BindVideoTarget));
        assert!(poster.post(RenderTask::SetTickerText("hi".into())));
        assert_eq!(requester.count(), 2);
        assert_eq!(
            queue.drain(),
            vec![
                RenderTask::BindVideoTarget,
                RenderTask::SetTickerText("hi".into())
            ]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn posts_after_shutdown_are_no_ops() {
        let requester = Arc::new(CountingRequester::default());
        let queue = RenderQueue::new(requester.clone());
        let poster = queue.poster();
        poster.post(RenderTask::BindVideoTarget);

        queue.shutdown();
        assert!(!poster.is_alive());
        assert!(!poster.post(RenderTask::ReleaseVideoTarget));
        assert!(queue.drain().is_empty());
        assert_eq!(requester.count(), 1);
    }

    #[test]
    fn poster_works_from_another_thread() {
        let requester = Arc::new(CountingRequester::default());
        let queue = RenderQueue::new(requester);
        let poster = queue.poster();
        std::thread::spawn(move || poster.post(RenderTask::BindVideoTarget))
            .join()
            .unwrap();
        assert_eq!(queue.drain(), vec![RenderTask::BindVideoTarget]);
    }

    #[test]
    fn driver_pause_and_resume() {
        let mut driver = AnimationDriver::new();
        assert!(!driver.after_frame());
        assert!(driver.start());
        assert!(!driver.start());
        assert!(driver.after_frame());

        driver.pause();
        assert_eq!(driver.state(), DriverState::Paused);
        assert!(!driver.after_frame());
        assert!(driver.resume());
        assert!(!driver.resume());

        driver.stop();
        driver.pause();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(!driver.resume());
    }
}
