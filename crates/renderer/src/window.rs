use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{
    ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget,
};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::context::RenderContext;
use crate::gpu::GpuState;
use crate::runtime::{AnimationDriver, FrameRequester, RenderPoster, RenderQueue};
use crate::text::{FontdueRasterizer, TextRasterizer};
use crate::types::{ImageSource, RendererConfig};
use crate::video::{FrameMailbox, MuteFlag};

#[derive(Debug, Clone, Copy)]
enum WindowCommand {
    Frame,
    Shutdown,
}

/// Notifications from the render thread to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// Content textures exist for the first time; video may start.
    SurfaceReady,
    /// The window closed or was told to shut down.
    Closed,
}

/// Reasons the animation is held. Focus is not one of them: an unattended
/// display keeps animating while another window has focus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Activity {
    occluded: bool,
    suspended: bool,
}

impl Activity {
    fn is_active(&self) -> bool {
        !self.occluded && !self.suspended
    }
}

/// Occlusion reported by a window event, if the event carries one.
fn occlusion_change(event: &WindowEvent) -> Option<bool> {
    match event {
        WindowEvent::Occluded(occluded) => Some(*occluded),
        _ => None,
    }
}

/// Wakes the event loop from any thread.
struct ProxyRequester(Mutex<EventLoopProxy<WindowCommand>>);

impl FrameRequester for ProxyRequester {
    fn request_frame(&self) {
        if let Ok(proxy) = self.0.lock() {
            let _ = proxy.send_event(WindowCommand::Frame);
        }
    }
}

struct Handles {
    requester: Arc<ProxyRequester>,
    poster: RenderPoster,
    mailbox: Arc<FrameMailbox>,
}

/// Owner-side handle to the render thread.
pub struct WindowRuntime {
    requester: Arc<ProxyRequester>,
    poster: RenderPoster,
    mailbox: Arc<FrameMailbox>,
    mute: MuteFlag,
    signals: Receiver<WindowSignal>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl WindowRuntime {
    /// Starts the render thread and waits until its GPU state exists.
    pub fn spawn(config: RendererConfig) -> Result<Self> {
        let mute = MuteFlag::new(config.start_muted);
        let (ready_tx, ready_rx) = bounded(1);
        let (signal_tx, signal_rx) = unbounded();
        let thread_mute = mute.clone();
        let handle = thread::Builder::new()
            .name("zonewall-render".into())
            .spawn(move || run_window_thread(config, thread_mute, ready_tx, signal_tx))
            .map_err(|err| anyhow!("failed to spawn render thread: {err}"))?;

        let handles = match ready_rx.recv() {
            Ok(Ok(handles)) => handles,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                return match handle.join() {
                    Ok(Err(err)) => Err(err),
                    _ => Err(anyhow!("render thread exited before initialising")),
                };
            }
        };

        Ok(Self {
            requester: handles.requester,
            poster: handles.poster,
            mailbox: handles.mailbox,
            mute,
            signals: signal_rx,
            join_handle: Some(handle),
        })
    }

    /// Queue for GPU work that must run on the render thread.
    pub fn poster(&self) -> RenderPoster {
        self.poster.clone()
    }

    pub fn mailbox(&self) -> Arc<FrameMailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn mute_flag(&self) -> MuteFlag {
        self.mute.clone()
    }

    pub fn signals(&self) -> &Receiver<WindowSignal> {
        &self.signals
    }

    /// Blocks until the render thread exits.
    pub fn wait(mut self) -> Result<()> {
        self.join()
    }

    fn send_shutdown(&self) {
        if let Ok(proxy) = self.requester.0.lock() {
            let _ = proxy.send_event(WindowCommand::Shutdown);
        }
    }

    fn join(&mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("render thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            self.send_shutdown();
            let _ = self.join();
        }
    }
}

/// Everything the event loop owns. Field order matters: the GPU state
/// (and its surface) drops before the window.
struct WindowState {
    gpu: GpuState,
    context: RenderContext,
    queue: RenderQueue,
    driver: AnimationDriver,
    mute: MuteFlag,
    signals: Sender<WindowSignal>,
    images: Vec<ImageSource>,
    activity: Activity,
    torn_down: bool,
    window: Arc<Window>,
}

impl WindowState {
    fn render_frame(&mut self, elwt: &EventLoopWindowTarget<WindowCommand>) {
        if self.torn_down || self.activity.suspended {
            return;
        }
        let (textures, programs) = self.gpu.frame_parts();
        for task in self.queue.drain() {
            self.context.handle_task(task, textures);
        }
        let plan = self.context.on_frame(Instant::now(), textures, programs);

        match self.gpu.render(&plan) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated; reconfiguring");
                self.gpu.reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory; exiting");
                self.teardown();
                elwt.exit();
                return;
            }
            Err(other) => {
                warn!("surface error: {other:?}; retrying next frame");
            }
        }

        if self.driver.after_frame() {
            self.window.request_redraw();
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.gpu.resize(size);
        self.context.resize(size.width, size.height);
    }

    fn set_occluded(&mut self, occluded: bool) {
        self.activity.occluded = occluded;
        self.apply_activity();
    }

    fn suspend(&mut self) {
        self.activity.suspended = true;
        self.apply_activity();
    }

    /// Rebuilds surface content after a suspend. The resume that follows
    /// start-up finds nothing suspended and does nothing.
    fn resume(&mut self) {
        if !self.activity.suspended || self.torn_down {
            return;
        }
        self.activity.suspended = false;
        self.gpu.reconfigure();
        let (textures, _) = self.gpu.frame_parts();
        self.context.init_surface(textures, &self.images);
        self.apply_activity();
    }

    fn apply_activity(&mut self) {
        if self.activity.is_active() {
            if self.driver.resume() {
                debug!("animation resumed");
                self.window.request_redraw();
            }
        } else {
            self.driver.pause();
            debug!(activity = ?self.activity, "animation paused");
        }
    }

    fn handle_key(&mut self, event: &KeyEvent, elwt: &EventLoopWindowTarget<WindowCommand>) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => {
                self.teardown();
                elwt.exit();
            }
            Key::Character(value) if value.eq_ignore_ascii_case("m") => {
                let muted = self.mute.toggle();
                info!(muted, "video mute toggled");
            }
            _ => {}
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.driver.stop();
        self.queue.shutdown();
        let (textures, _) = self.gpu.frame_parts();
        self.context.teardown(textures);
        debug!(remaining = self.gpu.live_textures(), "GPU textures after teardown");
        self.torn_down = true;
        let _ = self.signals.send(WindowSignal::Closed);
    }
}

fn run_window_thread(
    config: RendererConfig,
    mute: MuteFlag,
    ready_tx: Sender<Result<Handles>>,
    signal_tx: Sender<WindowSignal>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }

    let (event_loop, mut state, handles) = match initialise(&mut builder, config, mute, signal_tx) {
        Ok(parts) => parts,
        Err(err) => {
            let message = err.to_string();
            let _ = ready_tx.send(Err(anyhow!(message)));
            return Err(err);
        }
    };
    let _ = ready_tx.send(Ok(handles));

    let size = state.gpu.size();
    state.context.resize(size.width, size.height);
    let (textures, _) = state.gpu.frame_parts();
    if state.context.init_surface(textures, &state.images) {
        let _ = state.signals.send(WindowSignal::SurfaceReady);
    }
    state.driver.start();
    state.window.request_redraw();

    let run_result = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        match event {
            Event::UserEvent(WindowCommand::Frame) => {
                if !state.torn_down {
                    state.window.request_redraw();
                }
            }
            Event::UserEvent(WindowCommand::Shutdown) => {
                state.teardown();
                elwt.exit();
            }
            Event::Suspended => state.suspend(),
            Event::Resumed => state.resume(),
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                if let Some(occluded) = occlusion_change(&event) {
                    state.set_occluded(occluded);
                    return;
                }
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        state.teardown();
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => state.handle_key(&event, elwt),
                    WindowEvent::Resized(new_size) => state.resize(new_size),
                    WindowEvent::Focused(focused) => debug!(focused, "window focus changed"),
                    WindowEvent::RedrawRequested => state.render_frame(elwt),
                    _ => {}
                }
            }
            _ => {}
        }
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn initialise(
    builder: &mut EventLoopBuilder<WindowCommand>,
    config: RendererConfig,
    mute: MuteFlag,
    signal_tx: Sender<WindowSignal>,
) -> Result<(EventLoop<WindowCommand>, WindowState, Handles)> {
    let event_loop = builder
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let requester = Arc::new(ProxyRequester(Mutex::new(event_loop.create_proxy())));

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let gpu = GpuState::new(window.as_ref(), window.inner_size(), config.power, config.vsync)
        .map_err(|err| anyhow!("failed to initialise renderer: {err}"))?;

    let frame_requester: Arc<dyn FrameRequester> = requester.clone();
    let queue = RenderQueue::new(Arc::clone(&frame_requester));
    let mailbox = Arc::new(FrameMailbox::new(Some(frame_requester)));

    let rasterizer: Option<Box<dyn TextRasterizer>> =
        match FontdueRasterizer::discover(config.scene.font_path.as_deref()) {
            Ok(rasterizer) => {
                info!(font = %rasterizer.path().display(), "text font loaded");
                Some(Box::new(rasterizer))
            }
            Err(err) => {
                warn!("no usable font: {err}");
                None
            }
        };
    let context = RenderContext::new(&config.scene, Arc::clone(&mailbox), rasterizer);

    let handles = Handles {
        requester,
        poster: queue.poster(),
        mailbox,
    };
    let state = WindowState {
        gpu,
        context,
        queue,
        driver: AnimationDriver::new(),
        mute,
        signals: signal_tx,
        images: config.images,
        activity: Activity::default(),
        torn_down: false,
        window,
    };
    Ok((event_loop, state, handles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_loss_leaves_the_animation_running() {
        assert_eq!(occlusion_change(&WindowEvent::Focused(false)), None);
        assert_eq!(occlusion_change(&WindowEvent::Focused(true)), None);
        assert!(Activity::default().is_active());
    }

    #[test]
    fn occlusion_toggles_activity() {
        let mut activity = Activity::default();
        activity.occluded = occlusion_change(&WindowEvent::Occluded(true)).unwrap();
        assert!(!activity.is_active());
        activity.occluded = occlusion_change(&WindowEvent::Occluded(false)).unwrap();
        assert!(activity.is_active());
    }

    #[test]
    fn every_hold_must_clear_before_resuming() {
        let mut activity = Activity {
            occluded: true,
            suspended: true,
        };
        activity.suspended = false;
        assert!(!activity.is_active());
        activity.occluded = false;
        assert!(activity.is_active());
    }
}
