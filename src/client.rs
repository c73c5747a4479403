//! client.rs
//! Lifecycle entry points. Every method is callable from any thread; anything
//! that touches render-owned state is marshaled through the command queue.
//!
//! Resume: mark resumed → force-stop leftovers → (render thread) start workers,
//! forward to the runtime, latch display mode.
//! Pause: mark not resumed → stop workers and persist the endpoint →
//! (render thread) release display mode.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, atomic::AtomicBool};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::render::{CommandQueue, RenderContext, RenderSummary, RenderThread};
use crate::session::{ConnectionStateStore, Preferences, SharedState};
use crate::workers::{StartOutcome, ThreadOrchestrator};
use crate::workers::interfaces::{
    KeyEvent, LatencyCollector, NativeSurface, ReceiverEvents, SettingsChange, VrRuntime, WorkerFactory,
};

pub struct StreamClient {
    queue: CommandQueue<RenderContext>,
    render: Mutex<Option<RenderThread>>,
    orchestrator: Arc<ThreadOrchestrator>,
    session: Arc<SharedState>,
}

impl StreamClient {
    /// Start the render thread. Returns once the runtime is initialized and the
    /// queue accepts commands.
    pub fn spawn(
        config: &ClientConfig,
        runtime: Arc<dyn VrRuntime>,
        factory: Arc<dyn WorkerFactory>,
        preferences: Arc<dyn Preferences>,
        latency: Arc<dyn LatencyCollector>,
    ) -> Result<Self> {
        let session = Arc::new(SharedState::new());
        let orchestrator = Arc::new(ThreadOrchestrator::new(
            config.port,
            factory,
            ConnectionStateStore::new(preferences),
            session.clone(),
            latency.clone(),
        ));
        let (queue, render) = RenderThread::spawn(runtime, orchestrator.clone(), session.clone(), latency, config)?;
        info!("[Client] ready on port {}", config.port);
        Ok(Self {
            queue,
            render: Mutex::new(Some(render)),
            orchestrator,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SharedState> {
        &self.session
    }

    pub fn orchestrator(&self) -> &Arc<ThreadOrchestrator> {
        &self.orchestrator
    }

    pub fn on_surface_created(&self, surface: NativeSurface) -> Result<()> {
        self.queue.post(move |ctx| ctx.runtime.on_surface_created(surface))
    }

    pub fn on_surface_changed(&self, surface: NativeSurface) -> Result<()> {
        self.queue.post(move |ctx| ctx.runtime.on_surface_changed(surface))
    }

    pub fn on_surface_destroyed(&self) -> Result<()> {
        self.queue.post(|ctx| ctx.runtime.on_surface_destroyed())
    }

    pub fn on_key_event(&self, event: KeyEvent) -> Result<()> {
        self.queue.post(move |ctx| ctx.runtime.on_key_event(event))
    }

    pub fn on_resume(&self) -> Result<()> {
        info!("[Client] resume");
        self.session.set_resumed(true);
        let leftovers = self.orchestrator.stop_all_workers();
        if leftovers.stopped_any() {
            debug!("[Client] stopped leftover workers before resume: {:?}", leftovers.outcomes);
        }
        self.queue.post(resume_on_render_thread)
    }

    pub fn on_pause(&self) -> Result<()> {
        info!("[Client] pause");
        self.session.set_resumed(false);
        let report = self.orchestrator.stop_and_persist();
        if report.join_failures() > 0 {
            warn!("[Client] {} worker(s) failed to join on pause", report.join_failures());
        }
        self.queue.post(|ctx| {
            ctx.runtime.on_pause();
            ctx.session.set_active_display_mode(false);
            ctx.session.reset_slot();
        })
    }

    /// Blocks until everything queued before it has run on the render thread.
    pub fn sync(&self) -> Result<()> {
        self.queue.send(|_| {})
    }

    /// Stop the workers and persist the endpoint, then stop the render thread,
    /// which tears the runtime down. Later calls return `QueueClosed`.
    pub fn shutdown(&self) -> Result<RenderSummary> {
        let render = self.render.lock().take().ok_or(Error::QueueClosed)?;
        info!("[Client] shutting down");
        self.session.set_resumed(false);
        self.session.set_active_display_mode(false);
        let report = self.orchestrator.stop_and_persist();
        if report.join_failures() > 0 {
            warn!("[Client] {} worker(s) failed to join on shutdown", report.join_failures());
        }
        self.queue.interrupt();
        render.join().map_err(Error::Runtime)
    }
}

fn resume_on_render_thread(ctx: &mut RenderContext) {
    let queue = ctx.queue.clone();
    let started = ctx.orchestrator.start_workers(ctx.runtime.clone(), ctx.refresh, |cancel| {
        Arc::new(SessionEvents { queue, cancel })
    });
    match started {
        Ok(StartOutcome::Running) => {
            ctx.runtime.on_resume();
            ctx.session.set_active_display_mode(ctx.runtime.is_active_display_mode());
        }
        Ok(StartOutcome::Retired) => debug!("[Client] paused during resume; runtime left paused"),
        Err(e) => error!("[Client] resume aborted: {}", e),
    }
}

/// Receiver callbacks for one worker generation.
struct SessionEvents {
    queue: CommandQueue<RenderContext>,
    cancel: Arc<AtomicBool>,
}

impl ReceiverEvents for SessionEvents {
    fn on_connected(&self, width: u32, height: u32) {
        info!("[Client] connected, frame geometry {}x{}", width, height);
        let applied = self.queue.send_cancellable(
            move |ctx| {
                ctx.runtime.set_frame_geometry(width, height);
                if let Some(decoder) = ctx.orchestrator.decoder() {
                    decoder.notify_geometry_change();
                }
            },
            &self.cancel,
        );
        match applied {
            Ok(()) => {}
            Err(Error::Cancelled) => debug!("[Client] geometry update cancelled by stop"),
            Err(e) => warn!("[Client] geometry update not applied: {}", e),
        }
    }

    fn on_settings_changed(&self, settings: SettingsChange) {
        if let Err(e) = self.queue.post(move |ctx| ctx.runtime.on_settings_changed(settings)) {
            warn!("[Client] settings change dropped: {}", e);
        }
    }
}
