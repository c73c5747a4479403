//! render_loop.rs
//! The render-owning thread.
//!
//! Spawn handshake:
//! 1. The render thread creates the command queue and initializes the runtime.
//! 2. It sends the queue back over a one-shot channel, or the init error.
//! 3. Only then does `RenderThread::spawn` return the queue to callers.
//!
//! Loop, while the queue is open:
//! - not streaming → block on the next command
//! - connected and decoder output pending → one FrameSync-paced frame
//! - otherwise → idle status frame, then sleep `idle_frame_interval`

use crossbeam::channel::bounded;
use log::{debug, error, info};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::render::command_queue::{self, CommandLoop, CommandQueue};
use crate::render::frame_sync::FrameSync;
use crate::session::SharedState;
use crate::workers::ThreadOrchestrator;
use crate::workers::interfaces::{LatencyCollector, RefreshRate, VrRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStatus {
    AwaitingConnect,
    Connected,
}

impl IdleStatus {
    pub fn for_connection(connected: bool) -> Self {
        if connected { IdleStatus::Connected } else { IdleStatus::AwaitingConnect }
    }

    pub fn text(&self) -> &'static str {
        match self {
            IdleStatus::AwaitingConnect => "Press CONNECT button on server",
            IdleStatus::Connected => "Connected! Streaming will begin soon!",
        }
    }

    /// Full message drawn on the idle frame.
    pub fn message(&self, version_name: &str) -> String {
        format!("{}\n\n{}", version_name, self.text())
    }
}

/// Counters reported when the render thread exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub frames_submitted: u64,
    pub idle_frames: u64,
    pub discarded_frames: u64,
}

/// State owned by the render thread; command-queue work receives `&mut` to it.
pub struct RenderContext {
    pub runtime: Arc<dyn VrRuntime>,
    pub orchestrator: Arc<ThreadOrchestrator>,
    pub session: Arc<SharedState>,
    pub latency: Arc<dyn LatencyCollector>,
    /// Sender side of this thread's own queue, for callbacks that post back.
    pub queue: CommandQueue<RenderContext>,
    pub refresh: RefreshRate,
    frame_sync: FrameSync,
    idle_frame_interval: Duration,
    version_name: String,
    summary: RenderSummary,
}

impl RenderContext {
    pub fn summary(&self) -> RenderSummary {
        RenderSummary { discarded_frames: self.frame_sync.discarded_frames(), ..self.summary }
    }

    fn render_once(&mut self) {
        let connected = self.orchestrator.receiver().is_some_and(|r| r.is_connected());
        let output_ready = connected && self.orchestrator.decoder().is_some_and(|d| d.is_output_available());

        if output_ready {
            self.runtime.render(&mut self.frame_sync);
            if let Some(index) = self.frame_sync.take_presented() {
                self.latency.submitted(index);
                self.summary.frames_submitted += 1;
            }
        } else {
            let status = IdleStatus::for_connection(connected);
            self.runtime.render_idle(&status.message(&self.version_name));
            self.summary.idle_frames += 1;
            thread::sleep(self.idle_frame_interval);
        }
    }
}

pub struct RenderThread {
    handle: JoinHandle<RenderSummary>,
}

impl RenderThread {
    /// Start the render thread and wait until it is ready to accept commands.
    pub fn spawn(
        runtime: Arc<dyn VrRuntime>,
        orchestrator: Arc<ThreadOrchestrator>,
        session: Arc<SharedState>,
        latency: Arc<dyn LatencyCollector>,
        config: &ClientConfig,
    ) -> Result<(CommandQueue<RenderContext>, RenderThread)> {
        let (ready_tx, ready_rx) = bounded::<Result<CommandQueue<RenderContext>>>(1);
        let timeout = config.frame_wait_timeout;
        let poll = config.frame_poll_interval;
        let idle_frame_interval = config.idle_frame_interval;
        let version_name = config.version_name.clone();

        let handle = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || {
                let (queue, looper) = command_queue::channel::<RenderContext>();
                let init = match runtime.init() {
                    Ok(init) => init,
                    Err(e) => {
                        error!("[RenderLoop] runtime initialization failed: {}", e);
                        let _ = ready_tx.send(Err(e));
                        return RenderSummary::default();
                    }
                };
                info!("[RenderLoop] runtime initialized at {}", init.refresh_rate);

                let frame_sync = FrameSync::new(session.clone(), init.surface, latency.clone(), timeout, poll);
                let ctx = RenderContext {
                    runtime,
                    orchestrator,
                    session,
                    latency,
                    queue: queue.clone(),
                    refresh: init.refresh_rate,
                    frame_sync,
                    idle_frame_interval,
                    version_name,
                    summary: RenderSummary::default(),
                };
                if ready_tx.send(Ok(queue)).is_err() {
                    ctx.runtime.teardown();
                    return RenderSummary::default();
                }
                run(looper, ctx)
            })
            .map_err(Error::RenderSpawn)?;

        match ready_rx.recv() {
            Ok(Ok(queue)) => Ok((queue, RenderThread { handle })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::RenderInit)
            }
        }
    }

    pub fn join(self) -> std::result::Result<RenderSummary, String> {
        self.handle.join().map_err(|_| "render thread panicked".to_string())
    }
}

fn run(mut looper: CommandLoop<RenderContext>, mut ctx: RenderContext) -> RenderSummary {
    debug!("[RenderLoop] entering loop");
    while looper.wait_idle(&mut ctx) {
        if !ctx.session.is_streaming() {
            if !looper.wait_next(&mut ctx) {
                break;
            }
            continue;
        }
        ctx.render_once();
    }

    ctx.runtime.teardown();
    let summary = ctx.summary();
    info!(
        "[RenderLoop] exited: {} frames submitted, {} idle, {} discarded",
        summary.frames_submitted, summary.idle_frames, summary.discarded_frames
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionStateStore, MemoryPreferences};
    use crate::sim::{Journal, SimFactory, SimOptions, SimRuntime};
    use crate::workers::interfaces::NoopLatency;
    use std::time::Instant;

    fn spawn_with(runtime: Arc<SimRuntime>) -> (Result<(CommandQueue<RenderContext>, RenderThread)>, Arc<SharedState>) {
        let journal = Journal::new();
        let session = Arc::new(SharedState::new());
        let orchestrator = Arc::new(ThreadOrchestrator::new(
            9944,
            Arc::new(SimFactory::new(SimOptions::default(), journal)),
            ConnectionStateStore::new(Arc::new(MemoryPreferences::new())),
            session.clone(),
            Arc::new(NoopLatency),
        ));
        let config = ClientConfig {
            idle_frame_interval: Duration::from_millis(10),
            version_name: "test 1.0".to_string(),
            ..ClientConfig::default()
        };
        let spawned = RenderThread::spawn(runtime, orchestrator, session.clone(), Arc::new(NoopLatency), &config);
        (spawned, session)
    }

    #[test]
    fn idle_messages_carry_version_and_status() {
        assert_eq!(
            IdleStatus::for_connection(false).message("v1"),
            "v1\n\nPress CONNECT button on server"
        );
        assert_eq!(IdleStatus::for_connection(true).text(), "Connected! Streaming will begin soon!");
    }

    #[test]
    fn queue_is_handed_out_after_init() {
        let runtime = Arc::new(SimRuntime::new(RefreshRate::HZ_72, Journal::new()));
        let (spawned, _session) = spawn_with(runtime.clone());
        let (queue, thread) = spawned.unwrap();
        assert!(runtime.is_initialized());

        let (tx, rx) = bounded(1);
        queue.send(move |ctx| tx.send(ctx.refresh).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), RefreshRate::HZ_72);

        queue.interrupt();
        thread.join().unwrap();
        assert!(runtime.is_torn_down());
    }

    #[test]
    fn init_failure_is_reported_to_spawner() {
        let runtime = Arc::new(SimRuntime::new(RefreshRate::HZ_60, Journal::new()).with_failing_init());
        let (spawned, _session) = spawn_with(runtime);
        assert!(matches!(spawned, Err(Error::Runtime(_))));
    }

    #[test]
    fn streaming_without_connection_draws_awaiting_connect() {
        let runtime = Arc::new(SimRuntime::new(RefreshRate::HZ_60, Journal::new()));
        let (spawned, session) = spawn_with(runtime.clone());
        let (queue, thread) = spawned.unwrap();

        session.set_resumed(true);
        session.set_active_display_mode(true);
        // Wake the loop out of wait_next.
        queue.post(|_| {}).unwrap();

        let start = Instant::now();
        while runtime.idle_frames() < 3 {
            assert!(start.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(runtime.last_status().as_deref(), Some("test 1.0\n\nPress CONNECT button on server"));

        queue.interrupt();
        let summary = thread.join().unwrap();
        assert!(summary.idle_frames >= 3);
        assert_eq!(summary.frames_submitted, 0);
    }
}
