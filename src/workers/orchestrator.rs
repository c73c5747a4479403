//! orchestrator.rs
//! Start/stop sequencing of the decoder, receiver and tracking workers.
//!
//! Start (render thread, via the command queue):
//!   force-stop previous set → load-and-clear endpoint → build receiver →
//!   build + start decoder → start receiver (fatal on failure) → start tracking.
//! Stop (pause, or the start guard):
//!   decoder → receiver → tracking, interrupt then join each, then persist the
//!   receiver's endpoint (pause only).
//!
//! At most one set exists: `lifecycle` serializes every start and stop, and a
//! set is only installed once all three workers are running. Handles are taken
//! out of `workers` before joining, so readers never wait on a join.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::error::Result;
use crate::render::frame_sync::DecodedFrameSink;
use crate::session::{ConnectionStateStore, Endpoint, SharedState};
use crate::workers::WorkerRole;
use crate::workers::interfaces::{
    Decoder, FrameSink, LatencyCollector, Receiver, ReceiverEvents, RefreshRate, VrRuntime, WorkerFactory,
};
use crate::workers::tracking::{TrackingContext, TrackingSampler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to stop: never created, never started, or already stopped.
    NotRunning,
    Stopped,
    /// Interrupted but the join failed; teardown continued regardless.
    JoinFailed(String),
}

/// Result of a start that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// All three workers are running and installed.
    Running,
    /// The session was paused while starting; the new set was stopped again.
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// One entry per role, in the order they were stopped.
    pub outcomes: Vec<(WorkerRole, StopOutcome)>,
    /// Endpoint reported by the receiver after it stopped, if one existed.
    pub endpoint: Option<Endpoint>,
}

impl StopReport {
    pub fn outcome(&self, role: WorkerRole) -> Option<&StopOutcome> {
        self.outcomes.iter().find(|(r, _)| *r == role).map(|(_, o)| o)
    }

    pub fn stopped_any(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| *o != StopOutcome::NotRunning)
    }

    pub fn join_failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, StopOutcome::JoinFailed(_))).count()
    }
}

struct ReceiverSlot {
    handle: Arc<dyn Receiver>,
    started: bool,
}

/// One generation of workers. `cancel` releases receiver callbacks blocked on
/// the render thread before the receiver is joined.
#[derive(Default)]
struct WorkerSet {
    receiver: Option<ReceiverSlot>,
    decoder: Option<Arc<dyn Decoder>>,
    tracking: Option<TrackingSampler>,
    cancel: Arc<AtomicBool>,
}

impl WorkerSet {
    fn is_empty(&self) -> bool {
        self.receiver.is_none() && self.decoder.is_none() && self.tracking.is_none()
    }
}

pub struct ThreadOrchestrator {
    port: u16,
    factory: Arc<dyn WorkerFactory>,
    store: ConnectionStateStore,
    session: Arc<SharedState>,
    latency: Arc<dyn LatencyCollector>,
    lifecycle: Mutex<()>,
    workers: Mutex<WorkerSet>,
}

impl ThreadOrchestrator {
    pub fn new(
        port: u16,
        factory: Arc<dyn WorkerFactory>,
        store: ConnectionStateStore,
        session: Arc<SharedState>,
        latency: Arc<dyn LatencyCollector>,
    ) -> Self {
        Self {
            port,
            factory,
            store,
            session,
            latency,
            lifecycle: Mutex::new(()),
            workers: Mutex::new(WorkerSet::default()),
        }
    }

    /// Started receiver, if any.
    pub fn receiver(&self) -> Option<Arc<dyn Receiver>> {
        self.workers
            .lock()
            .receiver
            .as_ref()
            .filter(|slot| slot.started)
            .map(|slot| slot.handle.clone())
    }

    pub fn decoder(&self) -> Option<Arc<dyn Decoder>> {
        self.workers.lock().decoder.clone()
    }

    pub fn is_running(&self, role: WorkerRole) -> bool {
        let workers = self.workers.lock();
        match role {
            WorkerRole::Decoder => workers.decoder.is_some(),
            WorkerRole::Receiver => workers.receiver.as_ref().is_some_and(|slot| slot.started),
            WorkerRole::Tracking => workers.tracking.is_some(),
        }
    }

    /// Idempotent: interrupt and join whatever is running, decoder → receiver → tracking.
    pub fn stop_all_workers(&self) -> StopReport {
        let _lifecycle = self.lifecycle.lock();
        self.stop_current()
    }

    /// Pause path: stop everything, then persist the endpoint (empty if none).
    pub fn stop_and_persist(&self) -> StopReport {
        let report = self.stop_all_workers();
        self.persist_endpoint(report.endpoint.clone());
        report
    }

    /// Resume path, run on the render thread.
    ///
    /// `make_events` builds the receiver callbacks for this generation from its
    /// cancel flag. On `Err` or `Retired` no worker is left running; a
    /// constructed receiver stays registered so the next pause can persist its
    /// endpoint.
    pub fn start_workers<F>(
        &self,
        runtime: Arc<dyn VrRuntime>,
        refresh: RefreshRate,
        make_events: F,
    ) -> Result<StartOutcome>
    where
        F: FnOnce(Arc<AtomicBool>) -> Arc<dyn ReceiverEvents>,
    {
        let _lifecycle = self.lifecycle.lock();

        let previous = self.stop_current();
        if previous.stopped_any() {
            info!("[Orchestrator] force-stopped previous workers: {:?}", previous.outcomes);
        }

        info!("[Orchestrator] starting worker threads");
        let cancel = Arc::new(AtomicBool::new(false));
        let receiver = self.factory.create_receiver(make_events(cancel.clone()));

        let endpoint = self.store.load_and_clear().unwrap_or_else(|e| {
            warn!("[Orchestrator] could not load connection state: {}", e);
            Endpoint::empty()
        });
        receiver.recover_endpoint(&endpoint);

        let sink: Arc<dyn FrameSink> = Arc::new(DecodedFrameSink::new(self.session.clone(), self.latency.clone()));
        let decoder = self.factory.create_decoder(receiver.clone(), sink);

        let mut set = WorkerSet {
            receiver: Some(ReceiverSlot { handle: receiver.clone(), started: false }),
            decoder: None,
            tracking: None,
            cancel,
        };

        if let Err(e) = decoder.start() {
            error!("[Orchestrator] FATAL: decoder initialization failed: {}", e);
            *self.workers.lock() = set;
            return Err(e);
        }
        set.decoder = Some(decoder);

        if let Err(e) = receiver.start(self.port, refresh) {
            error!("[Orchestrator] FATAL: receiver initialization failed: {}", e);
            if let Some(decoder) = set.decoder.take() {
                let outcome = stop_worker(WorkerRole::Decoder, || decoder.interrupt(), || decoder.join());
                debug!("[Orchestrator] rolled back decoder: {:?}", outcome);
            }
            *self.workers.lock() = set;
            return Err(e);
        }
        if let Some(slot) = set.receiver.as_mut() {
            slot.started = true;
        }

        let tracking_ctx = TrackingContext {
            session: self.session.clone(),
            runtime,
            receiver,
            latency: self.latency.clone(),
        };
        match TrackingSampler::spawn(refresh, tracking_ctx) {
            Ok(tracking) => set.tracking = Some(tracking),
            Err(e) => {
                error!("[Orchestrator] FATAL: tracking thread failed to start: {}", e);
                self.retire(set);
                return Err(e);
            }
        }

        if !self.session.is_resumed() {
            // Paused while this start was running; the pause may already
            // have found nothing to stop.
            warn!("[Orchestrator] session paused during start; stopping new workers");
            self.retire(set);
            return Ok(StartOutcome::Retired);
        }

        *self.workers.lock() = set;
        info!("[Orchestrator] worker threads started");
        Ok(StartOutcome::Running)
    }

    fn stop_current(&self) -> StopReport {
        let set = std::mem::take(&mut *self.workers.lock());
        if set.is_empty() {
            return StopReport {
                outcomes: vec![
                    (WorkerRole::Decoder, StopOutcome::NotRunning),
                    (WorkerRole::Receiver, StopOutcome::NotRunning),
                    (WorkerRole::Tracking, StopOutcome::NotRunning),
                ],
                endpoint: None,
            };
        }
        info!("[Orchestrator] stopping worker threads");
        let report = stop_set(set);
        info!("[Orchestrator] all worker threads stopped");
        report
    }

    /// Stop a set that was never installed and persist its endpoint. The
    /// stopped receiver stays registered so a later pause persists the same
    /// endpoint instead of the empty sentinel.
    fn retire(&self, set: WorkerSet) {
        let receiver = set.receiver.as_ref().map(|slot| slot.handle.clone());
        let report = stop_set(set);
        self.persist_endpoint(report.endpoint);
        *self.workers.lock() = WorkerSet {
            receiver: receiver.map(|handle| ReceiverSlot { handle, started: false }),
            ..WorkerSet::default()
        };
    }

    fn persist_endpoint(&self, endpoint: Option<Endpoint>) {
        let endpoint = endpoint.unwrap_or_default();
        if let Err(e) = self.store.save(&endpoint) {
            warn!("[Orchestrator] could not save connection state {}: {}", endpoint, e);
        }
    }
}

/// Interrupt + join in order decoder → receiver → tracking.
fn stop_set(set: WorkerSet) -> StopReport {
    set.cancel.store(true, Ordering::Release);
    let mut outcomes = Vec::with_capacity(3);

    let decoder = match set.decoder {
        Some(decoder) => stop_worker(WorkerRole::Decoder, || decoder.interrupt(), || decoder.join()),
        None => StopOutcome::NotRunning,
    };
    outcomes.push((WorkerRole::Decoder, decoder));

    let mut endpoint = None;
    let receiver = match set.receiver {
        Some(slot) => {
            let outcome = if slot.started {
                stop_worker(WorkerRole::Receiver, || slot.handle.interrupt(), || slot.handle.join())
            } else {
                StopOutcome::NotRunning
            };
            endpoint = Some(slot.handle.current_endpoint());
            outcome
        }
        None => StopOutcome::NotRunning,
    };
    outcomes.push((WorkerRole::Receiver, receiver));

    let tracking = match set.tracking {
        Some(mut tracking) => {
            tracking.interrupt();
            match tracking.join() {
                Ok(stats) => {
                    debug!("[Orchestrator] tracking stopped: {:?}", stats);
                    StopOutcome::Stopped
                }
                Err(reason) => {
                    warn!("[Orchestrator] tracking join failed: {}", reason);
                    StopOutcome::JoinFailed(reason)
                }
            }
        }
        None => StopOutcome::NotRunning,
    };
    outcomes.push((WorkerRole::Tracking, tracking));

    StopReport { outcomes, endpoint }
}

fn stop_worker(
    role: WorkerRole,
    interrupt: impl FnOnce(),
    join: impl FnOnce() -> std::result::Result<(), String>,
) -> StopOutcome {
    interrupt();
    match join() {
        Ok(()) => StopOutcome::Stopped,
        Err(reason) => {
            warn!("[Orchestrator] {} join failed: {}", role, reason);
            StopOutcome::JoinFailed(reason)
        }
    }
}
