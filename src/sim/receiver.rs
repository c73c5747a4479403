//! Simulated network receiver.
//!
//! - Connects `connect_delay` after start and reports the frame geometry.
//! - Every tracking packet it is sent carries a frame index; the "server"
//!   answers with that frame after a random delay.
//! - Frames go to the paired decoder; a full decoder queue drops the frame.

use crossbeam::channel::{self, Receiver as ChannelReceiver, RecvTimeoutError, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use rand::random_range;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use super::{Journal, SimLive, SimOptions};
use crate::error::{Error, Result};
use crate::session::Endpoint;
use crate::workers::interfaces::{Receiver, ReceiverEvents, RefreshRate, Worker};

const POLL: Duration = Duration::from_millis(5);

struct Shared {
    stop: AtomicBool,
    connected: AtomicBool,
    endpoint: Mutex<Endpoint>,
    packets_sent: AtomicU64,
}

struct ThreadInputs {
    events: Arc<dyn ReceiverEvents>,
    tracking_rx: ChannelReceiver<u64>,
    frames_tx: Sender<u64>,
}

pub struct SimReceiver {
    options: SimOptions,
    shared: Arc<Shared>,
    tracking_tx: Sender<u64>,
    inputs: Mutex<Option<ThreadInputs>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    journal: Journal,
    live: Arc<SimLive>,
}

impl SimReceiver {
    pub(super) fn new(
        options: SimOptions,
        events: Arc<dyn ReceiverEvents>,
        frames_tx: Sender<u64>,
        journal: Journal,
        live: Arc<SimLive>,
    ) -> Self {
        let (tracking_tx, tracking_rx) = channel::bounded(8);
        Self {
            options,
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                endpoint: Mutex::new(Endpoint::empty()),
                packets_sent: AtomicU64::new(0),
            }),
            tracking_tx,
            inputs: Mutex::new(Some(ThreadInputs { events, tracking_rx, frames_tx })),
            handle: Mutex::new(None),
            journal,
            live,
        }
    }

    pub fn packets_sent(&self) -> u64 {
        self.shared.packets_sent.load(Ordering::Relaxed)
    }
}

impl Worker for SimReceiver {
    fn interrupt(&self) {
        self.journal.record("receiver.interrupt");
        self.shared.stop.store(true, Ordering::Release);
    }

    fn join(&self) -> std::result::Result<(), String> {
        self.journal.record("receiver.join");
        match self.handle.lock().take() {
            Some(handle) => handle.join().map_err(|_| "receiver thread panicked".to_string()),
            None => Ok(()),
        }
    }
}

impl Receiver for SimReceiver {
    fn start(&self, port: u16, refresh: RefreshRate) -> Result<()> {
        if self.options.fail_receiver_start {
            self.journal.record("receiver.start.failed");
            return Err(Error::receiver_start(format!("could not bind port {}", port)));
        }
        let inputs = self
            .inputs
            .lock()
            .take()
            .ok_or_else(|| Error::receiver_start("receiver already started"))?;
        self.journal.record("receiver.start");

        let shared = self.shared.clone();
        let options = self.options.clone();
        let live = self.live.clone();
        let handle = thread::Builder::new()
            .name("sim-receiver".to_string())
            .spawn(move || {
                let _live = live.enter_receiver();
                run(&shared, &options, inputs);
            })
            .map_err(|e| Error::receiver_start(e.to_string()))?;
        *self.handle.lock() = Some(handle);
        info!("[SimReceiver] listening on port {} at {}", port, refresh);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn send(&self, packet: &[u8]) {
        self.shared.packets_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = packet.get(..8).and_then(|b| <[u8; 8]>::try_from(b).ok()) {
            let _ = self.tracking_tx.try_send(u64::from_le_bytes(bytes));
        }
    }

    fn recover_endpoint(&self, endpoint: &Endpoint) {
        self.journal.record(format!("receiver.recover {}", endpoint));
        *self.shared.endpoint.lock() = endpoint.clone();
    }

    fn current_endpoint(&self) -> Endpoint {
        self.shared.endpoint.lock().clone()
    }
}

fn run(shared: &Shared, options: &SimOptions, inputs: ThreadInputs) {
    let connect_at = Instant::now() + options.connect_delay;
    while Instant::now() < connect_at {
        if shared.stop.load(Ordering::Acquire) {
            return;
        }
        thread::sleep(POLL);
    }

    *shared.endpoint.lock() = options.server.clone();
    shared.connected.store(true, Ordering::Release);
    debug!("[SimReceiver] connected to {}", options.server);
    let (width, height) = options.geometry;
    inputs.events.on_connected(width, height);
    if let Some(settings) = options.server_settings {
        inputs.events.on_settings_changed(settings);
    }

    let jitter_us = options.frame_jitter.as_micros() as u64;
    while !shared.stop.load(Ordering::Acquire) {
        match inputs.tracking_rx.recv_timeout(POLL) {
            Ok(frame_index) => {
                if jitter_us > 0 {
                    thread::sleep(Duration::from_micros(random_range(0..=jitter_us)));
                }
                let _ = inputs.frames_tx.try_send(frame_index);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    shared.connected.store(false, Ordering::Release);
    debug!("[SimReceiver] disconnected");
}
