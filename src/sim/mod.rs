//! Simulated collaborators.
//!
//! Stand-ins for the network receiver, hardware decoder and VR runtime, used by
//! the demo binary and the tests. Frame indices flow the same way they do
//! against a real server:
//! tracking packet → receiver → (server "renders") → decoder → FrameSink.
//!
//! Lifecycle calls are recorded in a shared [`Journal`]; live thread counts are
//! tracked in [`SimLive`] so tests can check that at most one receiver and one
//! decoder ever run at once.

pub mod decoder;
pub mod receiver;
pub mod runtime;

pub use decoder::SimDecoder;
pub use receiver::SimReceiver;
pub use runtime::{SimRuntime, SimSurface};

use crossbeam::channel::{self, Receiver as ChannelReceiver};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::session::Endpoint;
use crate::workers::interfaces::{
    Decoder, FrameSink, Receiver, ReceiverEvents, SettingsChange, WorkerFactory,
};

/// Ordered log of lifecycle calls, shared by every simulated collaborator.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub fail_receiver_start: bool,
    pub fail_decoder_start: bool,
    /// Time from receiver start until the simulated server connects.
    pub connect_delay: Duration,
    /// Upper bound of the random server-side delay per frame.
    pub frame_jitter: Duration,
    pub geometry: (u32, u32),
    /// Endpoint the receiver reports once connected.
    pub server: Endpoint,
    /// Pushed to the client right after connecting.
    pub server_settings: Option<SettingsChange>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            fail_receiver_start: false,
            fail_decoder_start: false,
            connect_delay: Duration::from_millis(50),
            frame_jitter: Duration::from_millis(2),
            geometry: (2048, 1024),
            server: Endpoint::new("192.168.1.20", 9944),
            server_settings: None,
        }
    }
}

/// Live and peak thread counts per simulated worker kind.
#[derive(Debug, Default)]
pub struct SimLive {
    receivers: AtomicUsize,
    decoders: AtomicUsize,
    peak_receivers: AtomicUsize,
    peak_decoders: AtomicUsize,
}

impl SimLive {
    pub fn receivers(&self) -> usize {
        self.receivers.load(Ordering::SeqCst)
    }

    pub fn decoders(&self) -> usize {
        self.decoders.load(Ordering::SeqCst)
    }

    pub fn peak_receivers(&self) -> usize {
        self.peak_receivers.load(Ordering::SeqCst)
    }

    pub fn peak_decoders(&self) -> usize {
        self.peak_decoders.load(Ordering::SeqCst)
    }

    fn enter_receiver(self: &Arc<Self>) -> LiveGuard {
        let now = self.receivers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_receivers.fetch_max(now, Ordering::SeqCst);
        LiveGuard { live: self.clone(), receiver: true }
    }

    fn enter_decoder(self: &Arc<Self>) -> LiveGuard {
        let now = self.decoders.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_decoders.fetch_max(now, Ordering::SeqCst);
        LiveGuard { live: self.clone(), receiver: false }
    }
}

/// Held by a worker thread for its lifetime.
struct LiveGuard {
    live: Arc<SimLive>,
    receiver: bool,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let counter = if self.receiver { &self.live.receivers } else { &self.live.decoders };
        counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Builds linked receiver/decoder pairs: frames produced by a receiver are
/// decoded by the decoder created right after it.
pub struct SimFactory {
    options: SimOptions,
    journal: Journal,
    live: Arc<SimLive>,
    pending_frames: Mutex<Option<ChannelReceiver<u64>>>,
}

impl SimFactory {
    pub fn new(options: SimOptions, journal: Journal) -> Self {
        Self {
            options,
            journal,
            live: Arc::new(SimLive::default()),
            pending_frames: Mutex::new(None),
        }
    }

    pub fn live(&self) -> Arc<SimLive> {
        self.live.clone()
    }
}

impl WorkerFactory for SimFactory {
    fn create_receiver(&self, events: Arc<dyn ReceiverEvents>) -> Arc<dyn Receiver> {
        let (frames_tx, frames_rx) = channel::bounded(4);
        *self.pending_frames.lock() = Some(frames_rx);
        Arc::new(SimReceiver::new(
            self.options.clone(),
            events,
            frames_tx,
            self.journal.clone(),
            self.live.clone(),
        ))
    }

    fn create_decoder(&self, _receiver: Arc<dyn Receiver>, sink: Arc<dyn FrameSink>) -> Arc<dyn Decoder> {
        // A decoder without a paired receiver never sees a frame.
        let frames_rx = self.pending_frames.lock().take().unwrap_or_else(|| channel::never());
        Arc::new(SimDecoder::new(
            self.options.fail_decoder_start,
            frames_rx,
            sink,
            self.journal.clone(),
            self.live.clone(),
        ))
    }
}

/// Receiver callbacks that go nowhere.
pub struct NullEvents;

impl ReceiverEvents for NullEvents {
    fn on_connected(&self, _width: u32, _height: u32) {}
    fn on_settings_changed(&self, _settings: SettingsChange) {}
}
