//! Simulated hardware decoder. Holds each decoded buffer until the sink
//! accepts it; frames arriving meanwhile queue up behind it.

use crossbeam::channel::{Receiver as ChannelReceiver, RecvTimeoutError};
use log::debug;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use super::{Journal, SimLive};
use crate::error::{Error, Result};
use crate::workers::interfaces::{Decoder, FrameSink, Worker};

const POLL: Duration = Duration::from_millis(5);
const HOLD_RETRY: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    output_available: AtomicBool,
    decoded: AtomicU64,
    released: AtomicU64,
}

pub struct SimDecoder {
    fail_start: bool,
    shared: Arc<Shared>,
    inputs: Mutex<Option<(ChannelReceiver<u64>, Arc<dyn FrameSink>)>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    journal: Journal,
    live: Arc<SimLive>,
}

impl SimDecoder {
    pub(super) fn new(
        fail_start: bool,
        frames_rx: ChannelReceiver<u64>,
        sink: Arc<dyn FrameSink>,
        journal: Journal,
        live: Arc<SimLive>,
    ) -> Self {
        Self {
            fail_start,
            shared: Arc::new(Shared::default()),
            inputs: Mutex::new(Some((frames_rx, sink))),
            handle: Mutex::new(None),
            journal,
            live,
        }
    }

    pub fn released_frames(&self) -> u64 {
        self.shared.released.load(Ordering::Relaxed)
    }
}

impl Worker for SimDecoder {
    fn interrupt(&self) {
        self.journal.record("decoder.interrupt");
        self.shared.stop.store(true, Ordering::Release);
    }

    fn join(&self) -> std::result::Result<(), String> {
        self.journal.record("decoder.join");
        match self.handle.lock().take() {
            Some(handle) => handle.join().map_err(|_| "decoder thread panicked".to_string()),
            None => Ok(()),
        }
    }
}

impl Decoder for SimDecoder {
    fn start(&self) -> Result<()> {
        if self.fail_start {
            self.journal.record("decoder.start.failed");
            return Err(Error::decoder_start("no hardware codec available"));
        }
        let (frames_rx, sink) = self
            .inputs
            .lock()
            .take()
            .ok_or_else(|| Error::decoder_start("decoder already started"))?;
        self.journal.record("decoder.start");

        let shared = self.shared.clone();
        let live = self.live.clone();
        let handle = thread::Builder::new()
            .name("sim-decoder".to_string())
            .spawn(move || {
                let _live = live.enter_decoder();
                run(&shared, &frames_rx, sink.as_ref());
            })
            .map_err(|e| Error::decoder_start(e.to_string()))?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn is_output_available(&self) -> bool {
        self.shared.output_available.load(Ordering::Acquire)
    }

    fn notify_geometry_change(&self) {
        self.journal.record("decoder.geometry");
    }
}

fn run(shared: &Shared, frames_rx: &ChannelReceiver<u64>, sink: &dyn FrameSink) {
    let mut held: Option<u64> = None;
    while !shared.stop.load(Ordering::Acquire) {
        let Some(frame_index) = held else {
            match frames_rx.recv_timeout(POLL) {
                Ok(frame_index) => {
                    held = Some(frame_index);
                    shared.decoded.fetch_add(1, Ordering::Relaxed);
                    shared.output_available.store(true, Ordering::Release);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL),
            }
            continue;
        };

        if sink.on_frame_decoded(frame_index) {
            held = None;
            shared.released.fetch_add(1, Ordering::Relaxed);
        } else {
            thread::sleep(HOLD_RETRY);
        }
    }
    debug!(
        "[SimDecoder] stopped: {} decoded, {} released",
        shared.decoded.load(Ordering::Relaxed),
        shared.released.load(Ordering::Relaxed)
    );
}
