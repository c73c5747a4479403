//! frame_sync.rs
//! Bounded-wait handshake between the render loop and the decoder.
//!
//! Render side (`FrameSync`, render thread only):
//! 1. Discard a ready frame the previous iteration left behind (latch, no present).
//! 2. Request the next frame.
//! 3. Wait for: frame ready → consume; pause → `Cancelled`; timeout → `Idle`.
//!
//! Decoder side (`DecodedFrameSink`): publishes a completed buffer only while a
//! render is requested, otherwise tells the decoder to hold it.

use log::{debug, trace};
use std::{sync::Arc, time::Duration};

use crate::session::SharedState;
use crate::workers::interfaces::{DisplaySurface, FrameProvider, FrameSink, LatencyCollector, WaitOutcome};

pub struct FrameSync {
    state: Arc<SharedState>,
    surface: Box<dyn DisplaySurface>,
    latency: Arc<dyn LatencyCollector>,
    timeout: Duration,
    poll: Duration,
    presented: Option<u64>,
    discarded: u64,
}

impl FrameSync {
    pub fn new(
        state: Arc<SharedState>,
        surface: Box<dyn DisplaySurface>,
        latency: Arc<dyn LatencyCollector>,
        timeout: Duration,
        poll: Duration,
    ) -> Self {
        Self {
            state,
            surface,
            latency,
            timeout,
            poll,
            presented: None,
            discarded: 0,
        }
    }

    /// Index of the frame consumed by the last `wait_frame`, if any.
    pub fn take_presented(&mut self) -> Option<u64> {
        self.presented.take()
    }

    /// Ready frames dropped because rendering fell behind.
    pub fn discarded_frames(&self) -> u64 {
        self.discarded
    }
}

impl FrameProvider for FrameSync {
    fn wait_frame(&mut self) -> WaitOutcome {
        self.presented = None;

        if let Some(stale) = self.state.begin_request() {
            debug!("[FrameSync] discarding unconsumed frame {}", stale);
            self.surface.latch_image();
            self.discarded += 1;
        }

        let outcome = self.state.wait_ready(self.timeout, self.poll);
        match outcome {
            WaitOutcome::Frame(index) => {
                self.surface.latch_image();
                self.latency.rendered(index);
                self.presented = Some(index);
            }
            WaitOutcome::Cancelled => trace!("[FrameSync] wait cancelled by pause"),
            WaitOutcome::Idle => debug!("[FrameSync] no frame within {:?}", self.timeout),
        }
        outcome
    }
}

/// Decoder completion callback bound to the shared frame slot.
pub struct DecodedFrameSink {
    state: Arc<SharedState>,
    latency: Arc<dyn LatencyCollector>,
}

impl DecodedFrameSink {
    pub fn new(state: Arc<SharedState>, latency: Arc<dyn LatencyCollector>) -> Self {
        Self { state, latency }
    }
}

impl FrameSink for DecodedFrameSink {
    fn on_frame_decoded(&self, frame_index: u64) -> bool {
        let release = self.state.offer_frame(frame_index);
        if release {
            self.latency.decoded(frame_index);
        }
        release
    }
}
