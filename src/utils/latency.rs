//! Per-frame latency recording.
//!
//! - **Events:** lock-free queue (16K capacity) of stage timestamps, drained by
//!   the CSV exporter. Full queue drops the event and counts it.
//! - **Motion-to-photon:** tracking timestamp per frame index, kept until that
//!   frame is submitted; the difference feeds a running mean.

use average::{Estimate, Mean};
use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use crate::workers::interfaces::LatencyCollector;

const EVENT_QUEUE_CAPACITY: usize = 16_384;
/// Upper bound on unsubmitted tracking samples. Pruning keeps the newest half.
const IN_FLIGHT_WINDOW: u64 = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyStage {
    Tracking,
    Decoded,
    Rendered,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyEvent {
    pub frame_index: u64,
    pub stage: LatencyStage,
    /// Nanoseconds since the recorder was created.
    pub ts_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub events_recorded: u64,
    pub events_dropped: u64,
    pub motion_to_photon_samples: u64,
    pub motion_to_photon_mean_us: f64,
}

#[derive(Clone)]
pub struct LatencyRecorder {
    queue: Arc<ArrayQueue<LatencyEvent>>,
    in_flight: Arc<DashMap<u64, u64>>,
    last_tracked: Arc<AtomicU64>,
    motion_to_photon: Arc<Mutex<Mean>>,
    recorded: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    run_start: Instant,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY)),
            in_flight: Arc::new(DashMap::new()),
            last_tracked: Arc::new(AtomicU64::new(0)),
            motion_to_photon: Arc::new(Mutex::new(Mean::new())),
            recorded: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            run_start: Instant::now(),
        }
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn pop(&self) -> Option<LatencyEvent> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn summary(&self) -> LatencySummary {
        let mtp = self.motion_to_photon.lock();
        LatencySummary {
            events_recorded: self.recorded.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            motion_to_photon_samples: mtp.len(),
            motion_to_photon_mean_us: if mtp.len() == 0 { 0.0 } else { mtp.mean() },
        }
    }

    fn record(&self, frame_index: u64, stage: LatencyStage) -> u64 {
        let ts_ns = self.now_ns();
        if self.queue.push(LatencyEvent { frame_index, stage, ts_ns }).is_ok() {
            self.recorded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        ts_ns
    }
}

impl LatencyCollector for LatencyRecorder {
    fn tracking(&self, frame_index: u64) {
        let ts_ns = self.record(frame_index, LatencyStage::Tracking);
        // Indices restart lower with a new runtime session.
        if frame_index < self.last_tracked.swap(frame_index, Ordering::Relaxed) {
            self.in_flight.clear();
        }
        self.in_flight.insert(frame_index, ts_ns);
        if self.in_flight.len() as u64 > IN_FLIGHT_WINDOW {
            let oldest = frame_index.saturating_sub(IN_FLIGHT_WINDOW / 2);
            self.in_flight.retain(|index, _| *index > oldest);
        }
    }

    fn decoded(&self, frame_index: u64) {
        self.record(frame_index, LatencyStage::Decoded);
    }

    fn rendered(&self, frame_index: u64) {
        self.record(frame_index, LatencyStage::Rendered);
    }

    fn submitted(&self, frame_index: u64) {
        let ts_ns = self.record(frame_index, LatencyStage::Submitted);
        if let Some((_, tracked_ns)) = self.in_flight.remove(&frame_index) {
            let us = ts_ns.saturating_sub(tracked_ns) as f64 / 1_000.0;
            self.motion_to_photon.lock().add(us);
        }
    }
}
