//! tracking.rs
//! Fixed-rate pose sampling loop.
//!
//! - Period = 1 / refresh rate, fixed for the session.
//! - Deadline advances by one period per iteration; sleeping targets the
//!   deadline, not "now + period", so per-iteration cost does not accumulate.
//! - Overrun: if the deadline already passed, it resets to now. Missed periods
//!   are dropped, never replayed as a burst.
//! - Cooperative stop: the flag is checked at the top of every iteration.

use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::error::{Error, Result};
use crate::session::SharedState;
use crate::workers::WorkerRole;
use crate::workers::interfaces::{LatencyCollector, Receiver, RefreshRate, VrRuntime};

/// Deadline bookkeeping for a periodic loop.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    next_deadline: Instant,
    dropped: u64,
}

impl Pacer {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self { period, next_deadline: start, dropped: 0 }
    }

    /// Advance the deadline by one period and return the sleep needed from
    /// `now`. `None` means the period was overrun: the deadline moves to `now`
    /// and the next iteration runs immediately.
    pub fn advance(&mut self, now: Instant) -> Option<Duration> {
        self.next_deadline += self.period;
        if now > self.next_deadline {
            self.next_deadline = now;
            self.dropped += 1;
            None
        } else {
            Some(self.next_deadline - now)
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn dropped_periods(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingStats {
    pub samples: u64,
    pub dropped_periods: u64,
}

/// Collaborators the sampling loop reads from and sends through.
#[derive(Clone)]
pub struct TrackingContext {
    pub session: Arc<SharedState>,
    pub runtime: Arc<dyn VrRuntime>,
    pub receiver: Arc<dyn Receiver>,
    pub latency: Arc<dyn LatencyCollector>,
}

pub struct TrackingSampler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<TrackingStats>>,
}

impl TrackingSampler {
    pub fn spawn(refresh: RefreshRate, ctx: TrackingContext) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let period = refresh.period();

        let handle = thread::Builder::new()
            .name("tracking".to_string())
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    debug!("[Tracking] running at default priority: {:?}", e);
                }
                run(period, &flag, &ctx)
            })
            .map_err(|source| Error::Spawn { role: WorkerRole::Tracking, source })?;

        info!("[Tracking] started at {}", refresh);
        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn interrupt(&self) {
        debug!("[Tracking] stop requested");
        self.stop.store(true, Ordering::Release);
    }

    /// Joins once; later calls return default stats.
    pub fn join(&mut self) -> std::result::Result<TrackingStats, String> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| "tracking thread panicked".to_string()),
            None => Ok(TrackingStats::default()),
        }
    }
}

fn run(period: Duration, stop: &AtomicBool, ctx: &TrackingContext) -> TrackingStats {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut pacer = Pacer::new(period, Instant::now());
    let mut samples = 0u64;

    while !stop.load(Ordering::Acquire) {
        if ctx.session.is_active_display_mode() && ctx.receiver.is_connected() {
            let receiver = &ctx.receiver;
            let frame_index = ctx.runtime.fetch_tracking(&mut |packet, _index| receiver.send(packet));
            ctx.latency.tracking(frame_index);
            samples += 1;
        }

        if let Some(wait) = pacer.advance(Instant::now()) {
            sleeper.sleep(wait);
        }
    }

    let stats = TrackingStats { samples, dropped_periods: pacer.dropped_periods() };
    if stats.dropped_periods > 0 {
        warn!("[Tracking] stopped; {} periods overrun", stats.dropped_periods);
    } else {
        debug!("[Tracking] stopped after {} samples", stats.samples);
    }
    stats
}
