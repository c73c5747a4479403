//! Simulated VR runtime: counts what it is asked to draw and encodes tracking
//! samples as their frame index (little-endian u64).

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use super::Journal;
use crate::error::{Error, Result};
use crate::workers::interfaces::{
    DisplayInit, DisplaySurface, FrameProvider, KeyEvent, NativeSurface, RefreshRate, SettingsChange, VrRuntime,
    WaitOutcome,
};

/// Counts latches; the image itself is never inspected.
pub struct SimSurface(Arc<AtomicU64>);

impl DisplaySurface for SimSurface {
    fn latch_image(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Counters {
    rendered: AtomicU64,
    wait_timeouts: AtomicU64,
    wait_cancels: AtomicU64,
    idle_frames: AtomicU64,
    latches: Arc<AtomicU64>,
    next_tracking: AtomicU64,
}

pub struct SimRuntime {
    refresh: RefreshRate,
    journal: Journal,
    fail_init: bool,
    initialized: AtomicBool,
    torn_down: AtomicBool,
    display_active: AtomicBool,
    counters: Counters,
    last_status: Mutex<Option<String>>,
    geometry: Mutex<Option<(u32, u32)>>,
    settings: Mutex<Option<SettingsChange>>,
    keys: Mutex<Vec<KeyEvent>>,
}

impl SimRuntime {
    pub fn new(refresh: RefreshRate, journal: Journal) -> Self {
        Self {
            refresh,
            journal,
            fail_init: false,
            initialized: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            display_active: AtomicBool::new(false),
            counters: Counters::default(),
            last_status: Mutex::new(None),
            geometry: Mutex::new(None),
            settings: Mutex::new(None),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn rendered_frames(&self) -> u64 {
        self.counters.rendered.load(Ordering::SeqCst)
    }

    pub fn idle_frames(&self) -> u64 {
        self.counters.idle_frames.load(Ordering::SeqCst)
    }

    pub fn wait_timeouts(&self) -> u64 {
        self.counters.wait_timeouts.load(Ordering::SeqCst)
    }

    pub fn wait_cancels(&self) -> u64 {
        self.counters.wait_cancels.load(Ordering::SeqCst)
    }

    pub fn latches(&self) -> u64 {
        self.counters.latches.load(Ordering::SeqCst)
    }

    pub fn tracking_samples(&self) -> u64 {
        self.counters.next_tracking.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> Option<String> {
        self.last_status.lock().clone()
    }

    pub fn geometry(&self) -> Option<(u32, u32)> {
        *self.geometry.lock()
    }

    pub fn settings(&self) -> Option<SettingsChange> {
        *self.settings.lock()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.keys.lock().clone()
    }
}

impl VrRuntime for SimRuntime {
    fn init(&self) -> Result<DisplayInit> {
        if self.fail_init {
            return Err(Error::Runtime("display initialization failed".to_string()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        self.journal.record("runtime.init");
        Ok(DisplayInit {
            refresh_rate: self.refresh,
            surface: Box::new(SimSurface(self.counters.latches.clone())),
        })
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.journal.record("runtime.teardown");
    }

    fn on_surface_created(&self, surface: NativeSurface) {
        self.journal.record(format!("runtime.surface_created {}", surface.0));
    }

    fn on_surface_changed(&self, surface: NativeSurface) {
        self.journal.record(format!("runtime.surface_changed {}", surface.0));
    }

    fn on_surface_destroyed(&self) {
        self.journal.record("runtime.surface_destroyed");
    }

    fn on_resume(&self) {
        self.display_active.store(true, Ordering::SeqCst);
        self.journal.record("runtime.resume");
    }

    fn on_pause(&self) {
        self.display_active.store(false, Ordering::SeqCst);
        self.journal.record("runtime.pause");
    }

    fn on_key_event(&self, event: KeyEvent) {
        self.keys.lock().push(event);
    }

    fn on_settings_changed(&self, settings: SettingsChange) {
        *self.settings.lock() = Some(settings);
        self.journal.record("runtime.settings");
    }

    fn is_active_display_mode(&self) -> bool {
        self.display_active.load(Ordering::SeqCst)
    }

    fn set_frame_geometry(&self, width: u32, height: u32) {
        *self.geometry.lock() = Some((width, height));
        self.journal.record(format!("runtime.geometry {}x{}", width, height));
    }

    fn render(&self, frames: &mut dyn FrameProvider) {
        let counter = match frames.wait_frame() {
            WaitOutcome::Frame(_) => &self.counters.rendered,
            WaitOutcome::Idle => &self.counters.wait_timeouts,
            WaitOutcome::Cancelled => &self.counters.wait_cancels,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn render_idle(&self, status: &str) {
        self.counters.idle_frames.fetch_add(1, Ordering::SeqCst);
        *self.last_status.lock() = Some(status.to_string());
    }

    fn fetch_tracking(&self, send: &mut dyn FnMut(&[u8], u64)) -> u64 {
        let frame_index = self.counters.next_tracking.fetch_add(1, Ordering::SeqCst) + 1;
        send(&frame_index.to_le_bytes(), frame_index);
        frame_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FrameSync;
    use crate::session::SharedState;
    use crate::workers::interfaces::NoopLatency;
    use std::{thread, time::Duration};

    #[test]
    fn render_counts_each_wait_outcome() {
        let runtime = SimRuntime::new(RefreshRate::HZ_60, Journal::new());
        let display = runtime.init().unwrap();
        let state = Arc::new(SharedState::new());
        state.set_resumed(true);
        let mut sync = FrameSync::new(
            state.clone(),
            display.surface,
            Arc::new(NoopLatency),
            Duration::from_millis(100),
            Duration::from_millis(10),
        );

        let decoder = {
            let state = state.clone();
            thread::spawn(move || {
                while !state.offer_frame(5) {
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };
        runtime.render(&mut sync);
        decoder.join().unwrap();
        assert_eq!(runtime.rendered_frames(), 1);
        assert_eq!(runtime.latches(), 1);

        state.reset_slot();
        runtime.render(&mut sync);
        assert_eq!(runtime.wait_timeouts(), 1);

        state.reset_slot();
        state.set_resumed(false);
        runtime.render(&mut sync);
        assert_eq!(runtime.wait_cancels(), 1);
        assert_eq!(runtime.latches(), 1);
    }
}
