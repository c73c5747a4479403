//! End-to-end resume/pause lifecycle against the simulated collaborators.

use hmd_stream::{
    ClientConfig, Error, Result, StreamClient,
    session::{ConnectionStateStore, Endpoint, MemoryPreferences, Preferences},
    sim::{Journal, SimFactory, SimLive, SimOptions, SimRuntime},
    utils::LatencyRecorder,
    workers::{
        WorkerRole,
        interfaces::{
            DisplayInit, FrameProvider, KeyAction, KeyEvent, NativeSurface, NoopLatency, RefreshRate,
            SettingsChange, VrRuntime,
        },
    },
};
use proptest::prelude::*;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

struct Harness {
    client: StreamClient,
    runtime: Arc<SimRuntime>,
    journal: Journal,
    live: Arc<SimLive>,
    prefs: Arc<MemoryPreferences>,
    latency: LatencyRecorder,
}

impl Harness {
    fn store(&self) -> ConnectionStateStore {
        ConnectionStateStore::new(self.prefs.clone())
    }
}

fn harness(options: SimOptions, seed: Option<Endpoint>) -> Harness {
    let journal = Journal::new();
    let runtime = Arc::new(SimRuntime::new(RefreshRate::HZ_60, journal.clone()));
    let factory = Arc::new(SimFactory::new(options, journal.clone()));
    let live = factory.live();
    let prefs = Arc::new(MemoryPreferences::new());
    if let Some(endpoint) = seed {
        ConnectionStateStore::new(prefs.clone()).save(&endpoint).unwrap();
    }
    let latency = LatencyRecorder::new();
    let config = ClientConfig {
        frame_wait_timeout: Duration::from_millis(200),
        frame_poll_interval: Duration::from_millis(20),
        idle_frame_interval: Duration::from_millis(10),
        version_name: "test".to_string(),
        ..ClientConfig::default()
    };
    let client = StreamClient::spawn(
        &config,
        runtime.clone(),
        factory,
        prefs.clone() as Arc<dyn Preferences>,
        Arc::new(latency.clone()),
    )
    .unwrap();
    Harness { client, runtime, journal, live, prefs, latency }
}

fn fast() -> SimOptions {
    SimOptions { connect_delay: Duration::from_millis(20), ..SimOptions::default() }
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn resume_streams_decoded_frames() {
    let h = harness(fast(), None);
    h.client.on_resume().unwrap();

    assert!(wait_until(Duration::from_secs(5), || h.runtime.rendered_frames() >= 5));
    assert_eq!(h.runtime.geometry(), Some((2048, 1024)));
    assert!(h.journal.entries().contains(&"decoder.geometry".to_string()));
    assert!(h.client.session().is_streaming());

    h.client.on_pause().unwrap();
    h.client.sync().unwrap();
    assert!(!h.client.session().is_active_display_mode());
    for role in [WorkerRole::Decoder, WorkerRole::Receiver, WorkerRole::Tracking] {
        assert!(!h.client.orchestrator().is_running(role));
    }

    let summary = h.client.shutdown().unwrap();
    assert!(summary.frames_submitted >= 5);
    assert!(h.runtime.latches() >= h.runtime.rendered_frames());
    assert!(h.runtime.is_torn_down());
    assert!(h.latency.summary().motion_to_photon_samples >= 5);
}

#[test]
fn pause_persists_negotiated_endpoint_once() {
    let h = harness(fast(), None);
    h.client.on_resume().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        h.client.orchestrator().receiver().is_some_and(|r| r.is_connected())
    }));
    h.client.on_pause().unwrap();

    let store = h.store();
    assert_eq!(store.load_and_clear().unwrap(), Endpoint::new("192.168.1.20", 9944));
    assert!(store.load_and_clear().unwrap().is_empty());
    h.client.shutdown().unwrap();
}

#[test]
fn failed_receiver_aborts_resume_and_pause_still_persists() {
    let options = SimOptions { fail_receiver_start: true, ..fast() };
    let h = harness(options, Some(Endpoint::new("10.0.0.9", 9944)));

    h.client.on_resume().unwrap();
    h.client.sync().unwrap();

    let entries = h.journal.entries();
    assert!(entries.contains(&"receiver.start.failed".to_string()));
    assert!(!entries.contains(&"runtime.resume".to_string()));
    for role in [WorkerRole::Decoder, WorkerRole::Receiver, WorkerRole::Tracking] {
        assert!(!h.client.orchestrator().is_running(role));
    }
    assert_eq!(h.live.decoders(), 0);
    assert_eq!(h.runtime.tracking_samples(), 0);

    h.journal.clear();
    h.client.on_pause().unwrap();
    assert!(h.journal.entries().iter().all(|e| !e.ends_with(".join")));
    assert_eq!(h.store().load_and_clear().unwrap(), Endpoint::new("10.0.0.9", 9944));
    h.client.shutdown().unwrap();
}

#[test]
fn lifecycle_events_are_forwarded_in_order() {
    let options = SimOptions {
        server_settings: Some(SettingsChange { test_mode: true, suspend: false }),
        ..fast()
    };
    let h = harness(options, None);

    h.client.on_surface_created(NativeSurface(7)).unwrap();
    h.client.on_surface_changed(NativeSurface(8)).unwrap();
    h.client.on_key_event(KeyEvent { key_code: 4, action: KeyAction::Down }).unwrap();
    h.client.sync().unwrap();

    let entries = h.journal.entries();
    let created = entries.iter().position(|e| e == "runtime.surface_created 7").unwrap();
    let changed = entries.iter().position(|e| e == "runtime.surface_changed 8").unwrap();
    assert!(created < changed);
    assert_eq!(h.runtime.key_events(), vec![KeyEvent { key_code: 4, action: KeyAction::Down }]);

    h.client.on_resume().unwrap();
    assert!(wait_until(Duration::from_secs(5), || h.runtime.settings().is_some()));
    assert_eq!(h.runtime.settings(), Some(SettingsChange { test_mode: true, suspend: false }));

    h.client.on_pause().unwrap();
    h.client.on_surface_destroyed().unwrap();
    h.client.shutdown().unwrap();
}

#[test]
fn shutdown_while_streaming_stops_everything() {
    let h = harness(fast(), None);
    h.client.on_resume().unwrap();
    assert!(wait_until(Duration::from_secs(5), || h.runtime.rendered_frames() >= 1));

    h.client.shutdown().unwrap();
    assert_eq!(h.live.receivers(), 0);
    assert_eq!(h.live.decoders(), 0);
    assert!(h.runtime.is_torn_down());
    assert_eq!(h.store().load_and_clear().unwrap(), Endpoint::new("192.168.1.20", 9944));

    assert!(matches!(h.client.shutdown(), Err(Error::QueueClosed)));
    assert!(matches!(h.client.on_resume(), Err(Error::QueueClosed)));
}

/// Runtime whose teardown takes a while; counts tracking fetches that land
/// once teardown has begun.
struct SlowTeardown {
    inner: SimRuntime,
    tearing_down: AtomicBool,
    late_fetches: AtomicU64,
}

impl VrRuntime for SlowTeardown {
    fn init(&self) -> Result<DisplayInit> {
        self.inner.init()
    }
    fn teardown(&self) {
        self.tearing_down.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        self.inner.teardown();
    }
    fn on_surface_created(&self, surface: NativeSurface) {
        self.inner.on_surface_created(surface);
    }
    fn on_surface_changed(&self, surface: NativeSurface) {
        self.inner.on_surface_changed(surface);
    }
    fn on_surface_destroyed(&self) {
        self.inner.on_surface_destroyed();
    }
    fn on_resume(&self) {
        self.inner.on_resume();
    }
    fn on_pause(&self) {
        self.inner.on_pause();
    }
    fn on_key_event(&self, event: KeyEvent) {
        self.inner.on_key_event(event);
    }
    fn on_settings_changed(&self, settings: SettingsChange) {
        self.inner.on_settings_changed(settings);
    }
    fn is_active_display_mode(&self) -> bool {
        self.inner.is_active_display_mode()
    }
    fn set_frame_geometry(&self, width: u32, height: u32) {
        self.inner.set_frame_geometry(width, height);
    }
    fn render(&self, frames: &mut dyn FrameProvider) {
        self.inner.render(frames);
    }
    fn render_idle(&self, status: &str) {
        self.inner.render_idle(status);
    }
    fn fetch_tracking(&self, send: &mut dyn FnMut(&[u8], u64)) -> u64 {
        if self.tearing_down.load(Ordering::SeqCst) {
            self.late_fetches.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.fetch_tracking(send)
    }
}

#[test]
fn shutdown_stops_tracking_before_runtime_teardown() {
    let journal = Journal::new();
    let runtime = Arc::new(SlowTeardown {
        inner: SimRuntime::new(RefreshRate::HZ_60, journal.clone()),
        tearing_down: AtomicBool::new(false),
        late_fetches: AtomicU64::new(0),
    });
    let factory = Arc::new(SimFactory::new(fast(), journal.clone()));
    let config = ClientConfig { idle_frame_interval: Duration::from_millis(10), ..ClientConfig::default() };
    let client = StreamClient::spawn(
        &config,
        runtime.clone(),
        factory,
        Arc::new(MemoryPreferences::new()),
        Arc::new(NoopLatency),
    )
    .unwrap();

    client.on_resume().unwrap();
    assert!(wait_until(Duration::from_secs(5), || runtime.inner.tracking_samples() >= 3));
    thread::sleep(Duration::from_millis(200));

    client.shutdown().unwrap();
    assert!(runtime.inner.is_torn_down());
    assert!(!client.session().is_active_display_mode());
    assert_eq!(runtime.late_fetches.load(Ordering::SeqCst), 0);
    let entries = journal.entries();
    let last_join = entries.iter().rposition(|e| e.ends_with(".join")).unwrap();
    let teardown = entries.iter().position(|e| e == "runtime.teardown").unwrap();
    assert!(last_join < teardown);
}

#[test]
fn pause_during_resume_leaves_runtime_paused() {
    let h = harness(fast(), None);
    // Resume and pause back to back; whichever way the start lands, the
    // runtime ends inactive and nothing keeps running.
    for _ in 0..5 {
        h.client.on_resume().unwrap();
        h.client.on_pause().unwrap();
    }
    h.client.sync().unwrap();
    assert!(!h.runtime.is_active_display_mode());
    assert!(!h.client.session().is_active_display_mode());
    for role in [WorkerRole::Decoder, WorkerRole::Receiver, WorkerRole::Tracking] {
        assert!(!h.client.orchestrator().is_running(role));
    }
    h.client.shutdown().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn at_most_one_worker_per_role(ops in prop::collection::vec(any::<bool>(), 1..8)) {
        let h = harness(SimOptions { connect_delay: Duration::from_millis(5), ..SimOptions::default() }, None);
        for resume in ops {
            if resume {
                h.client.on_resume().unwrap();
            } else {
                h.client.on_pause().unwrap();
            }
            thread::sleep(Duration::from_millis(10));
        }
        h.client.sync().unwrap();
        prop_assert!(h.live.peak_receivers() <= 1);
        prop_assert!(h.live.peak_decoders() <= 1);

        h.client.on_pause().unwrap();
        h.client.sync().unwrap();
        prop_assert_eq!(h.live.receivers(), 0);
        prop_assert_eq!(h.live.decoders(), 0);
        prop_assert!(!h.client.orchestrator().is_running(WorkerRole::Tracking));
        h.client.shutdown().unwrap();
    }
}
