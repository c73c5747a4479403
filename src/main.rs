//! # HMD Streaming Client Simulation
//! Runs the orchestration core against simulated collaborators.
//!
//! ## Flow
//! - Spawn the client (render thread + runtime init handshake).
//! - Repeat N times: resume → stream for the chosen duration → pause.
//! - Shut down, then export latency events and a summary.
//!
//! ## Outputs
//! - `data/logs/latency_events.csv` (or `HMD_STREAM_LATENCY_CSV`): per-frame stage timestamps.
//! - `data/logs/latency_summary.csv`: motion-to-photon summary.

use hmd_stream::{
    ClientConfig, StreamClient,
    session::{FilePreferences, MemoryPreferences, Preferences},
    sim::{Journal, SimFactory, SimOptions, SimRuntime},
    utils::{LatencyExporter, LatencyRecorder, write_summary},
    workers::interfaces::{KeyAction, KeyEvent, NativeSurface, RefreshRate, SettingsChange},
};
use log::{error, info, warn};
use std::{
    fs::create_dir_all,
    io::{Write, stdin, stdout},
    path::PathBuf,
    sync::Arc,
    thread,
    time::Duration,
};

const DEFAULT_CYCLES: usize = 2;
const DEFAULT_STREAM_SECS: u64 = 5;
const KEY_BACK: i32 = 4;

fn main() {
    env_logger::init();
    info!("=== HMD STREAM SIMULATION START ===");

    let config = ClientConfig::load().unwrap_or_else(|e| {
        warn!("Ignoring config document: {}", e);
        ClientConfig::from_env()
    });
    let cycles = prompt_cycles();
    let stream_for = Duration::from_secs(prompt_seconds());
    run_session_internal(&config, cycles, stream_for);

    info!("=== HMD STREAM SIMULATION FINISHED ===");
}

fn prompt_cycles() -> usize {
    print!("Number of resume/pause cycles [default: {}]: ", DEFAULT_CYCLES);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().parse::<usize>().unwrap_or(DEFAULT_CYCLES)
}

fn prompt_seconds() -> u64 {
    print!("Seconds to stream per cycle [default: {}]: ", DEFAULT_STREAM_SECS);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().parse::<u64>().unwrap_or(DEFAULT_STREAM_SECS)
}

fn open_preferences(config: &ClientConfig) -> Arc<dyn Preferences> {
    match &config.preferences_path {
        Some(path) => match FilePreferences::open(path) {
            Ok(prefs) => Arc::new(prefs),
            Err(e) => {
                warn!("Falling back to in-memory preferences: {}", e);
                Arc::new(MemoryPreferences::new())
            }
        },
        None => Arc::new(MemoryPreferences::new()),
    }
}

fn run_session_internal(config: &ClientConfig, cycles: usize, stream_for: Duration) {
    info!("[Session] {} cycles of {:?} on port {}", cycles, stream_for, config.port);

    // ========================================================================
    // Latency recording
    // ========================================================================
    let log_dir = PathBuf::from("data/logs");
    if let Err(e) = create_dir_all(&log_dir) {
        error!("Failed to create log directory {:?}: {}", log_dir, e);
        return;
    }
    let recorder = LatencyRecorder::new();
    let events_csv = config.latency_csv.clone().unwrap_or_else(|| log_dir.join("latency_events.csv"));
    let exporter = match LatencyExporter::start(&recorder, &events_csv) {
        Ok(exporter) => Some(exporter),
        Err(e) => {
            error!("Latency export disabled: {}", e);
            None
        }
    };

    // ========================================================================
    // Client against simulated collaborators
    // ========================================================================
    let journal = Journal::new();
    let runtime = Arc::new(SimRuntime::new(RefreshRate::HZ_72, journal.clone()));
    let options = SimOptions {
        connect_delay: Duration::from_millis(500),
        server_settings: Some(SettingsChange { test_mode: false, suspend: false }),
        ..SimOptions::default()
    };
    let factory = Arc::new(SimFactory::new(options, journal));
    let live = factory.live();

    let client = match StreamClient::spawn(
        config,
        runtime.clone(),
        factory,
        open_preferences(config),
        Arc::new(recorder.clone()),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Client failed to start: {}", e);
            return;
        }
    };

    let _ = client.on_surface_created(NativeSurface(1));
    for cycle in 1..=cycles {
        info!("[Session] cycle {}/{}: resume", cycle, cycles);
        if let Err(e) = client.on_resume() {
            error!("Resume not delivered: {}", e);
            break;
        }
        thread::sleep(stream_for);

        let _ = client.on_key_event(KeyEvent { key_code: KEY_BACK, action: KeyAction::Down });
        let _ = client.on_key_event(KeyEvent { key_code: KEY_BACK, action: KeyAction::Up });

        info!("[Session] cycle {}/{}: pause", cycle, cycles);
        if let Err(e) = client.on_pause() {
            error!("Pause not delivered: {}", e);
            break;
        }
        thread::sleep(Duration::from_millis(200));
    }
    let _ = client.on_surface_destroyed();

    match client.shutdown() {
        Ok(summary) => info!(
            "[Session] render: {} submitted, {} idle, {} discarded",
            summary.frames_submitted, summary.idle_frames, summary.discarded_frames
        ),
        Err(e) => error!("Shutdown failed: {}", e),
    }
    info!(
        "[Session] runtime: {} rendered, {} wait timeouts, {} tracking samples; peak receivers={} decoders={}",
        runtime.rendered_frames(),
        runtime.wait_timeouts(),
        runtime.tracking_samples(),
        live.peak_receivers(),
        live.peak_decoders()
    );

    // ========================================================================
    // Export
    // ========================================================================
    if let Some(exporter) = exporter {
        match exporter.finish() {
            Ok(rows) => info!("[Export] {} latency events written to {:?}", rows, events_csv),
            Err(e) => error!("Latency export failed: {}", e),
        }
    }
    let summary = recorder.summary();
    if let Err(e) = write_summary(log_dir.join("latency_summary.csv"), &summary) {
        error!("Failed to write latency summary: {}", e);
    }
    println!(
        "Motion-to-photon: {:.2} µs mean over {} frames",
        summary.motion_to_photon_mean_us, summary.motion_to_photon_samples
    );
}
