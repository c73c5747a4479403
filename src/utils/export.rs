//! Latency export: background CSV writer plus a one-shot summary file.
//!
//! - `latency_events.csv`-style output: `frame_index,stage,ts_ns`, one row per event.
//! - Summary: `metric,value,description`.
//!
//! The writer drains in batches and flushes every few batches; on `finish` it
//! drains whatever is left before returning the row count.

use csv::Writer;
use log::{debug, error, info};
use serde::Serialize;
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::error::{Error, Result};
use crate::utils::latency::{LatencyRecorder, LatencySummary};

const BATCH: usize = 256;
const FLUSH_BATCHES: usize = 8;
const CONSUMER_POLL_MS: u64 = 10;

pub struct LatencyExporter {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<u64>>>,
    path: PathBuf,
}

impl LatencyExporter {
    /// Create `path` and start draining `recorder` into it.
    pub fn start(recorder: &LatencyRecorder, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        let recorder = recorder.clone();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("latency-export".to_string())
            .spawn(move || {
                let mut wtr = Writer::from_writer(BufWriter::new(file));
                let mut rows = 0u64;
                let mut batches = 0usize;

                while flag.load(Ordering::Acquire) {
                    let written = drain(&recorder, &mut wtr, BATCH)?;
                    if written == 0 {
                        thread::sleep(Duration::from_millis(CONSUMER_POLL_MS));
                        continue;
                    }
                    rows += written;
                    batches += 1;
                    if batches >= FLUSH_BATCHES {
                        wtr.flush()?;
                        batches = 0;
                    }
                }

                rows += drain(&recorder, &mut wtr, usize::MAX)?;
                wtr.flush()?;
                debug!("[Export] writer exiting after {} rows", rows);
                Ok(rows)
            })?;

        info!("[Export] writing latency events to {:?}", path);
        Ok(Self { running, handle: Some(handle), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the writer after a final drain. Returns rows written.
    pub fn finish(mut self) -> Result<u64> {
        self.running.store(false, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Runtime("latency export thread panicked".to_string()))?,
            None => Ok(0),
        }
    }
}

impl Drop for LatencyExporter {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if let Ok(Err(e)) = handle.join() {
                error!("[Export] latency export failed: {}", e);
            }
        }
    }
}

fn drain<W: std::io::Write>(recorder: &LatencyRecorder, wtr: &mut Writer<W>, max: usize) -> Result<u64> {
    let mut written = 0u64;
    while (written as usize) < max {
        match recorder.pop() {
            Some(event) => {
                wtr.serialize(event)?;
                written += 1;
            }
            None => break,
        }
    }
    Ok(written)
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    metric: &'a str,
    value: String,
    description: &'a str,
}

/// Write `summary` as `metric,value,description` rows.
pub fn write_summary(path: impl AsRef<Path>, summary: &LatencySummary) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path)?;
    let rows = [
        ("events_recorded", summary.events_recorded.to_string(), "Latency events queued"),
        ("events_dropped", summary.events_dropped.to_string(), "Events dropped on a full queue"),
        (
            "motion_to_photon_samples",
            summary.motion_to_photon_samples.to_string(),
            "Frames submitted with a matching tracking sample",
        ),
        (
            "motion_to_photon_mean_us",
            format!("{:.2}", summary.motion_to_photon_mean_us),
            "Mean tracking-to-submit latency",
        ),
    ];
    for (metric, value, description) in rows {
        wtr.serialize(SummaryRow { metric, value, description })?;
    }
    wtr.flush()?;
    info!("[Export] latency summary written to {:?}", path);
    Ok(())
}
