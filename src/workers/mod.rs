// Workers: the three threads started on resume and joined on pause.
// Receiver and decoder are external collaborators; tracking is implemented here.

pub mod interfaces;
pub mod orchestrator;
pub mod tracking;

pub use orchestrator::{StartOutcome, StopOutcome, StopReport, ThreadOrchestrator};
pub use tracking::{Pacer, TrackingSampler, TrackingStats};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Decoder,
    Receiver,
    Tracking,
}

impl WorkerRole {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerRole::Decoder => "decoder",
            WorkerRole::Receiver => "receiver",
            WorkerRole::Tracking => "tracking",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
