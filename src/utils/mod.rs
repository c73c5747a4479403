pub mod export;
pub mod latency;

pub use export::{LatencyExporter, write_summary};
pub use latency::{LatencyEvent, LatencyRecorder, LatencyStage, LatencySummary};
