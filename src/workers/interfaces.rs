//! interfaces.rs
//! Narrow traits through which the core reaches its external collaborators.
//!
//! - **Receiver:** network link to the streaming server (own thread).
//! - **Decoder:** hardware video decoder (own thread), reports completed buffers
//!   through a [`FrameSink`].
//! - **VrRuntime:** display surface, VR mode and pose queries.
//! - **LatencyCollector:** per-frame timestamp recording.
//!
//! Every worker honors `interrupt()` promptly; `join()` has no timeout.

use std::{fmt, sync::Arc, time::Duration};

use crate::error::Result;
use crate::session::Endpoint;

/// Display refresh rate, fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRate(u32);

impl RefreshRate {
    pub const HZ_60: RefreshRate = RefreshRate(60);
    pub const HZ_72: RefreshRate = RefreshRate(72);

    /// Rejects zero.
    pub fn new(hz: u32) -> Option<Self> {
        (hz > 0).then_some(RefreshRate(hz))
    }

    pub fn hz(&self) -> u32 {
        self.0
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.0 as u64)
    }
}

impl fmt::Display for RefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}

/// Opaque handle of the application window surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSurface(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: i32,
    pub action: KeyAction,
}

/// Settings pushed by the server after connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsChange {
    pub test_mode: bool,
    pub suspend: bool,
}

/// Result of one render-side frame wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A decoded frame was latched; present it.
    Frame(u64),
    /// The session left resumed state while waiting.
    Cancelled,
    /// No frame arrived within the wait timeout.
    Idle,
}

impl WaitOutcome {
    pub fn frame_index(&self) -> Option<u64> {
        match self {
            WaitOutcome::Frame(index) => Some(*index),
            _ => None,
        }
    }
}

/// Handed to [`VrRuntime::render`]; the runtime calls it when it needs the next frame.
pub trait FrameProvider {
    fn wait_frame(&mut self) -> WaitOutcome;
}

/// Texture-backed surface the decoder renders into. Render thread only.
pub trait DisplaySurface: Send {
    /// Latch the most recent decoded image into the texture.
    fn latch_image(&mut self);
}

pub struct DisplayInit {
    pub refresh_rate: RefreshRate,
    pub surface: Box<dyn DisplaySurface>,
}

pub trait VrRuntime: Send + Sync {
    /// Runs once on the render thread before any command is accepted.
    fn init(&self) -> Result<DisplayInit>;
    fn teardown(&self);

    fn on_surface_created(&self, surface: NativeSurface);
    fn on_surface_changed(&self, surface: NativeSurface);
    fn on_surface_destroyed(&self);
    fn on_resume(&self);
    fn on_pause(&self);
    fn on_key_event(&self, event: KeyEvent);
    fn on_settings_changed(&self, settings: SettingsChange);

    fn is_active_display_mode(&self) -> bool;
    fn set_frame_geometry(&self, width: u32, height: u32);

    /// Render one stereo frame; blocks inside `frames.wait_frame()`.
    fn render(&self, frames: &mut dyn FrameProvider);
    /// Present an informational frame with `status` text.
    fn render_idle(&self, status: &str);

    /// Sample the current pose. `send` is invoked with each encoded tracking
    /// packet and its frame index; the returned index identifies the sample.
    fn fetch_tracking(&self, send: &mut dyn FnMut(&[u8], u64)) -> u64;
}

/// Cooperative worker thread owned by a collaborator.
pub trait Worker: Send + Sync {
    fn interrupt(&self);
    /// Wait for the thread to exit. `Err` carries the join failure reason.
    fn join(&self) -> std::result::Result<(), String>;
}

pub trait Receiver: Worker {
    fn start(&self, port: u16, refresh: RefreshRate) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn send(&self, packet: &[u8]);
    fn recover_endpoint(&self, endpoint: &Endpoint);
    fn current_endpoint(&self) -> Endpoint;
}

pub trait Decoder: Worker {
    fn start(&self) -> Result<()>;
    fn is_output_available(&self) -> bool;
    fn notify_geometry_change(&self);
}

/// Receiver → core notifications.
pub trait ReceiverEvents: Send + Sync {
    fn on_connected(&self, width: u32, height: u32);
    fn on_settings_changed(&self, settings: SettingsChange);
}

/// Decoder → core completion callback.
pub trait FrameSink: Send + Sync {
    /// Called once per decoded buffer. `true` tells the decoder to release the
    /// buffer to the display surface; `false` tells it to hold the buffer.
    fn on_frame_decoded(&self, frame_index: u64) -> bool;
}

/// Builds a fresh receiver/decoder pair for every resume.
pub trait WorkerFactory: Send + Sync {
    fn create_receiver(&self, events: Arc<dyn ReceiverEvents>) -> Arc<dyn Receiver>;
    fn create_decoder(&self, receiver: Arc<dyn Receiver>, sink: Arc<dyn FrameSink>) -> Arc<dyn Decoder>;
}

pub trait LatencyCollector: Send + Sync {
    fn tracking(&self, frame_index: u64);
    fn decoded(&self, frame_index: u64);
    fn rendered(&self, frame_index: u64);
    fn submitted(&self, frame_index: u64);
}

/// Discards every timestamp.
pub struct NoopLatency;

impl LatencyCollector for NoopLatency {
    fn tracking(&self, _frame_index: u64) {}
    fn decoded(&self, _frame_index: u64) {}
    fn rendered(&self, _frame_index: u64) {}
    fn submitted(&self, _frame_index: u64) {}
}
