//! state.rs
//! Cross-thread session flags and the frame slot, behind one exclusion primitive.
//!
//! Writers:
//! - UI/caller threads flip `resumed` (resume/pause).
//! - The render thread flips `active_display_mode` and drives the slot
//!   `Idle → Requested → Ready(i) → Idle`.
//! - The decoder completion callback moves `Requested → Ready(i)`.
//!
//! The lock is only held for a check/update; the frame wait parks on the
//! condition variable, which releases it.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::workers::interfaces::WaitOutcome;

/// Render-side request/consume handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSlot {
    /// No render pending, no frame held.
    #[default]
    Idle,
    /// The render loop is waiting for the next decoded frame.
    Requested,
    /// A decoded frame has been released to the surface and awaits consumption.
    Ready(u64),
}

#[derive(Debug, Default)]
struct Inner {
    resumed: bool,
    active_display_mode: bool,
    slot: FrameSlot,
}

#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<Inner>,
    frame_cond: Condvar,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resumed(&self) -> bool {
        self.inner.lock().resumed
    }

    /// Wakes any frame wait so a pause cancels it immediately.
    pub fn set_resumed(&self, resumed: bool) {
        self.inner.lock().resumed = resumed;
        self.frame_cond.notify_all();
    }

    pub fn is_active_display_mode(&self) -> bool {
        self.inner.lock().active_display_mode
    }

    pub fn set_active_display_mode(&self, active: bool) {
        self.inner.lock().active_display_mode = active;
        self.frame_cond.notify_all();
    }

    /// Resumed and in active display mode.
    pub fn is_streaming(&self) -> bool {
        let inner = self.inner.lock();
        inner.resumed && inner.active_display_mode
    }

    pub fn frame_slot(&self) -> FrameSlot {
        self.inner.lock().slot
    }

    /// Start a new render request. Returns the index of a ready frame the
    /// previous iteration left unconsumed, which the caller must discard.
    pub fn begin_request(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        let stale = match inner.slot {
            FrameSlot::Ready(index) => Some(index),
            FrameSlot::Idle | FrameSlot::Requested => None,
        };
        inner.slot = FrameSlot::Requested;
        stale
    }

    /// Block until a frame is ready, the session pauses, or `timeout` elapses.
    ///
    /// A consumed frame leaves the slot `Idle`. On cancel or timeout the slot
    /// stays `Requested`, so a late frame is discarded by the next request.
    pub fn wait_ready(&self, timeout: Duration, poll: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if !inner.resumed {
                return WaitOutcome::Cancelled;
            }
            if let FrameSlot::Ready(index) = inner.slot {
                inner.slot = FrameSlot::Idle;
                return WaitOutcome::Frame(index);
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::Idle;
            }
            let wake_at = deadline.min(now + poll);
            self.frame_cond.wait_until(&mut inner, wake_at);
        }
    }

    /// Decoder side: publish `frame_index` if a render is requested.
    /// Returns whether the decoder should release its buffer.
    pub fn offer_frame(&self, frame_index: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.slot != FrameSlot::Requested {
            return false;
        }
        inner.slot = FrameSlot::Ready(frame_index);
        drop(inner);
        self.frame_cond.notify_all();
        true
    }

    /// Drop any pending request, e.g. when the render loop goes idle.
    pub fn reset_slot(&self) {
        self.inner.lock().slot = FrameSlot::Idle;
    }
}
