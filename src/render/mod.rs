// Render side: the render-owning thread, its command queue, and the frame handshake.

pub mod command_queue;
pub mod frame_sync;
pub mod render_loop;

pub use command_queue::{CommandLoop, CommandQueue};
pub use frame_sync::{DecodedFrameSink, FrameSync};
pub use render_loop::{IdleStatus, RenderContext, RenderSummary, RenderThread};
