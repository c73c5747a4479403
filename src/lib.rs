//! # hmd_stream
//! Client-side orchestration core of a remote-rendering HMD streaming pipeline.
//!
//! ## Threads
//! - **Render:** owns the display runtime and surface; every lifecycle event is
//!   marshaled onto it through a [`CommandQueue`](render::CommandQueue).
//! - **Receiver / Decoder:** external collaborators behind traits, started on
//!   resume and joined on pause by the [`ThreadOrchestrator`](workers::ThreadOrchestrator).
//! - **Tracking:** fixed-rate pose sampler paced against drift.
//!
//! Decoded frames are handed to the render thread through a single guarded
//! slot with a bounded wait, so rendering never blocks indefinitely.

pub mod client;
pub mod config;
pub mod error;
pub mod render;
pub mod session;
pub mod sim;
pub mod utils;
pub mod workers;

pub use client::StreamClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
