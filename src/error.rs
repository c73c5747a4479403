//! error.rs
//! Error type shared by the orchestration core.
//!
//! Categories follow how the caller reacts:
//! - **Fatal-to-resume:** `ReceiverStart`, `DecoderStart`. The resume attempt is
//!   aborted and no worker is left running; the caller re-triggers resume.
//! - **Queue:** `QueueClosed`, `SendFromOwner`, `Cancelled`. A cross-thread
//!   command could not be delivered or waited for.
//! - **Collaborator:** `Runtime`, `Preferences`, `Io`, `Spawn`.
//! - **Config:** `Config` (unreadable config document).
//! - **Export:** `Export` (latency CSV).

use std::path::PathBuf;
use thiserror::Error;

use crate::workers::WorkerRole;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("command queue is closed")]
    QueueClosed,

    #[error("blocking send issued from the queue's owning thread")]
    SendFromOwner,

    #[error("command wait cancelled before completion")]
    Cancelled,

    #[error("receiver failed to start: {reason}")]
    ReceiverStart { reason: String },

    #[error("decoder failed to start: {reason}")]
    DecoderStart { reason: String },

    #[error("display runtime error: {0}")]
    Runtime(String),

    #[error("invalid config document {path:?}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("preferences error at {path:?}: {details}")]
    Preferences { path: Option<PathBuf>, details: String },

    #[error("failed to spawn {role} thread")]
    Spawn {
        role: WorkerRole,
        #[source]
        source: std::io::Error,
    },

    #[error("render thread failed to spawn")]
    RenderSpawn(#[source] std::io::Error),

    #[error("render thread exited before initialization completed")]
    RenderInit,

    #[error("latency export failed")]
    Export(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn receiver_start(reason: impl Into<String>) -> Self {
        Error::ReceiverStart { reason: reason.into() }
    }

    pub fn decoder_start(reason: impl Into<String>) -> Self {
        Error::DecoderStart { reason: reason.into() }
    }

    pub fn preferences(path: Option<PathBuf>, details: impl Into<String>) -> Self {
        Error::Preferences { path, details: details.into() }
    }

    /// True for errors that abort a resume attempt.
    pub fn is_fatal_to_resume(&self) -> bool {
        matches!(self, Error::ReceiverStart { .. } | Error::DecoderStart { .. } | Error::Spawn { .. })
    }
}
