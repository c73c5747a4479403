// Session: state shared across threads for one client, plus what outlives it.
// Holds the resumed/display flags with the frame slot, and the persisted endpoint.

pub mod connection_store;
pub mod preferences;
pub mod state;

pub use connection_store::ConnectionStateStore;
pub use preferences::{FilePreferences, MemoryPreferences, Preferences};
pub use state::{FrameSlot, SharedState};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Streaming server address and port. `address: None` is the empty sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Option<String>,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self { address: Some(address.into()), port }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_none()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{}:{}", address, self.port),
            None => f.write_str("<none>"),
        }
    }
}
