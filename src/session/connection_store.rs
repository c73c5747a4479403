//! connection_store.rs
//! Last-known server endpoint, persisted across sessions.
//!
//! Written on pause, read-and-cleared on resume before the receiver starts. The
//! clear happens before the value is handed out, so a crash between sessions
//! never makes two resumes in a row retry the same stale target.

use log::{debug, warn};
use std::sync::Arc;

use crate::error::Result;
use crate::session::{Endpoint, preferences::Preferences};

const KEY_SERVER_ADDRESS: &str = "server_address";
const KEY_SERVER_PORT: &str = "server_port";

#[derive(Clone)]
pub struct ConnectionStateStore {
    prefs: Arc<dyn Preferences>,
}

impl ConnectionStateStore {
    pub fn new(prefs: Arc<dyn Preferences>) -> Self {
        Self { prefs }
    }

    /// Unconditional write; an empty endpoint means "nothing to recover".
    pub fn save(&self, endpoint: &Endpoint) -> Result<()> {
        debug!("[ConnectionStore] save {}", endpoint);
        self.prefs.put(KEY_SERVER_ADDRESS, endpoint.address.as_deref())?;
        self.prefs.put(KEY_SERVER_PORT, Some(&endpoint.port.to_string()))?;
        Ok(())
    }

    pub fn load_and_clear(&self) -> Result<Endpoint> {
        let address = self.prefs.get(KEY_SERVER_ADDRESS)?.filter(|a| !a.is_empty());
        let port = match self.prefs.get(KEY_SERVER_PORT)? {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("[ConnectionStore] ignoring unparsable port {:?}", raw);
                0
            }),
            None => 0,
        };

        self.save(&Endpoint::empty())?;

        let endpoint = Endpoint { address, port };
        debug!("[ConnectionStore] load {}", endpoint);
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::preferences::MemoryPreferences;

    fn store() -> ConnectionStateStore {
        ConnectionStateStore::new(Arc::new(MemoryPreferences::new()))
    }

    #[test]
    fn second_load_returns_empty_sentinel() {
        let store = store();
        store.save(&Endpoint::new("192.168.1.20", 9944)).unwrap();

        let first = store.load_and_clear().unwrap();
        assert_eq!(first, Endpoint::new("192.168.1.20", 9944));

        let second = store.load_and_clear().unwrap();
        assert!(second.is_empty());
        assert_eq!(second, Endpoint::empty());
    }

    #[test]
    fn fresh_store_loads_empty() {
        assert!(store().load_and_clear().unwrap().is_empty());
    }

    #[test]
    fn saving_empty_clears_previous_endpoint() {
        let store = store();
        store.save(&Endpoint::new("10.1.1.1", 1234)).unwrap();
        store.save(&Endpoint::empty()).unwrap();
        assert!(store.load_and_clear().unwrap().is_empty());
    }

    #[test]
    fn bad_port_reads_as_zero() {
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.put(KEY_SERVER_ADDRESS, Some("10.0.0.9")).unwrap();
        prefs.put(KEY_SERVER_PORT, Some("99999")).unwrap();
        let endpoint = ConnectionStateStore::new(prefs).load_and_clear().unwrap();
        assert_eq!(endpoint, Endpoint { address: Some("10.0.0.9".into()), port: 0 });
    }
}
