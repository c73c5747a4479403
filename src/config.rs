//! Client configuration.
//!
//! Defaults match the streaming server's expectations (port 9944, 1 s frame
//! wait). `load` reads the JSON document named by `HMD_STREAM_CONFIG`, if any,
//! then overlays `HMD_STREAM_*` variables; a variable that does not parse keeps
//! the value from the file or the default.

use serde::{Deserialize, Deserializer, de};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};

pub const CONFIG_ENV: &str = "HMD_STREAM_CONFIG";

pub const DEFAULT_PORT: u16 = 9944;
pub const DEFAULT_FRAME_WAIT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_FRAME_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_IDLE_FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// UDP port handed to the receiver on every start.
    pub port: u16,
    /// Upper bound of a single FrameSync wait before falling back to idle.
    #[serde(rename = "frame_wait_ms", deserialize_with = "positive_millis")]
    pub frame_wait_timeout: Duration,
    /// Maximum gap between re-checks of the frame slot while waiting.
    #[serde(rename = "frame_poll_ms", deserialize_with = "positive_millis")]
    pub frame_poll_interval: Duration,
    /// Sleep after each idle/status frame.
    #[serde(rename = "idle_frame_ms", deserialize_with = "positive_millis")]
    pub idle_frame_interval: Duration,
    /// Shown on the first line of every idle status frame.
    pub version_name: String,
    /// Where the connection endpoint is persisted. `None` keeps it in memory.
    pub preferences_path: Option<PathBuf>,
    /// Latency events are exported here when set.
    pub latency_csv: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frame_wait_timeout: DEFAULT_FRAME_WAIT_TIMEOUT,
            frame_poll_interval: DEFAULT_FRAME_POLL_INTERVAL,
            idle_frame_interval: DEFAULT_IDLE_FRAME_INTERVAL,
            version_name: format!("hmd_stream {}", env!("CARGO_PKG_VERSION")),
            preferences_path: None,
            latency_csv: None,
        }
    }
}

impl ClientConfig {
    /// Defaults plus the environment overlay; no config document.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    /// Config document from `HMD_STREAM_CONFIG` (when set), then the
    /// environment overlay.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Parse a JSON document. Missing fields keep their defaults; durations
    /// are whole milliseconds.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::Config { path: path.to_path_buf(), details: e.to_string() })
    }

    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.overlay(lookup))
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("HMD_STREAM_PORT") {
            self.port = port.trim().parse().unwrap_or(self.port);
        }
        if let Some(ms) = lookup("HMD_STREAM_FRAME_WAIT_MS") {
            self.frame_wait_timeout = parse_millis(&ms).unwrap_or(self.frame_wait_timeout);
        }
        if let Some(ms) = lookup("HMD_STREAM_FRAME_POLL_MS") {
            self.frame_poll_interval = parse_millis(&ms).unwrap_or(self.frame_poll_interval);
        }
        if let Some(ms) = lookup("HMD_STREAM_IDLE_FRAME_MS") {
            self.idle_frame_interval = parse_millis(&ms).unwrap_or(self.idle_frame_interval);
        }
        if let Some(name) = lookup("HMD_STREAM_VERSION_NAME") {
            self.version_name = name;
        }
        if let Some(path) = lookup("HMD_STREAM_PREFERENCES") {
            self.preferences_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("HMD_STREAM_LATENCY_CSV") {
            self.latency_csv = Some(PathBuf::from(path));
        }
        self
    }
}

fn positive_millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let ms = u64::deserialize(deserializer)?;
    if ms == 0 {
        return Err(de::Error::custom("interval must be at least 1 ms"));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().filter(|ms| *ms > 0).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicU32, Ordering},
    };

    fn with_vars(vars: &[(&str, &str)]) -> ClientConfig {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ClientConfig::default().overlay(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_server_expectations() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 9944);
        assert_eq!(config.frame_wait_timeout, Duration::from_secs(1));
        assert_eq!(config.frame_poll_interval, Duration::from_millis(100));
        assert!(config.preferences_path.is_none());
    }

    #[test]
    fn overlay_applies_valid_values() {
        let config = with_vars(&[
            ("HMD_STREAM_PORT", "10000"),
            ("HMD_STREAM_FRAME_WAIT_MS", "250"),
            ("HMD_STREAM_PREFERENCES", "/tmp/prefs.json"),
        ]);
        assert_eq!(config.port, 10000);
        assert_eq!(config.frame_wait_timeout, Duration::from_millis(250));
        assert_eq!(config.preferences_path, Some(PathBuf::from("/tmp/prefs.json")));
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config = with_vars(&[("HMD_STREAM_PORT", "not-a-port"), ("HMD_STREAM_FRAME_POLL_MS", "0")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.frame_poll_interval, DEFAULT_FRAME_POLL_INTERVAL);
    }

    fn write_document(text: &str) -> PathBuf {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let path = env::temp_dir().join(format!("hmd_stream_config_{}_{}.json", std::process::id(), n));
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn deserializes_partial_document() {
        let config: ClientConfig = serde_json::from_str(r#"{"port": 9000, "frame_poll_ms": 40}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.frame_poll_interval, Duration::from_millis(40));
        assert_eq!(config.idle_frame_interval, DEFAULT_IDLE_FRAME_INTERVAL);
    }

    #[test]
    fn load_reads_document_then_environment() {
        let path = write_document(r#"{"port": 9100, "frame_wait_ms": 250, "version_name": "from file"}"#);
        let vars: HashMap<String, String> = [
            (CONFIG_ENV.to_string(), path.display().to_string()),
            ("HMD_STREAM_PORT".to_string(), "9200".to_string()),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::load_with(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.port, 9200);
        assert_eq!(config.frame_wait_timeout, Duration::from_millis(250));
        assert_eq!(config.version_name, "from file");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_without_document_uses_defaults() {
        let config = ClientConfig::load_with(|_| None).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn bad_documents_are_reported() {
        let zero = write_document(r#"{"frame_wait_ms": 0}"#);
        assert!(matches!(ClientConfig::from_file(&zero), Err(Error::Config { .. })));
        let garbled = write_document("{port");
        assert!(matches!(ClientConfig::from_file(&garbled), Err(Error::Config { .. })));
        let missing = env::temp_dir().join("hmd_stream_config_missing.json");
        assert!(matches!(ClientConfig::from_file(&missing), Err(Error::Io(_))));
        let _ = fs::remove_file(zero);
        let _ = fs::remove_file(garbled);
    }
}
