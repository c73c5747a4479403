//! Key-value persistence backing the connection store.

use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// String-valued key-value store. `put(key, None)` writes an explicit null.
pub trait Preferences: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: Option<&str>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, Option<String>>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned().flatten())
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.map(str::to_string));
        Ok(())
    }
}

/// JSON document on disk, rewritten through a temp file and rename on every put.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, Option<String>>>,
}

impl FilePreferences {
    /// Loads `path` if it exists; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| Error::preferences(Some(path.clone()), e.to_string()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::preferences(Some(path), e.to_string())),
        };
        Ok(Self { path, cache: Mutex::new(cache) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, Option<String>>) -> Result<()> {
        let text = serde_json::to_string_pretty(values)
            .map_err(|e| Error::preferences(Some(self.path.clone()), e.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Preferences for FilePreferences {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.lock().get(key).cloned().flatten())
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut values = self.cache.lock();
        values.insert(key.to_string(), value.map(str::to_string));
        self.persist(&values)
    }
}
