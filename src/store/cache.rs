//! Last-known local mirror of remote records.
//!
//! Read only when the persistence service is unreachable. Failures here are
//! logged and swallowed: the cache is a convenience, never a source of truth.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::fs_util::{ensure_private_dir, write_private};
use crate::types::{BotId, ConversationId, UserId};

/// Key-value string storage.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub mod keys {
    use super::*;

    pub fn bots(user: UserId) -> String {
        format!("bots:{user}")
    }

    pub fn conversations(user: UserId) -> String {
        format!("conversations:{user}")
    }

    pub fn messages(conversation: ConversationId) -> String {
        format!("messages:{conversation}")
    }

    pub fn memory(bot: BotId, user: UserId) -> String {
        format!("memory:{bot}:{user}")
    }
}

/// Deserialize a cached JSON value; corrupt entries read as absent.
pub fn load<T: DeserializeOwned>(cache: &dyn LocalCache, key: &str) -> Option<T> {
    let raw = cache.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, "discarding unreadable cache entry: {e}");
            None
        }
    }
}

pub fn save<T: Serialize + ?Sized>(cache: &dyn LocalCache, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(anyhow::Error::from)
        .and_then(|json| cache.set(key, &json));
    if let Err(e) = result {
        warn!(key, "cache write failed (non-fatal): {e}");
    }
}

pub fn forget(cache: &dyn LocalCache, key: &str) {
    if let Err(e) = cache.remove(key) {
        warn!(key, "cache removal failed (non-fatal): {e}");
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("cache lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("cache lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// One JSON file per key under an owner-only directory.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        ensure_private_dir(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        write_private(&self.path_for(key), value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::anyhow!("failed to remove cache entry {key}: {e}")),
        }
    }
}
