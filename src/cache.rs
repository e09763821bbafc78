//! Local session cache
//!
//! Remembers the last successful join across restarts in three fixed-name
//! string slots. The cached identity is advisory: it is only used to attempt an
//! automatic rejoin.

use std::collections::HashMap;
#[cfg(feature = "file_cache")]
use std::collections::BTreeMap;
#[cfg(feature = "file_cache")]
use std::fs;
#[cfg(feature = "file_cache")]
use std::path::{Path, PathBuf};
#[cfg(feature = "file_cache")]
use tracing::{debug, info};

use crate::skin::Skin;
use crate::store::PlayerId;

/// Default prefix for the slot names
pub const DEFAULT_KEY_PREFIX: &str = "nebr";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("session cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session cache is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("session cache file too large ({0} bytes)")]
    TooLarge(u64),
}

/// Minimal string key-value storage, shaped like browser local storage
pub trait KeyValueStorage: Send {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove_item(&mut self, key: &str) -> Result<(), CacheError>;
}

/// Volatile storage, lost on exit
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), CacheError> {
        self.items.remove(key);
        Ok(())
    }
}

/// Storage persisted as a JSON object on disk, rewritten on every change
#[cfg(feature = "file_cache")]
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: BTreeMap<String, String>,
}

#[cfg(feature = "file_cache")]
impl FileStorage {
    /// Refuse to load anything bigger than this
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Open the file at `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            debug!("No session cache at {}", path.display());
            return Ok(Self {
                path,
                items: BTreeMap::new(),
            });
        }

        let size = fs::metadata(&path)?.len();
        if size > Self::MAX_FILE_SIZE {
            return Err(CacheError::TooLarge(size));
        }

        let contents = fs::read_to_string(&path)?;
        let items = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents)?
        };

        info!("Loaded session cache from {}", path.display());
        Ok(Self { path, items })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.items)?;
        fs::write(&self.path, contents)?;
        debug!("Saved session cache to {}", self.path.display());
        Ok(())
    }
}

#[cfg(feature = "file_cache")]
impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        self.items.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove_item(&mut self, key: &str) -> Result<(), CacheError> {
        if self.items.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

/// Identity of the last successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSession {
    pub username: String,
    pub player_id: Option<PlayerId>,
    pub skin: Skin,
}

#[derive(Debug, Clone)]
struct SlotNames {
    username: String,
    player_id: String,
    skin: String,
}

impl SlotNames {
    fn new(prefix: &str) -> Self {
        Self {
            username: format!("{prefix}_username"),
            player_id: format!("{prefix}_playerId"),
            skin: format!("{prefix}_skin"),
        }
    }
}

/// Session cache over any [`KeyValueStorage`]
pub struct SessionCache<K: KeyValueStorage> {
    storage: K,
    slots: SlotNames,
}

impl<K: KeyValueStorage> SessionCache<K> {
    pub fn new(storage: K) -> Self {
        Self::with_prefix(storage, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(storage: K, prefix: &str) -> Self {
        Self {
            storage,
            slots: SlotNames::new(prefix),
        }
    }

    /// Saved identity, if a handle was stored. A missing or unknown skin reads
    /// as `default`.
    pub fn load(&self) -> Option<LocalSession> {
        let username = self
            .storage
            .get_item(&self.slots.username)
            .filter(|name| !name.is_empty())?;
        let player_id = self.storage.get_item(&self.slots.player_id).map(PlayerId::new);
        let skin = self
            .storage
            .get_item(&self.slots.skin)
            .map(|id| Skin::parse_or_default(&id))
            .unwrap_or_default();

        Some(LocalSession {
            username,
            player_id,
            skin,
        })
    }

    pub fn save(&mut self, session: &LocalSession) -> Result<(), CacheError> {
        self.storage.set_item(&self.slots.username, &session.username)?;
        match &session.player_id {
            Some(id) => self.storage.set_item(&self.slots.player_id, id.as_str())?,
            None => self.storage.remove_item(&self.slots.player_id)?,
        }
        self.storage.set_item(&self.slots.skin, session.skin.as_str())
    }

    pub fn set_username(&mut self, username: &str) -> Result<(), CacheError> {
        self.storage.set_item(&self.slots.username, username)
    }

    pub fn set_skin(&mut self, skin: Skin) -> Result<(), CacheError> {
        self.storage.set_item(&self.slots.skin, skin.as_str())
    }

    /// Forget the saved identity
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.storage.remove_item(&self.slots.username)?;
        self.storage.remove_item(&self.slots.player_id)?;
        self.storage.remove_item(&self.slots.skin)
    }

    pub fn storage(&self) -> &K {
        &self.storage
    }
}
