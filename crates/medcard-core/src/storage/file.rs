//! JSON file storage backend
//!
//! Keeps wrapped user keys and client salts in one JSON file in the data
//! directory. Values are already encrypted or non-secret, so the file itself
//! is stored as plain JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{SaltStore, UserKeyStore};
use crate::error::{MedcardError, Result};
use crate::keys::WrappedUserKey;

/// Current on-disk format version
const STORE_VERSION: u32 = 1;

/// File-backed store
pub struct FileStore {
    /// Directory for storage files
    storage_dir: PathBuf,
    /// In-memory cache of the storage
    cache: Arc<RwLock<StoreCache>>,
}

/// In-memory representation of stored data
#[derive(Debug, Default, Clone)]
struct StoreCache {
    users: HashMap<String, String>,
    salts: HashMap<String, String>,
}

/// File format for persistent storage
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    users: HashMap<String, String>,
    #[serde(default)]
    salts: HashMap<String, String>,
}

impl FileStore {
    /// Open (or create) a store in `storage_dir` and load any existing data
    pub async fn open(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        tokio::fs::create_dir_all(&storage_dir).await?;

        let store = Self {
            storage_dir,
            cache: Arc::new(RwLock::new(StoreCache::default())),
        };
        store.load().await?;

        debug!("File storage initialized at: {:?}", store.storage_dir);
        Ok(store)
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the path to the storage file
    fn storage_file_path(&self) -> PathBuf {
        self.storage_dir.join("medcard-store.json")
    }

    /// Load storage from disk
    async fn load(&self) -> Result<()> {
        let path = self.storage_file_path();

        if !path.exists() {
            debug!("No existing storage file found");
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let file: StoreFile = serde_json::from_str(&contents)?;
        if file.version != STORE_VERSION {
            return Err(MedcardError::StorageError(format!(
                "Unsupported store version {}",
                file.version
            )));
        }

        let mut cache = self.cache.write().await;
        cache.users = file.users;
        cache.salts = file.salts;

        debug!(
            "Loaded {} users and {} salts from storage",
            cache.users.len(),
            cache.salts.len()
        );
        Ok(())
    }

    /// Write `data` to disk
    async fn save(&self, data: &StoreCache) -> Result<()> {
        let file = StoreFile {
            version: STORE_VERSION,
            users: data.users.clone(),
            salts: data.salts.clone(),
        };

        let contents = serde_json::to_string_pretty(&file)?;
        let path = self.storage_file_path();

        // Write atomically using a temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved {} users to storage", data.users.len());
        Ok(())
    }

    /// Apply `change` to a copy of the data, persist it, then publish it
    ///
    /// The write lock is held throughout, so concurrent updates serialize and
    /// a failed save leaves the cache as it was. `change` returns `false`
    /// when there is nothing to write.
    async fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut StoreCache) -> bool + Send,
    {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        if !change(&mut next) {
            return Ok(false);
        }

        self.save(&next).await?;
        *cache = next;
        Ok(true)
    }
}

#[async_trait]
impl UserKeyStore for FileStore {
    async fn put_wrapped_key(&self, user_id: &str, wrapped: &WrappedUserKey) -> Result<()> {
        self.update(|data| {
            data.users
                .insert(user_id.to_string(), wrapped.as_str().to_string());
            true
        })
        .await?;
        debug!("Stored wrapped key for user {}", user_id);
        Ok(())
    }

    async fn put_wrapped_key_if_absent(
        &self,
        user_id: &str,
        wrapped: &WrappedUserKey,
    ) -> Result<bool> {
        let inserted = self
            .update(|data| match data.users.entry(user_id.to_string()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(wrapped.as_str().to_string());
                    true
                }
            })
            .await?;
        if inserted {
            debug!("Stored wrapped key for new user {}", user_id);
        }
        Ok(inserted)
    }

    async fn get_wrapped_key(&self, user_id: &str) -> Result<Option<WrappedUserKey>> {
        let cache = self.cache.read().await;
        Ok(cache.users.get(user_id).cloned().map(WrappedUserKey::from))
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        if self
            .update(|data| data.users.remove(user_id).is_some())
            .await?
        {
            debug!("Deleted wrapped key for user {}", user_id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "JSON File Storage"
    }
}

#[async_trait]
impl SaltStore for FileStore {
    async fn put_salt(&self, user_id: &str, salt: &str) -> Result<()> {
        self.update(|data| {
            data.salts.insert(user_id.to_string(), salt.to_string());
            true
        })
        .await?;
        Ok(())
    }

    async fn get_salt(&self, user_id: &str) -> Result<Option<String>> {
        let cache = self.cache.read().await;
        Ok(cache.salts.get(user_id).cloned())
    }
}
