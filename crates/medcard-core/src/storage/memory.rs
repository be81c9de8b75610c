//! In-memory storage backend

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{SaltStore, UserKeyStore};
use crate::error::Result;
use crate::keys::WrappedUserKey;

/// Process-local store for wrapped keys and salts
#[derive(Debug, Default)]
pub struct MemoryStore {
    keys: RwLock<HashMap<String, WrappedUserKey>>,
    salts: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserKeyStore for MemoryStore {
    async fn put_wrapped_key(&self, user_id: &str, wrapped: &WrappedUserKey) -> Result<()> {
        self.keys
            .write()
            .await
            .insert(user_id.to_string(), wrapped.clone());
        debug!("Stored wrapped key for user {}", user_id);
        Ok(())
    }

    async fn put_wrapped_key_if_absent(
        &self,
        user_id: &str,
        wrapped: &WrappedUserKey,
    ) -> Result<bool> {
        match self.keys.write().await.entry(user_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(wrapped.clone());
                debug!("Stored wrapped key for new user {}", user_id);
                Ok(true)
            }
        }
    }

    async fn get_wrapped_key(&self, user_id: &str) -> Result<Option<WrappedUserKey>> {
        Ok(self.keys.read().await.get(user_id).cloned())
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        if self.keys.write().await.remove(user_id).is_some() {
            debug!("Deleted wrapped key for user {}", user_id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "In-Memory Storage"
    }
}

#[async_trait]
impl SaltStore for MemoryStore {
    async fn put_salt(&self, user_id: &str, salt: &str) -> Result<()> {
        self.salts
            .write()
            .await
            .insert(user_id.to_string(), salt.to_string());
        Ok(())
    }

    async fn get_salt(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.salts.read().await.get(user_id).cloned())
    }
}
