//! Per-user key lifecycle on the server
//!
//! Ties the pure ciphers to the user-key store: registration creates and
//! wraps a user key, and request handlers encrypt/decrypt by user id.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cipher::{EncryptedPayload, PayloadCipher, UserPayloadCipher};
use crate::config::CryptoConfig;
use crate::error::{MedcardError, Result};
use crate::keys::{MasterKeyWrapper, WrappedUserKey};
use crate::storage::UserKeyStore;

/// Server-side keyring over a [`UserKeyStore`]
pub struct UserKeyring {
    /// Storage backend
    store: Arc<dyn UserKeyStore>,
    cipher: PayloadCipher,
}

impl UserKeyring {
    pub fn new(config: &CryptoConfig, store: Arc<dyn UserKeyStore>) -> Self {
        debug!("User keyring using {}", store.backend_name());
        Self {
            store,
            cipher: PayloadCipher::new(config),
        }
    }

    /// Create, wrap, and store a key for a newly registered user
    pub async fn register_user(&self, user_id: &str) -> Result<WrappedUserKey> {
        if self.store.get_wrapped_key(user_id).await?.is_some() {
            warn!("Refusing to replace existing key for user {}", user_id);
            return Err(MedcardError::UserAlreadyExists(user_id.to_string()));
        }

        let user_key = MasterKeyWrapper::generate_user_key();
        let wrapped = self.cipher.wrapper().wrap(&user_key)?;

        // A concurrent registration may have won while we were wrapping
        if !self.store.put_wrapped_key_if_absent(user_id, &wrapped).await? {
            warn!("Refusing to replace existing key for user {}", user_id);
            return Err(MedcardError::UserAlreadyExists(user_id.to_string()));
        }

        info!("Registered key for user {}", user_id);
        Ok(wrapped)
    }

    /// Whether a key exists for `user_id`
    pub async fn has_user(&self, user_id: &str) -> Result<bool> {
        Ok(self.store.get_wrapped_key(user_id).await?.is_some())
    }

    /// Encrypt a payload for `user_id`
    pub async fn encrypt_for_user(
        &self,
        user_id: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload> {
        let wrapped = self.wrapped_key(user_id).await?;
        self.cipher.encrypt(plaintext, &wrapped)
    }

    /// Decrypt a payload belonging to `user_id`
    pub async fn decrypt_for_user(
        &self,
        user_id: &str,
        payload: &EncryptedPayload,
    ) -> Result<Vec<u8>> {
        let wrapped = self.wrapped_key(user_id).await?;
        self.cipher.decrypt(payload, &wrapped).inspect_err(|e| {
            if e.is_decryption_failure() {
                warn!("Stored payload failed integrity check for user {}", user_id);
            }
        })
    }

    /// Unwrap `user_id`'s key once for several operations in one request
    pub async fn cipher_for_user(&self, user_id: &str) -> Result<UserPayloadCipher> {
        let wrapped = self.wrapped_key(user_id).await?;
        self.cipher.for_user(&wrapped)
    }

    /// Drop the user's wrapped key; their payloads become unreadable
    pub async fn forget_user(&self, user_id: &str) -> Result<()> {
        self.store.delete_user(user_id).await?;
        info!("Removed key for user {}", user_id);
        Ok(())
    }

    async fn wrapped_key(&self, user_id: &str) -> Result<WrappedUserKey> {
        self.store
            .get_wrapped_key(user_id)
            .await?
            .ok_or_else(|| MedcardError::UserNotFound(user_id.to_string()))
    }
}
