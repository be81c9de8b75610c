//! Storage trait definitions
//!
//! The persistence layer only ever sees opaque strings: wrapped user keys and
//! client salts. Plaintext keys never cross this boundary.

use crate::error::Result;
use crate::keys::WrappedUserKey;
use async_trait::async_trait;

/// Holds each user's wrapped key (the `encryptedUserKey` column of the user record)
#[async_trait]
pub trait UserKeyStore: Send + Sync {
    /// Store the wrapped key for a user, replacing any previous value
    async fn put_wrapped_key(&self, user_id: &str, wrapped: &WrappedUserKey) -> Result<()>;

    /// Store the wrapped key only if the user has none yet
    ///
    /// Check and insert happen atomically. Returns `false` and leaves the
    /// existing key untouched when one is already present.
    async fn put_wrapped_key_if_absent(
        &self,
        user_id: &str,
        wrapped: &WrappedUserKey,
    ) -> Result<bool>;

    /// Retrieve the wrapped key for a user
    async fn get_wrapped_key(&self, user_id: &str) -> Result<Option<WrappedUserKey>>;

    /// Remove a user's wrapped key (user deletion)
    async fn delete_user(&self, user_id: &str) -> Result<()>;

    /// Get a human-readable name for this storage backend
    fn backend_name(&self) -> &'static str;
}

/// Small metadata table of per-user client salts
#[async_trait]
pub trait SaltStore: Send + Sync {
    /// Insert or replace the salt for a user
    async fn put_salt(&self, user_id: &str, salt: &str) -> Result<()>;

    /// Retrieve the salt for a user
    async fn get_salt(&self, user_id: &str) -> Result<Option<String>>;
}
