//! Server-side payload encryption under per-user keys
//!
//! Every payload gets its own salt: the AES key is PBKDF2(user key, salt), so
//! two encryptions of the same bytes never share a key or an IV.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::CryptoConfig;
use crate::crypto::{open, seal, Envelope, KdfParams, SymmetricKey};
use crate::error::Result;
use crate::keys::{MasterKeyWrapper, WrappedUserKey};

/// A `salt:iv:ciphertext` string produced by one encryption call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedPayload(String);

impl EncryptedPayload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Parse into its salt, IV, and ciphertext fields
    pub fn envelope(&self) -> Result<Envelope> {
        Envelope::parse(&self.0)
    }
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptedPayload").field(&self.0).finish()
    }
}

impl From<String> for EncryptedPayload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Envelope> for EncryptedPayload {
    fn from(envelope: Envelope) -> Self {
        Self(envelope.to_string())
    }
}

/// Anything that can turn bytes into an [`EncryptedPayload`] and back
///
/// Implemented by the per-user server cipher and the client password cipher
/// so record handling does not care which side of the trust boundary it is on.
pub trait PayloadSealer: Send + Sync {
    fn seal_payload(&self, plaintext: &[u8]) -> Result<EncryptedPayload>;

    fn open_payload(&self, payload: &EncryptedPayload) -> Result<Vec<u8>>;
}

/// Encrypts and decrypts payloads given a user's wrapped key
#[derive(Debug, Clone)]
pub struct PayloadCipher {
    wrapper: MasterKeyWrapper,
    kdf: KdfParams,
}

impl PayloadCipher {
    pub fn new(config: &CryptoConfig) -> Self {
        Self {
            wrapper: MasterKeyWrapper::new(config),
            kdf: config.kdf,
        }
    }

    /// The key wrapper sharing this cipher's configuration
    pub fn wrapper(&self) -> &MasterKeyWrapper {
        &self.wrapper
    }

    /// Encrypt `plaintext` for the owner of `wrapped_user_key`
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        wrapped_user_key: &WrappedUserKey,
    ) -> Result<EncryptedPayload> {
        self.for_user(wrapped_user_key)?.seal_payload(plaintext)
    }

    /// Decrypt a payload for the owner of `wrapped_user_key`
    ///
    /// Returns raw bytes; callers decide whether they are UTF-8 or JSON.
    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
        wrapped_user_key: &WrappedUserKey,
    ) -> Result<Vec<u8>> {
        self.for_user(wrapped_user_key)?.open_payload(payload)
    }

    /// Unwrap the user key once for a batch of operations
    ///
    /// The returned cipher holds the unwrapped key in memory only; drop it at
    /// the end of the request.
    pub fn for_user(&self, wrapped_user_key: &WrappedUserKey) -> Result<UserPayloadCipher> {
        let user_key = self.wrapper.unwrap(wrapped_user_key)?;
        Ok(UserPayloadCipher {
            key: user_key.to_symmetric_key()?,
            kdf: self.kdf,
        })
    }
}

/// Payload cipher bound to one unwrapped user key
#[derive(Debug)]
pub struct UserPayloadCipher {
    key: SymmetricKey,
    kdf: KdfParams,
}

impl PayloadSealer for UserPayloadCipher {
    fn seal_payload(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let envelope = seal(plaintext, &self.key, self.kdf)?;
        debug!("Encrypted payload");
        Ok(envelope.into())
    }

    fn open_payload(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let envelope = payload.envelope()?;
        let plaintext = open(&envelope, &self.key, self.kdf);
        match &plaintext {
            Ok(_) => debug!(legacy = envelope.is_legacy(), "Decrypted payload"),
            Err(_) => debug!(legacy = envelope.is_legacy(), "Payload decryption failed"),
        }
        plaintext
    }
}
