//! Client-side password encryption
//!
//! Device-local data is protected by a key derived from the user's password
//! and a per-user salt kept in the salt store. No server-held secret is
//! involved, so the same password re-derives the same key on any device.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cipher::{EncryptedPayload, PayloadSealer};
use crate::crypto::{derive_key, generate_salt, open, seal, KdfParams, SymmetricKey, SALT_LEN};
use crate::error::{MedcardError, Result};
use crate::storage::SaltStore;

/// Per-user 128-bit salt for the client scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSalt([u8; SALT_LEN]);

impl ClientSalt {
    pub fn generate() -> Self {
        Self(generate_salt())
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }

    /// Base64 form, as written to the salt store
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse a stored salt, accepting base64 or hex
    pub fn parse(stored: &str) -> Result<Self> {
        let stored = stored.trim();
        let is_hex = stored.len() == SALT_LEN * 2 && stored.chars().all(|c| c.is_ascii_hexdigit());

        let bytes = if is_hex {
            hex::decode(stored).map_err(|e| {
                MedcardError::StorageError(format!("Invalid salt hex: {}", e))
            })?
        } else {
            STANDARD.decode(stored).map_err(|e| {
                MedcardError::StorageError(format!("Invalid salt base64: {}", e))
            })?
        };

        let salt: [u8; SALT_LEN] = bytes.as_slice().try_into().map_err(|_| {
            MedcardError::StorageError(format!(
                "Invalid salt length: expected {}, got {}",
                SALT_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(salt))
    }
}

/// Derives client keys from passwords and looks up per-user salts
#[derive(Clone)]
pub struct ClientKeyDeriver {
    salts: Arc<dyn SaltStore>,
    kdf: KdfParams,
}

impl ClientKeyDeriver {
    pub fn new(salts: Arc<dyn SaltStore>, kdf: KdfParams) -> Self {
        Self { salts, kdf }
    }

    /// Derive the 256-bit client key for `password` and `salt`
    ///
    /// Deterministic: the same inputs always give the same key.
    pub fn derive_key(&self, password: &str, salt: &ClientSalt) -> Result<SymmetricKey> {
        derive_key(password.as_bytes(), salt.as_bytes(), self.kdf)
    }

    /// Fetch the stored salt for `user_id`
    ///
    /// [`MedcardError::SaltNotFound`] means client encryption has not been
    /// set up for this user yet.
    pub async fn fetch_salt(&self, user_id: &str) -> Result<ClientSalt> {
        let stored = self
            .salts
            .get_salt(user_id)
            .await?
            .ok_or_else(|| MedcardError::SaltNotFound(user_id.to_string()))?;
        ClientSalt::parse(&stored)
    }

    /// Persist a salt for `user_id`, replacing any previous one
    pub async fn store_salt(&self, user_id: &str, salt: &ClientSalt) -> Result<()> {
        self.salts.put_salt(user_id, &salt.to_base64()).await
    }

    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }
}

/// Payload cipher keyed by a password-derived client key
#[derive(Debug, Clone)]
pub struct ClientCipher {
    key: SymmetricKey,
    kdf: KdfParams,
}

impl ClientCipher {
    pub fn new(key: SymmetricKey, kdf: KdfParams) -> Self {
        Self { key, kdf }
    }

    /// Encrypt with a fresh salt and IV
    ///
    /// Two PBKDF2 stages are involved. The client key itself came from the
    /// password and the stored [`ClientSalt`]; each call then derives a
    /// one-off payload key from the client key and a fresh random salt,
    /// which is the salt written into the first field of the result.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let envelope = seal(plaintext, &self.key, self.kdf)?;
        Ok(envelope.into())
    }

    /// Decrypt; a [`MedcardError::DecryptionFailure`] here usually means a
    /// wrong password
    ///
    /// Only the salted format is accepted. Client data never had a legacy
    /// CBC form, and CBC padding alone cannot tell a wrong password apart.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let envelope = payload.envelope()?;
        if envelope.is_legacy() {
            return Err(MedcardError::MalformedEnvelope(
                "Client payloads must use the salt:iv:ciphertext format".to_string(),
            ));
        }
        open(&envelope, &self.key, self.kdf)
    }

    /// Check the key against an existing ciphertext
    pub fn verify(&self, probe: &EncryptedPayload) -> Result<()> {
        self.decrypt(probe).map(|_| ())
    }
}

impl PayloadSealer for ClientCipher {
    fn seal_payload(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        self.encrypt(plaintext)
    }

    fn open_payload(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        self.decrypt(payload)
    }
}

/// Outcome of unlocking client-side data with a password
#[derive(Debug)]
pub enum Unlock {
    /// The password decrypted existing data
    Verified(ClientCipher),
    /// Nothing to check against yet; treat as "set a new password"
    Unverified(ClientCipher),
}

impl Unlock {
    pub fn cipher(&self) -> &ClientCipher {
        match self {
            Unlock::Verified(c) | Unlock::Unverified(c) => c,
        }
    }

    pub fn into_cipher(self) -> ClientCipher {
        match self {
            Unlock::Verified(c) | Unlock::Unverified(c) => c,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Unlock::Verified(_))
    }
}

/// First-time setup and unlock flow for client-side encryption
#[derive(Clone)]
pub struct ClientVault {
    deriver: ClientKeyDeriver,
}

impl ClientVault {
    pub fn new(salts: Arc<dyn SaltStore>, kdf: KdfParams) -> Self {
        Self {
            deriver: ClientKeyDeriver::new(salts, kdf),
        }
    }

    pub fn deriver(&self) -> &ClientKeyDeriver {
        &self.deriver
    }

    /// Generate and store a new salt, returning a cipher for the new password
    ///
    /// Any data encrypted under a previous salt becomes unreadable.
    pub async fn setup(&self, user_id: &str, password: &str) -> Result<ClientCipher> {
        let salt = ClientSalt::generate();
        let key = self.deriver.derive_key(password, &salt)?;
        self.deriver.store_salt(user_id, &salt).await?;

        info!("Client encryption set up for user {}", user_id);
        Ok(ClientCipher::new(key, self.deriver.kdf()))
    }

    /// Derive the client key for `password`, checking it against `probe`
    ///
    /// Propagates [`MedcardError::SaltNotFound`] if setup never ran and
    /// [`MedcardError::DecryptionFailure`] if the password is wrong.
    pub async fn unlock(
        &self,
        user_id: &str,
        password: &str,
        probe: Option<&EncryptedPayload>,
    ) -> Result<Unlock> {
        let salt = self.deriver.fetch_salt(user_id).await?;
        let cipher = ClientCipher::new(
            self.deriver.derive_key(password, &salt)?,
            self.deriver.kdf(),
        );

        match probe {
            Some(probe) => {
                if let Err(e) = cipher.verify(probe) {
                    debug!("Client unlock failed for user {}", user_id);
                    return Err(e);
                }
                debug!("Client unlock verified for user {}", user_id);
                Ok(Unlock::Verified(cipher))
            }
            None => {
                debug!("Client unlock for user {} has nothing to verify against", user_id);
                Ok(Unlock::Unverified(cipher))
            }
        }
    }
}
