//! User key generation and wrapping under the master secret

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use zeroize::Zeroize;

use crate::config::CryptoConfig;
use crate::crypto::{open, seal, Envelope, KdfParams, MasterSecret, UserKey};
use crate::error::{MedcardError, Result};

/// A user key encrypted under the master secret, as stored on the user record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedUserKey(String);

impl WrappedUserKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WrappedUserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WrappedUserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WrappedUserKey").field(&self.0).finish()
    }
}

impl From<String> for WrappedUserKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Wraps and unwraps per-user keys with the server's master secret
#[derive(Debug, Clone)]
pub struct MasterKeyWrapper {
    master_secret: MasterSecret,
    kdf: KdfParams,
}

impl MasterKeyWrapper {
    pub fn new(config: &CryptoConfig) -> Self {
        Self {
            master_secret: config.master_secret.clone(),
            kdf: config.kdf,
        }
    }

    /// Generate a fresh 256-bit user key (64 hex characters)
    pub fn generate_user_key() -> UserKey {
        UserKey::generate()
    }

    /// Encrypt `user_key` under a key derived from the master secret and a
    /// fresh salt
    pub fn wrap(&self, user_key: &UserKey) -> Result<WrappedUserKey> {
        let envelope = seal(
            user_key.expose().as_bytes(),
            self.master_secret.key(),
            self.kdf,
        )?;
        debug!("Wrapped user key");
        Ok(WrappedUserKey(envelope.to_string()))
    }

    /// Recover the user key from its wrapped form
    ///
    /// Accepts both the current and the legacy format.
    pub fn unwrap(&self, wrapped: &WrappedUserKey) -> Result<UserKey> {
        let envelope = Envelope::parse(wrapped.as_str())?;
        if envelope.is_legacy() {
            debug!("Unwrapping legacy user key");
        }

        let mut plaintext = open(&envelope, self.master_secret.key(), self.kdf)
            .inspect_err(|_| debug!("User key unwrap failed"))?;

        // A legacy CBC block with lucky padding can decrypt to garbage; that
        // is still a wrong key as far as callers are concerned.
        let user_key = String::from_utf8(std::mem::take(&mut plaintext))
            .map_err(|e| {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                MedcardError::DecryptionFailure
            })
            .and_then(|hex| {
                UserKey::from_hex(hex).map_err(|_| MedcardError::DecryptionFailure)
            })?;

        debug!("Unwrapped user key");
        Ok(user_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::legacy_test_support::encrypt_cbc;
    use crate::crypto::{SymmetricKey, IV_LEN};

    fn config(secret_byte: u8) -> CryptoConfig {
        let secret = MasterSecret::from_hex(&format!("{:02x}", secret_byte).repeat(32)).unwrap();
        CryptoConfig::new(secret, KdfParams { iterations: 1_000 }).unwrap()
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let wrapper = MasterKeyWrapper::new(&config(0x42));
        let user_key = MasterKeyWrapper::generate_user_key();

        let wrapped = wrapper.wrap(&user_key).unwrap();
        assert_eq!(wrapped.as_str().split(':').count(), 3);

        let unwrapped = wrapper.unwrap(&wrapped).unwrap();
        assert_eq!(unwrapped.expose(), user_key.expose());
    }

    #[test]
    fn test_wrap_is_randomized() {
        let wrapper = MasterKeyWrapper::new(&config(0x42));
        let user_key = MasterKeyWrapper::generate_user_key();

        let w1 = wrapper.wrap(&user_key).unwrap();
        let w2 = wrapper.wrap(&user_key).unwrap();
        assert_ne!(w1, w2);
    }

    #[test]
    fn test_wrapped_key_does_not_contain_plaintext() {
        let wrapper = MasterKeyWrapper::new(&config(0x42));
        let user_key = MasterKeyWrapper::generate_user_key();

        let wrapped = wrapper.wrap(&user_key).unwrap();
        assert!(!wrapped.as_str().contains(user_key.expose()));
    }

    #[test]
    fn test_wrong_master_secret_rejected() {
        let user_key = MasterKeyWrapper::generate_user_key();
        let wrapped = MasterKeyWrapper::new(&config(0x42)).wrap(&user_key).unwrap();

        let result = MasterKeyWrapper::new(&config(0x43)).unwrap(&wrapped);
        assert!(matches!(result, Err(MedcardError::DecryptionFailure)));
    }

    #[test]
    fn test_malformed_wrapped_key() {
        let wrapper = MasterKeyWrapper::new(&config(0x42));

        for bad in ["", "abc", "a:b:c:d"] {
            let result = wrapper.unwrap(&WrappedUserKey::new(bad));
            assert!(matches!(result, Err(MedcardError::MalformedEnvelope(_))));
        }
    }

    #[test]
    fn test_unwrap_legacy_format() {
        let wrapper = MasterKeyWrapper::new(&config(0x42));
        let user_key = MasterKeyWrapper::generate_user_key();

        // Legacy wrap: CBC directly under the master secret bytes
        let iv = [0x24u8; IV_LEN];
        let ciphertext = encrypt_cbc(
            user_key.expose().as_bytes(),
            &SymmetricKey::new([0x42; 32]),
            &iv,
        );
        let wrapped = WrappedUserKey::new(format!(
            "{}:{}",
            hex::encode(iv),
            hex::encode(ciphertext)
        ));

        let unwrapped = wrapper.unwrap(&wrapped).unwrap();
        assert_eq!(unwrapped.expose(), user_key.expose());
    }
}
