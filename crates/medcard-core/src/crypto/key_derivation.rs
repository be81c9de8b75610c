//! Password-based key derivation using PBKDF2-HMAC-SHA256

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use super::{SymmetricKey, KEY_LEN};
use crate::error::{MedcardError, Result};

/// Salt length in bytes (128 bits)
pub const SALT_LEN: usize = 16;

/// Iteration count shared by the wrap, payload, and client paths
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Parameters for PBKDF2 key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// PBKDF2 iteration count (default: 100 000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Reject parameters that would make derivation meaningless
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(MedcardError::ConfigError(
                "KDF iteration count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from secret input material and a salt
///
/// The input is a user password on the client path, or the raw bytes of the
/// master secret / user key on the server path.
pub fn derive_key(secret: &[u8], salt: &[u8], params: KdfParams) -> Result<SymmetricKey> {
    params
        .validate()
        .map_err(|e| MedcardError::KeyDerivationError(e.to_string()))?;

    if salt.is_empty() {
        return Err(MedcardError::KeyDerivationError(
            "Salt must not be empty".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut key_bytes);

    let key = SymmetricKey::new(key_bytes);
    key_bytes.zeroize();
    Ok(key)
}
