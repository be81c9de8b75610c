//! AES-256-GCM authenticated encryption
//!
//! Uses a 16-byte IV so the IV field of the composite string keeps the same
//! width as the legacy CBC format. The 16-byte auth tag is appended to the
//! ciphertext.

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

use super::SymmetricKey;
use crate::error::{MedcardError, Result};

/// IV length in bytes (128 bits)
pub const IV_LEN: usize = 16;

/// GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// AES-256-GCM with a 128-bit nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Output of a single encryption: random IV plus ciphertext with tag appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

/// Generate a fresh random IV
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt plaintext under `key` with a fresh random IV
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Sealed> {
    encrypt_with_iv(plaintext, key, generate_iv())
}

pub(crate) fn encrypt_with_iv(
    plaintext: &[u8],
    key: &SymmetricKey,
    iv: [u8; IV_LEN],
) -> Result<Sealed> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|e| MedcardError::EncryptionError(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::<U16>::from_slice(&iv), plaintext)
        .map_err(|e| MedcardError::EncryptionError(e.to_string()))?;

    Ok(Sealed { iv, ciphertext })
}

/// Decrypt and authenticate `ciphertext` (tag appended) under `key`
///
/// Any authentication failure maps to [`MedcardError::DecryptionFailure`].
pub fn decrypt(iv: &[u8; IV_LEN], ciphertext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(MedcardError::DecryptionFailure);
    }

    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| MedcardError::DecryptionFailure)?;

    cipher
        .decrypt(Nonce::<U16>::from_slice(iv), ciphertext)
        .map_err(|_| MedcardError::DecryptionFailure)
}
