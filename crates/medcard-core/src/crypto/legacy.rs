//! Read-only support for the legacy AES-256-CBC format
//!
//! Older records were encrypted with AES-256-CBC and PKCS#7 padding directly
//! under the raw key bytes, with no salt and no authentication tag. Integrity
//! rests on the padding check alone, which is a padding-oracle weakness, so
//! this module only decrypts. New data always goes through AES-256-GCM.

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use super::{SymmetricKey, IV_LEN};
use crate::error::{MedcardError, Result};

type Aes256CbcDec = cbc::Decryptor<aes_gcm::aes::Aes256>;

/// Decrypt a legacy CBC ciphertext under the raw key bytes
///
/// A bad padding block maps to [`MedcardError::DecryptionFailure`], same as an
/// authentication failure in the current format.
pub fn decrypt_cbc(iv: &[u8; IV_LEN], ciphertext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(MedcardError::DecryptionFailure);
    }

    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| MedcardError::DecryptionFailure)?;

    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| MedcardError::DecryptionFailure)
}
