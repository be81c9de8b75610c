//! Cryptographic primitives for per-user envelope encryption
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption with 128-bit IVs
//! - PBKDF2-HMAC-SHA256 key derivation
//! - The `salt:iv:ciphertext` composite string format (plus legacy CBC reads)
//! - Secure memory handling with zeroize

mod encryption;
mod envelope;
mod key_derivation;
mod legacy;
mod secure_memory;

pub use encryption::{decrypt, encrypt, generate_iv, Sealed, IV_LEN, TAG_LEN};
pub use envelope::{open, seal, Envelope};
pub use key_derivation::{derive_key, generate_salt, KdfParams, DEFAULT_ITERATIONS, SALT_LEN};
pub use legacy::decrypt_cbc;
pub use secure_memory::{MasterSecret, SymmetricKey, UserKey, KEY_LEN};

#[cfg(test)]
pub(crate) use legacy::tests as legacy_test_support;
