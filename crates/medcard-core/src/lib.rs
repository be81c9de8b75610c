//! # medcard-core
//!
//! Per-user envelope encryption for Medcard health records:
//! - A master secret wraps a random 256-bit key per user
//! - Per-user keys encrypt lab results and attachments, one salt per payload
//! - Client-side keys re-derived from a password and a stored salt
//! - `salt:iv:ciphertext` composite strings (AES-256-GCM, PBKDF2-HMAC-SHA256),
//!   with read support for the legacy `iv:ciphertext` CBC format

pub mod cipher;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keyring;
pub mod keys;
pub mod records;
pub mod storage;

pub use cipher::{EncryptedPayload, PayloadCipher, PayloadSealer, UserPayloadCipher};
pub use client::{ClientCipher, ClientKeyDeriver, ClientSalt, ClientVault, Unlock};
pub use config::{CryptoConfig, Settings};
pub use crypto::{Envelope, KdfParams, MasterSecret, SymmetricKey, UserKey};
pub use error::{MedcardError, Result};
pub use keyring::UserKeyring;
pub use keys::{MasterKeyWrapper, WrappedUserKey};
pub use records::{Attachment, BloodTestResult, EncryptedAttachment, EncryptedUpload, RecordCipher};
pub use storage::{FileStore, MemoryStore, SaltStore, UserKeyStore};
