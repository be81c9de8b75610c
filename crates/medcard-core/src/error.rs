//! Error types for medcard-core

use thiserror::Error;

/// Result type alias for medcard operations
pub type Result<T> = std::result::Result<T, MedcardError>;

/// Medcard error types
#[derive(Error, Debug)]
pub enum MedcardError {
    /// The composite ciphertext string could not be parsed
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Authentication or padding check failed. Carries no detail on purpose.
    #[error("Decryption failed - wrong key or tampered ciphertext")]
    DecryptionFailure,

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption salt not found for user {0} - run encryption setup first")]
    SaltNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already has a key: {0}")]
    UserAlreadyExists(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl MedcardError {
    /// Whether this error means "the key was wrong" rather than a broken input.
    ///
    /// In the client flow this is how a mistyped password surfaces.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, MedcardError::DecryptionFailure)
    }
}
