//! Key material with automatic zeroization

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{MedcardError, Result};

/// Length of every symmetric key in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// 256-bit symmetric key - automatically zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Create a new key from raw bytes
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Get the key bytes (use carefully - avoid copying)
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Create from a slice (must be exactly 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != KEY_LEN {
            return None;
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(slice);
        Some(Self { key })
    }

    /// Decode a 64-character hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let mut bytes = hex::decode(hex_str.trim())
            .map_err(|e| MedcardError::InvalidKey(format!("Invalid key hex: {}", e)))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key.ok_or_else(|| {
            MedcardError::InvalidKey(format!("Key must be {} bytes", KEY_LEN))
        })
    }
}

impl Clone for SymmetricKey {
    fn clone(&self) -> Self {
        Self { key: self.key }
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Server-held secret that wraps every user key
///
/// Read once from configuration and never written anywhere.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    key: SymmetricKey,
}

impl MasterSecret {
    /// Parse a hex-encoded 256-bit secret
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let key = SymmetricKey::from_hex(hex_str)
            .map_err(|e| MedcardError::ConfigError(format!("Invalid master secret: {}", e)))?;
        Ok(Self { key })
    }

    /// Generate a fresh random secret (for provisioning a deployment)
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = SymmetricKey::new(bytes);
        bytes.zeroize();
        Self { key }
    }

    /// Hex form, for writing into deployment configuration
    pub fn to_hex(&self) -> String {
        hex::encode(self.key.as_bytes())
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Per-user data key in its 64-character hex form - zeroed on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct UserKey {
    hex: String,
}

impl UserKey {
    /// Generate 256 random bits from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let hex = hex::encode(bytes);
        bytes.zeroize();
        Self { hex }
    }

    /// Wrap an existing hex string, validating its shape
    pub fn from_hex(hex: String) -> Result<Self> {
        let key = Self { hex };
        // validate by decoding once
        key.to_symmetric_key()?;
        Ok(key)
    }

    /// Get the hex value (use carefully)
    pub fn expose(&self) -> &str {
        &self.hex
    }

    /// Decode into raw key bytes
    pub fn to_symmetric_key(&self) -> Result<SymmetricKey> {
        SymmetricKey::from_hex(&self.hex)
    }
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKey")
            .field("hex", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_from_slice() {
        let bytes = [42u8; 32];
        let key = SymmetricKey::from_slice(&bytes).unwrap();
        assert_eq!(key.as_bytes(), &bytes);
    }

    #[test]
    fn test_symmetric_key_from_invalid_slice() {
        let bytes = [42u8; 16];
        assert!(SymmetricKey::from_slice(&bytes).is_none());
    }

    #[test]
    fn test_symmetric_key_from_hex() {
        let key = SymmetricKey::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[0xab; 32]);

        assert!(SymmetricKey::from_hex("abcd").is_err());
        assert!(SymmetricKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_user_key_generate() {
        let k1 = UserKey::generate();
        let k2 = UserKey::generate();

        assert_eq!(k1.expose().len(), 64);
        assert!(k1.expose().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_user_key_from_hex_rejects_short() {
        assert!(UserKey::from_hex("00ff".to_string()).is_err());
    }

    #[test]
    fn test_master_secret_hex_roundtrip() {
        let secret = MasterSecret::generate();
        let parsed = MasterSecret::from_hex(&secret.to_hex()).unwrap();
        assert_eq!(secret.key().as_bytes(), parsed.key().as_bytes());
    }

    #[test]
    fn test_master_secret_invalid_is_config_error() {
        let err = MasterSecret::from_hex("not-hex").unwrap_err();
        assert!(matches!(err, MedcardError::ConfigError(_)));
    }

    #[test]
    fn test_debug_redacted() {
        let key = SymmetricKey::new([0u8; 32]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0"));

        let user_key = UserKey::generate();
        let debug = format!("{:?}", user_key);
        assert!(!debug.contains(user_key.expose()));

        let secret = MasterSecret::generate();
        let debug = format!("{:?}", secret);
        assert!(!debug.contains(&secret.to_hex()));
    }
}
