//! Composite ciphertext strings
//!
//! Current format: `{salt_hex}:{iv_hex}:{ciphertext_hex}`
//! - Salt: 16 bytes, fresh per encryption, feeds PBKDF2
//! - IV: 16 bytes, fresh per encryption
//! - Ciphertext: AES-256-GCM output with the 16-byte tag appended
//!
//! Legacy format (decrypt only): `{iv_hex}:{ciphertext_hex}`, AES-256-CBC
//! under the raw key bytes.

use std::fmt;
use std::str::FromStr;

use super::encryption::{self, IV_LEN, TAG_LEN};
use super::key_derivation::{derive_key, generate_salt, KdfParams, SALT_LEN};
use super::legacy;
use super::SymmetricKey;
use crate::error::{MedcardError, Result};

/// A parsed composite ciphertext string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// PBKDF2-salted AES-256-GCM (the only format written)
    Salted {
        salt: [u8; SALT_LEN],
        iv: [u8; IV_LEN],
        ciphertext: Vec<u8>,
    },
    /// Unsalted AES-256-CBC from older records
    Legacy { iv: [u8; IV_LEN], ciphertext: Vec<u8> },
}

impl Envelope {
    /// Parse a composite string, telling the variants apart by field count
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [salt, iv, ciphertext] => {
                let salt = decode_fixed::<SALT_LEN>(salt, "salt")?;
                let iv = decode_fixed::<IV_LEN>(iv, "IV")?;
                let ciphertext = decode_field(ciphertext, "ciphertext")?;
                if ciphertext.len() < TAG_LEN {
                    return Err(MedcardError::MalformedEnvelope(format!(
                        "Ciphertext too short: expected at least {} bytes, got {}",
                        TAG_LEN,
                        ciphertext.len()
                    )));
                }
                Ok(Envelope::Salted {
                    salt,
                    iv,
                    ciphertext,
                })
            }
            [iv, ciphertext] => {
                let iv = decode_fixed::<IV_LEN>(iv, "IV")?;
                let ciphertext = decode_field(ciphertext, "ciphertext")?;
                if ciphertext.is_empty() {
                    return Err(MedcardError::MalformedEnvelope(
                        "Empty ciphertext".to_string(),
                    ));
                }
                Ok(Envelope::Legacy { iv, ciphertext })
            }
            _ => Err(MedcardError::MalformedEnvelope(format!(
                "Expected salt:iv:ciphertext, got {} field(s)",
                parts.len()
            ))),
        }
    }

    /// Whether this envelope uses the unauthenticated legacy format
    pub fn is_legacy(&self) -> bool {
        matches!(self, Envelope::Legacy { .. })
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        match self {
            Envelope::Salted { iv, .. } | Envelope::Legacy { iv, .. } => iv,
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        match self {
            Envelope::Salted { ciphertext, .. } | Envelope::Legacy { ciphertext, .. } => ciphertext,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::Salted {
                salt,
                iv,
                ciphertext,
            } => write!(
                f,
                "{}:{}:{}",
                hex::encode(salt),
                hex::encode(iv),
                hex::encode(ciphertext)
            ),
            Envelope::Legacy { iv, ciphertext } => {
                write!(f, "{}:{}", hex::encode(iv), hex::encode(ciphertext))
            }
        }
    }
}

impl FromStr for Envelope {
    type Err = MedcardError;

    fn from_str(s: &str) -> Result<Self> {
        Envelope::parse(s)
    }
}

fn decode_field(field: &str, name: &str) -> Result<Vec<u8>> {
    hex::decode(field)
        .map_err(|e| MedcardError::MalformedEnvelope(format!("Invalid {} hex: {}", name, e)))
}

fn decode_fixed<const N: usize>(field: &str, name: &str) -> Result<[u8; N]> {
    let bytes = decode_field(field, name)?;
    bytes.as_slice().try_into().map_err(|_| {
        MedcardError::MalformedEnvelope(format!(
            "Invalid {} length: expected {}, got {}",
            name,
            N,
            bytes.len()
        ))
    })
}

/// Encrypt `plaintext` under a key derived from `secret` and a fresh salt
///
/// Always emits [`Envelope::Salted`].
pub fn seal(plaintext: &[u8], secret: &SymmetricKey, params: KdfParams) -> Result<Envelope> {
    let salt = generate_salt();
    let key = derive_key(secret.as_bytes(), &salt, params)?;
    let sealed = encryption::encrypt(plaintext, &key)?;

    Ok(Envelope::Salted {
        salt,
        iv: sealed.iv,
        ciphertext: sealed.ciphertext,
    })
}

/// Decrypt an envelope that was sealed under `secret`
///
/// Salted envelopes re-derive the key from the embedded salt. Legacy
/// envelopes use `secret` directly as the CBC key.
pub fn open(envelope: &Envelope, secret: &SymmetricKey, params: KdfParams) -> Result<Vec<u8>> {
    match envelope {
        Envelope::Salted {
            salt,
            iv,
            ciphertext,
        } => {
            let key = derive_key(secret.as_bytes(), salt, params)?;
            encryption::decrypt(iv, ciphertext, &key)
        }
        Envelope::Legacy { iv, ciphertext } => legacy::decrypt_cbc(iv, ciphertext, secret),
    }
}
