//! Process configuration
//!
//! [`CryptoConfig`] carries the master secret and KDF parameters into the
//! constructors that need them; nothing is read from ambient globals after
//! startup. [`Settings`] holds the non-secret knobs in a plain JSON file.
//!
//! The PBKDF2 iteration count is not part of the stored ciphertext format, so
//! production configuration always uses [`DEFAULT_ITERATIONS`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crypto::{KdfParams, MasterSecret, DEFAULT_ITERATIONS};
use crate::error::{MedcardError, Result};

/// Environment variable holding the hex-encoded master secret
pub const MASTER_KEY_ENV: &str = "MASTER_ENCRYPTION_KEY";

/// Cryptographic configuration, built once at startup
#[derive(Debug, Clone)]
pub struct CryptoConfig {
    pub master_secret: MasterSecret,
    pub kdf: KdfParams,
}

impl CryptoConfig {
    /// Build from an explicit secret and parameters
    ///
    /// Anything other than [`KdfParams::default`] produces ciphertexts that
    /// the standard configuration cannot read.
    pub fn new(master_secret: MasterSecret, kdf: KdfParams) -> Result<Self> {
        kdf.validate()?;
        Ok(Self { master_secret, kdf })
    }

    /// Read configuration from the process environment
    ///
    /// A missing or malformed master secret is a startup error. Iterations are
    /// fixed at [`DEFAULT_ITERATIONS`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret_hex = lookup(MASTER_KEY_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                MedcardError::ConfigError(format!("{} is not set", MASTER_KEY_ENV))
            })?;
        let master_secret = MasterSecret::from_hex(&secret_hex)?;

        debug!(iterations = DEFAULT_ITERATIONS, "Loaded crypto configuration");
        Self::new(
            master_secret,
            KdfParams {
                iterations: DEFAULT_ITERATIONS,
            },
        )
    }
}

/// Non-secret application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Directory for the file-backed stores (None = platform data dir)
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            data_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to `path`
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, path).await?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Resolve the data directory, using the platform default when unset
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        default_data_dir()
    }
}

/// Platform data directory for medcard
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("org", "medcard", "medcard")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            MedcardError::ConfigError("Could not determine data directory".to_string())
        })
}
