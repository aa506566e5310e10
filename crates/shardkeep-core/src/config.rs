//! Custodian configuration
//!
//! Everything here is fixed at construction time. The custodian never
//! re-reads or mutates its configuration mid-session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hardware::Tpm2Config;
use crate::DEFAULT_LOCKOUT_THRESHOLD;

/// Encrypted blob file name inside the data directory
pub const BLOB_FILE: &str = "shard_data.enc";

/// Legacy plaintext file name inside the data directory
pub const LEGACY_FILE: &str = "shard_data_plain";

/// Argon2id work factor
///
/// The defaults put a single derivation in the tens-to-hundreds of
/// milliseconds range on current desktop hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024, // 64 MB
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Check the parameters against Argon2's accepted ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        argon2::Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(crate::KEY_SIZE),
        )
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidKdf(e.to_string()))
    }
}

/// Hardware key store selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardwareBackend {
    /// No hardware key store on this host
    #[default]
    None,
    /// TPM 2.0 sealed object, unsealed with tpm2-tools
    Tpm2(Tpm2Config),
}

/// Shard custodian configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Directory holding the blob and any legacy plaintext file
    pub data_dir: PathBuf,

    /// Counted failures before the shard is wiped
    pub lockout_threshold: u32,

    /// Passphrase KDF work factor
    pub kdf: KdfParams,

    /// Whether the biometric prompt may be used as a last resort
    pub biometric_enabled: bool,

    /// Hardware key store backend
    pub hardware: HardwareBackend,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            kdf: KdfParams::default(),
            biometric_enabled: false,
            hardware: HardwareBackend::None,
        }
    }
}

impl CustodyConfig {
    /// Get the default data directory
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shardkeep")
    }

    /// Create config rooted at a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the custodian cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lockout_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        self.kdf.validate()
    }

    /// Path to the encrypted blob
    pub fn blob_path(&self) -> PathBuf {
        self.data_dir.join(BLOB_FILE)
    }

    /// Path to the legacy plaintext file
    pub fn legacy_path(&self) -> PathBuf {
        self.data_dir.join(LEGACY_FILE)
    }
}
