//! Error types for shard custody

use std::fmt;

use thiserror::Error;

/// Result type alias for custody operations
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Errors raised while resolving a credential into key material
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential source could produce a key
    #[error("No credential source available - supply a passphrase or retry hardware")]
    Unavailable,

    /// A hardware key store was present but the unseal/derive call failed
    #[error("Hardware key store error: {0}")]
    HardwareError(String),

    /// The key derivation function rejected its parameters or input
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Why a decrypt attempt was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No credential source produced a key
    Unavailable,
    /// The hardware key store faulted
    HardwareFault,
    /// The AEAD tag did not verify (wrong key or altered blob)
    AuthenticationFailed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unavailable => write!(f, "no credential available"),
            Rejection::HardwareFault => write!(f, "hardware key store fault"),
            Rejection::AuthenticationFailed => write!(f, "authentication failed"),
        }
    }
}

/// Errors surfaced by the shard custodian
#[derive(Debug, Error)]
pub enum CustodyError {
    /// Non-terminal: the presented credential did not open the shard
    #[error("Invalid credential: {cause} ({attempts_remaining} attempts remaining)")]
    InvalidCredential {
        cause: Rejection,
        attempts_remaining: u32,
    },

    /// Terminal: the encrypted shard was destroyed by the attempt guard
    #[error("Shard wiped after repeated failures - re-provision with encrypt_state")]
    Wiped,

    /// No encrypted shard exists yet
    #[error("No encrypted shard present")]
    NoShard,

    /// Passphrase rotation requested on a hardware-sealed shard
    #[error("Shard is not passphrase-sealed")]
    NotPassphraseSealed,

    /// Credential resolution failed while sealing
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The blob on disk is not in a recognised format
    #[error("Corrupt blob: {0}")]
    CorruptBlob(String),

    /// Cipher failure unrelated to authentication
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration rejected at construction
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error (never counted as a failed attempt)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Lockout threshold must be at least 1")]
    ZeroThreshold,

    #[error("Invalid KDF parameters: {0}")]
    InvalidKdf(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
