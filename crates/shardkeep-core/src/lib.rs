//! Shardkeep Core - Encrypted-at-rest custody for local shard state
//!
//! This crate turns a unit of sensitive local state (the "shard") into an
//! authenticated, encrypted blob and recovers it only when a valid credential
//! is presented:
//! - Credential resolution (hardware key store, passphrase, biometric prompt)
//! - ChaCha20-Poly1305 sealing with a fresh nonce per write
//! - Failed-attempt guard with destructive wipe
//! - One-time migration of legacy plaintext state
//!
//! # Security Model
//!
//! - Passphrase keys are derived with Argon2id (memory-hard)
//! - Key material is zeroized on every exit path
//! - The blob file is replaced atomically (temp file, fsync, rename)
//! - Destroyed files are overwritten with random bytes before removal

pub mod aead;
pub mod blob;
pub mod config;
pub mod credential;
pub mod custodian;
pub mod error;
pub mod guard;
pub mod hardware;
pub mod kdf;
pub mod registry;
pub mod storage;

pub use aead::{AeadCodec, AuthenticationFailed, SealedPayload};
pub use blob::{BlobSealing, EncryptedBlob};
pub use config::{CustodyConfig, HardwareBackend, KdfParams};
pub use credential::{
    BiometricPrompt, CredentialResolver, CredentialSource, KeyMaterial, ResolvedKey, Salt,
};
pub use custodian::{BootReport, BootStatus, CustodyState, CustodyStatus, ShardCustodian};
pub use error::{ConfigError, CredentialError, CustodyError, Rejection, Result};
pub use guard::{AttemptGuard, GuardState};
pub use hardware::{HardwareKeyStore, NoHardware, Tpm2Config, Tpm2KeyStore};
pub use registry::{CustodianRegistry, SharedCustodian};

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the passphrase salt in bytes (256 bits)
pub const SALT_SIZE: usize = 32;

/// Size of the ChaCha20-Poly1305 nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Default number of counted failures before the shard is wiped
pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 3;
