//! Credential sources and the key material they produce
//!
//! Exactly one [`CredentialSource`] produces the key for any single
//! operation. Sources are probed in a fixed priority order by the
//! [`CredentialResolver`]; a source that is absent or faulted hands over to
//! the next one, and the decision is logged.

mod resolver;

pub use resolver::CredentialResolver;

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CredentialError;
use crate::{KEY_SIZE, SALT_SIZE};

/// Where a key came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialSource {
    /// Platform key store (TPM sealed object, secure co-processor)
    HardwareEnclave,
    /// Argon2id over the supplied passphrase and the persisted salt
    PassphraseDerived,
    /// Interactive prompt yielding a passphrase for the passphrase path
    BiometricFallback,
}

impl CredentialSource {
    /// Fixed probing order, hardware first
    pub const PRIORITY: [CredentialSource; 3] = [
        CredentialSource::HardwareEnclave,
        CredentialSource::PassphraseDerived,
        CredentialSource::BiometricFallback,
    ];
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::HardwareEnclave => write!(f, "hardware enclave"),
            CredentialSource::PassphraseDerived => write!(f, "passphrase"),
            CredentialSource::BiometricFallback => write!(f, "biometric fallback"),
        }
    }
}

/// 256-bit symmetric key (zeroized on drop)
///
/// Deliberately not `Clone`: a key lives in exactly one owning scope.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_SIZE]);

impl KeyMaterial {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) fn zeroed() -> Self {
        Self([0u8; KEY_SIZE])
    }

    /// Borrow the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; KEY_SIZE] {
        &mut self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([REDACTED])")
    }
}

/// Per-installation salt for the passphrase path
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Draw a fresh salt from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// Short non-reversible identifier, safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.fingerprint())
    }
}

/// A key together with the source that produced it
#[derive(Debug)]
pub struct ResolvedKey {
    pub source: CredentialSource,
    pub key: KeyMaterial,
}

/// Interactive last-resort prompt
///
/// On success the prompt yields a user-entered passphrase, which the
/// resolver feeds through the passphrase path. The call may block for a
/// human-scale duration.
pub trait BiometricPrompt: Send + Sync {
    /// Returns `Ok(None)` when the user dismissed the prompt
    fn prompt(&self) -> Result<Option<Zeroizing<String>>, CredentialError>;
}
