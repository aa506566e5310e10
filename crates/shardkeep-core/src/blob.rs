//! On-disk encrypted blob format
//!
//! Blob layout (version 1):
//! ```text
//! OFFSET      SIZE        FIELD
//! ──────────────────────────────────────────────────────
//! 0x00        1           format tag (0x11 hardware, 0x12 passphrase)
//! 0x01        32          salt (passphrase-sealed only)
//! ....        12          nonce
//! ....        n + 16      ciphertext ‖ Poly1305 tag
//! ```
//!
//! Salt presence is decided by the format tag alone, never by inspecting
//! the bytes that follow it.

use crate::aead::SealedPayload;
use crate::credential::{CredentialSource, Salt};
use crate::error::CustodyError;
use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Format tag: version 1, sealed by the hardware key store
pub const TAG_V1_HARDWARE: u8 = 0x11;

/// Format tag: version 1, sealed by a passphrase-derived key
pub const TAG_V1_PASSPHRASE: u8 = 0x12;

/// How a blob's key is reproduced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobSealing {
    /// Key released by the hardware key store; no salt stored
    Hardware,
    /// Key derived from a passphrase and this salt
    Passphrase(Salt),
}

impl BlobSealing {
    /// Sealing implied by the credential source that produced the key
    pub fn for_source(source: CredentialSource, salt: Salt) -> Self {
        match source {
            CredentialSource::HardwareEnclave => BlobSealing::Hardware,
            CredentialSource::PassphraseDerived | CredentialSource::BiometricFallback => {
                BlobSealing::Passphrase(salt)
            }
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            BlobSealing::Hardware => TAG_V1_HARDWARE,
            BlobSealing::Passphrase(_) => TAG_V1_PASSPHRASE,
        }
    }

    pub fn salt(&self) -> Option<&Salt> {
        match self {
            BlobSealing::Hardware => None,
            BlobSealing::Passphrase(salt) => Some(salt),
        }
    }

    /// Short label for status output
    pub fn label(&self) -> &'static str {
        match self {
            BlobSealing::Hardware => "hardware",
            BlobSealing::Passphrase(_) => "passphrase",
        }
    }
}

/// Persisted encrypted shard
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub sealing: BlobSealing,
    pub payload: SealedPayload,
}

impl EncryptedBlob {
    pub fn new(sealing: BlobSealing, payload: SealedPayload) -> Self {
        Self { sealing, payload }
    }

    /// Serialize to the canonical layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let salt_len = self.sealing.salt().map_or(0, |_| SALT_SIZE);
        let mut bytes =
            Vec::with_capacity(1 + salt_len + NONCE_SIZE + self.payload.ciphertext.len());

        bytes.push(self.sealing.tag());
        if let Some(salt) = self.sealing.salt() {
            bytes.extend_from_slice(salt.as_bytes());
        }
        bytes.extend_from_slice(&self.payload.to_bytes());
        bytes
    }

    /// Parse the canonical layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CustodyError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| CustodyError::CorruptBlob("empty blob".to_string()))?;

        let (sealing, rest) = match tag {
            TAG_V1_HARDWARE => (BlobSealing::Hardware, rest),
            TAG_V1_PASSPHRASE => {
                if rest.len() < SALT_SIZE {
                    return Err(CustodyError::CorruptBlob(
                        "blob too short for salt".to_string(),
                    ));
                }
                let (salt_bytes, rest) = rest.split_at(SALT_SIZE);
                let mut salt = [0u8; SALT_SIZE];
                salt.copy_from_slice(salt_bytes);
                (BlobSealing::Passphrase(Salt::from_bytes(salt)), rest)
            }
            other => {
                return Err(CustodyError::CorruptBlob(format!(
                    "unknown format tag 0x{:02x}",
                    other
                )))
            }
        };

        let payload = SealedPayload::from_bytes(rest).ok_or_else(|| {
            CustodyError::CorruptBlob(format!(
                "payload of {} bytes is shorter than nonce and tag ({} bytes)",
                rest.len(),
                NONCE_SIZE + TAG_SIZE
            ))
        })?;

        Ok(Self { sealing, payload })
    }
}
