//! ChaCha20-Poly1305 sealing of shard payloads
//!
//! Every call to [`AeadCodec::encrypt`] draws a fresh 96-bit nonce from the
//! OS CSPRNG. Nonces are never derived from counters or stored state, so a
//! restored backup or a crashed write cannot cause reuse under one key.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::credential::KeyMaterial;
use crate::error::CustodyError;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Tag verification failed: wrong key or altered ciphertext
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Authentication failed - wrong key or corrupted data")]
pub struct AuthenticationFailed;

/// Nonce plus ciphertext-with-tag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext followed by the 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Serialize as `nonce ‖ ciphertext ‖ tag`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Split `nonce ‖ ciphertext ‖ tag`; `None` if too short to hold a tag
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return None;
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);
        Some(Self {
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Authenticated encryption with no associated data
pub struct AeadCodec;

impl AeadCodec {
    /// Encrypt under a freshly drawn nonce
    pub fn encrypt(key: &KeyMaterial, plaintext: &[u8]) -> Result<SealedPayload, CustodyError> {
        let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CustodyError::Crypto(format!("Encryption failed: {}", e)))?;

        Ok(SealedPayload {
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    /// Verify the tag and decrypt
    ///
    /// No plaintext is released unless the tag verifies.
    pub fn decrypt(
        key: &KeyMaterial,
        payload: &SealedPayload,
    ) -> Result<Zeroizing<Vec<u8>>, AuthenticationFailed> {
        let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
        let nonce = Nonce::from_slice(&payload.nonce);

        cipher
            .decrypt(nonce, payload.ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| AuthenticationFailed)
    }
}
