//! Hardware key store abstraction
//!
//! A hardware key store holds a device-bound secret that can be released
//! only on this machine. Backends are chosen from configuration
//! ([`HardwareBackend`]), never by sniffing the operating system at runtime:
//! - [`NoHardware`] for hosts without a key store
//! - [`Tpm2KeyStore`] for a TPM 2.0 sealed object unsealed via `tpm2-tools`
//!
//! Calls may block; backends that shell out must bound the call with a
//! timeout and report expiry as [`CredentialError::HardwareError`].

mod tpm2;

pub use tpm2::{Tpm2Config, Tpm2KeyStore};

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::config::HardwareBackend;
use crate::credential::KeyMaterial;
use crate::error::CredentialError;

/// Domain separator for reducing unsealed secrets to a shard key
pub const HARDWARE_KEY_DOMAIN: &[u8] = b"shardkeep hardware shard key v1";

/// Trait for platform key stores
pub trait HardwareKeyStore: Send + Sync {
    /// Backend name for logs and status output
    fn name(&self) -> &'static str;

    /// Whether the key store exists on this host
    ///
    /// Returning `false` makes the resolver fall through quietly; a present
    /// store that then fails to unseal is reported as a fault.
    fn is_present(&self) -> bool;

    /// Release the device-bound key
    fn derive_key(&self) -> Result<KeyMaterial, CredentialError>;
}

/// Host without a hardware key store
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHardware;

impl HardwareKeyStore for NoHardware {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_present(&self) -> bool {
        false
    }

    fn derive_key(&self) -> Result<KeyMaterial, CredentialError> {
        Err(CredentialError::Unavailable)
    }
}

/// Build the key store selected by configuration
pub fn from_backend(backend: &HardwareBackend) -> Box<dyn HardwareKeyStore> {
    match backend {
        HardwareBackend::None => Box::new(NoHardware),
        HardwareBackend::Tpm2(config) => Box::new(Tpm2KeyStore::new(config.clone())),
    }
}

/// Reduce an unsealed secret to a 256-bit key with domain separation
///
/// The input buffer is zeroized before returning.
pub(crate) fn key_from_unsealed(mut secret: Vec<u8>) -> Result<KeyMaterial, CredentialError> {
    if secret.len() < crate::KEY_SIZE {
        let len = secret.len();
        secret.zeroize();
        return Err(CredentialError::HardwareError(format!(
            "unsealed secret too short ({} bytes, need {})",
            len,
            crate::KEY_SIZE
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(HARDWARE_KEY_DOMAIN);
    hasher.update(&secret);
    secret.zeroize();

    let mut digest: [u8; 32] = hasher.finalize().into();
    let key = KeyMaterial::from_bytes(digest);
    digest.zeroize();
    Ok(key)
}
