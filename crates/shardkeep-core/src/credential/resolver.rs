//! Ordered credential resolution

use tracing::{debug, info, warn};

use super::{BiometricPrompt, CredentialSource, KeyMaterial, ResolvedKey, Salt};
use crate::blob::BlobSealing;
use crate::config::KdfParams;
use crate::error::CredentialError;
use crate::hardware::HardwareKeyStore;
use crate::kdf::derive_passphrase_key;

/// Turns whatever credential this host can offer into key material
pub struct CredentialResolver {
    hardware: Box<dyn HardwareKeyStore>,
    biometric: Option<Box<dyn BiometricPrompt>>,
    kdf: KdfParams,
}

impl CredentialResolver {
    /// Create a resolver with a hardware backend and no biometric prompt
    pub fn new(hardware: Box<dyn HardwareKeyStore>, kdf: KdfParams) -> Self {
        Self {
            hardware,
            biometric: None,
            kdf,
        }
    }

    /// Attach a biometric prompt as the last-resort source
    pub fn with_biometric(mut self, prompt: Box<dyn BiometricPrompt>) -> Self {
        self.biometric = Some(prompt);
        self
    }

    /// Name of the configured hardware backend
    pub fn hardware_name(&self) -> &'static str {
        self.hardware.name()
    }

    /// Resolve a key for sealing, probing every source in priority order
    ///
    /// `salt` is only consumed when a passphrase-based source wins.
    pub fn resolve(
        &self,
        passphrase: Option<&str>,
        salt: &Salt,
    ) -> Result<ResolvedKey, CredentialError> {
        self.resolve_in_order(&CredentialSource::PRIORITY, passphrase, salt)
    }

    /// Resolve a key able to reopen a blob with the given sealing
    ///
    /// A hardware-sealed blob can only be reopened by the hardware key
    /// store; a passphrase-sealed blob by the passphrase or the prompt.
    pub fn resolve_for(
        &self,
        sealing: &BlobSealing,
        passphrase: Option<&str>,
    ) -> Result<ResolvedKey, CredentialError> {
        match sealing {
            BlobSealing::Hardware => self.resolve_in_order(
                &[CredentialSource::HardwareEnclave],
                passphrase,
                // Unused on the hardware path
                &Salt::from_bytes([0u8; crate::SALT_SIZE]),
            ),
            BlobSealing::Passphrase(salt) => self.resolve_in_order(
                &[
                    CredentialSource::PassphraseDerived,
                    CredentialSource::BiometricFallback,
                ],
                passphrase,
                salt,
            ),
        }
    }

    fn resolve_in_order(
        &self,
        order: &[CredentialSource],
        passphrase: Option<&str>,
        salt: &Salt,
    ) -> Result<ResolvedKey, CredentialError> {
        let mut last_fault: Option<String> = None;

        for &source in order {
            match self.probe(source, passphrase, salt) {
                Ok(key) => {
                    info!(%source, "credential resolved");
                    return Ok(ResolvedKey { source, key });
                }
                Err(CredentialError::Unavailable) => {
                    debug!(%source, "credential source unavailable");
                }
                Err(CredentialError::HardwareError(msg)) => {
                    warn!(%source, error = %msg, "credential source faulted, falling back");
                    last_fault = Some(msg);
                }
                Err(e @ CredentialError::KeyDerivation(_)) => return Err(e),
            }
        }

        Err(match last_fault {
            Some(msg) => CredentialError::HardwareError(msg),
            None => CredentialError::Unavailable,
        })
    }

    fn probe(
        &self,
        source: CredentialSource,
        passphrase: Option<&str>,
        salt: &Salt,
    ) -> Result<KeyMaterial, CredentialError> {
        match source {
            CredentialSource::HardwareEnclave => {
                if !self.hardware.is_present() {
                    return Err(CredentialError::Unavailable);
                }
                self.hardware.derive_key().map_err(|e| match e {
                    CredentialError::Unavailable => CredentialError::Unavailable,
                    other => CredentialError::HardwareError(other.to_string()),
                })
            }
            CredentialSource::PassphraseDerived => match passphrase {
                Some(passphrase) if !passphrase.is_empty() => {
                    derive_passphrase_key(passphrase.as_bytes(), salt, &self.kdf)
                }
                _ => Err(CredentialError::Unavailable),
            },
            CredentialSource::BiometricFallback => {
                let prompt = self
                    .biometric
                    .as_ref()
                    .ok_or(CredentialError::Unavailable)?;
                match prompt.prompt()? {
                    Some(entered) if !entered.is_empty() => {
                        derive_passphrase_key(entered.as_bytes(), salt, &self.kdf)
                    }
                    _ => Err(CredentialError::Unavailable),
                }
            }
        }
    }
}
