//! Shard custodian: the only entry point external callers use
//!
//! One custodian owns one blob file and one attempt guard. Lifecycle:
//!
//! ```text
//! NoShard ──(legacy file)──> Migrating ──> Ready
//! NoShard ──(blob exists / encrypt_state)──────> Ready
//! any     ──(guard threshold reached)──────────> Wiped ──(encrypt_state)──> Ready
//! ```
//!
//! Every failed decrypt advances the attempt guard, whether the resolver
//! produced no key (no credential, hardware fault) or the key did not
//! authenticate. Corrupt blobs and IO errors are not evidence of a bad
//! credential and are never counted.

use std::fmt;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::aead::AeadCodec;
use crate::blob::{BlobSealing, EncryptedBlob};
use crate::config::CustodyConfig;
use crate::credential::{BiometricPrompt, CredentialResolver, ResolvedKey, Salt};
use crate::error::{CredentialError, CustodyError, Rejection, Result};
use crate::guard::AttemptGuard;
use crate::hardware;
use crate::storage;

/// Custodian lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustodyState {
    /// No encrypted blob on disk
    NoShard,
    /// Legacy plaintext is being sealed
    Migrating,
    /// Encrypted blob present and accepting decrypts
    Ready,
    /// Blob destroyed by the attempt guard
    Wiped,
}

impl fmt::Display for CustodyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustodyState::NoShard => write!(f, "no shard"),
            CustodyState::Migrating => write!(f, "migrating"),
            CustodyState::Ready => write!(f, "ready"),
            CustodyState::Wiped => write!(f, "wiped"),
        }
    }
}

/// Outcome of the decrypt step of [`ShardCustodian::secure_boot`]
pub enum BootStatus {
    /// Shard decrypted; holds the plaintext state
    Restored(Zeroizing<Vec<u8>>),
    /// Nothing to restore
    Empty,
    /// Credential rejected; caller may retry
    Rejected {
        cause: Rejection,
        attempts_remaining: u32,
    },
    /// Shard destroyed
    Wiped,
}

impl fmt::Debug for BootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootStatus::Restored(state) => write!(f, "Restored([{} bytes])", state.len()),
            BootStatus::Empty => write!(f, "Empty"),
            BootStatus::Rejected {
                cause,
                attempts_remaining,
            } => f
                .debug_struct("Rejected")
                .field("cause", cause)
                .field("attempts_remaining", attempts_remaining)
                .finish(),
            BootStatus::Wiped => write!(f, "Wiped"),
        }
    }
}

/// Result of [`ShardCustodian::secure_boot`]
#[derive(Debug)]
pub struct BootReport {
    /// Whether a legacy plaintext file was sealed and destroyed
    pub migrated: bool,
    pub status: BootStatus,
}

impl BootReport {
    /// Take the restored state, if any
    pub fn into_state(self) -> Option<Zeroizing<Vec<u8>>> {
        match self.status {
            BootStatus::Restored(state) => Some(state),
            _ => None,
        }
    }
}

impl fmt::Display for BootReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.migrated {
            write!(f, "Legacy shard secured. ")?;
        }
        match &self.status {
            BootStatus::Restored(_) => write!(f, "Shard decrypted - state restored."),
            BootStatus::Empty => write!(f, "No shard provisioned."),
            BootStatus::Rejected {
                cause,
                attempts_remaining,
            } => write!(
                f,
                "Shard locked - {} ({} attempts remaining).",
                cause, attempts_remaining
            ),
            BootStatus::Wiped => write!(f, "Shard wiped - re-provision required."),
        }
    }
}

/// Snapshot for status displays; carries no key or plaintext material
#[derive(Clone, Debug)]
pub struct CustodyStatus {
    pub state: CustodyState,
    /// "hardware" or "passphrase" when a readable blob exists
    pub sealing: Option<&'static str>,
    /// Fingerprint of the stored salt (passphrase-sealed only)
    pub salt_fingerprint: Option<String>,
    pub attempts_remaining: u32,
    pub hardware_backend: &'static str,
    pub legacy_pending: bool,
}

enum Attempt {
    Opened(Zeroizing<Vec<u8>>),
    Rejected(Rejection),
}

/// Owner of one encrypted shard
pub struct ShardCustodian {
    config: CustodyConfig,
    resolver: CredentialResolver,
    guard: AttemptGuard,
    state: CustodyState,
}

impl ShardCustodian {
    /// Create a custodian using the configured hardware backend
    pub fn new(config: CustodyConfig) -> Result<Self> {
        let resolver =
            CredentialResolver::new(hardware::from_backend(&config.hardware), config.kdf);
        Self::with_resolver(config, resolver)
    }

    /// Create a custodian with an explicit resolver
    pub fn with_resolver(config: CustodyConfig, resolver: CredentialResolver) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let state = if config.blob_path().exists() {
            CustodyState::Ready
        } else {
            CustodyState::NoShard
        };

        debug!(
            data_dir = %config.data_dir.display(),
            hardware = resolver.hardware_name(),
            %state,
            "custodian opened"
        );

        Ok(Self {
            guard: AttemptGuard::new(config.lockout_threshold),
            config,
            resolver,
            state,
        })
    }

    /// Attach the biometric prompt; ignored unless enabled in configuration
    pub fn with_biometric_prompt(mut self, prompt: Box<dyn BiometricPrompt>) -> Self {
        if self.config.biometric_enabled {
            self.resolver = self.resolver.with_biometric(prompt);
        } else {
            debug!("biometric prompt disabled by configuration");
        }
        self
    }

    pub fn state(&self) -> CustodyState {
        self.state
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    /// Migrate any legacy plaintext, then try to restore the shard
    ///
    /// Only IO errors and failures to seal legacy data are returned as
    /// `Err`; credential outcomes are reported in the [`BootReport`].
    pub fn secure_boot(&mut self, passphrase: Option<&str>) -> Result<BootReport> {
        let migrated = self.migrate_legacy(passphrase)?;

        if self.state == CustodyState::NoShard {
            info!("secure boot: no shard provisioned");
            return Ok(BootReport {
                migrated,
                status: BootStatus::Empty,
            });
        }

        let status = match self.decrypt_state(passphrase) {
            Ok(state) => BootStatus::Restored(state),
            Err(CustodyError::InvalidCredential {
                cause,
                attempts_remaining,
            }) => BootStatus::Rejected {
                cause,
                attempts_remaining,
            },
            Err(CustodyError::Wiped) => BootStatus::Wiped,
            Err(CustodyError::NoShard) => BootStatus::Empty,
            Err(e) => return Err(e),
        };

        let report = BootReport { migrated, status };
        info!(%report, "secure boot complete");
        Ok(report)
    }

    /// Seal `data` and atomically replace the blob
    ///
    /// A passphrase-sealed blob keeps its salt across re-encrypts.
    pub fn encrypt_state(&mut self, data: &[u8], passphrase: Option<&str>) -> Result<()> {
        let salt = self
            .read_blob_lenient()?
            .and_then(|blob| blob.sealing.salt().copied())
            .unwrap_or_else(Salt::generate);

        let resolved = self.resolver.resolve(passphrase, &salt)?;
        self.seal(data, resolved, salt)
    }

    /// Open the blob with the presented credential
    pub fn decrypt_state(&mut self, passphrase: Option<&str>) -> Result<Zeroizing<Vec<u8>>> {
        if self.state == CustodyState::Wiped || self.guard.should_wipe() {
            return Err(CustodyError::Wiped);
        }

        let bytes = match storage::read_if_exists(&self.config.blob_path())? {
            Some(bytes) => bytes,
            None => {
                self.state = CustodyState::NoShard;
                return Err(CustodyError::NoShard);
            }
        };
        let blob = EncryptedBlob::from_bytes(&bytes)?;

        match self.attempt_open(&blob, passphrase)? {
            Attempt::Opened(plaintext) => {
                self.guard.record_result(true);
                self.state = CustodyState::Ready;
                debug!(sealing = blob.sealing.label(), "shard decrypted");
                Ok(plaintext)
            }
            Attempt::Rejected(cause) => Err(self.reject(cause)),
        }
    }

    /// Re-seal under a new passphrase and a freshly generated salt
    ///
    /// The current passphrase is checked like any decrypt, so wrong guesses
    /// count towards the wipe threshold.
    pub fn rotate_passphrase(&mut self, current: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(CredentialError::Unavailable.into());
        }
        if let Some(blob) = self.read_blob_lenient()? {
            if blob.sealing == BlobSealing::Hardware {
                return Err(CustodyError::NotPassphraseSealed);
            }
        }

        let plaintext = self.decrypt_state(Some(current))?;

        let salt = Salt::generate();
        let resolved = self
            .resolver
            .resolve_for(&BlobSealing::Passphrase(salt), Some(new))?;
        self.seal(&plaintext, resolved, salt)?;

        info!(salt = %salt.fingerprint(), "passphrase rotated");
        Ok(())
    }

    /// Irreversibly destroy the blob and any legacy plaintext
    pub fn destroy_shard(&mut self) -> Result<()> {
        let blob_path = self.config.blob_path();
        storage::secure_destroy(&storage::temp_path(&blob_path))?;
        let had_blob = storage::secure_destroy(&blob_path)?;
        let had_legacy = storage::secure_destroy(&self.config.legacy_path())?;

        self.guard.rearm();
        self.state = CustodyState::NoShard;
        warn!(had_blob, had_legacy, "shard destroyed on request");
        Ok(())
    }

    /// Current status snapshot
    pub fn status(&self) -> Result<CustodyStatus> {
        let blob = self.read_blob_lenient()?;
        Ok(CustodyStatus {
            state: self.state,
            sealing: blob.as_ref().map(|b| b.sealing.label()),
            salt_fingerprint: blob
                .as_ref()
                .and_then(|b| b.sealing.salt().map(Salt::fingerprint)),
            attempts_remaining: self.guard.attempts_remaining(),
            hardware_backend: self.resolver.hardware_name(),
            legacy_pending: self.config.legacy_path().exists(),
        })
    }

    fn migrate_legacy(&mut self, passphrase: Option<&str>) -> Result<bool> {
        let legacy_path = self.config.legacy_path();
        let plaintext = match storage::read_if_exists(&legacy_path)? {
            Some(bytes) => Zeroizing::new(bytes),
            None => return Ok(false),
        };

        info!(path = %legacy_path.display(), "migrating legacy plaintext shard");
        let previous = self.state;
        self.state = CustodyState::Migrating;

        if let Err(e) = self.encrypt_state(&plaintext, passphrase) {
            warn!(error = %e, "legacy migration failed, plaintext left in place");
            self.state = previous;
            return Err(e);
        }

        storage::secure_destroy(&legacy_path)?;
        info!("legacy shard secured and plaintext destroyed");
        Ok(true)
    }

    fn seal(&mut self, data: &[u8], resolved: ResolvedKey, salt: Salt) -> Result<()> {
        let payload = AeadCodec::encrypt(&resolved.key, data)?;
        let sealing = BlobSealing::for_source(resolved.source, salt);
        drop(resolved);

        let blob = EncryptedBlob::new(sealing, payload);
        storage::write_atomic(&self.config.blob_path(), &blob.to_bytes())?;

        self.guard.rearm();
        self.state = CustodyState::Ready;
        info!(sealing = sealing.label(), bytes = data.len(), "shard sealed");
        Ok(())
    }

    fn attempt_open(&self, blob: &EncryptedBlob, passphrase: Option<&str>) -> Result<Attempt> {
        let resolved = match self.resolver.resolve_for(&blob.sealing, passphrase) {
            Ok(resolved) => resolved,
            Err(CredentialError::Unavailable) => {
                return Ok(Attempt::Rejected(Rejection::Unavailable))
            }
            Err(CredentialError::HardwareError(msg)) => {
                debug!(error = %msg, "hardware key store faulted");
                return Ok(Attempt::Rejected(Rejection::HardwareFault));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match AeadCodec::decrypt(&resolved.key, &blob.payload) {
            Ok(plaintext) => Attempt::Opened(plaintext),
            Err(_) => {
                debug!(source = %resolved.source, "authentication failed");
                Attempt::Rejected(Rejection::AuthenticationFailed)
            }
        })
    }

    fn reject(&mut self, cause: Rejection) -> CustodyError {
        self.guard.record_result(false);
        if !self.guard.should_wipe() {
            let attempts_remaining = self.guard.attempts_remaining();
            warn!(%cause, attempts_remaining, "decrypt attempt failed");
            return CustodyError::InvalidCredential {
                cause,
                attempts_remaining,
            };
        }

        warn!(
            threshold = self.guard.threshold(),
            "attempt threshold reached, destroying shard"
        );
        self.state = CustodyState::Wiped;
        let blob_path = self.config.blob_path();
        let wiped = storage::secure_destroy(&storage::temp_path(&blob_path))
            .and_then(|_| storage::secure_destroy(&blob_path));
        match wiped {
            Ok(_) => CustodyError::Wiped,
            Err(e) => CustodyError::Io(e),
        }
    }

    /// Read and parse the blob; IO errors propagate, corrupt contents
    /// read as absent
    fn read_blob_lenient(&self) -> Result<Option<EncryptedBlob>> {
        let bytes = match storage::read_if_exists(&self.config.blob_path())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        match EncryptedBlob::from_bytes(&bytes) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable blob");
                Ok(None)
            }
        }
    }
}
