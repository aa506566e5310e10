//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shardkeep_core::{
    BiometricPrompt, CredentialError, CredentialResolver, CustodyConfig, HardwareKeyStore,
    KdfParams, KeyMaterial, ShardCustodian,
};
use zeroize::Zeroizing;

pub const FAST_KDF: KdfParams = KdfParams {
    memory_kib: 1024,
    iterations: 1,
    parallelism: 1,
};

pub fn fast_config(dir: &Path) -> CustodyConfig {
    CustodyConfig {
        kdf: FAST_KDF,
        biometric_enabled: true,
        ..CustodyConfig::with_data_dir(dir)
    }
}

/// Hardware key store returning a fixed key
pub struct FixedHardware(pub [u8; 32]);

impl HardwareKeyStore for FixedHardware {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn is_present(&self) -> bool {
        true
    }

    fn derive_key(&self) -> Result<KeyMaterial, CredentialError> {
        Ok(KeyMaterial::from_bytes(self.0))
    }
}

/// Hardware key store that is present but always faults
pub struct FaultyHardware;

impl HardwareKeyStore for FaultyHardware {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn is_present(&self) -> bool {
        true
    }

    fn derive_key(&self) -> Result<KeyMaterial, CredentialError> {
        Err(CredentialError::HardwareError("enclave timeout".to_string()))
    }
}

/// Prompt that answers with a fixed passphrase and counts invocations
pub struct ScriptedPrompt {
    pub answer: Option<String>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedPrompt {
    pub fn new(answer: Option<&str>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                answer: answer.map(str::to_string),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl BiometricPrompt for ScriptedPrompt {
    fn prompt(&self) -> Result<Option<Zeroizing<String>>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone().map(Zeroizing::new))
    }
}

/// Passphrase-only custodian
pub fn passphrase_custodian(dir: &Path) -> ShardCustodian {
    let config = fast_config(dir);
    let resolver = CredentialResolver::new(Box::new(shardkeep_core::NoHardware), config.kdf);
    ShardCustodian::with_resolver(config, resolver).unwrap()
}

/// Custodian backed by a hardware store
pub fn hardware_custodian(dir: &Path, hardware: Box<dyn HardwareKeyStore>) -> ShardCustodian {
    let config = fast_config(dir);
    let resolver = CredentialResolver::new(hardware, config.kdf);
    ShardCustodian::with_resolver(config, resolver).unwrap()
}
