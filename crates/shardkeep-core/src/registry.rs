//! Process-wide custodian registry
//!
//! Two custodians over the same blob file would each hold their own
//! attempt guard, so callers that may open a shard more than once go
//! through the registry and share one handle per blob path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{CustodyConfig, BLOB_FILE};
use crate::credential::CredentialResolver;
use crate::custodian::{BootReport, CustodyStatus, ShardCustodian};
use crate::error::Result;

/// Cloneable, thread-safe handle to one [`ShardCustodian`]
#[derive(Clone)]
pub struct SharedCustodian {
    inner: Arc<Mutex<ShardCustodian>>,
}

impl SharedCustodian {
    pub fn new(custodian: ShardCustodian) -> Self {
        Self {
            inner: Arc::new(Mutex::new(custodian)),
        }
    }

    /// Lock the custodian for a sequence of operations
    pub fn lock(&self) -> MutexGuard<'_, ShardCustodian> {
        // Blob writes are atomic, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn secure_boot(&self, passphrase: Option<&str>) -> Result<BootReport> {
        self.lock().secure_boot(passphrase)
    }

    pub fn encrypt_state(&self, data: &[u8], passphrase: Option<&str>) -> Result<()> {
        self.lock().encrypt_state(data, passphrase)
    }

    pub fn decrypt_state(&self, passphrase: Option<&str>) -> Result<Zeroizing<Vec<u8>>> {
        self.lock().decrypt_state(passphrase)
    }

    pub fn rotate_passphrase(&self, current: &str, new: &str) -> Result<()> {
        self.lock().rotate_passphrase(current, new)
    }

    pub fn destroy_shard(&self) -> Result<()> {
        self.lock().destroy_shard()
    }

    pub fn status(&self) -> Result<CustodyStatus> {
        self.lock().status()
    }

    /// Whether two handles refer to the same custodian
    pub fn same_custodian(&self, other: &SharedCustodian) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Maps blob paths to their single shared custodian
#[derive(Default)]
pub struct CustodianRegistry {
    shards: Mutex<HashMap<PathBuf, SharedCustodian>>,
}

impl CustodianRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or return the existing) custodian for `config.data_dir`
    pub fn open(&self, config: CustodyConfig) -> Result<SharedCustodian> {
        self.open_with(config, ShardCustodian::new)
    }

    /// Like [`open`](Self::open) but with an explicit resolver
    ///
    /// The resolver is only used when no custodian exists yet for the path.
    pub fn open_with_resolver(
        &self,
        config: CustodyConfig,
        resolver: CredentialResolver,
    ) -> Result<SharedCustodian> {
        self.open_with(config, move |config| {
            ShardCustodian::with_resolver(config, resolver)
        })
    }

    /// Number of distinct shards opened
    pub fn len(&self) -> usize {
        self.lock_shards().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn open_with<F>(&self, config: CustodyConfig, build: F) -> Result<SharedCustodian>
    where
        F: FnOnce(CustodyConfig) -> Result<ShardCustodian>,
    {
        std::fs::create_dir_all(&config.data_dir)?;
        let key = config.data_dir.canonicalize()?.join(BLOB_FILE);

        let mut shards = self.lock_shards();
        if let Some(existing) = shards.get(&key) {
            debug!(path = %key.display(), "reusing custodian");
            return Ok(existing.clone());
        }

        let shared = SharedCustodian::new(build(config)?);
        debug!(path = %key.display(), "registered custodian");
        shards.insert(key, shared.clone());
        Ok(shared)
    }

    fn lock_shards(&self) -> MutexGuard<'_, HashMap<PathBuf, SharedCustodian>> {
        self.shards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
