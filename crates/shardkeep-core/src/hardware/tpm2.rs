//! TPM 2.0 key store backed by `tpm2_unseal`
//!
//! The shard key is sealed into a persistent TPM object at provisioning
//! time. At runtime the object is unsealed with `tpm2_unseal -c <handle>`
//! and the released bytes are reduced to a 256-bit key. Shell integration
//! is kept to this file so the rest of the crate can be tested with
//! in-memory key stores.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroize;

use super::{key_from_unsealed, HardwareKeyStore};
use crate::credential::KeyMaterial;
use crate::error::CredentialError;

/// TPM backend settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tpm2Config {
    /// Device node whose presence signals an available TPM
    pub device: PathBuf,
    /// `tpm2_unseal` binary (resolved through PATH when relative)
    pub unseal_binary: PathBuf,
    /// Persistent handle of the sealed object
    pub handle: String,
    /// Hard limit on the unseal call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for Tpm2Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/tpmrm0"),
            unseal_binary: PathBuf::from("tpm2_unseal"),
            handle: "0x81010001".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// TPM 2.0 key store
#[derive(Clone, Debug)]
pub struct Tpm2KeyStore {
    config: Tpm2Config,
}

impl Tpm2KeyStore {
    pub fn new(config: Tpm2Config) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn unseal(&self) -> Result<Vec<u8>, CredentialError> {
        let deadline = Instant::now() + self.timeout();
        let binary = &self.config.unseal_binary;
        let mut child = Command::new(binary)
            .args(["-c", self.config.handle.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CredentialError::HardwareError(format!(
                    "failed to launch {}: {}",
                    binary.display(),
                    e
                ))
            })?;

        let stdout_rx = spawn_output_reader(child.stdout.take());
        let stderr_rx = spawn_output_reader(child.stderr.take());

        let status = self.wait_until(&mut child, deadline)?;

        // A forked helper can hold the pipes open after the child exits, so
        // output collection shares the same deadline
        let mut stdout = self.recv_output(&stdout_rx, deadline, "stdout")?;
        let stderr = match self.recv_output(&stderr_rx, deadline, "stderr") {
            Ok(stderr) => stderr,
            Err(e) => {
                stdout.zeroize();
                return Err(e);
            }
        };

        if !status.success() {
            stdout.zeroize();
            return Err(CredentialError::HardwareError(format!(
                "{} exited with {}: {}",
                binary.display(),
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        Ok(stdout)
    }

    fn wait_until(
        &self,
        child: &mut Child,
        deadline: Instant,
    ) -> Result<ExitStatus, CredentialError> {
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => thread::sleep(Duration::from_millis(25)),
                Err(e) => {
                    return Err(CredentialError::HardwareError(format!(
                        "failed to wait for unseal: {}",
                        e
                    )))
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
        Err(self.timed_out("process"))
    }

    fn recv_output(
        &self,
        rx: &mpsc::Receiver<ReaderResult>,
        deadline: Instant,
        stream: &str,
    ) -> Result<Vec<u8>, CredentialError> {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(e)) => Err(CredentialError::HardwareError(format!(
                "failed to read unseal {}: {}",
                stream, e
            ))),
            Err(RecvTimeoutError::Timeout) => Err(self.timed_out(stream)),
            Err(RecvTimeoutError::Disconnected) => Err(CredentialError::HardwareError(format!(
                "{} reader thread panicked",
                stream
            ))),
        }
    }

    fn timed_out(&self, what: &str) -> CredentialError {
        CredentialError::HardwareError(format!(
            "{} {} timed out after {:?}",
            self.config.unseal_binary.display(),
            what,
            self.timeout()
        ))
    }
}

impl HardwareKeyStore for Tpm2KeyStore {
    fn name(&self) -> &'static str {
        "tpm2"
    }

    fn is_present(&self) -> bool {
        let present = self.config.device.exists();
        debug!(device = %self.config.device.display(), present, "probed TPM device");
        present
    }

    fn derive_key(&self) -> Result<KeyMaterial, CredentialError> {
        let secret = self.unseal()?;
        key_from_unsealed(secret)
    }
}

type ReaderResult = std::io::Result<Vec<u8>>;

/// Drain a pipe on its own thread; the result arrives on the returned channel
fn spawn_output_reader<R>(pipe: Option<R>) -> mpsc::Receiver<ReaderResult>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = match pipe {
            Some(mut reader) => match reader.read_to_end(&mut buf) {
                Ok(_) => Ok(buf),
                Err(e) => {
                    buf.zeroize();
                    Err(e)
                }
            },
            None => Ok(buf),
        };
        // Receiver is gone once the deadline has passed
        if let Err(mpsc::SendError(Ok(mut unread))) = tx.send(result) {
            unread.zeroize();
        }
    });
    rx
}
