//! End-to-end custody workflow tests
//!
//! These tests drive a custodian through provisioning, legacy migration,
//! decrypts, lockout and re-provisioning against a real data directory.

mod common;

use std::collections::HashSet;
use std::fs;

use shardkeep_core::{
    BootStatus, CustodianRegistry, CustodyError, CustodyState, EncryptedBlob, Rejection,
};
use tempfile::tempdir;

use common::{fast_config, hardware_custodian, passphrase_custodian, FixedHardware};

#[test]
fn test_scenario_lattice_state() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());

    custodian
        .encrypt_state(b"lattice-state-v1", Some("correct-horse"))
        .unwrap();
    let state = custodian.decrypt_state(Some("correct-horse")).unwrap();
    assert_eq!(state.as_slice(), b"lattice-state-v1");

    let err = custodian.decrypt_state(Some("wrong-pass")).unwrap_err();
    assert!(matches!(err, CustodyError::InvalidCredential { .. }));
    assert_eq!(custodian.status().unwrap().attempts_remaining, 2);
}

#[test]
fn test_round_trip_various_payloads() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());

    let payloads: [&[u8]; 4] = [b"", b"x", &[0u8; 4096], "unicodé ✓".as_bytes()];
    for payload in payloads {
        custodian.encrypt_state(payload, Some("pass")).unwrap();
        assert_eq!(custodian.decrypt_state(Some("pass")).unwrap().as_slice(), payload);
    }
}

#[test]
fn test_state_survives_new_session() {
    let temp_dir = tempdir().unwrap();
    {
        let mut custodian = passphrase_custodian(temp_dir.path());
        custodian.encrypt_state(b"persisted", Some("pass")).unwrap();
    }

    let mut custodian = passphrase_custodian(temp_dir.path());
    assert_eq!(custodian.state(), CustodyState::Ready);
    assert_eq!(custodian.decrypt_state(Some("pass")).unwrap().as_slice(), b"persisted");
}

#[test]
fn test_nonce_uniqueness_across_encrypts() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = hardware_custodian(temp_dir.path(), Box::new(FixedHardware([7; 32])));
    let blob_path = custodian.config().blob_path();

    let mut nonces = HashSet::new();
    for _ in 0..10_000 {
        custodian.encrypt_state(b"same plaintext", None).unwrap();
        let blob = EncryptedBlob::from_bytes(&fs::read(&blob_path).unwrap()).unwrap();
        assert!(nonces.insert(blob.payload.nonce), "nonce reused");
    }
    assert_eq!(nonces.len(), 10_000);
}

#[test]
fn test_tamper_detection_every_byte() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = hardware_custodian(temp_dir.path(), Box::new(FixedHardware([9; 32])));
    custodian.encrypt_state(b"tamper-evident", None).unwrap();

    let blob_path = custodian.config().blob_path();
    let original = fs::read(&blob_path).unwrap();

    // Skip the format tag; flip one bit in every nonce, ciphertext and tag byte
    for i in 1..original.len() {
        let mut tampered = original.clone();
        tampered[i] ^= 0x01;
        fs::write(&blob_path, &tampered).unwrap();

        let mut session = hardware_custodian(temp_dir.path(), Box::new(FixedHardware([9; 32])));
        let err = session.decrypt_state(None).unwrap_err();
        assert!(
            matches!(
                err,
                CustodyError::InvalidCredential {
                    cause: Rejection::AuthenticationFailed,
                    ..
                }
            ),
            "byte {} accepted",
            i
        );
    }
}

#[test]
fn test_lockout_wipes_blob() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());
    custodian.encrypt_state(b"secret", Some("right")).unwrap();
    let blob_path = custodian.config().blob_path();

    for remaining in [2, 1] {
        match custodian.decrypt_state(Some("wrong")) {
            Err(CustodyError::InvalidCredential {
                attempts_remaining, ..
            }) => assert_eq!(attempts_remaining, remaining),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert!(blob_path.exists());
    }

    assert!(matches!(
        custodian.decrypt_state(Some("wrong")),
        Err(CustodyError::Wiped)
    ));
    assert!(!blob_path.exists());
    assert_eq!(custodian.state(), CustodyState::Wiped);

    // No further credential attempts, even with the right passphrase
    assert!(matches!(
        custodian.decrypt_state(Some("right")),
        Err(CustodyError::Wiped)
    ));

    // A fresh session finds nothing to open
    let mut next = passphrase_custodian(temp_dir.path());
    assert_eq!(next.state(), CustodyState::NoShard);
    assert!(matches!(
        next.decrypt_state(Some("right")),
        Err(CustodyError::NoShard)
    ));
}

#[test]
fn test_reprovision_after_wipe() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());
    custodian.encrypt_state(b"old", Some("right")).unwrap();
    for _ in 0..3 {
        let _ = custodian.decrypt_state(Some("wrong"));
    }
    assert_eq!(custodian.state(), CustodyState::Wiped);

    custodian.encrypt_state(b"new", Some("right")).unwrap();
    assert_eq!(custodian.state(), CustodyState::Ready);
    assert_eq!(custodian.decrypt_state(Some("right")).unwrap().as_slice(), b"new");
}

#[test]
fn test_guard_reset_on_success() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());
    custodian.encrypt_state(b"secret", Some("right")).unwrap();

    for _ in 0..2 {
        assert!(custodian.decrypt_state(Some("wrong")).is_err());
    }
    custodian.decrypt_state(Some("right")).unwrap();
    for _ in 0..2 {
        assert!(matches!(
            custodian.decrypt_state(Some("wrong")),
            Err(CustodyError::InvalidCredential { .. })
        ));
    }

    assert_eq!(custodian.state(), CustodyState::Ready);
    assert!(custodian.config().blob_path().exists());
}

#[test]
fn test_corrupt_blob_not_counted() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());
    custodian.encrypt_state(b"secret", Some("right")).unwrap();
    fs::write(custodian.config().blob_path(), [0xFF, 0x00, 0x01]).unwrap();

    for _ in 0..5 {
        assert!(matches!(
            custodian.decrypt_state(Some("right")),
            Err(CustodyError::CorruptBlob(_))
        ));
    }
    assert_eq!(custodian.status().unwrap().attempts_remaining, 3);
}

#[test]
fn test_legacy_migration_is_idempotent() {
    let temp_dir = tempdir().unwrap();
    let config = fast_config(temp_dir.path());
    fs::write(config.legacy_path(), b"legacy plaintext").unwrap();

    let mut custodian = passphrase_custodian(temp_dir.path());
    assert!(custodian.status().unwrap().legacy_pending);

    let first = custodian.secure_boot(Some("pass")).unwrap();
    assert!(first.migrated);
    assert!(first.to_string().starts_with("Legacy shard secured."));
    assert!(!config.legacy_path().exists());
    let blob_after_first = fs::read(config.blob_path()).unwrap();
    match first.status {
        BootStatus::Restored(state) => assert_eq!(state.as_slice(), b"legacy plaintext"),
        other => panic!("unexpected boot status: {:?}", other),
    }

    let second = custodian.secure_boot(Some("pass")).unwrap();
    assert!(!second.migrated);
    assert!(!config.legacy_path().exists());
    assert_eq!(fs::read(config.blob_path()).unwrap(), blob_after_first);
    assert_eq!(
        second.into_state().unwrap().as_slice(),
        b"legacy plaintext"
    );
}

#[test]
fn test_failed_migration_keeps_legacy_file() {
    let temp_dir = tempdir().unwrap();
    let config = fast_config(temp_dir.path());
    fs::write(config.legacy_path(), b"legacy plaintext").unwrap();

    let mut custodian = passphrase_custodian(temp_dir.path());
    assert!(custodian.secure_boot(None).is_err());
    assert!(config.legacy_path().exists());
    assert_eq!(custodian.state(), CustodyState::NoShard);
}

#[test]
fn test_boot_without_shard() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());

    let report = custodian.secure_boot(Some("pass")).unwrap();
    assert!(!report.migrated);
    assert!(matches!(report.status, BootStatus::Empty));
    assert_eq!(report.to_string(), "No shard provisioned.");
}

#[test]
fn test_boot_reports_rejection() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());
    custodian.encrypt_state(b"secret", Some("right")).unwrap();

    let report = custodian.secure_boot(Some("wrong")).unwrap();
    assert!(matches!(
        report.status,
        BootStatus::Rejected {
            cause: Rejection::AuthenticationFailed,
            attempts_remaining: 2
        }
    ));
}

#[test]
fn test_rotation_then_reopen() {
    let temp_dir = tempdir().unwrap();
    {
        let mut custodian = passphrase_custodian(temp_dir.path());
        custodian.encrypt_state(b"rotating", Some("first")).unwrap();
        custodian.rotate_passphrase("first", "second").unwrap();
    }

    let mut custodian = passphrase_custodian(temp_dir.path());
    assert_eq!(custodian.decrypt_state(Some("second")).unwrap().as_slice(), b"rotating");
}

#[test]
fn test_rotation_rejected_for_hardware_blob() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = hardware_custodian(temp_dir.path(), Box::new(FixedHardware([1; 32])));
    custodian.encrypt_state(b"hw", None).unwrap();

    assert!(matches!(
        custodian.rotate_passphrase("a", "b"),
        Err(CustodyError::NotPassphraseSealed)
    ));
}

#[test]
fn test_destroy_removes_everything() {
    let temp_dir = tempdir().unwrap();
    let mut custodian = passphrase_custodian(temp_dir.path());
    custodian.encrypt_state(b"secret", Some("pass")).unwrap();
    fs::write(custodian.config().legacy_path(), b"stale").unwrap();

    custodian.destroy_shard().unwrap();
    assert!(!custodian.config().blob_path().exists());
    assert!(!custodian.config().legacy_path().exists());

    let status = custodian.status().unwrap();
    assert_eq!(status.state, CustodyState::NoShard);
    assert!(status.sealing.is_none());
}

#[test]
fn test_registry_shares_guard_across_handles() {
    let temp_dir = tempdir().unwrap();
    let registry = CustodianRegistry::new();

    let first = registry.open(fast_config(temp_dir.path())).unwrap();
    let second = registry.open(fast_config(temp_dir.path())).unwrap();
    assert!(first.same_custodian(&second));

    first.encrypt_state(b"shared", Some("pass")).unwrap();
    let _ = first.decrypt_state(Some("bad"));
    let _ = second.decrypt_state(Some("bad"));
    assert!(matches!(
        second.decrypt_state(Some("bad")),
        Err(CustodyError::Wiped)
    ));
    assert!(matches!(
        first.decrypt_state(Some("pass")),
        Err(CustodyError::Wiped)
    ));
}

#[test]
fn test_registry_handles_work_across_threads() {
    let temp_dir = tempdir().unwrap();
    let registry = CustodianRegistry::new();
    let shared = registry.open(fast_config(temp_dir.path())).unwrap();
    shared.encrypt_state(b"threaded", Some("pass")).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            std::thread::spawn(move || shared.decrypt_state(Some("pass")).unwrap().to_vec())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), b"threaded");
    }
}
