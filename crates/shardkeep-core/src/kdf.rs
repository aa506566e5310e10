//! Passphrase key derivation using Argon2id

use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::KdfParams;
use crate::credential::{KeyMaterial, Salt};
use crate::error::CredentialError;
use crate::KEY_SIZE;

/// Derive a 256-bit key from a passphrase and the installation salt
///
/// Deterministic: the same passphrase, salt, and parameters always yield
/// the same key.
pub fn derive_passphrase_key(
    passphrase: &[u8],
    salt: &Salt,
    params: &KdfParams,
) -> Result<KeyMaterial, CredentialError> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CredentialError::KeyDerivation(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = KeyMaterial::zeroed();
    argon2
        .hash_password_into(passphrase, salt.as_bytes(), key.as_mut_bytes())
        .map_err(|e| CredentialError::KeyDerivation(e.to_string()))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = Salt::from_bytes([0x42; 32]);
        let key1 = derive_passphrase_key(b"correct-horse", &salt, &fast_params()).unwrap();
        let key2 = derive_passphrase_key(b"correct-horse", &salt, &fast_params()).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        // Different passphrase gives different key
        let key3 = derive_passphrase_key(b"wrong-pass", &salt, &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());
    }

    #[test]
    fn test_salt_changes_key() {
        let key1 =
            derive_passphrase_key(b"pass", &Salt::from_bytes([1; 32]), &fast_params()).unwrap();
        let key2 =
            derive_passphrase_key(b"pass", &Salt::from_bytes([2; 32]), &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = KdfParams {
            memory_kib: 1024,
            iterations: 0,
            parallelism: 1,
        };
        let result = derive_passphrase_key(b"pass", &Salt::from_bytes([0; 32]), &params);
        assert!(matches!(result, Err(CredentialError::KeyDerivation(_))));
    }
}
