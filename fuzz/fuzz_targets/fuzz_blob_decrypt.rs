#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shardkeep_core::{AeadCodec, EncryptedBlob, KeyMaterial};

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 32],
    blob: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Arbitrary blobs must be rejected cleanly, never opened
    if let Ok(blob) = EncryptedBlob::from_bytes(&input.blob) {
        let key = KeyMaterial::from_bytes(input.key);
        assert!(AeadCodec::decrypt(&key, &blob.payload).is_err());
    }
});
