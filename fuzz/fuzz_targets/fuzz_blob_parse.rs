#![no_main]

use libfuzzer_sys::fuzz_target;
use shardkeep_core::EncryptedBlob;

fuzz_target!(|data: &[u8]| {
    // Parsing must never panic; accepted input must re-serialize byte for byte
    if let Ok(blob) = EncryptedBlob::from_bytes(data) {
        assert_eq!(blob.to_bytes(), data);
        assert_eq!(blob.to_bytes()[0], blob.sealing.tag());
    }
});
