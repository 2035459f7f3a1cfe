//! Content hashes shared by artifacts, templates, and the dependency cache.

use base64::prelude::{BASE64_STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::path::Path;

/// sha256 of `bytes`, base64 encoded (the form stored as remote object metadata).
pub fn sha256_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(Sha256::digest(bytes))
}

/// Streaming sha256 of a file, base64 encoded.
pub fn file_sha256_base64(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(BASE64_STANDARD.encode(hasher.finalize()))
}

/// sha256 of `bytes`, lowercase hex (used for cache directory names).
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            sha256_base64(b"abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn file_hash_matches_bytes_hash() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"payload").unwrap();
        assert_eq!(
            file_sha256_base64(tmp.path()).unwrap(),
            sha256_base64(b"payload")
        );
    }
}
