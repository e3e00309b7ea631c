//! Content fingerprinting for change detection.
//!
//! A song's fingerprint is the SHA-256 of its full file contents. The
//! reconciler compares it against the stored hash to decide whether a
//! metadata refresh can be skipped; it is never recomputed outside of
//! reconciliation.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Compute the content fingerprint of a file.
///
/// # Returns
///
/// SHA-256 hash as a lowercase hex string (64 characters).
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hash_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"some audio bytes").unwrap();

        let first = hash_file(&path).unwrap();
        let second = hash_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64); // SHA-256 hex
    }

    #[test]
    fn test_hash_differs_for_different_content() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.mp3");
        std::fs::write(&a, b"content A").unwrap();
        std::fs::write(&b, b"content B").unwrap();

        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn test_hash_changes_when_file_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"before").unwrap();
        let before = hash_file(&path).unwrap();

        std::fs::write(&path, b"after").unwrap();
        let after = hash_file(&path).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_hash_missing_file_is_error() {
        let result = hash_file(Path::new("/nonexistent/file.mp3"));
        assert!(result.is_err());
    }
}
