//! Exact content checksums (BLAKE3).

use crate::error::HashError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Exact fingerprint of a file's bytes; equal checksums mean equal content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Digest an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Stream a file through the digest without loading it whole
    pub fn of_file(path: &Path) -> Result<Self, HashError> {
        let io_error = |e| HashError::IoError {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::open(path).map_err(io_error)?;
        let mut reader = BufReader::new(file);
        let mut hasher = blake3::Hasher::new();

        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer).map_err(io_error)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    /// Wrap a stored hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn equal_bytes_equal_checksums() {
        assert_eq!(Checksum::of_bytes(b"cat"), Checksum::of_bytes(b"cat"));
        assert_ne!(Checksum::of_bytes(b"cat"), Checksum::of_bytes(b"dog"));
    }

    #[test]
    fn file_and_buffer_agree() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.bin");
        let payload = vec![7u8; 200_000];
        std::fs::write(&path, &payload).unwrap();

        assert_eq!(Checksum::of_file(&path).unwrap(), Checksum::of_bytes(&payload));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Checksum::of_file(Path::new("/nonexistent/blob.bin"));
        assert!(matches!(result, Err(HashError::IoError { .. })));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let checksum = Checksum::of_bytes(b"");
        assert_eq!(checksum.as_str().len(), 64);
        assert!(checksum.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
