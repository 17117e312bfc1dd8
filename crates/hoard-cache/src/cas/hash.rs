//! Content hashing utilities using Blake3
//!
//! This module provides the ContentHash type chunks are keyed by, and the
//! CasAddr projection of it that the lookup table and the journal store.

use blake3::Hasher;
use hoard_core::error::HoardError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A Blake3 content hash identifying a chunk's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    /// The raw hash bytes (32 bytes for Blake3)
    bytes: [u8; 32],
}

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Create a new ContentHash from a Vec<u8>
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self, HoardError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| HoardError::InvalidHash {
            expected: "32 bytes".to_string(),
            actual: format!("{} bytes", v.len()),
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Convert hash to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Create ContentHash from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, HoardError> {
        let bytes = hex::decode(hex_str).map_err(|e| HoardError::InvalidHash {
            expected: "valid hex string".to_string(),
            actual: format!("invalid hex: {}", e),
        })?;
        Self::from_vec(bytes)
    }

    /// Lookup key for this hash
    pub fn cas_addr(&self) -> CasAddr {
        CasAddr::from_hash(self)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// 96-bit lookup key: the leading 12 bytes of a [`ContentHash`].
///
/// Fixed-size so a chunk location fits a 24-byte journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CasAddr([u8; 12]);

impl CasAddr {
    pub const SIZE: usize = 12;

    pub fn new(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn from_hash(hash: &ContentHash) -> Self {
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&hash.as_bytes()[..12]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for CasAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Compute Blake3 hash of content
pub fn compute_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Hasher::new();
    hasher.update(content);
    let hash = hasher.finalize();
    ContentHash::new(*hash.as_bytes())
}

/// Hash a single file
pub fn hash_file<P: AsRef<Path>>(path: P) -> Result<ContentHash, HoardError> {
    let content = fs::read(path.as_ref())
        .map_err(|e| HoardError::io(format!("Failed to read {}", path.as_ref().display()), e))?;
    Ok(compute_hash(&content))
}

/// Read and hash multiple files in parallel, keeping input order
pub fn read_and_hash_files(paths: &[PathBuf]) -> Result<Vec<(Vec<u8>, ContentHash)>, HoardError> {
    paths
        .par_iter()
        .map(|path| {
            let content = fs::read(path)
                .map_err(|e| HoardError::io(format!("Failed to read {}", path.display()), e))?;
            let hash = compute_hash(&content);
            Ok((content, hash))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_invalid_length() {
        let bytes = vec![0u8; 16];
        assert!(ContentHash::from_vec(bytes).is_err());
    }

    #[test]
    fn test_hex_conversion() {
        let hash = compute_hash(b"chunk");
        let restored: ContentHash = hash.to_hex().parse().unwrap();
        assert_eq!(hash, restored);
        assert!(ContentHash::from_hex("not hex").is_err());
    }

    #[test]
    fn test_cas_addr_is_hash_prefix() {
        let hash = compute_hash(b"hello world");
        let addr = hash.cas_addr();
        assert_eq!(addr.as_bytes(), &hash.as_bytes()[..12]);
        assert_eq!(addr.to_string(), &hash.to_hex()[..24]);
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello world");
        let hash2 = compute_hash(b"hello world");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, compute_hash(b"hello world!"));
    }

    #[test]
    fn test_read_and_hash_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file1 = temp_dir.path().join("a.bin");
        let file2 = temp_dir.path().join("b.bin");
        fs::write(&file1, b"content1").unwrap();
        fs::write(&file2, b"content2").unwrap();

        let results = read_and_hash_files(&[file1.clone(), file2]).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, b"content1");
        assert_eq!(results[0].1, compute_hash(b"content1"));
        assert_eq!(results[1].1, compute_hash(b"content2"));
        assert_eq!(hash_file(&file1).unwrap(), compute_hash(b"content1"));

        let missing = temp_dir.path().join("missing.bin");
        assert!(read_and_hash_files(&[missing]).is_err());
    }
}
