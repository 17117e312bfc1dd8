//! Chunk identity and encoding types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HoardError;

/// Opaque 12-byte chunk id handed out by the streaming layer.
///
/// The cache never keys by chunk id; it asks the manifest for the chunk's
/// content hash and keys by that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId([u8; 12]);

impl ChunkId {
    pub const SIZE: usize = 12;

    pub fn new(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Convert the id to lower case hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ChunkId {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| HoardError::InvalidHash {
            expected: "24 hex characters".to_string(),
            actual: format!("invalid hex: {}", e),
        })?;
        let bytes: [u8; 12] = bytes.try_into().map_err(|v: Vec<u8>| HoardError::InvalidHash {
            expected: "12 bytes".to_string(),
            actual: format!("{} bytes", v.len()),
        })?;
        Ok(Self(bytes))
    }
}

/// Compression applied to a chunk's blocks before it was cached.
///
/// The cache stores encoded bytes verbatim and hands this back to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    None,
    Zlib,
    Lz4,
    Zstd,
    Oodle,
}

impl CompressionFormat {
    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionFormat::None)
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionFormat::None => "none",
            CompressionFormat::Zlib => "zlib",
            CompressionFormat::Lz4 => "lz4",
            CompressionFormat::Zstd => "zstd",
            CompressionFormat::Oodle => "oodle",
        };
        f.write_str(name)
    }
}
