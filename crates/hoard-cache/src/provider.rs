//! Collaborators the install cache asks about content it does not own:
//! chunk metadata from the installed manifests, and which chunks are still
//! referenced by mounted containers.

use hoard_core::{ChunkId, CompressionFormat};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::cas::ContentHash;

/// Manifest entry for an installed chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub hash: ContentHash,
    pub raw_size: u64,
    pub encoded_size: u64,
    /// Raw size of each encoding block, 0 when the chunk is not split
    pub block_size: u32,
    /// Encoded size of each block
    pub blocks: Vec<u32>,
    pub compression: CompressionFormat,
    pub encryption_key: Option<[u8; 32]>,
}

impl ChunkInfo {
    /// Info for a chunk stored as-is
    pub fn raw(hash: ContentHash, size: u64) -> Self {
        Self {
            hash,
            raw_size: size,
            encoded_size: size,
            block_size: 0,
            blocks: Vec::new(),
            compression: CompressionFormat::None,
            encryption_key: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }
}

/// Reference bits of one container, aligned with its chunk order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerReferences {
    pub chunk_hashes: Vec<ContentHash>,
    pub referenced: Vec<bool>,
}

impl ContainerReferences {
    /// Hashes whose reference bit is set
    pub fn referenced_hashes(&self) -> impl Iterator<Item = &ContentHash> {
        self.chunk_hashes
            .iter()
            .zip(self.referenced.iter())
            .filter(|(_, referenced)| **referenced)
            .map(|(hash, _)| hash)
    }
}

pub trait ContentProvider: Send + Sync {
    /// Metadata for an installed chunk, `None` if it is not installed
    fn installed_chunk_info(&self, chunk_id: &ChunkId) -> Option<ChunkInfo>;

    /// Per-container reference bits of everything currently mounted
    fn referenced_content(&self) -> Vec<ContainerReferences>;
}

/// In-memory [`ContentProvider`]
#[derive(Debug, Default)]
pub struct StaticContentProvider {
    chunks: RwLock<HashMap<ChunkId, ChunkInfo>>,
    containers: RwLock<Vec<ContainerReferences>>,
}

impl StaticContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_chunk(&self, chunk_id: ChunkId, info: ChunkInfo) {
        self.chunks.write().insert(chunk_id, info);
    }

    pub fn remove_chunk(&self, chunk_id: &ChunkId) -> Option<ChunkInfo> {
        self.chunks.write().remove(chunk_id)
    }

    /// Mark `hashes` as one container whose chunks are all referenced
    pub fn add_referenced(&self, hashes: Vec<ContentHash>) {
        let referenced = vec![true; hashes.len()];
        self.containers.write().push(ContainerReferences {
            chunk_hashes: hashes,
            referenced,
        });
    }

    pub fn add_container(&self, container: ContainerReferences) {
        self.containers.write().push(container);
    }

    pub fn clear_references(&self) {
        self.containers.write().clear();
    }
}

impl ContentProvider for StaticContentProvider {
    fn installed_chunk_info(&self, chunk_id: &ChunkId) -> Option<ChunkInfo> {
        self.chunks.read().get(chunk_id).cloned()
    }

    fn referenced_content(&self) -> Vec<ContainerReferences> {
        self.containers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::compute_hash;

    #[test]
    fn test_referenced_hashes_follow_bits() {
        let container = ContainerReferences {
            chunk_hashes: vec![compute_hash(b"a"), compute_hash(b"b"), compute_hash(b"c")],
            referenced: vec![true, false, true],
        };
        let hashes: Vec<_> = container.referenced_hashes().copied().collect();
        assert_eq!(hashes, vec![compute_hash(b"a"), compute_hash(b"c")]);
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticContentProvider::new();
        let id = ChunkId::new([1; 12]);
        let info = ChunkInfo::raw(compute_hash(b"x"), 1);
        assert!(provider.installed_chunk_info(&id).is_none());

        provider.insert_chunk(id, info.clone());
        assert_eq!(provider.installed_chunk_info(&id), Some(info));
        assert!(!provider.installed_chunk_info(&id).unwrap().is_encrypted());

        provider.add_referenced(vec![compute_hash(b"x")]);
        assert_eq!(provider.referenced_content().len(), 1);
        provider.clear_references();
        assert!(provider.referenced_content().is_empty());

        assert!(provider.remove_chunk(&id).is_some());
    }
}
