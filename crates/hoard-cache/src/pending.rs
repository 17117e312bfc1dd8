//! In-memory queue of chunks waiting to be packed into a block

use std::collections::{HashSet, VecDeque};

use crate::cas::ContentHash;

/// Chunks accepted by `put_chunk` but not yet written to disk
#[derive(Debug, Default)]
pub struct PendingChunks {
    chunks: VecDeque<(Vec<u8>, ContentHash)>,
    hashes: HashSet<ContentHash>,
    total_size: u64,
}

impl PendingChunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk. Returns false when the hash is already queued.
    pub fn push(&mut self, bytes: Vec<u8>, hash: ContentHash) -> bool {
        if !self.hashes.insert(hash) {
            return false;
        }
        self.total_size += bytes.len() as u64;
        self.chunks.push_back((bytes, hash));
        true
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.hashes.contains(hash)
    }

    /// Size of the next chunk in line
    pub fn front_len(&self) -> Option<usize> {
        self.chunks.front().map(|(bytes, _)| bytes.len())
    }

    pub fn pop(&mut self) -> Option<(Vec<u8>, ContentHash)> {
        let (bytes, hash) = self.chunks.pop_front()?;
        self.hashes.remove(&hash);
        self.total_size -= bytes.len() as u64;
        Some((bytes, hash))
    }

    /// Move every queued chunk out, leaving the queue empty
    pub fn take(&mut self) -> PendingChunks {
        std::mem::take(self)
    }

    /// Total bytes queued
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.hashes.clear();
        self.total_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::compute_hash;

    #[test]
    fn test_push_and_pop_in_order() {
        let mut pending = PendingChunks::new();
        assert!(pending.push(vec![1; 10], compute_hash(b"a")));
        assert!(pending.push(vec![2; 20], compute_hash(b"b")));
        assert_eq!(pending.total_size(), 30);
        assert_eq!(pending.front_len(), Some(10));

        let (bytes, hash) = pending.pop().unwrap();
        assert_eq!(bytes, vec![1; 10]);
        assert_eq!(hash, compute_hash(b"a"));
        assert_eq!(pending.total_size(), 20);
        assert!(!pending.contains(&compute_hash(b"a")));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_duplicate_hash_is_rejected() {
        let mut pending = PendingChunks::new();
        let hash = compute_hash(b"same");
        assert!(pending.push(b"same".to_vec(), hash));
        assert!(!pending.push(b"same".to_vec(), hash));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.total_size(), 4);
    }

    #[test]
    fn test_take_empties_queue() {
        let mut pending = PendingChunks::new();
        pending.push(vec![0; 8], compute_hash(b"x"));
        let taken = pending.take();
        assert_eq!(taken.len(), 1);
        assert!(pending.is_empty());
        assert_eq!(pending.total_size(), 0);

        let mut taken = taken;
        taken.clear();
        assert!(taken.is_empty());
        assert_eq!(taken.pop(), None);
    }
}
