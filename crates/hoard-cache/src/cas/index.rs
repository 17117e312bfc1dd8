//! In-memory CAS index
//!
//! Holds the address lookup table, the set of tracked blocks, their last
//! access times and the current append block. The index is plain data: the
//! owning [`Cas`](super::Cas) serializes access to it and the journal is the
//! only thing that makes changes to it durable.

use std::collections::{HashMap, HashSet};
use std::sync::Weak;

use super::{BlockId, BlockReader, CasAddr, CasLocation};
use crate::journal::JournalEntry;

#[derive(Debug, Default)]
pub struct CasIndex {
    pub(crate) lookup: HashMap<CasAddr, CasLocation>,
    pub(crate) block_ids: HashSet<BlockId>,
    pub(crate) last_access: HashMap<BlockId, i64>,
    pub(crate) read_handles: HashMap<BlockId, Weak<BlockReader>>,
    pub(crate) current_block: BlockId,
}

impl CasIndex {
    pub fn clear(&mut self) {
        self.lookup.clear();
        self.block_ids.clear();
        self.last_access.clear();
        self.read_handles.clear();
        self.current_block = BlockId::INVALID;
    }

    pub fn get(&self, addr: &CasAddr) -> Option<CasLocation> {
        self.lookup.get(addr).copied()
    }

    /// Record a location. An invalid location removes the address.
    pub fn set_location(&mut self, addr: CasAddr, location: CasLocation) {
        if location.is_valid() {
            self.lookup.insert(addr, location);
        } else {
            self.lookup.remove(&addr);
        }
    }

    pub fn track_block(&mut self, block_id: BlockId, utc_micros: i64) {
        self.block_ids.insert(block_id);
        self.last_access.entry(block_id).or_insert(utc_micros);
    }

    /// Forget a block and every address pointing into it
    pub fn untrack_block(&mut self, block_id: BlockId) -> Vec<CasAddr> {
        self.block_ids.remove(&block_id);
        self.last_access.remove(&block_id);
        self.read_handles.remove(&block_id);
        if self.current_block == block_id {
            self.current_block = BlockId::INVALID;
        }
        self.remove_locations_in(|id| id == block_id)
    }

    /// Strip lookup entries whose block matches `pred` and return their addresses
    pub fn remove_locations_in(&mut self, mut pred: impl FnMut(BlockId) -> bool) -> Vec<CasAddr> {
        let mut removed = Vec::new();
        self.lookup.retain(|addr, location| {
            if pred(location.block_id) {
                removed.push(*addr);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Apply one replayed journal entry
    pub fn apply(&mut self, entry: &JournalEntry) {
        match *entry {
            JournalEntry::ChunkLocation { location, addr } => self.set_location(addr, location),
            JournalEntry::BlockCreated {
                block_id,
                utc_micros,
            } => {
                self.track_block(block_id, utc_micros);
                self.current_block = block_id;
            }
            JournalEntry::BlockDeleted { block_id, .. } => {
                self.block_ids.remove(&block_id);
                self.last_access.remove(&block_id);
                if self.current_block == block_id {
                    self.current_block = BlockId::INVALID;
                }
            }
            JournalEntry::BlockAccess {
                block_id,
                utc_micros,
            } => {
                if self.block_ids.contains(&block_id) {
                    self.last_access.insert(block_id, utc_micros);
                }
            }
        }
    }

    pub fn compact(&mut self) {
        self.read_handles.retain(|_, handle| handle.strong_count() > 0);
        self.lookup.shrink_to_fit();
        self.block_ids.shrink_to_fit();
        self.last_access.shrink_to_fit();
        self.read_handles.shrink_to_fit();
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.block_ids.len()
    }
}
