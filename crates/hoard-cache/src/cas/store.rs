//! CAS block store
//!
//! This module provides [`Cas`], the block-file store behind the install
//! cache. One mutex guards the in-memory index; file handles handed out by the
//! store are used without holding it.

use camino::{Utf8Path, Utf8PathBuf};
use hoard_core::error::HoardError;
use hoard_core::utils::{to_mib, utc_now_micros};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::reader::open_error;
use super::{
    BlockId, BlockInfo, BlockInfoMap, BlockReader, CasAddr, CasIndex, CasLocation, ContentHash,
    BLOCK_EXTENSION,
};
use crate::journal::JournalEntry;
use crate::CacheResult;

const BLOCKS_DIR: &str = "blocks";

/// Result of [`Cas::find_chunk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLookup {
    pub location: CasLocation,
    /// The chunk lives in the block currently open for append
    pub in_current_block: bool,
}

/// What [`Cas::verify`] found and repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Tracked blocks whose file was gone
    pub missing_blocks: Vec<BlockId>,
    /// Block files nothing tracked, deleted from disk
    pub orphaned_blocks: Vec<BlockId>,
    /// Addresses dropped because their block is not tracked
    pub invalidated: Vec<CasAddr>,
    pub verified_blocks: usize,
    pub verified_bytes: u64,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_blocks.is_empty() && self.invalidated.is_empty()
    }
}

/// Content-addressable block store
#[derive(Debug)]
pub struct Cas {
    root: Utf8PathBuf,
    blocks_dir: Utf8PathBuf,
    max_block_size: u32,
    state: Mutex<CasIndex>,
}

impl Cas {
    pub fn new(root: impl Into<Utf8PathBuf>, max_block_size: u32) -> Self {
        let root = root.into();
        let blocks_dir = root.join(BLOCKS_DIR);
        Self {
            root,
            blocks_dir,
            max_block_size,
            state: Mutex::new(CasIndex::default()),
        }
    }

    /// Reset in-memory state and make sure the blocks directory exists
    pub fn initialize(&self) -> CacheResult<()> {
        self.state.lock().clear();
        fs::create_dir_all(&self.blocks_dir).map_err(|e| {
            HoardError::io(
                format!("Failed to create directory '{}'", self.blocks_dir),
                e,
            )
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn blocks_dir(&self) -> &Utf8Path {
        &self.blocks_dir
    }

    pub fn max_block_size(&self) -> u32 {
        self.max_block_size
    }

    pub fn find_chunk(&self, hash: &ContentHash) -> Option<ChunkLookup> {
        let addr = hash.cas_addr();
        let state = self.state.lock();
        state.get(&addr).map(|location| ChunkLookup {
            location,
            in_current_block: location.block_id == state.current_block,
        })
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.state.lock().lookup.contains_key(&hash.cas_addr())
    }

    pub fn current_block(&self) -> BlockId {
        self.state.lock().current_block
    }

    /// Stop appending to the current block; the next flush allocates a new one
    pub fn close_current_block(&self) {
        self.state.lock().current_block = BlockId::INVALID;
    }

    /// Allocate the lowest free block id and make it the current block.
    ///
    /// Ids whose file already exists on disk are skipped. The caller journals
    /// the creation.
    pub fn create_block(&self) -> CacheResult<BlockId> {
        let mut state = self.state.lock();

        for id in 1..u32::MAX {
            let block_id = BlockId::new(id);
            if state.block_ids.contains(&block_id) {
                continue;
            }

            let path = self.block_path(block_id);
            if path.exists() {
                warn!("Unused CAS block id {} already exists on disk", id);
                continue;
            }

            state.track_block(block_id, utc_now_micros());
            state.current_block = block_id;
            debug!("Created CAS block {}", block_id);
            return Ok(block_id);
        }

        Err(HoardError::BlockIdsExhausted)
    }

    /// Delete a block file and forget every address stored in it.
    ///
    /// Returns the removed addresses so the caller can journal them. A block
    /// file that is already gone counts as deleted.
    pub fn delete_block(&self, block_id: BlockId) -> CacheResult<Vec<CasAddr>> {
        let mut state = self.state.lock();
        let path = self.block_path(block_id);

        info!("Deleting CAS block '{}'", path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("CAS block '{}' was already deleted", path);
            }
            Err(e) => {
                return Err(HoardError::io(
                    format!("Failed to delete CAS block '{}'", path),
                    e,
                ))
            }
        }

        Ok(state.untrack_block(block_id))
    }

    /// Drop a block whose creation never reached the journal, along with any
    /// bytes already written to it. The id becomes free for `create_block`.
    pub fn abandon_block(&self, block_id: BlockId) {
        let mut state = self.state.lock();
        let path = self.block_path(block_id);

        warn!("Abandoning uncommitted CAS block '{}'", path);
        state.untrack_block(block_id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove abandoned CAS block '{}': {}", path, e),
        }
    }

    pub fn block_path(&self, block_id: BlockId) -> Utf8PathBuf {
        self.blocks_dir.join(block_id.file_name())
    }

    /// Fresh synchronous read handle
    pub fn open_read(&self, block_id: BlockId) -> CacheResult<BlockReader> {
        BlockReader::open(block_id, &self.block_path(block_id))
    }

    /// Shared read handle, reused while any reader still holds it
    pub fn open_async_read(&self, block_id: BlockId) -> CacheResult<Arc<BlockReader>> {
        let mut state = self.state.lock();

        if let Some(handle) = state.read_handles.get(&block_id).and_then(|weak| weak.upgrade()) {
            return Ok(handle);
        }

        let handle = Arc::new(BlockReader::open(block_id, &self.block_path(block_id))?);
        state.read_handles.insert(block_id, Arc::downgrade(&handle));
        Ok(handle)
    }

    /// Append handle; the block file is created if needed
    pub fn open_write(&self, block_id: BlockId) -> CacheResult<File> {
        let path = self.block_path(block_id);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| open_error(&path, e))
    }

    pub fn track_access(&self, block_id: BlockId, utc_micros: i64) {
        debug_assert!(block_id.is_valid());
        self.state.lock().last_access.insert(block_id, utc_micros);
    }

    /// Last access time of every block, for journaling at shutdown
    pub fn last_access(&self) -> Vec<(BlockId, i64)> {
        let state = self.state.lock();
        let mut access: Vec<_> = state
            .last_access
            .iter()
            .filter(|(id, _)| state.block_ids.contains(id))
            .map(|(id, micros)| (*id, *micros))
            .collect();
        access.sort();
        access
    }

    /// Record freshly committed chunk locations
    pub fn insert_locations(&self, locations: impl IntoIterator<Item = (CasAddr, CasLocation)>) {
        let mut state = self.state.lock();
        for (addr, location) in locations {
            state.set_location(addr, location);
        }
    }

    /// Scan the blocks directory for block files.
    ///
    /// Returns per-block size and last access (0 when unknown) with a zero
    /// reference count, plus the total size of all block files.
    pub fn block_info(&self) -> (BlockInfoMap, u64) {
        let last_access = self.state.lock().last_access.clone();
        let mut blocks = BlockInfoMap::new();
        let mut total_size = 0u64;

        for entry in WalkDir::new(&self.blocks_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            let is_block = entry
                .path()
                .extension()
                .map_or(false, |ext| ext == BLOCK_EXTENSION);
            if !is_block {
                continue;
            }

            let (block_id, file_size) = match (
                BlockId::from_file_name(&file_name),
                entry.metadata().map(|m| m.len()),
            ) {
                (Some(id), Ok(size)) => (id, size),
                _ => {
                    warn!("Found invalid CAS block '{}'", entry.path().display());
                    continue;
                }
            };

            if blocks.contains_key(&block_id) {
                warn!("Found duplicate CAS block '{}'", entry.path().display());
                continue;
            }

            blocks.insert(
                block_id,
                BlockInfo {
                    file_size,
                    last_access: last_access.get(&block_id).copied().unwrap_or(0),
                    ref_count: 0,
                },
            );
            total_size += file_size;
        }

        (blocks, total_size)
    }

    /// Reconcile the index with the blocks on disk.
    ///
    /// Tracked blocks without a file are dropped, files nobody tracks are
    /// deleted, and lookup entries pointing at untracked blocks are removed.
    pub fn verify(&self) -> VerifyReport {
        let (on_disk, _) = self.block_info();
        let mut report = VerifyReport::default();

        {
            let mut state = self.state.lock();

            let missing: Vec<BlockId> = state
                .block_ids
                .iter()
                .filter(|id| !on_disk.contains_key(id))
                .copied()
                .collect();
            for block_id in &missing {
                warn!("Missing CAS block '{}'", self.block_path(*block_id));
                state.block_ids.remove(block_id);
                state.last_access.remove(block_id);
                if state.current_block == *block_id {
                    state.current_block = BlockId::INVALID;
                }
            }
            report.missing_blocks = missing;

            report.verified_blocks = state.block_ids.len();
            report.verified_bytes = state
                .block_ids
                .iter()
                .filter_map(|id| on_disk.get(id))
                .map(|info| info.file_size)
                .sum();

            report.orphaned_blocks = on_disk
                .keys()
                .filter(|id| !state.block_ids.contains(id))
                .copied()
                .collect();

            let tracked = state.block_ids.clone();
            let mut missing_referenced = BTreeSet::new();
            report.invalidated = state.remove_locations_in(|id| {
                let gone = !tracked.contains(&id);
                if gone {
                    missing_referenced.insert(id);
                }
                gone
            });
            for block_id in missing_referenced {
                warn!(
                    "Lookup references missing CAS block '{}'",
                    self.block_path(block_id)
                );
            }
        }

        info!(
            "Verified {} CAS blocks of total {:.2} MiB",
            report.verified_blocks,
            to_mib(report.verified_bytes)
        );

        for block_id in &report.orphaned_blocks {
            let path = self.block_path(*block_id);
            match fs::remove_file(&path) {
                Ok(()) => warn!("Deleted orphaned CAS block '{}'", path),
                Err(e) => warn!("Failed to delete orphaned CAS block '{}': {}", path, e),
            }
        }

        report
    }

    pub fn compact(&self) {
        self.state.lock().compact();
    }

    /// Apply a replayed journal entry
    pub fn apply(&self, entry: &JournalEntry) {
        self.state.lock().apply(entry);
    }

    /// Number of cached chunk addresses
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.state.lock().block_count()
    }

    /// Copy of the lookup table
    pub fn locations(&self) -> HashMap<CasAddr, CasLocation> {
        self.state.lock().lookup.clone()
    }
}
