//! Install cache
//!
//! [`InstallCache`] owns one cache directory: the CAS blocks, the journal
//! describing them and the queue of chunks not yet written. It is the public
//! surface for the streaming layer (put, check, flush, purge, usage) and serves
//! chunk reads to the I/O dispatcher through [`IoBackend`](crate::IoBackend).

mod purge;
mod resolve;

pub use purge::PurgeReport;

use camino::Utf8Path;
use hoard_config::InstallCacheConfig;
use hoard_core::error::HoardError;
use hoard_core::utils::{to_mib, utc_now_micros};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cas::{BlockId, Cas, CasLocation, ContentHash, VerifyReport};
use crate::encoding::ChunkDecoder;
use crate::journal::{Journal, Transaction};
use crate::pending::PendingChunks;
use crate::provider::ContentProvider;
use crate::CacheResult;

use resolve::RequestQueue;

/// Disk usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StorageUsage {
    /// Configured disk quota
    pub max_size: u64,
    /// Bytes in all block files
    pub total_size: u64,
    /// Bytes in blocks holding at least one referenced chunk
    pub referenced_block_size: u64,
}

/// Local, crash-safe cache of installed content chunks
pub struct InstallCache {
    config: InstallCacheConfig,
    cas: Arc<Cas>,
    journal: Journal,
    content: Arc<dyn ContentProvider>,
    pending: Mutex<PendingChunks>,
    /// Serializes flush and purge
    writer: Mutex<()>,
    requests: Arc<RequestQueue>,
}

impl std::fmt::Debug for InstallCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallCache")
            .field("root", &self.config.root_directory)
            .field("disk_quota", &self.config.disk_quota)
            .field("cas", &self.cas)
            .finish_non_exhaustive()
    }
}

impl InstallCache {
    /// Open the cache directory, replaying and verifying its journal.
    ///
    /// A corrupt journal wipes the directory and starts over with an empty
    /// cache; only failing to set up the directory at all is an error.
    pub fn new(
        config: InstallCacheConfig,
        content: Arc<dyn ContentProvider>,
        decoder: Arc<dyn ChunkDecoder>,
    ) -> CacheResult<Self> {
        let root = config.root_directory.clone();
        info!(
            "Initializing install cache '{}', MaxCacheSize={:.2} MiB",
            root,
            to_mib(config.disk_quota)
        );

        if config.drop_cache {
            info!("Dropping install cache '{}'", root);
            remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)
            .map_err(|e| HoardError::io(format!("Failed to create directory '{}'", root), e))?;

        let cas = Arc::new(Cas::new(root.clone(), config.max_block_size));
        cas.initialize()?;

        let cache = Self {
            journal: Journal::in_directory(&root),
            cas,
            content,
            pending: Mutex::new(PendingChunks::new()),
            writer: Mutex::new(()),
            requests: Arc::new(RequestQueue::new(decoder)),
            config,
        };
        cache.open_journal()?;

        Ok(cache)
    }

    fn open_journal(&self) -> CacheResult<()> {
        match self.replay_and_verify() {
            Ok(()) => return Ok(()),
            Err(HoardError::JournalNotFound { .. }) => {}
            Err(e) => {
                warn!(
                    "Failed to replay install cache journal '{}', reason '{}'",
                    self.journal.path(),
                    e
                );
                info!("Deleting installed content and reinitializing cache");
                let root = self.cas.root();
                remove_dir_all(root)?;
                fs::create_dir_all(root).map_err(|e| {
                    HoardError::io(format!("Failed to create directory '{}'", root), e)
                })?;
                self.cas.initialize()?;
            }
        }

        self.journal.create()?;
        info!("Created CAS journal '{}'", self.journal.path());
        Ok(())
    }

    fn replay_and_verify(&self) -> CacheResult<()> {
        let replayed = self.journal.replay(|entry| self.cas.apply(entry));

        let report = self.cas.verify();
        let status = replayed.and_then(|_| self.commit_invalidations(&report));

        self.cas.compact();
        status
    }

    fn commit_invalidations(&self, report: &VerifyReport) -> CacheResult<()> {
        if report.invalidated.is_empty() {
            return Ok(());
        }

        warn!(
            "Removing {} cached chunks stored in missing CAS blocks",
            report.invalidated.len()
        );
        let mut transaction = self.journal.begin();
        for addr in &report.invalidated {
            transaction.chunk_location(CasLocation::INVALID, *addr);
        }
        self.journal.commit(transaction)
    }

    pub fn config(&self) -> &InstallCacheConfig {
        &self.config
    }

    pub fn root(&self) -> &Utf8Path {
        self.cas.root()
    }

    pub fn cas(&self) -> &Cas {
        &self.cas
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn is_chunk_cached(&self, hash: &ContentHash) -> bool {
        self.cas.contains(hash)
    }

    /// Queue a chunk for caching.
    ///
    /// Chunks already cached or already queued are dropped. Once the queue
    /// holds more than `max_pending_bytes` it is flushed first, and the new
    /// chunk is only queued if that flush succeeds.
    pub fn put_chunk(&self, bytes: Vec<u8>, hash: ContentHash) -> CacheResult<()> {
        if self.cas.contains(&hash) {
            debug!("Chunk {} is already cached", hash);
            return Ok(());
        }

        let full = {
            let mut pending = self.pending.lock();
            if pending.contains(&hash) {
                return Ok(());
            }
            if pending.total_size() <= self.config.max_pending_bytes {
                pending.push(bytes, hash);
                return Ok(());
            }
            pending.take()
        };

        self.flush_pending_chunks(full)?;

        if !self.cas.contains(&hash) {
            self.pending.lock().push(bytes, hash);
        }
        Ok(())
    }

    /// Write every queued chunk to disk
    pub fn flush(&self) -> CacheResult<()> {
        let chunks = self.pending.lock().take();
        let result = self.flush_pending_chunks(chunks);
        self.cas.compact();
        result
    }

    /// Bytes waiting in the queue
    pub fn pending_bytes(&self) -> u64 {
        self.pending.lock().total_size()
    }

    /// Pack queued chunks into blocks.
    ///
    /// Per block: bytes are written and synced, then one journal transaction
    /// is committed, then the new locations become visible. A crash between
    /// the first two steps leaves unreferenced bytes and no dangling lookup.
    /// A block created by a round that fails is abandoned, so the next round
    /// creates and journals a fresh one.
    fn flush_pending_chunks(&self, mut chunks: PendingChunks) -> CacheResult<()> {
        let _writer = self.writer.lock();

        while !chunks.is_empty() {
            let mut transaction = self.journal.begin();

            let mut block_id = self.cas.current_block();
            let created = !block_id.is_valid();
            if created {
                block_id = self.cas.create_block()?;
                transaction.block_created(block_id);
            }

            if let Err(e) = self.flush_into_block(block_id, &mut chunks, transaction) {
                if created {
                    self.cas.abandon_block(block_id);
                }
                return Err(e);
            }

            if !chunks.is_empty() {
                self.cas.close_current_block();
            }
        }

        Ok(())
    }

    /// Append as many queued chunks as fit to `block_id` and commit them
    fn flush_into_block(
        &self,
        block_id: BlockId,
        chunks: &mut PendingChunks,
        mut transaction: Transaction,
    ) -> CacheResult<()> {
        let max_block_size = u64::from(self.cas.max_block_size());
        let block_path = self.cas.block_path(block_id);
        let mut file = self.cas.open_write(block_id)?;
        let block_offset = file
            .metadata()
            .map_err(|e| HoardError::io(format!("Failed to stat CAS block '{}'", block_path), e))?
            .len();

        let mut buffer = Vec::with_capacity(chunks.total_size().min(max_block_size) as usize);
        let mut locations = Vec::new();

        while let Some(len) = chunks.front_len() {
            let fill = block_offset + buffer.len() as u64;
            if fill > 0 && fill + len as u64 > max_block_size {
                break;
            }

            let Some((bytes, hash)) = chunks.pop() else {
                break;
            };
            if self.cas.contains(&hash) {
                continue;
            }

            let offset = u32::try_from(fill).map_err(|_| {
                HoardError::io(
                    format!("CAS block '{}' exceeds 4 GiB", block_path),
                    io::Error::from(io::ErrorKind::InvalidData),
                )
            })?;
            locations.push((hash.cas_addr(), CasLocation::new(block_id, offset)));
            buffer.extend_from_slice(&bytes);
        }

        if !buffer.is_empty() {
            info!(
                "Writing {:.2} MiB to CAS block {}",
                to_mib(buffer.len() as u64),
                block_id
            );
            file.write_all(&buffer)
                .and_then(|_| file.sync_data())
                .map_err(|e| {
                    HoardError::io(format!("Failed to write CAS block '{}'", block_path), e)
                })?;
            self.cas.track_access(block_id, utc_now_micros());
        }
        drop(file);

        for (addr, location) in &locations {
            transaction.chunk_location(*location, *addr);
        }
        self.journal.commit(transaction)?;
        self.cas.insert_locations(locations);
        Ok(())
    }

    /// Current disk usage and how much of it is referenced
    pub fn storage_usage(&self) -> StorageUsage {
        let (mut blocks, total_size) = self.cas.block_info();
        self.add_references_to_blocks(&mut blocks);

        StorageUsage {
            max_size: self.config.disk_quota,
            total_size,
            referenced_block_size: blocks
                .values()
                .filter(|info| info.ref_count > 0)
                .map(|info| info.file_size)
                .sum(),
        }
    }

    /// Re-run startup verification against the blocks on disk
    pub fn verify(&self) -> CacheResult<VerifyReport> {
        let _writer = self.writer.lock();
        let report = self.cas.verify();
        self.commit_invalidations(&report)?;
        Ok(report)
    }

    /// Remove every cached block, pending chunk and journal entry
    pub fn clear(&self) -> CacheResult<()> {
        let _writer = self.writer.lock();
        self.pending.lock().clear();

        info!("Clearing install cache '{}'", self.cas.root());
        remove_dir_all(self.cas.blocks_dir())?;
        self.cas.initialize()?;
        self.journal.create()
    }

    /// Persist last access times so eviction order survives a restart
    pub fn shutdown(&self) -> CacheResult<()> {
        let access = self.cas.last_access();
        let mut transaction = self.journal.begin();
        for (block_id, utc_micros) in access {
            transaction.block_access(block_id, utc_micros);
        }
        debug!("Journaling access time of {} CAS blocks", transaction.len());
        self.journal.commit(transaction)
    }
}

fn remove_dir_all(path: &Utf8Path) -> CacheResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HoardError::io(format!("Failed to delete directory '{}'", path), e)),
    }
}
