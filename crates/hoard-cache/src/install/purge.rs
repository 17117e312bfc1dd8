//! Reference-aware LRU eviction of CAS blocks

use hoard_core::error::HoardError;
use hoard_core::utils::to_mib;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use super::InstallCache;
use crate::cas::{BlockId, BlockInfo, BlockInfoMap, CasLocation, ContentHash};
use crate::CacheResult;

/// Outcome of a purge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub max_size: u64,
    /// Bytes in block files before purging
    pub cached_bytes: u64,
    /// Bytes still to be downloaded for the pending install
    pub uncached_bytes: u64,
    pub referenced_bytes: u64,
    /// Bytes that had to go to fit the quota
    pub bytes_to_purge: u64,
    pub purged_bytes: u64,
    pub purged_blocks: Vec<u32>,
}

impl PurgeReport {
    /// Bytes on disk after the purge
    pub fn remaining_bytes(&self) -> u64 {
        self.cached_bytes.saturating_sub(self.purged_bytes)
    }

    pub fn is_over_quota(&self) -> bool {
        self.remaining_bytes() > self.max_size
    }
}

impl InstallCache {
    /// Make room for `chunks_to_install` (hash to size) within the disk quota.
    ///
    /// Blocks holding a chunk about to be installed or a referenced chunk are
    /// kept; the rest are deleted least recently used first until the install
    /// fits. Fails with [`HoardError::PurgeIncomplete`] when it cannot.
    pub fn purge(&self, chunks_to_install: HashMap<ContentHash, u64>) -> CacheResult<PurgeReport> {
        let _writer = self.writer.lock();
        let (mut blocks, cached_bytes) = self.cas.block_info();

        let mut uncached_bytes = 0u64;
        for (hash, size) in &chunks_to_install {
            match self.cas.find_chunk(hash) {
                Some(lookup) => add_reference(&mut blocks, lookup.location),
                None => uncached_bytes += size,
            }
        }

        let mut report = PurgeReport {
            max_size: self.config.disk_quota,
            cached_bytes,
            uncached_bytes,
            ..PurgeReport::default()
        };

        let required_bytes = cached_bytes + uncached_bytes;
        if required_bytes <= self.config.disk_quota {
            info!(
                "Skipping cache purge, MaxCacheSize={:.2} MiB, CacheSize={:.2} MiB, UncachedSize={:.2} MiB",
                to_mib(self.config.disk_quota),
                to_mib(cached_bytes),
                to_mib(uncached_bytes)
            );
            return Ok(report);
        }

        self.add_references_to_blocks(&mut blocks);
        report.referenced_bytes = referenced_bytes(&blocks);
        report.bytes_to_purge = required_bytes - self.config.disk_quota;

        self.log_purge_start(&report);
        let result = self.purge_blocks(&blocks, Some(report.bytes_to_purge), &mut report);
        self.log_purge_end(&report);
        result?;

        if report.purged_bytes < report.bytes_to_purge {
            return Err(HoardError::PurgeIncomplete {
                required: report.bytes_to_purge,
                purged: report.purged_bytes,
            });
        }

        Ok(report)
    }

    /// Delete every block without a referenced chunk, regardless of quota
    pub fn purge_all_unreferenced(&self) -> CacheResult<PurgeReport> {
        let _writer = self.writer.lock();
        let (mut blocks, cached_bytes) = self.cas.block_info();
        self.add_references_to_blocks(&mut blocks);

        let mut report = PurgeReport {
            max_size: self.config.disk_quota,
            cached_bytes,
            referenced_bytes: referenced_bytes(&blocks),
            ..PurgeReport::default()
        };
        report.bytes_to_purge = cached_bytes - report.referenced_bytes;

        self.log_purge_start(&report);
        let result = self.purge_blocks(&blocks, None, &mut report);
        self.log_purge_end(&report);
        result.map(|_| report)
    }

    /// Count one reference per referenced chunk against the block storing it
    pub(crate) fn add_references_to_blocks(&self, blocks: &mut BlockInfoMap) {
        for container in self.content.referenced_content() {
            for hash in container.referenced_hashes() {
                if let Some(lookup) = self.cas.find_chunk(hash) {
                    add_reference(blocks, lookup.location);
                }
            }
        }
    }

    /// Delete unreferenced blocks, oldest access first, until `target` bytes
    /// are freed or, without a target, all of them are gone
    fn purge_blocks(
        &self,
        blocks: &BlockInfoMap,
        target: Option<u64>,
        report: &mut PurgeReport,
    ) -> CacheResult<()> {
        for (block_id, info) in eviction_order(blocks) {
            if target.is_some_and(|target| report.purged_bytes >= target) {
                break;
            }

            let removed = self.cas.delete_block(block_id)?;
            report.purged_bytes += info.file_size;
            report.purged_blocks.push(block_id.get());

            let mut transaction = self.journal.begin();
            for addr in removed {
                transaction.chunk_location(CasLocation::INVALID, addr);
            }
            transaction.block_deleted(block_id);
            self.journal.commit(transaction)?;
        }

        Ok(())
    }

    fn log_purge_start(&self, report: &PurgeReport) {
        info!(
            "Purging install cache, MaxCacheSize={:.2} MiB, CacheSize={:.2} MiB, UncachedSize={:.2} MiB, ReferencedBytes={:.2} MiB",
            to_mib(report.max_size),
            to_mib(report.cached_bytes),
            to_mib(report.uncached_bytes),
            to_mib(report.referenced_bytes)
        );
    }

    fn log_purge_end(&self, report: &PurgeReport) {
        if report.purged_bytes > 0 {
            info!(
                "Purged {:.2} MiB ({:.2}%) from install cache",
                to_mib(report.purged_bytes),
                100.0 * report.purged_bytes as f64 / report.cached_bytes as f64
            );
        }

        if report.is_over_quota() {
            let excess = report.remaining_bytes() - report.max_size;
            warn!(
                "Max install cache size exceeded by {:.2} MiB ({:.2}%)",
                to_mib(excess),
                100.0 * excess as f64 / report.max_size.max(1) as f64
            );
        }
    }
}

fn add_reference(blocks: &mut BlockInfoMap, location: CasLocation) {
    if let Some(info) = blocks.get_mut(&location.block_id) {
        info.ref_count += 1;
    }
}

fn referenced_bytes(blocks: &BlockInfoMap) -> u64 {
    blocks
        .values()
        .filter(|info| info.ref_count > 0)
        .map(|info| info.file_size)
        .sum()
}

/// Unreferenced blocks, least recently used first, ties broken by id
fn eviction_order(blocks: &BlockInfoMap) -> Vec<(BlockId, BlockInfo)> {
    let mut candidates: Vec<_> = blocks
        .iter()
        .filter(|(_, info)| info.ref_count == 0)
        .map(|(id, info)| (*id, *info))
        .collect();
    candidates.sort_by_key(|(id, info)| (info.last_access, *id));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(file_size: u64, last_access: i64, ref_count: u32) -> BlockInfo {
        BlockInfo {
            file_size,
            last_access,
            ref_count,
        }
    }

    #[test]
    fn test_eviction_order() {
        let blocks: BlockInfoMap = [
            (BlockId::new(1), block(10, 300, 0)),
            (BlockId::new(2), block(10, 100, 0)),
            (BlockId::new(3), block(10, 100, 0)),
            (BlockId::new(4), block(10, 0, 2)),
            (BlockId::new(5), block(10, 200, 0)),
        ]
        .into_iter()
        .collect();

        let order: Vec<u32> = eviction_order(&blocks).into_iter().map(|(id, _)| id.get()).collect();
        assert_eq!(order, vec![2, 3, 5, 1]);
        assert_eq!(referenced_bytes(&blocks), 10);
    }

    #[test]
    fn test_references_only_count_scanned_blocks() {
        let mut blocks: BlockInfoMap = [(BlockId::new(1), block(10, 0, 0))].into_iter().collect();
        add_reference(&mut blocks, CasLocation::new(BlockId::new(1), 0));
        add_reference(&mut blocks, CasLocation::new(BlockId::new(1), 4));
        add_reference(&mut blocks, CasLocation::new(BlockId::new(9), 0));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[&BlockId::new(1)].ref_count, 2);
    }

    #[test]
    fn test_report_quota_math() {
        let report = PurgeReport {
            max_size: 100,
            cached_bytes: 150,
            purged_bytes: 40,
            ..PurgeReport::default()
        };
        assert_eq!(report.remaining_bytes(), 110);
        assert!(report.is_over_quota());
    }
}
