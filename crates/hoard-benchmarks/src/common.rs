//! Common utilities for benchmarks

use camino::Utf8PathBuf;
use criterion::Criterion;
use hoard_cache::{compute_hash, ContentHash, InstallCache, PassthroughDecoder, StaticContentProvider};
use hoard_config::InstallCacheConfig;
use pprof::criterion::{Output, PProfProfiler};
use std::sync::Arc;
use tempfile::TempDir;

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .sample_size(100)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// Deterministic chunk contents; `seed` keeps chunks of equal size distinct
pub fn create_test_content(size: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

/// `count` distinct chunks of `size` bytes with their hashes
pub fn create_test_chunks(count: usize, size: usize) -> Vec<(Vec<u8>, ContentHash)> {
    (0..count as u64)
        .map(|seed| {
            let bytes = create_test_content(size, seed);
            let hash = compute_hash(&bytes);
            (bytes, hash)
        })
        .collect()
}

/// An empty cache in a fresh temporary directory
pub fn open_test_cache(max_block_size: u32) -> (TempDir, InstallCache) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let root = Utf8PathBuf::from_path_buf(temp_dir.path().join("cache"))
        .expect("Temp directory is not UTF-8");

    let mut config = InstallCacheConfig::with_root(root);
    config.max_block_size = max_block_size;
    config.max_pending_bytes = u64::MAX;

    let cache = InstallCache::new(
        config,
        Arc::new(StaticContentProvider::new()),
        Arc::new(PassthroughDecoder),
    )
    .expect("Failed to open install cache");
    (temp_dir, cache)
}
