//! `hoard put` command implementation.
//!
//! Each file becomes one chunk keyed by the BLAKE3 hash of its contents. Files
//! are read and hashed in parallel, queued, then flushed to disk together.

use anyhow::Context;
use hoard_cache::cas::read_and_hash_files;
use hoard_cache::ContentHash;
use hoard_core::utils::format_bytes;
use std::path::PathBuf;
use std::time::Instant;

use super::CommandContext;

/// What a put added to the cache
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PutSummary {
    pub added: Vec<ContentHash>,
    pub already_cached: usize,
    pub bytes: u64,
}

/// Execute the `hoard put` command
pub async fn execute(files: Vec<PathBuf>, ctx: &CommandContext) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let cache = ctx.cache.clone();

    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<PutSummary> {
        let chunks = read_and_hash_files(&files).context("Failed to read input files")?;

        let mut summary = PutSummary::default();
        for (bytes, hash) in chunks {
            if cache.is_chunk_cached(&hash) || summary.added.contains(&hash) {
                summary.already_cached += 1;
                continue;
            }
            summary.bytes += bytes.len() as u64;
            summary.added.push(hash);
            cache.put_chunk(bytes, hash)?;
        }
        cache.flush().context("Failed to flush chunks to disk")?;
        Ok(summary)
    })
    .await
    .context("Put task failed")??;

    for hash in &summary.added {
        ctx.output.info(&hash.to_string());
    }
    ctx.output.success(&format!(
        "Cached {} chunks ({}) in {:.2?}, {} already cached",
        summary.added.len(),
        format_bytes(summary.bytes),
        start_time.elapsed(),
        summary.already_cached
    ));
    Ok(())
}
