//! `hoard stat` command implementation.

use hoard_cache::StorageUsage;
use hoard_core::utils::format_bytes;
use serde::Serialize;

use super::CommandContext;

/// Snapshot printed by `hoard stat --json`
#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub root: String,
    #[serde(flatten)]
    pub usage: StorageUsage,
    pub blocks: usize,
    pub chunks: usize,
    pub current_block: Option<u32>,
}

impl CacheStats {
    pub fn collect(ctx: &CommandContext) -> Self {
        let cas = ctx.cache.cas();
        let current = cas.current_block();

        Self {
            root: ctx.cache.root().to_string(),
            usage: ctx.cache.storage_usage(),
            blocks: cas.block_count(),
            chunks: cas.len(),
            current_block: current.is_valid().then(|| current.get()),
        }
    }
}

/// Execute the `hoard stat` command
pub async fn execute(json: bool, ctx: &CommandContext) -> anyhow::Result<()> {
    let stats = CacheStats::collect(ctx);

    if json {
        ctx.output.json(&stats)?;
        return Ok(());
    }

    ctx.output.field("Root", &stats.root);
    ctx.output.field("Quota", format_bytes(stats.usage.max_size));
    ctx.output.field("Size", format_bytes(stats.usage.total_size));
    ctx.output.field("Referenced", format_bytes(stats.usage.referenced_block_size));
    ctx.output.field("Blocks", stats.blocks);
    ctx.output.field("Chunks", stats.chunks);
    if let Some(block) = stats.current_block {
        ctx.output.field("Open block", block);
    }

    if stats.usage.total_size > stats.usage.max_size {
        ctx.output.warn("Install cache is over quota, run 'hoard purge'");
    }
    Ok(())
}
