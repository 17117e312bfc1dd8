//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the shared [`CommandContext`],
//! which owns the opened install cache.

use anyhow::Context;
use hoard_cache::{ContentHash, InstallCache, PassthroughDecoder, StaticContentProvider};
use hoard_config::InstallCacheConfig;
use std::sync::Arc;
use tracing::{info, warn};

pub mod purge;
pub mod put;
pub mod stat;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cache: Arc<InstallCache>,
    pub output: OutputHandler,
}

impl CommandContext {
    /// Open the cache described by `config`.
    ///
    /// The command line has no installed containers, so nothing is referenced
    /// and every block is eligible for eviction.
    pub fn open(config: InstallCacheConfig) -> anyhow::Result<Self> {
        let root = config.root_directory.clone();
        let cache = InstallCache::new(
            config,
            Arc::new(StaticContentProvider::new()),
            Arc::new(PassthroughDecoder),
        )
        .with_context(|| format!("Failed to open install cache '{}'", root))?;

        Ok(Self {
            cache: Arc::new(cache),
            output: OutputHandler::new(),
        })
    }

    /// Persist block access times
    pub fn shutdown(&self) {
        if let Err(e) = self.cache.shutdown() {
            warn!("Failed to journal block access times: {}", e);
        }
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::Stat { json } => stat::execute(json, ctx).await,
        Commands::Verify => {
            info!("Verifying install cache '{}'", ctx.cache.root());
            verify(ctx).await
        }
        Commands::Put { files } => {
            info!("Caching {} files", files.len());
            put::execute(files, ctx).await
        }
        Commands::Contains { hash } => contains(&hash, ctx).await,
        Commands::Purge { all } => purge::execute(all, ctx).await,
        Commands::Clear => clear(ctx).await,
    }
}

async fn verify(ctx: &CommandContext) -> anyhow::Result<()> {
    let report = ctx.cache.verify().context("Failed to verify install cache")?;

    ctx.output.field("Blocks", report.verified_blocks);
    ctx.output.field("Size", hoard_core::utils::format_bytes(report.verified_bytes));

    for block_id in &report.orphaned_blocks {
        ctx.output.warn(&format!("Removed orphaned block {}", block_id));
    }
    for block_id in &report.missing_blocks {
        ctx.output.warn(&format!("Missing block {}", block_id));
    }
    if !report.invalidated.is_empty() {
        ctx.output.warn(&format!(
            "Dropped {} chunks stored in missing blocks",
            report.invalidated.len()
        ));
    }

    if report.is_clean() {
        ctx.output.success("Install cache is consistent");
    }
    Ok(())
}

async fn contains(hash: &str, ctx: &CommandContext) -> anyhow::Result<()> {
    let hash: ContentHash = hash.parse().context("Invalid chunk hash")?;

    match ctx.cache.cas().find_chunk(&hash) {
        Some(lookup) => ctx.output.success(&format!(
            "{} is cached in block {} at offset {}",
            hash, lookup.location.block_id, lookup.location.block_offset
        )),
        None => ctx.output.info(&format!("{} is not cached", hash)),
    }
    Ok(())
}

async fn clear(ctx: &CommandContext) -> anyhow::Result<()> {
    ctx.cache.clear().context("Failed to clear install cache")?;
    ctx.output.success(&format!("Cleared install cache '{}'", ctx.cache.root()));
    Ok(())
}
