//! `hoard purge` command implementation.

use anyhow::Context;
use hoard_cache::PurgeReport;
use hoard_core::utils::format_bytes;
use std::collections::HashMap;

use super::CommandContext;

/// Execute the `hoard purge` command
pub async fn execute(all: bool, ctx: &CommandContext) -> anyhow::Result<()> {
    let report = if all {
        ctx.cache.purge_all_unreferenced()
    } else {
        ctx.cache.purge(HashMap::new())
    }
    .context("Failed to purge install cache")?;

    print_report(&report, ctx);
    Ok(())
}

fn print_report(report: &PurgeReport, ctx: &CommandContext) {
    if report.purged_blocks.is_empty() {
        ctx.output.success(&format!(
            "Nothing to purge, {} of {} used",
            format_bytes(report.cached_bytes),
            format_bytes(report.max_size)
        ));
        return;
    }

    ctx.output.field("Purged blocks", report.purged_blocks.len());
    ctx.output.field("Purged", format_bytes(report.purged_bytes));
    ctx.output.field("Remaining", format_bytes(report.remaining_bytes()));
    ctx.output.field("Referenced", format_bytes(report.referenced_bytes));

    if report.is_over_quota() {
        ctx.output.warn("Install cache is still over quota");
    } else {
        ctx.output.success("Install cache is within quota");
    }
}
