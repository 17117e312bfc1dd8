//! # hoard
//!
//! Command line tool for inspecting and maintaining a Hoard install cache.
//!
//! This is the main entry point. It parses arguments, sets up logging, resolves
//! the layered configuration and dispatches to the command handlers.

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use hoard_config::{ConfigLayering, ConfigLoader, InstallCacheConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Inspect and maintain a Hoard install cache
#[derive(Parser)]
#[command(name = "hoard", version, about = "Inspect and maintain a Hoard install cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file, defaults to <config dir>/hoard/config.toml
    #[arg(long, global = true, env = "HOARD_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    /// Cache directory, overrides the config file and environment
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Disk quota such as 512MiB, overrides the config file and environment
    #[arg(long, global = true, value_name = "SIZE")]
    pub quota: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show disk usage
    Stat {
        #[arg(long)]
        json: bool,
    },
    /// Check block files against the journal
    Verify,
    /// Cache files, one chunk per file
    Put {
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,
    },
    /// Check whether a chunk is cached
    Contains {
        /// Hex encoded BLAKE3 hash
        hash: String,
    },
    /// Evict blocks until the cache fits its quota
    Purge {
        /// Evict every unreferenced block regardless of quota
        #[arg(long)]
        all: bool,
    },
    /// Delete every cached chunk
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    debug!("Starting hoard v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", ErrorFormatter::new().format_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let config = load_config(&cli).await?;
        let ctx = CommandContext::open(config)?;

        let result = commands::dispatch_command(cli.command, &ctx).await;
        ctx.shutdown();
        result
    })
}

/// Config file or defaults, then `HOARD_*` variables, then flags
async fn load_config(cli: &Cli) -> anyhow::Result<InstallCacheConfig> {
    let (base, source) = ConfigLoader::new(cli.config.clone())
        .load()
        .await
        .context("Failed to load configuration")?;
    debug!("Configuration source: {:?}", source);

    let mut layering = ConfigLayering::new(base).with_env();
    if let Some(dir) = &cli.cache_dir {
        layering = layering.with_cli_override("root_directory", dir.as_str());
    }
    if let Some(quota) = &cli.quota {
        layering = layering.with_cli_override("disk_quota", quota.as_str());
    }

    Ok(layering.resolve()?)
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("hoard={},hoard_cache={},hoard_config={}", level, level, level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("hoard encountered an unexpected error: {}", panic_info);
        eprintln!("hoard crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
