//! Configuration parsing for the Hoard install cache
//!
//! This crate handles parsing and validation of hoard.toml files and layers
//! environment and command line overrides on top, producing the
//! [`InstallCacheConfig`] the cache is constructed from.

pub mod merge;
pub mod toml;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use toml::{HoardToml, InstallCacheConfig};

use hoard_core::error::HoardError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, HoardError>;
