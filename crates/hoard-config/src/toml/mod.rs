//! hoard.toml configuration parsing and serialization

use camino::{Utf8Path, Utf8PathBuf};
use hoard_core::error::HoardError;
use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Default disk quota when none is configured (1 GiB)
pub const DEFAULT_DISK_QUOTA: u64 = 1 << 30;

/// Default cap on a single block file (32 MiB)
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 32 << 20;

/// Default amount of buffered chunk data before an implicit flush (4 MiB)
pub const DEFAULT_MAX_PENDING_BYTES: u64 = 4 << 20;

/// Complete hoard.toml configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HoardToml {
    /// Install cache section
    #[serde(default)]
    pub cache: InstallCacheConfig,
}

/// Install cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallCacheConfig {
    /// Directory holding `blocks/` and the journal
    pub root_directory: Utf8PathBuf,

    /// Maximum number of bytes the cache may occupy on disk
    #[serde(deserialize_with = "size_format::deserialize_u64")]
    pub disk_quota: u64,

    /// Delete the whole cache directory before opening it
    pub drop_cache: bool,

    /// Always read with a fresh synchronous handle, even from immutable blocks
    pub force_sync_io: bool,

    /// Block files stop accepting chunks once they reach this size
    #[serde(deserialize_with = "size_format::deserialize_u32")]
    pub max_block_size: u32,

    /// Buffered chunk bytes that trigger a flush on the next put
    #[serde(deserialize_with = "size_format::deserialize_u64")]
    pub max_pending_bytes: u64,
}

impl Default for InstallCacheConfig {
    fn default() -> Self {
        Self {
            root_directory: default_root_directory(),
            disk_quota: DEFAULT_DISK_QUOTA,
            drop_cache: false,
            force_sync_io: false,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

impl InstallCacheConfig {
    /// Config rooted at `root_directory` with default limits
    pub fn with_root(root_directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root_directory: root_directory.into(),
            ..Self::default()
        }
    }

    /// Path of the write-ahead journal inside the cache directory
    pub fn journal_path(&self) -> Utf8PathBuf {
        self.root_directory.join("cas.jrn")
    }
}

/// Platform cache directory, falling back to a relative `.hoard`
pub fn default_root_directory() -> Utf8PathBuf {
    dirs::cache_dir()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .map(|dir| dir.join("hoard").join("install-cache"))
        .unwrap_or_else(|| Utf8PathBuf::from(".hoard"))
}

mod size_format {
    use hoard_core::utils::parse_size;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Bytes(u64),
        Text(String),
    }

    pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match SizeValue::deserialize(deserializer)? {
            SizeValue::Bytes(value) => Ok(value),
            SizeValue::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
        }
    }

    pub fn deserialize_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = deserialize_u64(deserializer)?;
        u32::try_from(value)
            .map_err(|_| serde::de::Error::custom(format!("{} does not fit in 32 bits", value)))
    }
}

/// Translate a byte offset into 1-based line and column numbers
fn line_and_column(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map(|nl| offset - nl).unwrap_or(offset + 1);
    (line, column)
}

/// Parse TOML string to HoardToml configuration
pub fn parse_hoard_toml(content: &str) -> ConfigResult<HoardToml> {
    // toml_edit first for located syntax errors
    content.parse::<toml_edit::DocumentMut>().map_err(|e| {
        let (line, column) = e
            .span()
            .map(|span| line_and_column(content, span.start))
            .unwrap_or((0, 0));
        HoardError::TomlParse {
            message: e.message().to_string(),
            line,
            column,
        }
    })?;

    let config: HoardToml = toml::from_str(content).map_err(|e| {
        let (line, column) = e
            .span()
            .map(|span| line_and_column(content, span.start))
            .unwrap_or((0, 0));
        HoardError::TomlParse {
            message: e.message().to_string(),
            line,
            column,
        }
    })?;

    validate_config(&config.cache)?;

    Ok(config)
}

/// Serialize HoardToml to TOML string
pub fn serialize_hoard_toml(config: &HoardToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| HoardError::TomlParse {
        message: format!("TOML serialization error: {}", e),
        line: 0,
        column: 0,
    })
}

/// Validate install cache settings
pub fn validate_config(config: &InstallCacheConfig) -> ConfigResult<()> {
    if config.root_directory.as_str().is_empty() {
        return Err(HoardError::ConfigValidation {
            field: "cache.root_directory".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    if config.max_block_size == 0 {
        return Err(HoardError::ConfigValidation {
            field: "cache.max_block_size".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    if config.max_pending_bytes == 0 {
        return Err(HoardError::ConfigValidation {
            field: "cache.max_pending_bytes".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(())
}

/// Load and parse hoard.toml from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<HoardToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HoardError::io(format!("Failed to read {}", path), e))?;

    parse_hoard_toml(&content).map_err(|e| match e {
        HoardError::ConfigValidation { field, reason } => HoardError::ConfigValidation {
            field,
            reason: format!("{} (in {})", reason, path),
        },
        HoardError::TomlParse {
            message,
            line,
            column,
        } => HoardError::TomlParse {
            message: format!("In file {}: {}", path, message),
            line,
            column,
        },
        other => other,
    })
}
