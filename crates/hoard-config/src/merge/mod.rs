//! Configuration layering, fallback logic, and environment overrides

use camino::Utf8PathBuf;
use hoard_core::error::HoardError;
use hoard_core::utils::parse_size;
use std::collections::HashMap;
use tracing::debug;

use crate::toml::{validate_config, InstallCacheConfig};
use crate::ConfigResult;

/// Environment variables understood by [`ConfigLayering::with_env`], mapped to config keys
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOARD_CACHE_DIR", "root_directory"),
    ("HOARD_DISK_QUOTA", "disk_quota"),
    ("HOARD_DROP_CACHE", "drop_cache"),
    ("HOARD_FORCE_SYNC_IO", "force_sync_io"),
    ("HOARD_MAX_BLOCK_SIZE", "max_block_size"),
    ("HOARD_MAX_PENDING_BYTES", "max_pending_bytes"),
];

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Config file given on the command line, if any
    config_path: Option<Utf8PathBuf>,
}

/// Configuration layering and merging
pub struct ConfigLayering {
    /// Config loaded from file or defaults
    base: InstallCacheConfig,
    /// Environment overrides
    env_overrides: HashMap<String, String>,
    /// CLI flag overrides
    cli_overrides: HashMap<String, String>,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Explicit or default config file
    File(Utf8PathBuf),
    /// No config file; built-in defaults
    Defaults,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(config_path: Option<Utf8PathBuf>) -> Self {
        Self { config_path }
    }

    /// Explicit path, else `<config dir>/hoard/config.toml`
    pub fn resolve_config_path(&self) -> Option<Utf8PathBuf> {
        if let Some(path) = &self.config_path {
            return Some(path.clone());
        }

        dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join("hoard").join("config.toml"))
    }

    /// Load the cache configuration with fallbacks.
    ///
    /// A missing explicit file is an error; a missing default file falls back
    /// to built-in defaults.
    pub async fn load(&self) -> ConfigResult<(InstallCacheConfig, ConfigSource)> {
        match self.resolve_config_path() {
            Some(path) if path.exists() => {
                let config = crate::toml::load_from_file(&path).await?;
                debug!("Loaded install cache config from '{}'", path);
                Ok((config.cache, ConfigSource::File(path)))
            }
            Some(path) if self.config_path.is_some() => Err(HoardError::ConfigValidation {
                field: "config".to_string(),
                reason: format!("config file '{}' does not exist", path),
            }),
            _ => Ok((InstallCacheConfig::default(), ConfigSource::Defaults)),
        }
    }
}

impl ConfigLayering {
    /// Create a new configuration layering system
    pub fn new(base: InstallCacheConfig) -> Self {
        Self {
            base,
            env_overrides: HashMap::new(),
            cli_overrides: HashMap::new(),
        }
    }

    /// Pick up `HOARD_*` overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_env_vars(std::env::vars())
    }

    /// Pick up `HOARD_*` overrides from the given variables
    pub fn with_env_vars<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some((_, key)) = ENV_OVERRIDES.iter().find(|(env, _)| *env == name) {
                self.env_overrides.insert(key.to_string(), value);
            }
        }
        self
    }

    /// Override a single key from a command line flag
    pub fn with_cli_override(mut self, key: &str, value: impl Into<String>) -> Self {
        self.cli_overrides.insert(key.to_string(), value.into());
        self
    }

    /// Apply base, then environment, then CLI overrides and validate the result
    pub fn resolve(self) -> ConfigResult<InstallCacheConfig> {
        let mut merged = self.base;

        for (key, value) in &self.env_overrides {
            apply_override(&mut merged, key, value)?;
        }

        for (key, value) in &self.cli_overrides {
            apply_override(&mut merged, key, value)?;
        }

        validate_config(&merged)?;
        Ok(merged)
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(HoardError::ConfigValidation {
            field: key.to_string(),
            reason: format!("'{}' is not a boolean", value),
        }),
    }
}

fn apply_override(config: &mut InstallCacheConfig, key: &str, value: &str) -> ConfigResult<()> {
    match key {
        "root_directory" => config.root_directory = Utf8PathBuf::from(value),
        "disk_quota" => config.disk_quota = parse_size(value)?,
        "drop_cache" => config.drop_cache = parse_bool(key, value)?,
        "force_sync_io" => config.force_sync_io = parse_bool(key, value)?,
        "max_block_size" => {
            config.max_block_size =
                u32::try_from(parse_size(value)?).map_err(|_| HoardError::ConfigValidation {
                    field: key.to_string(),
                    reason: format!("'{}' does not fit in 32 bits", value),
                })?
        }
        "max_pending_bytes" => config.max_pending_bytes = parse_size(value)?,
        _ => {
            return Err(HoardError::ConfigValidation {
                field: key.to_string(),
                reason: "unknown configuration key".to_string(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides_apply() {
        let config = ConfigLayering::new(InstallCacheConfig::with_root("/base"))
            .with_env_vars(vars(&[
                ("HOARD_CACHE_DIR", "/from/env"),
                ("HOARD_DISK_QUOTA", "16MiB"),
                ("HOARD_DROP_CACHE", "yes"),
                ("UNRELATED", "ignored"),
            ]))
            .resolve()
            .unwrap();

        assert_eq!(config.root_directory, Utf8PathBuf::from("/from/env"));
        assert_eq!(config.disk_quota, 16 << 20);
        assert!(config.drop_cache);
        assert!(!config.force_sync_io);
    }

    #[test]
    fn test_cli_overrides_win_over_env() {
        let config = ConfigLayering::new(InstallCacheConfig::with_root("/base"))
            .with_env_vars(vars(&[("HOARD_DISK_QUOTA", "16MiB")]))
            .with_cli_override("disk_quota", "1GiB")
            .resolve()
            .unwrap();

        assert_eq!(config.disk_quota, 1 << 30);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let result = ConfigLayering::new(InstallCacheConfig::default())
            .with_cli_override("force_sync_io", "maybe")
            .resolve();
        assert!(result.is_err());

        let result = ConfigLayering::new(InstallCacheConfig::default())
            .with_cli_override("max_block_size", "0")
            .resolve();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_loader_falls_back_to_explicit_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("hoard.toml")).unwrap();

        let loader = ConfigLoader::new(Some(path.clone()));
        assert!(loader.load().await.is_err());

        tokio::fs::write(&path, "[cache]\nroot_directory = \"/srv/hoard\"\n")
            .await
            .unwrap();
        let (config, source) = loader.load().await.unwrap();
        assert_eq!(config.root_directory, Utf8PathBuf::from("/srv/hoard"));
        assert_eq!(source, ConfigSource::File(path));
    }
}
