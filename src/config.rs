//! Ambient configuration. Mirrors spec §6's external-interface note that
//! config loading is a collaborator, not core logic: one small TOML file,
//! environment overrides, sensible defaults, same partial-merge idiom the
//! rest of this family of tools uses.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const METADATA_DIR_NAME: &str = ".Distribox";
const DEFAULT_POLL_INTERVAL_MS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sync_root: PathBuf,
    pub poll_interval_ms: u64,
    pub metadata_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialConfig {
    sync_root: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    metadata_dir_name: Option<String>,
}

impl Config {
    pub fn default_for(sync_root: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            metadata_dir_name: METADATA_DIR_NAME.to_string(),
        }
    }

    pub fn config_path(sync_root: &Path) -> PathBuf {
        sync_root.join(METADATA_DIR_NAME).join("config.toml")
    }

    /// Loads `<sync_root>/.Distribox/config.toml` if present, falling back
    /// to defaults, then applies `DISTRIBOX_*` environment overrides on
    /// top — same precedence order as the tool-sync config this is
    /// descended from.
    pub fn load(sync_root: &Path) -> Result<Self> {
        let path = Self::config_path(sync_root);
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let partial: PartialConfig = toml::from_str(&raw)?;
            let defaults = Self::default_for(sync_root);
            Self {
                sync_root: partial.sync_root.unwrap_or(defaults.sync_root),
                poll_interval_ms: partial.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
                metadata_dir_name: partial
                    .metadata_dir_name
                    .unwrap_or(defaults.metadata_dir_name),
            }
        } else {
            Self::default_for(sync_root)
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = env::var("DISTRIBOX_POLL_INTERVAL_MS") {
            if let Ok(value) = raw.trim().parse() {
                self.poll_interval_ms = value;
            }
        }
        if let Ok(raw) = env::var("DISTRIBOX_METADATA_DIR_NAME") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.metadata_dir_name = trimmed.to_string();
            }
        }
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.sync_root.join(&self.metadata_dir_name)
    }

    pub fn version_list_path(&self) -> PathBuf {
        self.metadata_dir().join("VersionList.txt")
    }

    /// The on-disk Blob Pool directory, named `data` per the layout this
    /// peer's metadata directory exposes externally (§6).
    pub fn blob_pool_dir(&self) -> PathBuf {
        self.metadata_dir().join("data")
    }

    #[inline(never)]
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path(&self.sync_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(serialize_error)?;
        fs::write(path, serialized)
    }
}

fn serialize_error(err: toml::ser::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_without_file_uses_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        let cfg = Config::load(tmp.path())?;
        assert_eq!(cfg.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(cfg.metadata_dir_name, METADATA_DIR_NAME);
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut cfg = Config::default_for(tmp.path());
        cfg.poll_interval_ms = 750;
        cfg.save()?;

        let reloaded = Config::load(tmp.path())?;
        assert_eq!(reloaded.poll_interval_ms, 750);
        Ok(())
    }

    #[test]
    fn metadata_dir_is_under_sync_root() -> Result<()> {
        let tmp = TempDir::new()?;
        let cfg = Config::default_for(tmp.path());
        assert_eq!(cfg.metadata_dir(), tmp.path().join(".Distribox"));
        assert_eq!(cfg.blob_pool_dir(), tmp.path().join(".Distribox/data"));
        Ok(())
    }
}
