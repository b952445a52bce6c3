use crate::app_dirs::AppDirs;
use crate::error::ConfigError;
use crate::session::TimezonePolicy;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

/// User preferences. Missing fields fall back to their defaults so older
/// files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub timezone_policy: TimezonePolicy,
    pub default_hourly_rate: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone_policy: TimezonePolicy::AssumeUtc,
            default_hourly_rate: None,
        }
    }
}

impl Config {
    /// Explicit rate wins over the remembered default; no rate at all earns
    /// nothing.
    pub fn hourly_rate_or(&self, explicit: Option<f64>) -> f64 {
        explicit.or(self.default_hourly_rate).unwrap_or(0.0)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path =
            AppDirs::config_path().unwrap_or_else(|| PathBuf::from("questlog_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Config::default(),
        };

        serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|e| {
            log::warn!(
                "ignoring unreadable config {}: {}",
                self.path.display(),
                e
            );
            Config::default()
        })
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        log::debug!("saved config to {}", self.path.display());
        Ok(())
    }
}

/// Non-persistent store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    cfg: RefCell<Config>,
}

impl MemoryConfigStore {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg: RefCell::new(cfg),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Config {
        self.cfg.borrow().clone()
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        *self.cfg.borrow_mut() = cfg.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            timezone_policy: TimezonePolicy::AssumeLocal,
            default_hourly_rate: Some(42.5),
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"default_hourly_rate":25.0}"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.default_hourly_rate, Some(25.0));
        assert_eq!(cfg.timezone_policy, TimezonePolicy::AssumeUtc);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            br#"{"theme":"dark","quest_filter":{"rarity":"epic"},"timezone_policy":"reject"}"#,
        )
        .unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.timezone_policy, TimezonePolicy::Reject);

        // Saving writes back only the settings questlog uses
        FileConfigStore::with_path(&path).save(&cfg).unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let keys: Vec<&String> = written.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(written.get("theme").is_none());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryConfigStore::default();
        let mut cfg = store.load();
        cfg.timezone_policy = TimezonePolicy::AssumeLocal;
        store.save(&cfg).unwrap();
        assert_eq!(store.load().timezone_policy, TimezonePolicy::AssumeLocal);
    }

    #[test]
    fn hourly_rate_resolution() {
        let mut cfg = Config::default();
        assert_eq!(cfg.hourly_rate_or(None), 0.0);
        cfg.default_hourly_rate = Some(30.0);
        assert_eq!(cfg.hourly_rate_or(None), 30.0);
        assert_eq!(cfg.hourly_rate_or(Some(12.0)), 12.0);
    }
}
