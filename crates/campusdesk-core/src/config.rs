//! Application configuration management.
//!
//! Configuration covers the backend URL, the route shown after logout, where
//! session data is persisted, and the last username used to log in.
//!
//! Configuration is stored at `~/.config/campusdesk/config.json`. Environment
//! variables override the file: `CAMPUSDESK_API_URL`, `CAMPUSDESK_STORAGE`
//! and `CAMPUSDESK_LANDING_PATH`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialStore, FileStore, KeyValueStore, KeyringStore, MemoryStore};

/// Application name used for config/storage directory paths
const APP_NAME: &str = "campusdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Where session data is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" | "keychain" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!("Unknown storage kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub landing_path: String,
    pub storage: StorageKind,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            landing_path: crate::auth::DEFAULT_LANDING_PATH.to_string(),
            storage: StorageKind::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the config file (defaults if absent), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("CAMPUSDESK_API_URL") {
            self.api_base_url = url;
        }
        if let Some(path) = var("CAMPUSDESK_LANDING_PATH") {
            self.landing_path = path;
        }
        if let Some(kind) = var("CAMPUSDESK_STORAGE") {
            self.storage = kind.parse()?;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for file-backed session storage and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Credential store over the configured storage backend
    pub fn credential_store(&self) -> Result<CredentialStore> {
        let storage: Arc<dyn KeyValueStore> = match self.storage {
            StorageKind::File => Arc::new(FileStore::new(self.data_dir()?)),
            StorageKind::Keyring => Arc::new(KeyringStore::new()),
            StorageKind::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(CredentialStore::new(storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("file".parse::<StorageKind>().unwrap(), StorageKind::File);
        assert_eq!("Keychain".parse::<StorageKind>().unwrap(), StorageKind::Keyring);
        assert_eq!(" memory ".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("cookie".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage": "keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageKind::Keyring);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.landing_path, "/login");
        assert_eq!(config.last_username, None);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CAMPUSDESK_API_URL", "https://school.example/api"),
            ("CAMPUSDESK_STORAGE", "memory"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_base_url, "https://school.example/api");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.landing_path, "/login");
    }

    #[test]
    fn test_env_override_rejects_unknown_storage() {
        let mut config = Config::default();
        assert!(config
            .apply_env(|key| (key == "CAMPUSDESK_STORAGE").then(|| "cookie".to_string()))
            .is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = std::env::temp_dir().join("campusdesk-missing-config.json");
        let _ = std::fs::remove_file(&path);
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage, StorageKind::File);
    }

    #[test]
    fn test_memory_credential_store() {
        let config = Config {
            storage: StorageKind::Memory,
            ..Config::default()
        };
        let store = config.credential_store().unwrap();
        assert_eq!(store.get(), None);
    }
}
