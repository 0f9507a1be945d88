// src/config.rs
//
// Configuration management with layered hierarchy:
// 1. built-in defaults
// 2. user config (<config dir>/almacen-offline/config.toml)
// 3. project config (./almacen.toml)
// 4. environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::infrastructure::tabular::{DEFAULT_CHUNK_BYTES, PREVIEW_ROWS};

pub const APP_DIR_NAME: &str = "almacen-offline";
pub const PROJECT_CONFIG_FILE: &str = "almacen.toml";

pub const ENV_DATA_DIR: &str = "ALMACEN_DATA_DIR";
pub const ENV_BASE_URL: &str = "ALMACEN_BASE_URL";
pub const ENV_BATCH_SIZE: &str = "ALMACEN_BATCH_SIZE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub import: ImportConfig,
    pub search: SearchConfig,
    pub assets: AssetsConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to the platform data directory
    pub data_dir: Option<PathBuf>,
    pub database_file: String,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: "almacen.db".to_string(),
            pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Input bytes consumed per read chunk
    pub chunk_bytes: usize,
    /// Rows merged per store flush
    pub batch_size: usize,
    pub preview_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            batch_size: 1000,
            preview_rows: PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub fuzzy: f64,
    pub prefix: bool,
    /// Rows listed when the query is empty
    pub page_size: usize,
    pub result_limit: usize,
    pub suggestion_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fuzzy: 0.2,
            prefix: true,
            page_size: 200,
            result_limit: 200,
            suggestion_limit: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Deployment base URL; asset caching is disabled when unset
    pub base_url: Option<String>,
    pub manifest_version: String,
    /// Relative entries resolve against `base_url`
    pub entries: Vec<String>,
    /// Served to document requests when both network and cache miss
    pub offline_document: String,
    /// No timeout when unset
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            manifest_version: "v1".to_string(),
            entries: vec![
                "./".to_string(),
                "index.html".to_string(),
                "manifest.webmanifest".to_string(),
                "assets/styles.css".to_string(),
                "assets/app.js".to_string(),
                "offline.html".to_string(),
            ],
            offline_document: "offline.html".to_string(),
            fetch_timeout_secs: None,
        }
    }
}

impl AssetsConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

impl AppConfig {
    /// Load configuration from all sources, merging in priority order.
    ///
    /// A file that exists but does not parse is an error; missing files are
    /// skipped.
    pub fn load() -> AppResult<Self> {
        let mut layers = Vec::new();
        if let Some(global_path) = Self::global_config_path() {
            layers.push(global_path);
        }
        layers.push(PathBuf::from(PROJECT_CONFIG_FILE));

        let mut config = Self::from_files(&layers)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Merge the given files over the defaults; later files win.
    pub fn from_files(paths: &[PathBuf]) -> AppResult<Self> {
        let mut merged = toml::Value::try_from(AppConfig::default())
            .map_err(|e| AppError::Config(e.to_string()))?;

        for path in paths {
            if !path.exists() {
                continue;
            }
            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Table = toml::from_str(&contents).map_err(|e| {
                AppError::Config(format!("{}: {}", path.display(), e))
            })?;
            log::debug!("Loaded config layer {}", path.display());
            merge_tables(&mut merged, toml::Value::Table(layer));
        }

        let config: AppConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| AppError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Parse a single TOML document over the defaults.
    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.assets.base_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.import.batch_size = raw.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a positive integer, got '{}'", ENV_BATCH_SIZE, raw))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.storage.database_file.trim().is_empty() {
            return Err(AppError::Config("storage.database_file must not be empty".into()));
        }
        if self.storage.pool_size == 0 {
            return Err(AppError::Config("storage.pool_size must be at least 1".into()));
        }
        if self.import.batch_size == 0 {
            return Err(AppError::Config("import.batch_size must be at least 1".into()));
        }
        if self.import.chunk_bytes == 0 {
            return Err(AppError::Config("import.chunk_bytes must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.search.fuzzy) {
            return Err(AppError::Config(format!(
                "search.fuzzy must be within [0, 1], got {}",
                self.search.fuzzy
            )));
        }
        if self.search.page_size == 0 {
            return Err(AppError::Config("search.page_size must be at least 1".into()));
        }
        if self.history.limit == 0 {
            return Err(AppError::Config("history.limit must be at least 1".into()));
        }
        if let Some(base_url) = &self.assets.base_url {
            reqwest::Url::parse(base_url).map_err(|e| {
                AppError::Config(format!("assets.base_url '{}' is invalid: {}", base_url, e))
            })?;
        }
        Ok(())
    }

    /// Directory holding the database
    pub fn data_dir(&self) -> AppResult<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR_NAME))
                .ok_or_else(|| AppError::Config("No platform data directory; set ALMACEN_DATA_DIR".into())),
        }
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
    }

    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Deep-merge `layer` into `base`; tables merge key by key, anything else
/// replaces.
fn merge_tables(base: &mut toml::Value, layer: toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_tables(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.import.batch_size, 1000);
        assert_eq!(config.import.chunk_bytes, 64 * 1024);
        assert_eq!(config.search.page_size, 200);
        assert_eq!(config.history.limit, 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str("[search]\nfuzzy = 0.3\n").unwrap();
        assert_eq!(config.search.fuzzy, 0.3);
        assert!(config.search.prefix);
        assert_eq!(config.import.batch_size, 1000);
    }

    #[test]
    fn test_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("project.toml");

        let mut f = std::fs::File::create(&user).unwrap();
        writeln!(f, "[import]\nbatch_size = 10\npreview_rows = 5").unwrap();
        let mut f = std::fs::File::create(&project).unwrap();
        writeln!(f, "[import]\nbatch_size = 20").unwrap();

        let missing = dir.path().join("missing.toml");
        let config = AppConfig::from_files(&[user, missing, project]).unwrap();
        assert_eq!(config.import.batch_size, 20);
        assert_eq!(config.import.preview_rows, 5);
        assert_eq!(config.import.chunk_bytes, DEFAULT_CHUNK_BYTES);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[import\nbatch_size = ").unwrap();

        let err = AppConfig::from_files(&[path]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATA_DIR, "/tmp/almacen"),
            (ENV_BASE_URL, "https://example.com/almacen/"),
            (ENV_BATCH_SIZE, "250"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/almacen")));
        assert_eq!(config.assets.base_url.as_deref(), Some("https://example.com/almacen/"));
        assert_eq!(config.import.batch_size, 250);
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/almacen"));
    }

    #[test]
    fn test_bad_env_batch_size() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == ENV_BATCH_SIZE).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.search.fuzzy = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.import.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.assets.base_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almacen.toml");

        let mut config = AppConfig::default();
        config.assets.base_url = Some("https://example.com/".to_string());
        config.write_to(&path).unwrap();

        let loaded = AppConfig::from_files(&[path]).unwrap();
        assert_eq!(loaded, config);
    }
}
