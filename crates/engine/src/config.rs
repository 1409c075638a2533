// Local configuration files for the engine.
//
// Global config: `~/.gridsync/config.toml`
// Panel config:  `~/.gridsync/panels/<provider>.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gridsync_common::schema::SheetSchema;
use gridsync_common::types::DEFAULT_CHUNK_ROWS;
use thiserror::Error;
use tracing::debug;

use crate::panel::PanelSettings;
use crate::store::file::FileStoreOptions;
use crate::watcher::debounce::{DebounceConfig, DEFAULT_DEBOUNCE_MS};
use crate::watcher::pump::PumpConfig;

/// Root directory for gridsync global state: `~/.gridsync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".gridsync"))
}

/// Path to the global config file: `~/.gridsync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Global config ──────────────────────────────────────────────────

/// Global engine configuration at `~/.gridsync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GlobalConfig {
    pub panel: PanelSection,
    pub watch: WatchSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PanelSection {
    /// Rows fetched per read.
    pub chunk_size: u32,
    /// Upper bound on any single store call.
    pub request_timeout_ms: u64,
    /// Entries kept in the recent-files history.
    pub recent_files_limit: usize,
}

impl Default for PanelSection {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_ROWS, request_timeout_ms: 30_000, recent_files_limit: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchSection {
    /// Debounce window for file events; clamped to 50..=2000.
    pub debounce_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self { debounce_ms: DEFAULT_DEBOUNCE_MS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StoreSection {
    pub backup_before_apply: bool,
}

impl GlobalConfig {
    /// Load from `~/.gridsync/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        write_toml(path, self)
    }

    pub fn panel_settings(&self) -> PanelSettings {
        PanelSettings {
            chunk_size: self.panel.chunk_size.max(1),
            request_timeout: Duration::from_millis(self.panel.request_timeout_ms.max(1)),
            recent_files_limit: self.panel.recent_files_limit,
        }
    }

    pub fn file_store_options(&self) -> FileStoreOptions {
        FileStoreOptions {
            backup_before_apply: self.store.backup_before_apply,
            pump: PumpConfig {
                debounce: DebounceConfig::with_millis(self.watch.debounce_ms),
                ..PumpConfig::default()
            },
        }
    }
}

// ── Panel config ───────────────────────────────────────────────────

/// What a panel remembers between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PanelConfig {
    pub file_path: Option<PathBuf>,
    pub active_sheet: Option<String>,
    pub active_range: Option<String>,
    pub recent_files: Vec<PathBuf>,
    pub watch_enabled: bool,
    // Last: TOML tables must follow plain values.
    pub schema: Option<SheetSchema>,
}

/// Persistence for panel configuration, keyed by provider name.
pub trait ConfigStore: Send + Sync {
    fn get_config(&self, provider: &str) -> Result<Option<PanelConfig>, ConfigError>;
    fn save_config(&self, provider: &str, config: &PanelConfig) -> Result<(), ConfigError>;
}

/// One TOML file per provider under a directory
/// (default `~/.gridsync/panels/`).
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `~/.gridsync/panels/`.
    pub fn default_location() -> Option<Self> {
        global_dir().map(|d| Self::new(d.join("panels")))
    }

    fn path_for(&self, provider: &str) -> Result<PathBuf, ConfigError> {
        let valid = !provider.is_empty()
            && provider.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ConfigError::InvalidProvider(provider.to_string()));
        }
        Ok(self.dir.join(format!("{provider}.toml")))
    }
}

impl ConfigStore for FileConfigStore {
    fn get_config(&self, provider: &str) -> Result<Option<PanelConfig>, ConfigError> {
        let path = self.path_for(provider)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(toml::from_str(&contents)?))
    }

    fn save_config(&self, provider: &str, config: &PanelConfig) -> Result<(), ConfigError> {
        let path = self.path_for(provider)?;
        write_toml(&path, config)?;
        debug!(provider, path = %path.display(), "panel config saved");
        Ok(())
    }
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(value)?;
    std::fs::write(path, contents)?;
    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid provider name `{0}`")]
    InvalidProvider(String),
}
