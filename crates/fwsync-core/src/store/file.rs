// # File Settings Store
//
// File-based implementation of SettingsStore with crash recovery.
//
// ## Purpose
//
// Persists the singleton settings record across daemon restarts. The record
// is created with defaults on first boot and migrated from legacy fields on
// every open.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good settings
// - Recovery: Falls back to backup if corruption detected, then to defaults
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "settings": {
//     "providers": "volcengine,aws",
//     "region": "cn-beijing",
//     "check_interval": 900,
//     ...
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::Settings;
use crate::traits::settings_store::SettingsStore;

/// Settings file format version
/// Used for future migration if format changes
const SETTINGS_FILE_VERSION: &str = "1.0";

/// Serializable settings file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SettingsFileFormat {
    version: String,
    settings: Settings,
}

/// What was found on disk at open time
enum Loaded {
    Found(Settings),
    Absent,
}

/// File-based settings store with crash recovery
///
/// The record is cached in memory; every save writes through to disk before
/// returning.
///
/// # Example
///
/// ```rust,no_run
/// use fwsync_core::store::FileSettingsStore;
/// use fwsync_core::traits::SettingsStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSettingsStore::open("/var/lib/fwsync/settings.json").await?;
///
///     let mut settings = store.load().await?;
///     settings.check_interval = 300;
///     store.save(&settings).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    settings: Arc<RwLock<Settings>>,
}

impl FileSettingsStore {
    /// Open (or create) a settings file
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the settings file, recovering from backup if it is corrupted
    /// 3. Write defaults if no usable record exists
    /// 4. Apply legacy migration and write back when anything changed
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create settings directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let (mut settings, mut needs_write) = match Self::load_with_recovery(&path).await? {
            Loaded::Found(settings) => (settings, false),
            Loaded::Absent => {
                tracing::info!("Creating default settings at {}", path.display());
                (Settings::default(), true)
            }
        };

        if settings.migrate_legacy() {
            tracing::info!("Migrated legacy settings fields");
            needs_write = true;
        }

        let store = Self {
            path,
            settings: Arc::new(RwLock::new(settings)),
        };

        if needs_write {
            let snapshot = store.settings.read().await.clone();
            store.write_settings(&snapshot).await?;
        }

        Ok(store)
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load the main settings file
    /// 2. If it does not parse, try the backup (and restore it)
    /// 3. If the backup also fails, treat the record as absent
    async fn load_with_recovery(path: &Path) -> Result<Loaded, Error> {
        let err = match Self::load_settings(path).await {
            Ok(loaded) => return Ok(loaded),
            Err(e @ Error::Json(_)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Settings file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with default settings.");
            return Ok(Loaded::Absent);
        }

        match Self::load_settings(&backup_path).await {
            Ok(Loaded::Found(settings)) => {
                tracing::info!("Recovered settings from backup");
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!(
                        "Failed to restore settings file from backup: {}",
                        restore_err
                    );
                }
                Ok(Loaded::Found(settings))
            }
            Ok(Loaded::Absent) => Ok(Loaded::Absent),
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with default settings.",
                    backup_err
                );
                Ok(Loaded::Absent)
            }
        }
    }

    async fn load_settings(path: &Path) -> Result<Loaded, Error> {
        if !path.exists() {
            tracing::debug!("Settings file does not exist: {}", path.display());
            return Ok(Loaded::Absent);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::settings_store(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: SettingsFileFormat = serde_json::from_str(&content)?;

        if file.version != SETTINGS_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                SETTINGS_FILE_VERSION,
                file.version
            );
        }

        Ok(Loaded::Found(file.settings))
    }

    /// Write settings to file atomically
    async fn write_settings(&self, settings: &Settings) -> Result<(), Error> {
        let file = SettingsFileFormat {
            version: SETTINGS_FILE_VERSION.to_string(),
            settings: settings.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::settings_store(format!("Failed to serialize settings: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::settings_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::settings_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.flush().await.map_err(|e| {
                Error::settings_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create settings backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::settings_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Settings written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<Settings, Error> {
        Ok(self.settings.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), Error> {
        // Hold the write lock across the disk write so saves never interleave
        let mut guard = self.settings.write().await;
        self.write_settings(settings).await?;
        *guard = settings.clone();
        Ok(())
    }
}
