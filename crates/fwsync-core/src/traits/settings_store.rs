// # Settings Store Trait
//
// Defines the interface for persisting the singleton settings record.
//
// ## Implementations
//
// - File-based: JSON file (`FileSettingsStore`)
// - In-memory: for tests (`MemorySettingsStore`)

use crate::config::Settings;
use async_trait::async_trait;

/// Trait for settings store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently. The engine loads one
/// snapshot per run while the control API may save at any time; writes become
/// visible on the next load.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the current settings
    ///
    /// A store with no record yet returns [`Settings::default`].
    async fn load(&self) -> Result<Settings, crate::Error>;

    /// Replace the stored settings
    async fn save(&self, settings: &Settings) -> Result<(), crate::Error>;
}
