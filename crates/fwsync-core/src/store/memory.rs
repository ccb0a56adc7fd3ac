// # Memory Stores
//
// In-memory implementations of SettingsStore and AuditLog.
//
// ## Purpose
//
// Fast stores that don't persist across restarts. Used by the contract tests
// and by embedders that own persistence themselves.
//
// ## Crash Behavior
//
// - Settings fall back to whatever the store was constructed with
// - The audit trail is lost

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::Settings;
use crate::traits::audit_log::{AuditEntry, AuditLevel, AuditLog, LogPage};
use crate::traits::settings_store::SettingsStore;

/// In-memory settings store
///
/// # Example
///
/// ```rust
/// use fwsync_core::store::MemorySettingsStore;
/// use fwsync_core::traits::SettingsStore;
/// use fwsync_core::Settings;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySettingsStore::new(Settings {
///         providers: "aws".into(),
///         ..Settings::default()
///     });
///
///     let settings = store.load().await?;
///     assert_eq!(settings.providers, "aws");
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<RwLock<Settings>>,
}

impl MemorySettingsStore {
    /// Create a store holding `settings`
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), Error> {
        *self.inner.write().await = settings.clone();
        Ok(())
    }
}

/// Entries plus the next identifier to hand out
#[derive(Debug, Default)]
struct AuditBuffer {
    next_id: u64,
    /// Oldest first
    entries: Vec<AuditEntry>,
}

impl AuditBuffer {
    fn push(&mut self, level: AuditLevel, message: &str, timestamp: DateTime<Utc>) -> AuditEntry {
        self.next_id += 1;
        let entry = AuditEntry {
            id: self.next_id,
            timestamp,
            level,
            message: message.to_string(),
        };
        self.entries.push(entry.clone());
        entry
    }
}

/// In-memory audit log
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    inner: Arc<RwLock<AuditBuffer>>,
}

impl MemoryAuditLog {
    /// Create an empty audit log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with an explicit timestamp
    pub async fn record_at(
        &self,
        level: AuditLevel,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        self.inner.write().await.push(level, message, timestamp)
    }

    /// Every entry, oldest first
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.inner.read().await.entries.clone()
    }

    /// Every message, oldest first
    pub async fn messages(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Get the number of entries
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Check if the log is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, level: AuditLevel, message: &str) -> Result<AuditEntry, Error> {
        Ok(self.record_at(level, message, Utc::now()).await)
    }

    async fn page(&self, page: usize) -> Result<LogPage, Error> {
        let guard = self.inner.read().await;
        let newest_first: Vec<AuditEntry> = guard.entries.iter().rev().cloned().collect();
        Ok(LogPage::from_newest_first(&newest_first, page))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.entries.iter().rev().take(limit).cloned().collect())
    }

    async fn clear(&self) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        let removed = guard.entries.len();
        guard.entries.clear();
        Ok(removed)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        let before = guard.entries.len();
        guard.entries.retain(|entry| entry.timestamp >= cutoff);
        Ok(before - guard.entries.len())
    }
}
