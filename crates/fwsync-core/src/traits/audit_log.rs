// # Audit Log Trait
//
// Defines the interface for the operator-facing audit trail.
//
// ## Purpose
//
// Every decision point of a run (resolved IP, skipped provider, synced port,
// revoke, authorize, failure) produces one entry. Entries are immutable once
// written; the only deletions are the retention sweep and an explicit clear.
//
// ## Implementations
//
// - File-based: JSON Lines (`FileAuditLog`)
// - In-memory: for tests (`MemoryAuditLog`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entries per page of [`AuditLog::page`]
pub const PAGE_SIZE: usize = 20;

/// Entries returned by the "recent" view
pub const RECENT_LIMIT: usize = 50;

/// Entries older than this are removed by the retention sweep
pub const RETENTION_DAYS: i64 = 15;

/// Severity of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    /// Normal progress
    Info,
    /// Degraded but continuing
    Warning,
    /// A unit of work failed
    Error,
}

impl AuditLevel {
    /// Upper-case label, as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warning => "WARNING",
            AuditLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic identifier
    pub id: u64,
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: AuditLevel,
    /// Human-readable message
    pub message: String,
}

/// One page of entries, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPage {
    /// Entries on this page
    pub entries: Vec<AuditEntry>,
    /// 1-based page number
    pub page: usize,
    /// `ceil(total / PAGE_SIZE)`
    pub total_pages: usize,
    /// Total entries in the log
    pub total: usize,
    /// A previous page exists
    pub has_prev: bool,
    /// A next page exists
    pub has_next: bool,
}

impl LogPage {
    /// Slice one page out of a newest-first list
    ///
    /// Page numbers below 1 are treated as 1. A page past the end is empty.
    pub fn from_newest_first(all: &[AuditEntry], page: usize) -> Self {
        let page = page.max(1);
        let total = all.len();
        let total_pages = total.div_ceil(PAGE_SIZE);
        let offset = (page - 1).saturating_mul(PAGE_SIZE);

        let entries = all.iter().skip(offset).take(PAGE_SIZE).cloned().collect();

        Self {
            entries,
            page,
            total_pages,
            total,
            has_prev: page > 1,
            has_next: page < total_pages,
        }
    }
}

/// Trait for audit log implementations
///
/// # Thread Safety
///
/// Writers may race (scheduler run, manual run, control API clear). Each
/// method is atomic with respect to the others; callers never do
/// read-modify-write.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an entry stamped with the current time
    async fn record(&self, level: AuditLevel, message: &str) -> Result<AuditEntry, crate::Error>;

    /// One page (1-based) of entries, newest first
    async fn page(&self, page: usize) -> Result<LogPage, crate::Error>;

    /// Newest `limit` entries, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, crate::Error>;

    /// Delete every entry, returning how many were removed
    async fn clear(&self) -> Result<usize, crate::Error>;

    /// Delete entries strictly older than `cutoff`, returning how many were removed
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: u64) -> Vec<AuditEntry> {
        (0..n)
            .rev()
            .map(|id| AuditEntry {
                id,
                timestamp: Utc::now(),
                level: AuditLevel::Info,
                message: format!("entry {}", id),
            })
            .collect()
    }

    #[test]
    fn test_page_math() {
        let all = entries(45);

        let first = LogPage::from_newest_first(&all, 1);
        assert_eq!(first.entries.len(), 20);
        assert_eq!(first.entries[0].id, 44);
        assert_eq!(first.total_pages, 3);
        assert!(!first.has_prev);
        assert!(first.has_next);

        let last = LogPage::from_newest_first(&all, 3);
        assert_eq!(last.entries.len(), 5);
        assert!(last.has_prev);
        assert!(!last.has_next);

        let beyond = LogPage::from_newest_first(&all, 9);
        assert!(beyond.entries.is_empty());
        assert!(!beyond.has_next);
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let page = LogPage::from_newest_first(&entries(3), 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_empty_log() {
        let page = LogPage::from_newest_first(&[], 1);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_prev);
        assert!(!page.has_next);
    }

    #[test]
    fn test_level_serializes_upper_case() {
        let json = serde_json::to_string(&AuditLevel::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
