// # File Audit Log
//
// JSON Lines implementation of AuditLog.
//
// ## File Format
//
// One entry per line, oldest first:
//
// ```text
// {"id":1,"timestamp":"2025-01-09T12:00:00Z","level":"INFO","message":"Starting IP check (providers=volcengine)"}
// {"id":2,"timestamp":"2025-01-09T12:00:01Z","level":"INFO","message":"current public IP: 203.0.113.5"}
// ```
//
// ## Write Strategy
//
// - Appends: one line per entry, opened in append mode
// - Prune/clear: full rewrite via temp file + rename; the highest id ever
//   issued is kept in a `.seq` file next to the log so ids stay monotonic
//   across `clear` and restarts
// - Unreadable lines are skipped on load; if any were skipped, or the file
//   does not end in a newline, it is rewritten from the readable entries
//   before the next append (a torn final line after a crash loses at most
//   that entry)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::audit_log::{AuditEntry, AuditLevel, AuditLog, LogPage};

#[derive(Debug)]
struct LogState {
    next_id: u64,
    /// Oldest first, mirrors the file
    entries: Vec<AuditEntry>,
}

/// Append-only audit log backed by a JSON Lines file
///
/// The file is read once at open; afterwards the in-memory copy serves reads
/// and every mutation writes through before returning.
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    path: PathBuf,
    state: Arc<Mutex<LogState>>,
}

impl FileAuditLog {
    /// Open (or create) an audit log file
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create audit log directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let (entries, needs_repair) = Self::load_entries(&path).await?;
        let high_water = Self::load_high_water(&path).await;
        let next_id = entries
            .iter()
            .map(|entry| entry.id)
            .max()
            .unwrap_or(0)
            .max(high_water);
        tracing::debug!("Loaded audit log: {} entries", entries.len());

        let log = Self {
            path,
            state: Arc::new(Mutex::new(LogState { next_id, entries })),
        };

        if needs_repair {
            let state = log.state.lock().await;
            tracing::warn!(
                "Repairing audit log {} ({} readable entries)",
                log.path.display(),
                state.entries.len()
            );
            log.rewrite(&state.entries, state.next_id).await?;
        }

        Ok(log)
    }

    fn seq_path(path: &Path) -> PathBuf {
        path.with_extension("seq")
    }

    /// Highest id issued before the last rewrite; 0 when unknown
    async fn load_high_water(path: &Path) -> u64 {
        match fs::read_to_string(Self::seq_path(path)).await {
            Ok(raw) => raw.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Readable entries, and whether the file needs rewriting before appends
    async fn load_entries(path: &Path) -> Result<(Vec<AuditEntry>, bool), Error> {
        if !path.exists() {
            return Ok((Vec::new(), false));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::audit_log(format!(
                "Failed to read audit log {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut entries = Vec::new();
        let mut skipped = 0;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        "Skipping unreadable audit log line {} in {}: {}",
                        line_no + 1,
                        path.display(),
                        e
                    );
                }
            }
        }

        let unterminated = !content.is_empty() && !content.ends_with('\n');
        Ok((entries, skipped > 0 || unterminated))
    }

    /// Append an entry with an explicit timestamp
    pub async fn record_at(
        &self,
        level: AuditLevel,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AuditEntry, Error> {
        let mut state = self.state.lock().await;

        let entry = AuditEntry {
            id: state.next_id + 1,
            timestamp,
            level,
            message: message.to_string(),
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::audit_log(format!(
                    "Failed to open audit log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            Error::audit_log(format!(
                "Failed to append to audit log {}: {}",
                self.path.display(),
                e
            ))
        })?;
        file.flush().await?;

        state.next_id = entry.id;
        state.entries.push(entry.clone());
        Ok(entry)
    }

    /// Rewrite the whole file atomically from `entries`
    ///
    /// `high_water` is persisted first so a crash between the two writes can
    /// only skip ids, never reuse them.
    async fn rewrite(&self, entries: &[AuditEntry], high_water: u64) -> Result<(), Error> {
        let seq_path = Self::seq_path(&self.path);
        fs::write(&seq_path, high_water.to_string()).await.map_err(|e| {
            Error::audit_log(format!(
                "Failed to write id high-water mark {}: {}",
                seq_path.display(),
                e
            ))
        })?;

        let mut body = String::new();
        for entry in entries {
            body.push_str(&serde_json::to_string(entry)?);
            body.push('\n');
        }

        let mut temp_path = self.path.clone();
        temp_path.set_extension("tmp");

        fs::write(&temp_path, body.as_bytes()).await.map_err(|e| {
            Error::audit_log(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::audit_log(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn record(&self, level: AuditLevel, message: &str) -> Result<AuditEntry, Error> {
        self.record_at(level, message, Utc::now()).await
    }

    async fn page(&self, page: usize) -> Result<LogPage, Error> {
        let state = self.state.lock().await;
        let newest_first: Vec<AuditEntry> = state.entries.iter().rev().cloned().collect();
        Ok(LogPage::from_newest_first(&newest_first, page))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, Error> {
        let state = self.state.lock().await;
        Ok(state.entries.iter().rev().take(limit).cloned().collect())
    }

    async fn clear(&self) -> Result<usize, Error> {
        let mut state = self.state.lock().await;
        let removed = state.entries.len();
        self.rewrite(&[], state.next_id).await?;
        state.entries.clear();
        Ok(removed)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, Error> {
        let mut state = self.state.lock().await;
        let kept: Vec<AuditEntry> = state
            .entries
            .iter()
            .filter(|entry| entry.timestamp >= cutoff)
            .cloned()
            .collect();
        let removed = state.entries.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        self.rewrite(&kept, state.next_id).await?;
        state.entries = kept;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = FileAuditLog::open(&path).await.unwrap();
        log.record(AuditLevel::Info, "one").await.unwrap();
        log.record(AuditLevel::Warning, "two").await.unwrap();

        let reopened = FileAuditLog::open(&path).await.unwrap();
        let recent = reopened.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "two");
        assert_eq!(recent[0].level, AuditLevel::Warning);

        // Identifiers continue after the highest persisted one
        let next = reopened.record(AuditLevel::Info, "three").await.unwrap();
        assert_eq!(next.id, 3);
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = FileAuditLog::open(&path).await.unwrap();
        log.record(AuditLevel::Info, "kept").await.unwrap();

        let mut content = fs::read_to_string(&path).await.unwrap();
        content.push_str("{\"id\":2,\"timest");
        fs::write(&path, content).await.unwrap();

        let reopened = FileAuditLog::open(&path).await.unwrap();
        assert_eq!(reopened.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_torn_line_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = FileAuditLog::open(&path).await.unwrap();
        log.record(AuditLevel::Info, "kept").await.unwrap();

        let mut content = fs::read_to_string(&path).await.unwrap();
        content.push_str("{\"id\":2,\"timest");
        fs::write(&path, content).await.unwrap();

        let recovered = FileAuditLog::open(&path).await.unwrap();
        recovered
            .record(AuditLevel::Warning, "after crash")
            .await
            .unwrap();

        let reopened = FileAuditLog::open(&path).await.unwrap();
        let messages: Vec<String> = reopened
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(messages, vec!["after crash".to_string(), "kept".to_string()]);
        assert!(fs::read_to_string(&path).await.unwrap().ends_with('\n'));
    }

    #[tokio::test]
    async fn test_ids_stay_monotonic_across_clear_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = FileAuditLog::open(&path).await.unwrap();
        for i in 0..3 {
            log.record(AuditLevel::Info, &format!("entry {}", i)).await.unwrap();
        }
        log.clear().await.unwrap();
        drop(log);

        let reopened = FileAuditLog::open(&path).await.unwrap();
        let next = reopened.record(AuditLevel::Info, "after clear").await.unwrap();
        assert_eq!(next.id, 4);
    }

    #[tokio::test]
    async fn test_prune_rewrites_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let now = Utc::now();

        let log = FileAuditLog::open(&path).await.unwrap();
        log.record_at(AuditLevel::Info, "stale", now - Duration::days(16))
            .await
            .unwrap();
        log.record_at(AuditLevel::Info, "fresh", now - Duration::days(14))
            .await
            .unwrap();

        let removed = log.prune_before(now - Duration::days(15)).await.unwrap();
        assert_eq!(removed, 1);

        let reopened = FileAuditLog::open(&path).await.unwrap();
        let remaining = reopened.recent(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "fresh");
    }

    #[tokio::test]
    async fn test_clear_and_paging() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = FileAuditLog::open(&path).await.unwrap();
        for i in 0..25 {
            log.record(AuditLevel::Info, &format!("entry {}", i)).await.unwrap();
        }

        let second = log.page(2).await.unwrap();
        assert_eq!(second.entries.len(), 5);
        assert_eq!(second.entries[0].message, "entry 4");
        assert_eq!(second.total_pages, 2);

        assert_eq!(log.clear().await.unwrap(), 25);
        assert_eq!(log.page(1).await.unwrap().total, 0);
        assert!(FileAuditLog::open(&path).await.unwrap().recent(1).await.unwrap().is_empty());
    }
}
