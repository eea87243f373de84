//! Audit trail stores: in-memory and append-only JSONL file.

use async_trait::async_trait;
use civic_types::{AuditLogEntry, AuditStore, AuditStoreError};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// In-memory implementation of AuditStore (process lifetime only).
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn list_for_issue(&self, issue_id: &str) -> Result<Vec<AuditLogEntry>, AuditStoreError> {
        let guard = self.entries.read().await;
        let mut out: Vec<AuditLogEntry> = guard
            .iter()
            .filter(|e| e.issue_id == issue_id)
            .cloned()
            .collect();
        newest_first(&mut out);
        Ok(out)
    }
}

/// JSONL file-backed AuditStore (persists across restarts). Lines are only ever appended.
pub struct JsonlAuditStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlAuditStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError> {
        let _guard = self.append_lock.lock().await;
        let line =
            serde_json::to_string(&entry).map_err(|e| AuditStoreError::Other(e.to_string()))?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        f.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        f.flush()
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        Ok(())
    }

    async fn list_for_issue(&self, issue_id: &str) -> Result<Vec<AuditLogEntry>, AuditStoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditStoreError::Other(e.to_string())),
        };
        let mut out: Vec<AuditLogEntry> = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // A torn final line from a crash mid-append is skipped.
            if let Ok(entry) = serde_json::from_str::<AuditLogEntry>(line) {
                if entry.issue_id == issue_id {
                    out.push(entry);
                }
            }
        }
        newest_first(&mut out);
        Ok(out)
    }
}

/// Audit store whose appends can be switched to fail, for exercising rollback paths.
#[cfg(any(test, feature = "test-util"))]
pub struct FlakyAuditStore {
    inner: InMemoryAuditStore,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-util"))]
impl FlakyAuditStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryAuditStore::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for FlakyAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl AuditStore for FlakyAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AuditStoreError::Other("disk full".to_string()));
        }
        self.inner.append(entry).await
    }

    async fn list_for_issue(&self, issue_id: &str) -> Result<Vec<AuditLogEntry>, AuditStoreError> {
        self.inner.list_for_issue(issue_id).await
    }
}

/// Append order is chronological; reverse it, then stable-sort by timestamp so
/// entries written out of clock order still come back newest first.
pub(crate) fn newest_first(entries: &mut [AuditLogEntry]) {
    entries.reverse();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use civic_types::AuditAction;

    fn entry(issue: &str, details: &str, offset_secs: i64) -> AuditLogEntry {
        AuditLogEntry::new(
            issue,
            "auth-1",
            AuditAction::StatusChange,
            details,
            Utc::now() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn in_memory_lists_newest_first_per_issue() {
        let store = InMemoryAuditStore::new();
        store.append(entry("i1", "first", 0)).await.unwrap();
        store.append(entry("i2", "other", 1)).await.unwrap();
        store.append(entry("i1", "second", 2)).await.unwrap();

        let history = store.list_for_issue("i1").await.unwrap();
        let details: Vec<&str> = history.iter().map(|e| e.details.as_str()).collect();
        assert_eq!(details, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn same_timestamp_keeps_reverse_append_order() {
        let store = InMemoryAuditStore::new();
        let at = Utc::now();
        for d in ["a", "b", "c"] {
            store
                .append(AuditLogEntry::new("i1", "u", AuditAction::StatusChange, d, at))
                .await
                .unwrap();
        }
        let history = store.list_for_issue("i1").await.unwrap();
        let details: Vec<&str> = history.iter().map(|e| e.details.as_str()).collect();
        assert_eq!(details, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn jsonl_persists_across_instances() {
        let path = std::env::temp_dir().join(format!("civic-audit-{}.jsonl", uuid::Uuid::new_v4()));
        {
            let store = JsonlAuditStore::new(&path);
            store.append(entry("i1", "first", 0)).await.unwrap();
            store.append(entry("i1", "second", 1)).await.unwrap();
        }
        let reopened = JsonlAuditStore::new(&path);
        let history = reopened.list_for_issue("i1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].details, "second");
        assert!(reopened.list_for_issue("i2").await.unwrap().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn flaky_store_fails_only_while_switched_on() {
        let store = FlakyAuditStore::new();
        store.set_failing(true);
        let err = store.append(entry("i1", "lost", 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "audit store error: disk full");
        store.set_failing(false);
        store.append(entry("i1", "kept", 1)).await.unwrap();
        let history = store.list_for_issue("i1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].details, "kept");
    }

    #[tokio::test]
    async fn jsonl_missing_file_is_empty_history() {
        let path = std::env::temp_dir().join(format!("civic-audit-{}.jsonl", uuid::Uuid::new_v4()));
        let store = JsonlAuditStore::new(&path);
        assert!(store.list_for_issue("i1").await.unwrap().is_empty());
    }
}
