//! SQLite-backed issue and audit stores.
//!
//! Each issue is stored as a JSON document plus the indexed columns that the
//! listing, proximity and overdue queries filter on.

use crate::audit::newest_first;
use crate::geo;
use crate::memory::{apply_mutation, is_overdue, nearby_distance, sort_by_distance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use civic_types::{
    AuditJournal, AuditLogEntry, AuditStore, AuditStoreError, BreachEntry, Issue, IssueMutation,
    IssueQuery, IssueStatus, IssueStore, IssueStoreError, IssueUpdate, NearbyIssue, NearbyQuery,
    OverdueSweep,
};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    village TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    longitude REAL NOT NULL,
    latitude REAL NOT NULL,
    sla_deadline INTEGER NOT NULL,
    is_red_flagged INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    doc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_village_status ON issues(village, status);
CREATE INDEX IF NOT EXISTS idx_issues_geo ON issues(category, latitude, longitude);
CREATE INDEX IF NOT EXISTS idx_issues_overdue ON issues(is_red_flagged, sla_deadline);

CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    doc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_issue ON audit_log(issue_id);
"#;

fn sql_err(e: rusqlite::Error) -> IssueStoreError {
    IssueStoreError::Other(e.to_string())
}

fn decode(doc: &str) -> Result<Issue, IssueStoreError> {
    serde_json::from_str(doc).map_err(|e| IssueStoreError::Other(format!("corrupt issue row: {}", e)))
}

fn encode(issue: &Issue) -> Result<String, IssueStoreError> {
    serde_json::to_string(issue).map_err(|e| IssueStoreError::Other(e.to_string()))
}

fn open(path: impl AsRef<Path>) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// SQLite-backed issue store. The connection mutex plus an IMMEDIATE
/// transaction per write gives per-issue atomicity; journal entries are
/// appended before that transaction commits.
pub struct SqliteIssueStore {
    conn: tokio::sync::Mutex<rusqlite::Connection>,
}

impl SqliteIssueStore {
    /// Open (or create) the database at `path`. `":memory:"` gives a private in-memory database.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, IssueStoreError> {
        let conn = open(path).map_err(sql_err)?;
        Ok(Self {
            conn: tokio::sync::Mutex::new(conn),
        })
    }

    async fn lock(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, rusqlite::Connection>, IssueStoreError> {
        let conn = self.conn.lock().await;
        if !conn.is_autocommit() {
            // A write was cancelled between BEGIN and COMMIT.
            conn.execute_batch("ROLLBACK").map_err(sql_err)?;
        }
        Ok(conn)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, IssueStoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, IssueStoreError>,
    {
        let mut conn = self.lock().await?;
        f(&mut conn)
    }

    /// Commits on success, rolls back otherwise.
    fn finish<T>(
        conn: &rusqlite::Connection,
        result: Result<T, IssueStoreError>,
    ) -> Result<T, IssueStoreError> {
        match result {
            Ok(value) => {
                conn.execute_batch("COMMIT").map_err(sql_err)?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    async fn write_update(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
        journal: Option<AuditJournal<'_>>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        let mut guard = self.lock().await?;
        let conn: &mut rusqlite::Connection = &mut guard;
        conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
        let result = Self::journaled_write(conn, id, now, mutation, journal).await;
        Self::finish(conn, result)
    }

    async fn journaled_write(
        conn: &mut rusqlite::Connection,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
        journal: Option<AuditJournal<'_>>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        let doc: String = conn
            .query_row("SELECT doc FROM issues WHERE id = ?1", [id], |row| row.get(0))
            .optional()
            .map_err(sql_err)?
            .ok_or_else(|| IssueStoreError::NotFound(id.to_string()))?;
        let before = decode(&doc)?;
        let after = apply_mutation(&before, now, mutation)?;
        Self::write_row(conn, &after)?;
        let update = IssueUpdate { before, after };
        if let Some(journal) = journal {
            for entry in (journal.entries)(&update) {
                journal.audit.append(entry).await?;
            }
        }
        Ok(update)
    }

    fn write_row(conn: &rusqlite::Connection, issue: &Issue) -> Result<usize, IssueStoreError> {
        let doc = encode(issue)?;
        conn.execute(
            "UPDATE issues SET status = ?2, is_red_flagged = ?3, doc = ?4 WHERE id = ?1",
            params![
                issue.id,
                issue.status.as_str(),
                issue.is_red_flagged,
                doc
            ],
        )
        .map_err(sql_err)
    }

    fn query_docs(
        conn: &rusqlite::Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Issue>, IssueStoreError> {
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        let docs = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(sql_err)?;
        docs.iter().map(|d| decode(d)).collect()
    }
}

#[async_trait]
impl IssueStore for SqliteIssueStore {
    async fn insert(&self, issue: Issue) -> Result<(), IssueStoreError> {
        let doc = encode(&issue)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO issues (id, village, category, status, longitude, latitude, sla_deadline, is_red_flagged, created_at, doc) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    issue.id,
                    issue.village,
                    issue.category.as_str(),
                    issue.status.as_str(),
                    issue.location.point.longitude,
                    issue.location.point.latitude,
                    issue.sla_deadline.timestamp_micros(),
                    issue.is_red_flagged,
                    issue.created_at.timestamp_micros(),
                    doc,
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Issue>, IssueStoreError> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM issues WHERE id = ?1", [id], |row| row.get(0))
                .optional()
                .map_err(sql_err)?;
            doc.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn list(&self, query: &IssueQuery) -> Result<Vec<Issue>, IssueStoreError> {
        let status = query.status.map(|s| s.as_str());
        let category = query.category.map(|c| c.as_str());
        self.with_conn(|conn| {
            Self::query_docs(
                conn,
                "SELECT doc FROM issues WHERE village = ?1 \
                 AND (?2 IS NULL OR status = ?2) \
                 AND (?3 IS NULL OR category = ?3) \
                 ORDER BY created_at DESC, id DESC",
                params![query.village, status, category],
            )
        })
        .await
    }

    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<NearbyIssue>, IssueStoreError> {
        let bb = geo::bounding_box(&query.point, query.radius_m);
        let candidates = self.with_conn(|conn| {
            Self::query_docs(
                conn,
                "SELECT doc FROM issues WHERE village = ?1 AND category = ?2 \
                 AND latitude BETWEEN ?3 AND ?4 AND longitude BETWEEN ?5 AND ?6",
                params![
                    query.village,
                    query.category.as_str(),
                    bb.min_lat,
                    bb.max_lat,
                    bb.min_lon,
                    bb.max_lon
                ],
            )
        })
        .await?;
        let mut hits: Vec<NearbyIssue> = candidates
            .into_iter()
            .filter_map(|issue| {
                nearby_distance(&issue, query).map(|distance_m| NearbyIssue { issue, distance_m })
            })
            .collect();
        sort_by_distance(&mut hits);
        Ok(hits)
    }

    async fn update(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        self.write_update(id, now, mutation, None).await
    }

    async fn update_journaled(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
        journal: AuditJournal<'_>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        self.write_update(id, now, mutation, Some(journal)).await
    }

    async fn flag_overdue(
        &self,
        now: DateTime<Utc>,
        audit: &dyn AuditStore,
        entry_for: BreachEntry<'_>,
    ) -> Result<OverdueSweep, IssueStoreError> {
        let active: Vec<&str> = IssueStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
        let mut guard = self.lock().await?;
        let conn: &mut rusqlite::Connection = &mut guard;
        let candidates = Self::query_docs(
            conn,
            "SELECT doc FROM issues WHERE is_red_flagged = 0 AND sla_deadline < ?1 \
             AND status IN (?2, ?3, ?4) ORDER BY id",
            params![now.timestamp_micros(), active[0], active[1], active[2]],
        )?;

        let mut sweep = OverdueSweep::default();
        for mut issue in candidates {
            if !is_overdue(&issue, now) {
                continue;
            }
            issue.is_red_flagged = true;
            issue.updated_at = now;
            conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
            if let Err(e) = Self::write_row(conn, &issue) {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
            match audit.append(entry_for(&issue)).await {
                Ok(()) => {
                    Self::finish(conn, Ok(()))?;
                    sweep.flagged.push(issue);
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    sweep.deferred.push((issue.id, e));
                }
            }
        }
        Ok(sweep)
    }
}

/// SQLite-backed audit trail; rows are only ever inserted.
pub struct SqliteAuditStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteAuditStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditStoreError> {
        let conn = open(path).map_err(|e| AuditStoreError::Other(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, AuditStoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AuditStoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| AuditStoreError::Other(e.to_string()))
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError> {
        let doc =
            serde_json::to_string(&entry).map_err(|e| AuditStoreError::Other(e.to_string()))?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log (issue_id, doc) VALUES (?1, ?2)",
                params![entry.issue_id, doc],
            )
            .map(|_| ())
        })
    }

    async fn list_for_issue(&self, issue_id: &str) -> Result<Vec<AuditLogEntry>, AuditStoreError> {
        let docs = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT doc FROM audit_log WHERE issue_id = ?1 ORDER BY seq ASC")?;
            let rows = stmt.query_map([issue_id], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<String>, _>>()
        })?;
        let mut out = docs
            .iter()
            .map(|d| serde_json::from_str(d).map_err(|e| AuditStoreError::Other(e.to_string())))
            .collect::<Result<Vec<AuditLogEntry>, _>>()?;
        newest_first(&mut out);
        Ok(out)
    }
}
