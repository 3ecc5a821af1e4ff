//! Shared cross-project store with domain-scoped promotion

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::{MemoryRecord, MemoryState, SourceLink};
use crate::storage::{
    decode_list, decode_ts, decode_uuid, encode_list, encode_ts, fts_tags, with_busy_retry,
    MatchSource, RetryPolicy, VectorStorage,
};

const COLS: &str = "id, domain, error_signature, error_category, origin_project, libraries, \
     tags, root_cause, prevention_rule, negative_constraint, severity, hit_count, \
     times_saved, archived, archived_at, promoted_at, created_at";

/// Outcome of a promotion call
#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    /// The global row the local lesson now feeds (new or pre-existing)
    pub record: MemoryRecord,

    /// True when the lesson was merged into an existing row instead of
    /// creating a new one
    pub merged: bool,
}

/// Cross-project storage backend, partitioned by domain
pub struct GlobalStore {
    conn: Arc<Mutex<Connection>>,
    vector: Option<Arc<VectorStorage>>,
    retry: RetryPolicy,
}

impl GlobalStore {
    /// Open (or create) the shared store at `db_path`.
    pub fn open(db_path: &Path, retry: RetryPolicy) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_millis(250))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(include_str!("global_schema.sql"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            vector: None,
            retry,
        })
    }

    /// Attach a vector-index sidecar for Level-4 matching.
    pub fn with_vector(mut self, vector: Arc<VectorStorage>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn vector_sidecar(&self) -> Option<&VectorStorage> {
        self.vector.as_deref()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Error::storage(e.to_string()))
    }

    /// A [`MatchSource`] view of one domain's partition.
    pub fn scoped(&self, domain: impl Into<String>) -> DomainScoped<'_> {
        DomainScoped {
            store: self,
            domain: domain.into(),
        }
    }

    /// Promote a local lesson into `domain`, deduplicating by signature.
    ///
    /// If an active row with the same `(domain, error_signature)` exists, it
    /// absorbs the promotion: hit_count is incremented and a new source link
    /// is recorded. Otherwise a fresh row is inserted with the
    /// project-specific fields stripped. Two simultaneous promotions of the
    /// same signature converge on one row; the write transaction plus the
    /// partial unique index turn the race into the merge path.
    pub fn promote(
        &self,
        local: &MemoryRecord,
        domain: &str,
        include_archived_dedup: bool,
    ) -> Result<PromotionOutcome> {
        if domain.trim().is_empty() {
            return Err(Error::validation("domain must not be empty"));
        }

        with_busy_retry(self.retry, || {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing = find_dedup_target(
                &tx,
                domain,
                &local.error_signature,
                include_archived_dedup,
            )?;

            let (global_id, merged) = match existing {
                Some(id) => {
                    bump_hit(&tx, id)?;
                    (id, true)
                }
                None => {
                    let record = local.promoted(domain);
                    match insert_global(&tx, &record) {
                        Ok(()) => (record.id, false),
                        // Another writer won the unique index; merge instead.
                        Err(Error::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
                            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                        {
                            let id = find_dedup_target(
                                &tx,
                                domain,
                                &local.error_signature,
                                include_archived_dedup,
                            )?
                            .ok_or_else(|| {
                                Error::storage("constraint hit but no dedup target found")
                            })?;
                            bump_hit(&tx, id)?;
                            (id, true)
                        }
                        Err(other) => return Err(other),
                    }
                }
            };

            tx.execute(
                "INSERT OR IGNORE INTO promotion_sources
                     (global_id, source_memory_id, origin_project, promoted_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    global_id.to_string(),
                    local.id.to_string(),
                    local.project_name,
                    encode_ts(&Utc::now()),
                ],
            )?;

            let record = get_in_tx(&tx, global_id)?
                .ok_or_else(|| Error::storage("promoted row vanished mid-transaction"))?;
            tx.commit()?;

            Ok(PromotionOutcome { record, merged })
        })
    }

    /// Promotion linkages feeding a global lesson, oldest first.
    pub fn sources(&self, global_id: Uuid) -> Result<Vec<SourceLink>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT global_id, source_memory_id, origin_project, promoted_at
             FROM promotion_sources WHERE global_id = ?1 ORDER BY promoted_at, source_memory_id",
        )?;
        let rows = stmt.query_map(params![global_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (gid, sid, origin_project, promoted_at) = row?;
            links.push(SourceLink {
                global_id: decode_uuid(&gid)?,
                source_memory_id: decode_uuid(&sid)?,
                origin_project,
                promoted_at: decode_ts(&promoted_at)?,
            });
        }
        Ok(links)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLS} FROM global_memories WHERE id = ?1"),
                params![id.to_string()],
                read_row,
            )
            .optional()?;
        row.map(|r| r.into_record()).transpose()
    }

    /// List memories ordered by recency, optionally scoped.
    pub fn list(
        &self,
        domain: Option<&str>,
        category: Option<&str>,
        archived: Option<bool>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {COLS} FROM global_memories WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(dom) = domain {
            sql.push_str(" AND domain = ?");
            params_vec.push(Box::new(dom.to_string()));
        }
        if let Some(cat) = category {
            sql.push_str(" AND error_category = ?");
            params_vec.push(Box::new(cat.to_string()));
        }
        if let Some(arch) = archived {
            sql.push_str(" AND archived = ?");
            params_vec.push(Box::new(arch));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        params_vec.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), read_row)?;
        collect_records(rows)
    }

    /// Archive a global memory. Idempotent.
    pub fn archive(&self, id: Uuid) -> Result<()> {
        self.set_archived(id, true)
    }

    /// Unarchive a global memory. Idempotent.
    ///
    /// Fails with `Error::Busy`-style contention handling like every write;
    /// if reactivating would collide with an active row of the same
    /// signature, the unique index rejects it as a constraint error.
    pub fn unarchive(&self, id: Uuid) -> Result<()> {
        self.set_archived(id, false)
    }

    fn set_archived(&self, id: Uuid, archived: bool) -> Result<()> {
        with_busy_retry(self.retry, || {
            let conn = self.lock()?;
            let archived_at = archived.then(|| encode_ts(&Utc::now()));
            let changed = conn.execute(
                "UPDATE global_memories SET archived = ?1, archived_at = ?2
                 WHERE id = ?3 AND archived != ?1",
                params![archived, archived_at, id.to_string()],
            )?;
            if changed == 0 {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM global_memories WHERE id = ?1",
                        params![id.to_string()],
                        |r| r.get(0),
                    )
                    .optional()?;
                if found.is_none() {
                    return Err(Error::not_found(format!("global memory {id}")));
                }
            }
            Ok(())
        })
    }

    pub fn increment_hit(&self, id: Uuid) -> Result<()> {
        with_busy_retry(self.retry, || {
            let conn = self.lock()?;
            let changed = conn.execute(
                "UPDATE global_memories SET hit_count = hit_count + 1 WHERE id = ?1",
                params![id.to_string()],
            )?;
            if changed == 0 {
                return Err(Error::not_found(format!("global memory {id}")));
            }
            Ok(())
        })
    }

    /// Increment the confirmed-save counter, clamped at `hit_count`.
    pub fn increment_saved(&self, id: Uuid) -> Result<()> {
        with_busy_retry(self.retry, || {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let counters: Option<(u32, u32)> = tx
                .query_row(
                    "SELECT hit_count, times_saved FROM global_memories WHERE id = ?1",
                    params![id.to_string()],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let (hits, saves) =
                counters.ok_or_else(|| Error::not_found(format!("global memory {id}")))?;
            if saves >= hits {
                tracing::warn!(
                    memory_id = %id,
                    hit_count = hits,
                    times_saved = saves,
                    "times_saved already at hit_count; increment clamped"
                );
            } else {
                tx.execute(
                    "UPDATE global_memories SET times_saved = times_saved + 1 WHERE id = ?1",
                    params![id.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn exact_in_domain(
        &self,
        domain: &str,
        signature: &str,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock()?;
        let mut sql = format!(
            "SELECT {COLS} FROM global_memories WHERE domain = ?1 AND error_signature = ?2"
        );
        if !include_archived {
            sql.push_str(" AND archived = 0");
        }
        sql.push_str(" ORDER BY created_at DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![domain, signature], read_row)?;
        collect_records(rows)
    }

    fn scan_domain(
        &self,
        domain: &str,
        category: Option<&str>,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {COLS} FROM global_memories WHERE domain = ?1");
        if !include_archived {
            sql.push_str(" AND archived = 0");
        }
        let mut stmt;
        let rows = match category {
            Some(cat) => {
                sql.push_str(" AND error_category = ?2 ORDER BY created_at DESC");
                stmt = conn.prepare(&sql)?;
                stmt.query_map(params![domain, cat], read_row)?
            }
            None => {
                sql.push_str(" ORDER BY created_at DESC");
                stmt = conn.prepare(&sql)?;
                stmt.query_map(params![domain], read_row)?
            }
        };
        collect_records(rows)
    }

    fn text_candidates_domain(
        &self,
        domain: &str,
        query: &str,
        category: Option<&str>,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let fts_query = super::or_query(query);
        let fts_result = {
            let conn = self.lock()?;
            let mut sql = format!(
                "SELECT m.{} FROM global_memories_fts f JOIN global_memories m ON m.id = f.id \
                 WHERE global_memories_fts MATCH ?1 AND m.domain = ?2",
                COLS.replace(", ", ", m.")
            );
            if !include_archived {
                sql.push_str(" AND m.archived = 0");
            }
            if category.is_some() {
                sql.push_str(" AND m.error_category = ?3");
            }
            sql.push_str(" ORDER BY bm25(global_memories_fts) LIMIT ?");

            conn.prepare(&sql)
                .map_err(Error::from)
                .and_then(|mut stmt| match category {
                    Some(cat) => {
                        let rows = stmt.query_map(
                            params![fts_query, domain, cat, limit as i64],
                            read_row,
                        )?;
                        collect_records(rows)
                    }
                    None => {
                        let rows = stmt
                            .query_map(params![fts_query, domain, limit as i64], read_row)?;
                        collect_records(rows)
                    }
                })
        };

        match fts_result {
            Ok(records) => Ok(records),
            Err(Error::Sqlite(_)) => {
                let like = format!("%{query}%");
                let conn = self.lock()?;
                let mut sql = format!(
                    "SELECT {COLS} FROM global_memories WHERE domain = ?1 \
                     AND (error_signature LIKE ?2 OR root_cause LIKE ?2 OR prevention_rule LIKE ?2)"
                );
                if !include_archived {
                    sql.push_str(" AND archived = 0");
                }
                if category.is_some() {
                    sql.push_str(" AND error_category = ?3");
                }
                sql.push_str(" ORDER BY hit_count DESC LIMIT ?");
                let mut stmt = conn.prepare(&sql)?;
                let rows = match category {
                    Some(cat) => stmt.query_map(
                        params![domain, like, cat, limit as i64],
                        read_row,
                    )?,
                    None => stmt.query_map(params![domain, like, limit as i64], read_row)?,
                };
                collect_records(rows)
            }
            Err(other) => Err(other),
        }
    }
}

fn find_dedup_target(
    tx: &Transaction<'_>,
    domain: &str,
    signature: &str,
    include_archived: bool,
) -> Result<Option<Uuid>> {
    let sql = if include_archived {
        // Prefer an active row when both exist
        "SELECT id FROM global_memories WHERE domain = ?1 AND error_signature = ?2 \
         ORDER BY archived ASC LIMIT 1"
    } else {
        "SELECT id FROM global_memories WHERE domain = ?1 AND error_signature = ?2 \
         AND archived = 0 LIMIT 1"
    };
    let id: Option<String> = tx
        .query_row(sql, params![domain, signature], |r| r.get(0))
        .optional()?;
    id.as_deref().map(decode_uuid).transpose()
}

fn bump_hit(tx: &Transaction<'_>, id: Uuid) -> Result<()> {
    tx.execute(
        "UPDATE global_memories SET hit_count = hit_count + 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(())
}

fn insert_global(tx: &Transaction<'_>, record: &MemoryRecord) -> Result<()> {
    let domain = record
        .domain
        .as_deref()
        .ok_or_else(|| Error::storage("global record without a domain"))?;
    let promoted_at = record
        .promoted_at
        .unwrap_or(record.created_at);

    tx.execute(
        r#"
        INSERT INTO global_memories (
            id, domain, error_signature, error_category, origin_project,
            libraries, tags, root_cause, prevention_rule, negative_constraint,
            severity, hit_count, times_saved, archived, archived_at,
            promoted_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17)
        "#,
        params![
            record.id.to_string(),
            domain,
            record.error_signature,
            record.error_category,
            record.origin_project.as_deref().unwrap_or_default(),
            encode_list(&record.libraries)?,
            encode_list(&record.tags)?,
            record.root_cause,
            record.prevention_rule,
            record.negative_constraint,
            record.severity,
            record.hit_count,
            record.times_saved,
            record.is_archived(),
            record.archived_at.as_ref().map(encode_ts),
            encode_ts(&promoted_at),
            encode_ts(&record.created_at),
        ],
    )?;

    tx.execute(
        "INSERT INTO global_memories_fts (id, error_signature, root_cause, prevention_rule, tags)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.id.to_string(),
            record.error_signature,
            record.root_cause,
            record.prevention_rule,
            fts_tags(&record.tags),
        ],
    )?;
    Ok(())
}

fn get_in_tx(tx: &Transaction<'_>, id: Uuid) -> Result<Option<MemoryRecord>> {
    let row = tx
        .query_row(
            &format!("SELECT {COLS} FROM global_memories WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(|r| r.into_record()).transpose()
}

/// One domain's partition of the global store, as a cascade source.
pub struct DomainScoped<'a> {
    store: &'a GlobalStore,
    domain: String,
}

impl MatchSource for DomainScoped<'_> {
    fn exact_by_signature(
        &self,
        signature: &str,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        self.store
            .exact_in_domain(&self.domain, signature, include_archived)
    }

    fn scan(&self, category: Option<&str>, include_archived: bool) -> Result<Vec<MemoryRecord>> {
        self.store
            .scan_domain(&self.domain, category, include_archived)
    }

    fn text_candidates(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        self.store
            .text_candidates_domain(&self.domain, query, category, limit, include_archived)
    }

    fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        Ok(self
            .store
            .get(id)?
            .filter(|record| record.domain.as_deref() == Some(self.domain.as_str())))
    }

    fn vector(&self) -> Option<&VectorStorage> {
        self.store.vector.as_deref()
    }
}

/// Intermediate struct for reading from SQLite
struct GlobalRow {
    id: String,
    domain: String,
    error_signature: String,
    error_category: String,
    origin_project: String,
    libraries: String,
    tags: String,
    root_cause: String,
    prevention_rule: String,
    negative_constraint: String,
    severity: u8,
    hit_count: u32,
    times_saved: u32,
    archived: bool,
    archived_at: Option<String>,
    promoted_at: String,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GlobalRow> {
    Ok(GlobalRow {
        id: row.get(0)?,
        domain: row.get(1)?,
        error_signature: row.get(2)?,
        error_category: row.get(3)?,
        origin_project: row.get(4)?,
        libraries: row.get(5)?,
        tags: row.get(6)?,
        root_cause: row.get(7)?,
        prevention_rule: row.get(8)?,
        negative_constraint: row.get(9)?,
        severity: row.get(10)?,
        hit_count: row.get(11)?,
        times_saved: row.get(12)?,
        archived: row.get(13)?,
        archived_at: row.get(14)?,
        promoted_at: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<GlobalRow>>,
) -> Result<Vec<MemoryRecord>> {
    let mut memories = Vec::new();
    for row in rows {
        memories.push(row?.into_record()?);
    }
    Ok(memories)
}

impl GlobalRow {
    fn into_record(self) -> Result<MemoryRecord> {
        Ok(MemoryRecord {
            id: decode_uuid(&self.id)?,
            error_signature: self.error_signature,
            error_category: self.error_category,
            project_name: String::new(),
            file_paths: Vec::new(),
            libraries: decode_list(&self.libraries),
            tags: decode_list(&self.tags),
            task_description: String::new(),
            code_snippet: String::new(),
            fix_snippet: String::new(),
            root_cause: self.root_cause,
            prevention_rule: self.prevention_rule,
            negative_constraint: self.negative_constraint,
            severity: self.severity,
            hit_count: self.hit_count,
            times_saved: self.times_saved,
            state: if self.archived {
                MemoryState::Archived
            } else {
                MemoryState::Active
            },
            archived_at: self.archived_at.as_deref().map(decode_ts).transpose()?,
            source_error_id: None,
            domain: Some(self.domain),
            origin_project: Some(self.origin_project),
            promoted_at: Some(decode_ts(&self.promoted_at)?),
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, GlobalStore) {
        let dir = tempdir().unwrap();
        let store = GlobalStore::open(
            &dir.path().join("global.db"),
            RetryPolicy::new(3, Duration::from_millis(5)),
        )
        .unwrap();
        (dir, store)
    }

    fn local_lesson(signature: &str, project: &str) -> MemoryRecord {
        MemoryRecord::new(signature)
            .with_project_name(project)
            .with_category("api")
            .with_tags(vec!["stripe".into()])
            .with_root_cause("webhook secret rotated without redeploy")
            .with_prevention_rule("read webhook secrets at request time")
            .with_file_paths(vec!["src/webhooks.rs".into()])
    }

    #[test]
    fn promote_creates_then_merges() {
        let (_dir, store) = store();
        let first = local_lesson("sig", "alpha");
        let second = local_lesson("sig", "beta");

        let created = store.promote(&first, "backend", false).unwrap();
        assert!(!created.merged);
        assert_eq!(created.record.hit_count, 1);
        assert_eq!(created.record.domain.as_deref(), Some("backend"));
        // Project-specific fields are stripped on promotion
        assert!(created.record.file_paths.is_empty());

        let merged = store.promote(&second, "backend", false).unwrap();
        assert!(merged.merged);
        assert_eq!(merged.record.id, created.record.id);
        assert_eq!(merged.record.hit_count, 2);

        let active = store.list(Some("backend"), None, Some(false), 50).unwrap();
        assert_eq!(active.len(), 1);

        let links = store.sources(created.record.id).unwrap();
        assert_eq!(links.len(), 2);
        assert_ne!(links[0].source_memory_id, links[1].source_memory_id);
    }

    #[test]
    fn promote_is_domain_scoped() {
        let (_dir, store) = store();
        let lesson = local_lesson("sig", "alpha");

        let backend = store.promote(&lesson, "backend", false).unwrap();
        let frontend = store.promote(&lesson, "frontend", false).unwrap();
        assert!(!frontend.merged);
        assert_ne!(backend.record.id, frontend.record.id);
    }

    #[test]
    fn promoting_the_same_local_memory_twice_merges() {
        let (_dir, store) = store();
        let lesson = local_lesson("sig", "alpha");

        let first = store.promote(&lesson, "backend", false).unwrap();
        let second = store.promote(&lesson, "backend", false).unwrap();
        assert!(second.merged);
        assert_eq!(second.record.hit_count, 2);
        // Same source promoted twice still yields a single link
        assert_eq!(store.sources(first.record.id).unwrap().len(), 1);
    }

    #[test]
    fn archived_rows_leave_the_dedup_pool() {
        let (_dir, store) = store();
        let lesson = local_lesson("sig", "alpha");

        let first = store.promote(&lesson, "backend", false).unwrap();
        store.archive(first.record.id).unwrap();

        let second = store.promote(&lesson, "backend", false).unwrap();
        assert!(!second.merged);
        assert_ne!(second.record.id, first.record.id);

        // With include_archived_dedup the archived row is still a target,
        // but an active one wins when both exist.
        let third = store.promote(&lesson, "backend", true).unwrap();
        assert!(third.merged);
        assert_eq!(third.record.id, second.record.id);
    }

    #[test]
    fn promote_rejects_empty_domain() {
        let (_dir, store) = store();
        let lesson = local_lesson("sig", "alpha");
        assert!(matches!(
            store.promote(&lesson, "  ", false),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn lifecycle_and_counters_mirror_local() {
        let (_dir, store) = store();
        let lesson = local_lesson("sig", "alpha");
        let outcome = store.promote(&lesson, "backend", false).unwrap();
        let id = outcome.record.id;

        store.increment_hit(id).unwrap();
        store.increment_saved(id).unwrap();
        store.increment_saved(id).unwrap();
        store.increment_saved(id).unwrap(); // clamped at hit_count = 2
        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.hit_count, 2);
        assert_eq!(loaded.times_saved, 2);

        store.archive(id).unwrap();
        store.archive(id).unwrap();
        assert!(store.get(id).unwrap().unwrap().is_archived());
        store.unarchive(id).unwrap();
        assert!(!store.get(id).unwrap().unwrap().is_archived());
    }

    #[test]
    fn scoped_view_only_sees_its_domain() {
        let (_dir, store) = store();
        let lesson = local_lesson("sig", "alpha");
        let backend = store.promote(&lesson, "backend", false).unwrap();
        store.promote(&lesson, "frontend", false).unwrap();

        let scope = store.scoped("backend");
        let exact = scope.exact_by_signature("sig", false).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id, backend.record.id);

        assert!(scope.get(backend.record.id).unwrap().is_some());
        let frontend_rows = store.scoped("frontend").scan(None, false).unwrap();
        assert_eq!(frontend_rows.len(), 1);
        assert_ne!(frontend_rows[0].id, backend.record.id);
    }
}
