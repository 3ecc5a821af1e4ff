//! Per-project SQLite store for regression memories

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::{MemoryRecord, MemoryState};
use crate::storage::{
    decode_list, decode_ts, decode_uuid, encode_list, encode_ts, fts_tags, with_busy_retry,
    MatchSource, RetryPolicy, VectorStorage,
};

const COLS: &str = "id, error_signature, error_category, project_name, file_paths, libraries, \
     tags, task_description, code_snippet, fix_snippet, root_cause, prevention_rule, \
     negative_constraint, severity, hit_count, times_saved, archived, archived_at, \
     source_error_id, created_at";

/// Durable per-project storage backend
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    vector: Option<Arc<VectorStorage>>,
    retry: RetryPolicy,
}

impl LocalStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path, retry: RetryPolicy) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_millis(250))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(include_str!("local_schema.sql"))?;

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

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Error::storage(e.to_string()))
    }

    /// Insert a memory and its free-text index entry in one transaction.
    pub fn create(&self, memory: &MemoryRecord) -> Result<Uuid> {
        if memory.error_signature.trim().is_empty() {
            return Err(Error::validation("error_signature must not be empty"));
        }

        with_busy_retry(self.retry, || {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            tx.execute(
                r#"
                INSERT INTO memories (
                    id, error_signature, error_category, project_name, file_paths,
                    libraries, tags, task_description, code_snippet, fix_snippet,
                    root_cause, prevention_rule, negative_constraint, severity,
                    hit_count, times_saved, archived, archived_at, source_error_id,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                          ?14, ?15, ?16, ?17, ?18, ?19, ?20)
                "#,
                params![
                    memory.id.to_string(),
                    memory.error_signature,
                    memory.error_category,
                    memory.project_name,
                    encode_list(&memory.file_paths)?,
                    encode_list(&memory.libraries)?,
                    encode_list(&memory.tags)?,
                    memory.task_description,
                    memory.code_snippet,
                    memory.fix_snippet,
                    memory.root_cause,
                    memory.prevention_rule,
                    memory.negative_constraint,
                    memory.severity,
                    memory.hit_count,
                    memory.times_saved,
                    memory.is_archived(),
                    memory.archived_at.as_ref().map(encode_ts),
                    memory.source_error_id,
                    encode_ts(&memory.created_at),
                ],
            )?;

            tx.execute(
                "INSERT INTO memories_fts (id, error_signature, root_cause, prevention_rule, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    memory.id.to_string(),
                    memory.error_signature,
                    memory.root_cause,
                    memory.prevention_rule,
                    fts_tags(&memory.tags),
                ],
            )?;

            tx.commit()?;
            Ok(memory.id)
        })
    }

    /// List memories ordered by recency.
    pub fn list(
        &self,
        category: Option<&str>,
        archived: Option<bool>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {COLS} FROM memories WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

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

        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?.into_record()?);
        }
        Ok(memories)
    }

    /// Archive a memory. Archiving an already-archived memory is a no-op.
    pub fn archive(&self, id: Uuid) -> Result<()> {
        self.set_archived(id, true)
    }

    /// Return an archived memory to the active pool. Idempotent.
    pub fn unarchive(&self, id: Uuid) -> Result<()> {
        self.set_archived(id, false)
    }

    fn set_archived(&self, id: Uuid, archived: bool) -> Result<()> {
        with_busy_retry(self.retry, || {
            let conn = self.lock()?;
            let archived_at = archived.then(|| encode_ts(&Utc::now()));
            let changed = conn.execute(
                "UPDATE memories SET archived = ?1, archived_at = ?2 WHERE id = ?3 AND archived != ?1",
                params![archived, archived_at, id.to_string()],
            )?;
            if changed == 0 && !self.exists(&conn, id)? {
                return Err(Error::not_found(format!("memory {id}")));
            }
            Ok(())
        })
    }

    fn exists(&self, conn: &Connection, id: Uuid) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM memories WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Increment the surfaced-as-result counter.
    pub fn increment_hit(&self, id: Uuid) -> Result<()> {
        with_busy_retry(self.retry, || {
            let conn = self.lock()?;
            let changed = conn.execute(
                "UPDATE memories SET hit_count = hit_count + 1 WHERE id = ?1",
                params![id.to_string()],
            )?;
            if changed == 0 {
                return Err(Error::not_found(format!("memory {id}")));
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
                    "SELECT hit_count, times_saved FROM memories WHERE id = ?1",
                    params![id.to_string()],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let (hits, saves) = counters.ok_or_else(|| Error::not_found(format!("memory {id}")))?;
            if saves >= hits {
                tracing::warn!(
                    memory_id = %id,
                    hit_count = hits,
                    times_saved = saves,
                    "times_saved already at hit_count; increment clamped"
                );
            } else {
                tx.execute(
                    "UPDATE memories SET times_saved = times_saved + 1 WHERE id = ?1",
                    params![id.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Archive active memories that were never re-surfaced after creation
    /// and are older than `days`. Returns the archived ids.
    pub fn sweep_stale(&self, days: i64) -> Result<Vec<Uuid>> {
        let cutoff = encode_ts(&(Utc::now() - chrono::Duration::days(days)));
        with_busy_retry(self.retry, || {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            let mut stale = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT id FROM memories
                     WHERE archived = 0 AND hit_count <= 1 AND created_at < ?1",
                )?;
                let rows = stmt.query_map(params![cutoff], |r| r.get::<_, String>(0))?;
                for row in rows {
                    stale.push(decode_uuid(&row?)?);
                }
            }

            let archived_at = encode_ts(&Utc::now());
            for id in &stale {
                tx.execute(
                    "UPDATE memories SET archived = 1, archived_at = ?1 WHERE id = ?2",
                    params![archived_at, id.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(stale)
        })
    }
}

impl MatchSource for LocalStore {
    fn exact_by_signature(
        &self,
        signature: &str,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock()?;
        let sql = if include_archived {
            format!("SELECT {COLS} FROM memories WHERE error_signature = ?1 ORDER BY created_at DESC")
        } else {
            format!(
                "SELECT {COLS} FROM memories WHERE error_signature = ?1 AND archived = 0 \
                 ORDER BY created_at DESC"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![signature], read_row)?;
        collect_records(rows)
    }

    fn scan(&self, category: Option<&str>, include_archived: bool) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {COLS} FROM memories WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if !include_archived {
            sql.push_str(" AND archived = 0");
        }
        if let Some(cat) = category {
            sql.push_str(" AND error_category = ?");
            params_vec.push(Box::new(cat.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), read_row)?;
        collect_records(rows)
    }

    fn text_candidates(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let fts_query = super::or_query(query);
        let fts_result = {
            let conn = self.lock()?;
            let mut sql = format!(
                "SELECT m.{} FROM memories_fts f JOIN memories m ON m.id = f.id \
                 WHERE memories_fts MATCH ?1",
                COLS.replace(", ", ", m.")
            );
            if !include_archived {
                sql.push_str(" AND m.archived = 0");
            }
            if category.is_some() {
                sql.push_str(" AND m.error_category = ?2");
            }
            sql.push_str(" ORDER BY bm25(memories_fts) LIMIT ?");

            conn.prepare(&sql)
                .map_err(Error::from)
                .and_then(|mut stmt| match category {
                    Some(cat) => {
                        let rows = stmt
                            .query_map(params![fts_query, cat, limit as i64], read_row)?;
                        collect_records(rows)
                    }
                    None => {
                        let rows = stmt.query_map(params![fts_query, limit as i64], read_row)?;
                        collect_records(rows)
                    }
                })
        };

        match fts_result {
            Ok(records) => Ok(records),
            // FTS5 query syntax it could not digest; fall back to a LIKE scan.
            Err(Error::Sqlite(_)) => {
                let like = format!("%{query}%");
                let conn = self.lock()?;
                let mut sql = format!(
                    "SELECT {COLS} FROM memories \
                     WHERE (error_signature LIKE ?1 OR root_cause LIKE ?1 OR prevention_rule LIKE ?1)"
                );
                if !include_archived {
                    sql.push_str(" AND archived = 0");
                }
                if category.is_some() {
                    sql.push_str(" AND error_category = ?2");
                }
                sql.push_str(" ORDER BY hit_count DESC LIMIT ?");
                let mut stmt = conn.prepare(&sql)?;
                let rows = match category {
                    Some(cat) => stmt.query_map(
                        rusqlite::params![like, cat.to_string(), limit as i64],
                        read_row,
                    )?,
                    None => stmt.query_map(rusqlite::params![like, limit as i64], read_row)?,
                };
                collect_records(rows)
            }
            Err(other) => Err(other),
        }
    }

    fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLS} FROM memories WHERE id = ?1"),
                params![id.to_string()],
                read_row,
            )
            .optional()?;
        row.map(|r| r.into_record()).transpose()
    }

    fn vector(&self) -> Option<&VectorStorage> {
        self.vector.as_deref()
    }
}

/// Intermediate struct for reading from SQLite
struct LocalRow {
    id: String,
    error_signature: String,
    error_category: String,
    project_name: String,
    file_paths: String,
    libraries: String,
    tags: String,
    task_description: String,
    code_snippet: String,
    fix_snippet: String,
    root_cause: String,
    prevention_rule: String,
    negative_constraint: String,
    severity: u8,
    hit_count: u32,
    times_saved: u32,
    archived: bool,
    archived_at: Option<String>,
    source_error_id: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalRow> {
    Ok(LocalRow {
        id: row.get(0)?,
        error_signature: row.get(1)?,
        error_category: row.get(2)?,
        project_name: row.get(3)?,
        file_paths: row.get(4)?,
        libraries: row.get(5)?,
        tags: row.get(6)?,
        task_description: row.get(7)?,
        code_snippet: row.get(8)?,
        fix_snippet: row.get(9)?,
        root_cause: row.get(10)?,
        prevention_rule: row.get(11)?,
        negative_constraint: row.get(12)?,
        severity: row.get(13)?,
        hit_count: row.get(14)?,
        times_saved: row.get(15)?,
        archived: row.get(16)?,
        archived_at: row.get(17)?,
        source_error_id: row.get(18)?,
        created_at: row.get(19)?,
    })
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<LocalRow>>,
) -> Result<Vec<MemoryRecord>> {
    let mut memories = Vec::new();
    for row in rows {
        memories.push(row?.into_record()?);
    }
    Ok(memories)
}

impl LocalRow {
    fn into_record(self) -> Result<MemoryRecord> {
        Ok(MemoryRecord {
            id: decode_uuid(&self.id)?,
            error_signature: self.error_signature,
            error_category: self.error_category,
            project_name: self.project_name,
            file_paths: decode_list(&self.file_paths),
            libraries: decode_list(&self.libraries),
            tags: decode_list(&self.tags),
            task_description: self.task_description,
            code_snippet: self.code_snippet,
            fix_snippet: self.fix_snippet,
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
            source_error_id: self.source_error_id,
            domain: None,
            origin_project: None,
            promoted_at: None,
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(
            &dir.path().join("memory.db"),
            RetryPolicy::new(3, Duration::from_millis(5)),
        )
        .unwrap();
        (dir, store)
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("typeerror: cannot read property <str> of undefined")
            .with_category("frontend")
            .with_tags(vec!["react".into()])
            .with_root_cause("missing null check")
            .with_prevention_rule("guard optional fields before access")
            .with_source_error("err-1");
        let id = store.create(&memory).unwrap();

        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.error_signature, memory.error_signature);
        assert_eq!(loaded.tags, vec!["react".to_string()]);
        assert_eq!(loaded.hit_count, 1);
        assert_eq!(loaded.state, MemoryState::Active);
        assert_eq!(loaded.source_error_id.as_deref(), Some("err-1"));
    }

    #[test]
    fn create_rejects_empty_signature() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("  ");
        assert!(matches!(store.create(&memory), Err(Error::Validation(_))));
    }

    #[test]
    fn create_syncs_the_free_text_index() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("connection refused by <path>")
            .with_root_cause("pool exhausted under connection churn");
        store.create(&memory).unwrap();

        let candidates = store
            .text_candidates("connection", None, 10, false)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, memory.id);
    }

    #[test]
    fn list_filters_by_category_and_archived() {
        let (_dir, store) = store();
        let a = MemoryRecord::new("sig-a").with_category("api");
        let b = MemoryRecord::new("sig-b").with_category("database");
        store.create(&a).unwrap();
        store.create(&b).unwrap();
        store.archive(b.id).unwrap();

        let api = store.list(Some("api"), None, 50).unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].id, a.id);

        let active = store.list(None, Some(false), 50).unwrap();
        assert_eq!(active.len(), 1);

        let archived = store.list(None, Some(true), 50).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, b.id);
        assert!(archived[0].archived_at.is_some());
    }

    #[test]
    fn archive_is_idempotent_and_reversible() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("sig");
        store.create(&memory).unwrap();

        store.archive(memory.id).unwrap();
        store.archive(memory.id).unwrap(); // no-op, no error
        assert!(store.get(memory.id).unwrap().unwrap().is_archived());

        store.unarchive(memory.id).unwrap();
        store.unarchive(memory.id).unwrap();
        let loaded = store.get(memory.id).unwrap().unwrap();
        assert_eq!(loaded.state, MemoryState::Active);
        assert!(loaded.archived_at.is_none());
    }

    #[test]
    fn archive_unknown_id_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.archive(Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn hit_counter_is_monotonic() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("sig");
        store.create(&memory).unwrap();

        store.increment_hit(memory.id).unwrap();
        store.increment_hit(memory.id).unwrap();
        assert_eq!(store.get(memory.id).unwrap().unwrap().hit_count, 3);
    }

    #[test]
    fn times_saved_clamps_at_hit_count() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("sig");
        store.create(&memory).unwrap();

        store.increment_saved(memory.id).unwrap();
        store.increment_saved(memory.id).unwrap(); // clamped: hit_count is 1
        let loaded = store.get(memory.id).unwrap().unwrap();
        assert_eq!(loaded.times_saved, 1);
        assert_eq!(loaded.hit_count, 1);
    }

    #[test]
    fn exact_match_skips_archived() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("sig");
        store.create(&memory).unwrap();
        store.archive(memory.id).unwrap();

        assert!(store.exact_by_signature("sig", false).unwrap().is_empty());
        assert_eq!(store.exact_by_signature("sig", true).unwrap().len(), 1);
    }

    #[test]
    fn text_candidates_survive_operator_queries() {
        let (_dir, store) = store();
        let memory = MemoryRecord::new("cannot call foo.bar")
            .with_root_cause("foo.bar() invoked before init");
        store.create(&memory).unwrap();

        // Operator characters must not produce an FTS syntax error
        let candidates = store
            .text_candidates("foo.bar(baz) -> panic!", None, 10, false)
            .unwrap();
        assert!(candidates.len() <= 1);
    }

    #[test]
    fn sweep_stale_archives_only_old_unhit_memories() {
        let (_dir, store) = store();
        let mut old = MemoryRecord::new("old-sig");
        old.created_at = Utc::now() - chrono::Duration::days(90);
        let fresh = MemoryRecord::new("fresh-sig");
        let mut old_but_hit = MemoryRecord::new("hit-sig");
        old_but_hit.created_at = Utc::now() - chrono::Duration::days(90);
        old_but_hit.hit_count = 4;

        store.create(&old).unwrap();
        store.create(&fresh).unwrap();
        store.create(&old_but_hit).unwrap();

        let swept = store.sweep_stale(60).unwrap();
        assert_eq!(swept, vec![old.id]);
        assert!(store.get(old.id).unwrap().unwrap().is_archived());
        assert!(!store.get(fresh.id).unwrap().unwrap().is_archived());
        assert!(!store.get(old_but_hit.id).unwrap().unwrap().is_archived());
    }
}
