//! Storage backends for regress-memory

mod global;
mod local;
pub mod vector;

pub use global::{GlobalStore, PromotionOutcome};
pub use local::LocalStore;
pub use vector::{VectorHit, VectorStorage};

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::MemoryRecord;

/// Bounded retry policy for write transactions hitting a locked database.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

/// Read surface the match cascade needs from a store.
///
/// Both the per-project local store and a domain-scoped view of the global
/// store implement this, so one cascade serves both.
pub trait MatchSource: Send + Sync {
    /// Active memories whose signature equals `signature` exactly.
    fn exact_by_signature(
        &self,
        signature: &str,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>>;

    /// Full scan of matchable memories, optionally filtered by category.
    fn scan(&self, category: Option<&str>, include_archived: bool) -> Result<Vec<MemoryRecord>>;

    /// Free-text candidates for the lexical level. Implementations narrow
    /// via FTS5 when the query is indexable and fall back to a plain scan
    /// otherwise; scoring happens in the matcher.
    fn text_candidates(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<MemoryRecord>>;

    /// Fetch a single record by id.
    fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>>;

    /// The vector-index sidecar, when one is attached.
    fn vector(&self) -> Option<&VectorStorage>;
}

/// Run `op`, retrying with exponential backoff while SQLite reports lock
/// contention. Exhaustion surfaces as the retryable `Error::Busy`.
pub(crate) fn with_busy_retry<T>(policy: RetryPolicy, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut delay = policy.backoff;
    let mut attempt = 0;
    loop {
        match op() {
            Err(Error::Sqlite(e)) if is_busy(&e) => {
                attempt += 1;
                if attempt >= policy.attempts {
                    return Err(Error::busy(format!(
                        "database locked after {attempt} attempts"
                    )));
                }
                std::thread::sleep(delay);
                delay *= 2;
            }
            other => return other,
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

/// List columns (tags, libraries, file paths) are stored as JSON text.
pub(crate) fn encode_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

/// Tolerant decode: malformed stored JSON degrades to an empty list rather
/// than poisoning every read of the row.
pub(crate) fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::storage(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn decode_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::storage(format!("bad uuid {raw:?}: {e}")))
}

/// Escape a free-text query for FTS5 MATCH. Queries containing FTS5
/// operators are wrapped in a quoted phrase.
pub(crate) fn escape_fts_query(query: &str) -> String {
    if query.chars().any(|c| ".+-*(){}[]^~\":".contains(c)) {
        format!("\"{}\"", query.replace('"', "\"\""))
    } else {
        query.to_string()
    }
}

/// FTS text for the tags column: space-joined so tokens are matchable.
pub(crate) fn fts_tags(tags: &[String]) -> String {
    tags.join(" ")
}

/// Quote each whitespace token and OR-join, so multi-word queries match
/// memories containing any of the words and operator characters stay inert.
pub(crate) fn or_query(query: &str) -> String {
    let escaped = escape_fts_query(query);
    if escaped.starts_with('"') {
        return escaped;
    }
    escaped
        .split_whitespace()
        .map(|tok| format!("\"{tok}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_retry_surfaces_retryable_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<()> = with_busy_retry(policy, || {
            calls += 1;
            Err(Error::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                None,
            )))
        });
        assert_eq!(calls, 3);
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Busy(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn busy_retry_passes_through_other_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<()> = with_busy_retry(policy, || {
            calls += 1;
            Err(Error::validation("nope"))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn fts_escape_quotes_operator_queries() {
        assert_eq!(escape_fts_query("connection timeout"), "connection timeout");
        assert_eq!(
            escape_fts_query("foo.bar(baz)"),
            "\"foo.bar(baz)\""
        );
    }

    #[test]
    fn list_codec_roundtrip_and_tolerance() {
        let items = vec!["stripe".to_string(), "webhook".to_string()];
        let encoded = encode_list(&items).unwrap();
        assert_eq!(decode_list(&encoded), items);
        assert!(decode_list("not json").is_empty());
    }
}
