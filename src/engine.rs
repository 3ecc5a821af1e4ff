//! The memory engine: ingestion, retrieval and administration
//!
//! One engine serves many projects. Each project's local store opens lazily
//! on first use and stays cached for the process lifetime; the shared global
//! store opens the same way. The optional vector capability is probed once
//! at construction and never re-checked per call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::matching::{MatchCascade, MatchLevel, MatchQuery, ScoredMatch, VectorMatcher};
use crate::record::{MemoryRecord, SourceLink};
use crate::signature;
use crate::stats::StatsReport;
use crate::storage::vector::lesson_text;
use crate::storage::{
    GlobalStore, LocalStore, MatchSource, PromotionOutcome, RetryPolicy, VectorStorage,
};

/// Free-text fed to the cascade during ingestion is capped like the
/// original error text it came from.
const INGEST_QUERY_CHARS: usize = 200;

/// Raw error context handed over by the capture collaborator, together with
/// the distilled lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error_message: String,
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub stack_trace: String,
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_severity")]
    pub severity: u8,
    #[serde(default)]
    pub source_error_id: Option<String>,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub task_description: String,
    #[serde(default)]
    pub code_snippet: String,
    #[serde(default)]
    pub fix_snippet: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub prevention_rule: String,
    #[serde(default)]
    pub negative_constraint: String,
}

fn default_severity() -> u8 {
    3
}

impl ErrorReport {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            error_type: String::new(),
            stack_trace: String::new(),
            file_paths: Vec::new(),
            libraries: Vec::new(),
            tags: Vec::new(),
            category: String::new(),
            severity: default_severity(),
            source_error_id: None,
            project_name: String::new(),
            task_description: String::new(),
            code_snippet: String::new(),
            fix_snippet: String::new(),
            root_cause: String::new(),
            prevention_rule: String::new(),
            negative_constraint: String::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.severity) {
            return Err(Error::validation(format!(
                "severity must be 1..=5, got {}",
                self.severity
            )));
        }
        Ok(())
    }
}

/// Outcome of ingesting an error occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingested {
    /// The memory the occurrence landed on (new or pre-existing)
    pub memory_id: Uuid,

    /// True when a new memory was created (no exact-signature hit)
    pub created: bool,

    /// The immediate cascade result: "have I seen this before" feedback
    pub matches: Vec<SearchHit>,
}

/// Retrieval request for the query surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Search one global domain instead of the project-local store
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
}

fn default_n_results() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.3
}

impl SearchRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            category: None,
            n_results: default_n_results(),
            threshold: default_threshold(),
            domain: None,
            include_archived: false,
        }
    }
}

/// One surfaced memory with its confidence metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub error_signature: String,
    pub root_cause: String,
    pub prevention_rule: String,
    pub negative_constraint: String,
    pub hit_count: u32,
    pub times_saved: u32,
    pub match_level: MatchLevel,
    pub score: f32,
}

impl From<ScoredMatch> for SearchHit {
    fn from(m: ScoredMatch) -> Self {
        Self {
            id: m.memory.id,
            error_signature: m.memory.error_signature,
            root_cause: m.memory.root_cause,
            prevention_rule: m.memory.prevention_rule,
            negative_constraint: m.memory.negative_constraint,
            hit_count: m.memory.hit_count,
            times_saved: m.memory.times_saved,
            match_level: m.level,
            score: m.score,
        }
    }
}

/// Structured dump of a store for external formatters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub generated_at: DateTime<Utc>,
    /// "local" or "global:<domain>" / "global"
    pub scope: String,
    pub stats: StatsReport,
    pub memories: Vec<MemoryRecord>,
}

/// The regression memory engine
pub struct MemoryEngine {
    config: Config,
    cascade: MatchCascade,
    embedder: Option<Arc<EmbeddingService>>,
    locals: Mutex<HashMap<PathBuf, Arc<LocalStore>>>,
    global: Mutex<Option<Arc<GlobalStore>>>,
}

impl MemoryEngine {
    /// Build an engine, probing the optional vector capability once.
    ///
    /// A failed probe logs a warning and the engine runs lexical-only; it
    /// never fails construction.
    pub fn open(config: Config) -> Self {
        let embedder = if config.enable_vector {
            match EmbeddingService::probe(&config) {
                Ok(service) => Some(Arc::new(service)),
                Err(e) => {
                    tracing::warn!(error = %e, "vector capability unavailable; running lexical-only");
                    None
                }
            }
        } else {
            None
        };

        let cascade = MatchCascade::new(
            embedder
                .clone()
                .map(|e| VectorMatcher::new(e, config.vector_timeout)),
        );

        Self {
            config,
            cascade,
            embedder,
            locals: Mutex::new(HashMap::new()),
            global: Mutex::new(None),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.busy_retries, self.config.busy_backoff)
    }

    /// Lazily open (and cache) the local store for a project root.
    async fn local_store(&self, project: &Path) -> Result<Arc<LocalStore>> {
        let mut locals = self.locals.lock().await;
        if let Some(store) = locals.get(project) {
            return Ok(store.clone());
        }

        let mut store = LocalStore::open(&Config::local_db_path(project), self.retry_policy())?;
        if let Some(embedder) = &self.embedder {
            match VectorStorage::open(
                &Config::local_vector_path(project),
                embedder.dimensions(),
            )
            .await
            {
                Ok(sidecar) => store = store.with_vector(Arc::new(sidecar)),
                Err(e) => {
                    tracing::warn!(project = %project.display(), error = %e,
                        "vector sidecar unavailable for project store");
                }
            }
        }

        let store = Arc::new(store);
        locals.insert(project.to_path_buf(), store.clone());
        Ok(store)
    }

    /// Lazily open (and cache) the shared global store.
    async fn global_store(&self) -> Result<Arc<GlobalStore>> {
        let mut global = self.global.lock().await;
        if let Some(store) = global.as_ref() {
            return Ok(store.clone());
        }

        self.config.ensure_global_dir()?;
        let mut store = GlobalStore::open(&self.config.global_db_path(), self.retry_policy())?;
        if let Some(embedder) = &self.embedder {
            match VectorStorage::open(&self.config.global_vector_path(), embedder.dimensions())
                .await
            {
                Ok(sidecar) => store = store.with_vector(Arc::new(sidecar)),
                Err(e) => {
                    tracing::warn!(error = %e, "vector sidecar unavailable for global store");
                }
            }
        }

        let store = Arc::new(store);
        *global = Some(store.clone());
        Ok(store)
    }

    // === Ingestion ===

    /// Ingest an error occurrence: compute its signature, surface what the
    /// project already learned about it, and create a new memory when the
    /// signature is unseen.
    ///
    /// Every surfaced match has its hit counter incremented; on an exact hit
    /// the occurrence lands on the existing memory instead of a new row.
    pub async fn record_error(&self, project: &Path, report: ErrorReport) -> Result<Ingested> {
        report.validate()?;
        let sig = signature::normalize(&report.error_message, self.config.max_signature_input)?;
        let store = self.local_store(project).await?;

        let mut query = MatchQuery::new(
            sig.clone(),
            signature::truncate_chars(&report.error_message, INGEST_QUERY_CHARS),
        );
        query.tags = report.tags.clone();
        query.libraries = report.libraries.clone();
        query.n_results = self.config.default_n_results;
        query.threshold = self.config.default_threshold;
        query.validate()?;

        let matches = self.cascade.run(store.as_ref(), &query).await?;
        for m in &matches {
            store.increment_hit(m.memory.id)?;
        }

        let exact = matches.iter().find(|m| m.level == MatchLevel::Exact);
        let (memory_id, created) = match exact {
            Some(hit) => (hit.memory.id, false),
            None => {
                // Fall back to the raw error type when no category was assigned
                let category = if report.category.is_empty() {
                    report.error_type.clone()
                } else {
                    report.category.clone()
                };
                let record = MemoryRecord::new(sig)
                    .with_category(category)
                    .with_project_name(&report.project_name)
                    .with_file_paths(report.file_paths.clone())
                    .with_libraries(report.libraries.clone())
                    .with_tags(report.tags.clone())
                    .with_task_description(&report.task_description)
                    .with_snippets(&report.code_snippet, &report.fix_snippet)
                    .with_root_cause(&report.root_cause)
                    .with_prevention_rule(&report.prevention_rule)
                    .with_negative_constraint(&report.negative_constraint)
                    .with_severity(report.severity);
                let record = match &report.source_error_id {
                    Some(source) => record.with_source_error(source),
                    None => record,
                };

                store.create(&record)?;
                self.index_embedding(store.as_ref(), &record, "").await;
                (record.id, true)
            }
        };

        Ok(Ingested {
            memory_id,
            created,
            matches: matches.into_iter().map(SearchHit::from).collect(),
        })
    }

    /// Best-effort write into the vector sidecar; failures degrade, never
    /// abort the call that already committed to SQLite.
    async fn index_embedding(&self, source: &dyn MatchSource, record: &MemoryRecord, domain: &str) {
        let (Some(embedder), Some(sidecar)) = (&self.embedder, source.vector()) else {
            return;
        };
        match embedder.embed(&lesson_text(record)).await {
            Ok(embedding) => {
                if let Err(e) = sidecar.upsert(record, domain, &embedding).await {
                    tracing::warn!(memory_id = %record.id, error = %e, "vector index write failed");
                }
            }
            Err(e) => {
                tracing::warn!(memory_id = %record.id, error = %e, "embedding failed; memory not vector-indexed");
            }
        }
    }

    // === Query ===

    /// Search the project-local store, or one global domain when
    /// `request.domain` is set. Surfaced memories get their hit counter
    /// incremented.
    pub async fn search(&self, project: &Path, request: SearchRequest) -> Result<Vec<SearchHit>> {
        if request.query_text.trim().is_empty() {
            return Err(Error::validation("query_text must not be empty"));
        }

        let sig = signature::normalize(&request.query_text, self.config.max_signature_input)?;
        let mut query = MatchQuery::new(sig, request.query_text.clone());
        query.category = request.category.clone();
        query.n_results = request.n_results;
        query.threshold = request.threshold;
        query.include_archived = request.include_archived;
        query.domain = request.domain.clone();
        query.validate()?;

        match &request.domain {
            Some(domain) => {
                let store = self.global_store().await?;
                let scope = store.scoped(domain.clone());
                let matches = self.cascade.run(&scope, &query).await?;
                for m in &matches {
                    store.increment_hit(m.memory.id)?;
                }
                Ok(matches.into_iter().map(SearchHit::from).collect())
            }
            None => {
                let store = self.local_store(project).await?;
                let matches = self.cascade.run(store.as_ref(), &query).await?;
                for m in &matches {
                    store.increment_hit(m.memory.id)?;
                }
                Ok(matches.into_iter().map(SearchHit::from).collect())
            }
        }
    }

    // === Local administration ===

    pub async fn get(&self, project: &Path, id: Uuid) -> Result<MemoryRecord> {
        let store = self.local_store(project).await?;
        store
            .get(id)?
            .ok_or_else(|| Error::not_found(format!("memory {id}")))
    }

    pub async fn list(
        &self,
        project: &Path,
        category: Option<&str>,
        archived: Option<bool>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let store = self.local_store(project).await?;
        store.list(category, archived, limit)
    }

    pub async fn archive(&self, project: &Path, id: Uuid) -> Result<()> {
        self.local_store(project).await?.archive(id)
    }

    pub async fn unarchive(&self, project: &Path, id: Uuid) -> Result<()> {
        self.local_store(project).await?.unarchive(id)
    }

    /// Confirm a surfaced memory actually prevented a repeat mistake.
    pub async fn confirm_saved(&self, project: &Path, id: Uuid) -> Result<()> {
        self.local_store(project).await?.increment_saved(id)
    }

    /// Archive lessons that never re-surfaced and have gone stale.
    pub async fn sweep_stale(&self, project: &Path, days: i64) -> Result<Vec<Uuid>> {
        self.local_store(project).await?.sweep_stale(days)
    }

    pub async fn stats(&self, project: &Path) -> Result<StatsReport> {
        let store = self.local_store(project).await?;
        let records = store.list(None, None, usize::MAX)?;
        Ok(StatsReport::from_records(&records))
    }

    pub async fn export(&self, project: &Path) -> Result<ExportBundle> {
        let store = self.local_store(project).await?;
        let memories = store.list(None, None, usize::MAX)?;
        Ok(ExportBundle {
            generated_at: Utc::now(),
            scope: "local".to_string(),
            stats: StatsReport::from_records(&memories),
            memories,
        })
    }

    // === Promotion & global administration ===

    /// Promote a local lesson into a global domain, deduplicating by
    /// signature.
    ///
    /// Promoting an archived local memory is rejected with `NotFound`:
    /// archived memories are outside the active pool for every operation.
    pub async fn promote(
        &self,
        project: &Path,
        local_id: Uuid,
        domain: &str,
    ) -> Result<PromotionOutcome> {
        let store = self.local_store(project).await?;
        let record = store
            .get(local_id)?
            .ok_or_else(|| Error::not_found(format!("memory {local_id}")))?;
        if record.is_archived() {
            return Err(Error::not_found(format!(
                "memory {local_id} is archived and cannot be promoted"
            )));
        }

        let global = self.global_store().await?;
        let outcome = global.promote(&record, domain, false)?;
        if !outcome.merged {
            self.index_embedding(&global.scoped(domain), &outcome.record, domain)
                .await;
        }
        Ok(outcome)
    }

    pub async fn get_global(&self, id: Uuid) -> Result<MemoryRecord> {
        let store = self.global_store().await?;
        store
            .get(id)?
            .ok_or_else(|| Error::not_found(format!("global memory {id}")))
    }

    /// Promotion linkages feeding a global lesson.
    pub async fn promotion_sources(&self, global_id: Uuid) -> Result<Vec<SourceLink>> {
        self.global_store().await?.sources(global_id)
    }

    pub async fn list_global(
        &self,
        domain: Option<&str>,
        category: Option<&str>,
        archived: Option<bool>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        self.global_store().await?.list(domain, category, archived, limit)
    }

    pub async fn archive_global(&self, id: Uuid) -> Result<()> {
        self.global_store().await?.archive(id)
    }

    pub async fn unarchive_global(&self, id: Uuid) -> Result<()> {
        self.global_store().await?.unarchive(id)
    }

    pub async fn confirm_saved_global(&self, id: Uuid) -> Result<()> {
        self.global_store().await?.increment_saved(id)
    }

    pub async fn stats_global(&self, domain: Option<&str>) -> Result<StatsReport> {
        let store = self.global_store().await?;
        let records = store.list(domain, None, None, usize::MAX)?;
        Ok(StatsReport::from_records(&records))
    }

    pub async fn export_global(&self, domain: Option<&str>) -> Result<ExportBundle> {
        let store = self.global_store().await?;
        let memories = store.list(domain, None, None, usize::MAX)?;
        let scope = match domain {
            Some(d) => format!("global:{d}"),
            None => "global".to_string(),
        };
        Ok(ExportBundle {
            generated_at: Utc::now(),
            scope,
            stats: StatsReport::from_records(&memories),
            memories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine(dir: &tempfile::TempDir) -> MemoryEngine {
        let config = Config::with_global_data_dir(dir.path().join("global")).without_vector();
        MemoryEngine::open(config)
    }

    fn lesson_report(message: &str) -> ErrorReport {
        let mut report = ErrorReport::new(message);
        report.category = "frontend".into();
        report.tags = vec!["react".into()];
        report.project_name = "alpha".into();
        report.root_cause = "missing null check".into();
        report.prevention_rule = "guard optional fields before access".into();
        report
    }

    #[tokio::test]
    async fn repeat_occurrence_lands_on_the_same_memory() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let first = engine
            .record_error(
                &project,
                lesson_report(
                    "TypeError: cannot read property 'x' of undefined at /home/u/app/foo.py:42",
                ),
            )
            .await
            .unwrap();
        assert!(first.created);
        assert!(first.matches.is_empty());

        // Different path and line; same logical error
        let second = engine
            .record_error(
                &project,
                lesson_report(
                    "TypeError: cannot read property 'x' of undefined at /srv/app/bar.py:7",
                ),
            )
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.memory_id, first.memory_id);
        assert_eq!(second.matches.len(), 1);
        assert_eq!(second.matches[0].match_level, MatchLevel::Exact);

        let memory = engine.get(&project, first.memory_id).await.unwrap();
        assert_eq!(memory.hit_count, 2);
    }

    #[tokio::test]
    async fn ingestion_validates_severity_and_message() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let mut report = lesson_report("boom");
        report.severity = 9;
        assert!(matches!(
            engine.record_error(&project, report).await,
            Err(Error::Validation(_))
        ));

        assert!(matches!(
            engine.record_error(&project, ErrorReport::new("")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn search_falls_back_to_lexical_without_vector_backend() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let mut report = ErrorReport::new("ConnectionError: read timed out");
        report.root_cause = "connection timeout".into();
        engine.record_error(&project, report).await.unwrap();

        let hits = engine
            .search(&project, SearchRequest::new("connection timeout"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_level, MatchLevel::Lexical);
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn search_rejects_bad_arguments() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        assert!(matches!(
            engine.search(&project, SearchRequest::new("  ")).await,
            Err(Error::Validation(_))
        ));

        let mut request = SearchRequest::new("boom");
        request.n_results = 0;
        assert!(matches!(
            engine.search(&project, request).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn archived_memories_are_hidden_from_search() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let ingested = engine
            .record_error(&project, lesson_report("ValueError: boom"))
            .await
            .unwrap();
        engine.archive(&project, ingested.memory_id).await.unwrap();

        let hits = engine
            .search(&project, SearchRequest::new("ValueError: boom"))
            .await
            .unwrap();
        assert!(hits.is_empty());

        let mut with_archived = SearchRequest::new("ValueError: boom");
        with_archived.include_archived = true;
        let hits = engine.search(&project, with_archived).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn promotion_from_two_projects_converges_on_one_global_row() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project_a = dir.path().join("alpha");
        let project_b = dir.path().join("beta");
        let message = "KeyError: 'stripe_signature' at /app/webhooks.py:10";

        let a = engine
            .record_error(&project_a, lesson_report(message))
            .await
            .unwrap();
        let b = engine
            .record_error(&project_b, lesson_report(message))
            .await
            .unwrap();
        // Separate projects, separate stores: both created fresh memories
        assert!(a.created && b.created);

        let first = engine.promote(&project_a, a.memory_id, "backend").await.unwrap();
        assert!(!first.merged);
        let second = engine.promote(&project_b, b.memory_id, "backend").await.unwrap();
        assert!(second.merged);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.hit_count, 2);

        let active = engine
            .list_global(Some("backend"), None, Some(false), 50)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let links = engine.promotion_sources(first.record.id).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_ne!(links[0].source_memory_id, links[1].source_memory_id);
    }

    #[tokio::test]
    async fn promoting_an_archived_memory_is_rejected() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let ingested = engine
            .record_error(&project, lesson_report("RuntimeError: boom"))
            .await
            .unwrap();
        engine.archive(&project, ingested.memory_id).await.unwrap();

        let result = engine.promote(&project, ingested.memory_id, "backend").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        // And deterministically so
        let again = engine.promote(&project, ingested.memory_id, "backend").await;
        assert!(matches!(again, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn global_search_is_domain_scoped() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");
        let message = "IntegrityError: duplicate key 42";

        let ingested = engine
            .record_error(&project, lesson_report(message))
            .await
            .unwrap();
        engine.promote(&project, ingested.memory_id, "backend").await.unwrap();

        let mut backend = SearchRequest::new(message);
        backend.domain = Some("backend".into());
        let hits = engine.search(&project, backend).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_level, MatchLevel::Exact);

        let mut frontend = SearchRequest::new(message);
        frontend.domain = Some("frontend".into());
        let hits = engine.search(&project, frontend).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn export_returns_structured_data_with_stats() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let ingested = engine
            .record_error(&project, lesson_report("OSError: disk full"))
            .await
            .unwrap();
        engine.confirm_saved(&project, ingested.memory_id).await.unwrap();

        let bundle = engine.export(&project).await.unwrap();
        assert_eq!(bundle.scope, "local");
        assert_eq!(bundle.memories.len(), 1);
        assert_eq!(bundle.stats.total, 1);
        assert_eq!(bundle.stats.total_saves, 1);

        // Export is plain data; it must serialize cleanly
        let json = serde_json::to_string(&bundle).unwrap();
        assert!(json.contains("prevention_rule"));
    }

    #[tokio::test]
    async fn stats_rank_by_effectiveness() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let project = dir.path().join("proj");

        let useful = engine
            .record_error(&project, lesson_report("Error: useful lesson"))
            .await
            .unwrap();
        engine
            .record_error(&project, lesson_report("Error: noisy lesson"))
            .await
            .unwrap();
        engine.confirm_saved(&project, useful.memory_id).await.unwrap();

        let report = engine.stats(&project).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.top_memories[0].id, useful.memory_id);
        assert!(report.top_memories[0].effectiveness > report.top_memories[1].effectiveness);
    }
}
