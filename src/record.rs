//! Memory record types shared by the local and global stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a memory
///
/// Memories are never hard-deleted; archiving is the only removal mechanism
/// and can be reversed, returning the memory to the active retrieval pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    Active,
    Archived,
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryState::Active => write!(f, "active"),
            MemoryState::Archived => write!(f, "archived"),
        }
    }
}

/// A regression lesson learned from a past error
///
/// The same shape is used in the per-project local store and the shared
/// global store; global rows additionally carry `domain`, `origin_project`
/// and `promoted_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique memory ID
    pub id: Uuid,

    /// Normalized, volatility-stripped fingerprint of the error
    pub error_signature: String,

    /// Coarse classification (e.g. "api", "database", "frontend")
    #[serde(default)]
    pub error_category: String,

    /// Human-readable name of the project the error occurred in
    #[serde(default)]
    pub project_name: String,

    /// Files involved in the original error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_paths: Vec<String>,

    /// Libraries involved in the original error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,

    /// Tags for categorization and Level-2 matching
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// What the developer was doing when the error occurred
    #[serde(default)]
    pub task_description: String,

    /// Offending code, kept local only (stripped on promotion)
    #[serde(default)]
    pub code_snippet: String,

    /// The fix that resolved the error, kept local only
    #[serde(default)]
    pub fix_snippet: String,

    /// Why the error happened
    #[serde(default)]
    pub root_cause: String,

    /// Rule that prevents the error from repeating
    #[serde(default)]
    pub prevention_rule: String,

    /// "Never do X" phrasing of the lesson
    #[serde(default)]
    pub negative_constraint: String,

    /// Severity 1 (cosmetic) to 5 (data loss)
    pub severity: u8,

    /// Times this memory was surfaced as a matching result
    pub hit_count: u32,

    /// Times a surfaced match was confirmed to have prevented a repeat
    pub times_saved: u32,

    /// Lifecycle state
    pub state: MemoryState,

    /// When the memory was archived, if it is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    /// Link to the raw error record that produced this lesson
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_error_id: Option<String>,

    /// Global only: domain partition ("backend", "frontend", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Global only: name of the project the lesson was promoted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_project: Option<String>,

    /// Global only: when the lesson was first promoted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<DateTime<Utc>>,

    /// When the memory was created
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new active local memory for a signature.
    ///
    /// `hit_count` starts at 1: the occurrence that created the lesson is
    /// its first observation.
    pub fn new(error_signature: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            error_signature: error_signature.into(),
            error_category: String::new(),
            project_name: String::new(),
            file_paths: Vec::new(),
            libraries: Vec::new(),
            tags: Vec::new(),
            task_description: String::new(),
            code_snippet: String::new(),
            fix_snippet: String::new(),
            root_cause: String::new(),
            prevention_rule: String::new(),
            negative_constraint: String::new(),
            severity: 3,
            hit_count: 1,
            times_saved: 0,
            state: MemoryState::Active,
            archived_at: None,
            source_error_id: None,
            domain: None,
            origin_project: None,
            promoted_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.error_category = category.into();
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    pub fn with_file_paths(mut self, file_paths: Vec<String>) -> Self {
        self.file_paths = file_paths;
        self
    }

    pub fn with_libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_task_description(mut self, task: impl Into<String>) -> Self {
        self.task_description = task.into();
        self
    }

    pub fn with_snippets(
        mut self,
        code_snippet: impl Into<String>,
        fix_snippet: impl Into<String>,
    ) -> Self {
        self.code_snippet = code_snippet.into();
        self.fix_snippet = fix_snippet.into();
        self
    }

    pub fn with_root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = root_cause.into();
        self
    }

    pub fn with_prevention_rule(mut self, rule: impl Into<String>) -> Self {
        self.prevention_rule = rule.into();
        self
    }

    pub fn with_negative_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.negative_constraint = constraint.into();
        self
    }

    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_source_error(mut self, source_error_id: impl Into<String>) -> Self {
        self.source_error_id = Some(source_error_id.into());
        self
    }

    pub fn is_archived(&self) -> bool {
        self.state == MemoryState::Archived
    }

    /// Derive the global-store copy of this lesson for promotion.
    ///
    /// Project-specific fields (file paths, snippets, task description,
    /// raw-error link) stay local; only the distilled lesson travels.
    pub fn promoted(&self, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            error_signature: self.error_signature.clone(),
            error_category: self.error_category.clone(),
            project_name: String::new(),
            file_paths: Vec::new(),
            libraries: self.libraries.clone(),
            tags: self.tags.clone(),
            task_description: String::new(),
            code_snippet: String::new(),
            fix_snippet: String::new(),
            root_cause: self.root_cause.clone(),
            prevention_rule: self.prevention_rule.clone(),
            negative_constraint: self.negative_constraint.clone(),
            severity: self.severity,
            hit_count: 1,
            times_saved: 0,
            state: MemoryState::Active,
            archived_at: None,
            source_error_id: None,
            domain: Some(domain.into()),
            origin_project: Some(self.project_name.clone()),
            promoted_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    /// Effectiveness ratio used for stats ranking.
    pub fn effectiveness(&self) -> f64 {
        self.times_saved as f64 / self.hit_count.max(1) as f64
    }
}

/// A recorded promotion linkage from a local memory into a global one.
///
/// One global row can accumulate several links when the same lesson is
/// promoted from different projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLink {
    /// The global memory the local lesson was merged into
    pub global_id: Uuid,

    /// The originating local memory
    pub source_memory_id: Uuid,

    /// Project name the promotion came from
    #[serde(default)]
    pub origin_project: String,

    /// When this linkage was recorded
    pub promoted_at: DateTime<Utc>,
}
