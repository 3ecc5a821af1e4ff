//! Ranked retrieval over a memory store
//!
//! The cascade runs an ordered list of [`Matcher`] strategies and stops at
//! the first level that yields anything. Level 1 (exact signature) is the
//! highest-confidence tier; Level 4 (vector) is an optional capability whose
//! failures never reach the caller.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::record::MemoryRecord;
use crate::storage::MatchSource;

/// The cascade tier that produced a match, carried as confidence metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    Exact,
    Tag,
    Lexical,
    Vector,
}

impl MatchLevel {
    /// Numeric tier (1 = exact ... 4 = vector)
    pub fn as_u8(self) -> u8 {
        match self {
            MatchLevel::Exact => 1,
            MatchLevel::Tag => 2,
            MatchLevel::Lexical => 3,
            MatchLevel::Vector => 4,
        }
    }
}

impl std::fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchLevel::Exact => write!(f, "exact"),
            MatchLevel::Tag => write!(f, "tag"),
            MatchLevel::Lexical => write!(f, "lexical"),
            MatchLevel::Vector => write!(f, "vector"),
        }
    }
}

/// Retrieval input for the cascade
#[derive(Debug, Clone)]
pub struct MatchQuery {
    /// Normalized signature for Level-1 equality
    pub signature: String,

    /// Optional category filter applied at every level
    pub category: Option<String>,

    /// Tags for Level-2 overlap
    pub tags: Vec<String>,

    /// Libraries for Level-2 overlap
    pub libraries: Vec<String>,

    /// Free text for Level-3/4 similarity
    pub free_text: String,

    /// Maximum results returned
    pub n_results: usize,

    /// Minimum score for lexical and vector matches (0.0 - 1.0)
    pub threshold: f32,

    /// Include archived memories in results
    pub include_archived: bool,

    /// Global-store domain partition; `None` for local searches
    pub domain: Option<String>,
}

impl MatchQuery {
    pub fn new(signature: impl Into<String>, free_text: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            category: None,
            tags: Vec::new(),
            libraries: Vec::new(),
            free_text: free_text.into(),
            n_results: 5,
            threshold: 0.3,
            include_archived: false,
            domain: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_results == 0 {
            return Err(Error::validation("n_results must be positive"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::validation("threshold must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

/// A memory surfaced by the cascade, annotated with its level and score
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub memory: MemoryRecord,
    pub level: MatchLevel,
    pub score: f32,
}

/// One retrieval strategy in the cascade
#[async_trait]
pub trait Matcher: Send + Sync {
    fn level(&self) -> MatchLevel;

    /// Whether a failure of this matcher should be absorbed (optional
    /// capability) instead of failing the caller.
    fn optional(&self) -> bool {
        false
    }

    async fn run(&self, source: &dyn MatchSource, query: &MatchQuery)
        -> Result<Vec<ScoredMatch>>;
}

/// Level 1: active memories whose signature equals the query signature.
pub struct ExactMatcher;

#[async_trait]
impl Matcher for ExactMatcher {
    fn level(&self) -> MatchLevel {
        MatchLevel::Exact
    }

    async fn run(
        &self,
        source: &dyn MatchSource,
        query: &MatchQuery,
    ) -> Result<Vec<ScoredMatch>> {
        let memories = source.exact_by_signature(&query.signature, query.include_archived)?;
        Ok(memories
            .into_iter()
            .filter(|m| category_matches(m, query))
            .map(|memory| ScoredMatch {
                memory,
                level: MatchLevel::Exact,
                score: 1.0,
            })
            .collect())
    }
}

/// Level 2: memories sharing at least one tag or library with the query,
/// ranked by overlap count.
pub struct TagMatcher;

#[async_trait]
impl Matcher for TagMatcher {
    fn level(&self) -> MatchLevel {
        MatchLevel::Tag
    }

    async fn run(
        &self,
        source: &dyn MatchSource,
        query: &MatchQuery,
    ) -> Result<Vec<ScoredMatch>> {
        if query.tags.is_empty() && query.libraries.is_empty() {
            return Ok(Vec::new());
        }

        let query_tags = lowered(&query.tags);
        let query_libs = lowered(&query.libraries);

        let memories = source.scan(query.category.as_deref(), query.include_archived)?;
        Ok(memories
            .into_iter()
            .filter_map(|memory| {
                let overlap = overlap_count(&query_tags, &memory.tags)
                    + overlap_count(&query_libs, &memory.libraries);
                (overlap > 0).then(|| ScoredMatch {
                    memory,
                    level: MatchLevel::Tag,
                    score: overlap as f32,
                })
            })
            .collect())
    }
}

/// Level 3: free-text similarity. FTS5 narrows the candidate set; the score
/// is token-overlap Jaccard so `threshold` means the same thing whether or
/// not the text index could digest the query.
pub struct LexicalMatcher;

#[async_trait]
impl Matcher for LexicalMatcher {
    fn level(&self) -> MatchLevel {
        MatchLevel::Lexical
    }

    async fn run(
        &self,
        source: &dyn MatchSource,
        query: &MatchQuery,
    ) -> Result<Vec<ScoredMatch>> {
        let query_tokens = tokens(&query.free_text);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = (query.n_results * 4).max(20);
        let candidates = source.text_candidates(
            &query.free_text,
            query.category.as_deref(),
            fetch,
            query.include_archived,
        )?;

        Ok(candidates
            .into_iter()
            .filter_map(|memory| {
                let text = indexed_text(&memory);
                let score = jaccard(&query_tokens, &tokens(&text));
                (score >= query.threshold && score > 0.0).then(|| ScoredMatch {
                    memory,
                    level: MatchLevel::Lexical,
                    score,
                })
            })
            .collect())
    }
}

/// Level 4: optional nearest-neighbour lookup over the vector sidecar.
pub struct VectorMatcher {
    embedder: Arc<EmbeddingService>,
    timeout: Duration,
}

impl VectorMatcher {
    pub fn new(embedder: Arc<EmbeddingService>, timeout: Duration) -> Self {
        Self { embedder, timeout }
    }
}

#[async_trait]
impl Matcher for VectorMatcher {
    fn level(&self) -> MatchLevel {
        MatchLevel::Vector
    }

    fn optional(&self) -> bool {
        true
    }

    async fn run(
        &self,
        source: &dyn MatchSource,
        query: &MatchQuery,
    ) -> Result<Vec<ScoredMatch>> {
        let Some(sidecar) = source.vector() else {
            return Ok(Vec::new());
        };

        let lookup = async {
            let embedding = self.embedder.embed(&query.free_text).await?;
            sidecar
                .search(
                    &embedding,
                    query.n_results,
                    query.threshold,
                    query.domain.as_deref(),
                )
                .await
        };

        let hits = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::backend("vector lookup timed out")),
        };

        let mut matches = Vec::new();
        for hit in hits {
            // The sidecar knows vectors, not lifecycle; re-check the row.
            let Some(memory) = source.get(hit.id)? else {
                continue;
            };
            if memory.is_archived() && !query.include_archived {
                continue;
            }
            if !category_matches(&memory, query) {
                continue;
            }
            matches.push(ScoredMatch {
                memory,
                level: MatchLevel::Vector,
                score: hit.score,
            });
        }
        Ok(matches)
    }
}

static BACKEND_WARNED: Once = Once::new();

/// The ordered strategy chain
pub struct MatchCascade {
    matchers: Vec<Box<dyn Matcher>>,
}

impl MatchCascade {
    /// Build the cascade. The vector level is present only when the
    /// embedding capability probe succeeded at startup.
    pub fn new(vector: Option<VectorMatcher>) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> =
            vec![Box::new(ExactMatcher), Box::new(TagMatcher), Box::new(LexicalMatcher)];
        if let Some(vector) = vector {
            matchers.push(Box::new(vector));
        }
        Self { matchers }
    }

    /// Evaluate levels in strict order; the first non-empty level wins.
    ///
    /// Deterministic: for a fixed store state and identical arguments, the
    /// returned ordering is identical call to call.
    pub async fn run(
        &self,
        source: &dyn MatchSource,
        query: &MatchQuery,
    ) -> Result<Vec<ScoredMatch>> {
        for matcher in &self.matchers {
            let mut matches = match matcher.run(source, query).await {
                Ok(matches) => matches,
                Err(err) if matcher.optional() => {
                    BACKEND_WARNED.call_once(|| {
                        tracing::warn!(
                            level = %matcher.level(),
                            error = %err,
                            "optional match backend failed; degrading silently"
                        );
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            if matches.is_empty() {
                continue;
            }
            rank(&mut matches);
            matches.truncate(query.n_results);
            return Ok(matches);
        }
        Ok(Vec::new())
    }
}

/// Within-level ordering: score desc, then recency, then hit count. The
/// trailing id comparison makes the ordering total, so repeated calls with
/// identical state return identical output.
fn rank(matches: &mut [ScoredMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| b.memory.hit_count.cmp(&a.memory.hit_count))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}

fn category_matches(memory: &MemoryRecord, query: &MatchQuery) -> bool {
    match &query.category {
        Some(cat) => memory.error_category == *cat,
        None => true,
    }
}

fn lowered(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

fn overlap_count(query: &HashSet<String>, memory_items: &[String]) -> usize {
    memory_items
        .iter()
        .filter(|item| query.contains(&item.to_lowercase()))
        .count()
}

/// Free-text searched fields, mirroring the FTS index columns.
fn indexed_text(memory: &MemoryRecord) -> String {
    format!(
        "{} {} {} {}",
        memory.error_signature,
        memory.root_cause,
        memory.prevention_rule,
        memory.tags.join(" ")
    )
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}
