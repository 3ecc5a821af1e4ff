//! # Regress Memory
//!
//! A regression-lesson memory engine for coding assistants: it fingerprints
//! errors, stores the lessons learned from them durably per project, and
//! resurfaces the most relevant past lesson before a mistake repeats.
//!
//! ## Architecture
//!
//! - **Signature normalization** - volatile tokens (paths, line numbers,
//!   literals) are stripped so the same logical error always fingerprints
//!   identically
//! - **Local store** - one SQLite database per project with a free-text index
//! - **Match cascade** - exact signature, tag overlap, lexical similarity and
//!   (optionally) vector similarity, evaluated in strict order
//! - **Global store** - cross-project lessons, partitioned by domain, fed by
//!   deduplicating promotion
//! - **Quality tracking** - hit/save counters and an archive lifecycle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use regress_memory::{Config, ErrorReport, MemoryEngine, SearchRequest};
//!
//! let engine = MemoryEngine::open(Config::default());
//!
//! // Ingest an error occurrence; get back "have I seen this before"
//! let ingested = engine.record_error(project_root, report).await?;
//!
//! // Ask before making a change
//! let hits = engine.search(project_root, SearchRequest::new("connection timeout")).await?;
//!
//! // Share a lesson across projects
//! engine.promote(project_root, ingested.memory_id, "backend").await?;
//! ```

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod matching;
pub mod record;
pub mod signature;
pub mod stats;
pub mod storage;

pub use config::Config;
pub use engine::{ErrorReport, ExportBundle, Ingested, MemoryEngine, SearchHit, SearchRequest};
pub use error::{Error, Result};
pub use matching::{MatchCascade, MatchLevel, MatchQuery, ScoredMatch};
pub use record::{MemoryRecord, MemoryState, SourceLink};
pub use stats::StatsReport;
pub use storage::{GlobalStore, LocalStore, PromotionOutcome};
