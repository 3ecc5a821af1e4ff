//! Configuration for regress-memory

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project hidden state directory.
pub const PROJECT_STATE_DIR: &str = ".regress";

/// Configuration for the memory engine
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for the shared cross-project (global) store
    pub global_data_dir: PathBuf,

    /// Embedding model name (for reference, actual model set in embedding.rs)
    pub embedding_model: String,

    /// Embedding dimensions (384 for all-MiniLM-L6-v2)
    pub embedding_dimensions: usize,

    /// Default maximum number of results returned by a search
    pub default_n_results: usize,

    /// Default minimum score for lexical/vector matches (0.0 - 1.0)
    pub default_threshold: f32,

    /// Whether to probe the optional vector backend at startup
    pub enable_vector: bool,

    /// Upper bound on a single embed + nearest-neighbour round trip
    pub vector_timeout: Duration,

    /// Attempts before a locked database surfaces as `Error::Busy`
    pub busy_retries: u32,

    /// Initial backoff between lock retries (doubles per attempt)
    pub busy_backoff: Duration,

    /// Raw error text longer than this is truncated before normalization
    pub max_signature_input: usize,
}

impl Default for Config {
    fn default() -> Self {
        let global_data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("regress-memory");

        Self {
            global_data_dir,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384, // MiniLM-L6-v2 outputs 384-dim vectors
            default_n_results: 5,
            default_threshold: 0.3,
            enable_vector: true,
            vector_timeout: Duration::from_secs(3),
            busy_retries: 5,
            busy_backoff: Duration::from_millis(50),
            max_signature_input: 2_000,
        }
    }
}

impl Config {
    /// Create a new config with a custom global data directory
    pub fn with_global_data_dir(global_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_data_dir: global_data_dir.into(),
            ..Default::default()
        }
    }

    /// Disable the optional vector backend (lexical matching only)
    pub fn without_vector(mut self) -> Self {
        self.enable_vector = false;
        self
    }

    /// Per-project state directory (`<project>/.regress`)
    pub fn project_state_dir(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_STATE_DIR)
    }

    /// Path to a project's local memory database
    pub fn local_db_path(project_root: &Path) -> PathBuf {
        Self::project_state_dir(project_root).join("memory.db")
    }

    /// Path to a project's vector-index sidecar
    pub fn local_vector_path(project_root: &Path) -> PathBuf {
        Self::project_state_dir(project_root).join("vectors")
    }

    /// Path to the shared global database
    pub fn global_db_path(&self) -> PathBuf {
        self.global_data_dir.join("global.db")
    }

    /// Path to the global vector-index sidecar
    pub fn global_vector_path(&self) -> PathBuf {
        self.global_data_dir.join("vectors")
    }

    /// Ensure the global state directory exists
    pub fn ensure_global_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.global_data_dir)
    }
}
