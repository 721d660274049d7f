//! Golden test infrastructure for the schemac validator compiler
//!
//! A corpus case is a schema, compiler options and a list of instances.
//! The runner compiles the schema, validates every instance and compares
//! the outcomes (validity, error objects, mutated instances) against a
//! stored snapshot.

pub mod corpus;
pub mod diff;
pub mod runner;
pub mod snapshot;

use std::path::PathBuf;
use thiserror::Error;

pub use corpus::{CaseOptions, CorpusManager, TestCase};
pub use diff::{DiffEngine, DiffOptions};
pub use runner::{GoldenTestRunner, TestResult};
pub use snapshot::{Snapshot, SnapshotManager};

/// Failures while loading, running or recording schema cases
#[derive(Debug, Error)]
pub enum GoldenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The compiler rejected its options or a case document before the
    /// case schema itself was compiled
    #[error("compiler setup failed: {0}")]
    Compiler(#[from] schemac_core::Error),

    /// A `test.json` or snapshot file that cannot be used as written
    #[error("invalid case {path}: {message}")]
    InvalidCase { path: String, message: String },

    #[error("no snapshot for case '{case}'; run with UPDATE_GOLDEN=1 to record it")]
    MissingSnapshot { case: String },

    #[error("no cases match '{pattern}'")]
    NoCases { pattern: String },

    /// The schema compiled when the case expected a compile error, or the
    /// other way round
    #[error("compile expectation not met: {0}")]
    CompileExpectation(String),

    #[error("case '{case}' failed: {reason}")]
    CaseFailed { case: String, reason: String },

    #[error("{failed} of {total} case(s) failed")]
    BatchFailed { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, GoldenError>;

/// Where schema cases and their recorded outcomes live
#[derive(Debug, Clone)]
pub struct GoldenConfig {
    /// Cases as `<category>/<name>/test.json`, schemas optionally in a
    /// sibling file
    pub corpus_dir: PathBuf,

    /// Recorded outcomes as `<category>/<name>.json`
    pub snapshot_dir: PathBuf,

    /// Overwrite outcomes that differ (a `.bak` copy is kept)
    pub update_snapshots: bool,

    /// Record outcomes for cases that have none yet
    pub create_missing: bool,

    pub diff_options: DiffOptions,

    /// Print every case result, not only failures
    pub verbose: bool,
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl GoldenConfig {
    /// Corpus at `corpus_dir` with snapshots in its `snapshots` directory
    pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
        let corpus_dir = corpus_dir.into();
        Self {
            snapshot_dir: corpus_dir.join("snapshots"),
            corpus_dir,
            update_snapshots: false,
            create_missing: false,
            diff_options: DiffOptions::default(),
            verbose: false,
        }
    }

    /// Workspace corpus, overridden by `GOLDEN_CORPUS_DIR`,
    /// `GOLDEN_SNAPSHOT_DIR`, `UPDATE_GOLDEN` and `GOLDEN_VERBOSE`
    pub fn from_env() -> Self {
        let corpus_dir = std::env::var("GOLDEN_CORPUS_DIR").unwrap_or_else(|_| "../../golden-corpus".to_string());
        let mut config = Self::new(corpus_dir);
        if let Ok(snapshot_dir) = std::env::var("GOLDEN_SNAPSHOT_DIR") {
            config.snapshot_dir = PathBuf::from(snapshot_dir);
        }
        config.update_snapshots = env_flag("UPDATE_GOLDEN").unwrap_or(false);
        config.create_missing = config.update_snapshots;
        config.verbose = env_flag("GOLDEN_VERBOSE").unwrap_or(false);
        config
    }
}

impl Default for GoldenConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Macro for defining golden tests
#[macro_export]
macro_rules! golden_test {
    ($(#[$meta:meta])* $name:ident, $test_path:expr) => {
        $(#[$meta])*
        #[test]
        fn $name() {
            use $crate::{GoldenConfig, GoldenTestRunner};

            let config = GoldenConfig::from_env();
            let runner = GoldenTestRunner::new(config);

            runner
                .run_test($test_path)
                .unwrap_or_else(|e| panic!("Golden test failed: {}: {}", $test_path, e));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        let config = GoldenConfig::from_env();
        assert!(!config.corpus_dir.as_os_str().is_empty());
        assert!(!config.snapshot_dir.as_os_str().is_empty());
    }

    #[test]
    fn test_config_new_places_snapshots_in_corpus() {
        let config = GoldenConfig::new("cases");
        assert_eq!(config.snapshot_dir, PathBuf::from("cases").join("snapshots"));
        assert!(!config.update_snapshots && !config.create_missing);
    }

    #[test]
    fn test_error_messages_name_the_case() {
        let err = GoldenError::MissingSnapshot { case: "refs/cross-document".to_string() };
        assert!(err.to_string().contains("refs/cross-document"));
        let err = GoldenError::BatchFailed { failed: 2, total: 5 };
        assert_eq!(err.to_string(), "2 of 5 case(s) failed");
    }
}
