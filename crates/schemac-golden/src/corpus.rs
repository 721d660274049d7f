//! Test corpus management for golden tests
//!
//! Cases live at `<corpus>/<category>/<name>/test.json`. The schema may be
//! inlined or named as a sibling `.json` file.

use crate::{GoldenError, Result};
use schemac_core::{CoerceTypes, Dialect, Options, RemoveAdditional, StrictMode, UseDefaults};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A test case in the corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,

    /// Category/group of the test
    pub category: String,

    pub input: TestInput,

    #[serde(default)]
    pub options: CaseOptions,

    pub expectations: TestExpectations,

    pub metadata: TestMetadata,
}

/// Schema and instances of a case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInput {
    /// The schema, or the name of a sibling file holding it
    pub schema: Value,

    /// Extra documents registered before compiling, by key
    #[serde(default)]
    pub documents: BTreeMap<String, Value>,

    /// Instances validated in order
    #[serde(default)]
    pub instances: Vec<Value>,
}

/// Compiler options a case runs with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseOptions {
    pub dialect: Option<Dialect>,
    pub all_errors: bool,
    pub coerce_types: Option<CoerceTypes>,
    pub use_defaults: Option<UseDefaults>,
    pub remove_additional: Option<RemoveAdditional>,
    pub strict: Option<StrictMode>,
    pub data: bool,
    pub verbose: bool,
}

impl CaseOptions {
    pub fn to_options(&self) -> Options {
        let mut opts = Options::default();
        if let Some(dialect) = self.dialect {
            opts = opts.with_dialect(dialect);
        }
        if let Some(strict) = self.strict {
            opts = opts.with_strict(strict);
        }
        if self.all_errors {
            opts = opts.with_all_errors();
        }
        if let Some(coerce) = self.coerce_types {
            opts = opts.with_coerce_types(coerce);
        }
        if let Some(defaults) = self.use_defaults {
            opts = opts.with_use_defaults(defaults);
        }
        if let Some(remove) = self.remove_additional {
            opts = opts.with_remove_additional(remove);
        }
        if self.data {
            opts = opts.with_data();
        }
        if self.verbose {
            opts = opts.with_verbose();
        }
        opts
    }
}

/// Expected behavior for a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExpectations {
    /// Whether the schema should compile
    #[serde(default = "default_true")]
    pub should_compile: bool,

    /// Pattern the compile error must match when `should_compile` is false
    pub error_pattern: Option<String>,

    /// Fields to ignore in comparison
    #[serde(default)]
    pub ignore_fields: Vec<String>,
}

/// Metadata about a test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMetadata {
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Priority level (lower = higher priority)
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u32 {
    100
}

/// Manages the test corpus
pub struct CorpusManager {
    corpus_dir: PathBuf,
}

impl CorpusManager {
    pub fn new(corpus_dir: impl AsRef<Path>) -> Self {
        Self {
            corpus_dir: corpus_dir.as_ref().to_path_buf(),
        }
    }

    /// Discover all test cases in the corpus, ordered by priority
    pub fn discover_tests(&self) -> Result<Vec<TestCase>> {
        let mut tests = Vec::new();

        if !self.corpus_dir.exists() {
            return Ok(tests);
        }

        for entry in WalkDir::new(&self.corpus_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.file_name() == Some(std::ffi::OsStr::new("test.json")) {
                match self.load_test_case(path) {
                    Ok(test_case) => tests.push(test_case),
                    Err(e) => eprintln!("Warning: Failed to load test case {:?}: {}", path, e),
                }
            }
        }

        tests.sort_by_key(|t| t.metadata.priority);
        Ok(tests)
    }

    /// Load a case, reading the schema from a sibling file when it is named
    pub fn load_test_case(&self, path: &Path) -> Result<TestCase> {
        let content = fs::read_to_string(path)?;
        let mut test_case: TestCase = serde_json::from_str(&content)?;

        if let Value::String(ref filename) = test_case.input.schema {
            if filename.ends_with(".json") {
                let test_dir = path
                    .parent()
                    .ok_or_else(|| GoldenError::InvalidCase {
                        path: path.display().to_string(),
                        message: "no parent directory".to_string(),
                    })?;
                let schema_content = fs::read_to_string(test_dir.join(filename))?;
                test_case.input.schema = serde_json::from_str(&schema_content)?;
            }
        }

        Ok(test_case)
    }

    pub fn filter_by_category(&self, tests: Vec<TestCase>, category: &str) -> Vec<TestCase> {
        tests
            .into_iter()
            .filter(|t| t.category == category || category == "*")
            .collect()
    }

    pub fn filter_by_tags(&self, tests: Vec<TestCase>, tags: &[String]) -> Vec<TestCase> {
        if tags.is_empty() {
            return tests;
        }
        tests
            .into_iter()
            .filter(|t| tags.iter().any(|tag| t.metadata.tags.contains(tag)))
            .collect()
    }

    /// Create the corpus directory structure with one sample case
    pub fn init_corpus(&self) -> Result<()> {
        for dir in ["basic", "refs", "unevaluated", "mutation", "edge-cases"] {
            fs::create_dir_all(self.corpus_dir.join(dir))?;
        }
        self.create_sample_test()
    }

    fn create_sample_test(&self) -> Result<()> {
        let test_dir = self.corpus_dir.join("basic/sample-integer");
        let test_path = test_dir.join("test.json");
        if test_path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&test_dir)?;

        let test_case = TestCase {
            name: "sample-integer".to_string(),
            category: "basic".to_string(),
            input: TestInput {
                schema: serde_json::json!({"type": "integer", "minimum": 1}),
                documents: BTreeMap::new(),
                instances: vec![serde_json::json!(3), serde_json::json!(0), serde_json::json!("3")],
            },
            options: CaseOptions::default(),
            expectations: TestExpectations {
                should_compile: true,
                error_pattern: None,
                ignore_fields: vec![],
            },
            metadata: TestMetadata {
                description: "Integer with a lower bound".to_string(),
                tags: vec!["basic".to_string(), "smoke".to_string()],
                enabled: true,
                priority: 1,
            },
        };

        fs::write(test_path, serde_json::to_string_pretty(&test_case)?)?;
        Ok(())
    }

    pub fn list_categories(&self) -> Result<Vec<String>> {
        let mut categories = Vec::new();

        if !self.corpus_dir.exists() {
            return Ok(categories);
        }

        for entry in fs::read_dir(&self.corpus_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    if name != "snapshots" {
                        categories.push(name.to_string());
                    }
                }
            }
        }

        categories.sort();
        Ok(categories)
    }

    pub fn get_statistics(&self) -> Result<CorpusStatistics> {
        let tests = self.discover_tests()?;

        let mut stats = CorpusStatistics {
            total_tests: tests.len(),
            ..Default::default()
        };

        for test in tests {
            if test.metadata.enabled {
                stats.enabled_tests += 1;
            } else {
                stats.disabled_tests += 1;
            }
            stats.total_instances += test.input.instances.len();
            *stats.tests_by_category.entry(test.category).or_insert(0) += 1;
        }

        Ok(stats)
    }
}

/// Statistics about the test corpus
#[derive(Debug, Default)]
pub struct CorpusStatistics {
    pub total_tests: usize,
    pub enabled_tests: usize,
    pub disabled_tests: usize,
    pub total_instances: usize,
    pub tests_by_category: BTreeMap<String, usize>,
}

impl CorpusStatistics {
    pub fn print(&self) {
        println!("=== Corpus Statistics ===");
        println!("Total tests: {}", self.total_tests);
        println!("Enabled: {}", self.enabled_tests);
        println!("Disabled: {}", self.disabled_tests);
        println!("Instances: {}", self.total_instances);

        if !self.tests_by_category.is_empty() {
            println!("\nTests by category:");
            for (category, count) in &self.tests_by_category {
                println!("  {}: {}", category, count);
            }
        }
    }
}
