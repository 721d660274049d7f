//! Golden test runner: compile, validate, compare with the snapshot

use crate::{
    corpus::{CorpusManager, TestCase},
    diff::DiffEngine,
    snapshot::{apply_ignores, SnapshotManager},
    GoldenConfig, GoldenError, Result,
};
use colored::*;
use regex::Regex;
use schemac_core::Compiler;
use serde_json::{json, Value};
use std::time::Instant;

/// Result of running a golden test
#[derive(Debug)]
pub struct TestResult {
    pub name: String,

    pub passed: bool,

    /// Error message if failed
    pub error: Option<String>,

    /// Diff output if comparison failed
    pub diff: Option<String>,

    pub duration_ms: u64,

    /// Whether snapshot was written
    pub updated: bool,
}

impl TestResult {
    fn failed(name: String, error: String) -> Self {
        Self {
            name,
            passed: false,
            error: Some(error),
            diff: None,
            duration_ms: 0,
            updated: false,
        }
    }

    pub fn print(&self, verbose: bool) {
        let status = if self.passed {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };

        println!("{} {} ({}ms)", status, self.name, self.duration_ms);

        if let Some(ref error) = self.error {
            println!("  {}: {}", "Error".red(), error);
        }

        if verbose || !self.passed {
            if let Some(ref diff) = self.diff {
                println!("{}", diff);
            }
        }

        if self.updated {
            println!("  {}", "Snapshot updated".yellow());
        }
    }
}

/// Runner for golden tests
pub struct GoldenTestRunner {
    config: GoldenConfig,
    corpus_manager: CorpusManager,
    snapshot_manager: SnapshotManager,
}

impl GoldenTestRunner {
    pub fn new(config: GoldenConfig) -> Self {
        let corpus_manager = CorpusManager::new(&config.corpus_dir);
        let snapshot_manager = SnapshotManager::new(&config.snapshot_dir);

        Self {
            config,
            corpus_manager,
            snapshot_manager,
        }
    }

    /// Run a single test by `<category>/<name>`
    pub fn run_test(&self, test_name: &str) -> Result<TestResult> {
        let start = Instant::now();

        let test_path = self.config.corpus_dir.join(test_name).join("test.json");
        let test_case = self.corpus_manager.load_test_case(&test_path)?;
        let result = self.execute_test(&test_case);
        let duration_ms = start.elapsed().as_millis() as u64;

        let test_result = match result {
            Ok((passed, diff, updated)) => TestResult {
                name: test_name.to_string(),
                passed,
                error: (!passed).then(|| "Snapshot mismatch".to_string()),
                diff,
                duration_ms,
                updated,
            },
            Err(e) => TestResult {
                duration_ms,
                ..TestResult::failed(test_name.to_string(), e.to_string())
            },
        };

        if self.config.verbose {
            test_result.print(true);
        }

        if test_result.passed {
            Ok(test_result)
        } else {
            Err(GoldenError::CaseFailed {
                case: test_name.to_string(),
                reason: test_result.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    /// Run every test whose name or category contains `pattern` (`*` for all)
    pub fn run_batch(&self, pattern: &str) -> Result<Vec<TestResult>> {
        let tests = self.corpus_manager.discover_tests()?;
        let selected: Vec<_> = tests
            .into_iter()
            .filter(|t| pattern == "*" || t.name.contains(pattern) || t.category.contains(pattern))
            .collect();

        if selected.is_empty() {
            return Err(GoldenError::NoCases { pattern: pattern.to_string() });
        }

        println!("Running {} tests...\n", selected.len());

        let mut results = Vec::new();
        let mut failed = 0;
        for test_case in selected {
            let test_name = format!("{}/{}", test_case.category, test_case.name);
            let result = self
                .run_test(&test_name)
                .unwrap_or_else(|e| TestResult::failed(test_name.clone(), e.to_string()));
            if !result.passed {
                failed += 1;
            }
            result.print(self.config.verbose);
            results.push(result);
        }

        println!("\n{}", "=== Test Summary ===".bold());
        println!(
            "{}: {} passed, {} failed",
            "Results".bold(),
            (results.len() - failed).to_string().green(),
            failed.to_string().red()
        );

        if failed > 0 {
            Err(GoldenError::BatchFailed { failed, total: results.len() })
        } else {
            Ok(results)
        }
    }

    fn execute_test(&self, test_case: &TestCase) -> Result<(bool, Option<String>, bool)> {
        if !test_case.metadata.enabled {
            return Ok((true, None, false));
        }

        let outcome = run_case(test_case)?;
        let snapshot_name = format!("{}/{}", test_case.category, test_case.name);

        if !self.snapshot_manager.exists(&snapshot_name) {
            if self.config.create_missing || self.config.update_snapshots {
                self.snapshot_manager
                    .create(&snapshot_name, outcome, Some(test_case.metadata.description.clone()))?;
                return Ok((true, None, true));
            }
            return Err(GoldenError::MissingSnapshot { case: snapshot_name });
        }

        let snapshot = self.snapshot_manager.load(&snapshot_name)?;
        let ignore_fields: Vec<String> = snapshot
            .ignore_fields
            .iter()
            .chain(&test_case.expectations.ignore_fields)
            .cloned()
            .collect();

        let mut expected = snapshot.content.clone();
        let mut actual = outcome.clone();
        apply_ignores(&mut expected, &ignore_fields);
        apply_ignores(&mut actual, &ignore_fields);

        let diff = DiffEngine::new(self.config.diff_options.clone()).compare(&expected, &actual);
        if diff.matches {
            Ok((true, None, false))
        } else if self.config.update_snapshots {
            self.snapshot_manager.backup(&snapshot_name)?;
            self.snapshot_manager.update(&snapshot_name, outcome)?;
            Ok((true, Some(diff.diff_output), true))
        } else {
            Ok((false, Some(diff.diff_output), false))
        }
    }

    pub fn init_corpus(&self) -> Result<()> {
        self.corpus_manager.init_corpus()
    }

    pub fn list_tests(&self) -> Result<Vec<String>> {
        let tests = self.corpus_manager.discover_tests()?;
        Ok(tests
            .into_iter()
            .map(|t| format!("{}/{}", t.category, t.name))
            .collect())
    }

    pub fn get_statistics(&self) -> Result<()> {
        self.corpus_manager.get_statistics()?.print();
        Ok(())
    }
}

/// Compile the case schema and validate every instance
///
/// A compile failure is part of the outcome, checked against the case
/// expectations before it is recorded.
pub fn run_case(test_case: &TestCase) -> Result<Value> {
    let mut compiler = Compiler::new(test_case.options.to_options())?;
    for (key, document) in &test_case.input.documents {
        compiler.add_schema(document.clone(), Some(key))?;
    }

    let expectations = &test_case.expectations;
    let validator = match compiler.compile(&test_case.input.schema) {
        Ok(validator) => {
            if !expectations.should_compile {
                return Err(GoldenError::CompileExpectation("schema compiled but was expected to fail".to_string()));
            }
            validator
        }
        Err(err) => {
            if expectations.should_compile {
                return Err(GoldenError::CompileExpectation(format!("schema failed to compile: {}", err)));
            }
            let message = err.to_string();
            if let Some(pattern) = &expectations.error_pattern {
                let re = Regex::new(pattern)
                    .map_err(|e| GoldenError::InvalidCase {
                        path: format!("{}/{}", test_case.category, test_case.name),
                        message: format!("invalid error pattern: {}", e),
                    })?;
                if !re.is_match(&message) {
                    return Err(GoldenError::CompileExpectation(format!(
                        "compile error '{}' does not match '{}'",
                        message, pattern
                    )));
                }
            }
            return Ok(json!({"compiled": false, "error": message}));
        }
    };

    let mut results = Vec::new();
    for instance in &test_case.input.instances {
        let mut data = instance.clone();
        let outcome = validator.check(&mut data)?;
        let mut result = json!({
            "valid": outcome.valid,
            "errors": serde_json::to_value(&outcome.errors)?,
        });
        if &data != instance {
            result["data"] = data;
        }
        results.push(result);
    }

    Ok(json!({"compiled": true, "results": results}))
}
