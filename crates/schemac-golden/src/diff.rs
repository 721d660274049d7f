//! Structural comparison of snapshot contents with a readable line diff

use colored::*;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Whether to use colored output
    pub colored: bool,

    /// Sort object keys before comparing
    pub normalize: bool,

    /// Tolerance for floating point comparison
    pub float_tolerance: f64,

    /// Maximum diff lines to show (0 = unlimited)
    pub max_diff_lines: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            colored: true,
            normalize: true,
            float_tolerance: 1e-9,
            max_diff_lines: 100,
        }
    }
}

#[derive(Debug)]
pub struct DiffResult {
    pub matches: bool,

    /// Human-readable diff output
    pub diff_output: String,

    /// Paths that differ, `results[1].errors[0].keyword` style
    pub differing_paths: Vec<String>,
}

/// Engine for comparing JSON values
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn compare(&self, expected: &Value, actual: &Value) -> DiffResult {
        let (expected, actual) = if self.options.normalize {
            (
                crate::snapshot::normalize_json(expected),
                crate::snapshot::normalize_json(actual),
            )
        } else {
            (expected.clone(), actual.clone())
        };

        if self.values_match(&expected, &actual) {
            return DiffResult {
                matches: true,
                diff_output: String::new(),
                differing_paths: Vec::new(),
            };
        }

        let mut differing_paths = Vec::new();
        self.collect_diff_paths(&expected, &actual, String::new(), &mut differing_paths);
        DiffResult {
            matches: false,
            diff_output: self.line_diff(&expected, &actual),
            differing_paths,
        }
    }

    fn values_match(&self, expected: &Value, actual: &Value) -> bool {
        match (expected, actual) {
            (Value::Object(exp), Value::Object(act)) => {
                exp.len() == act.len()
                    && exp
                        .iter()
                        .all(|(key, e)| act.get(key).is_some_and(|a| self.values_match(e, a)))
            }
            (Value::Array(exp), Value::Array(act)) => {
                exp.len() == act.len() && exp.iter().zip(act).all(|(e, a)| self.values_match(e, a))
            }
            (Value::Number(exp), Value::Number(act)) => match (exp.as_f64(), act.as_f64()) {
                (Some(e), Some(a)) => (e - a).abs() <= self.options.float_tolerance,
                _ => exp == act,
            },
            (exp, act) => exp == act,
        }
    }

    fn line_diff(&self, expected: &Value, actual: &Value) -> String {
        let expected_str = serde_json::to_string_pretty(expected).unwrap_or_default();
        let actual_str = serde_json::to_string_pretty(actual).unwrap_or_default();
        let text_diff = TextDiff::from_lines(&expected_str, &actual_str);

        let mut output = if self.options.colored {
            format!("{}\n", "=== Diff Output ===".bold())
        } else {
            "=== Diff Output ===\n".to_string()
        };

        let mut line_count = 0;
        for change in text_diff.iter_all_changes() {
            if self.options.max_diff_lines > 0 && line_count >= self.options.max_diff_lines {
                output.push_str("... (diff truncated) ...\n");
                break;
            }
            let line = match (change.tag(), self.options.colored) {
                (ChangeTag::Delete, true) => format!("{}{}", "-".red(), change.to_string().red()),
                (ChangeTag::Delete, false) => format!("-{}", change),
                (ChangeTag::Insert, true) => format!("{}{}", "+".green(), change.to_string().green()),
                (ChangeTag::Insert, false) => format!("+{}", change),
                (ChangeTag::Equal, _) => format!(" {}", change),
            };
            output.push_str(&line);
            line_count += 1;
        }
        output
    }

    fn collect_diff_paths(&self, expected: &Value, actual: &Value, path: String, paths: &mut Vec<String>) {
        match (expected, actual) {
            (Value::Object(exp), Value::Object(act)) => {
                let keys: BTreeSet<_> = exp.keys().chain(act.keys()).collect();
                for key in keys {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    match (exp.get(key), act.get(key)) {
                        (Some(e), Some(a)) if !self.values_match(e, a) => self.collect_diff_paths(e, a, child, paths),
                        (Some(_), None) => paths.push(format!("{} (missing in actual)", child)),
                        (None, Some(_)) => paths.push(format!("{} (extra in actual)", child)),
                        _ => {}
                    }
                }
            }
            (Value::Array(exp), Value::Array(act)) => {
                for (i, (e, a)) in exp.iter().zip(act).enumerate() {
                    if !self.values_match(e, a) {
                        self.collect_diff_paths(e, a, format!("{}[{}]", path, i), paths);
                    }
                }
                if exp.len() != act.len() {
                    paths.push(format!("{} (array length mismatch: {} vs {})", path, exp.len(), act.len()));
                }
            }
            _ => paths.push(path),
        }
    }
}
