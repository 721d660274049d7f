//! Snapshot files: the recorded outcome of a corpus case

use crate::{GoldenError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// `<category>/<name>` of the case
    pub name: String,

    pub metadata: SnapshotMetadata,

    /// Compile result and per-instance outcomes
    pub content: Value,

    /// Fields to ignore during comparison
    #[serde(default)]
    pub ignore_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Version of the snapshot format
    pub version: String,

    pub created_at: String,

    pub updated_at: String,

    pub description: Option<String>,
}

/// Manages reading and writing snapshots
pub struct SnapshotManager {
    snapshot_dir: PathBuf,
}

impl SnapshotManager {
    pub fn new(snapshot_dir: impl AsRef<Path>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, name: &str) -> Result<Snapshot> {
        let path = self.snapshot_path(name);

        if !path.exists() {
            return Err(GoldenError::MissingSnapshot { case: name.to_string() });
        }

        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(&snapshot.name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;
        Ok(())
    }

    pub fn update(&self, name: &str, new_content: Value) -> Result<()> {
        let mut snapshot = self.load(name)?;
        snapshot.content = new_content;
        snapshot.metadata.updated_at = Utc::now().to_rfc3339();
        self.save(&snapshot)
    }

    pub fn create(&self, name: &str, content: Value, description: Option<String>) -> Result<Snapshot> {
        let now = Utc::now().to_rfc3339();

        let snapshot = Snapshot {
            name: name.to_string(),
            metadata: SnapshotMetadata {
                version: "1.0.0".to_string(),
                created_at: now.clone(),
                updated_at: now,
                description,
            },
            content,
            ignore_fields: Vec::new(),
        };

        self.save(&snapshot)?;
        Ok(snapshot)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.snapshot_path(name).exists()
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.snapshot_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        let filename = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{}.json", name)
        };
        self.snapshot_dir.join(filename)
    }

    /// Copy a snapshot aside before overwriting it
    pub fn backup(&self, name: &str) -> Result<()> {
        let source = self.snapshot_path(name);
        if !source.exists() {
            return Ok(());
        }
        let backup_name = format!("{}.backup.{}", name, Utc::now().timestamp());
        fs::copy(source, self.snapshot_path(&backup_name))?;
        Ok(())
    }
}

/// Sort object keys so that snapshots compare independent of key order
pub fn normalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), normalize_json(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(normalize_json).collect()),
        _ => value.clone(),
    }
}

/// Remove each dotted path from a value; arrays apply the rest of the path to every element
pub fn apply_ignores(value: &mut Value, ignore_fields: &[String]) {
    for field_path in ignore_fields {
        let parts: Vec<&str> = field_path.split('.').filter(|s| !s.is_empty()).collect();
        remove_field(value, &parts);
    }
}

fn remove_field(value: &mut Value, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    match value {
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*first);
            } else if let Some(next) = map.get_mut(*first) {
                remove_field(next, rest);
            }
        }
        Value::Array(arr) => {
            for item in arr {
                remove_field(item, path);
            }
        }
        _ => {}
    }
}
