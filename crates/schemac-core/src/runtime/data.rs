//! References into the validated instance
//!
//! Data variables in generated code hold a path from the instance root
//! rather than a copy, so coercion, defaults and property removal write
//! through to the caller's value.

use serde_json::Value;
use std::fmt;

/// One step of a data path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSeg::Key(k) => write!(f, "{}", k),
            PathSeg::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Path from the instance root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DataPath(Vec<PathSeg>);

impl DataPath {
    pub fn root() -> Self {
        DataPath(Vec::new())
    }

    pub fn child(&self, seg: PathSeg) -> Self {
        let mut segs = Vec::with_capacity(self.0.len() + 1);
        segs.extend_from_slice(&self.0);
        segs.push(seg);
        DataPath(segs)
    }

    pub fn segments(&self) -> &[PathSeg] {
        &self.0
    }

    /// Split into parent path and last segment
    pub fn split_last(&self) -> Option<(DataPath, &PathSeg)> {
        self.0
            .split_last()
            .map(|(last, parent)| (DataPath(parent.to_vec()), last))
    }
}

fn step<'v>(value: &'v Value, seg: &PathSeg) -> Option<&'v Value> {
    match (value, seg) {
        (Value::Object(map), PathSeg::Key(k)) => map.get(k),
        (Value::Object(map), PathSeg::Index(i)) => map.get(&i.to_string()),
        (Value::Array(items), PathSeg::Index(i)) => items.get(*i),
        (Value::Array(items), PathSeg::Key(k)) => k.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'v>(value: &'v mut Value, seg: &PathSeg) -> Option<&'v mut Value> {
    match (value, seg) {
        (Value::Object(map), PathSeg::Key(k)) => map.get_mut(k),
        (Value::Object(map), PathSeg::Index(i)) => map.get_mut(&i.to_string()),
        (Value::Array(items), PathSeg::Index(i)) => items.get_mut(*i),
        (Value::Array(items), PathSeg::Key(k)) => {
            k.parse::<usize>().ok().and_then(move |i| items.get_mut(i))
        }
        _ => None,
    }
}

/// Value at a path, `None` when any step is missing
pub fn get<'v>(root: &'v Value, path: &DataPath) -> Option<&'v Value> {
    path.0.iter().try_fold(root, step)
}

/// Write a value at a path; the parent must exist. Returns false when it does not.
pub fn set(root: &mut Value, path: &DataPath, value: Value) -> bool {
    let Some((parent_path, last)) = path.split_last() else {
        *root = value;
        return true;
    };
    let Some(parent) = parent_path.0.iter().try_fold(root, step_mut) else {
        return false;
    };
    match (parent, last) {
        (Value::Object(map), PathSeg::Key(k)) => {
            map.insert(k.clone(), value);
            true
        }
        (Value::Object(map), PathSeg::Index(i)) => {
            map.insert(i.to_string(), value);
            true
        }
        (Value::Array(items), seg) => {
            let index = match seg {
                PathSeg::Index(i) => *i,
                PathSeg::Key(k) => match k.parse::<usize>() {
                    Ok(i) => i,
                    Err(_) => return false,
                },
            };
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
            true
        }
        _ => false,
    }
}

/// Remove the property at a path. Returns whether something was removed.
pub fn delete(root: &mut Value, path: &DataPath) -> bool {
    let Some((parent_path, last)) = path.split_last() else {
        return false;
    };
    match parent_path.0.iter().try_fold(root, step_mut) {
        Some(Value::Object(map)) => map.shift_remove(&last.to_string()).is_some(),
        _ => false,
    }
}
