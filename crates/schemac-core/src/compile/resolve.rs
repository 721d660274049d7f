//! URI normalization, schema indexing and reference resolution
//!
//! Every schema document is indexed once when it is registered: nested
//! `$id`s start new resources with their own base URI, and `$anchor` /
//! `$dynamicAnchor` names are recorded against the nearest base. Opaque
//! keywords (`enum`, `const`, `default`, `examples` ...) are never walked.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::util::{pointer_segments, unescape_json_pointer};
use super::{CompileState, EnvId, SchemaEnv};
use crate::options::InlineRefs;
use crate::runtime::equal::equal;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Base used to resolve relative ids of schemas without an absolute `$id`
const DEFAULT_BASE: &str = "json-schema:///";

/// Keywords whose value is a schema
const SCHEMA_KEYWORDS: &[&str] = &[
    "additionalItems",
    "additionalProperties",
    "contains",
    "else",
    "if",
    "items",
    "not",
    "propertyNames",
    "then",
    "unevaluatedItems",
    "unevaluatedProperties",
];

/// Keywords whose value is an array of schemas
const SCHEMA_ARRAY_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems", "items"];

/// Keywords whose value maps names to schemas
const SCHEMA_MAP_KEYWORDS: &[&str] = &[
    "$defs",
    "definitions",
    "properties",
    "patternProperties",
    "dependentSchemas",
    "dependencies",
];

/// Pointer segments after which an `$id` member is data, not an id
const PREVENT_SCOPE_CHANGE: &[&str] = &[
    "properties",
    "patternProperties",
    "enum",
    "const",
    "default",
    "examples",
    "dependencies",
    "definitions",
    "$defs",
    "dependentSchemas",
];

/// Keywords that make a schema unsuitable for inlining
const REF_KEYWORDS: &[&str] = &["$ref", "$dynamicRef", "$dynamicAnchor", "$id"];

/// Keywords counted as one regardless of their value
const SIMPLE_INLINED: &[&str] = &[
    "type",
    "format",
    "pattern",
    "maxLength",
    "minLength",
    "maxProperties",
    "minProperties",
    "maxItems",
    "minItems",
    "maximum",
    "minimum",
    "uniqueItems",
    "multipleOf",
    "required",
    "enum",
    "const",
];

/// Drop an empty trailing fragment
pub fn normalize_id(id: &str) -> String {
    id.strip_suffix('#').unwrap_or(id).to_string()
}

/// Resolve `id` against `base`
pub fn resolve_url(base: &str, id: &str) -> String {
    let default = match Url::parse(DEFAULT_BASE) {
        Ok(url) => url,
        Err(_) => return normalize_id(id),
    };
    let base_url = if base.is_empty() {
        Ok(default.clone())
    } else {
        Url::parse(base).or_else(|_| default.join(base))
    };
    match base_url.and_then(|b| b.join(id)) {
        Ok(url) => {
            let s = url.as_str();
            normalize_id(s.strip_prefix(DEFAULT_BASE).unwrap_or(s))
        }
        Err(_) => normalize_id(id),
    }
}

/// Split a URI into document and fragment (without `#`)
pub fn split_fragment(uri: &str) -> (&str, &str) {
    match uri.split_once('#') {
        Some((doc, fragment)) => (doc, fragment),
        None => (uri, ""),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

/// Location of an indexed subschema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// JSON pointer from the document root
    pub pointer: String,
    /// Base URI in effect at that subschema
    pub base_id: String,
}

/// Ids and anchors of one schema document
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    /// Nested resources by absolute URI (no fragment)
    pub resources: HashMap<String, IndexEntry>,
    /// Anchors by `base#name`
    pub anchors: HashMap<String, IndexEntry>,
    /// Dynamic anchors of each resource: base URI -> (name, pointer)
    pub dynamic_anchors: HashMap<String, Vec<(String, String)>>,
}

impl SchemaIndex {
    /// Index a document whose root has base URI `base_id`
    pub fn build(schema: &Value, base_id: &str) -> Result<Self> {
        let mut index = SchemaIndex::default();
        index.walk(schema, schema, String::new(), base_id.to_string(), true)?;
        Ok(index)
    }

    fn walk(&mut self, root: &Value, schema: &Value, pointer: String, base: String, is_root: bool) -> Result<()> {
        let Value::Object(map) = schema else {
            return Ok(());
        };
        let mut base = base;
        if let Some(Value::String(id)) = map.get("$id") {
            let resolved = resolve_url(&base, id);
            if let Some(anchor) = id.strip_prefix('#').filter(|a| !a.is_empty() && !a.starts_with('/')) {
                // draft-07 plain-name fragment id
                self.add_anchor(root, schema, &base, anchor, &pointer)?;
            } else if !is_root {
                self.add_resource(root, schema, &resolved, &pointer)?;
                base = resolved;
            } else {
                base = resolved;
            }
        }
        if let Some(Value::String(anchor)) = map.get("$anchor") {
            check_anchor(anchor)?;
            self.add_anchor(root, schema, &base, anchor, &pointer)?;
        }
        if let Some(Value::String(anchor)) = map.get("$dynamicAnchor") {
            check_anchor(anchor)?;
            self.add_anchor(root, schema, &base, anchor, &pointer)?;
            self.dynamic_anchors
                .entry(base.clone())
                .or_default()
                .push((anchor.clone(), pointer.clone()));
        }

        for (key, value) in map {
            let child_pointer = format!("{}/{}", pointer, escape(key));
            let k = key.as_str();
            if SCHEMA_KEYWORDS.contains(&k) && (value.is_object() || value.is_boolean()) {
                self.walk(root, value, child_pointer.clone(), base.clone(), false)?;
            }
            if SCHEMA_ARRAY_KEYWORDS.contains(&k) {
                if let Value::Array(items) = value {
                    for (i, item) in items.iter().enumerate() {
                        self.walk(root, item, format!("{}/{}", child_pointer, i), base.clone(), false)?;
                    }
                }
            }
            if SCHEMA_MAP_KEYWORDS.contains(&k) {
                if let Value::Object(members) = value {
                    for (name, member) in members {
                        let member_pointer = format!("{}/{}", child_pointer, escape(name));
                        self.walk(root, member, member_pointer, base.clone(), false)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_resource(&mut self, root: &Value, schema: &Value, uri: &str, pointer: &str) -> Result<()> {
        let entry = IndexEntry {
            pointer: pointer.to_string(),
            base_id: uri.to_string(),
        };
        check_collision(root, schema, self.resources.get(uri), uri)?;
        self.resources.insert(uri.to_string(), entry);
        Ok(())
    }

    fn add_anchor(&mut self, root: &Value, schema: &Value, base: &str, anchor: &str, pointer: &str) -> Result<()> {
        let key = format!("{}#{}", base, anchor);
        check_collision(root, schema, self.anchors.get(&key), &key)?;
        self.anchors.insert(
            key,
            IndexEntry {
                pointer: pointer.to_string(),
                base_id: base.to_string(),
            },
        );
        Ok(())
    }
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn check_anchor(anchor: &str) -> Result<()> {
    let mut chars = anchor.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'));
    if valid {
        Ok(())
    } else {
        Err(Error::schema(format!("invalid anchor \"{}\"", anchor)))
    }
}

/// A second registration of `uri` must point at an equal subtree
fn check_collision(root: &Value, schema: &Value, existing: Option<&IndexEntry>, uri: &str) -> Result<()> {
    if let Some(existing) = existing {
        let same = root.pointer(&existing.pointer).is_some_and(|other| equal(other, schema));
        if !same {
            return Err(Error::AmbiguousRef { uri: uri.to_string() });
        }
    }
    Ok(())
}

/// Walk a fragment pointer from `schema`, tracking `$id` base changes.
/// Returns the pointer segments appended and the base at the target.
pub fn walk_pointer(schema: &Value, fragment: &str, base_id: &str) -> Option<(String, String)> {
    let mut current = schema;
    let mut base = base_id.to_string();
    let mut pointer = String::new();
    for part in pointer_segments(&percent_decode(fragment)) {
        if current.is_boolean() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(&part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
        pointer.push('/');
        pointer.push_str(&escape(&part));
        if !PREVENT_SCOPE_CHANGE.contains(&part.as_str()) {
            if let Some(Value::String(id)) = current.get("$id") {
                if !id.starts_with('#') {
                    base = resolve_url(&base, id);
                }
            }
        }
    }
    Some((pointer, base))
}

fn has_ref(schema: &Value) -> bool {
    match schema {
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| REF_KEYWORDS.contains(&key.as_str()) || has_ref(value)),
        Value::Array(items) => items.iter().any(has_ref),
        _ => false,
    }
}

/// Structural keyword count; `None` when the schema holds a reference
fn count_keys(schema: &Value) -> Option<usize> {
    let Value::Object(map) = schema else {
        return Some(0);
    };
    let mut count = 0usize;
    for (key, value) in map {
        if REF_KEYWORDS.contains(&key.as_str()) {
            return None;
        }
        count += 1;
        if SIMPLE_INLINED.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Object(_) => count += count_keys(value)?,
            Value::Array(items) => {
                for item in items {
                    count += count_keys(item)?;
                }
            }
            _ => {}
        }
    }
    Some(count)
}

/// Whether a referenced schema is copied into the caller
pub fn inline_ref(schema: &Value, limit: InlineRefs) -> bool {
    if schema.is_boolean() {
        return true;
    }
    match limit {
        InlineRefs::Never => false,
        InlineRefs::Always => !has_ref(schema),
        InlineRefs::Limit(limit) => count_keys(schema).is_some_and(|count| count < limit),
    }
}

/// Outcome of resolving a reference
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Compile the schema in place
    Inline { schema: Arc<Value>, base_id: String },
    /// Call the environment's function
    Env(EnvId),
}

/// A subschema located by URI
#[derive(Debug, Clone)]
struct Target {
    root: EnvId,
    pointer: String,
    base_id: String,
}

impl CompileState {
    /// Resolve `reference` against `base_id` from within the document `root`
    pub fn resolve_ref(&mut self, root: EnvId, base_id: &str, reference: &str, inline: InlineRefs) -> Result<Option<Resolved>> {
        let uri = resolve_url(base_id, reference);
        if let Some(resolved) = self.env(root).ref_cache.get(&uri) {
            return Ok(Some(resolved.clone()));
        }
        let Some(target) = self.resolve_schema(root, &uri) else {
            return Ok(None);
        };
        let doc = self.env(target.root).schema.clone();
        let Some(schema) = doc.pointer(&target.pointer) else {
            return Ok(None);
        };
        let resolved = if inline_ref(schema, inline) {
            tracing::debug!(reference = %uri, "inlining referenced schema");
            Resolved::Inline {
                schema: Arc::new(schema.clone()),
                base_id: target.base_id,
            }
        } else {
            let schema = if target.pointer.is_empty() {
                doc.clone()
            } else {
                Arc::new(schema.clone())
            };
            Resolved::Env(self.env_for(target.root, &target.pointer, &target.base_id, schema))
        };
        self.env_mut(root).ref_cache.insert(uri, resolved.clone());
        Ok(Some(resolved))
    }

    fn resolve_schema(&self, root: EnvId, uri: &str) -> Option<Target> {
        let (doc, fragment) = split_fragment(uri);
        let root_env = self.env(root);
        if doc == root_env.base_id {
            return self.target_in(root, "", &root_env.base_id, fragment);
        }
        // Nested resource of the current document
        if let Some(entry) = root_env.index.as_ref().and_then(|index| index.resources.get(doc)) {
            return self.target_in(root, &entry.pointer, &entry.base_id, fragment);
        }
        if let Some((other, pointer)) = self.refs.get(doc) {
            return self.target_in(*other, pointer, doc, fragment);
        }
        let other = *self.schemas.get(doc)?;
        let base = self.env(other).base_id.clone();
        self.target_in(other, "", &base, fragment)
    }

    fn target_in(&self, root: EnvId, pointer: &str, base_id: &str, fragment: &str) -> Option<Target> {
        let env = self.env(root);
        if fragment.is_empty() {
            return Some(Target {
                root,
                pointer: pointer.to_string(),
                base_id: base_id.to_string(),
            });
        }
        if fragment.starts_with('/') {
            let start = env.schema.pointer(pointer)?;
            let (rest, base) = walk_pointer(start, fragment, base_id)?;
            return Some(Target {
                root,
                pointer: format!("{}{}", pointer, rest),
                base_id: base,
            });
        }
        let key = format!("{}#{}", base_id, percent_decode(fragment));
        let entry = env.index.as_ref()?.anchors.get(&key)?;
        Some(Target {
            root,
            pointer: entry.pointer.clone(),
            base_id: entry.base_id.clone(),
        })
    }

    /// Dynamic anchors declared by the resource an environment starts, if it starts one
    pub fn resource_dynamic_anchors(&self, env: EnvId) -> Vec<(String, String)> {
        let e = self.env(env);
        let starts_resource = e.pointer.is_empty() || e.schema.get("$id").and_then(Value::as_str).is_some_and(|id| !id.starts_with('#'));
        if !starts_resource {
            return Vec::new();
        }
        self.env(e.root)
            .index
            .as_ref()
            .and_then(|index| index.dynamic_anchors.get(&e.base_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Register a document's resources in the compiler-wide reference map
    pub(crate) fn register_refs(&mut self, root: EnvId) -> Result<()> {
        let Some(index) = self.env(root).index.clone() else {
            return Ok(());
        };
        let doc = self.env(root).schema.clone();
        for (uri, entry) in &index.resources {
            if let Some((other, pointer)) = self.refs.get(uri) {
                let existing = self.env(*other).schema.pointer(pointer);
                let same = *other == root && *pointer == entry.pointer
                    || existing.zip(doc.pointer(&entry.pointer)).is_some_and(|(a, b)| equal(a, b));
                if !same {
                    return Err(Error::AmbiguousRef { uri: uri.clone() });
                }
            }
            self.refs.insert(uri.clone(), (root, entry.pointer.clone()));
        }
        Ok(())
    }
}

/// Pointer part of a `#`-prefixed schema path
pub fn schema_path_pointer(path: &str) -> String {
    unescape_json_pointer(path.trim_start_matches('#'))
}

impl SchemaEnv {
    /// Whether this environment is the document root
    pub fn is_root(&self) -> bool {
        self.pointer.is_empty()
    }
}
