//! Name allocation and captured runtime values
//!
//! `Scope` hands out fresh identifiers per prefix. `ValueScope` registers
//! values the generated code closes over (compiled schema functions,
//! regular expressions, formats, custom keyword functions), deduplicated by
//! key within a prefix bucket.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::code::{ExtRef, Expr, Name};
use super::node::{Node, VarKind};
use crate::formats::Format;
use crate::runtime::FnId;
use crate::vocabularies::KeywordValidateFn;
use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Unique-name allocator
#[derive(Debug, Clone, Default)]
pub struct Scope {
    counters: HashMap<String, usize>,
    /// Prefixes owned by an enclosing value scope
    reserved: Arc<HashSet<String>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope that refuses prefixes owned by the given value scope
    pub fn with_parent(parent: &ValueScope) -> Self {
        Self {
            counters: HashMap::new(),
            reserved: Arc::new(parent.prefixes()),
        }
    }

    /// Fresh name `<prefix><n>`
    pub fn name(&mut self, prefix: &str) -> Result<Name> {
        if self.reserved.contains(prefix) {
            return Err(Error::internal(format!(
                "CodeGen: prefix \"{}\" is not allowed to be used",
                prefix
            )));
        }
        Ok(self.next_name(prefix))
    }

    fn next_name(&mut self, prefix: &str) -> Name {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = Name::new(format!("{}{}", prefix, counter));
        *counter += 1;
        name
    }
}

/// A value captured by generated code
#[derive(Clone)]
pub enum ScopeValue {
    /// Compiled schema function
    Validate(FnId),
    Regex(Arc<Regex>),
    Format(Arc<Format>),
    Json(Arc<Value>),
    /// Runtime function of a custom keyword
    Keyword(KeywordValidateFn),
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeValue::Validate(id) => write!(f, "Validate({})", id.0),
            ScopeValue::Regex(re) => write!(f, "Regex({})", re.as_str()),
            ScopeValue::Format(_) => f.write_str("Format"),
            ScopeValue::Json(v) => write!(f, "Json({})", v),
            ScopeValue::Keyword(_) => f.write_str("Keyword"),
        }
    }
}

/// Registration request for `ValueScope::value`
#[derive(Debug, Clone)]
pub struct ValueSpec {
    /// The runtime value
    pub value: ScopeValue,
    /// Deduplication key; equal keys within a prefix return the same name
    pub key: String,
    /// Source snippet that reconstructs the value in standalone code
    pub code: Option<String>,
}

/// A registered value binding
#[derive(Debug, Clone)]
pub struct ValueScopeName {
    pub name: Name,
    pub ext: ExtRef,
    code: Option<String>,
}

/// Compiler-wide registry of captured values
#[derive(Debug, Default)]
pub struct ValueScope {
    names: Scope,
    by_key: HashMap<String, HashMap<String, ValueScopeName>>,
    values: BTreeMap<String, Vec<ScopeValue>>,
    order: Vec<ValueScopeName>,
}

impl ValueScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes that have at least one registered value
    pub fn prefixes(&self) -> HashSet<String> {
        self.values.keys().cloned().collect()
    }

    /// Register a value, or return the binding already registered for its key
    pub fn value(&mut self, prefix: &str, spec: ValueSpec) -> ValueScopeName {
        if let Some(existing) = self.get_value(prefix, &spec.key) {
            return existing.clone();
        }
        let name = self.names.next_name(prefix);
        let bucket = self.values.entry(prefix.to_string()).or_default();
        let ext = ExtRef {
            prefix: Arc::from(prefix),
            index: bucket.len(),
        };
        bucket.push(spec.value);
        let entry = ValueScopeName {
            name,
            ext,
            code: spec.code,
        };
        self.by_key
            .entry(prefix.to_string())
            .or_default()
            .insert(spec.key, entry.clone());
        self.order.push(entry.clone());
        entry
    }

    /// Binding registered for a key, if any
    pub fn get_value(&self, prefix: &str, key: &str) -> Option<&ValueScopeName> {
        self.by_key.get(prefix).and_then(|m| m.get(key))
    }

    /// Replace a registered value in place (used to fill a reserved function slot)
    pub fn set_value(&mut self, ext: &ExtRef, value: ScopeValue) -> Result<()> {
        let slot = self
            .values
            .get_mut(ext.prefix.as_ref())
            .and_then(|bucket| bucket.get_mut(ext.index))
            .ok_or_else(|| Error::internal(format!("CodeGen: no value at {}", ext)))?;
        *slot = value;
        Ok(())
    }

    /// Prologue binding the given values from the runtime scope
    pub fn scope_refs(&self, used: &BTreeMap<Name, ExtRef>) -> Vec<Node> {
        used.iter()
            .map(|(name, ext)| Node::Def {
                kind: VarKind::Const,
                name: name.clone(),
                rhs: Some(Expr::Ext(ext.clone())),
                constant: false,
            })
            .collect()
    }

    /// Standalone source reconstructing the given values (all when `None`)
    pub fn scope_code(&self, used: Option<&BTreeMap<Name, ExtRef>>) -> Result<String> {
        let mut out = String::new();
        for entry in &self.order {
            if let Some(used) = used {
                if !used.contains_key(&entry.name) {
                    continue;
                }
            }
            let code = entry.code.as_ref().ok_or_else(|| {
                Error::internal(format!("CodeGen: name \"{}\" has no value", entry.name))
            })?;
            out.push_str(&format!("const {} = {};\n", entry.name, code));
        }
        Ok(out)
    }

    /// Immutable runtime table of all values registered so far
    pub fn snapshot(&self) -> ValueTable {
        ValueTable {
            values: self
                .values
                .iter()
                .map(|(k, v)| (Arc::from(k.as_str()), v.clone()))
                .collect(),
        }
    }
}

/// Runtime lookup table for captured values
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    values: HashMap<Arc<str>, Vec<ScopeValue>>,
}

impl ValueTable {
    pub fn get(&self, ext: &ExtRef) -> Option<&ScopeValue> {
        self.values.get(&ext.prefix).and_then(|bucket| bucket.get(ext.index))
    }
}
