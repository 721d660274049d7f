//! Compiler facade
//!
//! A [`Compiler`] owns the keyword rules, the format registry and every
//! schema document it has seen. Schemas are registered under a key (or
//! their `$id`) so that `$ref`s between documents resolve, and compiled
//! into [`Validator`]s on demand.
//!
//! ```
//! use schemac_core::{Compiler, Options};
//! use serde_json::json;
//!
//! let mut compiler = Compiler::new(Options::default()).unwrap();
//! let mut validator = compiler.compile(&json!({"type": "integer", "minimum": 1})).unwrap();
//! assert!(validator.validate(&mut json!(3)));
//! assert!(!validator.validate(&mut json!(0)));
//! ```
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use crate::compile::resolve::{normalize_id, resolve_url, split_fragment, Resolved};
use crate::compile::rules::Rules;
use crate::compile::{compile_env, CompileState, CompilerConfig, EnvId};
use crate::formats::{Format, FormatRegistry};
use crate::options::{InlineRefs, Options};
use crate::runtime::ExecutionContext;
use crate::validator::{errors_text, function_source, CompiledSchema, ErrorObject, Validator};
use crate::vocabularies::{dialect_vocabularies, KeywordDefinition, Vocabulary};
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Schema registry and validator factory
pub struct Compiler {
    config: CompilerConfig,
    state: CompileState,
    /// Errors of the last [`Compiler::validate`] call
    pub errors: Option<Vec<ErrorObject>>,
}

impl Compiler {
    /// Compiler with the keywords of `opts.dialect` and the default formats
    pub fn new(opts: Options) -> Result<Self> {
        let rules = Rules::with_vocabularies(dialect_vocabularies(opts.dialect))?;
        Ok(Self {
            config: CompilerConfig {
                opts,
                rules,
                formats: FormatRegistry::with_defaults(),
            },
            state: CompileState::new(),
            errors: None,
        })
    }

    pub fn options(&self) -> &Options {
        &self.config.opts
    }

    /// Register a schema without compiling it
    ///
    /// The schema is stored under `key`, or its `$id` when no key is given.
    /// Registering a second schema under a taken key is an error.
    pub fn add_schema(&mut self, schema: Value, key: Option<&str>) -> Result<&mut Self> {
        self.register(schema, key, false)?;
        Ok(self)
    }

    /// Register a meta-schema: strict type checks do not apply to it
    pub fn add_meta_schema(&mut self, schema: Value, key: Option<&str>) -> Result<&mut Self> {
        self.register(schema, key, true)?;
        Ok(self)
    }

    fn register(&mut self, schema: Value, key: Option<&str>, meta: bool) -> Result<EnvId> {
        let id = schema_id(&schema);
        let key = key.map(normalize_id).or_else(|| id.clone()).unwrap_or_default();
        let base_id = id.unwrap_or_else(|| key.clone());
        let register_base = !base_id.is_empty() && !base_id.starts_with('#') && base_id != key;
        if !key.is_empty() {
            self.check_unique(&key)?;
        }
        if register_base {
            self.check_unique(&base_id)?;
        }
        let root = self.state.add_root(Arc::new(schema), &base_id, meta)?;
        if !key.is_empty() {
            self.state.schemas.insert(key.clone(), root);
        }
        if register_base {
            self.state.schemas.insert(base_id.clone(), root);
        }
        tracing::debug!(key = %key, base_id = %base_id, meta, "added schema");
        Ok(root)
    }

    fn check_unique(&self, key: &str) -> Result<()> {
        if self.state.schemas.contains_key(key) || self.state.refs.contains_key(key) {
            return Err(Error::schema(format!("schema with key or id \"{}\" already exists", key)));
        }
        Ok(())
    }

    /// Document of a schema passed to `compile`, registered under its `$id`
    /// when `add_used_schema` is on
    fn add_used(&mut self, schema: &Value) -> Result<EnvId> {
        let base_id = schema_id(schema).unwrap_or_default();
        let root = self.state.add_root(Arc::new(schema.clone()), &base_id, false)?;
        if self.config.opts.add_used_schema && !base_id.is_empty() && !base_id.starts_with('#') {
            match self.state.schemas.get(&base_id) {
                Some(existing) if *existing == root => {}
                Some(_) => {
                    return Err(Error::schema(format!("schema with key or id \"{}\" already exists", base_id)));
                }
                None => {
                    self.state.schemas.insert(base_id, root);
                }
            }
        }
        Ok(root)
    }

    /// Compile a schema into a validator
    ///
    /// Compiling the same schema again returns a handle to the same program.
    pub fn compile(&mut self, schema: &Value) -> Result<Validator> {
        let root = self.add_used(schema)?;
        self.validator_for(root)
    }

    /// Compile a schema, fetching documents of unresolved references with `load`
    ///
    /// Each missing document is loaded once, registered under its URI and
    /// compilation is retried.
    pub async fn compile_async<F, Fut>(&mut self, schema: &Value, mut load: F) -> Result<Validator>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let root = self.add_used(schema)?;
        loop {
            match self.validator_for(root) {
                Err(Error::MissingRef {
                    missing_ref,
                    missing_schema,
                    ..
                }) => {
                    if self.is_loaded(root, &missing_schema) {
                        return Err(Error::schema(format!(
                            "schema {} is loaded but {} cannot be resolved",
                            missing_schema, missing_ref
                        )));
                    }
                    tracing::debug!(uri = %missing_schema, "loading missing schema");
                    let loaded = load(missing_schema.clone()).await?;
                    if !self.is_loaded(root, &missing_schema) {
                        self.register(loaded, Some(&missing_schema), false)?;
                    }
                }
                other => return other,
            }
        }
    }

    fn is_loaded(&self, root: EnvId, uri: &str) -> bool {
        self.state.schemas.contains_key(uri) || self.state.refs.contains_key(uri) || self.state.env(root).base_id == uri
    }

    fn validator_for(&mut self, id: EnvId) -> Result<Validator> {
        let entry = compile_env(&mut self.state, &self.config, id)?;
        let program = self.state.program();
        let opts = &self.config.opts;
        let source = if opts.code_source {
            Some(function_source(program.function(entry)?, opts.code_pretty))
        } else {
            None
        };
        let env = self.state.env(id);
        Ok(Validator::new(CompiledSchema {
            entry,
            is_async: env.is_async,
            schema: env.schema.clone(),
            env_key: env.key.clone(),
            source,
            evaluated: env.evaluated.clone().unwrap_or_default(),
            logger: opts.logger.clone(),
            context: ExecutionContext { max_depth: opts.max_depth },
            program,
        }))
    }

    /// Validator of a registered schema, or of a subschema addressed by
    /// `key#fragment`, compiled on first use
    pub fn get_schema(&mut self, key: &str) -> Result<Option<Validator>> {
        let key = normalize_id(key);
        if let Some(root) = self.state.schemas.get(&key).copied() {
            return self.validator_for(root).map(Some);
        }
        let (doc, _) = split_fragment(&key);
        let root = match self.state.refs.get(doc) {
            Some((root, _)) => *root,
            None => match self.state.schemas.get(doc) {
                Some(root) => *root,
                None => return Ok(None),
            },
        };
        let base_id = self.state.env(root).base_id.clone();
        let id = match self.state.resolve_ref(root, &base_id, &key, InlineRefs::Never)? {
            Some(Resolved::Env(id)) => id,
            Some(Resolved::Inline { schema, base_id }) => self.state.add_root(schema, &base_id, false)?,
            None => return Ok(None),
        };
        self.validator_for(id).map(Some)
    }

    /// Forget a registered schema and the resources it declared
    pub fn remove_schema(&mut self, key: &str) -> &mut Self {
        if let Some(root) = self.state.schemas.get(&normalize_id(key)).copied() {
            self.state.remove_root(root);
        }
        self
    }

    /// Validate `data` against a registered schema, storing failures in `errors`
    pub fn validate(&mut self, key: &str, data: &mut Value) -> Result<bool> {
        let Some(mut validator) = self.get_schema(key)? else {
            return Err(Error::schema(format!("no schema with key or ref \"{}\"", key)));
        };
        let valid = validator.validate(data);
        self.errors = validator.errors.take();
        Ok(valid)
    }

    /// Errors joined as `data/path message, ...`
    pub fn errors_text(&self, errors: &[ErrorObject]) -> String {
        errors_text(errors, ", ", "data")
    }

    /// Add or replace a format. Affects schemas compiled afterwards.
    pub fn add_format(&mut self, name: impl Into<String>, format: Format) -> &mut Self {
        self.config.formats.add(name, format);
        self
    }

    pub fn add_keyword(&mut self, def: KeywordDefinition) -> Result<&mut Self> {
        self.config.rules.add(def)?;
        Ok(self)
    }

    pub fn remove_keyword(&mut self, keyword: &str) -> &mut Self {
        self.config.rules.remove(keyword);
        self
    }

    pub fn get_keyword(&self, keyword: &str) -> Option<&KeywordDefinition> {
        self.config.rules.get(keyword).map(|def| def.as_ref())
    }

    pub fn add_vocabulary(&mut self, vocabulary: Vocabulary) -> Result<&mut Self> {
        self.config.rules.add_vocabulary(vocabulary)?;
        Ok(self)
    }
}

/// Normalized absolute `$id` of a schema document
fn schema_id(schema: &Value) -> Option<String> {
    match schema.get("$id") {
        Some(Value::String(id)) => Some(resolve_url("", id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiler() -> Compiler {
        Compiler::new(Options::default()).unwrap()
    }

    #[test]
    fn test_compile_same_schema_shares_program() {
        let mut compiler = compiler();
        let schema = json!({"type": "string"});
        let a = compiler.compile(&schema).unwrap();
        let b = compiler.compile(&schema).unwrap();
        assert_eq!(a.schema_env(), b.schema_env());
    }

    #[test]
    fn test_add_schema_then_validate_by_key() {
        let mut compiler = compiler();
        compiler.add_schema(json!({"type": "integer"}), Some("int")).unwrap();
        assert!(compiler.validate("int", &mut json!(1)).unwrap());
        assert!(!compiler.validate("int", &mut json!("a")).unwrap());
        let errors = compiler.errors.clone().unwrap();
        assert_eq!(errors[0].keyword, "type");
        assert_eq!(compiler.errors_text(&errors), "data must be integer");
    }

    #[test]
    fn test_validate_unknown_key_fails() {
        let mut compiler = compiler();
        assert!(compiler.validate("nope", &mut json!(1)).is_err());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut compiler = compiler();
        compiler.add_schema(json!({"type": "integer"}), Some("a")).unwrap();
        let err = compiler.add_schema(json!({"type": "string"}), Some("a")).err().unwrap();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_remove_schema_forgets_key() {
        let mut compiler = compiler();
        compiler.add_schema(json!({"type": "integer"}), Some("a")).unwrap();
        compiler.remove_schema("a");
        assert!(compiler.get_schema("a").unwrap().is_none());
        compiler.add_schema(json!({"type": "string"}), Some("a")).unwrap();
    }

    #[test]
    fn test_get_schema_by_fragment() {
        let mut compiler = compiler();
        compiler
            .add_schema(
                json!({
                    "$id": "http://example.com/root.json",
                    "$defs": {"pos": {"type": "integer", "minimum": 1}}
                }),
                None,
            )
            .unwrap();
        let mut pos = compiler.get_schema("http://example.com/root.json#/$defs/pos").unwrap().unwrap();
        assert!(pos.validate(&mut json!(2)));
        assert!(!pos.validate(&mut json!(0)));
    }

    #[test]
    fn test_ref_between_registered_documents() {
        let mut compiler = compiler();
        compiler
            .add_schema(json!({"$id": "http://example.com/str.json", "type": "string"}), None)
            .unwrap();
        let mut v = compiler
            .compile(&json!({"properties": {"name": {"$ref": "http://example.com/str.json"}}}))
            .unwrap();
        assert!(v.validate(&mut json!({"name": "x"})));
        assert!(!v.validate(&mut json!({"name": 1})));
    }

    #[test]
    fn test_missing_ref_reports_schema() {
        let mut compiler = compiler();
        let err = compiler
            .compile(&json!({"$ref": "http://example.com/missing.json#/foo"}))
            .err()
            .unwrap();
        assert_eq!(err.missing_schema(), Some("http://example.com/missing.json"));
    }

    #[test]
    fn test_code_source_kept_when_enabled() {
        let mut with_source = Compiler::new(Options::default().with_code_source(false)).unwrap();
        let v = with_source.compile(&json!({"minimum": 3})).unwrap();
        assert!(v.source().unwrap().contains("function"));
        let mut plain = compiler();
        assert!(plain.compile(&json!({"minimum": 3})).unwrap().source().is_none());
    }

    #[test]
    fn test_custom_validate_keyword() {
        let mut compiler = compiler();
        compiler
            .add_keyword(KeywordDefinition::new("even").validate(|schema, data, _parent| {
                schema != &Value::Bool(true) || data.as_i64().is_some_and(|n| n % 2 == 0)
            }))
            .unwrap();
        assert!(compiler.get_keyword("even").is_some());
        let mut v = compiler.compile(&json!({"even": true})).unwrap();
        assert!(v.validate(&mut json!(4)));
        assert!(!v.validate(&mut json!(5)));
        compiler.remove_keyword("even");
        assert!(compiler.get_keyword("even").is_none());
    }

    #[test]
    fn test_add_format_used_by_later_compiles() {
        let mut compiler = compiler();
        compiler.add_format("even-length", Format::string(|s| s.len() % 2 == 0));
        let mut v = compiler.compile(&json!({"type": "string", "format": "even-length"})).unwrap();
        assert!(v.validate(&mut json!("ab")));
        assert!(!v.validate(&mut json!("abc")));
    }
}
