//! Schema compilation
//!
//! Each schema environment (a document root, or a subschema reached through
//! a non-inlined `$ref`) compiles to one function of the validator program.
//! Environments live in an arena owned by [`CompileState`] and refer to one
//! another by [`EnvId`]; references between compiled functions go through
//! the value scope, so a function can call itself or a function still being
//! built.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

pub mod context;
pub mod data_type;
pub mod defaults;
pub mod errors;
pub mod evaluated;
pub mod names;
pub mod resolve;
pub mod rules;
pub mod util;
pub mod validate;

use crate::codegen::{count_nodes, CodeGen, Optimizer, Scope, ScopeValue, ValueScope, ValueScopeName, ValueSpec};
use crate::formats::FormatRegistry;
use crate::options::Options;
use crate::runtime::{FnDef, FnId, Program};
use crate::{Error, Result};
use context::SchemaCxt;
use evaluated::EvaluatedInfo;
use resolve::{Resolved, SchemaIndex};
use rules::Rules;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Everything that stays fixed while schemas compile
#[derive(Clone)]
pub struct CompilerConfig {
    pub opts: Options,
    pub rules: Rules,
    pub formats: FormatRegistry,
}

/// Code generator of one function plus the shared compile state
pub struct Builder<'c> {
    pub gen: CodeGen,
    pub state: &'c mut CompileState,
    pub cfg: &'c CompilerConfig,
}

/// Index of a schema environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub usize);

/// A schema compiled, or to be compiled, as one function
#[derive(Debug)]
pub struct SchemaEnv {
    pub schema: Arc<Value>,
    /// Environment of the enclosing document
    pub root: EnvId,
    pub base_id: String,
    /// Pointer from the document root
    pub pointer: String,
    /// Schema path prefix of errors raised by this function
    pub schema_path: String,
    pub is_async: bool,
    /// Identity of (schema, root, base id)
    pub key: String,
    /// Reserved function slot
    pub fn_id: Option<FnId>,
    /// Value scope binding of the function
    pub ext: Option<ValueScopeName>,
    /// Set once the function is compiled
    pub validate: Option<FnId>,
    pub evaluated: Option<EvaluatedInfo>,
    /// Ids and anchors; document roots only
    pub index: Option<Arc<SchemaIndex>>,
    pub ref_cache: HashMap<String, Resolved>,
    pub meta: bool,
}

impl SchemaEnv {
    fn new(schema: Arc<Value>, root: EnvId, base_id: String, pointer: String, key: String) -> Self {
        let is_async = schema.get("$async") == Some(&Value::Bool(true));
        Self {
            schema_path: format!("#{}", pointer),
            schema,
            root,
            base_id,
            pointer,
            is_async,
            key,
            fn_id: None,
            ext: None,
            validate: None,
            evaluated: None,
            index: None,
            ref_cache: HashMap::new(),
            meta: false,
        }
    }
}

/// Registry state owned by a compiler instance
#[derive(Debug, Default)]
pub struct CompileState {
    envs: Vec<SchemaEnv>,
    env_keys: HashMap<String, EnvId>,
    /// Document URI -> root environment
    pub schemas: HashMap<String, EnvId>,
    /// Nested resource URI -> (root environment, pointer)
    pub refs: HashMap<String, (EnvId, String)>,
    pub values: ValueScope,
    pub fns: Vec<Option<Arc<FnDef>>>,
    /// Keys of environments whose function is being built
    compiling: HashSet<String>,
}

impl CompileState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(&self, id: EnvId) -> &SchemaEnv {
        &self.envs[id.0]
    }

    pub fn env_mut(&mut self, id: EnvId) -> &mut SchemaEnv {
        &mut self.envs[id.0]
    }

    pub fn env_count(&self) -> usize {
        self.envs.len()
    }

    /// Register a document, indexing its ids and anchors.
    /// The same document under the same base id returns the existing environment.
    pub fn add_root(&mut self, schema: Arc<Value>, base_id: &str, meta: bool) -> Result<EnvId> {
        let key = format!("root|{}|{}", base_id, schema);
        if let Some(id) = self.env_keys.get(&key) {
            return Ok(*id);
        }
        if !schema.is_object() && !schema.is_boolean() {
            return Err(Error::schema("schema must be object or boolean"));
        }
        let index = SchemaIndex::build(&schema, base_id)?;
        let id = EnvId(self.envs.len());
        let mut env = SchemaEnv::new(schema, id, base_id.to_string(), String::new(), key.clone());
        env.index = Some(Arc::new(index));
        env.meta = meta;
        self.envs.push(env);
        if let Err(err) = self.register_refs(id) {
            self.envs.pop();
            return Err(err);
        }
        self.env_keys.insert(key, id);
        tracing::debug!(base_id = %base_id, env = id.0, "registered schema document");
        Ok(id)
    }

    /// Environment of a subschema of `root`, created on first use
    pub fn env_for(&mut self, root: EnvId, pointer: &str, base_id: &str, schema: Arc<Value>) -> EnvId {
        if pointer.is_empty() && base_id == self.env(root).base_id {
            return root;
        }
        let key = format!("{}|{}|{}", root.0, pointer, base_id);
        if let Some(id) = self.env_keys.get(&key) {
            return *id;
        }
        let id = EnvId(self.envs.len());
        let mut env = SchemaEnv::new(schema, root, base_id.to_string(), pointer.to_string(), key.clone());
        env.meta = self.env(root).meta;
        self.envs.push(env);
        self.env_keys.insert(key, id);
        id
    }

    /// Forget a document and the resources it declared
    pub fn remove_root(&mut self, root: EnvId) {
        self.schemas.retain(|_, id| *id != root);
        self.refs.retain(|_, (id, _)| *id != root);
        let key = self.env(root).key.clone();
        self.env_keys.remove(&key);
    }

    /// Program holding every function compiled so far
    pub fn program(&self) -> Program {
        Program {
            fns: self.fns.clone(),
            values: self.values.snapshot(),
        }
    }
}

/// Compile an environment's function, or return the one compiled or in progress
pub fn compile_env(state: &mut CompileState, cfg: &CompilerConfig, id: EnvId) -> Result<FnId> {
    if let Some(validate) = state.env(id).validate {
        return Ok(validate);
    }
    let key = state.env(id).key.clone();
    if state.compiling.contains(&key) {
        // Recursive reference: call the function being built
        return state
            .env(id)
            .fn_id
            .ok_or_else(|| Error::internal(format!("schema {} is compiling without a function slot", key)));
    }
    let fn_id = match state.env(id).fn_id {
        Some(fn_id) => fn_id,
        None => {
            let fn_id = FnId(state.fns.len());
            state.fns.push(None);
            fn_id
        }
    };
    let ext = state.values.value(
        names::prefix::VALIDATE,
        ValueSpec {
            value: ScopeValue::Validate(fn_id),
            key: key.clone(),
            code: Some(format!("functions[{}]", fn_id.0)),
        },
    );
    state.values.set_value(&ext.ext, ScopeValue::Validate(fn_id))?;
    {
        let env = state.env_mut(id);
        env.fn_id = Some(fn_id);
        env.ext = Some(ext.clone());
    }

    state.compiling.insert(key.clone());
    let result = build_function(state, cfg, id, fn_id, &ext);
    state.compiling.remove(&key);

    let def = result?;
    let evaluated = def.evaluated.clone();
    state.fns[fn_id.0] = Some(Arc::new(def));
    let env = state.env_mut(id);
    env.validate = Some(fn_id);
    env.evaluated = Some(evaluated);
    Ok(fn_id)
}

fn build_function(state: &mut CompileState, cfg: &CompilerConfig, id: EnvId, fn_id: FnId, ext: &ValueScopeName) -> Result<FnDef> {
    let env = state.env(id);
    let schema = env.schema.clone();
    let base_id = env.base_id.clone();
    let schema_path = env.schema_path.clone();
    let is_async = env.is_async;
    let span = tracing::debug_span!("compile", schema = %format!("{}{}", base_id, schema_path), function = %ext.name);
    let _guard = span.enter();

    let gen = CodeGen::new(Scope::with_parent(&state.values));
    let mut b = Builder { gen, state, cfg };
    let mut it = SchemaCxt::top(&schema, id, base_id, schema_path, is_async, cfg.opts.all_errors);
    validate::function_body(&mut it, &mut b)?;
    let evaluated = EvaluatedInfo::from_tracking(&it.props, &it.items);

    let Builder { gen, state, .. } = b;
    let used = gen.used_values().clone();
    let mut body = state.values.scope_refs(&used);
    body.extend(gen.finish()?);
    let nodes_before = count_nodes(&body);
    if cfg.opts.optimize > 0 {
        Optimizer::with_passes(cfg.opts.optimize).optimize(&mut body);
    }
    tracing::debug!(nodes_before, nodes_after = count_nodes(&body), "compiled schema function");

    Ok(FnDef {
        id: fn_id,
        name: ext.name.clone(),
        params: it.names.params(),
        body,
        is_async,
        evaluated,
    })
}
