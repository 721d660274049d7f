//! Compilation contexts
//!
//! `SchemaCxt` describes the (sub)schema being compiled: where its data
//! lives in the generated code, the instance and schema paths used in error
//! objects, the error accumulation mode and the evaluated properties/items
//! known so far. `KeywordCxt` wraps it while one keyword generates code and
//! offers the pass/fail helpers every keyword uses.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::data_type::JsonType;
use super::errors::{escape_json_pointer, report_error, report_extra_error, reset_errors_count, ErrorPaths, ErrorSpec};
use super::evaluated::{EvaluatedItems, EvaluatedProps};
use super::names::Names;
use super::util::{check_strict_mode, unescape_json_pointer, value_has_type};
use super::{validate, Builder, EnvId};
use crate::codegen::{Builtin, Expr, Name};
use crate::error::StrictCategory;
use crate::vocabularies::KeywordDefinition;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// State of the schema being compiled
#[derive(Debug, Clone)]
pub struct SchemaCxt<'s> {
    pub schema: &'s Value,
    /// Environment whose function is being generated
    pub env: EnvId,
    /// Base URI for resolving references in this schema
    pub base_id: String,
    /// `#`-prefixed pointer to this schema, used in error objects
    pub err_schema_path: String,
    pub names: Names,
    /// Variable holding the instance location validated here
    pub data: Name,
    pub data_level: usize,
    /// Data variable of each level, root first
    pub data_names: Vec<Name>,
    /// Property or index expression of each level; the root has none
    pub data_path_arr: Vec<Expr>,
    /// Instance path relative to the function's `instancePath` parameter
    pub error_path: Expr,
    /// Types the data is already known to have
    pub data_types: Vec<JsonType>,
    /// Only the pass/fail outcome is needed; errors are appended, never returned
    pub composite_rule: bool,
    pub all_errors: bool,
    pub is_async: bool,
    /// Set while validating property names
    pub property_name: Option<Name>,
    pub props: EvaluatedProps,
    pub items: EvaluatedItems,
    /// Function body rather than an inline subschema
    pub is_top: bool,
}

impl<'s> SchemaCxt<'s> {
    /// Context of a schema function body
    pub fn top(schema: &'s Value, env: EnvId, base_id: String, err_schema_path: String, is_async: bool, all_errors: bool) -> Self {
        let names = Names::default();
        Self {
            schema,
            env,
            base_id,
            err_schema_path,
            data: names.data.clone(),
            data_level: 0,
            data_names: vec![names.data.clone()],
            data_path_arr: vec![Expr::Undefined],
            names,
            error_path: Expr::str(""),
            data_types: Vec::new(),
            composite_rule: false,
            all_errors,
            is_async,
            property_name: None,
            props: EvaluatedProps::default(),
            items: EvaluatedItems::default(),
            is_top: true,
        }
    }

    /// Context for a subschema; data narrowing emits the child data variable
    pub fn child<'v>(&self, b: &mut Builder<'_>, args: SubschemaArgs<'v>) -> Result<SchemaCxt<'v>> {
        let mut child = SchemaCxt {
            schema: args.schema,
            env: self.env,
            base_id: self.base_id.clone(),
            err_schema_path: format!("{}{}", self.err_schema_path, args.schema_path),
            names: self.names.clone(),
            data: self.data.clone(),
            data_level: self.data_level,
            data_names: self.data_names.clone(),
            data_path_arr: self.data_path_arr.clone(),
            error_path: self.error_path.clone(),
            data_types: self.data_types.clone(),
            composite_rule: self.composite_rule || args.composite_rule,
            all_errors: args.all_errors.unwrap_or(self.all_errors),
            is_async: self.is_async,
            property_name: self.property_name.clone(),
            props: EvaluatedProps::default(),
            items: EvaluatedItems::default(),
            is_top: false,
        };
        match args.data {
            SubData::Same => {}
            SubData::Prop(key, kind) => {
                let next = b.gen.const_inline("data", Expr::var(&self.data).member(key.clone()))?;
                child.error_path = Expr::concat([self.error_path.clone(), error_path_segment(&key, kind)]);
                child.enter_data(next, key);
            }
            SubData::Value(name) => child.enter_data(name, Expr::Undefined),
        }
        if let Some(types) = args.data_types {
            child.data_types = types;
        }
        if args.property_name.is_some() {
            child.property_name = args.property_name;
        }
        Ok(child)
    }

    fn enter_data(&mut self, data: Name, key: Expr) {
        self.data = data.clone();
        self.data_level += 1;
        self.data_types = Vec::new();
        self.data_names.push(data);
        self.data_path_arr.push(key);
    }

    /// Absolute location of this schema for diagnostics
    pub fn location(&self) -> String {
        format!("{}{}", self.base_id, self.err_schema_path)
    }
}

/// How a subschema's data relates to its parent's
#[derive(Debug, Clone)]
pub enum SubData {
    Same,
    /// A property or index of the parent data
    Prop(Expr, PropKind),
    /// A value held in a variable (property names)
    Value(Name),
}

/// Runtime type of a data property expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Str,
    Num,
}

fn error_path_segment(key: &Expr, kind: PropKind) -> Expr {
    match (key.as_lit(), kind) {
        (Some(Value::String(s)), _) => Expr::str(format!("/{}", escape_json_pointer(s))),
        (Some(Value::Number(n)), _) => Expr::str(format!("/{}", n)),
        (_, PropKind::Num) => Expr::concat([Expr::str("/"), key.clone()]),
        (_, PropKind::Str) => Expr::concat([
            Expr::str("/"),
            Expr::call(Builtin::EscapePointer, vec![key.clone()]),
        ]),
    }
}

/// Arguments of [`KeywordCxt::subschema`]
#[derive(Debug, Clone)]
pub struct SubschemaArgs<'v> {
    pub schema: &'v Value,
    /// Appended to the parent's error schema path
    pub schema_path: String,
    pub data: SubData,
    pub data_types: Option<Vec<JsonType>>,
    pub composite_rule: bool,
    pub all_errors: Option<bool>,
    pub property_name: Option<Name>,
}

impl<'v> SubschemaArgs<'v> {
    /// Subschema at an explicit schema path
    pub fn new(schema: &'v Value, schema_path: impl Into<String>) -> Self {
        Self {
            schema,
            schema_path: schema_path.into(),
            data: SubData::Same,
            data_types: None,
            composite_rule: false,
            all_errors: None,
            property_name: None,
        }
    }

    /// The value of a keyword
    pub fn keyword(schema: &'v Value, keyword: &str) -> Self {
        Self::new(schema, format!("/{}", escape_json_pointer(keyword)))
    }

    /// A member of a keyword's object value
    pub fn prop(mut self, prop: &str) -> Self {
        self.schema_path.push('/');
        self.schema_path.push_str(&escape_json_pointer(prop));
        self
    }

    /// An element of a keyword's array value
    pub fn index(mut self, index: usize) -> Self {
        self.schema_path.push_str(&format!("/{}", index));
        self
    }

    pub fn data_prop(mut self, key: Expr, kind: PropKind) -> Self {
        self.data = SubData::Prop(key, kind);
        self
    }

    pub fn data_value(mut self, data: Name) -> Self {
        self.data = SubData::Value(data);
        self
    }

    pub fn data_types(mut self, types: Vec<JsonType>) -> Self {
        self.data_types = Some(types);
        self
    }

    pub fn composite(mut self) -> Self {
        self.composite_rule = true;
        self
    }

    pub fn all_errors(mut self, all_errors: bool) -> Self {
        self.all_errors = Some(all_errors);
        self
    }

    pub fn property_name(mut self, name: Name) -> Self {
        self.property_name = Some(name);
        self
    }
}

/// Evaluated properties/items of a compiled subschema
#[derive(Debug, Clone, Default)]
pub struct Evaluated {
    pub props: EvaluatedProps,
    pub items: EvaluatedItems,
}

impl Evaluated {
    pub fn all() -> Self {
        Self {
            props: EvaluatedProps::All,
            items: EvaluatedItems::All,
        }
    }

    fn has_props(&self) -> bool {
        !matches!(&self.props, EvaluatedProps::Names(names) if names.is_empty())
    }

    fn has_items(&self) -> bool {
        !matches!(self.items, EvaluatedItems::Count(0))
    }
}

/// Context of one keyword of a schema
pub struct KeywordCxt<'a, 's> {
    pub it: &'a mut SchemaCxt<'s>,
    pub def: Arc<KeywordDefinition>,
    pub keyword: String,
    /// Keyword value (`null` for keywords only implied by another)
    pub schema: &'s Value,
    pub parent_schema: &'s Value,
    pub data: Name,
    /// Variable holding the `$data` value
    pub data_var: Option<Name>,
    /// Error count when the keyword started
    pub errs_count: Option<Name>,
    /// Params of the next error
    pub params: Vec<(String, Expr)>,
    /// Type group the keyword runs in
    pub rule_type: Option<JsonType>,
}

impl<'a, 's> KeywordCxt<'a, 's> {
    pub fn new(
        it: &'a mut SchemaCxt<'s>,
        b: &mut Builder<'_>,
        def: Arc<KeywordDefinition>,
        keyword: &str,
        rule_type: Option<JsonType>,
    ) -> Result<Self> {
        let parent_schema = it.schema;
        if def.dependencies.iter().any(|dep| parent_schema.get(dep).is_none()) {
            return Err(Error::keyword(
                keyword,
                format!("parent schema must have dependencies of {}: {}", keyword, def.dependencies.join(",")),
            ));
        }
        let present = parent_schema.get(keyword);
        let schema = present.unwrap_or(&NULL);
        let pointer = match schema {
            Value::Object(map) if b.cfg.opts.data && def.data && map.len() == 1 => {
                map.get("$data").and_then(Value::as_str)
            }
            _ => None,
        };
        let data_var = match pointer {
            Some(pointer) => {
                let expr = get_data(pointer, it)?;
                Some(b.gen.const_("vSchema", expr)?)
            }
            None => {
                if present.is_some() && !value_has_type(schema, &def.schema_types) {
                    let types = def.schema_types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",");
                    return Err(Error::schema_at(
                        format!("{} value must be {}", keyword, types),
                        format!("{}/{}", it.err_schema_path, escape_json_pointer(keyword)),
                    ));
                }
                None
            }
        };
        let errs_count = if def.track_errors {
            Some(b.gen.const_("_errs", Expr::call(Builtin::ErrorCount, vec![]))?)
        } else {
            None
        };
        Ok(Self {
            data: it.data.clone(),
            it,
            def,
            keyword: keyword.to_string(),
            schema,
            parent_schema,
            data_var,
            errs_count,
            params: Vec::new(),
            rule_type,
        })
    }

    pub fn is_data(&self) -> bool {
        self.data_var.is_some()
    }

    /// Keyword value as an expression: the literal, or the `$data` variable
    pub fn schema_code(&self) -> Expr {
        match &self.data_var {
            Some(name) => Expr::var(name),
            None => Expr::Lit(self.schema.clone()),
        }
    }

    pub fn data_expr(&self) -> Expr {
        Expr::var(&self.data)
    }

    pub fn set_params(&mut self, params: Vec<(&str, Expr)>) {
        self.params = params.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    }

    pub fn strict(&self, b: &Builder<'_>, category: StrictCategory, message: impl Into<String>) -> Result<()> {
        check_strict_mode(b, category, message)
    }

    fn error_spec(&self, paths: ErrorPaths) -> ErrorSpec {
        let (params, message) = match &self.def.error {
            Some(template) => ((template.params)(self), (template.message)(self)),
            None => (
                self.params.clone(),
                Expr::str(format!("must pass \"{}\" keyword validation", self.keyword)),
            ),
        };
        let mut spec = ErrorSpec::new(self.keyword.clone())
            .message(message)
            .schema_value(self.schema_code())
            .paths(paths);
        spec.params = params;
        spec
    }

    /// Report the keyword error
    pub fn error(&mut self, b: &mut Builder<'_>) -> Result<()> {
        self.error_with(b, false, ErrorPaths::default())
    }

    /// Report the keyword error after errors already appended by subschemas
    pub fn error_extra(&mut self, b: &mut Builder<'_>) -> Result<()> {
        self.error_with(b, true, ErrorPaths::default())
    }

    pub fn error_with(&mut self, b: &mut Builder<'_>, append: bool, paths: ErrorPaths) -> Result<()> {
        let spec = self.error_spec(paths);
        if append {
            report_extra_error(self.it, b, &spec)
        } else {
            report_error(self.it, b, &spec)
        }
    }

    /// Report when `cond` holds; in fail-fast mode the success branch stays open
    pub fn fail(&mut self, b: &mut Builder<'_>, cond: Expr) -> Result<()> {
        b.gen.if_(cond);
        self.error(b)?;
        if self.it.all_errors {
            b.gen.end_if()
        } else {
            b.gen.else_()
        }
    }

    /// Unconditional failure
    pub fn fail_always(&mut self, b: &mut Builder<'_>) -> Result<()> {
        self.error(b)?;
        if !self.it.all_errors {
            b.gen.if_(Expr::bool(false));
        }
        Ok(())
    }

    /// `fail` that also rejects an invalid `$data` value and ignores a missing one
    pub fn fail_data(&mut self, b: &mut Builder<'_>, cond: Expr) -> Result<()> {
        match &self.data_var {
            None => self.fail(b, cond),
            Some(code) => {
                let guarded = Expr::and([
                    Expr::ne(Expr::var(code), Expr::Undefined),
                    Expr::or([self.invalid_data(), cond]),
                ]);
                self.fail(b, guarded)
            }
        }
    }

    pub fn pass(&mut self, b: &mut Builder<'_>, valid: Expr) -> Result<()> {
        self.fail(b, Expr::not(valid))
    }

    /// `pass` whose failure adds to errors appended by subschemas
    pub fn pass_extra(&mut self, b: &mut Builder<'_>, valid: Expr) -> Result<()> {
        b.gen.if_(Expr::not(valid));
        self.error_extra(b)?;
        if self.it.all_errors {
            b.gen.end_if()
        } else {
            b.gen.else_()
        }
    }

    /// Report when `cond` holds, otherwise drop errors from probed subschemas
    pub fn fail_result(&mut self, b: &mut Builder<'_>, cond: Expr, append: bool) -> Result<()> {
        b.gen.if_(cond);
        self.error_with(b, append, ErrorPaths::default())?;
        b.gen.else_()?;
        self.reset(b)?;
        if self.it.all_errors {
            b.gen.end_if()?;
        }
        Ok(())
    }

    pub fn result(&mut self, b: &mut Builder<'_>, valid: Expr, append: bool) -> Result<()> {
        self.fail_result(b, Expr::not(valid), append)
    }

    /// Continue only while `cond` holds (fail-fast mode)
    pub fn ok(&mut self, b: &mut Builder<'_>, cond: Expr) {
        if !self.it.all_errors {
            b.gen.if_(cond);
        }
    }

    /// Drop errors appended since the keyword started
    pub fn reset(&mut self, b: &mut Builder<'_>) -> Result<()> {
        let errs = self
            .errs_count
            .as_ref()
            .ok_or_else(|| Error::internal(format!("keyword \"{}\" does not track errors", self.keyword)))?;
        reset_errors_count(b, Expr::var(errs));
        Ok(())
    }

    /// `$data` value of a type the keyword cannot use
    pub fn invalid_data(&self) -> Expr {
        match &self.data_var {
            Some(code) if !self.def.schema_types.is_empty() => Expr::not(Expr::or(
                self.def
                    .schema_types
                    .iter()
                    .map(|t| Expr::call(Builtin::IsType, vec![Expr::var(code), Expr::str(t.as_str())])),
            )),
            _ => Expr::bool(false),
        }
    }

    fn data_error(&mut self, b: &mut Builder<'_>) -> Result<()> {
        let spec = ErrorSpec::new(self.keyword.clone())
            .message(Expr::str(format!("\"{}\" keyword is invalid ($data)", self.keyword)))
            .schema_value(self.schema_code());
        report_error(self.it, b, &spec)
    }

    /// Skip the keyword when its `$data` is missing and report an invalid one.
    /// Leaves the branch for a usable value open.
    pub fn check_data(&mut self, b: &mut Builder<'_>, valid: Option<&Name>, data_valid: Option<Expr>) -> Result<()> {
        let Some(code) = self.data_var.clone() else {
            return Ok(());
        };
        let mut skip = vec![Expr::eq(Expr::var(&code), Expr::Undefined)];
        skip.extend(data_valid);
        b.gen.if_(Expr::or(skip));
        if let Some(valid) = valid {
            b.gen.assign_var(valid, Expr::bool(true));
        }
        if !self.def.schema_types.is_empty() {
            b.gen.else_if(self.invalid_data())?;
            self.data_error(b)?;
            if let Some(valid) = valid {
                b.gen.assign_var(valid, Expr::bool(false));
            }
        }
        b.gen.else_()
    }

    /// Open a block guarded by [`check_data`](Self::check_data); close it with `end_block`
    pub fn block_data(&mut self, b: &mut Builder<'_>, valid: Option<&Name>) -> Result<()> {
        b.gen.block();
        self.check_data(b, valid, None)
    }

    /// Compile a subschema, defining `valid`
    pub fn subschema(&mut self, b: &mut Builder<'_>, args: SubschemaArgs<'_>, valid: &Name) -> Result<Evaluated> {
        let mut child = self.it.child(b, args)?;
        validate::subschema_code(&mut child, b, valid)?;
        Ok(Evaluated {
            props: child.props,
            items: child.items,
        })
    }

    /// Add what a subschema evaluated on the same data
    pub fn merge_evaluated(&mut self, b: &mut Builder<'_>, sub: &Evaluated) -> Result<()> {
        if !b.cfg.opts.unevaluated() {
            return Ok(());
        }
        if !self.it.props.is_all() && sub.has_props() {
            self.it.props.merge_static(&mut b.gen, &sub.props)?;
        }
        if !self.it.items.is_all() && sub.has_items() {
            self.it.items.merge_static(&mut b.gen, &sub.items)?;
        }
        Ok(())
    }

    /// Add what a subschema evaluated, only if it passed
    pub fn merge_valid_evaluated(&mut self, b: &mut Builder<'_>, sub: &Evaluated, valid: &Name) -> Result<bool> {
        if !b.cfg.opts.unevaluated() || (self.it.props.is_all() && self.it.items.is_all()) {
            return Ok(false);
        }
        let props = !self.it.props.is_all() && sub.has_props();
        let items = !self.it.items.is_all() && sub.has_items();
        if !props && !items {
            return Ok(true);
        }
        // Declared before the branch so later reads see them
        if props {
            self.it.props.dynamic_name(&mut b.gen)?;
        }
        if items {
            self.it.items.dynamic_name(&mut b.gen)?;
        }
        b.gen.if_(Expr::var(valid));
        self.merge_evaluated(b, sub)?;
        b.gen.end_if()?;
        Ok(true)
    }
}

/// Expression for a `$data` pointer relative to the current data
pub fn get_data(pointer: &str, it: &SchemaCxt<'_>) -> Result<Expr> {
    if pointer.is_empty() {
        return Ok(Expr::var(&it.names.root_data));
    }
    let invalid = || Error::schema(format!("Invalid JSON-pointer: {}", pointer));
    let (mut data, json_pointer) = if pointer.starts_with('/') {
        (Expr::var(&it.names.root_data), pointer)
    } else {
        let digits = pointer.find(|c: char| !c.is_ascii_digit()).unwrap_or(pointer.len());
        if digits == 0 {
            return Err(invalid());
        }
        let up: usize = pointer[..digits].parse().map_err(|_| invalid())?;
        let rest = &pointer[digits..];
        if rest == "#" {
            if up >= it.data_level {
                return Err(Error::schema(format!(
                    "Cannot access property/index {} levels up, current level is {}",
                    up, it.data_level
                )));
            }
            return Ok(it.data_path_arr[it.data_level - up].clone());
        }
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(invalid());
        }
        if up > it.data_level {
            return Err(Error::schema(format!(
                "Cannot access data {} levels up, current level is {}",
                up, it.data_level
            )));
        }
        (Expr::var(&it.data_names[it.data_level - up]), rest)
    };
    if !valid_pointer_escapes(json_pointer) {
        return Err(invalid());
    }
    for segment in json_pointer.split('/').skip(1) {
        if !segment.is_empty() {
            data = data.member(Expr::str(unescape_json_pointer(segment)));
        }
    }
    Ok(data)
}

fn valid_pointer_escapes(pointer: &str) -> bool {
    let mut chars = pointer.chars();
    while let Some(c) = chars.next() {
        if c == '~' && !matches!(chars.next(), Some('0' | '1')) {
            return false;
        }
    }
    true
}
