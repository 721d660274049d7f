//! Code generation for a schema and its keywords
//!
//! A schema function body checks the instance type (coercing when enabled),
//! then runs keyword groups in order: untyped keywords, one guarded group per
//! JSON type, and the `post` group. In fail-fast mode every group after the
//! first only runs while no error has been recorded.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::context::{KeywordCxt, SchemaCxt, SubschemaArgs};
use super::data_type::{
    check_data_type, coerce_and_check_data_type, get_schema_types, inferred_types, report_type_error, JsonType,
};
use super::defaults::assign_defaults;
use super::errors::{escape_json_pointer, report_error, ErrorSpec};
use super::evaluated::{EvaluatedItems, EvaluatedProps};
use super::names::prefix;
use super::resolve::resolve_url;
use super::rules::{should_use_rule, RuleGroup};
use super::util::{check_strict_mode, check_unknown_rules, schema_has_rules, schema_has_rules_but_ref};
use super::{compile_env, Builder};
use crate::codegen::{Builtin, Expr, Name, ScopeValue, ValueSpec, VarKind};
use crate::error::StrictCategory;
use crate::options::UseDefaults;
use crate::vocabularies::{KeywordDefinition, KeywordImpl, KeywordValidateFn, MacroFn};
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Body of a compiled schema function, epilogue included
pub fn function_body(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>) -> Result<()> {
    let anchors = dynamic_anchor_scope(it, b)?;
    for (anchor, validate) in &anchors {
        b.gen.code(Expr::call(
            Builtin::PushDynamicAnchor,
            vec![Expr::str(anchor.clone()), Expr::var(validate)],
        ));
    }
    if !anchors.is_empty() {
        b.gen.try_();
    }

    match it.schema {
        Value::Bool(true) => {}
        Value::Bool(false) => false_schema_error(it, b)?,
        _ => {
            check_keywords(it, b)?;
            check_no_default(it, b)?;
            update_base_id(it);
            type_and_keywords(it, b, None)?;
        }
    }
    return_results(it, b);

    if !anchors.is_empty() {
        b.gen.finally_()?;
        for _ in &anchors {
            b.gen.code(Expr::call(Builtin::PopDynamicAnchor, vec![]));
        }
        b.gen.end_try()?;
    }
    Ok(())
}

/// Dynamic anchors of the resource this function starts, with their functions
fn dynamic_anchor_scope(it: &SchemaCxt<'_>, b: &mut Builder<'_>) -> Result<Vec<(String, Name)>> {
    if !b.cfg.opts.unevaluated() {
        return Ok(Vec::new());
    }
    let anchors = b.state.resource_dynamic_anchors(it.env);
    let root = b.state.env(it.env).root;
    let mut scope = Vec::with_capacity(anchors.len());
    for (anchor, pointer) in anchors {
        let doc = b.state.env(root).schema.clone();
        let Some(target) = doc.pointer(&pointer) else {
            continue;
        };
        let base_id = b.state.env(it.env).base_id.clone();
        let env = b.state.env_for(root, &pointer, &base_id, Arc::new(target.clone()));
        compile_env(b.state, b.cfg, env)?;
        let ext = b
            .state
            .env(env)
            .ext
            .clone()
            .ok_or_else(|| Error::internal(format!("dynamic anchor \"{}\" has no function", anchor)))?;
        scope.push((anchor, b.gen.scope_value(&ext)));
    }
    Ok(scope)
}

fn return_results(it: &SchemaCxt<'_>, b: &mut Builder<'_>) {
    let dynamic_props = matches!(it.props, EvaluatedProps::Dynamic(_));
    let dynamic_items = matches!(it.items, EvaluatedItems::Dynamic(_));
    if dynamic_props || dynamic_items {
        b.gen.code(Expr::call(Builtin::ReportEvaluated, vec![it.props.to_expr(), it.items.to_expr()]));
    }
    let no_errors = Expr::eq(Expr::call(Builtin::ErrorCount, vec![]), Expr::num(0));
    if it.is_async {
        b.gen.if_nodes(
            no_errors,
            vec![crate::codegen::Node::Return(Expr::var(&it.data))],
            Some(vec![crate::codegen::Node::Throw(Expr::call(Builtin::NewValidationError, vec![]))]),
        );
    } else {
        b.gen.return_(no_errors);
    }
}

/// Code for a subschema, defining `valid`
pub fn subschema_code(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>, valid: &Name) -> Result<()> {
    if it.schema.is_object() {
        check_keywords(it, b)?;
        if schema_has_rules(b, it.schema) {
            check_async_schema(it, b)?;
            update_base_id(it);
            let errs = b.gen.const_("_errs", Expr::call(Builtin::ErrorCount, vec![]))?;
            type_and_keywords(it, b, Some(&errs))?;
            b.gen.def_name(
                VarKind::Var,
                valid,
                Some(Expr::eq(Expr::var(&errs), Expr::call(Builtin::ErrorCount, vec![]))),
            );
            return Ok(());
        }
    }
    if it.schema == &Value::Bool(false) {
        b.gen.def_name(VarKind::Var, valid, Some(Expr::bool(false)));
        false_schema_error(it, b)
    } else {
        b.gen.def_name(VarKind::Var, valid, Some(Expr::bool(true)));
        Ok(())
    }
}

fn false_schema_error(it: &SchemaCxt<'_>, b: &mut Builder<'_>) -> Result<()> {
    let spec = ErrorSpec::new("false schema")
        .message(Expr::str("boolean schema is false"))
        .schema_value(Expr::bool(false));
    report_error(it, b, &spec)
}

fn check_keywords(it: &SchemaCxt<'_>, b: &Builder<'_>) -> Result<()> {
    check_unknown_rules(b, it.schema)?;
    if it.schema.get("$ref").is_some() && b.cfg.opts.ignore_keywords_with_ref && schema_has_rules_but_ref(b, it.schema) {
        b.cfg
            .opts
            .logger
            .warn(&format!("$ref: keywords ignored in schema at path \"{}\"", it.err_schema_path));
    }
    Ok(())
}

fn check_no_default(it: &SchemaCxt<'_>, b: &Builder<'_>) -> Result<()> {
    if it.schema.get("default").is_some() && b.cfg.opts.use_defaults != UseDefaults::Off {
        check_strict_mode(b, StrictCategory::Schema, "default is ignored in the schema root")?;
    }
    Ok(())
}

fn check_async_schema(it: &SchemaCxt<'_>, b: &Builder<'_>) -> Result<()> {
    if it.schema.get("$async") == Some(&Value::Bool(true)) && !b.state.env(it.env).is_async {
        return Err(Error::schema_at("async schema in sync schema", it.err_schema_path.clone()));
    }
    Ok(())
}

/// A subschema `$id` starts a new base URI
fn update_base_id(it: &mut SchemaCxt<'_>) {
    if let Some(Value::String(id)) = it.schema.get("$id") {
        if !id.starts_with('#') {
            it.base_id = resolve_url(&it.base_id, id);
        }
    }
}

fn type_and_keywords(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>, errs_count: Option<&Name>) -> Result<()> {
    let types = get_schema_types(it.schema)?;
    let checked = coerce_and_check_data_type(it, b, &types)?;
    schema_keywords(it, b, &types, !checked, errs_count)
}

fn schema_keywords(
    it: &mut SchemaCxt<'_>,
    b: &mut Builder<'_>,
    types: &[JsonType],
    type_errors: bool,
    errs_count: Option<&Name>,
) -> Result<()> {
    let cfg = b.cfg;
    if it.schema.get("$ref").is_some()
        && (cfg.opts.ignore_keywords_with_ref || !schema_has_rules_but_ref(b, it.schema))
    {
        if let Some(rule) = cfg.rules.rule("$ref") {
            b.gen.block();
            keyword_code(it, b, "$ref", rule.def.clone(), None)?;
            b.gen.end_block()?;
        }
        return Ok(());
    }
    check_strict_types(it, b, types)?;
    b.gen.block();
    for group in cfg.rules.groups().iter().chain(std::iter::once(cfg.rules.post())) {
        group_keywords(it, b, group, types, type_errors, errs_count)?;
    }
    b.gen.end_block()
}

fn group_keywords(
    it: &mut SchemaCxt<'_>,
    b: &mut Builder<'_>,
    group: &RuleGroup,
    types: &[JsonType],
    type_errors: bool,
    errs_count: Option<&Name>,
) -> Result<()> {
    if !group.is_used_by(it.schema) {
        return Ok(());
    }
    match group.ty {
        Some(ty) => {
            b.gen.if_(check_data_type(ty, Expr::var(&it.data)));
            iterate_keywords(it, b, group)?;
            if types.len() == 1 && types[0] == ty && type_errors {
                b.gen.else_()?;
                report_type_error(it, b, types)?;
            }
            b.gen.end_if()?;
        }
        None => iterate_keywords(it, b, group)?,
    }
    if !it.all_errors {
        let errs = match errs_count {
            Some(errs) => Expr::var(errs),
            None => Expr::num(0),
        };
        b.gen.if_(Expr::eq(Expr::call(Builtin::ErrorCount, vec![]), errs));
    }
    Ok(())
}

fn iterate_keywords(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>, group: &RuleGroup) -> Result<()> {
    if b.cfg.opts.use_defaults != UseDefaults::Off {
        assign_defaults(it, b, group.ty)?;
    }
    b.gen.block();
    for rule in &group.rules {
        if should_use_rule(it.schema, rule) {
            keyword_code(it, b, &rule.keyword, rule.def.clone(), group.ty)?;
        }
    }
    b.gen.end_block()
}

/// Generate one keyword
pub fn keyword_code(
    it: &mut SchemaCxt<'_>,
    b: &mut Builder<'_>,
    keyword: &str,
    def: Arc<KeywordDefinition>,
    rule_type: Option<JsonType>,
) -> Result<()> {
    if def.is_async && !it.is_async {
        return Err(Error::keyword(keyword, "async keyword in sync schema"));
    }
    let implementation = def.implementation.clone();
    let mut cxt = KeywordCxt::new(it, b, def, keyword, rule_type)?;
    match implementation {
        KeywordImpl::Code(code) => code(&mut cxt, b),
        KeywordImpl::Validate(validate) => validate_keyword(&mut cxt, b, validate),
        KeywordImpl::Macro(expand) => macro_keyword(&mut cxt, b, expand),
        KeywordImpl::None => Ok(()),
    }
}

/// Keyword checked by a runtime function
fn validate_keyword(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, validate: KeywordValidateFn) -> Result<()> {
    let key = format!("{}@{:p}", cxt.keyword, Arc::as_ptr(&validate));
    let entry = b.state.values.value(
        prefix::KEYWORD,
        ValueSpec {
            value: ScopeValue::Keyword(validate),
            key,
            code: Some(format!("keywords[{:?}].validate", cxt.keyword)),
        },
    );
    let func = b.gen.scope_value(&entry);
    let valid = b.gen.let_("valid", None)?;
    if cxt.is_data() {
        cxt.block_data(b, Some(&valid))?;
    }
    let call = Expr::call(
        Builtin::CallKeyword,
        vec![
            Expr::var(&func),
            cxt.schema_code(),
            cxt.data_expr(),
            Expr::Lit(cxt.parent_schema.clone()),
        ],
    );
    b.gen.assign_var(&valid, call);
    if cxt.is_data() {
        b.gen.end_block()?;
    }
    cxt.pass(b, Expr::var(&valid))
}

/// Keyword expanded into a schema validated in place
fn macro_keyword(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, expand: MacroFn) -> Result<()> {
    let expanded = expand(cxt.schema, cxt.parent_schema)?;
    let valid = b.gen.name("valid")?;
    let args = SubschemaArgs::new(&expanded, format!("/{}", escape_json_pointer(&cxt.keyword))).composite();
    cxt.subschema(b, args, &valid)?;
    cxt.pass_extra(b, Expr::var(&valid))
}

fn check_strict_types(it: &mut SchemaCxt<'_>, b: &Builder<'_>, types: &[JsonType]) -> Result<()> {
    if b.state.env(it.env).meta || b.cfg.opts.strict_mode(StrictCategory::Types) == crate::error::StrictMode::Off {
        return Ok(());
    }
    check_context_types(it, b, types)?;
    if !b.cfg.opts.allow_union_types && types.len() > 1 && !(types.len() == 2 && types.contains(&JsonType::Null)) {
        check_strict_mode(b, StrictCategory::Types, format!("use allow_union_types to allow union type keyword at \"{}\"", it.err_schema_path))?;
    }
    let known: Vec<JsonType> = if it.data_types.is_empty() {
        inferred_types(it.schema)
    } else {
        it.data_types.clone()
    };
    let mut keywords: Vec<_> = b.cfg.rules.all().filter(|rule| should_use_rule(it.schema, rule)).collect();
    keywords.sort_by(|x, y| x.keyword.cmp(&y.keyword));
    for rule in keywords {
        let kw_types = &rule.def.types;
        if !kw_types.is_empty() && !kw_types.iter().any(|t| has_applicable_type(&known, *t)) {
            let list = kw_types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",");
            check_strict_mode(
                b,
                StrictCategory::Types,
                format!("missing type \"{}\" for keyword \"{}\" at \"{}\"", list, rule.keyword, it.err_schema_path),
            )?;
        }
    }
    Ok(())
}

fn check_context_types(it: &mut SchemaCxt<'_>, b: &Builder<'_>, types: &[JsonType]) -> Result<()> {
    if types.is_empty() {
        return Ok(());
    }
    if it.data_types.is_empty() {
        it.data_types = types.to_vec();
        return Ok(());
    }
    for t in types {
        if !includes_type(&it.data_types, *t) {
            let context = it.data_types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",");
            check_strict_mode(
                b,
                StrictCategory::Types,
                format!("type \"{}\" not allowed by context \"{}\"", t, context),
            )?;
        }
    }
    let mut narrowed = Vec::new();
    for t in &it.data_types {
        if includes_type(types, *t) {
            narrowed.push(*t);
        } else if types.contains(&JsonType::Integer) && *t == JsonType::Number {
            narrowed.push(JsonType::Integer);
        }
    }
    it.data_types = narrowed;
    Ok(())
}

fn has_applicable_type(schema_types: &[JsonType], keyword_type: JsonType) -> bool {
    schema_types.contains(&keyword_type) || (keyword_type == JsonType::Number && schema_types.contains(&JsonType::Integer))
}

fn includes_type(types: &[JsonType], t: JsonType) -> bool {
    types.contains(&t) || (t == JsonType::Integer && types.contains(&JsonType::Number))
}
