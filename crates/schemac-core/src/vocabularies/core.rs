//! Core vocabulary: `$ref` and the identifier keywords
//!
//! A reference either inlines the target schema into the current function
//! or calls the target's own compiled function. Calls of functions still
//! being compiled (recursive schemas) are resolved through the value scope.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::code::call_validate_code;
use super::{KeywordDefinition, Vocabulary, VocabularyEntry};
use crate::codegen::{Builtin, Expr};
use crate::compile::context::{Evaluated, KeywordCxt, SubschemaArgs};
use crate::compile::data_type::JsonType;
use crate::compile::resolve::{resolve_url, Resolved};
use crate::compile::{compile_env, validate, Builder, EnvId};
use crate::{Error, Result};
use serde_json::Value;

pub fn vocabulary() -> Vocabulary {
    vec![
        "$schema".into(),
        "$id".into(),
        "$defs".into(),
        "$vocabulary".into(),
        "$anchor".into(),
        "definitions".into(),
        "$async".into(),
        KeywordDefinition::new("$comment").schema_types(vec![JsonType::String]).into(),
        VocabularyEntry::Keyword(
            KeywordDefinition::new("$ref")
                .schema_types(vec![JsonType::String])
                .code(ref_code),
        ),
    ]
}

fn ref_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let Value::String(reference) = cxt.schema else {
        return Err(Error::internal("$ref value is not a string"));
    };
    let env = cxt.it.env;
    let root = b.state.env(env).root;
    let base_id = cxt.it.base_id.clone();
    if (reference == "#" || reference == "#/") && base_id == b.state.env(root).base_id {
        return call_ref(cxt, b, root);
    }
    let inline = b.cfg.opts.inline_refs;
    match b.state.resolve_ref(root, &base_id, reference, inline)? {
        None => Err(Error::missing_ref(base_id.clone(), resolve_url(&base_id, reference))),
        Some(Resolved::Env(target)) => call_ref(cxt, b, target),
        Some(Resolved::Inline { schema, base_id }) => {
            let valid = b.gen.name("valid")?;
            let mut child = cxt.it.child(b, SubschemaArgs::new(&schema, ""))?;
            child.err_schema_path = reference.clone();
            child.base_id = base_id;
            child.data_types = Vec::new();
            validate::subschema_code(&mut child, b, &valid)?;
            let sub = Evaluated {
                props: child.props,
                items: child.items,
            };
            cxt.merge_evaluated(b, &sub)?;
            cxt.ok(b, Expr::var(&valid));
            Ok(())
        }
    }
}

/// Call the function of environment `target` on the current data
pub(crate) fn call_ref(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, target: EnvId) -> Result<()> {
    compile_env(b.state, b.cfg, target)?;
    let is_async = b.state.env(target).is_async;
    let ext = b
        .state
        .env(target)
        .ext
        .clone()
        .ok_or_else(|| Error::internal(format!("referenced schema {} has no function", b.state.env(target).key)))?;
    let validate = Expr::var(&b.gen.scope_value(&ext));
    if is_async {
        call_async_ref(cxt, b, validate, Some(target))
    } else {
        call_sync_ref(cxt, b, validate, Some(target))
    }
}

/// Synchronous call: append the callee's errors on failure, merge its evaluated set on success
pub(crate) fn call_sync_ref(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, validate: Expr, target: Option<EnvId>) -> Result<()> {
    let call = call_validate_code(cxt.it, validate);
    b.gen.if_(Expr::not(call));
    b.gen.code(Expr::call(Builtin::AppendCalleeErrors, vec![]));
    b.gen.else_()?;
    add_evaluated_from(cxt, b, target)?;
    if cxt.it.all_errors {
        b.gen.end_if()?;
    }
    Ok(())
}

pub(crate) fn call_async_ref(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, validate: Expr, target: Option<EnvId>) -> Result<()> {
    if !cxt.it.is_async {
        return Err(Error::schema_at(
            "async schema referenced by sync schema",
            cxt.it.err_schema_path.clone(),
        ));
    }
    let all_errors = cxt.it.all_errors;
    let valid = b.gen.let_("valid", None)?;
    b.gen.try_();
    b.gen.code(call_validate_code(cxt.it, validate));
    add_evaluated_from(cxt, b, target)?;
    if !all_errors {
        b.gen.assign_var(&valid, Expr::bool(true));
    }
    let e = b.gen.catch_("e")?;
    b.gen.if_(Expr::not(Expr::call(Builtin::IsValidationError, vec![Expr::var(&e)])));
    b.gen.throw_(Expr::var(&e));
    b.gen.end_if()?;
    b.gen.code(Expr::call(Builtin::AppendErrors, vec![Expr::var(&e)]));
    if !all_errors {
        b.gen.assign_var(&valid, Expr::bool(false));
    }
    b.gen.end_try()?;
    cxt.ok(b, Expr::var(&valid));
    Ok(())
}

/// Merge what the callee evaluated: statically when its function is compiled
/// with a static descriptor, otherwise from the call's reported sets
fn add_evaluated_from(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, target: Option<EnvId>) -> Result<()> {
    if !b.cfg.opts.unevaluated() {
        return Ok(());
    }
    let info = target.and_then(|t| b.state.env(t).evaluated.clone());
    if !cxt.it.props.is_all() {
        match info.as_ref() {
            Some(info) if !info.dynamic_props => {
                if let Some(props) = &info.props {
                    cxt.it.props.merge_static(&mut b.gen, props)?;
                }
            }
            _ => {
                let props = b.gen.var("props", Some(Expr::call(Builtin::CalleeProps, vec![])))?;
                cxt.it.props.merge_expr(&mut b.gen, Expr::var(&props))?;
            }
        }
    }
    if !cxt.it.items.is_all() {
        match info.as_ref() {
            Some(info) if !info.dynamic_items => {
                if let Some(items) = &info.items {
                    cxt.it.items.merge_static(&mut b.gen, items)?;
                }
            }
            _ => {
                let items = b.gen.var("items", Some(Expr::call(Builtin::CalleeItems, vec![])))?;
                cxt.it.items.merge_expr(&mut b.gen, Expr::var(&items))?;
            }
        }
    }
    Ok(())
}
