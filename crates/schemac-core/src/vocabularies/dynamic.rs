//! `$dynamicRef` and `$dynamicAnchor`
//!
//! A dynamic reference first resolves like `$ref`. When its target declares
//! a matching `$dynamicAnchor`, the outermost schema resource in the
//! runtime dynamic scope carrying that anchor is called instead.

use super::core::{call_async_ref, call_ref, call_sync_ref};
use super::{KeywordDefinition, Vocabulary};
use crate::codegen::{Builtin, Expr, Name};
use crate::compile::context::KeywordCxt;
use crate::compile::data_type::JsonType;
use crate::compile::resolve::{resolve_url, split_fragment, Resolved};
use crate::compile::Builder;
use crate::options::InlineRefs;
use crate::{Error, Result};
use serde_json::Value;

pub fn vocabulary() -> Vocabulary {
    vec![
        "$dynamicAnchor".into(),
        KeywordDefinition::new("$dynamicRef")
            .schema_types(vec![JsonType::String])
            .code(dynamic_ref_code)
            .into(),
    ]
}

fn dynamic_ref_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let Value::String(reference) = cxt.schema else {
        return Err(Error::internal("$dynamicRef value is not a string"));
    };
    let root = b.state.env(cxt.it.env).root;
    let base_id = cxt.it.base_id.clone();
    let target = match b.state.resolve_ref(root, &base_id, reference, InlineRefs::Never)? {
        Some(Resolved::Env(target)) => target,
        Some(Resolved::Inline { .. }) => {
            return Err(Error::internal("dynamic reference resolved to an inlined schema"));
        }
        None => return Err(Error::missing_ref(base_id.clone(), resolve_url(&base_id, reference))),
    };
    let (_, fragment) = split_fragment(reference);
    let anchor = fragment.trim_start_matches('#');
    let is_dynamic = !anchor.is_empty()
        && !anchor.starts_with('/')
        && b.state.env(target).schema.get("$dynamicAnchor").and_then(Value::as_str) == Some(anchor);
    if !is_dynamic {
        return call_ref(cxt, b, target);
    }
    tracing::debug!(anchor, "dynamic reference");

    let all_errors = cxt.it.all_errors;
    let valid = if all_errors {
        None
    } else {
        Some(b.gen.let_("valid", Some(Expr::bool(false)))?)
    };
    let scoped = b.gen.const_("_v", Expr::call(Builtin::DynamicAnchor, vec![Expr::str(anchor)]))?;
    b.gen.if_(Expr::var(&scoped));
    b.gen.block();
    if b.state.env(target).is_async {
        call_async_ref(cxt, b, Expr::var(&scoped), None)?;
    } else {
        call_sync_ref(cxt, b, Expr::var(&scoped), None)?;
    }
    mark_valid(b, valid.as_ref());
    b.gen.end_block()?;
    b.gen.else_()?;
    b.gen.block();
    call_ref(cxt, b, target)?;
    mark_valid(b, valid.as_ref());
    b.gen.end_block()?;
    b.gen.end_if()?;
    if let Some(valid) = valid {
        cxt.ok(b, Expr::var(&valid));
    }
    Ok(())
}

fn mark_valid(b: &mut Builder<'_>, valid: Option<&Name>) {
    if let Some(valid) = valid {
        b.gen.assign_var(valid, Expr::bool(true));
    }
}
