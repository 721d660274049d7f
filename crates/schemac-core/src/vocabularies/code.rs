//! Code fragments shared by keyword implementations

use crate::codegen::{Builtin, Expr, Name, ScopeValue, ValueSpec};
use crate::compile::context::{KeywordCxt, PropKind, SchemaCxt, SubschemaArgs};
use crate::compile::names::prefix;
use crate::compile::Builder;
use crate::{Error, Result};
use regex::RegexBuilder;
use serde_json::Value;
use std::sync::Arc;

/// `data[prop] !== undefined`, plus an own-property test when configured
pub fn property_in_data(data: Expr, prop: Expr, own_properties: bool) -> Expr {
    let defined = Expr::ne(data.clone().member(prop.clone()), Expr::Undefined);
    if own_properties {
        Expr::and([defined, Expr::call(Builtin::HasOwn, vec![data, prop])])
    } else {
        defined
    }
}

pub fn no_property_in_data(data: Expr, prop: Expr, own_properties: bool) -> Expr {
    let undefined = Expr::eq(data.clone().member(prop.clone()), Expr::Undefined);
    if own_properties {
        Expr::or([undefined, Expr::not(Expr::call(Builtin::HasOwn, vec![data, prop]))])
    } else {
        undefined
    }
}

/// Property names of a `properties`-like keyword value
pub fn all_schema_properties(schema: Option<&Value>) -> Vec<String> {
    match schema {
        Some(Value::Object(map)) => map.keys().filter(|k| *k != "__proto__").cloned().collect(),
        _ => Vec::new(),
    }
}

/// Value of a param set by the keyword, `undefined` when absent
pub fn get_param(cxt: &KeywordCxt<'_, '_>, key: &str) -> Expr {
    cxt.params
        .iter()
        .find(|(k, _)| k == key)
        .map_or(Expr::Undefined, |(_, v)| v.clone())
}

/// Add or replace one param, keeping the others
pub fn set_param(cxt: &mut KeywordCxt<'_, '_>, key: &str, value: Expr) {
    match cxt.params.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => cxt.params.push((key.to_string(), value)),
    }
}

/// Compiled pattern registered in the value scope
pub fn use_pattern(b: &mut Builder<'_>, pattern: &str) -> Result<Name> {
    let key = format!("{}|{}", b.cfg.opts.unicode_regexp, pattern);
    let entry = match b.state.values.get_value(prefix::PATTERN, &key) {
        Some(entry) => entry.clone(),
        None => {
            let regex = RegexBuilder::new(pattern)
                .unicode(b.cfg.opts.unicode_regexp)
                .build()
                .map_err(|e| Error::schema(format!("pattern \"{}\" is invalid: {}", pattern, e)))?;
            let flags = if b.cfg.opts.unicode_regexp { "u" } else { "" };
            b.state.values.value(
                prefix::PATTERN,
                ValueSpec {
                    value: ScopeValue::Regex(Arc::new(regex)),
                    key,
                    code: Some(format!("new RegExp({:?}, {:?})", pattern, flags)),
                },
            )
        }
    };
    Ok(b.gen.scope_value(&entry))
}

/// Call of a compiled schema function on the current data
pub fn call_validate_code(it: &SchemaCxt<'_>, validate: Expr) -> Expr {
    Expr::call(
        Builtin::CallValidate,
        vec![
            validate,
            Expr::var(&it.data),
            Expr::concat([Expr::var(&it.names.instance_path), it.error_path.clone()]),
        ],
    )
}

/// Apply the keyword's schema to every array item; returns the validity variable
pub fn validate_array(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<Name> {
    let schema = cxt.schema;
    let keyword = cxt.keyword.clone();
    let all_errors = cxt.it.all_errors;
    let valid = b.gen.name("valid")?;
    let result = if all_errors {
        b.gen.let_("valid", Some(Expr::bool(true)))?
    } else {
        b.gen.def_name(crate::codegen::VarKind::Var, &valid, Some(Expr::bool(true)));
        valid.clone()
    };
    let len = b.gen.const_("len", Expr::call(Builtin::Len, vec![cxt.data_expr()]))?;
    let i = b.gen.for_range("i", Expr::num(0), Expr::var(&len))?;
    let args = SubschemaArgs::keyword(schema, &keyword).data_prop(Expr::var(&i), PropKind::Num);
    cxt.subschema(b, args, &valid)?;
    b.gen.if_(Expr::not(Expr::var(&valid)));
    if all_errors {
        b.gen.assign_var(&result, Expr::bool(false));
    } else {
        b.gen.break_(None);
    }
    b.gen.end_if()?;
    b.gen.end_for()?;
    Ok(result)
}

/// `anyOf`: valid when any branch passes, keeping branch errors on failure
pub fn validate_union(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let Value::Array(branches) = cxt.schema else {
        return Err(Error::internal(format!("\"{}\" value is not an array", cxt.keyword)));
    };
    let unevaluated = b.cfg.opts.unevaluated();
    let mut always_valid = false;
    for branch in branches {
        if crate::compile::util::always_valid_schema(b, branch)? {
            always_valid = true;
        }
    }
    if always_valid && !unevaluated {
        return Ok(());
    }
    let keyword = cxt.keyword.clone();
    let valid = b.gen.let_("valid", Some(Expr::bool(false)))?;
    let sch_valid = b.gen.name("_valid")?;
    b.gen.block();
    for (i, branch) in branches.iter().enumerate() {
        let args = SubschemaArgs::keyword(branch, &keyword).index(i).composite();
        let sub = cxt.subschema(b, args, &sch_valid)?;
        b.gen.assign_var(&valid, Expr::or([Expr::var(&valid), Expr::var(&sch_valid)]));
        if !cxt.merge_valid_evaluated(b, &sub, &sch_valid)? {
            b.gen.if_(Expr::not(Expr::var(&valid)));
        }
    }
    b.gen.end_block()?;
    cxt.result(b, Expr::var(&valid), true)
}

/// Report `prop` when it is missing, collecting every error
pub fn check_report_missing_prop(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, prop: &str) -> Result<()> {
    let own = b.cfg.opts.own_properties;
    b.gen.if_(no_property_in_data(cxt.data_expr(), Expr::str(prop), own));
    set_param(cxt, "missingProperty", Expr::str(prop));
    cxt.error(b)?;
    b.gen.end_if()
}

/// Report the first missing property of `props`, when `guard` holds.
/// The branch where none is missing stays open.
pub fn check_missing_props(
    cxt: &mut KeywordCxt<'_, '_>,
    b: &mut Builder<'_>,
    props: &[String],
    guard: Option<Expr>,
) -> Result<()> {
    let own = b.cfg.opts.own_properties;
    for (i, prop) in props.iter().enumerate() {
        let missing = no_property_in_data(cxt.data_expr(), Expr::str(prop.clone()), own);
        let cond = match &guard {
            Some(guard) => Expr::and([guard.clone(), missing]),
            None => missing,
        };
        if i == 0 {
            b.gen.if_(cond);
        } else {
            b.gen.else_if(cond)?;
        }
        set_param(cxt, "missingProperty", Expr::str(prop.clone()));
        cxt.error(b)?;
    }
    if !props.is_empty() {
        b.gen.else_()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_in_data_own() {
        let data = Expr::var(&Name::new("data"));
        let plain = property_in_data(data.clone(), Expr::str("a"), false);
        assert!(matches!(plain, Expr::Bin(..)));
        let own = property_in_data(data, Expr::str("a"), true);
        assert!(matches!(own, Expr::And(_)));
    }

    #[test]
    fn test_all_schema_properties_skips_proto() {
        let props = json!({"a": {}, "__proto__": {}, "b": true});
        assert_eq!(all_schema_properties(Some(&props)), vec!["a", "b"]);
        assert!(all_schema_properties(None).is_empty());
    }
}
