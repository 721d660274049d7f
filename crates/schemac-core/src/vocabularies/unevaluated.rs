//! `unevaluatedProperties` and `unevaluatedItems`
//!
//! Both run in the post group, after every other keyword has recorded what
//! it evaluated, and apply their schema to the remainder.

use super::code::{get_param, set_param};
use super::{lit, param, KeywordDefinition, KeywordError, Vocabulary};
use crate::codegen::{BinOp, Builtin, Expr, Name, VarKind};
use crate::compile::context::{KeywordCxt, PropKind, SubschemaArgs};
use crate::compile::data_type::JsonType;
use crate::compile::evaluated::{EvaluatedItems, EvaluatedProps};
use crate::compile::util::always_valid_schema;
use crate::compile::Builder;
use crate::{Error, Result};
use serde_json::Value;

pub fn vocabulary() -> Vocabulary {
    vec![unevaluated_properties().into(), unevaluated_items().into()]
}

fn is_type(data: Expr, ty: JsonType) -> Expr {
    Expr::call(Builtin::IsType, vec![data, Expr::str(ty.as_str())])
}

fn unevaluated_properties() -> KeywordDefinition {
    KeywordDefinition::new("unevaluatedProperties")
        .schema_types(vec![JsonType::Object, JsonType::Boolean])
        .post()
        .track_errors()
        .error(KeywordError::new(
            |_| lit("must NOT have unevaluated properties"),
            |cxt| vec![param("unevaluatedProperty", get_param(cxt, "unevaluatedProperty"))],
        ))
        .code(unevaluated_properties_code)
}

fn unevaluated_properties_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let errs = cxt
        .errs_count
        .clone()
        .ok_or_else(|| Error::internal("unevaluatedProperties does not track errors"))?;
    let props = cxt.it.props.clone();
    let data = cxt.data_expr();
    match props {
        EvaluatedProps::All => {}
        EvaluatedProps::Dynamic(evaluated) => {
            b.gen.if_(Expr::and([
                is_type(data.clone(), JsonType::Object),
                Expr::ne(Expr::var(&evaluated), Expr::bool(true)),
            ]));
            let key = b.gen.for_in("key", data)?;
            b.gen.if_(Expr::or([
                Expr::not(Expr::var(&evaluated)),
                Expr::not(Expr::var(&evaluated).member(Expr::var(&key))),
            ]));
            unevaluated_prop_code(cxt, b, &key)?;
            b.gen.end_if()?;
            b.gen.end_for()?;
            b.gen.end_if()?;
        }
        EvaluatedProps::Names(names) => {
            b.gen.if_(is_type(data.clone(), JsonType::Object));
            let key = b.gen.for_in("key", data)?;
            let guarded = !names.is_empty();
            if guarded {
                b.gen.if_(Expr::and(
                    names.iter().map(|p| Expr::ne(Expr::var(&key), Expr::str(p.clone()))),
                ));
            }
            unevaluated_prop_code(cxt, b, &key)?;
            if guarded {
                b.gen.end_if()?;
            }
            b.gen.end_for()?;
            b.gen.end_if()?;
        }
    }
    cxt.it.props = EvaluatedProps::All;
    cxt.ok(b, Expr::eq(Expr::var(&errs), Expr::call(Builtin::ErrorCount, vec![])));
    Ok(())
}

fn unevaluated_prop_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, key: &Name) -> Result<()> {
    let schema = cxt.schema;
    if schema == &Value::Bool(false) {
        set_param(cxt, "unevaluatedProperty", Expr::var(key));
        cxt.error(b)?;
        if !cxt.it.all_errors {
            b.gen.break_(None);
        }
        return Ok(());
    }
    if always_valid_schema(b, schema)? {
        return Ok(());
    }
    let valid = b.gen.name("valid")?;
    let args = SubschemaArgs::keyword(schema, "unevaluatedProperties").data_prop(Expr::var(key), PropKind::Str);
    cxt.subschema(b, args, &valid)?;
    if !cxt.it.all_errors {
        b.gen.if_(Expr::not(Expr::var(&valid)));
        b.gen.break_(None);
        b.gen.end_if()?;
    }
    Ok(())
}

fn unevaluated_items() -> KeywordDefinition {
    KeywordDefinition::new("unevaluatedItems")
        .schema_types(vec![JsonType::Object, JsonType::Boolean])
        .post()
        .error(KeywordError::new(
            |cxt| Expr::concat([lit("must NOT have more than "), get_param(cxt, "len"), lit(" items")]),
            |cxt| vec![param("limit", get_param(cxt, "len"))],
        ))
        .code(unevaluated_items_code)
}

fn unevaluated_items_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let schema = cxt.schema;
    let data = cxt.data_expr();
    let from = match cxt.it.items.clone() {
        EvaluatedItems::All => return Ok(()),
        EvaluatedItems::Count(n) => Expr::num(n as u64),
        EvaluatedItems::Dynamic(items) => {
            // `true` evaluated everything, undefined nothing
            let from = b.gen.let_("evaluated", Some(Expr::var(&items)))?;
            b.gen.if_(Expr::eq(Expr::var(&from), Expr::bool(true)));
            b.gen.assign_var(&from, Expr::call(Builtin::Len, vec![data.clone()]));
            b.gen.end_if()?;
            b.gen.if_(Expr::eq(Expr::var(&from), Expr::Undefined));
            b.gen.assign_var(&from, Expr::num(0));
            b.gen.end_if()?;
            Expr::var(&from)
        }
    };
    let is_array = is_type(data.clone(), JsonType::Array);
    if schema == &Value::Bool(false) {
        cxt.set_params(vec![("len", from.clone())]);
        let len = Expr::call(Builtin::Len, vec![data]);
        cxt.fail(b, Expr::and([is_array, Expr::bin(BinOp::Gt, len, from)]))?;
    } else if schema.is_object() && !always_valid_schema(b, schema)? {
        let valid = b.gen.name("valid")?;
        b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(true)));
        b.gen.if_(is_array);
        let len = b.gen.const_("len", Expr::call(Builtin::Len, vec![data]))?;
        b.gen.assign_var(&valid, Expr::bin(BinOp::Le, Expr::var(&len), from.clone()));
        b.gen.if_(Expr::not(Expr::var(&valid)));
        let i = b.gen.for_range("i", from, Expr::var(&len))?;
        let args = SubschemaArgs::keyword(schema, "unevaluatedItems").data_prop(Expr::var(&i), PropKind::Num);
        cxt.subschema(b, args, &valid)?;
        if !cxt.it.all_errors {
            b.gen.if_(Expr::not(Expr::var(&valid)));
            b.gen.break_(None);
            b.gen.end_if()?;
        }
        b.gen.end_for()?;
        b.gen.end_if()?;
        b.gen.end_if()?;
        cxt.ok(b, Expr::var(&valid));
    }
    cxt.it.items = EvaluatedItems::All;
    Ok(())
}
