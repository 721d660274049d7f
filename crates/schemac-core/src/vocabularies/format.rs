//! `format` and the format comparison keywords

use super::{lit, param, KeywordDefinition, KeywordError, Vocabulary};
use crate::codegen::{BinOp, Builtin, Expr, Name, ScopeValue, ValueSpec};
use crate::compile::context::KeywordCxt;
use crate::compile::data_type::JsonType;
use crate::compile::names::prefix;
use crate::compile::util::check_strict_mode;
use crate::compile::Builder;
use crate::error::{StrictCategory, StrictMode};
use crate::formats::Format;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

pub fn vocabulary() -> Vocabulary {
    vec![
        format().into(),
        format_limit("formatMaximum", BinOp::Gt, "<=").into(),
        format_limit("formatMinimum", BinOp::Lt, ">=").into(),
        format_limit("formatExclusiveMaximum", BinOp::Ge, "<").into(),
        format_limit("formatExclusiveMinimum", BinOp::Le, ">").into(),
    ]
}

/// Format registered in the value scope under its name
fn use_format(b: &mut Builder<'_>, name: &str, format: &Arc<Format>) -> Name {
    let entry = match b.state.values.get_value(prefix::FORMAT, name) {
        Some(entry) => entry.clone(),
        None => b.state.values.value(
            prefix::FORMAT,
            ValueSpec {
                value: ScopeValue::Format(format.clone()),
                key: name.to_string(),
                code: Some(format!("formats[{:?}]", name)),
            },
        ),
    };
    b.gen.scope_value(&entry)
}

fn format() -> KeywordDefinition {
    KeywordDefinition::new("format")
        .types(vec![JsonType::Number, JsonType::String])
        .schema_types(vec![JsonType::String])
        .data()
        .error(KeywordError::new(
            |cxt| Expr::concat([lit("must match format \""), cxt.schema_code(), lit("\"")]),
            |cxt| vec![param("format", cxt.schema_code())],
        ))
        .code(|cxt, b| {
            if !b.cfg.opts.validate_formats {
                return Ok(());
            }
            if cxt.is_data() {
                data_format(cxt, b)
            } else {
                static_format(cxt, b)
            }
        })
}

fn static_format(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let Value::String(name) = cxt.schema else {
        return Err(Error::internal("format value is not a string"));
    };
    let Some(format) = b.cfg.formats.get(name).cloned() else {
        let message = format!(
            "unknown format \"{}\" ignored in schema at path \"{}\"",
            name, cxt.it.err_schema_path
        );
        if b.cfg.opts.strict_schema == StrictMode::Off {
            b.cfg.opts.logger.warn(&message);
            return Ok(());
        }
        return check_strict_mode(b, StrictCategory::Schema, message);
    };
    if format.is_ignored() || Some(format.data_type()) != cxt.rule_type.map(JsonType::as_str) {
        return Ok(());
    }
    let validate = use_format(b, name, &format);
    let valid = Expr::call(Builtin::FormatValidate, vec![Expr::var(&validate), cxt.data_expr()]);
    cxt.pass(b, valid)
}

/// Format named by a `$data` value: dispatch over every registered format
fn data_format(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let known = b.gen.let_("known", Some(Expr::bool(false)))?;
    let valid = b.gen.let_("valid", Some(Expr::bool(true)))?;
    let rule_type = cxt.rule_type.map(JsonType::as_str);
    let names: Vec<String> = b.cfg.formats.names().map(str::to_string).collect();
    for (i, name) in names.iter().enumerate() {
        let Some(format) = b.cfg.formats.get(name).cloned() else {
            continue;
        };
        let cond = Expr::eq(cxt.schema_code(), Expr::str(name.clone()));
        if i == 0 {
            b.gen.if_(cond);
        } else {
            b.gen.else_if(cond)?;
        }
        b.gen.assign_var(&known, Expr::bool(true));
        if !format.is_ignored() && Some(format.data_type()) == rule_type {
            let validate = use_format(b, name, &format);
            b.gen.assign_var(
                &valid,
                Expr::call(Builtin::FormatValidate, vec![Expr::var(&validate), cxt.data_expr()]),
            );
        }
    }
    if !names.is_empty() {
        b.gen.end_if()?;
    }
    let mut fail = vec![Expr::not(Expr::var(&valid))];
    if b.cfg.opts.strict_schema != StrictMode::Off {
        fail.push(Expr::not(Expr::var(&known)));
    }
    cxt.fail_data(b, Expr::or(fail))
}

fn format_limit(keyword: &'static str, fail: BinOp, comparison: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .types(vec![JsonType::String])
        .schema_types(vec![JsonType::String])
        .data()
        .dependencies(&["format"])
        .error(KeywordError::new(
            move |cxt| Expr::concat([lit(format!("must be {} ", comparison)), cxt.schema_code()]),
            move |cxt| vec![param("comparison", lit(comparison)), param("limit", cxt.schema_code())],
        ))
        .code(move |cxt, b| {
            if !b.cfg.opts.validate_formats {
                return Ok(());
            }
            let Some(Value::String(name)) = cxt.parent_schema.get("format") else {
                return Ok(());
            };
            let Some(format) = b.cfg.formats.get(name).cloned() else {
                return Ok(());
            };
            if format.is_ignored() {
                return Ok(());
            }
            if format.compare.is_none() {
                return Err(Error::keyword(
                    keyword,
                    format!("\"{}\": format \"{}\" does not define \"compare\" function", keyword, name),
                ));
            }
            let compare = use_format(b, name, &format);
            let order = Expr::call(
                Builtin::FormatCompare,
                vec![Expr::var(&compare), cxt.data_expr(), cxt.schema_code()],
            );
            cxt.fail_data(b, Expr::bin(fail, order, Expr::num(0)))
        })
}
