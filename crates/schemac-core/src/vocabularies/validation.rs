//! Validation vocabulary: assertions on numbers, strings, arrays and objects

use super::code::{check_missing_props, check_report_missing_prop, get_param, no_property_in_data, property_in_data, set_param, use_pattern};
use super::{lit, param, KeywordDefinition, KeywordError, Vocabulary};
use crate::codegen::{BinOp, Builtin, Expr};
use crate::compile::context::KeywordCxt;
use crate::compile::data_type::JsonType;
use crate::compile::Builder;
use crate::error::StrictCategory;
use crate::{Error, Result};
use serde_json::Value;

pub fn vocabulary() -> Vocabulary {
    vec![
        limit_number("maximum", BinOp::Gt, "<=").into(),
        limit_number("minimum", BinOp::Lt, ">=").into(),
        limit_number("exclusiveMaximum", BinOp::Ge, "<").into(),
        limit_number("exclusiveMinimum", BinOp::Le, ">").into(),
        multiple_of().into(),
        limit_length("maxLength", BinOp::Gt, "more").into(),
        limit_length("minLength", BinOp::Lt, "fewer").into(),
        pattern().into(),
        limit_properties("maxProperties", BinOp::Gt, "more").into(),
        limit_properties("minProperties", BinOp::Lt, "fewer").into(),
        required().into(),
        limit_items("maxItems", BinOp::Gt, "more").into(),
        limit_items("minItems", BinOp::Lt, "fewer").into(),
        unique_items().into(),
        const_().into(),
        enum_().into(),
        KeywordDefinition::new("type")
            .schema_types(vec![JsonType::String, JsonType::Array])
            .into(),
        KeywordDefinition::new("nullable")
            .schema_types(vec![JsonType::Boolean])
            .into(),
    ]
}

fn limit_number(keyword: &'static str, fail: BinOp, comparison: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .types(vec![JsonType::Number])
        .schema_types(vec![JsonType::Number])
        .data()
        .error(KeywordError::new(
            move |cxt| Expr::concat([lit(format!("must be {} ", comparison)), cxt.schema_code()]),
            move |cxt| vec![param("comparison", lit(comparison)), param("limit", cxt.schema_code())],
        ))
        .code(move |cxt, b| {
            let cond = Expr::bin(fail, cxt.data_expr(), cxt.schema_code());
            cxt.fail_data(b, cond)
        })
}

fn multiple_of() -> KeywordDefinition {
    KeywordDefinition::new("multipleOf")
        .types(vec![JsonType::Number])
        .schema_types(vec![JsonType::Number])
        .data()
        .error(KeywordError::new(
            |cxt| Expr::concat([lit("must be multiple of "), cxt.schema_code()]),
            |cxt| vec![param("multipleOf", cxt.schema_code())],
        ))
        .code(|cxt, b| {
            let ratio = Expr::bin(BinOp::Div, cxt.data_expr(), cxt.schema_code());
            let mut args = vec![ratio];
            if let Some(precision) = b.cfg.opts.multiple_of_precision {
                args.push(Expr::num(precision));
            }
            let cond = Expr::or([
                Expr::eq(cxt.schema_code(), Expr::num(0)),
                Expr::not(Expr::call(Builtin::IsIntegral, args)),
            ]);
            cxt.fail_data(b, cond)
        })
}

fn limit_length(keyword: &'static str, fail: BinOp, comparison: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .types(vec![JsonType::String])
        .schema_types(vec![JsonType::Number])
        .data()
        .error(KeywordError::new(
            move |cxt| {
                Expr::concat([
                    lit(format!("must NOT have {} than ", comparison)),
                    cxt.schema_code(),
                    lit(" characters"),
                ])
            },
            |cxt| vec![param("limit", cxt.schema_code())],
        ))
        .code(move |cxt, b| {
            let len = Expr::call(Builtin::Ucs2Length, vec![cxt.data_expr()]);
            cxt.fail_data(b, Expr::bin(fail, len, cxt.schema_code()))
        })
}

fn limit_properties(keyword: &'static str, fail: BinOp, comparison: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Number])
        .data()
        .error(KeywordError::new(
            move |cxt| {
                Expr::concat([
                    lit(format!("must NOT have {} than ", comparison)),
                    cxt.schema_code(),
                    lit(" properties"),
                ])
            },
            |cxt| vec![param("limit", cxt.schema_code())],
        ))
        .code(move |cxt, b| {
            let len = Expr::call(Builtin::Len, vec![cxt.data_expr()]);
            cxt.fail_data(b, Expr::bin(fail, len, cxt.schema_code()))
        })
}

fn limit_items(keyword: &'static str, fail: BinOp, comparison: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .types(vec![JsonType::Array])
        .schema_types(vec![JsonType::Number])
        .data()
        .error(KeywordError::new(
            move |cxt| {
                Expr::concat([
                    lit(format!("must NOT have {} than ", comparison)),
                    cxt.schema_code(),
                    lit(" items"),
                ])
            },
            |cxt| vec![param("limit", cxt.schema_code())],
        ))
        .code(move |cxt, b| {
            let len = Expr::call(Builtin::Len, vec![cxt.data_expr()]);
            cxt.fail_data(b, Expr::bin(fail, len, cxt.schema_code()))
        })
}

fn pattern() -> KeywordDefinition {
    KeywordDefinition::new("pattern")
        .types(vec![JsonType::String])
        .schema_types(vec![JsonType::String])
        .data()
        .error(KeywordError::new(
            |cxt| Expr::concat([lit("must match pattern \""), cxt.schema_code(), lit("\"")]),
            |cxt| vec![param("pattern", cxt.schema_code())],
        ))
        .code(|cxt, b| {
            let regex = match (cxt.is_data(), cxt.schema) {
                (false, Value::String(pattern)) => Expr::var(&use_pattern(b, pattern)?),
                _ => cxt.schema_code(),
            };
            let cond = Expr::not(Expr::call(Builtin::RegexTest, vec![regex, cxt.data_expr()]));
            cxt.fail_data(b, cond)
        })
}

fn required() -> KeywordDefinition {
    KeywordDefinition::new("required")
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Array])
        .data()
        .error(KeywordError::new(
            |cxt| {
                Expr::concat([
                    lit("must have required property '"),
                    get_param(cxt, "missingProperty"),
                    lit("'"),
                ])
            },
            |cxt| vec![param("missingProperty", get_param(cxt, "missingProperty"))],
        ))
        .code(required_code)
}

fn required_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let props: Vec<String> = match cxt.schema {
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    };
    if !cxt.is_data() && props.is_empty() {
        return Ok(());
    }
    let use_loop = props.len() >= b.cfg.opts.loop_required;
    let own = b.cfg.opts.own_properties;
    if cxt.it.all_errors {
        if use_loop || cxt.is_data() {
            cxt.block_data(b, None)?;
            let prop = b.gen.for_of("prop", cxt.schema_code())?;
            set_param(cxt, "missingProperty", Expr::var(&prop));
            b.gen.if_(no_property_in_data(cxt.data_expr(), Expr::var(&prop), own));
            cxt.error(b)?;
            b.gen.end_if()?;
            b.gen.end_for()?;
            b.gen.end_block()?;
        } else {
            for prop in &props {
                check_report_missing_prop(cxt, b, prop)?;
            }
        }
    } else if use_loop || cxt.is_data() {
        let valid = b.gen.let_("valid", Some(Expr::bool(true)))?;
        cxt.block_data(b, Some(&valid))?;
        let missing = b.gen.for_of("missing", cxt.schema_code())?;
        set_param(cxt, "missingProperty", Expr::var(&missing));
        b.gen.assign_var(&valid, property_in_data(cxt.data_expr(), Expr::var(&missing), own));
        b.gen.if_(Expr::not(Expr::var(&valid)));
        cxt.error(b)?;
        b.gen.break_(None);
        b.gen.end_if()?;
        b.gen.end_for()?;
        b.gen.end_block()?;
        cxt.ok(b, Expr::var(&valid));
    } else {
        check_missing_props(cxt, b, &props, None)?;
    }

    if !cxt.is_data() {
        let declared = cxt.parent_schema.get("properties");
        for prop in &props {
            if declared.and_then(|p| p.get(prop)).is_none() {
                cxt.strict(
                    b,
                    StrictCategory::Required,
                    format!(
                        "required property \"{}\" is not defined at \"{}\" (strictRequired)",
                        prop,
                        cxt.it.location()
                    ),
                )?;
            }
        }
    }
    Ok(())
}

fn unique_items() -> KeywordDefinition {
    KeywordDefinition::new("uniqueItems")
        .types(vec![JsonType::Array])
        .schema_types(vec![JsonType::Boolean])
        .data()
        .error(KeywordError::new(
            |cxt| {
                Expr::concat([
                    lit("must NOT have duplicate items (items ## "),
                    get_param(cxt, "j"),
                    lit(" and "),
                    get_param(cxt, "i"),
                    lit(" are identical)"),
                ])
            },
            |cxt| vec![param("i", get_param(cxt, "i")), param("j", get_param(cxt, "j"))],
        ))
        .code(unique_items_code)
}

fn unique_items_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    if !cxt.is_data() && cxt.schema != &Value::Bool(true) {
        return Ok(());
    }
    let valid = b.gen.let_("valid", None)?;
    b.gen.block();
    let disabled = Expr::eq(cxt.schema_code(), Expr::bool(false));
    cxt.check_data(b, Some(&valid), Some(disabled))?;

    let data = cxt.data_expr();
    let i = b.gen.let_("i", Some(Expr::call(Builtin::Len, vec![data.clone()])))?;
    let j = b.gen.let_("j", None)?;
    cxt.set_params(vec![("i", Expr::var(&i)), ("j", Expr::var(&j))]);
    b.gen.assign_var(&valid, Expr::bool(true));
    b.gen.if_(Expr::bin(BinOp::Gt, Expr::var(&i), Expr::num(1)));
    let outer = b.gen.name("outer")?;
    b.gen.label(&outer);
    b.gen.for_counted(None, Expr::bin(BinOp::Gt, Expr::var(&i), Expr::num(0)), None);
    b.gen.assign_var(&i, Expr::bin(BinOp::Sub, Expr::var(&i), Expr::num(1)));
    b.gen.assign_var(&j, Expr::var(&i));
    b.gen.for_counted(None, Expr::bin(BinOp::Gt, Expr::var(&j), Expr::num(0)), None);
    b.gen.assign_var(&j, Expr::bin(BinOp::Sub, Expr::var(&j), Expr::num(1)));
    let same = Expr::call(
        Builtin::Equal,
        vec![data.clone().member(Expr::var(&i)), data.member(Expr::var(&j))],
    );
    b.gen.if_(same);
    cxt.error(b)?;
    b.gen.assign_var(&valid, Expr::bool(false));
    b.gen.break_(Some(&outer));
    b.gen.end_if()?;
    b.gen.end_for()?;
    b.gen.end_for()?;
    b.gen.end_label()?;
    b.gen.end_if()?;
    b.gen.end_block()?;
    cxt.ok(b, Expr::var(&valid));
    Ok(())
}

fn const_() -> KeywordDefinition {
    KeywordDefinition::new("const")
        .data()
        .error(KeywordError::new(
            |_| lit("must be equal to constant"),
            |cxt| vec![param("allowedValue", cxt.schema_code())],
        ))
        .code(|cxt, b| {
            let cond = Expr::not(Expr::call(Builtin::Equal, vec![cxt.data_expr(), cxt.schema_code()]));
            cxt.fail_data(b, cond)
        })
}

fn enum_() -> KeywordDefinition {
    KeywordDefinition::new("enum")
        .schema_types(vec![JsonType::Array])
        .data()
        .error(KeywordError::new(
            |_| lit("must be equal to one of the allowed values"),
            |cxt| vec![param("allowedValues", cxt.schema_code())],
        ))
        .code(enum_code)
}

fn enum_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let values: &[Value] = match cxt.schema {
        Value::Array(values) => values,
        _ => &[],
    };
    if !cxt.is_data() && values.is_empty() {
        return Err(Error::schema_at("enum must have non-empty array", cxt.it.err_schema_path.clone()));
    }
    let data = cxt.data_expr();
    let valid = if cxt.is_data() || values.len() >= b.cfg.opts.loop_enum {
        let valid = b.gen.let_("valid", None)?;
        cxt.block_data(b, Some(&valid))?;
        b.gen.assign_var(&valid, Expr::bool(false));
        let v = b.gen.for_of("v", cxt.schema_code())?;
        b.gen.if_(Expr::call(Builtin::Equal, vec![data, Expr::var(&v)]));
        b.gen.assign_var(&valid, Expr::bool(true));
        b.gen.break_(None);
        b.gen.end_if()?;
        b.gen.end_for()?;
        b.gen.end_block()?;
        valid
    } else {
        let matches = values.iter().map(|v| match v {
            Value::Object(_) | Value::Array(_) => Expr::call(Builtin::Equal, vec![data.clone(), Expr::Lit(v.clone())]),
            _ => Expr::eq(data.clone(), Expr::Lit(v.clone())),
        });
        b.gen.let_("valid", Some(Expr::or(matches)))?
    };
    cxt.pass(b, Expr::var(&valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::rules::Rules;

    #[test]
    fn test_validation_keywords_grouped_by_type() {
        let mut rules = Rules::new();
        rules.add_vocabulary(vocabulary()).unwrap();
        let numbers: Vec<_> = rules
            .group(JsonType::Number)
            .unwrap()
            .rules
            .iter()
            .map(|r| r.keyword.as_str())
            .collect();
        assert_eq!(
            numbers,
            vec!["maximum", "minimum", "exclusiveMaximum", "exclusiveMinimum", "multipleOf"]
        );
        assert!(rules.get("required").unwrap().data);
        assert!(rules.groups()[0].rules.iter().any(|r| r.keyword == "enum"));
    }
}
