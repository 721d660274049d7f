//! Applicator vocabulary: keywords validating the instance against subschemas
//!
//! Composition keywords (`not`, `anyOf`, `oneOf`, `allOf`, `if`) apply
//! subschemas to the same data; object and array keywords apply them to
//! properties and items and record what they evaluated.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::code::{
    all_schema_properties, check_missing_props, check_report_missing_prop, get_param, property_in_data, set_param,
    use_pattern, validate_array, validate_union,
};
use super::{lit, param, KeywordDefinition, KeywordError, Vocabulary};
use crate::codegen::{BinOp, Builtin, Expr, Name, Place, VarKind};
use crate::compile::context::{KeywordCxt, PropKind, SubschemaArgs};
use crate::compile::data_type::JsonType;
use crate::compile::evaluated::{EvaluatedItems, EvaluatedProps};
use crate::compile::util::{always_valid_schema, as_count, check_strict_mode};
use crate::compile::Builder;
use crate::error::StrictCategory;
use crate::options::{Dialect, RemoveAdditional};
use crate::{Error, Result};
use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const SCHEMA: [JsonType; 2] = [JsonType::Object, JsonType::Boolean];

/// Applicators of a dialect; `draft2020` selects `prefixItems` over array `items`
pub fn vocabulary(draft2020: bool) -> Vocabulary {
    let mut vocabulary: Vocabulary = vec![
        not().into(),
        any_of().into(),
        one_of().into(),
        all_of().into(),
        if_().into(),
        then_else("then").into(),
        then_else("else").into(),
        property_names().into(),
        additional_properties().into(),
        dependencies().into(),
        properties().into(),
        pattern_properties().into(),
    ];
    if draft2020 {
        vocabulary.push(prefix_items().into());
        vocabulary.push(items_2020().into());
    } else {
        vocabulary.push(additional_items().into());
        vocabulary.push(items_draft7().into());
    }
    vocabulary.push(contains().into());
    vocabulary
}

/// Keywords split out of `dependencies` and the `contains` bounds
pub fn next_vocabulary() -> Vocabulary {
    vec![
        dependent_required().into(),
        dependent_schemas().into(),
        limit_contains("maxContains").into(),
        limit_contains("minContains").into(),
    ]
}

/// Switch evaluated tracking to runtime variables before code that merges
/// into it conditionally
fn declare_dynamic_evaluated(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    if !b.cfg.opts.unevaluated() {
        return Ok(());
    }
    if !cxt.it.props.is_all() {
        cxt.it.props.dynamic_name(&mut b.gen)?;
    }
    if !cxt.it.items.is_all() {
        cxt.it.items.dynamic_name(&mut b.gen)?;
    }
    Ok(())
}

fn not() -> KeywordDefinition {
    KeywordDefinition::new("not")
        .schema_types(SCHEMA.to_vec())
        .track_errors()
        .error(KeywordError::new(|_| lit("must NOT be valid"), |_| Vec::new()))
        .code(|cxt, b| {
            let schema = cxt.schema;
            if always_valid_schema(b, schema)? {
                return cxt.fail_always(b);
            }
            let valid = b.gen.name("valid")?;
            let args = SubschemaArgs::keyword(schema, "not").composite().all_errors(false);
            cxt.subschema(b, args, &valid)?;
            cxt.fail_result(b, Expr::var(&valid), false)
        })
}

fn any_of() -> KeywordDefinition {
    KeywordDefinition::new("anyOf")
        .schema_types(vec![JsonType::Array])
        .track_errors()
        .error(KeywordError::new(|_| lit("must match a schema in anyOf"), |_| Vec::new()))
        .code(validate_union)
}

fn one_of() -> KeywordDefinition {
    KeywordDefinition::new("oneOf")
        .schema_types(vec![JsonType::Array])
        .track_errors()
        .error(KeywordError::new(
            |_| lit("must match exactly one schema in oneOf"),
            |cxt| vec![param("passingSchemas", get_param(cxt, "passing"))],
        ))
        .code(one_of_code)
}

fn one_of_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let Value::Array(branches) = cxt.schema else {
        return Err(Error::internal("oneOf value is not an array"));
    };
    let valid = b.gen.let_("valid", Some(Expr::bool(false)))?;
    let passing = b.gen.let_("passing", Some(Expr::Lit(Value::Null)))?;
    let sch_valid = b.gen.name("_valid")?;
    cxt.set_params(vec![("passing", Expr::var(&passing))]);
    declare_dynamic_evaluated(cxt, b)?;

    b.gen.block();
    for (i, branch) in branches.iter().enumerate() {
        let sub = if always_valid_schema(b, branch)? {
            b.gen.def_name(VarKind::Var, &sch_valid, Some(Expr::bool(true)));
            None
        } else {
            let args = SubschemaArgs::keyword(branch, "oneOf").index(i).composite();
            Some(cxt.subschema(b, args, &sch_valid)?)
        };
        if i > 0 {
            // A second passing branch: remember both indices and stop
            b.gen.if_(Expr::and([Expr::var(&sch_valid), Expr::var(&valid)]));
            b.gen.assign_var(&valid, Expr::bool(false));
            b.gen.assign_var(
                &passing,
                Expr::Array(vec![Expr::var(&passing), Expr::num(i as u64)]),
            );
            b.gen.else_()?;
        }
        b.gen.if_(Expr::var(&sch_valid));
        b.gen.assign_var(&valid, Expr::bool(true));
        b.gen.assign_var(&passing, Expr::num(i as u64));
        if let Some(sub) = sub {
            cxt.merge_evaluated(b, &sub)?;
        }
        b.gen.end_if()?;
    }
    b.gen.end_block()?;
    cxt.result(b, Expr::var(&valid), true)
}

fn all_of() -> KeywordDefinition {
    KeywordDefinition::new("allOf")
        .schema_types(vec![JsonType::Array])
        .code(|cxt, b| {
            let Value::Array(branches) = cxt.schema else {
                return Err(Error::internal("allOf value is not an array"));
            };
            let valid = b.gen.name("valid")?;
            for (i, branch) in branches.iter().enumerate() {
                if always_valid_schema(b, branch)? {
                    continue;
                }
                let args = SubschemaArgs::keyword(branch, "allOf").index(i);
                let sub = cxt.subschema(b, args, &valid)?;
                cxt.ok(b, Expr::var(&valid));
                cxt.merge_evaluated(b, &sub)?;
            }
            Ok(())
        })
}

fn if_() -> KeywordDefinition {
    KeywordDefinition::new("if")
        .schema_types(SCHEMA.to_vec())
        .track_errors()
        .error(KeywordError::new(
            |cxt| Expr::concat([lit("must match \""), get_param(cxt, "ifClause"), lit("\" schema")]),
            |cxt| vec![param("failingKeyword", get_param(cxt, "ifClause"))],
        ))
        .code(if_code)
}

fn has_schema(b: &Builder<'_>, parent: &Value, keyword: &str) -> Result<bool> {
    match parent.get(keyword) {
        Some(schema) => Ok(!always_valid_schema(b, schema)?),
        None => Ok(false),
    }
}

fn if_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let parent = cxt.parent_schema;
    if parent.get("then").is_none() && parent.get("else").is_none() {
        check_strict_mode(b, StrictCategory::Schema, "\"if\" without \"then\" and \"else\" is ignored")?;
    }
    let has_then = has_schema(b, parent, "then")?;
    let has_else = has_schema(b, parent, "else")?;
    if !has_then && !has_else {
        return Ok(());
    }
    let valid = b.gen.let_("valid", Some(Expr::bool(true)))?;
    let sch_valid = b.gen.name("_valid")?;

    let schema = cxt.schema;
    let args = SubschemaArgs::keyword(schema, "if").composite().all_errors(false);
    let sub = cxt.subschema(b, args, &sch_valid)?;
    cxt.merge_evaluated(b, &sub)?;
    cxt.reset(b)?;
    declare_dynamic_evaluated(cxt, b)?;

    if has_then && has_else {
        let if_clause = b.gen.let_("ifClause", None)?;
        cxt.set_params(vec![("ifClause", Expr::var(&if_clause))]);
        b.gen.if_(Expr::var(&sch_valid));
        validate_clause(cxt, b, "then", &valid, &sch_valid)?;
        b.gen.assign_var(&if_clause, lit("then"));
        b.gen.else_()?;
        validate_clause(cxt, b, "else", &valid, &sch_valid)?;
        b.gen.assign_var(&if_clause, lit("else"));
        b.gen.end_if()?;
    } else if has_then {
        b.gen.if_(Expr::var(&sch_valid));
        validate_clause(cxt, b, "then", &valid, &sch_valid)?;
        b.gen.end_if()?;
        cxt.set_params(vec![("ifClause", lit("then"))]);
    } else {
        b.gen.if_(Expr::not(Expr::var(&sch_valid)));
        validate_clause(cxt, b, "else", &valid, &sch_valid)?;
        b.gen.end_if()?;
        cxt.set_params(vec![("ifClause", lit("else"))]);
    }
    cxt.pass_extra(b, Expr::var(&valid))
}

fn validate_clause(
    cxt: &mut KeywordCxt<'_, '_>,
    b: &mut Builder<'_>,
    keyword: &str,
    valid: &Name,
    sch_valid: &Name,
) -> Result<()> {
    let parent = cxt.parent_schema;
    let Some(schema) = parent.get(keyword) else {
        return Ok(());
    };
    let sub = cxt.subschema(b, SubschemaArgs::keyword(schema, keyword), sch_valid)?;
    b.gen.assign_var(valid, Expr::var(sch_valid));
    cxt.merge_valid_evaluated(b, &sub, valid)?;
    Ok(())
}

fn then_else(keyword: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .schema_types(SCHEMA.to_vec())
        .code(move |cxt, b| {
            if cxt.parent_schema.get("if").is_none() {
                check_strict_mode(b, StrictCategory::Schema, format!("\"{}\" without \"if\" is ignored", keyword))?;
            }
            Ok(())
        })
}

fn property_names() -> KeywordDefinition {
    KeywordDefinition::new("propertyNames")
        .types(vec![JsonType::Object])
        .schema_types(SCHEMA.to_vec())
        .error(KeywordError::new(
            |_| lit("property name must be valid"),
            |cxt| vec![param("propertyName", get_param(cxt, "propertyName"))],
        ))
        .code(|cxt, b| {
            let schema = cxt.schema;
            if always_valid_schema(b, schema)? {
                return Ok(());
            }
            let valid = b.gen.name("valid")?;
            b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(true)));
            let key = b.gen.for_in("key", cxt.data_expr())?;
            cxt.set_params(vec![("propertyName", Expr::var(&key))]);
            let args = SubschemaArgs::keyword(schema, "propertyNames")
                .data_value(key.clone())
                .data_types(vec![JsonType::String])
                .property_name(key.clone())
                .composite();
            cxt.subschema(b, args, &valid)?;
            b.gen.if_(Expr::not(Expr::var(&valid)));
            cxt.error_extra(b)?;
            if !cxt.it.all_errors {
                b.gen.break_(None);
            }
            b.gen.end_if()?;
            b.gen.end_for()?;
            cxt.ok(b, Expr::var(&valid));
            Ok(())
        })
}

fn additional_properties() -> KeywordDefinition {
    KeywordDefinition::new("additionalProperties")
        .types(vec![JsonType::Object])
        .schema_types(SCHEMA.to_vec())
        .track_errors()
        .error(KeywordError::new(
            |_| lit("must NOT have additional properties"),
            |cxt| vec![param("additionalProperty", get_param(cxt, "additionalProperty"))],
        ))
        .code(additional_properties_code)
}

fn additional_properties_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let errs = cxt
        .errs_count
        .clone()
        .ok_or_else(|| Error::internal("additionalProperties does not track errors"))?;
    cxt.it.props = EvaluatedProps::All;
    let remove = b.cfg.opts.remove_additional;
    let schema = cxt.schema;
    if remove != RemoveAdditional::All && always_valid_schema(b, schema)? {
        return Ok(());
    }
    let props = all_schema_properties(cxt.parent_schema.get("properties"));
    let patterns = all_schema_properties(cxt.parent_schema.get("patternProperties"));

    let key = b.gen.for_in("key", cxt.data_expr())?;
    let guarded = !props.is_empty() || !patterns.is_empty();
    if guarded {
        let additional = is_additional(cxt, b, &key, &props, &patterns)?;
        b.gen.if_(additional);
    }
    additional_property_code(cxt, b, &key)?;
    if guarded {
        b.gen.end_if()?;
    }
    b.gen.end_for()?;
    cxt.ok(b, Expr::eq(Expr::var(&errs), Expr::call(Builtin::ErrorCount, vec![])));
    Ok(())
}

fn is_additional(
    cxt: &KeywordCxt<'_, '_>,
    b: &mut Builder<'_>,
    key: &Name,
    props: &[String],
    patterns: &[String],
) -> Result<Expr> {
    let key = Expr::var(key);
    let mut defined = Vec::new();
    if props.len() > 8 {
        let declared = cxt.parent_schema.get("properties").cloned().unwrap_or(Value::Object(Map::new()));
        defined.push(Expr::call(Builtin::HasOwn, vec![Expr::Lit(declared), key.clone()]));
    } else {
        defined.extend(props.iter().map(|p| Expr::eq(key.clone(), Expr::str(p.clone()))));
    }
    for pattern in patterns {
        let regex = use_pattern(b, pattern)?;
        defined.push(Expr::call(Builtin::RegexTest, vec![Expr::var(&regex), key.clone()]));
    }
    Ok(Expr::not(Expr::or(defined)))
}

fn additional_property_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, key: &Name) -> Result<()> {
    let remove = b.cfg.opts.remove_additional;
    let schema = cxt.schema;
    let is_false = schema == &Value::Bool(false);
    let delete = Expr::call(Builtin::DeleteProp, vec![cxt.data_expr(), Expr::var(key)]);
    if remove == RemoveAdditional::All || (remove != RemoveAdditional::Off && is_false) {
        b.gen.code(delete);
        return Ok(());
    }
    if is_false {
        set_param(cxt, "additionalProperty", Expr::var(key));
        cxt.error(b)?;
        if !cxt.it.all_errors {
            b.gen.break_(None);
        }
        return Ok(());
    }
    if !schema.is_object() || always_valid_schema(b, schema)? {
        return Ok(());
    }
    let valid = b.gen.name("valid")?;
    let args = SubschemaArgs::keyword(schema, "additionalProperties").data_prop(Expr::var(key), PropKind::Str);
    if remove == RemoveAdditional::Failing {
        cxt.subschema(b, args.composite().all_errors(false), &valid)?;
        b.gen.if_(Expr::not(Expr::var(&valid)));
        cxt.reset(b)?;
        b.gen.code(delete);
        b.gen.end_if()?;
    } else {
        cxt.subschema(b, args, &valid)?;
        if !cxt.it.all_errors {
            b.gen.if_(Expr::not(Expr::var(&valid)));
            b.gen.break_(None);
            b.gen.end_if()?;
        }
    }
    Ok(())
}

fn properties() -> KeywordDefinition {
    KeywordDefinition::new("properties")
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Object])
        .code(properties_code)
}

fn properties_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    if b.cfg.opts.remove_additional == RemoveAdditional::All && cxt.parent_schema.get("additionalProperties").is_none() {
        let def = b
            .cfg
            .rules
            .get("additionalProperties")
            .cloned()
            .ok_or_else(|| Error::internal("additionalProperties is not registered"))?;
        let rule_type = cxt.rule_type;
        let mut additional = KeywordCxt::new(&mut *cxt.it, b, def, "additionalProperties", rule_type)?;
        additional_properties_code(&mut additional, b)?;
    }

    let schema = cxt.schema;
    let all_props = all_schema_properties(Some(schema));
    if b.cfg.opts.unevaluated() && !all_props.is_empty() && !cxt.it.props.is_all() {
        let names: BTreeSet<String> = all_props.iter().cloned().collect();
        cxt.it.props.merge_static(&mut b.gen, &EvaluatedProps::Names(names))?;
    }
    let mut applied = Vec::new();
    for prop in &all_props {
        if let Some(sub) = schema.get(prop) {
            if !always_valid_schema(b, sub)? {
                applied.push((prop, sub));
            }
        }
    }
    if applied.is_empty() {
        return Ok(());
    }
    let own = b.cfg.opts.own_properties;
    let use_defaults = b.cfg.opts.use_defaults != crate::options::UseDefaults::Off;
    let valid = b.gen.name("valid")?;
    for (prop, sub) in applied {
        let args = SubschemaArgs::keyword(schema, "properties")
            .prop(prop)
            .data_prop(Expr::str(prop.clone()), PropKind::Str);
        let args = SubschemaArgs { schema: sub, ..args };
        let has_default = use_defaults && !cxt.it.composite_rule && sub.get("default").is_some();
        if has_default {
            cxt.subschema(b, args, &valid)?;
        } else {
            b.gen.if_(property_in_data(cxt.data_expr(), Expr::str(prop.clone()), own));
            cxt.subschema(b, args, &valid)?;
            if !cxt.it.all_errors {
                b.gen.else_()?;
                b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(true)));
            }
            b.gen.end_if()?;
        }
        cxt.ok(b, Expr::var(&valid));
    }
    Ok(())
}

fn pattern_properties() -> KeywordDefinition {
    KeywordDefinition::new("patternProperties")
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Object])
        .code(pattern_properties_code)
}

fn pattern_properties_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let schema = cxt.schema;
    let patterns = all_schema_properties(Some(schema));
    let mut always_valid = BTreeSet::new();
    for pattern in &patterns {
        if always_valid_schema(b, &schema[pattern.as_str()])? {
            always_valid.insert(pattern.clone());
        }
    }
    let unevaluated = b.cfg.opts.unevaluated() && !cxt.it.props.is_all();
    if patterns.is_empty() || (always_valid.len() == patterns.len() && !unevaluated) {
        return Ok(());
    }
    let declared = cxt.parent_schema.get("properties").and_then(Value::as_object);
    let props = if unevaluated {
        Some(cxt.it.props.dynamic_name(&mut b.gen)?)
    } else {
        None
    };
    let valid = b.gen.name("valid")?;
    let all_errors = cxt.it.all_errors;

    for pattern in &patterns {
        if let Some(declared) = declared {
            check_matching_properties(b, pattern, declared)?;
        }
        if !all_errors {
            b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(true)));
        }
        let regex = use_pattern(b, pattern)?;
        let key = b.gen.for_in("key", cxt.data_expr())?;
        b.gen.if_(Expr::call(Builtin::RegexTest, vec![Expr::var(&regex), Expr::var(&key)]));
        let is_always_valid = always_valid.contains(pattern);
        if !is_always_valid {
            let args = SubschemaArgs::keyword(schema, "patternProperties")
                .prop(pattern)
                .data_prop(Expr::var(&key), PropKind::Str);
            let args = SubschemaArgs { schema: &schema[pattern.as_str()], ..args };
            cxt.subschema(b, args, &valid)?;
        }
        if let Some(props) = &props {
            b.gen.assign(Place::Member(props.clone(), Expr::var(&key)), Expr::bool(true));
        }
        if !is_always_valid && !all_errors {
            b.gen.if_(Expr::not(Expr::var(&valid)));
            b.gen.break_(None);
            b.gen.end_if()?;
        }
        b.gen.end_if()?;
        b.gen.end_for()?;
        if !all_errors {
            b.gen.if_(Expr::var(&valid));
        }
    }
    Ok(())
}

fn check_matching_properties(b: &Builder<'_>, pattern: &str, declared: &Map<String, Value>) -> Result<()> {
    let Ok(regex) = RegexBuilder::new(pattern).unicode(b.cfg.opts.unicode_regexp).build() else {
        return Ok(());
    };
    for prop in declared.keys() {
        if regex.is_match(prop) {
            check_strict_mode(
                b,
                StrictCategory::Schema,
                format!("property {} matches pattern {} (use allowMatchingProperties)", prop, pattern),
            )?;
        }
    }
    Ok(())
}

fn dependencies_error() -> KeywordError {
    KeywordError::new(
        |cxt| {
            let count = get_param(cxt, "depsCount");
            let noun = if count.as_lit().and_then(Value::as_u64) == Some(1) {
                "property"
            } else {
                "properties"
            };
            Expr::concat([
                lit(format!("must have {} ", noun)),
                get_param(cxt, "deps"),
                lit(" when property "),
                get_param(cxt, "property"),
                lit(" is present"),
            ])
        },
        |cxt| {
            vec![
                param("property", get_param(cxt, "property")),
                param("missingProperty", get_param(cxt, "missingProperty")),
                param("depsCount", get_param(cxt, "depsCount")),
                param("deps", get_param(cxt, "deps")),
            ]
        },
    )
}

fn dependencies() -> KeywordDefinition {
    KeywordDefinition::new("dependencies")
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Object])
        .error(dependencies_error())
        .code(|cxt, b| {
            let mut property_deps = Vec::new();
            let mut schema_deps = Vec::new();
            if let Value::Object(map) = cxt.schema {
                for (prop, deps) in map.iter().filter(|(k, _)| *k != "__proto__") {
                    match deps {
                        Value::Array(_) => property_deps.push((prop, deps)),
                        _ => schema_deps.push((prop, deps)),
                    }
                }
            }
            validate_property_deps(cxt, b, &property_deps)?;
            validate_schema_deps(cxt, b, &schema_deps)
        })
}

fn dependent_required() -> KeywordDefinition {
    KeywordDefinition::new("dependentRequired")
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Object])
        .error(dependencies_error())
        .code(|cxt, b| {
            let deps: Vec<_> = match cxt.schema {
                Value::Object(map) => map.iter().filter(|(k, _)| *k != "__proto__").collect(),
                _ => Vec::new(),
            };
            validate_property_deps(cxt, b, &deps)
        })
}

fn dependent_schemas() -> KeywordDefinition {
    KeywordDefinition::new("dependentSchemas")
        .types(vec![JsonType::Object])
        .schema_types(vec![JsonType::Object])
        .code(|cxt, b| {
            let deps: Vec<_> = match cxt.schema {
                Value::Object(map) => map.iter().filter(|(k, _)| *k != "__proto__").collect(),
                _ => Vec::new(),
            };
            validate_schema_deps(cxt, b, &deps)
        })
}

fn validate_property_deps(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, deps: &[(&String, &Value)]) -> Result<()> {
    let own = b.cfg.opts.own_properties;
    for &(prop, required) in deps {
        let required: Vec<String> = match required {
            Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => {
                return Err(Error::schema_at(
                    format!("dependency of \"{}\" must be an array of property names", prop),
                    cxt.it.err_schema_path.clone(),
                ))
            }
        };
        if required.is_empty() {
            continue;
        }
        let has_property = property_in_data(cxt.data_expr(), Expr::str(prop.clone()), own);
        cxt.set_params(vec![
            ("property", Expr::str(prop.clone())),
            ("depsCount", Expr::num(required.len() as u64)),
            ("deps", Expr::str(required.join(", "))),
        ]);
        if cxt.it.all_errors {
            b.gen.if_(has_property);
            for dep in &required {
                check_report_missing_prop(cxt, b, dep)?;
            }
            b.gen.end_if()?;
        } else {
            check_missing_props(cxt, b, &required, Some(has_property))?;
        }
    }
    Ok(())
}

fn validate_schema_deps(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, deps: &[(&String, &Value)]) -> Result<()> {
    let own = b.cfg.opts.own_properties;
    let keyword = cxt.keyword.clone();
    let parent = cxt.schema;
    let valid = b.gen.name("valid")?;
    for &(prop, schema) in deps {
        if always_valid_schema(b, schema)? {
            continue;
        }
        declare_dynamic_evaluated(cxt, b)?;
        b.gen.if_(property_in_data(cxt.data_expr(), Expr::str(prop.clone()), own));
        let args = SubschemaArgs::keyword(parent, &keyword).prop(prop);
        let args = SubschemaArgs { schema, ..args };
        let sub = cxt.subschema(b, args, &valid)?;
        cxt.merge_valid_evaluated(b, &sub, &valid)?;
        b.gen.else_()?;
        b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(true)));
        b.gen.end_if()?;
        cxt.ok(b, Expr::var(&valid));
    }
    Ok(())
}

fn additional_items_error() -> KeywordError {
    KeywordError::new(
        |cxt| Expr::concat([lit("must NOT have more than "), get_param(cxt, "len"), lit(" items")]),
        |cxt| vec![param("limit", get_param(cxt, "len"))],
    )
}

fn prefix_items() -> KeywordDefinition {
    KeywordDefinition::new("prefixItems")
        .types(vec![JsonType::Array])
        .schema_types(vec![JsonType::Array])
        .before("uniqueItems")
        .code(|cxt, b| validate_tuple(cxt, b, "items"))
}

fn items_2020() -> KeywordDefinition {
    KeywordDefinition::new("items")
        .types(vec![JsonType::Array])
        .schema_types(SCHEMA.to_vec())
        .before("uniqueItems")
        .error(additional_items_error())
        .code(|cxt, b| {
            cxt.it.items = EvaluatedItems::All;
            if always_valid_schema(b, cxt.schema)? {
                return Ok(());
            }
            match cxt.parent_schema.get("prefixItems") {
                Some(Value::Array(prefix)) => validate_additional_items(cxt, b, prefix.len()),
                _ => {
                    let valid = validate_array(cxt, b)?;
                    cxt.ok(b, Expr::var(&valid));
                    Ok(())
                }
            }
        })
}

fn items_draft7() -> KeywordDefinition {
    KeywordDefinition::new("items")
        .types(vec![JsonType::Array])
        .schema_types(vec![JsonType::Object, JsonType::Boolean, JsonType::Array])
        .before("uniqueItems")
        .code(|cxt, b| {
            if cxt.schema.is_array() {
                return validate_tuple(cxt, b, "additionalItems");
            }
            cxt.it.items = EvaluatedItems::All;
            if always_valid_schema(b, cxt.schema)? {
                return Ok(());
            }
            let valid = validate_array(cxt, b)?;
            cxt.ok(b, Expr::var(&valid));
            Ok(())
        })
}

fn additional_items() -> KeywordDefinition {
    KeywordDefinition::new("additionalItems")
        .types(vec![JsonType::Array])
        .schema_types(SCHEMA.to_vec())
        .before("uniqueItems")
        .error(additional_items_error())
        .code(|cxt, b| match cxt.parent_schema.get("items") {
            Some(Value::Array(items)) => validate_additional_items(cxt, b, items.len()),
            _ => check_strict_mode(
                b,
                StrictCategory::Schema,
                "\"additionalItems\" is ignored when \"items\" is not an array of schemas",
            ),
        })
}

/// Schemas applied to the leading items by position
fn validate_tuple(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, extra_items: &str) -> Result<()> {
    let Value::Array(schemas) = cxt.schema else {
        return Err(Error::internal(format!("\"{}\" value is not an array", cxt.keyword)));
    };
    check_strict_tuple(cxt, b, schemas.len(), extra_items)?;
    if b.cfg.opts.unevaluated() && !schemas.is_empty() && !cxt.it.items.is_all() {
        cxt.it.items.merge_static(&mut b.gen, &EvaluatedItems::Count(schemas.len()))?;
    }
    let keyword = cxt.keyword.clone();
    let valid = b.gen.name("valid")?;
    b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(true)));
    let len = b.gen.const_("len", Expr::call(Builtin::Len, vec![cxt.data_expr()]))?;
    for (i, schema) in schemas.iter().enumerate() {
        if always_valid_schema(b, schema)? {
            continue;
        }
        b.gen.if_(Expr::bin(BinOp::Gt, Expr::var(&len), Expr::num(i as u64)));
        let args = SubschemaArgs::keyword(schema, &keyword)
            .index(i)
            .data_prop(Expr::num(i as u64), PropKind::Num);
        cxt.subschema(b, args, &valid)?;
        b.gen.end_if()?;
        cxt.ok(b, Expr::var(&valid));
    }
    Ok(())
}

fn check_strict_tuple(cxt: &KeywordCxt<'_, '_>, b: &Builder<'_>, len: usize, extra_items: &str) -> Result<()> {
    let parent = cxt.parent_schema;
    let bound = |key: &str| parent.get(key).and_then(as_count) == Some(len as u64);
    let full_tuple = bound("minItems") && (bound("maxItems") || parent.get(extra_items) == Some(&Value::Bool(false)));
    if full_tuple {
        return Ok(());
    }
    check_strict_mode(
        b,
        StrictCategory::Tuples,
        format!(
            "\"{}\" is {}-tuple, but minItems or maxItems/{} are not specified or different at path \"{}\"",
            cxt.keyword, len, extra_items, cxt.it.err_schema_path
        ),
    )
}

/// Items past a tuple of `prefix` schemas
fn validate_additional_items(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, prefix: usize) -> Result<()> {
    cxt.it.items = EvaluatedItems::All;
    let schema = cxt.schema;
    let keyword = cxt.keyword.clone();
    let len = b.gen.const_("len", Expr::call(Builtin::Len, vec![cxt.data_expr()]))?;
    let within = Expr::bin(BinOp::Le, Expr::var(&len), Expr::num(prefix as u64));
    if schema == &Value::Bool(false) {
        cxt.set_params(vec![("len", Expr::num(prefix as u64))]);
        return cxt.pass(b, within);
    }
    if !schema.is_object() || always_valid_schema(b, schema)? {
        return Ok(());
    }
    let valid = b.gen.var("valid", Some(within))?;
    b.gen.if_(Expr::not(Expr::var(&valid)));
    let i = b.gen.for_range("i", Expr::num(prefix as u64), Expr::var(&len))?;
    let args = SubschemaArgs::keyword(schema, &keyword).data_prop(Expr::var(&i), PropKind::Num);
    cxt.subschema(b, args, &valid)?;
    if !cxt.it.all_errors {
        b.gen.if_(Expr::not(Expr::var(&valid)));
        b.gen.break_(None);
        b.gen.end_if()?;
    }
    b.gen.end_for()?;
    b.gen.end_if()?;
    cxt.ok(b, Expr::var(&valid));
    Ok(())
}

fn contains() -> KeywordDefinition {
    KeywordDefinition::new("contains")
        .types(vec![JsonType::Array])
        .schema_types(SCHEMA.to_vec())
        .track_errors()
        .error(KeywordError::new(
            |cxt| match get_param(cxt, "max") {
                Expr::Undefined => Expr::concat([
                    lit("must contain at least "),
                    get_param(cxt, "min"),
                    lit(" valid item(s)"),
                ]),
                max => Expr::concat([
                    lit("must contain at least "),
                    get_param(cxt, "min"),
                    lit(" and no more than "),
                    max,
                    lit(" valid item(s)"),
                ]),
            },
            |cxt| {
                let mut params = vec![param("minContains", get_param(cxt, "min"))];
                if let max @ Expr::Lit(_) = get_param(cxt, "max") {
                    params.push(param("maxContains", max));
                }
                params
            },
        ))
        .code(contains_code)
}

fn contains_bound(cxt: &KeywordCxt<'_, '_>, keyword: &str) -> Result<Option<u64>> {
    match cxt.parent_schema.get(keyword) {
        None => Ok(None),
        Some(value) => as_count(value).map(Some).ok_or_else(|| {
            Error::schema_at(
                format!("{} value must be a non-negative integer", keyword),
                cxt.it.err_schema_path.clone(),
            )
        }),
    }
}

fn contains_code(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>) -> Result<()> {
    let (min, max) = if b.cfg.opts.dialect == Dialect::Draft2020 {
        (contains_bound(cxt, "minContains")?.unwrap_or(1), contains_bound(cxt, "maxContains")?)
    } else {
        (1, None)
    };
    let data = cxt.data_expr();
    let len = b.gen.const_("len", Expr::call(Builtin::Len, vec![data.clone()]))?;
    let mut params = vec![("min", Expr::num(min))];
    if let Some(max) = max {
        params.push(("max", Expr::num(max)));
    }
    cxt.set_params(params);

    if max.is_none() && min == 0 {
        return check_strict_mode(
            b,
            StrictCategory::Schema,
            "\"minContains\" == 0 without \"maxContains\": \"contains\" keyword ignored",
        );
    }
    if let Some(max) = max {
        if min > max {
            check_strict_mode(b, StrictCategory::Schema, "\"minContains\" > \"maxContains\" is always invalid")?;
            return cxt.fail_always(b);
        }
    }
    let schema = cxt.schema;
    if always_valid_schema(b, schema)? {
        let mut cond = vec![Expr::bin(BinOp::Ge, Expr::var(&len), Expr::num(min))];
        if let Some(max) = max {
            cond.push(Expr::bin(BinOp::Le, Expr::var(&len), Expr::num(max)));
        }
        return cxt.pass(b, Expr::and(cond));
    }

    cxt.it.items = EvaluatedItems::All;
    let valid = b.gen.name("valid")?;
    if max.is_none() && min == 1 {
        b.gen.def_name(VarKind::Var, &valid, Some(Expr::bool(false)));
        let i = b.gen.for_range("i", Expr::num(0), Expr::var(&len))?;
        contains_item(cxt, b, &i, &valid)?;
        b.gen.if_(Expr::var(&valid));
        b.gen.break_(None);
        b.gen.end_if()?;
        b.gen.end_for()?;
    } else if min == 0 {
        b.gen.def_name(VarKind::Let, &valid, Some(Expr::bool(true)));
        if max.is_some() {
            b.gen.if_(Expr::bin(BinOp::Gt, Expr::var(&len), Expr::num(0)));
            items_with_count(cxt, b, &len, &valid, min, max)?;
            b.gen.end_if()?;
        }
    } else {
        b.gen.def_name(VarKind::Let, &valid, Some(Expr::bool(false)));
        items_with_count(cxt, b, &len, &valid, min, max)?;
    }
    cxt.result(b, Expr::var(&valid), false)
}

fn contains_item(cxt: &mut KeywordCxt<'_, '_>, b: &mut Builder<'_>, i: &Name, valid: &Name) -> Result<()> {
    let schema = cxt.schema;
    let args = SubschemaArgs::keyword(schema, "contains")
        .data_prop(Expr::var(i), PropKind::Num)
        .composite();
    cxt.subschema(b, args, valid)?;
    Ok(())
}

fn items_with_count(
    cxt: &mut KeywordCxt<'_, '_>,
    b: &mut Builder<'_>,
    len: &Name,
    valid: &Name,
    min: u64,
    max: Option<u64>,
) -> Result<()> {
    let sch_valid = b.gen.name("_valid")?;
    let count = b.gen.let_("count", Some(Expr::num(0)))?;
    let i = b.gen.for_range("i", Expr::num(0), Expr::var(len))?;
    contains_item(cxt, b, &i, &sch_valid)?;
    b.gen.if_(Expr::var(&sch_valid));
    b.gen.assign_var(&count, Expr::bin(BinOp::Add, Expr::var(&count), Expr::num(1)));
    match max {
        None => {
            b.gen.if_(Expr::bin(BinOp::Ge, Expr::var(&count), Expr::num(min)));
            b.gen.assign_var(valid, Expr::bool(true));
            b.gen.break_(None);
            b.gen.end_if()?;
        }
        Some(max) => {
            b.gen.if_(Expr::bin(BinOp::Gt, Expr::var(&count), Expr::num(max)));
            b.gen.assign_var(valid, Expr::bool(false));
            b.gen.break_(None);
            b.gen.end_if()?;
            if min == 1 {
                b.gen.assign_var(valid, Expr::bool(true));
            } else {
                b.gen.if_(Expr::bin(BinOp::Ge, Expr::var(&count), Expr::num(min)));
                b.gen.assign_var(valid, Expr::bool(true));
                b.gen.end_if()?;
            }
        }
    }
    b.gen.end_if()?;
    b.gen.end_for()
}

fn limit_contains(keyword: &'static str) -> KeywordDefinition {
    KeywordDefinition::new(keyword)
        .types(vec![JsonType::Array])
        .schema_types(vec![JsonType::Number])
        .code(move |cxt, b| {
            if cxt.parent_schema.get("contains").is_none() {
                check_strict_mode(b, StrictCategory::Schema, format!("\"{}\" without \"contains\" is ignored", keyword))?;
            }
            Ok(())
        })
}
