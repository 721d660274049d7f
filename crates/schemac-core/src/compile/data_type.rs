//! JSON types, type checks and coercion

use super::context::SchemaCxt;
use super::errors::{report_error, ErrorSpec};
use super::Builder;
use crate::codegen::{Builtin, Expr, Place};
use crate::options::CoerceTypes;
use crate::{Error, Result};
use serde_json::Value;
use std::fmt;

/// JSON data type as named by the `type` keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    pub fn as_str(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
        }
    }

    pub fn parse(s: &str) -> Option<JsonType> {
        Some(match s {
            "null" => JsonType::Null,
            "boolean" => JsonType::Boolean,
            "object" => JsonType::Object,
            "array" => JsonType::Array,
            "number" => JsonType::Number,
            "integer" => JsonType::Integer,
            "string" => JsonType::String,
            _ => return None,
        })
    }

    /// Type of a JSON value; integral numbers are `Integer`
    pub fn of(value: &Value) -> JsonType {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Object(_) => JsonType::Object,
            Value::Array(_) => JsonType::Array,
            Value::Number(n) if n.is_i64() || n.is_u64() => JsonType::Integer,
            Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => JsonType::Integer,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
        }
    }

    /// Keyword group a type belongs to; integers share the number group
    pub fn group(self) -> JsonType {
        match self {
            JsonType::Integer => JsonType::Number,
            t => t,
        }
    }

    fn coercible(self, coerce: CoerceTypes) -> bool {
        match self {
            JsonType::Object => false,
            JsonType::Array => coerce == CoerceTypes::Array,
            _ => coerce != CoerceTypes::Off,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Types declared by a schema's `type` keyword
pub fn get_schema_types(schema: &Value) -> Result<Vec<JsonType>> {
    let mut types = match schema.get("type") {
        None => Vec::new(),
        Some(Value::String(t)) => vec![parse_type(t)?],
        Some(Value::Array(items)) => items
            .iter()
            .map(|t| match t {
                Value::String(t) => parse_type(t),
                other => Err(Error::schema(format!("type must be a string, got {}", other))),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => return Err(Error::schema(format!("type must be a string or array, got {}", other))),
    };
    if schema.get("nullable") == Some(&Value::Bool(true)) {
        if schema.get("type").is_none() {
            return Err(Error::schema("\"nullable\" cannot be used without \"type\""));
        }
        if !types.contains(&JsonType::Null) {
            types.push(JsonType::Null);
        }
    }
    Ok(types)
}

fn parse_type(t: &str) -> Result<JsonType> {
    JsonType::parse(t).ok_or_else(|| Error::schema(format!("type must be JSONType or JSONType[]: {}", t)))
}

/// Types implied by `const`/`enum`; used for strict type diagnostics
pub fn inferred_types(schema: &Value) -> Vec<JsonType> {
    let mut values: Vec<&Value> = Vec::new();
    if let Some(c) = schema.get("const") {
        values.push(c);
    }
    if let Some(Value::Array(items)) = schema.get("enum") {
        values.extend(items.iter());
    }
    let mut types: Vec<JsonType> = values.into_iter().map(JsonType::of).collect();
    types.sort();
    types.dedup();
    types
}

/// Condition true when `data` has the given type
pub fn check_data_type(ty: JsonType, data: Expr) -> Expr {
    Expr::call(Builtin::IsType, vec![data, Expr::str(ty.as_str())])
}

/// Condition true when `data` has one of the types
pub fn check_data_types(types: &[JsonType], data: &Expr) -> Expr {
    Expr::or(types.iter().map(|t| check_data_type(*t, data.clone())))
}

/// Whether the schema has keywords for a type's group; integers never do
pub fn schema_has_rules_for_type(it: &SchemaCxt<'_>, b: &Builder<'_>, ty: JsonType) -> bool {
    match ty {
        JsonType::Number | JsonType::String | JsonType::Array | JsonType::Object => b
            .cfg
            .rules
            .group(ty)
            .is_some_and(|group| group.is_used_by(it.schema)),
        _ => false,
    }
}

/// Check the instance type, coercing when enabled.
/// Returns whether a type check was emitted here.
pub fn coerce_and_check_data_type(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>, types: &[JsonType]) -> Result<bool> {
    let coerce = b.cfg.opts.coerce_types;
    let coerce_to: Vec<JsonType> = types.iter().copied().filter(|t| t.coercible(coerce)).collect();
    let check_types = !types.is_empty()
        && !(coerce_to.is_empty() && types.len() == 1 && schema_has_rules_for_type(it, b, types[0]));
    if check_types {
        let data = Expr::var(&it.data);
        b.gen.if_(Expr::not(check_data_types(types, &data)));
        if coerce_to.is_empty() {
            report_type_error(it, b, types)?;
        } else {
            coerce_data(it, b, types, &coerce_to)?;
        }
        b.gen.end_if()?;
    }
    Ok(check_types)
}

pub fn report_type_error(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>, types: &[JsonType]) -> Result<()> {
    let list = types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",");
    let spec = ErrorSpec::new("type")
        .param("type", Expr::str(list.clone()))
        .message(Expr::str(format!("must be {}", list)))
        .schema_value(Expr::Lit(it.schema.get("type").cloned().unwrap_or(Value::Null)));
    report_error(it, b, &spec)
}

fn coerce_data(it: &mut SchemaCxt<'_>, b: &mut Builder<'_>, types: &[JsonType], coerce_to: &[JsonType]) -> Result<()> {
    let data = Expr::var(&it.data);
    let type_of = Expr::call(Builtin::TypeOf, vec![data.clone()]);
    let data_type = b.gen.let_("dataType", Some(type_of))?;
    let coerced = b.gen.let_("coerced", Some(Expr::Undefined))?;
    let is = |t: &str| Expr::eq(Expr::var(&data_type), Expr::str(t));

    if b.cfg.opts.coerce_types == CoerceTypes::Array {
        let first = data.clone().member(Expr::num(0));
        b.gen.if_(Expr::and([
            Expr::call(Builtin::IsType, vec![data.clone(), Expr::str("array")]),
            Expr::eq(Expr::call(Builtin::Len, vec![data.clone()]), Expr::num(1)),
            check_data_types(types, &first),
        ]));
        b.gen.assign_var(&coerced, first);
        b.gen.end_if()?;
    }

    b.gen.if_(Expr::ne(Expr::var(&coerced), Expr::Undefined));
    for t in coerce_to {
        let to_number = Expr::call(Builtin::ToNumber, vec![data.clone()]);
        let numeric_string = Expr::and([is("string"), Expr::ne(to_number.clone(), Expr::Undefined)]);
        match t {
            JsonType::String => {
                b.gen.else_if(Expr::or([is("number"), is("boolean")]))?;
                b.gen.assign_var(&coerced, Expr::call(Builtin::ToString, vec![data.clone()]));
                b.gen.else_if(Expr::eq(data.clone(), Expr::Lit(Value::Null)))?;
                b.gen.assign_var(&coerced, Expr::str(""));
            }
            JsonType::Number => {
                b.gen.else_if(Expr::or([is("boolean"), Expr::eq(data.clone(), Expr::Lit(Value::Null)), numeric_string]))?;
                b.gen.assign_var(&coerced, to_number);
            }
            JsonType::Integer => {
                let integral = Expr::call(Builtin::IsIntegral, vec![to_number.clone()]);
                b.gen.else_if(Expr::or([
                    is("boolean"),
                    Expr::eq(data.clone(), Expr::Lit(Value::Null)),
                    Expr::and([numeric_string, integral]),
                ]))?;
                b.gen.assign_var(&coerced, to_number);
            }
            JsonType::Boolean => {
                b.gen.else_if(Expr::or([
                    Expr::eq(data.clone(), Expr::str("false")),
                    Expr::eq(data.clone(), Expr::num(0)),
                    Expr::eq(data.clone(), Expr::Lit(Value::Null)),
                ]))?;
                b.gen.assign_var(&coerced, Expr::bool(false));
                b.gen.else_if(Expr::or([
                    Expr::eq(data.clone(), Expr::str("true")),
                    Expr::eq(data.clone(), Expr::num(1)),
                ]))?;
                b.gen.assign_var(&coerced, Expr::bool(true));
            }
            JsonType::Null => {
                b.gen.else_if(Expr::or([
                    Expr::eq(data.clone(), Expr::str("")),
                    Expr::eq(data.clone(), Expr::num(0)),
                    Expr::eq(data.clone(), Expr::bool(false)),
                ]))?;
                b.gen.assign_var(&coerced, Expr::Lit(Value::Null));
            }
            JsonType::Array => {
                b.gen.else_if(Expr::or([
                    is("string"),
                    is("number"),
                    is("boolean"),
                    Expr::eq(data.clone(), Expr::Lit(Value::Null)),
                ]))?;
                b.gen.assign_var(&coerced, Expr::Array(vec![data.clone()]));
            }
            JsonType::Object => {}
        }
    }
    b.gen.else_()?;
    report_type_error(it, b, types)?;
    b.gen.end_if()?;

    b.gen.if_(Expr::ne(Expr::var(&coerced), Expr::Undefined));
    b.gen.assign(Place::Data(data), Expr::var(&coerced));
    b.gen.end_if()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_schema_types() {
        assert_eq!(get_schema_types(&json!({"type": "integer"})).unwrap(), vec![JsonType::Integer]);
        assert_eq!(
            get_schema_types(&json!({"type": ["string", "null"]})).unwrap(),
            vec![JsonType::String, JsonType::Null]
        );
        assert!(get_schema_types(&json!({})).unwrap().is_empty());
        assert!(get_schema_types(&json!({"type": "text"})).is_err());
        assert!(get_schema_types(&json!({"type": 5})).is_err());
    }

    #[test]
    fn test_nullable_adds_null() {
        let types = get_schema_types(&json!({"type": "string", "nullable": true})).unwrap();
        assert_eq!(types, vec![JsonType::String, JsonType::Null]);
        assert!(get_schema_types(&json!({"nullable": true})).is_err());
    }

    #[test]
    fn test_inferred_types() {
        let types = inferred_types(&json!({"enum": [1, "a", 2.5, null]}));
        assert_eq!(types, vec![JsonType::Null, JsonType::Number, JsonType::Integer, JsonType::String]);
    }

    #[test]
    fn test_json_type_of() {
        assert_eq!(JsonType::of(&json!(3)), JsonType::Integer);
        assert_eq!(JsonType::of(&json!(3.5)), JsonType::Number);
        assert_eq!(JsonType::Integer.group(), JsonType::Number);
    }
}
