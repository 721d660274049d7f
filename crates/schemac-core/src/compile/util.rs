//! Schema inspection helpers shared by the orchestrator and keywords

use super::data_type::JsonType;
use super::Builder;
use crate::error::{StrictCategory, StrictMode};
use crate::{Error, Result};
use serde_json::Value;

/// Apply a strict-mode rule: fail, warn or ignore depending on the category's mode
pub fn check_strict_mode(b: &Builder<'_>, category: StrictCategory, message: impl Into<String>) -> Result<()> {
    let message = message.into();
    match b.cfg.opts.strict_mode(category) {
        StrictMode::Off => Ok(()),
        StrictMode::Warn => {
            b.cfg.opts.logger.warn(&format!("strict mode: {}", message));
            Ok(())
        }
        StrictMode::Strict => Err(Error::Strict { message, category }),
    }
}

/// Reject keywords no vocabulary knows about
pub fn check_unknown_rules(b: &Builder<'_>, schema: &Value) -> Result<()> {
    if b.cfg.opts.strict_schema == StrictMode::Off {
        return Ok(());
    }
    if let Value::Object(map) = schema {
        for key in map.keys() {
            if !b.cfg.rules.is_known(key) {
                check_strict_mode(b, StrictCategory::Schema, format!("unknown keyword: \"{}\"", key))?;
            }
        }
    }
    Ok(())
}

/// Whether any key of the schema has validation code
pub fn schema_has_rules(b: &Builder<'_>, schema: &Value) -> bool {
    match schema {
        Value::Bool(valid) => !valid,
        Value::Object(map) => map.keys().any(|key| b.cfg.rules.has_rule(key)),
        _ => false,
    }
}

/// Like [`schema_has_rules`] but ignoring `$ref`
pub fn schema_has_rules_but_ref(b: &Builder<'_>, schema: &Value) -> bool {
    match schema {
        Value::Object(map) => map.keys().any(|key| key != "$ref" && b.cfg.rules.has_rule(key)),
        _ => false,
    }
}

/// Schemas that accept everything need no code at all
pub fn always_valid_schema(b: &Builder<'_>, schema: &Value) -> Result<bool> {
    match schema {
        Value::Bool(valid) => Ok(*valid),
        Value::Object(map) if map.is_empty() => Ok(true),
        _ => {
            check_unknown_rules(b, schema)?;
            Ok(!schema_has_rules(b, schema))
        }
    }
}

/// Whether a keyword value is of one of the allowed JSON types
pub fn value_has_type(value: &Value, types: &[JsonType]) -> bool {
    types.is_empty()
        || types.iter().any(|t| match t {
            JsonType::Null => value.is_null(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => JsonType::of(value) == JsonType::Integer,
            JsonType::String => value.is_string(),
        })
}

pub fn unescape_json_pointer(s: &str) -> String {
    s.replace("~1", "/").replace("~0", "~")
}

/// Split a JSON pointer into unescaped segments
pub fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(unescape_json_pointer)
        .collect()
}

/// Non-negative integer keyword value (`minLength`, `maxItems` ...)
pub fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        _ => None,
    }
}
