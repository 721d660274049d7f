//! Property-based testing strategies for generating instances and schemas
//!
//! Shared by the property tests in this directory.

#![allow(dead_code)]

use proptest::collection::{hash_map, vec};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for scalar JSON values, numeric strings included
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        (-1000.0f64..1000.0).prop_map(|f| json!(f)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        (-100i64..100).prop_map(|n| Value::String(n.to_string())),
        Just(json!("true")),
        Just(json!("")),
    ]
}

/// Strategy for JSON values with controlled depth
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(
        3,  // max depth
        24, // max size
        5,  // items per collection
        |inner| {
            prop_oneof![
                vec(inner.clone(), 0..5).prop_map(Value::Array),
                hash_map("[a-e]", inner, 0..5).prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Strategy for object instances over the property names `a`..`e`
pub fn object_strategy() -> impl Strategy<Value = Value> {
    hash_map("[a-e]", json_value_strategy(), 0..5).prop_map(|m| Value::Object(m.into_iter().collect()))
}

fn type_name_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("null"),
        Just("boolean"),
        Just("integer"),
        Just("number"),
        Just("string"),
        Just("array"),
        Just("object"),
    ]
}

/// Strategy for leaf schemas: one type plus a keyword applying to it
pub fn leaf_schema_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        type_name_strategy().prop_map(|t| json!({"type": t})),
        (0i64..10).prop_map(|n| json!({"type": "integer", "minimum": n})),
        (1i64..5).prop_map(|n| json!({"type": "number", "multipleOf": n})),
        (0u64..5).prop_map(|n| json!({"type": "string", "maxLength": n})),
        Just(json!({"type": "string", "pattern": "^[a-z]+$"})),
        Just(json!({"enum": [1, "a", null]})),
        Just(json!({"const": true})),
        (0u64..3).prop_map(|n| json!({"type": "array", "minItems": n})),
        Just(json!({"type": "array", "uniqueItems": true})),
        Just(json!(true)),
        Just(json!(false)),
    ]
}

/// Strategy for schemas nesting applicators over leaf schemas
pub fn schema_strategy() -> impl Strategy<Value = Value> {
    leaf_schema_strategy().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            vec(inner.clone(), 1..3).prop_map(|s| json!({"anyOf": s})),
            vec(inner.clone(), 1..3).prop_map(|s| json!({"allOf": s})),
            vec(inner.clone(), 1..3).prop_map(|s| json!({"oneOf": s})),
            inner.clone().prop_map(|s| json!({"not": s})),
            inner.clone().prop_map(|s| json!({"type": "array", "items": s})),
            (hash_map("[a-e]", inner.clone(), 1..3), vec("[a-e]", 0..2)).prop_map(|(props, required)| {
                json!({
                    "type": "object",
                    "properties": props.into_iter().collect::<serde_json::Map<_, _>>(),
                    "required": required
                })
            }),
            (inner.clone(), inner).prop_map(|(i, t)| json!({"if": i, "then": t})),
        ]
    })
}
