//! Property-based tests for compiled validators
//!
//! These tests check invariants that hold for any schema built from the
//! supported keywords and any instance: validation is total and
//! deterministic, and the optimizer and reference inlining do not change
//! outcomes.

mod proptest_strategies;

use proptest::prelude::*;
use proptest_strategies::{json_value_strategy, object_strategy, schema_strategy};
use schemac_core::{CoerceTypes, Compiler, InlineRefs, Options, StrictMode, Validator};
use serde_json::{json, Value};

fn lenient() -> Options {
    Options::default().with_strict(StrictMode::Off)
}

fn build(opts: Options, schema: &Value) -> Validator {
    let mut compiler = Compiler::new(opts).expect("vocabularies register");
    compiler
        .compile(schema)
        .unwrap_or_else(|e| panic!("{} failed to compile: {}", schema, e))
}

/// Validity and failing keywords of one run over a copy of `data`
fn outcome(validator: &Validator, data: &Value) -> (bool, Vec<(String, String)>, Value) {
    let mut data = data.clone();
    let outcome = validator.check(&mut data).expect("validation completes");
    let errors = outcome
        .errors
        .into_iter()
        .map(|e| (e.keyword, e.instance_path))
        .collect();
    (outcome.valid, errors, data)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_validation_is_total(schema in schema_strategy(), data in json_value_strategy()) {
        let validator = build(lenient(), &schema);
        let (valid, errors, after) = outcome(&validator, &data);
        prop_assert_eq!(valid, errors.is_empty());
        prop_assert_eq!(after, data);
    }

    #[test]
    fn prop_validation_is_repeatable(schema in schema_strategy(), data in json_value_strategy()) {
        let validator = build(lenient(), &schema);
        prop_assert_eq!(outcome(&validator, &data), outcome(&validator, &data));
    }

    #[test]
    fn prop_optimizer_preserves_outcome(schema in schema_strategy(), data in json_value_strategy()) {
        let plain = build(lenient().with_optimize(0), &schema);
        let optimized = build(lenient().with_optimize(3), &schema);
        prop_assert_eq!(outcome(&plain, &data), outcome(&optimized, &data));
    }

    #[test]
    fn prop_all_errors_agrees_on_validity(schema in schema_strategy(), data in json_value_strategy()) {
        let fail_fast = build(lenient(), &schema);
        let all = build(lenient().with_all_errors(), &schema);
        let (fast_valid, fast_errors, _) = outcome(&fail_fast, &data);
        let (all_valid, all_errors, _) = outcome(&all, &data);
        prop_assert_eq!(fast_valid, all_valid);
        prop_assert_eq!(fast_errors.is_empty(), all_errors.is_empty());
    }

    #[test]
    fn prop_inlining_preserves_outcome(schema in schema_strategy(), data in object_strategy()) {
        let wrapper = json!({
            "$defs": {"target": schema},
            "properties": {"a": {"$ref": "#/$defs/target"}, "b": {"$ref": "#/$defs/target"}}
        });
        let inlined = build(lenient().with_inline_refs(InlineRefs::Always), &wrapper);
        let called = build(lenient().with_inline_refs(InlineRefs::Never), &wrapper);
        let (inline_valid, inline_errors, _) = outcome(&inlined, &data);
        let (call_valid, call_errors, _) = outcome(&called, &data);
        prop_assert_eq!(inline_valid, call_valid);
        prop_assert_eq!(inline_errors, call_errors);
    }

    #[test]
    fn prop_coercion_is_deterministic(schema in schema_strategy(), data in json_value_strategy()) {
        let opts = lenient().with_coerce_types(CoerceTypes::Array);
        let first = build(opts.clone(), &schema);
        let second = build(opts, &schema);
        prop_assert_eq!(outcome(&first, &data), outcome(&second, &data));
    }
}
