//! Integration tests for compiled validators
//!
//! Keyword behavior end to end: compile a schema, validate instances,
//! inspect the error objects.

mod test_support;

use schemac_core::{Compiler, Error, Options, StrictCategory, StrictMode};
use serde_json::{json, Value};
use test_support::{assert_invalid, assert_valid, check, compile, compile_with};

fn person_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"age": {"type": "integer", "minimum": 0}},
        "required": ["age"]
    })
}

mod scenarios {
    use super::*;

    #[test]
    fn test_nested_minimum_reports_instance_path() {
        let validator = compile(&person_schema());
        let (valid, errors) = check(&validator, &json!({"age": -1}));
        assert!(!valid);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "minimum");
        assert_eq!(errors[0].instance_path, "/age");
        assert_eq!(errors[0].schema_path, "#/properties/age/minimum");
        assert_eq!(errors[0].message.as_deref(), Some("must be >= 0"));
    }

    #[test]
    fn test_missing_required_property() {
        let validator = compile(&person_schema());
        let (valid, errors) = check(&validator, &json!({}));
        assert!(!valid);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].params["missingProperty"], json!("age"));
        assert_eq!(errors[0].message.as_deref(), Some("must have required property 'age'"));
    }

    #[test]
    fn test_string_coerced_to_number_in_place() {
        let opts = Options::default().with_coerce_types(schemac_core::CoerceTypes::Scalar);
        let mut validator = compile_with(opts, &json!({"type": "number"}));
        let mut data = json!("3.14");
        assert!(validator.validate(&mut data));
        assert_eq!(data, json!(3.14));
    }

    #[test]
    fn test_cyclic_schema_validates_linked_list() {
        let validator = compile(&json!({
            "$ref": "#/$defs/node",
            "$defs": {
                "node": {
                    "type": "object",
                    "properties": {
                        "val": {"type": "number"},
                        "next": {"anyOf": [{"$ref": "#/$defs/node"}, {"type": "null"}]}
                    }
                }
            }
        }));
        assert_valid(&validator, &json!({"val": 1, "next": {"val": 2, "next": null}}));
        assert_invalid(&validator, &json!({"val": 1, "next": {"val": "two", "next": null}}));
    }
}

mod validator_handle {
    use super::*;

    #[test]
    fn test_validate_sets_and_clears_errors() {
        let mut validator = compile(&person_schema());
        assert!(!validator.validate(&mut json!({"age": "x"})));
        assert_eq!(validator.errors.as_ref().map(Vec::len), Some(1));
        assert!(validator.validate(&mut json!({"age": 3})));
        assert!(validator.errors.is_none());
    }

    #[test]
    fn test_revalidating_gives_identical_results() {
        let validator = compile(&person_schema());
        let data = json!({"age": -5});
        assert_eq!(check(&validator, &data), check(&validator, &data));
    }

    #[test]
    fn test_clones_share_program_but_not_errors() {
        let mut a = compile(&person_schema());
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        a.validate(&mut json!({}));
        assert!(a.errors.is_some());
        assert!(b.errors.is_none());
    }

    #[test]
    fn test_errors_text() {
        let mut compiler = Compiler::new(Options::default()).unwrap();
        let mut validator = compiler.compile(&person_schema()).unwrap();
        validator.validate(&mut json!({"age": -1}));
        let text = compiler.errors_text(validator.errors.as_deref().unwrap());
        assert_eq!(text, "data/age must be >= 0");
    }

    #[test]
    fn test_schema_accessor_returns_source_schema() {
        let schema = person_schema();
        let validator = compile(&schema);
        assert_eq!(validator.schema(), &schema);
        assert!(!validator.is_async());
    }
}

mod boolean_schemas {
    use super::*;

    #[test]
    fn test_true_and_false() {
        assert_valid(&compile(&json!(true)), &json!({"anything": [1, 2]}));
        let (valid, errors) = check(&compile(&json!(false)), &json!(1));
        assert!(!valid);
        assert_eq!(errors[0].keyword, "false schema");
        assert_eq!(errors[0].message.as_deref(), Some("boolean schema is false"));
    }

    #[test]
    fn test_false_property_schema() {
        let validator = compile(&json!({"properties": {"secret": false}}));
        assert_valid(&validator, &json!({"public": 1}));
        let (_, errors) = check(&validator, &json!({"secret": 1}));
        assert_eq!(errors[0].instance_path, "/secret");
    }
}

mod types {
    use super::*;

    #[test]
    fn test_integer_rejects_fractions() {
        let validator = compile(&json!({"type": "integer"}));
        assert_valid(&validator, &json!(3));
        assert_valid(&validator, &json!(3.0));
        assert_eq!(assert_invalid(&validator, &json!(3.5)), vec!["type"]);
    }

    #[test]
    fn test_nullable_type_array() {
        let validator = compile(&json!({"type": ["string", "null"], "minLength": 2}));
        assert_valid(&validator, &json!(null));
        assert_valid(&validator, &json!("ab"));
        assert_eq!(assert_invalid(&validator, &json!("a")), vec!["minLength"]);
        assert_eq!(assert_invalid(&validator, &json!(1)), vec!["type"]);
    }

    #[test]
    fn test_keywords_skip_other_types() {
        let validator = compile(&json!({"minimum": 5, "minLength": 3}));
        assert_valid(&validator, &json!("abc"));
        assert_valid(&validator, &json!(7));
        assert_valid(&validator, &json!(null));
        assert_invalid(&validator, &json!(4));
    }

    #[test]
    fn test_type_error_message_lists_types() {
        let validator = compile(&json!({"type": ["string", "number"]}));
        let (_, errors) = check(&validator, &json!(true));
        assert_eq!(errors[0].params["type"], json!("string,number"));
        assert_eq!(errors[0].message.as_deref(), Some("must be string,number"));
    }
}

mod numbers_and_strings {
    use super::*;

    #[test]
    fn test_exclusive_limits() {
        let validator = compile(&json!({"exclusiveMinimum": 0, "exclusiveMaximum": 10}));
        assert_valid(&validator, &json!(5));
        assert_eq!(assert_invalid(&validator, &json!(0)), vec!["exclusiveMinimum"]);
        assert_eq!(assert_invalid(&validator, &json!(10)), vec!["exclusiveMaximum"]);
    }

    #[test]
    fn test_multiple_of() {
        let validator = compile(&json!({"multipleOf": 3}));
        assert_valid(&validator, &json!(9));
        assert_eq!(assert_invalid(&validator, &json!(10)), vec!["multipleOf"]);
    }

    #[test]
    fn test_length_counts_code_points() {
        let validator = compile(&json!({"maxLength": 1}));
        assert_valid(&validator, &json!("é"));
        assert_valid(&validator, &json!("😀"));
        assert_eq!(assert_invalid(&validator, &json!("😀😀")), vec!["maxLength"]);
    }

    #[test]
    fn test_pattern() {
        let validator = compile(&json!({"pattern": "^a+$"}));
        assert_valid(&validator, &json!("aaa"));
        let (_, errors) = check(&validator, &json!("abc"));
        assert_eq!(errors[0].keyword, "pattern");
        assert_eq!(errors[0].params["pattern"], json!("^a+$"));
    }

    #[test]
    fn test_invalid_pattern_fails_compile() {
        let mut compiler = Compiler::new(Options::default()).unwrap();
        assert!(compiler.compile(&json!({"pattern": "("})).is_err());
    }

    #[test]
    fn test_const_and_enum_compare_numbers_by_value() {
        let validator = compile(&json!({"const": {"a": [1, 2]}}));
        assert_valid(&validator, &json!({"a": [1.0, 2]}));
        assert_eq!(assert_invalid(&validator, &json!({"a": [2, 1]})), vec!["const"]);

        let validator = compile(&json!({"enum": ["red", 1, null]}));
        assert_valid(&validator, &json!(1.0));
        assert_valid(&validator, &json!(null));
        let (_, errors) = check(&validator, &json!("blue"));
        assert_eq!(errors[0].keyword, "enum");
        assert_eq!(errors[0].params["allowedValues"], json!(["red", 1, null]));
    }
}

mod arrays {
    use super::*;

    #[test]
    fn test_items_and_prefix_items() {
        let validator = compile(&json!({
            "type": "array",
            "prefixItems": [{"type": "string"}],
            "items": {"type": "integer"}
        }));
        assert_valid(&validator, &json!(["a", 1, 2]));
        let (_, errors) = check(&validator, &json!(["a", 1, "b"]));
        assert_eq!(errors[0].instance_path, "/2");
        assert_eq!(errors[0].keyword, "type");
    }

    #[test]
    fn test_items_false_limits_tuple() {
        let validator = compile(&json!({
            "type": "array",
            "prefixItems": [{"type": "string"}, {"type": "number"}],
            "items": false
        }));
        assert_valid(&validator, &json!(["a", 1]));
        assert_invalid(&validator, &json!(["a", 1, 2]));
    }

    #[test]
    fn test_unique_items() {
        let validator = compile(&json!({"uniqueItems": true}));
        assert_valid(&validator, &json!([1, "1", [1]]));
        let (_, errors) = check(&validator, &json!([1, 2, 1.0]));
        assert_eq!(errors[0].keyword, "uniqueItems");
        assert_eq!(errors[0].params, json!({"i": 2, "j": 0}));
    }

    #[test]
    fn test_contains_with_bounds() {
        let validator = compile(&json!({
            "contains": {"type": "integer"},
            "minContains": 2,
            "maxContains": 3
        }));
        assert_valid(&validator, &json!([1, "a", 2]));
        assert_eq!(assert_invalid(&validator, &json!([1, "a"])), vec!["contains"]);
        assert_eq!(assert_invalid(&validator, &json!([1, 2, 3, 4])), vec!["contains"]);
    }

    #[test]
    fn test_contains_zero_min_allows_empty() {
        let schema = json!({"contains": {"type": "integer"}, "minContains": 0});
        let opts = Options::default().with_strict(StrictMode::Off);
        let validator = compile_with(opts, &schema);
        assert_valid(&validator, &json!([]));
        assert_valid(&validator, &json!(["a"]));
    }

    #[test]
    fn test_contains_zero_min_is_strict_error() {
        let err = Compiler::new(Options::default())
            .unwrap()
            .compile(&json!({"contains": {"type": "integer"}, "minContains": 0}))
            .unwrap_err();
        assert!(matches!(err, Error::Strict { category: StrictCategory::Schema, .. }));
        assert!(err.to_string().contains("\"contains\" keyword ignored"));
    }

    #[test]
    fn test_item_counts() {
        let validator = compile(&json!({"minItems": 1, "maxItems": 2}));
        assert_eq!(assert_invalid(&validator, &json!([])), vec!["minItems"]);
        assert_eq!(assert_invalid(&validator, &json!([1, 2, 3])), vec!["maxItems"]);
    }
}

mod objects {
    use super::*;

    #[test]
    fn test_additional_properties_false() {
        let validator = compile(&json!({
            "properties": {"a": {}},
            "patternProperties": {"^x-": {}},
            "additionalProperties": false
        }));
        assert_valid(&validator, &json!({"a": 1, "x-extra": 2}));
        let (_, errors) = check(&validator, &json!({"a": 1, "b": 2}));
        assert_eq!(errors[0].keyword, "additionalProperties");
        assert_eq!(errors[0].params["additionalProperty"], json!("b"));
    }

    #[test]
    fn test_additional_properties_schema() {
        let validator = compile(&json!({"properties": {"a": {}}, "additionalProperties": {"type": "string"}}));
        assert_valid(&validator, &json!({"a": 1, "b": "x"}));
        let (_, errors) = check(&validator, &json!({"b": 2}));
        assert_eq!(errors[0].instance_path, "/b");
    }

    #[test]
    fn test_pattern_properties() {
        let validator = compile(&json!({"patternProperties": {"^n_": {"type": "number"}}}));
        assert_valid(&validator, &json!({"n_a": 1, "other": "x"}));
        let (_, errors) = check(&validator, &json!({"n_a": "x"}));
        assert_eq!(errors[0].instance_path, "/n_a");
    }

    #[test]
    fn test_property_names() {
        let validator = compile(&json!({"propertyNames": {"maxLength": 3}}));
        assert_valid(&validator, &json!({"abc": 1}));
        let (_, errors) = check(&validator, &json!({"abcd": 1}));
        assert!(errors.iter().any(|e| e.keyword == "propertyNames"));
    }

    #[test]
    fn test_dependent_required_and_schemas() {
        let validator = compile(&json!({
            "dependentRequired": {"card": ["billing"]},
            "dependentSchemas": {"ship": {"required": ["address"]}}
        }));
        assert_valid(&validator, &json!({"card": 1, "billing": 2}));
        assert_valid(&validator, &json!({"billing": 2}));
        let (_, errors) = check(&validator, &json!({"card": 1}));
        assert_eq!(errors[0].keyword, "dependentRequired");
        assert_eq!(errors[0].params["missingProperty"], json!("billing"));
        assert_eq!(errors[0].params["property"], json!("card"));
        assert_eq!(assert_invalid(&validator, &json!({"ship": true})), vec!["required"]);
    }

    #[test]
    fn test_property_counts() {
        let validator = compile(&json!({"minProperties": 1, "maxProperties": 1}));
        assert_eq!(assert_invalid(&validator, &json!({})), vec!["minProperties"]);
        assert_eq!(assert_invalid(&validator, &json!({"a": 1, "b": 2})), vec!["maxProperties"]);
    }
}

mod composition {
    use super::*;

    #[test]
    fn test_all_of() {
        let validator = compile(&json!({"allOf": [{"minimum": 1}, {"maximum": 3}]}));
        assert_valid(&validator, &json!(2));
        assert_eq!(assert_invalid(&validator, &json!(5)), vec!["maximum"]);
    }

    #[test]
    fn test_any_of_reports_branch_errors_then_any_of() {
        let validator = compile(&json!({"anyOf": [{"type": "string"}, {"minimum": 10}]}));
        assert_valid(&validator, &json!("x"));
        assert_valid(&validator, &json!(12));
        let keywords = assert_invalid(&validator, &json!(1));
        assert_eq!(keywords.last().map(String::as_str), Some("anyOf"));
    }

    #[test]
    fn test_one_of_reports_passing_schemas() {
        let validator = compile(&json!({"oneOf": [{"type": "integer"}, {"minimum": 2}]}));
        assert_valid(&validator, &json!(1));
        assert_valid(&validator, &json!(2.5));
        let (valid, errors) = check(&validator, &json!(3));
        assert!(!valid);
        let one_of = errors.iter().find(|e| e.keyword == "oneOf").unwrap();
        assert_eq!(one_of.params["passingSchemas"], json!([0, 1]));
        assert_eq!(one_of.message.as_deref(), Some("must match exactly one schema in oneOf"));
    }

    #[test]
    fn test_not() {
        let validator = compile(&json!({"not": {"type": "string"}}));
        assert_valid(&validator, &json!(1));
        let (_, errors) = check(&validator, &json!("s"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "not");
    }

    #[test]
    fn test_if_then_else() {
        let validator = compile_with(Options::default().with_all_errors(), &json!({
            "if": {"properties": {"kind": {"const": "a"}}},
            "then": {"required": ["alpha"]},
            "else": {"required": ["beta"]}
        }));
        assert_valid(&validator, &json!({"kind": "a", "alpha": 1}));
        assert_valid(&validator, &json!({"kind": "b", "beta": 1}));
        let (_, errors) = check(&validator, &json!({"kind": "a"}));
        let if_error = errors.iter().find(|e| e.keyword == "if").unwrap();
        assert_eq!(if_error.params["failingKeyword"], json!("then"));
        let (_, errors) = check(&validator, &json!({"kind": "b"}));
        assert!(errors.iter().any(|e| e.params["failingKeyword"] == json!("else")));
    }

    #[test]
    fn test_if_then_fail_fast_reports_branch_error_only() {
        let validator = compile(&json!({
            "if": {"properties": {"kind": {"const": "a"}}},
            "then": {"required": ["alpha"]}
        }));
        let (valid, errors) = check(&validator, &json!({"kind": "a"}));
        assert!(!valid);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].schema_path, "#/then/required");
    }

    #[test]
    fn test_then_without_if_is_ignored() {
        let opts = Options::default().with_strict(StrictMode::Off);
        let validator = compile_with(opts, &json!({"then": {"required": ["a"]}}));
        assert_valid(&validator, &json!({}));
    }
}

mod error_modes {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"},
                "b": {"minimum": 5}
            },
            "required": ["a", "b", "c"]
        })
    }

    #[test]
    fn test_fail_fast_reports_first_failure() {
        let validator = compile(&schema());
        let (_, errors) = check(&validator, &json!({"a": 1, "b": 1}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].params["missingProperty"], json!("c"));
    }

    #[test]
    fn test_all_errors_collects_every_failure() {
        let validator = compile_with(Options::default().with_all_errors(), &schema());
        let (_, errors) = check(&validator, &json!({"a": 1, "b": 1}));
        let mut found: Vec<(String, String)> = errors
            .iter()
            .map(|e| (e.keyword.clone(), e.instance_path.clone()))
            .collect();
        found.sort();
        assert_eq!(
            found,
            vec![
                ("minimum".to_string(), "/b".to_string()),
                ("required".to_string(), "".to_string()),
                ("type".to_string(), "/a".to_string()),
            ]
        );
    }

    #[test]
    fn test_all_errors_reports_every_missing_property() {
        let validator = compile_with(Options::default().with_all_errors(), &schema());
        let (_, errors) = check(&validator, &json!({}));
        let missing: Vec<_> = errors
            .iter()
            .filter(|e| e.keyword == "required")
            .map(|e| e.params["missingProperty"].clone())
            .collect();
        assert_eq!(missing, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_verbose_errors_carry_schema_and_data() {
        let validator = compile_with(Options::default().with_verbose(), &json!({"minimum": 3}));
        let (_, errors) = check(&validator, &json!(1));
        assert_eq!(errors[0].schema, Some(json!(3)));
        assert_eq!(errors[0].parent_schema, Some(json!({"minimum": 3})));
        assert_eq!(errors[0].data, Some(json!(1)));
    }
}

mod data_references {
    use super::*;

    #[test]
    fn test_relative_data_pointer() {
        let validator = compile_with(
            Options::default().with_data(),
            &json!({
                "properties": {
                    "low": {"type": "number"},
                    "high": {"type": "number", "minimum": {"$data": "1/low"}}
                }
            }),
        );
        assert_valid(&validator, &json!({"low": 1, "high": 2}));
        assert_eq!(assert_invalid(&validator, &json!({"low": 3, "high": 2})), vec!["minimum"]);
    }

    #[test]
    fn test_missing_data_value_skips_keyword() {
        let validator = compile_with(
            Options::default().with_data(),
            &json!({"properties": {"high": {"minimum": {"$data": "1/low"}}}}),
        );
        assert_valid(&validator, &json!({"high": 2}));
    }

    #[test]
    fn test_data_const() {
        let validator = compile_with(
            Options::default().with_data(),
            &json!({"properties": {"confirm": {"const": {"$data": "1/password"}}}}),
        );
        assert_valid(&validator, &json!({"password": "x", "confirm": "x"}));
        assert_invalid(&validator, &json!({"password": "x", "confirm": "y"}));
    }
}
