//! Integration tests for reference resolution
//!
//! Local and cross-document `$ref`, recursion, dynamic references and
//! asynchronous loading of missing documents.

mod test_support;

use schemac_core::{Compiler, Error, InlineRefs, Options};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use test_support::{assert_invalid, assert_valid, check, compile, compile_with, compiler};

mod local_refs {
    use super::*;

    #[test]
    fn test_ref_to_defs() {
        let validator = compile(&json!({
            "$defs": {"positive": {"type": "integer", "minimum": 1}},
            "properties": {"count": {"$ref": "#/$defs/positive"}}
        }));
        assert_valid(&validator, &json!({"count": 2}));
        let (_, errors) = check(&validator, &json!({"count": 0}));
        assert_eq!(errors[0].instance_path, "/count");
        assert_eq!(errors[0].keyword, "minimum");
    }

    #[test]
    fn test_ref_to_anchor() {
        let validator = compile(&json!({
            "$defs": {"name": {"$anchor": "name", "type": "string"}},
            "items": {"$ref": "#name"}
        }));
        assert_valid(&validator, &json!(["a", "b"]));
        assert_invalid(&validator, &json!(["a", 1]));
    }

    #[test]
    fn test_inlined_and_called_refs_agree() {
        let schema = json!({
            "$defs": {"short": {"type": "string", "maxLength": 3}},
            "properties": {"a": {"$ref": "#/$defs/short"}}
        });
        let inlined = compile_with(Options::default().with_inline_refs(InlineRefs::Always), &schema);
        let called = compile_with(Options::default().with_inline_refs(InlineRefs::Never), &schema);
        for data in [json!({"a": "abc"}), json!({"a": "abcd"}), json!({"a": 3})] {
            let (inline_valid, inline_errors) = check(&inlined, &data);
            let (call_valid, call_errors) = check(&called, &data);
            assert_eq!(inline_valid, call_valid, "{}", data);
            let keywords = |errors: &[schemac_core::ErrorObject]| -> Vec<String> {
                errors.iter().map(|e| e.keyword.clone()).collect()
            };
            assert_eq!(keywords(&inline_errors), keywords(&call_errors));
        }
    }

    #[test]
    fn test_ref_with_sibling_keywords() {
        let validator = compile(&json!({
            "$defs": {"num": {"type": "number"}},
            "$ref": "#/$defs/num",
            "maximum": 10
        }));
        assert_valid(&validator, &json!(5));
        assert_eq!(assert_invalid(&validator, &json!(11)), vec!["maximum"]);
        assert_eq!(assert_invalid(&validator, &json!("5")), vec!["type"]);
    }
}

mod recursion {
    use super::*;

    fn tree() -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": {"type": "integer"},
                "children": {"type": "array", "items": {"$ref": "#"}}
            },
            "required": ["value"]
        })
    }

    #[test]
    fn test_self_reference() {
        let validator = compile(&tree());
        assert_valid(
            &validator,
            &json!({"value": 1, "children": [{"value": 2, "children": [{"value": 3}]}]}),
        );
        let (_, errors) = check(&validator, &json!({"value": 1, "children": [{"value": 2, "children": [{}]}]}));
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].instance_path, "/children/0/children/0");
    }

    #[test]
    fn test_mutual_recursion() {
        let validator = compile(&json!({
            "$ref": "#/$defs/a",
            "$defs": {
                "a": {"type": "object", "properties": {"b": {"$ref": "#/$defs/b"}}},
                "b": {"type": "array", "items": {"$ref": "#/$defs/a"}}
            }
        }));
        assert_valid(&validator, &json!({"b": [{"b": []}, {}]}));
        assert_invalid(&validator, &json!({"b": [{"b": {}}]}));
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        let mut compiler = Compiler::new(Options {
            max_depth: 8,
            ..Options::default()
        })
        .unwrap();
        let validator = compiler.compile(&json!({"items": {"$ref": "#"}})).unwrap();
        let mut deep = json!([]);
        for _ in 0..20 {
            deep = json!([deep]);
        }
        assert!(validator.check(&mut deep).is_err());
    }

    fn nested_arrays(levels: usize) -> Value {
        let mut data = json!([]);
        for _ in 0..levels {
            data = json!([data]);
        }
        data
    }

    #[test]
    fn test_default_depth_limit_is_reached_without_overflow() {
        let mut validator = compile(&json!({"items": {"$ref": "#"}}));
        assert_valid(&validator, &nested_arrays(90));

        let mut deep = nested_arrays(150);
        let err = validator.check(&mut deep).unwrap_err();
        assert!(err.to_string().contains("maximum validation depth 100 exceeded"));
        assert!(!validator.validate(&mut deep));
    }

    #[test]
    fn test_depth_limit_on_small_stack_thread() {
        let handle = std::thread::Builder::new()
            .stack_size(512 * 1024)
            .spawn(|| {
                let validator = compile(&json!({"items": {"$ref": "#"}}));
                let mut deep = nested_arrays(150);
                validator.check(&mut deep).is_err()
            })
            .unwrap();
        assert!(handle.join().unwrap());
    }
}

mod documents {
    use super::*;

    #[test]
    fn test_relative_ref_against_id() {
        let mut compiler = compiler();
        compiler
            .add_schema(
                json!({
                    "$id": "https://example.com/schemas/address",
                    "type": "object",
                    "required": ["street"]
                }),
                None,
            )
            .unwrap();
        let validator = compiler
            .compile(&json!({
                "$id": "https://example.com/schemas/customer",
                "properties": {"address": {"$ref": "address"}}
            }))
            .unwrap();
        assert_valid(&validator, &json!({"address": {"street": "Main"}}));
        assert_eq!(assert_invalid(&validator, &json!({"address": {}})), vec!["required"]);
    }

    #[test]
    fn test_ref_into_nested_resource() {
        let validator = compile(&json!({
            "$id": "https://example.com/root",
            "$defs": {
                "inner": {
                    "$id": "inner",
                    "$defs": {"flag": {"type": "boolean"}}
                }
            },
            "properties": {"on": {"$ref": "inner#/$defs/flag"}}
        }));
        assert_valid(&validator, &json!({"on": true}));
        assert_invalid(&validator, &json!({"on": 1}));
    }

    #[test]
    fn test_ref_by_registered_key() {
        let mut compiler = compiler();
        compiler.add_schema(json!({"type": "string"}), Some("str")).unwrap();
        let validator = compiler.compile(&json!({"items": {"$ref": "str"}})).unwrap();
        assert_valid(&validator, &json!(["a"]));
        assert_invalid(&validator, &json!([1]));
    }

    #[test]
    fn test_removed_document_no_longer_resolves() {
        let mut compiler = compiler();
        compiler
            .add_schema(json!({"$id": "https://example.com/int", "type": "integer"}), None)
            .unwrap();
        assert!(compiler.get_schema("https://example.com/int").unwrap().is_some());
        compiler.remove_schema("https://example.com/int");
        let err = compiler.compile(&json!({"$ref": "https://example.com/int"})).err().unwrap();
        assert!(matches!(err, Error::MissingRef { .. }));
    }
}

mod failures {
    use super::*;

    #[test]
    fn test_missing_ref() {
        let mut compiler = compiler();
        let err = compiler
            .compile(&json!({"properties": {"a": {"$ref": "#/$defs/nope"}}}))
            .err()
            .unwrap();
        match err {
            Error::MissingRef { missing_ref, .. } => assert!(missing_ref.ends_with("#/$defs/nope")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_id() {
        let mut compiler = compiler();
        let err = compiler
            .compile(&json!({
                "$defs": {
                    "a": {"$id": "https://example.com/dup", "type": "string"},
                    "b": {"$id": "https://example.com/dup", "type": "number"}
                }
            }))
            .err()
            .unwrap();
        assert!(matches!(err, Error::AmbiguousRef { .. }));
    }

    #[test]
    fn test_identical_duplicate_is_not_ambiguous() {
        let validator = compile(&json!({
            "$defs": {
                "a": {"$id": "https://example.com/same", "type": "string"},
                "b": {"$id": "https://example.com/same", "type": "string"}
            },
            "$ref": "https://example.com/same"
        }));
        assert_valid(&validator, &json!("x"));
    }
}

mod dynamic_refs {
    use super::*;

    fn tree() -> Value {
        json!({
            "$id": "https://example.com/tree",
            "$dynamicAnchor": "node",
            "type": "object",
            "properties": {
                "data": true,
                "children": {"type": "array", "items": {"$dynamicRef": "#node"}}
            }
        })
    }

    fn strict_tree() -> Value {
        json!({
            "$id": "https://example.com/strict-tree",
            "$dynamicAnchor": "node",
            "$ref": "tree",
            "unevaluatedProperties": false
        })
    }

    #[test]
    fn test_base_tree_allows_extra_properties() {
        let mut compiler = compiler();
        let validator = compiler.compile(&tree()).unwrap();
        assert_valid(&validator, &json!({"children": [{"daat": 1}]}));
    }

    #[test]
    fn test_extended_tree_applies_to_children() {
        let mut compiler = compiler();
        compiler.add_schema(tree(), None).unwrap();
        let validator = compiler.compile(&strict_tree()).unwrap();
        assert_valid(&validator, &json!({"data": 1, "children": [{"data": 2}]}));
        let (valid, errors) = check(&validator, &json!({"children": [{"daat": 1}]}));
        assert!(!valid);
        assert!(errors
            .iter()
            .any(|e| e.keyword == "unevaluatedProperties" && e.instance_path == "/children/0"));
    }

    #[test]
    fn test_dynamic_ref_without_anchor_acts_as_ref() {
        let validator = compile(&json!({
            "$defs": {"str": {"type": "string"}},
            "items": {"$dynamicRef": "#/$defs/str"}
        }));
        assert_valid(&validator, &json!(["a"]));
        assert_invalid(&validator, &json!([1]));
    }
}

mod loading {
    use super::*;

    fn remote() -> HashMap<String, Value> {
        HashMap::from([
            (
                "https://example.com/person".to_string(),
                json!({
                    "$id": "https://example.com/person",
                    "type": "object",
                    "properties": {"name": {"$ref": "name"}},
                    "required": ["name"]
                }),
            ),
            (
                "https://example.com/name".to_string(),
                json!({"$id": "https://example.com/name", "type": "string", "minLength": 1}),
            ),
        ])
    }

    #[tokio::test]
    async fn test_compile_async_loads_each_missing_document() {
        let documents = remote();
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = requested.clone();
        let mut compiler = compiler();

        let validator = compiler
            .compile_async(&json!({"items": {"$ref": "https://example.com/person"}}), |uri| {
                log.lock().unwrap().push(uri.clone());
                let found = documents.get(&uri).cloned();
                async move { found.ok_or_else(|| Error::schema(format!("no document at {}", uri))) }
            })
            .await
            .unwrap();

        assert_valid(&validator, &json!([{"name": "Ada"}]));
        assert_invalid(&validator, &json!([{"name": ""}]));
        assert_eq!(
            *requested.lock().unwrap(),
            vec!["https://example.com/person".to_string(), "https://example.com/name".to_string()]
        );
    }

    #[tokio::test]
    async fn test_compile_async_propagates_loader_errors() {
        let mut compiler = compiler();
        let result = compiler
            .compile_async(&json!({"$ref": "https://example.com/absent"}), |uri| async move {
                Err(Error::schema(format!("no document at {}", uri)))
            })
            .await;
        assert!(result.unwrap_err().to_string().contains("no document at https://example.com/absent"));
    }

    #[tokio::test]
    async fn test_loaded_document_without_fragment_target_fails() {
        let mut compiler = compiler();
        let result = compiler
            .compile_async(&json!({"$ref": "https://example.com/doc#/$defs/missing"}), |_uri| async move {
                Ok(json!({"$id": "https://example.com/doc", "$defs": {}}))
            })
            .await;
        assert!(result.unwrap_err().to_string().contains("cannot be resolved"));
    }
}
