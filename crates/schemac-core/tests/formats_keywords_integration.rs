//! Integration tests for formats, user keywords, strict mode and async schemas

mod test_support;

use schemac_core::codegen::{BinOp, Expr};
use schemac_core::compile::data_type::JsonType;
use schemac_core::{
    Compiler, Dialect, Error, Format, KeywordDefinition, KeywordError, Options, StrictCategory, StrictMode,
};
use serde_json::{json, Value};
use test_support::{assert_invalid, assert_valid, check, compile, compile_with, compiler, CapturingLogger};

mod formats {
    use super::*;

    #[test]
    fn test_builtin_string_formats() {
        let cases = [
            ("email", "a.b@example.com", "a@b@c"),
            ("date", "2024-02-29", "2023-02-29"),
            ("time", "12:30:00Z", "25:00:00Z"),
            ("date-time", "2024-01-01T10:00:00+02:00", "2024-01-01 10:00"),
            ("ipv4", "192.168.0.1", "256.1.1.1"),
            ("ipv6", "::1", "1:::2"),
            ("uuid", "123e4567-e89b-12d3-a456-426614174000", "123e4567"),
            ("uri", "https://example.com/a?b=c", "not a uri"),
            ("hostname", "example.com", "-bad-.com"),
            ("json-pointer", "/a/b~0c", "a/b"),
        ];
        for (format, good, bad) in cases {
            let validator = compile(&json!({"type": "string", "format": format}));
            assert_valid(&validator, &json!(good));
            let (valid, errors) = check(&validator, &json!(bad));
            assert!(!valid, "{} accepted {}", format, bad);
            assert_eq!(errors[0].keyword, "format");
            assert_eq!(errors[0].params["format"], json!(format));
        }
    }

    #[test]
    fn test_string_format_ignores_other_types() {
        let validator = compile(&json!({"format": "email"}));
        assert_valid(&validator, &json!(42));
    }

    #[test]
    fn test_number_format() {
        let validator = compile(&json!({"type": "number", "format": "int32"}));
        assert_valid(&validator, &json!(2147483647));
        assert_eq!(assert_invalid(&validator, &json!(2147483648u64)), vec!["format"]);
        assert_eq!(assert_invalid(&validator, &json!(1.5)), vec!["format"]);
    }

    #[test]
    fn test_format_limits_use_compare() {
        let validator = compile(&json!({
            "type": "string",
            "format": "date",
            "formatMinimum": "2024-01-01",
            "formatExclusiveMaximum": "2025-01-01"
        }));
        assert_valid(&validator, &json!("2024-06-15"));
        assert_eq!(assert_invalid(&validator, &json!("2023-12-31")), vec!["formatMinimum"]);
        assert_eq!(assert_invalid(&validator, &json!("2025-01-01")), vec!["formatExclusiveMaximum"]);
    }

    #[test]
    fn test_format_limit_requires_compare() {
        let mut compiler = compiler();
        let err = compiler
            .compile(&json!({"type": "string", "format": "email", "formatMinimum": "a@b.c"}))
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not define \"compare\" function"));
    }

    #[test]
    fn test_validate_formats_off() {
        let opts = Options {
            validate_formats: false,
            ..Options::default()
        };
        let validator = compile_with(opts, &json!({"format": "email"}));
        assert_valid(&validator, &json!("nope"));
    }

    #[test]
    fn test_unknown_format_is_a_strict_error() {
        let err = compiler().compile(&json!({"format": "colour"})).err().unwrap();
        assert!(err.to_string().contains("unknown format \"colour\""));
    }

    #[test]
    fn test_unknown_format_logged_when_not_strict() {
        let logger = CapturingLogger::default();
        let opts = Options::default().with_strict(StrictMode::Off).with_logger(logger.shared());
        let validator = compile_with(opts, &json!({"format": "colour"}));
        assert_valid(&validator, &json!("anything"));
        assert!(logger.warnings()[0].starts_with("unknown format \"colour\" ignored"));
    }

    #[test]
    fn test_user_format() {
        let mut compiler = compiler();
        compiler.add_format(
            "hex",
            Format::regex(regex::Regex::new("^[0-9a-f]+$").unwrap()),
        );
        let mut validator = compiler.compile(&json!({"type": "string", "format": "hex"})).unwrap();
        assert!(validator.validate(&mut json!("ff00")));
        assert!(!validator.validate(&mut json!("xyz")));
    }

    #[test]
    fn test_format_from_data() {
        let validator = compile_with(
            Options::default().with_data(),
            &json!({
                "properties": {
                    "kind": {"type": "string"},
                    "value": {"type": "string", "format": {"$data": "1/kind"}}
                }
            }),
        );
        assert_valid(&validator, &json!({"kind": "ipv4", "value": "10.0.0.1"}));
        assert_invalid(&validator, &json!({"kind": "ipv4", "value": "10.0.0"}));
        assert_invalid(&validator, &json!({"kind": "no-such-format", "value": "x"}));
        assert_valid(&validator, &json!({"value": "x"}));
    }
}

mod user_keywords {
    use super::*;

    fn range_code() -> KeywordDefinition {
        KeywordDefinition::new("range")
            .types(vec![JsonType::Number])
            .schema_types(vec![JsonType::Array])
            .code(|cxt, b| {
                let (min, max) = match cxt.schema.as_array().map(Vec::as_slice) {
                    Some([min, max]) => (min.clone(), max.clone()),
                    _ => return Err(Error::schema("range expects [min, max]")),
                };
                let data = cxt.data_expr();
                cxt.fail(
                    b,
                    Expr::or([
                        Expr::bin(BinOp::Lt, data.clone(), Expr::Lit(min)),
                        Expr::bin(BinOp::Gt, data, Expr::Lit(max)),
                    ]),
                )
            })
    }

    #[test]
    fn test_code_keyword() {
        let mut compiler = compiler();
        compiler.add_keyword(range_code()).unwrap();
        let validator = compiler.compile(&json!({"range": [1, 5]})).unwrap();
        assert_valid(&validator, &json!(3));
        assert_valid(&validator, &json!("not a number"));
        let (_, errors) = check(&validator, &json!(6));
        assert_eq!(errors[0].keyword, "range");
        assert_eq!(errors[0].message.as_deref(), Some("must pass \"range\" keyword validation"));
    }

    #[test]
    fn test_code_keyword_rejects_bad_value_at_compile() {
        let mut compiler = compiler();
        compiler.add_keyword(range_code()).unwrap();
        assert!(compiler.compile(&json!({"range": [1]})).is_err());
        assert!(compiler.compile(&json!({"range": "1..5"})).is_err());
    }

    #[test]
    fn test_keyword_with_error_template() {
        let mut compiler = compiler();
        compiler
            .add_keyword(range_code().error(KeywordError::new(
                |_cxt| Expr::str("must be within range"),
                |cxt| vec![("range".to_string(), cxt.schema_code())],
            )))
            .unwrap();
        let validator = compiler.compile(&json!({"range": [1, 5]})).unwrap();
        let (_, errors) = check(&validator, &json!(0));
        assert_eq!(errors[0].message.as_deref(), Some("must be within range"));
        assert_eq!(errors[0].params["range"], json!([1, 5]));
    }

    #[test]
    fn test_validate_keyword_sees_parent_schema() {
        let mut compiler = compiler();
        compiler
            .add_keyword(KeywordDefinition::new("sameAsTitle").validate(|_schema, data, parent| {
                parent.get("title") == Some(data)
            }))
            .unwrap();
        let validator = compiler.compile(&json!({"title": "fixed", "sameAsTitle": true})).unwrap();
        assert_valid(&validator, &json!("fixed"));
        assert_eq!(assert_invalid(&validator, &json!("other")), vec!["sameAsTitle"]);
    }

    #[test]
    fn test_macro_keyword_expands_to_schema() {
        let mut compiler = compiler();
        compiler
            .add_keyword(
                KeywordDefinition::new("between")
                    .schema_types(vec![JsonType::Array])
                    .macro_(|schema, _parent| match schema.as_array().map(Vec::as_slice) {
                        Some([min, max]) => Ok(json!({"minimum": min, "maximum": max})),
                        _ => Err(Error::schema("between expects [min, max]")),
                    }),
            )
            .unwrap();
        let validator = compiler.compile(&json!({"between": [1, 3]})).unwrap();
        assert_valid(&validator, &json!(2));
        let (_, errors) = check(&validator, &json!(4));
        let keywords: Vec<_> = errors.iter().map(|e| e.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["maximum", "between"]);
        assert_eq!(errors[0].schema_path, "#/between/maximum");
    }

    #[test]
    fn test_keyword_registration_rules() {
        let mut compiler = compiler();
        assert!(compiler.add_keyword(KeywordDefinition::new("properties")).is_err());
        assert!(compiler.add_keyword(KeywordDefinition::new("bad name!")).is_err());
        compiler.add_keyword(range_code()).unwrap();
        assert!(compiler.add_keyword(range_code()).is_err());
    }

    #[test]
    fn test_vocabulary_of_known_keywords() {
        let mut compiler = compiler();
        compiler
            .add_vocabulary(vec!["x-internal".into(), range_code().into()])
            .unwrap();
        let validator = compiler.compile(&json!({"x-internal": {"any": 1}, "range": [0, 1]})).unwrap();
        assert_valid(&validator, &json!(1));
        assert_invalid(&validator, &json!(2));
    }
}

mod strict {
    use super::*;

    #[test]
    fn test_unknown_keyword_is_an_error() {
        let err = compiler().compile(&json!({"tyype": "string"})).err().unwrap();
        match err {
            Error::Strict { message, category } => {
                assert_eq!(message, "unknown keyword: \"tyype\"");
                assert_eq!(category, StrictCategory::Schema);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_warn_mode_logs_and_compiles() {
        let logger = CapturingLogger::default();
        let opts = Options::default().with_strict(StrictMode::Warn).with_logger(logger.shared());
        let validator = compile_with(opts, &json!({"tyype": "string"}));
        assert_valid(&validator, &json!(1));
        assert_eq!(logger.warnings(), vec!["strict mode: unknown keyword: \"tyype\"".to_string()]);
    }

    #[test]
    fn test_off_mode_is_silent() {
        let logger = CapturingLogger::default();
        let opts = Options::default().with_strict(StrictMode::Off).with_logger(logger.shared());
        compile_with(opts, &json!({"tyype": "string"}));
        assert!(logger.warnings().is_empty());
    }

    #[test]
    fn test_union_types_need_opt_in() {
        let opts = Options::strict();
        let mut compiler = Compiler::new(opts.clone()).unwrap();
        assert!(compiler.compile(&json!({"type": ["string", "number"]})).is_err());
        assert!(compiler.compile(&json!({"type": ["string", "null"]})).is_ok());

        let mut compiler = Compiler::new(Options {
            allow_union_types: true,
            ..opts
        })
        .unwrap();
        assert!(compiler.compile(&json!({"type": ["string", "number"]})).is_ok());
    }

    #[test]
    fn test_strict_types_flags_keyword_without_type() {
        let logger = CapturingLogger::default();
        let opts = Options::default().with_logger(logger.shared());
        compile_with(opts, &json!({"minLength": 1}));
        assert!(logger
            .warnings()
            .iter()
            .any(|w| w.contains("missing type \"string\" for keyword \"minLength\"")));
    }

    #[test]
    fn test_invalid_type_name_fails() {
        assert!(compiler().compile(&json!({"type": "text"})).is_err());
    }

    #[test]
    fn test_keyword_value_type_checked() {
        let err = compiler().compile(&json!({"minimum": "1"})).err().unwrap();
        assert!(matches!(err, Error::Schema { .. } | Error::Keyword { .. }));
    }
}

mod dialects {
    use super::*;

    fn draft7() -> Options {
        Options::default().with_dialect(Dialect::Draft7)
    }

    #[test]
    fn test_draft7_tuple_items() {
        let validator = compile_with(
            draft7(),
            &json!({
                "type": "array",
                "items": [{"type": "string"}, {"type": "number"}],
                "additionalItems": false
            }),
        );
        assert_valid(&validator, &json!(["a", 1]));
        let (_, errors) = check(&validator, &json!(["a", 1, true]));
        assert_eq!(errors[0].keyword, "additionalItems");
    }

    #[test]
    fn test_draft7_dependencies() {
        let validator = compile_with(
            draft7(),
            &json!({
                "dependencies": {
                    "card": ["billing"],
                    "ship": {"required": ["address"]}
                }
            }),
        );
        assert_valid(&validator, &json!({"card": 1, "billing": 1}));
        assert_eq!(assert_invalid(&validator, &json!({"card": 1})), vec!["dependencies"]);
        assert_eq!(assert_invalid(&validator, &json!({"ship": 1})), vec!["required"]);
    }

    #[test]
    fn test_draft7_definitions_ref() {
        let validator = compile_with(
            draft7(),
            &json!({
                "definitions": {"pos": {"type": "integer", "minimum": 1}},
                "items": {"$ref": "#/definitions/pos"}
            }),
        );
        assert_valid(&validator, &json!([1, 2]));
        assert_invalid(&validator, &json!([0]));
    }

    #[test]
    fn test_draft2020_keywords_unknown_in_draft7() {
        let mut compiler = Compiler::new(draft7()).unwrap();
        assert!(compiler.compile(&json!({"prefixItems": [true]})).is_err());
    }
}

mod async_schemas {
    use super::*;

    fn schema() -> Value {
        json!({
            "$async": true,
            "type": "object",
            "properties": {"n": {"type": "integer"}},
            "required": ["n"]
        })
    }

    #[tokio::test]
    async fn test_validate_async_returns_data() {
        let validator = compile_with(Options::default().with_coerce_types(schemac_core::CoerceTypes::Scalar), &schema());
        assert!(validator.is_async());
        let data = validator.validate_async(json!({"n": "4"})).await.unwrap();
        assert_eq!(data, json!({"n": 4}));
    }

    #[tokio::test]
    async fn test_validate_async_rejects_with_errors() {
        let validator = compile(&schema());
        match validator.validate_async(json!({})).await {
            Err(Error::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors.errors[0].keyword, "required");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_sync_check_of_async_schema() {
        let validator = compile(&schema());
        assert_valid(&validator, &json!({"n": 1}));
        assert_eq!(assert_invalid(&validator, &json!({"n": "x"})), vec!["type"]);
    }

    #[test]
    fn test_async_subschema_in_sync_schema_fails() {
        let err = compiler()
            .compile(&json!({"properties": {"a": {"$async": true, "type": "string"}}}))
            .err()
            .unwrap();
        assert!(err.to_string().contains("async schema in sync schema"));
    }

    #[test]
    fn test_async_keyword_requires_async_schema() {
        let mut compiler = compiler();
        compiler
            .add_keyword(KeywordDefinition::new("remoteCheck").is_async().validate(|_, _, _| true))
            .unwrap();
        assert!(compiler.compile(&json!({"remoteCheck": true})).is_err());
        let validator = compiler.compile(&json!({"$async": true, "remoteCheck": true})).unwrap();
        assert_valid(&validator, &json!(1));
    }
}
