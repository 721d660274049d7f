//! Compiled validators and validation results

use crate::codegen::render;
use crate::compile::evaluated::EvaluatedInfo;
use crate::logger::SharedLogger;
use crate::runtime::{Completion, ExecutionContext, FnDef, FnId, Interpreter, Program, RtValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One validation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorObject {
    /// JSON pointer to the failing part of the instance
    pub instance_path: String,
    /// `#`-prefixed JSON pointer to the failing keyword
    pub schema_path: String,
    pub keyword: String,
    #[serde(default)]
    pub params: Value,
    /// Set for errors raised while validating property names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Aggregate of errors thrown by async validators
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<ErrorObject>,
}

impl ValidationErrors {
    pub fn new(errors: Vec<ErrorObject>) -> Self {
        Self { errors }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&errors_text(&self.errors, ", ", "data"))
    }
}

/// Human-readable list of errors: `data/age must be >= 0, ...`
pub fn errors_text(errors: &[ErrorObject], separator: &str, data_var: &str) -> String {
    if errors.is_empty() {
        return "No errors".to_string();
    }
    errors
        .iter()
        .map(|e| {
            let message = e.message.as_deref().unwrap_or(&e.keyword);
            format!("{}{} {}", data_var, e.instance_path, message)
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Result of one validation call
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub valid: bool,
    pub errors: Vec<ErrorObject>,
}

/// Everything shared between clones of a validator
#[derive(Debug)]
pub struct CompiledSchema {
    pub(crate) program: Program,
    pub(crate) entry: FnId,
    pub(crate) is_async: bool,
    pub(crate) schema: Arc<Value>,
    pub(crate) env_key: String,
    pub(crate) source: Option<String>,
    pub(crate) evaluated: EvaluatedInfo,
    pub(crate) logger: SharedLogger,
    pub(crate) context: ExecutionContext,
}

/// A compiled schema, callable many times
///
/// `errors` is set by [`Validator::validate`]; concurrent callers should use
/// [`Validator::check`], which returns its own error list.
#[derive(Debug, Clone)]
pub struct Validator {
    inner: Arc<CompiledSchema>,
    pub errors: Option<Vec<ErrorObject>>,
}

impl Validator {
    pub(crate) fn new(inner: CompiledSchema) -> Self {
        Self { inner: Arc::new(inner), errors: None }
    }

    /// Validate in place, recording failures in `errors`
    ///
    /// Coercion, defaults and property removal modify `data`. Internal
    /// failures are logged and reported as invalid.
    pub fn validate(&mut self, data: &mut Value) -> bool {
        match self.check(data) {
            Ok(outcome) => {
                self.errors = (!outcome.valid).then_some(outcome.errors);
                outcome.valid
            }
            Err(err) => {
                self.inner.logger.error(&format!("validation aborted: {}", err));
                self.errors = Some(Vec::new());
                false
            }
        }
    }

    /// Validate without touching shared state
    pub fn check(&self, data: &mut Value) -> Result<Outcome> {
        let program = &self.inner.program;
        let mut interpreter = Interpreter::with_context(program, data, self.inner.context.clone());
        match interpreter.run(self.inner.entry)? {
            Completion::Returned(outcome) => {
                let valid = if self.inner.is_async {
                    outcome.errors.is_empty()
                } else {
                    matches!(outcome.result, RtValue::Json(Value::Bool(true)))
                };
                Ok(Outcome { valid, errors: outcome.errors })
            }
            Completion::Thrown(RtValue::Errors(errors)) => Ok(Outcome { valid: false, errors }),
            Completion::Thrown(other) => Err(Error::internal(format!("validator threw {:?}", other))),
        }
    }

    /// Validate an owned value, returning it (possibly coerced) on success
    pub async fn validate_async(&self, mut data: Value) -> Result<Value> {
        let outcome = self.check(&mut data)?;
        if outcome.valid {
            Ok(data)
        } else {
            Err(Error::Validation(ValidationErrors::new(outcome.errors)))
        }
    }

    pub fn is_async(&self) -> bool {
        self.inner.is_async
    }

    /// Statically known evaluated properties/items of the root schema
    pub fn evaluated(&self) -> &EvaluatedInfo {
        &self.inner.evaluated
    }

    pub fn schema(&self) -> &Value {
        &self.inner.schema
    }

    /// Cache key of the schema environment this validator was compiled from
    pub fn schema_env(&self) -> &str {
        &self.inner.env_key
    }

    /// Rendered source of the entry function, when `code_source` is enabled
    pub fn source(&self) -> Option<&str> {
        self.inner.source.as_deref()
    }

    /// Rendered source of every function reachable from this validator
    pub fn program_source(&self, pretty: bool) -> String {
        self.inner
            .program
            .fns
            .iter()
            .flatten()
            .map(|def| function_source(def, pretty))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether two handles share the same compiled program
    pub fn ptr_eq(&self, other: &Validator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Rendered source of one compiled function
pub(crate) fn function_source(def: &FnDef, pretty: bool) -> String {
    let params = [&def.params.data, &def.params.instance_path, &def.params.root_data]
        .map(|p| p.to_string())
        .join(", ");
    let asyncness = if def.is_async { "async " } else { "" };
    format!("{}function {}({}) {{{}}}", asyncness, def.name, params, render(&def.body, pretty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error(path: &str, message: &str) -> ErrorObject {
        ErrorObject {
            instance_path: path.to_string(),
            schema_path: "#/minimum".to_string(),
            keyword: "minimum".to_string(),
            params: json!({"comparison": ">=", "limit": 0}),
            property_name: None,
            message: Some(message.to_string()),
            schema: None,
            parent_schema: None,
            data: None,
        }
    }

    #[test]
    fn test_errors_text() {
        let errors = vec![error("/age", "must be >= 0"), error("/n", "must be >= 0")];
        assert_eq!(errors_text(&errors, ", ", "data"), "data/age must be >= 0, data/n must be >= 0");
        assert_eq!(errors_text(&[], ", ", "data"), "No errors");
    }

    #[test]
    fn test_error_object_camel_case() {
        let value = serde_json::to_value(error("/age", "must be >= 0")).unwrap();
        assert_eq!(value["instancePath"], "/age");
        assert_eq!(value["schemaPath"], "#/minimum");
        assert!(value.get("parentSchema").is_none());
    }

    #[test]
    fn test_error_object_from_generated_shape() {
        let e: ErrorObject = serde_json::from_value(json!({
            "instancePath": "",
            "schemaPath": "#/required",
            "keyword": "required",
            "params": {"missingProperty": "age"},
            "message": "must have required property 'age'"
        }))
        .unwrap();
        assert_eq!(e.params["missingProperty"], "age");
        assert_eq!(e.data, None);
    }
}
