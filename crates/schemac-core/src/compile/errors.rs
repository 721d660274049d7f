//! Error object construction and reporting in generated code

use super::context::SchemaCxt;
use super::Builder;
use crate::codegen::{Builtin, Expr};
use crate::Result;
use serde_json::Value;

/// Extra locations attached to a keyword error
#[derive(Debug, Clone, Default)]
pub struct ErrorPaths {
    pub instance_path: Option<Expr>,
    pub schema_path: Option<String>,
    pub parent_schema: bool,
}

/// Description of an error a keyword reports
#[derive(Debug, Clone)]
pub struct ErrorSpec {
    pub keyword: String,
    pub params: Vec<(String, Expr)>,
    pub message: Option<Expr>,
    /// Appended to the current instance path
    pub instance_path: Option<Expr>,
    /// Appended to the keyword's schema path
    pub schema_path: Option<String>,
    /// Report at the schema level rather than under the keyword
    pub at_parent: bool,
    /// Keyword value included in verbose errors
    pub schema: Option<Expr>,
}

impl ErrorSpec {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            params: Vec::new(),
            message: None,
            instance_path: None,
            schema_path: None,
            at_parent: false,
            schema: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: Expr) -> Self {
        self.params.push((key.into(), value));
        self
    }

    pub fn message(mut self, message: Expr) -> Self {
        self.message = Some(message);
        self
    }

    pub fn instance_path(mut self, path: Expr) -> Self {
        self.instance_path = Some(path);
        self
    }

    pub fn schema_path(mut self, path: impl Into<String>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    pub fn at_parent(mut self) -> Self {
        self.at_parent = true;
        self
    }

    pub fn schema_value(mut self, schema: Expr) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn paths(mut self, paths: ErrorPaths) -> Self {
        self.instance_path = paths.instance_path;
        self.schema_path = paths.schema_path;
        self.at_parent = paths.parent_schema;
        self
    }
}

/// JSON pointer escaping of one segment
pub fn escape_json_pointer(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

/// Error object literal for the current context
pub fn error_object(it: &SchemaCxt<'_>, b: &Builder<'_>, spec: &ErrorSpec) -> Expr {
    let opts = &b.cfg.opts;
    let mut instance_path = vec![Expr::var(&it.names.instance_path), it.error_path.clone()];
    if let Some(extra) = &spec.instance_path {
        instance_path.push(extra.clone());
    }
    let mut schema_path = if spec.at_parent {
        it.err_schema_path.clone()
    } else {
        format!("{}/{}", it.err_schema_path, escape_json_pointer(&spec.keyword))
    };
    if let Some(extra) = &spec.schema_path {
        schema_path.push_str(extra);
    }
    let mut fields = vec![
        ("instancePath".to_string(), Expr::concat(instance_path)),
        ("schemaPath".to_string(), Expr::str(schema_path)),
        ("keyword".to_string(), Expr::str(spec.keyword.clone())),
        ("params".to_string(), Expr::Object(spec.params.clone())),
    ];
    if opts.messages {
        if let Some(message) = &spec.message {
            fields.push(("message".to_string(), message.clone()));
        }
    }
    if opts.verbose {
        if let Some(schema) = &spec.schema {
            fields.push(("schema".to_string(), schema.clone()));
        }
        fields.push(("parentSchema".to_string(), Expr::Lit(Value::clone(it.schema))));
        fields.push(("data".to_string(), Expr::var(&it.data)));
    }
    if let Some(name) = &it.property_name {
        fields.push(("propertyName".to_string(), Expr::var(name)));
    }
    Expr::Object(fields)
}

/// Report an error: append it when collecting, otherwise fail the function
pub fn report_error(it: &SchemaCxt<'_>, b: &mut Builder<'_>, spec: &ErrorSpec) -> Result<()> {
    let error = error_object(it, b, spec);
    if it.composite_rule || it.all_errors {
        add_error(b, error);
    } else {
        b.gen.code(Expr::call(Builtin::TruncateErrors, vec![Expr::num(0)]));
        add_error(b, error);
        return_errors(it, b);
    }
    Ok(())
}

/// Report an error that accompanies others already appended
pub fn report_extra_error(it: &SchemaCxt<'_>, b: &mut Builder<'_>, spec: &ErrorSpec) -> Result<()> {
    let error = error_object(it, b, spec);
    add_error(b, error);
    if !(it.composite_rule || it.all_errors) {
        return_errors(it, b);
    }
    Ok(())
}

/// Drop errors appended after `errs_count`
pub fn reset_errors_count(b: &mut Builder<'_>, errs_count: Expr) {
    b.gen.code(Expr::call(Builtin::TruncateErrors, vec![errs_count]));
}

fn add_error(b: &mut Builder<'_>, error: Expr) {
    b.gen.code(Expr::call(Builtin::PushError, vec![error]));
}

/// Leave the function with the current errors
pub fn return_errors(it: &SchemaCxt<'_>, b: &mut Builder<'_>) {
    if it.is_async {
        b.gen.throw_(Expr::call(Builtin::NewValidationError, vec![]));
    } else {
        b.gen.return_(Expr::bool(false));
    }
}
