//! Keyword definitions and the built-in vocabularies
//!
//! A [`KeywordDefinition`] says which data types a keyword applies to, what
//! its value may be, and how it is implemented: an IR generator (`code`), a
//! runtime predicate (`validate`) or a schema expansion (`macro`).
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

pub mod applicator;
pub mod code;
pub mod core;
pub mod dynamic;
pub mod format;
pub mod metadata;
pub mod unevaluated;
pub mod validation;

use crate::codegen::Expr;
use crate::compile::context::KeywordCxt;
use crate::compile::data_type::JsonType;
use crate::compile::Builder;
use crate::options::Dialect;
use crate::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// IR generator of a keyword
pub type CodeFn = Arc<dyn Fn(&mut KeywordCxt<'_, '_>, &mut Builder<'_>) -> Result<()> + Send + Sync>;

/// Runtime predicate of a keyword: `(keyword value, data, parent schema)`
pub type KeywordValidateFn = Arc<dyn Fn(&Value, &Value, &Value) -> bool + Send + Sync>;

/// Expansion of a keyword into a schema: `(keyword value, parent schema)`
pub type MacroFn = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;

type MessageFn = Arc<dyn Fn(&KeywordCxt<'_, '_>) -> Expr + Send + Sync>;
type ParamsFn = Arc<dyn Fn(&KeywordCxt<'_, '_>) -> Vec<(String, Expr)> + Send + Sync>;

/// Error template of a keyword
#[derive(Clone)]
pub struct KeywordError {
    pub message: MessageFn,
    pub params: ParamsFn,
}

impl KeywordError {
    pub fn new(
        message: impl Fn(&KeywordCxt<'_, '_>) -> Expr + Send + Sync + 'static,
        params: impl Fn(&KeywordCxt<'_, '_>) -> Vec<(String, Expr)> + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: Arc::new(message),
            params: Arc::new(params),
        }
    }
}

/// How a keyword is implemented
#[derive(Clone)]
pub enum KeywordImpl {
    Code(CodeFn),
    Validate(KeywordValidateFn),
    Macro(MacroFn),
    /// Recognised and type-checked, validated elsewhere
    None,
}

/// A keyword known to the compiler
#[derive(Clone)]
pub struct KeywordDefinition {
    pub keyword: String,
    /// Data types the keyword applies to; empty means any
    pub types: Vec<JsonType>,
    /// Allowed types of the keyword value; empty means any
    pub schema_types: Vec<JsonType>,
    /// Accepts `{"$data": pointer}` values
    pub data: bool,
    /// Runs ahead of this keyword within its group
    pub before: Option<String>,
    /// Runs after all other keywords
    pub post: bool,
    /// Sibling keywords handled by this one
    pub implements: Vec<String>,
    /// Sibling keywords that must be present
    pub dependencies: Vec<String>,
    /// Records the error count before the keyword runs
    pub track_errors: bool,
    pub error: Option<KeywordError>,
    /// Only valid in `$async` schemas
    pub is_async: bool,
    pub implementation: KeywordImpl,
}

impl KeywordDefinition {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            types: Vec::new(),
            schema_types: Vec::new(),
            data: false,
            before: None,
            post: false,
            implements: Vec::new(),
            dependencies: Vec::new(),
            track_errors: false,
            error: None,
            is_async: false,
            implementation: KeywordImpl::None,
        }
    }

    pub fn types(mut self, types: Vec<JsonType>) -> Self {
        self.types = types;
        self
    }

    pub fn schema_types(mut self, types: Vec<JsonType>) -> Self {
        self.schema_types = types;
        self
    }

    pub fn data(mut self) -> Self {
        self.data = true;
        self
    }

    pub fn before(mut self, keyword: impl Into<String>) -> Self {
        self.before = Some(keyword.into());
        self
    }

    pub fn post(mut self) -> Self {
        self.post = true;
        self
    }

    pub fn implements(mut self, keywords: &[&str]) -> Self {
        self.implements = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn dependencies(mut self, keywords: &[&str]) -> Self {
        self.dependencies = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn track_errors(mut self) -> Self {
        self.track_errors = true;
        self
    }

    pub fn error(mut self, error: KeywordError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn code(mut self, code: impl Fn(&mut KeywordCxt<'_, '_>, &mut Builder<'_>) -> Result<()> + Send + Sync + 'static) -> Self {
        self.implementation = KeywordImpl::Code(Arc::new(code));
        self
    }

    pub fn validate(mut self, validate: impl Fn(&Value, &Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.implementation = KeywordImpl::Validate(Arc::new(validate));
        self
    }

    pub fn macro_(mut self, expand: impl Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        self.implementation = KeywordImpl::Macro(Arc::new(expand));
        self
    }
}

impl fmt::Debug for KeywordDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let implementation = match self.implementation {
            KeywordImpl::Code(_) => "code",
            KeywordImpl::Validate(_) => "validate",
            KeywordImpl::Macro(_) => "macro",
            KeywordImpl::None => "none",
        };
        f.debug_struct("KeywordDefinition")
            .field("keyword", &self.keyword)
            .field("types", &self.types)
            .field("schema_types", &self.schema_types)
            .field("implementation", &implementation)
            .finish()
    }
}

/// One entry of a vocabulary
#[derive(Clone)]
pub enum VocabularyEntry {
    /// Recognised keyword without code
    Known(String),
    Keyword(KeywordDefinition),
}

impl From<KeywordDefinition> for VocabularyEntry {
    fn from(def: KeywordDefinition) -> Self {
        VocabularyEntry::Keyword(def)
    }
}

impl From<&str> for VocabularyEntry {
    fn from(keyword: &str) -> Self {
        VocabularyEntry::Known(keyword.to_string())
    }
}

pub type Vocabulary = Vec<VocabularyEntry>;

/// Vocabularies of a dialect in registration order
pub fn dialect_vocabularies(dialect: Dialect) -> Vec<Vocabulary> {
    match dialect {
        Dialect::Draft2020 => vec![
            core::vocabulary(),
            validation::vocabulary(),
            applicator::vocabulary(true),
            dynamic::vocabulary(),
            applicator::next_vocabulary(),
            unevaluated::vocabulary(),
            format::vocabulary(),
            metadata::vocabulary(),
        ],
        Dialect::Draft7 => vec![
            core::vocabulary(),
            validation::vocabulary(),
            applicator::vocabulary(false),
            format::vocabulary(),
            metadata::vocabulary(),
        ],
    }
}

/// Literal string for messages
pub(crate) fn lit(s: impl Into<String>) -> Expr {
    Expr::str(s)
}

/// Params entry
pub(crate) fn param(key: &str, value: Expr) -> (String, Expr) {
    (key.to_string(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::rules::Rules;

    #[test]
    fn test_dialect_vocabularies_register() {
        let rules = Rules::with_vocabularies(dialect_vocabularies(Dialect::Draft2020)).unwrap();
        for keyword in ["$ref", "type", "properties", "unevaluatedProperties", "format", "title", "$dynamicRef"] {
            assert!(rules.is_known(keyword), "{} should be known", keyword);
        }
        assert!(rules.post().rules.iter().any(|r| r.keyword == "unevaluatedItems"));
    }

    #[test]
    fn test_draft7_vocabularies_register() {
        let rules = Rules::with_vocabularies(dialect_vocabularies(Dialect::Draft7)).unwrap();
        assert!(rules.is_known("additionalItems"));
        assert!(rules.is_known("dependencies"));
        assert!(!rules.is_known("prefixItems"));
        assert!(!rules.is_known("unevaluatedProperties"));
    }

    #[test]
    fn test_definition_builder() {
        let def = KeywordDefinition::new("even")
            .types(vec![JsonType::Number])
            .schema_types(vec![JsonType::Boolean])
            .validate(|_, data, _| data.as_i64().is_some_and(|n| n % 2 == 0));
        assert!(matches!(def.implementation, KeywordImpl::Validate(_)));
        assert!(format!("{:?}", def).contains("validate"));
    }
}
