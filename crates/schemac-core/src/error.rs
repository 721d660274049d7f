//! Error types for the schemac compiler
//!
//! Compile-time failures, the recoverable missing-reference condition and
//! the aggregate thrown by async validators all share one error enum built
//! with `thiserror`. Internal faults carry an `anyhow` source chain.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use crate::validator::ValidationErrors;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for schemac operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed schema: bad keyword value, invalid regex, invalid type declaration
    #[error("Schema error: {message}")]
    Schema {
        message: String,
        schema_path: Option<String>,
    },

    /// Strict-mode violation promoted to an error
    #[error("strict mode: {message}")]
    Strict {
        message: String,
        category: StrictCategory,
    },

    /// A `$ref` could not be resolved; the caller may load the schema and retry
    #[error("can't resolve reference {missing_ref} from id {base_id}")]
    MissingRef {
        base_id: String,
        missing_ref: String,
        missing_schema: String,
    },

    /// Two different subschemas resolve to the same URI
    #[error("reference \"{uri}\" resolves to more than one schema")]
    AmbiguousRef { uri: String },

    /// Keyword definition or registration misuse
    #[error("Keyword error: {keyword} - {message}")]
    Keyword { keyword: String, message: String },

    /// Aggregate validation failure raised by async validators
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Compiler or interpreter invariant violation
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a schema error without a location
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
            schema_path: None,
        }
    }

    /// Create a schema error at a schema location
    pub fn schema_at(message: impl Into<String>, schema_path: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
            schema_path: Some(schema_path.into()),
        }
    }

    /// Create an internal error; these indicate compiler bugs, not schema bugs
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Error::Internal {
            source: anyhow::anyhow!(message.clone()),
            message,
        }
    }

    /// Create a keyword definition error
    pub fn keyword(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Keyword {
            keyword: keyword.into(),
            message: message.into(),
        }
    }

    /// Create a missing reference error. `missing_schema` is the reference
    /// without its fragment, i.e. the document an async loader should fetch.
    pub fn missing_ref(base_id: impl Into<String>, missing_ref: impl Into<String>) -> Self {
        let missing_ref = missing_ref.into();
        let missing_schema = match missing_ref.split_once('#') {
            Some((doc, _)) => doc.to_string(),
            None => missing_ref.clone(),
        };
        Error::MissingRef {
            base_id: base_id.into(),
            missing_ref,
            missing_schema,
        }
    }

    /// Check whether this error is the recoverable missing-reference condition
    pub fn is_missing_ref(&self) -> bool {
        matches!(self, Error::MissingRef { .. })
    }

    /// Document URI an async loader should fetch, if this is a missing reference
    pub fn missing_schema(&self) -> Option<&str> {
        match self {
            Error::MissingRef { missing_schema, .. } => Some(missing_schema),
            _ => None,
        }
    }
}

/// How strictly a borderline schema condition is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrictMode {
    /// Fail the compile
    Strict,
    /// Log a warning and proceed
    Warn,
    /// Ignore silently
    Off,
}

/// Category a strict-mode check belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrictCategory {
    /// Unknown keywords, ignored keywords, unknown formats
    Schema,
    /// NaN and infinite numbers
    Numbers,
    /// Keywords applied to types the schema does not declare
    Types,
    /// Tuple schemas without a length bound
    Tuples,
    /// Required properties not declared in `properties`
    Required,
}

impl fmt::Display for StrictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrictMode::Strict => write!(f, "Strict"),
            StrictMode::Warn => write!(f, "Warn"),
            StrictMode::Off => write!(f, "Off"),
        }
    }
}

impl fmt::Display for StrictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrictCategory::Schema => write!(f, "strictSchema"),
            StrictCategory::Numbers => write!(f, "strictNumbers"),
            StrictCategory::Types => write!(f, "strictTypes"),
            StrictCategory::Tuples => write!(f, "strictTuples"),
            StrictCategory::Required => write!(f, "strictRequired"),
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::schema(format!("invalid regular expression: {}", err))
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::schema("type must be JSON type");
        assert_eq!(err.to_string(), "Schema error: type must be JSON type");
    }

    #[test]
    fn test_missing_ref_splits_fragment() {
        let err = Error::missing_ref("http://example.com/root.json", "http://example.com/defs.json#/foo");
        assert!(err.is_missing_ref());
        assert_eq!(err.missing_schema(), Some("http://example.com/defs.json"));
        assert_eq!(
            err.to_string(),
            "can't resolve reference http://example.com/defs.json#/foo from id http://example.com/root.json"
        );
    }

    #[test]
    fn test_strict_mode_display() {
        assert_eq!(StrictMode::Strict.to_string(), "Strict");
        assert_eq!(StrictMode::Warn.to_string(), "Warn");
        assert_eq!(StrictMode::Off.to_string(), "Off");
        assert_eq!(StrictCategory::Tuples.to_string(), "strictTuples");
    }

    #[test]
    fn test_internal_error_has_source() {
        let err = Error::internal("CodeGen: not in block");
        assert!(std::error::Error::source(&err).is_some());
    }
}
