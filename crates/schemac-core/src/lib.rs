//! Schemac Core - JSON Schema to validator compiler
//!
//! This crate compiles JSON Schema documents (draft 2020-12 and draft-07)
//! into validator programs and runs them against JSON instances.
//!
//! # Main Components
//!
//! - **Code generation**: IR builder with scoped names, hoisted constants and an optimizer
//! - **Compilation**: schema environments, `$ref` resolution and per-keyword code
//! - **Vocabularies**: the keyword definitions of each dialect, plus custom keywords
//! - **Runtime**: interpreter executing compiled programs over a mutable instance
//! - **Compiler facade**: schema registry, formats and validator factory
//!
//! # Example
//!
//! ```
//! use schemac_core::{Compiler, Options, Result};
//! use serde_json::json;
//!
//! fn example() -> Result<()> {
//!     let mut compiler = Compiler::new(Options::default().with_all_errors())?;
//!     let mut validator = compiler.compile(&json!({
//!         "type": "object",
//!         "properties": {"age": {"type": "integer", "minimum": 0}},
//!         "required": ["age"]
//!     }))?;
//!     let mut data = json!({"age": -1});
//!     assert!(!validator.validate(&mut data));
//!     println!("{}", compiler.errors_text(validator.errors.as_deref().unwrap_or_default()));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

pub mod codegen;
pub mod compile;
pub mod compiler;
pub mod error;
pub mod formats;
pub mod logger;
pub mod options;
pub mod runtime;
pub mod validator;
pub mod vocabularies;

// Re-export main types for convenience
pub use compiler::Compiler;
pub use error::{Error, Result, StrictCategory, StrictMode};
pub use formats::{Format, FormatRegistry};
pub use logger::{Logger, SharedLogger};
pub use options::{CoerceTypes, Dialect, InlineRefs, Options, RemoveAdditional, UseDefaults};
pub use validator::{errors_text, ErrorObject, Outcome, ValidationErrors, Validator};
pub use vocabularies::{KeywordDefinition, KeywordError, Vocabulary, VocabularyEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
