//! Compiler configuration
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use crate::error::{StrictCategory, StrictMode};
use crate::logger::SharedLogger;
use serde::{Deserialize, Serialize};

/// Type coercion applied when the instance type does not match `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoerceTypes {
    #[default]
    Off,
    /// Between scalar types
    Scalar,
    /// Scalar coercion plus wrapping/unwrapping single-item arrays
    Array,
}

/// Assignment of `default` values for missing properties and items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UseDefaults {
    #[default]
    Off,
    On,
    /// Also replace `null` and empty strings
    Empty,
}

/// Removal of properties not allowed by `additionalProperties`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RemoveAdditional {
    #[default]
    Off,
    /// Only where `additionalProperties` is `false`
    Explicit,
    /// Wherever `additionalProperties` is present
    All,
    /// Also properties failing an `additionalProperties` schema
    Failing,
}

/// Schema dialect; selects the keyword vocabularies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    Draft7,
    #[default]
    Draft2020,
}

impl Dialect {
    pub fn meta_schema_uri(self) -> &'static str {
        match self {
            Dialect::Draft7 => "http://json-schema.org/draft-07/schema",
            Dialect::Draft2020 => "https://json-schema.org/draft/2020-12/schema",
        }
    }
}

/// When a referenced schema is copied into the caller instead of called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineRefs {
    Never,
    Always,
    /// Inline when the schema has fewer structural keywords than this
    Limit(usize),
}

impl Default for InlineRefs {
    fn default() -> Self {
        InlineRefs::Limit(8)
    }
}

/// Compiler options
#[derive(Debug, Clone)]
pub struct Options {
    pub strict_schema: StrictMode,
    pub strict_numbers: StrictMode,
    pub strict_types: StrictMode,
    pub strict_tuples: StrictMode,
    pub strict_required: StrictMode,
    /// Accept `type` arrays other than `[T, "null"]` without a strict types diagnostic
    pub allow_union_types: bool,
    /// Collect every failing keyword instead of stopping at the first
    pub all_errors: bool,
    pub coerce_types: CoerceTypes,
    pub use_defaults: UseDefaults,
    pub remove_additional: RemoveAdditional,
    pub dialect: Dialect,
    /// Allow `{"$data": "<relative pointer>"}` keyword values
    pub data: bool,
    pub inline_refs: InlineRefs,
    /// Optimizer rounds; 0 disables optimization
    pub optimize: usize,
    pub code_pretty: bool,
    /// Keep rendered source on compiled validators
    pub code_source: bool,
    /// Include schema, parent schema and data in errors
    pub verbose: bool,
    pub messages: bool,
    pub validate_formats: bool,
    /// Compile `pattern` with Unicode classes
    pub unicode_regexp: bool,
    /// Decimal places tolerated by `multipleOf`
    pub multiple_of_precision: Option<u32>,
    /// `required` lists longer than this are checked in a loop
    pub loop_required: usize,
    /// `enum` lists longer than this are checked in a loop
    pub loop_enum: usize,
    /// Only own properties count for `properties` and `required`
    pub own_properties: bool,
    /// Ignore sibling keywords of `$ref` (draft-07 behavior)
    pub ignore_keywords_with_ref: bool,
    /// Register schemas passed to `compile` under their `$id`
    pub add_used_schema: bool,
    /// Maximum nesting of schema function calls at validation time
    pub max_depth: usize,
    pub logger: SharedLogger,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict_schema: StrictMode::Strict,
            strict_numbers: StrictMode::Off,
            strict_types: StrictMode::Warn,
            strict_tuples: StrictMode::Warn,
            strict_required: StrictMode::Off,
            allow_union_types: false,
            all_errors: false,
            coerce_types: CoerceTypes::Off,
            use_defaults: UseDefaults::Off,
            remove_additional: RemoveAdditional::Off,
            dialect: Dialect::Draft2020,
            data: false,
            inline_refs: InlineRefs::default(),
            optimize: 1,
            code_pretty: false,
            code_source: false,
            verbose: false,
            messages: true,
            validate_formats: true,
            unicode_regexp: true,
            multiple_of_precision: None,
            loop_required: usize::MAX,
            loop_enum: usize::MAX,
            own_properties: false,
            ignore_keywords_with_ref: false,
            add_used_schema: true,
            max_depth: 100,
            logger: SharedLogger::default(),
        }
    }
}

impl Options {
    /// Every strict category set to `Strict`
    pub fn strict() -> Self {
        Self::default().with_strict(StrictMode::Strict)
    }

    /// Set every strict category
    pub fn with_strict(mut self, mode: StrictMode) -> Self {
        self.strict_schema = mode;
        self.strict_numbers = mode;
        self.strict_types = mode;
        self.strict_tuples = mode;
        self.strict_required = mode;
        self
    }

    pub fn with_all_errors(mut self) -> Self {
        self.all_errors = true;
        self
    }

    pub fn with_coerce_types(mut self, coerce: CoerceTypes) -> Self {
        self.coerce_types = coerce;
        self
    }

    pub fn with_use_defaults(mut self, defaults: UseDefaults) -> Self {
        self.use_defaults = defaults;
        self
    }

    pub fn with_remove_additional(mut self, remove: RemoveAdditional) -> Self {
        self.remove_additional = remove;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        if dialect == Dialect::Draft7 {
            self.ignore_keywords_with_ref = true;
        }
        self
    }

    pub fn with_data(mut self) -> Self {
        self.data = true;
        self
    }

    pub fn with_inline_refs(mut self, inline: InlineRefs) -> Self {
        self.inline_refs = inline;
        self
    }

    pub fn with_optimize(mut self, passes: usize) -> Self {
        self.optimize = passes;
        self
    }

    pub fn with_code_source(mut self, pretty: bool) -> Self {
        self.code_source = true;
        self.code_pretty = pretty;
        self
    }

    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Mode configured for a strictness category
    pub fn strict_mode(&self, category: StrictCategory) -> StrictMode {
        match category {
            StrictCategory::Schema => self.strict_schema,
            StrictCategory::Numbers => self.strict_numbers,
            StrictCategory::Types => self.strict_types,
            StrictCategory::Tuples => self.strict_tuples,
            StrictCategory::Required => self.strict_required,
        }
    }

    /// Whether `unevaluatedProperties`/`unevaluatedItems` tracking is on
    pub fn unevaluated(&self) -> bool {
        self.dialect == Dialect::Draft2020
    }
}
