//! Shared test support utilities for integration tests

#![allow(dead_code)]

use schemac_core::{Compiler, ErrorObject, Logger, Options, SharedLogger, Validator};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Compiler with default options
pub fn compiler() -> Compiler {
    Compiler::new(Options::default()).expect("default vocabularies register")
}

/// Compile `schema` with `opts`, panicking with the compile error
pub fn compile_with(opts: Options, schema: &Value) -> Validator {
    let mut compiler = Compiler::new(opts).expect("vocabularies register");
    compiler
        .compile(schema)
        .unwrap_or_else(|e| panic!("schema failed to compile: {}", e))
}

pub fn compile(schema: &Value) -> Validator {
    compile_with(Options::default(), schema)
}

/// Validate a copy of `data`, returning validity and errors
pub fn check(validator: &Validator, data: &Value) -> (bool, Vec<ErrorObject>) {
    let mut data = data.clone();
    let outcome = validator.check(&mut data).expect("validation runs");
    (outcome.valid, outcome.errors)
}

pub fn assert_valid(validator: &Validator, data: &Value) {
    let (valid, errors) = check(validator, data);
    assert!(valid, "expected {} to be valid, got {:?}", data, errors);
}

/// Assert `data` is invalid and return the failing keywords in order
pub fn assert_invalid(validator: &Validator, data: &Value) -> Vec<String> {
    let (valid, errors) = check(validator, data);
    assert!(!valid, "expected {} to be invalid", data);
    errors.into_iter().map(|e| e.keyword).collect()
}

/// Logger recording every message it receives
#[derive(Clone, Default)]
pub struct CapturingLogger {
    pub warnings: Arc<Mutex<Vec<String>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl CapturingLogger {
    pub fn shared(&self) -> SharedLogger {
        SharedLogger::new(self.clone())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Logger for CapturingLogger {
    fn log(&self, _message: &str) {}

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}
