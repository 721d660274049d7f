//! Compiler diagnostics
//!
//! Strict-mode warnings and aborted validations go through a [`Logger`].
//! The default forwards to the `log` facade.

use std::fmt;
use std::sync::Arc;

/// Sink for compiler diagnostics
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to the `log` crate macros
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, message: &str) {
        log::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Logger for Silent {
    fn log(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Cloneable logger handle stored in options
#[derive(Clone)]
pub struct SharedLogger(Arc<dyn Logger>);

impl SharedLogger {
    pub fn new(logger: impl Logger + 'static) -> Self {
        Self(Arc::new(logger))
    }

    pub fn silent() -> Self {
        Self::new(Silent)
    }

    pub fn log(&self, message: &str) {
        self.0.log(message)
    }

    pub fn warn(&self, message: &str) {
        self.0.warn(message)
    }

    pub fn error(&self, message: &str) {
        self.0.error(message)
    }
}

impl Default for SharedLogger {
    fn default() -> Self {
        Self::new(LogFacade)
    }
}

impl fmt::Debug for SharedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedLogger")
    }
}
