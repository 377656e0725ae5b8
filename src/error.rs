//! Construction-time failures (§7). Runtime syntax errors live in
//! [`crate::parser::error`] since they need the action table's acceptable-
//! token simulation; this module only covers the "programmer error, raised
//! eagerly" half of §7's taxonomy.
//!
//! Hand-rolled `Display`-only error type, in the style of the teacher's
//! `ImplementationError` (`error.rs`): a `what` naming the failing
//! component and a free-form `message`.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone)]
pub struct ConstructionError {
    pub what: String,
    pub message: String,
}

impl ConstructionError {
    pub fn new(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self { what: what.into(), message: message.into() }
    }
}

impl Display for ConstructionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConstructionError: {} - {}", self.what, self.message)
    }
}

impl std::error::Error for ConstructionError {}
