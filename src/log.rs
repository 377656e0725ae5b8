//! A lightweight, compile-time-gated trace cascade for the lexer and the
//! state-machine builder. Mirrors the ordering of the teacher's
//! `util::Log<T>` (`None < Default < Success < Result < Verbose`) without
//! pulling in an external logging crate, since the teacher doesn't either.

use std::fmt::{Display, Formatter};

/// Verbosity level for a debug trace. Checked against a configured
/// threshold before anything is printed; compiled out entirely in release
/// builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    None,
    Default,
    Success,
    Result,
    Verbose,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::None => write!(f, "none"),
            LogLevel::Default => write!(f, "default"),
            LogLevel::Success => write!(f, "success"),
            LogLevel::Result => write!(f, "result"),
            LogLevel::Verbose => write!(f, "verbose"),
        }
    }
}

/// A named trace sink with a fixed threshold. Construction sites (the
/// lexer runtime, the state-machine builder) hold one of these and call
/// [`Log::trace`] at points of interest; nothing is printed unless the
/// caller's level meets or exceeds the configured threshold.
#[derive(Debug, Clone)]
pub struct Log {
    label: &'static str,
    threshold: LogLevel,
}

impl Log {
    pub fn new(label: &'static str, threshold: LogLevel) -> Self {
        Self { label, threshold }
    }

    pub fn silent() -> Self {
        Self::new("", LogLevel::None)
    }

    #[cfg_attr(not(debug_assertions), allow(unused_variables))]
    pub fn trace(&self, at: LogLevel, msg: impl FnOnce() -> String) {
        #[cfg(debug_assertions)]
        if at != LogLevel::None && self.threshold >= at {
            println!("[{}; {}] {}", self.label, at, msg());
        }
    }
}
