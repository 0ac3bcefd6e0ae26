//! Error types for the assertion engine.
//!
//! Three families: registration errors (a malformed pattern definition),
//! compile errors (a condition that cannot be turned into a check), and the
//! check-level [`CheckError`] raised by handlers and validators. A failed
//! *assertion* is not in this module; see
//! [`AssertionFailure`](crate::failure::AssertionFailure).

use thiserror::Error;

/// Errors raised while registering a pattern.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Operator names are alphabetic phrases or symbolic tokens avoiding
    /// whitespace and `."`()[]{}#` characters.
    #[error("invalid operator {0}")]
    InvalidOperator(String),

    /// `and`, `or`, `&&` and `||` cannot be redefined.
    #[error("invalid reserved operator {0}")]
    ReservedOperator(String),

    /// Function names are single identifiers.
    #[error("invalid function name {0}")]
    InvalidFunctionName(String),

    /// `and` and `or` cannot be used as function names.
    #[error("invalid reserved function name {0}")]
    ReservedFunctionName(String),

    /// A `with_pattern` shorthand that matches none of the known shapes.
    #[error("invalid pattern: {0}")]
    InvalidShorthand(String),

    /// A user-supplied matcher could not be embedded into a boundary matcher.
    #[error("invalid matcher: {0}")]
    InvalidMatcher(String),
}

/// Errors raised while compiling a condition against a registry.
///
/// All of these are fatal for the whole condition and are never retried; the
/// condition text or the pattern registrations must be fixed.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// A leaf condition was not accepted by any registered pattern.
    #[error("condition does not correspond to any pattern: {0}")]
    NoMatchingPattern(String),

    /// A pattern's validator rejected the extracted arguments.
    #[error("invalid arguments for `{leaf}`: {message}")]
    Validation { leaf: String, message: String },

    /// Argument text that is neither a literal nor an interpolated value.
    #[error("argument `{argument}` of `{leaf}` is not a literal or an interpolated value")]
    UnsupportedArgument { leaf: String, argument: String },

    /// A positional marker that no interpolation slot corresponds to.
    #[error("unknown interpolated value _[{index}] in `{leaf}`")]
    UnknownSlot { leaf: String, index: usize },

    /// The condition was given a different number of values than it has slots.
    #[error("expected {expected} interpolated value(s), but got {got}")]
    SlotCountMismatch { expected: usize, got: usize },

    /// A raw pattern's builder rejected its match.
    #[error("invalid raw pattern use in `{leaf}`: {message}")]
    Raw { leaf: String, message: String },
}

/// The error type raised by pattern handlers and validators.
///
/// Handlers raise one to signal that the condition they check is false;
/// validators raise one to reject a malformed pattern use at compile time.
/// The engine attaches the surrounding context (leaf source, values) itself,
/// so a short reason is enough.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CheckError {
    message: String,
}

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Everything `evaluate` can raise: a compile error or a failed assertion.
#[derive(Debug, Error)]
pub enum AssertError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("{0}")]
    Failure(Box<crate::failure::AssertionFailure>),
}

impl AssertError {
    /// The failure, if this is one.
    pub fn failure(&self) -> Option<&crate::failure::AssertionFailure> {
        match self {
            AssertError::Failure(failure) => Some(failure),
            AssertError::Compile(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_error_display() {
        let err = CheckError::new("expected 2 argument(s), but got 3");
        assert_eq!(err.to_string(), "expected 2 argument(s), but got 3");
    }

    #[test]
    fn test_compile_error_display() {
        let err = CompileError::NoMatchingPattern("x ==== y".to_string());
        assert_eq!(
            err.to_string(),
            "condition does not correspond to any pattern: x ==== y"
        );
    }
}
