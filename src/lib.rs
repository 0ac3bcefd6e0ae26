//! Extensible pattern-based assertion engine with aligned failure
//! diagnostics.
//!
//! A condition is authored as a [`Template`] (literal text fragments with
//! interpolation slots between them) and checked against a [`Registry`] of
//! user-installable patterns: infix/prefix/postfix operators, `name(args)`
//! functions, and raw low-level matchers. Conditions compose with `and`/`&&`
//! and `or`/`||` into an OR-of-AND structure (no parentheses). Compilation is
//! cached per template, and a failing check renders a report that aligns each
//! value under the sub-expression it came from:
//!
//! ```text
//! assertion failed:
//!   "ab" === "cd"
//!   |¯¯¯     |¯¯¯
//!   "ab"     "cd"
//! ```
//!
//! ## Example
//!
//! ```
//! use phrase_assert::{CheckError, Registry, Template, Value};
//!
//! let assert = Registry::new()
//!     .with_pattern("_ === ...", |values, _sources| {
//!         let first = &values[0];
//!         for value in &values[1..] {
//!             if value != first {
//!                 return Err(CheckError::new(format!("{:?} !== {:?}", first, value)));
//!             }
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let condition = Template::new(vec!["", " === ", ""]);
//! assert
//!     .evaluate(&condition.condition(vec![Value::Int(2), Value::Int(2)]))
//!     .unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`mask`] - Structural masking of quoted/bracketed spans
//! - [`split`] - Boundary splitting over masked text
//! - [`template`] - Condition templates and cache identity
//! - [`value`] - The run-time value model
//! - [`pattern`] - Pattern definitions, shorthands, raw patterns
//! - [`registry`] - The derivable pattern registry
//! - [`compile`] - The expression compiler
//! - [`eval`] - Evaluation of compiled checks
//! - [`failure`] - The assertion failure object
//! - [`render`] - Failure report rendering
//! - [`error`] - Error types

pub mod compile;
pub mod error;
pub mod eval;
pub mod failure;
pub mod mask;
pub mod pattern;
pub mod registry;
pub mod render;
pub mod split;
pub mod template;
pub mod value;

// Re-exports for convenient access to core types
pub use compile::CompiledCheck;
pub use error::{AssertError, CheckError, CompileError, RegistryError};
pub use eval::Scope;
pub use failure::AssertionFailure;
pub use pattern::{EmbedRef, Embedder, MatcherSpec, RawMatch, RawNode};
pub use registry::Registry;
pub use render::{stringify_value, MAX_SUMMARY_WIDTH};
pub use template::{Condition, Template, TemplateId};
pub use value::{FuncValue, RecordValue, Value};
