//! Pattern definitions and their matchers.
//!
//! A pattern is a recognizable leaf-condition shape: an infix, prefix or
//! postfix operator, a `name(args)` function call, or a raw low-level matcher.
//! Registering one builds a single anchored or boundary [`Regex`] from the
//! operator name (validated and escaped) or from a user-supplied matcher
//! (spliced in as-is, keeping its capture groups).

use crate::error::{CheckError, CompileError, RegistryError};
use crate::eval::Scope;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::rc::Rc;

/// A handler checks a leaf condition's resolved argument values and raises to
/// signal falsity. The second argument is `[full leaf source, argument
/// sources...]`.
pub(crate) type Handler = Rc<dyn Fn(&[Value], &[String]) -> Result<(), CheckError>>;

/// A validator inspects argument source texts and the operator/name capture
/// texts at compile time, raising to reject a malformed pattern use.
pub(crate) type Validator = Rc<dyn Fn(&[String], &[String]) -> Result<(), CheckError>>;

/// A raw pattern's builder: receives the match and an embedder, returns the
/// node the evaluator will run.
pub(crate) type RawBuilder =
    Rc<dyn Fn(&RawMatch<'_>, &mut Embedder<'_>) -> Result<RawNode, CompileError>>;

/// An operator or function name given either literally or as a low-level
/// matcher.
pub enum MatcherSpec {
    Name(String),
    Matcher(Regex),
}

impl From<&str> for MatcherSpec {
    fn from(name: &str) -> Self {
        MatcherSpec::Name(name.to_string())
    }
}

impl From<String> for MatcherSpec {
    fn from(name: String) -> Self {
        MatcherSpec::Name(name)
    }
}

impl From<Regex> for MatcherSpec {
    fn from(matcher: Regex) -> Self {
        MatcherSpec::Matcher(matcher)
    }
}

/// How an operator-style pattern relates to its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperatorShape {
    Infix,
    Prefix,
    Postfix,
    Function,
}

/// One registered pattern.
pub(crate) enum PatternDefinition {
    /// An operator or function pattern: matcher, optional compile-time
    /// validator, and the handler its invocations call.
    Operator {
        shape: OperatorShape,
        matcher: Regex,
        validate: Option<Validator>,
        handler: Handler,
    },
    /// A raw pattern: a full-leaf matcher whose builder produces the node to
    /// run.
    Raw { matcher: Regex, build: RawBuilder },
}

impl PatternDefinition {
    pub(crate) fn matcher(&self) -> &Regex {
        match self {
            PatternDefinition::Operator { matcher, .. } => matcher,
            PatternDefinition::Raw { matcher, .. } => matcher,
        }
    }
}

static OPERATOR_PHRASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z]+( [a-zA-Z]+)*$").unwrap());
static OPERATOR_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##"^[^\s."`()\[\]{}#]+$"##).unwrap());
static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// Rejects operator names outside the safe character set and the reserved
/// boundary words.
pub(crate) fn ensure_operator_is_valid(operator: &str) -> Result<(), RegistryError> {
    if OPERATOR_PHRASE.is_match(operator) {
        if operator == "and" || operator == "or" {
            return Err(RegistryError::ReservedOperator(operator.to_string()));
        }
        return Ok(());
    }

    if !OPERATOR_SYMBOL.is_match(operator) {
        return Err(RegistryError::InvalidOperator(operator.to_string()));
    }

    if operator == "||" || operator == "&&" {
        return Err(RegistryError::ReservedOperator(operator.to_string()));
    }

    Ok(())
}

/// Rejects function names that are not single identifiers, and the reserved
/// boundary words.
pub(crate) fn ensure_function_name_is_valid(name: &str) -> Result<(), RegistryError> {
    if !FUNCTION_NAME.is_match(name) {
        return Err(RegistryError::InvalidFunctionName(name.to_string()));
    }

    if name == "and" || name == "or" {
        return Err(RegistryError::ReservedFunctionName(name.to_string()));
    }

    Ok(())
}

fn operator_source(spec: &MatcherSpec) -> Result<String, RegistryError> {
    match spec {
        MatcherSpec::Name(name) => {
            ensure_operator_is_valid(name)?;
            Ok(regex::escape(name))
        }
        MatcherSpec::Matcher(matcher) => Ok(matcher.as_str().to_string()),
    }
}

fn function_source(spec: &MatcherSpec) -> Result<String, RegistryError> {
    match spec {
        MatcherSpec::Name(name) => {
            ensure_function_name_is_valid(name)?;
            Ok(regex::escape(name))
        }
        MatcherSpec::Matcher(matcher) => Ok(matcher.as_str().to_string()),
    }
}

fn compile_matcher(pattern: &str) -> Result<Regex, RegistryError> {
    Regex::new(pattern).map_err(|e| RegistryError::InvalidMatcher(e.to_string()))
}

/// Boundary matcher for an infix operator: ` +(op) +`.
pub(crate) fn infix_matcher(spec: &MatcherSpec) -> Result<Regex, RegistryError> {
    compile_matcher(&format!(" +({}) +", operator_source(spec)?))
}

/// Anchored matcher for a prefix operator: `^(op) +`.
pub(crate) fn prefix_matcher(spec: &MatcherSpec) -> Result<Regex, RegistryError> {
    compile_matcher(&format!("^({}) +", operator_source(spec)?))
}

/// Anchored matcher for a postfix operator: ` +(op)$`.
pub(crate) fn postfix_matcher(spec: &MatcherSpec) -> Result<Regex, RegistryError> {
    compile_matcher(&format!(" +({})$", operator_source(spec)?))
}

/// Anchored matcher for a function call: `^(name)\(...\)$`. An empty argument
/// list is valid.
pub(crate) fn function_matcher(spec: &MatcherSpec) -> Result<Regex, RegistryError> {
    compile_matcher(&format!(r"^({})\(.*\)$", function_source(spec)?))
}

/// A raw matcher must span the entire leaf.
pub(crate) fn raw_matcher(matcher: &Regex) -> Result<Regex, RegistryError> {
    compile_matcher(&format!("^({})$", matcher.as_str()))
}

/// Compile-time arity check used by the `"_ op _"` and `"name(a, b)"`
/// shorthands.
pub(crate) fn arity_validator(expected: usize) -> Validator {
    Rc::new(move |args: &[String], _operator: &[String]| {
        if args.len() != expected {
            return Err(CheckError::new(format!(
                "expected {} argument(s), but got {}",
                expected,
                args.len()
            )));
        }
        Ok(())
    })
}

// Shorthand parsing --------------------------------------------------------

static SHORTHAND_OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_ ([a-zA-Z ]+|\S+?)( _| \.\.\.)?$").unwrap());
static SHORTHAND_PREFIX_OR_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)(\((?:\.\.\.|\w+(?:, *\w+)*)?\)| _)$").unwrap());

/// A parsed `with_pattern` shorthand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Shorthand {
    /// `"_ op _"`: binary infix, arity checked.
    Binary(String),
    /// `"_ op ..."`: continuing n-ary infix.
    Nary(String),
    /// `"_ op"`: postfix.
    Postfix(String),
    /// `"op _"`: prefix.
    Prefix(String),
    /// `"name(a, b)"`, `"name()"` or `"name(...)"` (`arity: None` = all
    /// interpolated values).
    Function { name: String, arity: Option<usize> },
}

/// Parses the compact textual shorthand accepted by `with_pattern`.
pub(crate) fn parse_shorthand(pattern: &str) -> Result<Shorthand, RegistryError> {
    if let Some(caps) = SHORTHAND_OPERATOR.captures(pattern) {
        let operator = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();

        return Ok(match caps.get(2).map(|m| m.as_str()) {
            Some(" ...") => Shorthand::Nary(operator),
            Some(" _") => Shorthand::Binary(operator),
            _ => Shorthand::Postfix(operator),
        });
    }

    if let Some(caps) = SHORTHAND_PREFIX_OR_FUNCTION.captures(pattern) {
        let name = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        if !rest.starts_with('(') {
            return Ok(Shorthand::Prefix(name));
        }

        let inner = &rest[1..rest.len() - 1];
        let arity = if inner == "..." {
            None
        } else if inner.is_empty() {
            Some(0)
        } else {
            Some(inner.split(',').count())
        };

        return Ok(Shorthand::Function { name, arity });
    }

    Err(RegistryError::InvalidShorthand(pattern.to_string()))
}

// Raw patterns --------------------------------------------------------------

/// What a raw pattern's builder sees: the leaf text and the matcher's capture
/// texts, both in original (unmasked) coordinates.
pub struct RawMatch<'a> {
    /// The full leaf condition source.
    pub leaf: &'a str,
    /// `groups[0]` is the full pattern match; the matcher's own capture
    /// groups follow in order, with non-participating groups skipped.
    pub groups: Vec<String>,
}

/// Hands out stable references into a compiled check's side table of embedded
/// values, deduplicated by identity: embedding the same value twice returns
/// the same reference.
pub struct Embedder<'a> {
    values: &'a mut Vec<Value>,
}

impl<'a> Embedder<'a> {
    pub(crate) fn new(values: &'a mut Vec<Value>) -> Self {
        Embedder { values }
    }

    pub fn embed(&mut self, value: &Value) -> EmbedRef {
        if let Some(index) = self.values.iter().position(|v| v.same(value)) {
            return EmbedRef(index);
        }
        self.values.push(value.clone());
        EmbedRef(self.values.len() - 1)
    }
}

/// A textual handle to an embedded value, usable inside a raw node's
/// rendering and resolvable through the evaluation [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedRef(pub(crate) usize);

impl EmbedRef {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EmbedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "values[{}]", self.0)
    }
}

/// The node a raw pattern contributes to the compiled check: a deterministic
/// rendering (shown by `source()`) plus the closure the evaluator runs.
pub struct RawNode {
    pub(crate) rendering: String,
    pub(crate) run: Rc<dyn Fn(&Scope<'_>) -> Result<(), CheckError>>,
}

impl RawNode {
    pub fn new(
        rendering: impl Into<String>,
        run: impl Fn(&Scope<'_>) -> Result<(), CheckError> + 'static,
    ) -> Self {
        RawNode {
            rendering: rendering.into(),
            run: Rc::new(run),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabetic_operator_names() {
        assert!(ensure_operator_is_valid("matches").is_ok());
        assert!(ensure_operator_is_valid("does not match").is_ok());
        assert!(ensure_operator_is_valid("is close to").is_ok());
    }

    #[test]
    fn test_symbolic_operator_names() {
        assert!(ensure_operator_is_valid("===").is_ok());
        assert!(ensure_operator_is_valid("!==").is_ok());
        assert!(ensure_operator_is_valid("<=").is_ok());
    }

    #[test]
    fn test_reserved_operators_rejected() {
        for reserved in &["and", "or", "&&", "||"] {
            assert!(matches!(
                ensure_operator_is_valid(reserved),
                Err(RegistryError::ReservedOperator(_))
            ));
        }
    }

    #[test]
    fn test_invalid_operator_charset() {
        assert!(ensure_operator_is_valid("a.b").is_err());
        assert!(ensure_operator_is_valid("has(x)").is_err());
        assert!(ensure_operator_is_valid("two  spaces").is_err());
        assert!(ensure_operator_is_valid("#").is_err());
    }

    #[test]
    fn test_function_names() {
        assert!(ensure_function_name_is_valid("near").is_ok());
        assert!(ensure_function_name_is_valid("check_2").is_ok());
        assert!(ensure_function_name_is_valid("a b").is_err());
        assert!(matches!(
            ensure_function_name_is_valid("and"),
            Err(RegistryError::ReservedFunctionName(_))
        ));
    }

    #[test]
    fn test_shorthand_binary() {
        assert_eq!(
            parse_shorthand("_ === _").unwrap(),
            Shorthand::Binary("===".to_string())
        );
        assert_eq!(
            parse_shorthand("_ does not match _").unwrap(),
            Shorthand::Binary("does not match".to_string())
        );
    }

    #[test]
    fn test_shorthand_nary() {
        assert_eq!(
            parse_shorthand("_ === ...").unwrap(),
            Shorthand::Nary("===".to_string())
        );
    }

    #[test]
    fn test_shorthand_postfix_and_prefix() {
        assert_eq!(
            parse_shorthand("_ throws").unwrap(),
            Shorthand::Postfix("throws".to_string())
        );
        assert_eq!(
            parse_shorthand("not _").unwrap(),
            Shorthand::Prefix("not".to_string())
        );
    }

    #[test]
    fn test_shorthand_functions() {
        assert_eq!(
            parse_shorthand("near(a, b)").unwrap(),
            Shorthand::Function { name: "near".to_string(), arity: Some(2) }
        );
        assert_eq!(
            parse_shorthand("ready()").unwrap(),
            Shorthand::Function { name: "ready".to_string(), arity: Some(0) }
        );
        assert_eq!(
            parse_shorthand("all(...)").unwrap(),
            Shorthand::Function { name: "all".to_string(), arity: None }
        );
    }

    #[test]
    fn test_shorthand_rejects_garbage() {
        assert!(matches!(
            parse_shorthand("x y z"),
            Err(RegistryError::InvalidShorthand(_))
        ));
        assert!(parse_shorthand("").is_err());
    }

    #[test]
    fn test_infix_matcher_boundaries() {
        let re = infix_matcher(&MatcherSpec::from("===")).unwrap();
        assert!(re.is_match("a === b"));
        assert!(!re.is_match("a===b"));
    }

    #[test]
    fn test_embedder_dedups_by_identity() {
        let mut table = Vec::new();
        let mut embedder = Embedder::new(&mut table);
        let list = Value::list(vec![Value::Int(1)]);

        let a = embedder.embed(&list);
        let b = embedder.embed(&list.clone());
        let c = embedder.embed(&Value::list(vec![Value::Int(1)]));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
        assert_eq!(a.to_string(), "values[0]");
    }
}
