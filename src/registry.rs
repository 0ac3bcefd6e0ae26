//! The pattern registry.
//!
//! A registry is a persistent value object: every `with_*` operation returns
//! a new registry and leaves the receiver untouched and fully usable. Pattern
//! matching scans definitions newest-first, so a later registration shadows an
//! earlier one of the same shape. Each derived registry owns a fresh
//! expression cache keyed by template identity; compilation is a pure function
//! of (template, registry), so a duplicated compile is idempotent.

use crate::compile::{self, CompiledCheck};
use crate::error::{AssertError, CheckError, CompileError, RegistryError};
use crate::pattern::{
    arity_validator, function_matcher, infix_matcher, postfix_matcher, prefix_matcher,
    raw_matcher, Embedder, Handler, MatcherSpec, OperatorShape, PatternDefinition, RawMatch,
    RawNode, Shorthand, Validator,
};
use crate::template::{Condition, Template, TemplateId};
use crate::value::Value;
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An immutable, derivable collection of pattern definitions plus the
/// expression cache for conditions compiled against it.
#[derive(Clone)]
pub struct Registry {
    patterns: Vec<Rc<PatternDefinition>>,
    cache: Rc<RefCell<HashMap<TemplateId, Rc<CompiledCheck>>>>,
}

impl Registry {
    /// The empty registry: no pattern matches anything until one is
    /// registered.
    pub fn new() -> Self {
        Registry {
            patterns: Vec::new(),
            cache: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn derive(&self, definition: PatternDefinition) -> Registry {
        let mut patterns = self.patterns.clone();
        patterns.push(Rc::new(definition));

        Registry {
            patterns,
            cache: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    fn operator(
        &self,
        shape: OperatorShape,
        matcher: Regex,
        validate: Option<Validator>,
        handler: Handler,
    ) -> Registry {
        self.derive(PatternDefinition::Operator {
            shape,
            matcher,
            validate,
            handler,
        })
    }

    /// Registers an infix operator: `<lhs> <op> <rhs>`. The operator may
    /// chain, in which case the handler receives more than two values.
    pub fn with_infix_operator(
        &self,
        operator: impl Into<MatcherSpec>,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = infix_matcher(&operator.into())?;
        Ok(self.operator(OperatorShape::Infix, matcher, None, Rc::new(handler)))
    }

    /// Like [`with_infix_operator`](Self::with_infix_operator), with a
    /// compile-time argument validator.
    pub fn with_infix_operator_validated(
        &self,
        operator: impl Into<MatcherSpec>,
        validate: impl Fn(&[String], &[String]) -> Result<(), CheckError> + 'static,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = infix_matcher(&operator.into())?;
        Ok(self.operator(
            OperatorShape::Infix,
            matcher,
            Some(Rc::new(validate)),
            Rc::new(handler),
        ))
    }

    /// Registers a prefix operator: `<op> <operand>`.
    pub fn with_prefix_operator(
        &self,
        operator: impl Into<MatcherSpec>,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = prefix_matcher(&operator.into())?;
        Ok(self.operator(OperatorShape::Prefix, matcher, None, Rc::new(handler)))
    }

    pub fn with_prefix_operator_validated(
        &self,
        operator: impl Into<MatcherSpec>,
        validate: impl Fn(&[String], &[String]) -> Result<(), CheckError> + 'static,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = prefix_matcher(&operator.into())?;
        Ok(self.operator(
            OperatorShape::Prefix,
            matcher,
            Some(Rc::new(validate)),
            Rc::new(handler),
        ))
    }

    /// Registers a postfix operator: `<operand> <op>`.
    pub fn with_postfix_operator(
        &self,
        operator: impl Into<MatcherSpec>,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = postfix_matcher(&operator.into())?;
        Ok(self.operator(OperatorShape::Postfix, matcher, None, Rc::new(handler)))
    }

    pub fn with_postfix_operator_validated(
        &self,
        operator: impl Into<MatcherSpec>,
        validate: impl Fn(&[String], &[String]) -> Result<(), CheckError> + 'static,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = postfix_matcher(&operator.into())?;
        Ok(self.operator(
            OperatorShape::Postfix,
            matcher,
            Some(Rc::new(validate)),
            Rc::new(handler),
        ))
    }

    /// Registers a function pattern: `name(args)`. Zero arguments is valid;
    /// the interior `..._` passes every interpolated value.
    pub fn with_function(
        &self,
        name: impl Into<MatcherSpec>,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = function_matcher(&name.into())?;
        Ok(self.operator(OperatorShape::Function, matcher, None, Rc::new(handler)))
    }

    /// Registers a function pattern with a fixed argument count, checked at
    /// compile time.
    pub fn with_function_arity(
        &self,
        name: impl Into<MatcherSpec>,
        arity: usize,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = function_matcher(&name.into())?;
        Ok(self.operator(
            OperatorShape::Function,
            matcher,
            Some(arity_validator(arity)),
            Rc::new(handler),
        ))
    }

    pub fn with_function_validated(
        &self,
        name: impl Into<MatcherSpec>,
        validate: impl Fn(&[String], &[String]) -> Result<(), CheckError> + 'static,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = function_matcher(&name.into())?;
        Ok(self.operator(
            OperatorShape::Function,
            matcher,
            Some(Rc::new(validate)),
            Rc::new(handler),
        ))
    }

    /// Registers a pattern from the compact shorthand: `"_ op _"` (binary),
    /// `"_ op ..."` (n-ary), `"_ op"` (postfix), `"op _"` (prefix),
    /// `"name(a, b)"`, `"name()"`, or `"name(...)"` (variadic).
    pub fn with_pattern(
        &self,
        shorthand: &str,
        handler: impl Fn(&[Value], &[String]) -> Result<(), CheckError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let handler: Handler = Rc::new(handler);

        match crate::pattern::parse_shorthand(shorthand)? {
            Shorthand::Binary(op) => {
                let matcher = infix_matcher(&MatcherSpec::Name(op))?;
                Ok(self.operator(
                    OperatorShape::Infix,
                    matcher,
                    Some(arity_validator(2)),
                    handler,
                ))
            }
            Shorthand::Nary(op) => {
                let matcher = infix_matcher(&MatcherSpec::Name(op))?;
                Ok(self.operator(OperatorShape::Infix, matcher, None, handler))
            }
            Shorthand::Postfix(op) => {
                let matcher = postfix_matcher(&MatcherSpec::Name(op))?;
                Ok(self.operator(OperatorShape::Postfix, matcher, None, handler))
            }
            Shorthand::Prefix(op) => {
                let matcher = prefix_matcher(&MatcherSpec::Name(op))?;
                Ok(self.operator(OperatorShape::Prefix, matcher, None, handler))
            }
            Shorthand::Function { name, arity } => {
                let matcher = function_matcher(&MatcherSpec::Name(name))?;
                Ok(self.operator(
                    OperatorShape::Function,
                    matcher,
                    arity.map(arity_validator),
                    handler,
                ))
            }
        }
    }

    /// Registers a raw pattern: the matcher must span an entire leaf; the
    /// builder receives its capture groups and an embedder, and returns the
    /// node the evaluator runs.
    pub fn with_raw_pattern(
        &self,
        matcher: Regex,
        build: impl Fn(&RawMatch<'_>, &mut Embedder<'_>) -> Result<RawNode, CompileError> + 'static,
    ) -> Result<Registry, RegistryError> {
        let matcher = raw_matcher(&matcher)?;
        Ok(self.derive(PatternDefinition::Raw {
            matcher,
            build: Rc::new(build),
        }))
    }

    /// Compiles a template against this registry, or returns the cached
    /// check. Cache hits skip compilation entirely and return the same
    /// [`CompiledCheck`].
    pub fn compile(&self, template: &Template) -> Result<Rc<CompiledCheck>, CompileError> {
        if let Some(check) = self.cache.borrow().get(&template.id()) {
            return Ok(check.clone());
        }

        // Compile outside any borrow so re-entrant compilation (a raw builder
        // compiling a sub-check) stays safe; a duplicate insert is
        // last-write-idempotent.
        let check = Rc::new(compile::compile(template, &self.patterns)?);

        let mut cache = self.cache.borrow_mut();
        Ok(cache.entry(template.id()).or_insert(check).clone())
    }

    /// Compiles (or reuses) the condition's template and runs the check
    /// against its values. Raises the renderable failure on logical falsity.
    pub fn evaluate(&self, condition: &Condition) -> Result<(), AssertError> {
        let template = condition.template();
        let expected = template.slots();

        if condition.values().len() != expected {
            return Err(AssertError::Compile(CompileError::SlotCountMismatch {
                expected,
                got: condition.values().len(),
            }));
        }

        let check = self.compile(template)?;
        check
            .run(condition.values(), condition.value_sources())
            .map_err(AssertError::Failure)
    }

    /// The compiled check's internal representation as text, for inspection.
    /// Never executes the check.
    pub fn source(&self, template: &Template) -> Result<String, CompileError> {
        Ok(self.compile(template)?.source().to_string())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn strict_eq(values: &[Value], _snippets: &[String]) -> Result<(), CheckError> {
        let first = &values[0];
        for value in &values[1..] {
            if value != first {
                return Err(CheckError::new(format!("{:?} !== {:?}", first, value)));
            }
        }
        Ok(())
    }

    fn eq_registry() -> Registry {
        Registry::new().with_pattern("_ === ...", strict_eq).unwrap()
    }

    #[test]
    fn test_reserved_words_rejected_for_every_shape() {
        let registry = Registry::new();
        for reserved in &["and", "or", "&&", "||"] {
            assert!(registry.with_infix_operator(*reserved, strict_eq).is_err());
            assert!(registry.with_prefix_operator(*reserved, strict_eq).is_err());
            assert!(registry.with_postfix_operator(*reserved, strict_eq).is_err());
        }
        assert!(registry.with_function("and", strict_eq).is_err());
        assert!(registry.with_function("or", strict_eq).is_err());
    }

    #[test]
    fn test_derivation_leaves_previous_registry_usable() {
        let base = eq_registry();
        let extended = base
            .with_pattern("_ is _", |values, _| {
                if values[0] == values[1] {
                    Ok(())
                } else {
                    Err(CheckError::new("not the same"))
                }
            })
            .unwrap();

        assert_eq!(base.pattern_count(), 1);
        assert_eq!(extended.pattern_count(), 2);

        // The old registry still compiles and runs, and does not know the
        // new pattern.
        let eq = Template::new(vec!["1 === 1"]);
        assert!(base.evaluate(&eq.condition(vec![])).is_ok());

        let is = Template::new(vec!["1 is 1"]);
        assert!(matches!(
            base.evaluate(&is.condition(vec![])),
            Err(AssertError::Compile(CompileError::NoMatchingPattern(_)))
        ));
        assert!(extended.evaluate(&is.condition(vec![])).is_ok());
    }

    #[test]
    fn test_newest_registration_shadows_older() {
        let always_fails = eq_registry()
            .with_pattern("_ === ...", |_, _| Err(CheckError::new("shadowed")))
            .unwrap();

        let template = Template::new(vec!["1 === 1"]);
        let err = always_fails.evaluate(&template.condition(vec![])).unwrap_err();
        let failure = err.failure().expect("expected a failure");
        assert_eq!(failure.reason(), "shadowed");
    }

    #[test]
    fn test_cache_hit_returns_same_check() {
        let registry = eq_registry();
        let template = Template::new(vec!["", " === 2"]);

        let first = registry.compile(&template).unwrap();
        let second = registry.compile(&template).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        // Byte-identical source across calls.
        assert_eq!(
            registry.source(&template).unwrap(),
            registry.source(&template).unwrap()
        );
    }

    #[test]
    fn test_identical_fragments_compile_independently() {
        let registry = eq_registry();
        let a = Template::new(vec!["1 === 1"]);
        let b = Template::new(vec!["1 === 1"]);

        let first = registry.compile(&a).unwrap();
        let second = registry.compile(&b).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_slot_count_mismatch() {
        let registry = eq_registry();
        let template = Template::new(vec!["", " === ", ""]);

        assert!(matches!(
            registry.evaluate(&template.condition(vec![Value::Int(1)])),
            Err(AssertError::Compile(CompileError::SlotCountMismatch {
                expected: 2,
                got: 1,
            }))
        ));
    }

    #[test]
    fn test_validator_rejection_aborts_compilation() {
        // "_ === _" installs an arity-2 validator; a chained use must fail
        // at compile time.
        let registry = Registry::new().with_pattern("_ === _", strict_eq).unwrap();
        let template = Template::new(vec!["1 === 2 === 3"]);

        assert!(matches!(
            registry.evaluate(&template.condition(vec![])),
            Err(AssertError::Compile(CompileError::Validation { .. }))
        ));
    }

    #[test]
    fn test_regex_named_infix_operator() {
        let registry = Registry::new()
            .with_infix_operator(
                Regex::new("does(?:n't| not) match").unwrap(),
                |values, _| match (&values[0], &values[1]) {
                    (Value::Str(s), Value::Pattern(re)) if !re.is_match(s) => Ok(()),
                    _ => Err(CheckError::new("matched after all")),
                },
            )
            .unwrap();

        let doesnt = Template::new(vec!["", r" doesn't match /\d+/"]);
        assert!(registry
            .evaluate(&doesnt.condition(vec![Value::from("abc")]))
            .is_ok());

        let does_not = Template::new(vec!["", r" does not match /[a-z]/"]);
        assert!(registry
            .evaluate(&does_not.condition(vec![Value::from("abc")]))
            .is_err());
    }
}
