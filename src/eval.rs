//! Evaluation of compiled checks.
//!
//! A compiled check runs its OR-branches in source order; a branch runs its
//! AND-conjunct invocations in order and fails at the first one that raises.
//! The check succeeds the moment any branch succeeds. When every branch
//! fails, the failure surfaced is the first branch's first failure; later
//! branches' failures are discarded. This is load-bearing, observable
//! behavior, not an implementation detail.

use crate::compile::{ArgExpr, ArgList, CompiledCheck, Invocation, LeafInfo};
use crate::error::{AssertError, CheckError, CompileError};
use crate::failure::AssertionFailure;
use crate::pattern::EmbedRef;
use crate::value::Value;

/// What a raw node sees at run time: the interpolated values, their optional
/// source texts, and the check's side table of embedded values.
pub struct Scope<'a> {
    slots: &'a [Value],
    slot_sources: Option<&'a [String]>,
    embedded: &'a [Value],
}

impl<'a> Scope<'a> {
    /// All interpolated values, in slot order.
    pub fn slots(&self) -> &[Value] {
        self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index)
    }

    /// The raw source text of an interpolated value, when the condition
    /// carried it.
    pub fn slot_source(&self, index: usize) -> Option<&str> {
        self.slot_sources
            .and_then(|sources| sources.get(index))
            .map(String::as_str)
    }

    /// Resolves a handle produced by [`Embedder::embed`](crate::Embedder::embed).
    pub fn embedded(&self, reference: EmbedRef) -> Option<&Value> {
        self.embedded.get(reference.index())
    }
}

impl CompiledCheck {
    /// Runs the check against the given interpolated values.
    ///
    /// The value count must match the template's slot count.
    pub fn check(&self, values: &[Value]) -> Result<(), AssertError> {
        if values.len() != self.slots {
            return Err(AssertError::Compile(CompileError::SlotCountMismatch {
                expected: self.slots,
                got: values.len(),
            }));
        }
        self.run(values, None).map_err(AssertError::Failure)
    }

    pub(crate) fn run(
        &self,
        values: &[Value],
        value_sources: Option<&[String]>,
    ) -> Result<(), Box<AssertionFailure>> {
        let scope = Scope {
            slots: values,
            slot_sources: value_sources,
            embedded: &self.embedded,
        };

        let mut first_failure = None;

        for branch in &self.branches {
            match self.run_branch(branch, values, &scope) {
                Ok(()) => return Ok(()),
                Err(failure) => {
                    if first_failure.is_none() {
                        first_failure = Some(failure);
                    }
                }
            }
        }

        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn run_branch(
        &self,
        branch: &[Invocation],
        values: &[Value],
        scope: &Scope<'_>,
    ) -> Result<(), Box<AssertionFailure>> {
        for invocation in branch {
            match invocation {
                Invocation::Call { handler, args, leaf } => {
                    let resolved = resolve_arguments(args, values);

                    if let Err(error) = self.handlers[*handler](&resolved, &leaf.snippets) {
                        return Err(Box::new(call_failure(leaf, resolved, values, error)));
                    }
                }
                Invocation::Raw { leaf, node } => {
                    if let Err(error) = (node.run)(scope) {
                        return Err(Box::new(raw_failure(leaf, values, error)));
                    }
                }
            }
        }

        Ok(())
    }
}

fn resolve_arguments(args: &ArgList, values: &[Value]) -> Vec<Value> {
    match args {
        ArgList::AllValues => values.to_vec(),
        ArgList::Exact(list) => list
            .iter()
            .map(|arg| match arg {
                ArgExpr::Slot(slot) => values[*slot].clone(),
                ArgExpr::Literal(value) => value.clone(),
            })
            .collect(),
    }
}

fn call_failure(
    leaf: &LeafInfo,
    argument_values: Vec<Value>,
    interpolated: &[Value],
    error: CheckError,
) -> AssertionFailure {
    AssertionFailure::new(
        leaf.fragments.clone(),
        argument_values,
        leaf.arg_sources.clone(),
        interpolated.to_vec(),
        error.message().to_string(),
    )
}

fn raw_failure(leaf: &str, interpolated: &[Value], error: CheckError) -> AssertionFailure {
    AssertionFailure::new(
        vec![leaf.to_string()],
        Vec::new(),
        Vec::new(),
        interpolated.to_vec(),
        error.message().to_string(),
    )
}
