//! The assertion failure object.

use crate::render;
use crate::value::Value;
use once_cell::unsync::OnceCell;
use std::fmt;

/// A failed assertion, captured at the moment a handler raised.
///
/// Carries everything the diagnostic renderer needs: the failing leaf's
/// literal fragments, the resolved argument values and their source snippets,
/// and the full set of originally interpolated values. Immutable; the
/// human-readable report is rendered lazily on first access and memoized.
pub struct AssertionFailure {
    fragments: Vec<String>,
    argument_values: Vec<Value>,
    argument_sources: Vec<String>,
    interpolated: Vec<Value>,
    reason: String,
    report: OnceCell<String>,
}

impl AssertionFailure {
    pub(crate) fn new(
        fragments: Vec<String>,
        argument_values: Vec<Value>,
        argument_sources: Vec<String>,
        interpolated: Vec<Value>,
        reason: String,
    ) -> Self {
        AssertionFailure {
            fragments,
            argument_values,
            argument_sources,
            interpolated,
            reason,
            report: OnceCell::new(),
        }
    }

    /// The rendered multi-line report. Computed once, on first access.
    pub fn report(&self) -> &str {
        self.report
            .get_or_init(|| render::render_report(self, render::MAX_SUMMARY_WIDTH))
    }

    /// Renders with a non-default width budget, bypassing the memoized
    /// report.
    pub fn report_with_width(&self, max_width: usize) -> String {
        render::render_report(self, max_width)
    }

    /// The failing leaf's literal fragments; always one more than the number
    /// of arguments.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// The resolved argument values of the failing leaf.
    pub fn argument_values(&self) -> &[Value] {
        &self.argument_values
    }

    /// The raw source snippet of each argument.
    pub fn argument_sources(&self) -> &[String] {
        &self.argument_sources
    }

    /// Every value interpolated into the condition, in slot order.
    pub fn interpolated(&self) -> &[Value] {
        &self.interpolated
    }

    /// The raising handler's own message. Not part of the rendered report.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.report())
    }
}

impl fmt::Debug for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionFailure")
            .field("reason", &self.reason)
            .field("arguments", &self.argument_sources)
            .finish()
    }
}

impl std::error::Error for AssertionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_failure() -> AssertionFailure {
        AssertionFailure::new(
            vec!["".to_string(), " === ".to_string(), "".to_string()],
            vec![Value::Int(1), Value::Int(2)],
            vec!["1".to_string(), "2".to_string()],
            vec![],
            "1 !== 2".to_string(),
        )
    }

    #[test]
    fn test_report_is_memoized() {
        let failure = simple_failure();
        let first = failure.report() as *const str;
        let second = failure.report() as *const str;
        assert_eq!(first, second);
    }

    #[test]
    fn test_display_is_the_report() {
        let failure = simple_failure();
        assert_eq!(failure.to_string(), failure.report());
    }

    #[test]
    fn test_reason_is_preserved() {
        assert_eq!(simple_failure().reason(), "1 !== 2");
    }
}
