//! Condition templates and conditions.
//!
//! A [`Template`] is the authored half of a condition: the N+1 literal text
//! fragments around N interpolation slots. Creating one allocates a stable
//! [`TemplateId`] which keys the expression cache, so a template declared once
//! (typically in a `once_cell` static, or any value the caller keeps alive)
//! re-uses its compiled check across invocations. Two templates with identical
//! fragments are still two distinct call sites and compile independently.
//!
//! ```
//! use once_cell::sync::Lazy;
//! use phrase_assert::Template;
//!
//! static IS_FOUR: Lazy<Template> = Lazy::new(|| Template::new(vec!["", " === 4"]));
//!
//! assert_eq!(IS_FOUR.source(), "_[0] === 4");
//! assert_eq!(IS_FOUR.slots(), 1);
//! ```

use crate::value::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TEMPLATE_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity of a template, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(u64);

/// The literal fragments of a condition, with one interpolation slot between
/// each adjacent pair.
#[derive(Debug, Clone)]
pub struct Template {
    id: TemplateId,
    fragments: Vec<String>,
}

impl Template {
    /// Creates a template from its literal fragments. A condition with N
    /// interpolated values has N+1 fragments; a condition with no values is a
    /// single fragment.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        if fragments.is_empty() {
            fragments.push(String::new());
        }

        Template {
            id: TemplateId(NEXT_TEMPLATE_ID.fetch_add(1, Ordering::Relaxed)),
            fragments,
        }
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Number of interpolation slots.
    pub fn slots(&self) -> usize {
        self.fragments.len() - 1
    }

    /// The full condition source: fragments interleaved with positional
    /// `_[i]` markers, trimmed.
    pub fn source(&self) -> String {
        let mut text = String::new();
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i > 0 {
                text.push_str("_[");
                text.push_str(&(i - 1).to_string());
                text.push(']');
            }
            text.push_str(fragment);
        }
        text.trim().to_string()
    }

    /// Binds interpolated values to this template.
    pub fn condition(&self, values: Vec<Value>) -> Condition {
        Condition {
            template: self.clone(),
            values,
            sources: None,
        }
    }
}

/// A template bound to run-time values: one concrete condition to check.
pub struct Condition {
    template: Template,
    values: Vec<Value>,
    sources: Option<Vec<String>>,
}

impl Condition {
    /// Attaches the raw source text of each interpolated value. Only patterns
    /// that synthesize code look at these.
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value_sources(&self) -> Option<&[String]> {
        self.sources.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_per_template() {
        let a = Template::new(vec!["", " === ", ""]);
        let b = Template::new(vec!["", " === ", ""]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_source_interleaves_markers() {
        let t = Template::new(vec!["", " === ", ""]);
        assert_eq!(t.source(), "_[0] === _[1]");
    }

    #[test]
    fn test_source_is_trimmed() {
        let t = Template::new(vec!["  1 === 2  "]);
        assert_eq!(t.source(), "1 === 2");
        assert_eq!(t.slots(), 0);
    }

    #[test]
    fn test_empty_fragment_list_is_one_empty_fragment() {
        let t = Template::new(Vec::<String>::new());
        assert_eq!(t.fragments().len(), 1);
        assert_eq!(t.slots(), 0);
    }
}
