//! The expression compiler.
//!
//! Turns a condition template plus a pattern registry into a
//! [`CompiledCheck`]: the OR-of-AND structure is recovered by splitting the
//! masked source on boundary words, each leaf is classified by scanning the
//! registered patterns newest-first, and every leaf becomes one typed
//! invocation node bound to a deduplicated table of handlers. No host code is
//! generated; the nodes are interpreted directly by the evaluator.

use crate::error::CompileError;
use crate::mask::mask;
use crate::pattern::{
    Embedder, Handler, OperatorShape, PatternDefinition, RawMatch, RawNode,
};
use crate::split::split_ranges;
use crate::template::Template;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt::Write;
use std::ops::Range;
use std::rc::Rc;

pub(crate) static OR_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r" +(\|\||or) +").unwrap());
pub(crate) static AND_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r" +(&&|and) +").unwrap());
static ARGUMENT_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r" *, *").unwrap());
static SLOT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_\[(\d+)\]$").unwrap());
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap());
static REGEX_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/(.*)/([a-zA-Z]*)$").unwrap());

/// How one argument of an invocation is produced at run time.
pub(crate) enum ArgExpr {
    /// The interpolated value in the given slot.
    Slot(usize),
    /// A constant parsed from the argument's source text.
    Literal(Value),
}

/// The argument list of an invocation.
pub(crate) enum ArgList {
    Exact(Vec<ArgExpr>),
    /// The `..._` spread: every interpolated value, in slot order.
    AllValues,
}

/// Diagnostic bookkeeping captured per leaf at compile time.
pub(crate) struct LeafInfo {
    /// Source text of each argument, in order.
    pub(crate) arg_sources: Vec<String>,
    /// The leaf split around its arguments; always `arg_sources.len() + 1`
    /// fragments.
    pub(crate) fragments: Vec<String>,
    /// What handlers receive: `[source, arg_sources...]`.
    pub(crate) snippets: Vec<String>,
}

/// One AND-conjunct of a branch.
pub(crate) enum Invocation {
    Call {
        /// Index into the call table.
        handler: usize,
        args: ArgList,
        leaf: LeafInfo,
    },
    Raw {
        leaf: String,
        node: RawNode,
    },
}

/// The reusable, cached executable form of a condition under a registry.
pub struct CompiledCheck {
    pub(crate) branches: Vec<Vec<Invocation>>,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) embedded: Vec<Value>,
    pub(crate) slots: usize,
    source_text: String,
}

impl CompiledCheck {
    /// The check's internal representation rendered as text. Deterministic:
    /// byte-identical across calls and across cache hits.
    pub fn source(&self) -> &str {
        &self.source_text
    }
}

impl std::fmt::Debug for CompiledCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledCheck")
            .field("branches", &self.branches.len())
            .field("handlers", &self.handlers.len())
            .field("embedded", &self.embedded.len())
            .field("slots", &self.slots)
            .field("source_text", &self.source_text)
            .finish()
    }
}

/// Compiles `template` against the given pattern list (oldest first; matching
/// scans it newest-first).
pub(crate) fn compile(
    template: &Template,
    patterns: &[Rc<PatternDefinition>],
) -> Result<CompiledCheck, CompileError> {
    let code = template.source();
    let masked = mask(&code);
    let slots = template.slots();

    let mut handlers: Vec<Handler> = Vec::new();
    let mut embedded: Vec<Value> = Vec::new();
    let mut branches = Vec::new();

    for or_span in split_ranges(&masked, &OR_BOUNDARY) {
        let mut conjuncts = Vec::new();

        for and_span in split_ranges(&masked[or_span.clone()], &AND_BOUNDARY) {
            let start = or_span.start + and_span.start;
            let end = or_span.start + and_span.end;

            conjuncts.push(compile_leaf(
                &code[start..end],
                &masked[start..end],
                patterns,
                slots,
                &mut handlers,
                &mut embedded,
            )?);
        }

        branches.push(conjuncts);
    }

    let source_text = render_source(&branches, &embedded);

    Ok(CompiledCheck {
        branches,
        handlers,
        embedded,
        slots,
        source_text,
    })
}

/// Finds the pattern accepting this (masked) leaf. Newest registrations win.
fn find_pattern<'p, 't>(
    leaf_masked: &'t str,
    patterns: &'p [Rc<PatternDefinition>],
) -> Option<(&'p PatternDefinition, Captures<'t>)> {
    for definition in patterns.iter().rev() {
        if let Some(caps) = definition.matcher().captures(leaf_masked) {
            return Some((definition.as_ref(), caps));
        }
    }
    None
}

/// Participating capture texts, mapped onto the original text. The first
/// entry is the full operator/name match.
fn capture_groups(caps: &Captures<'_>, original: &str) -> Vec<String> {
    caps.iter()
        .skip(1)
        .flatten()
        .map(|group| original[group.start()..group.end()].to_string())
        .collect()
}

fn compile_leaf(
    leaf: &str,
    leaf_masked: &str,
    patterns: &[Rc<PatternDefinition>],
    slots: usize,
    handlers: &mut Vec<Handler>,
    embedded: &mut Vec<Value>,
) -> Result<Invocation, CompileError> {
    let (definition, caps) = find_pattern(leaf_masked, patterns)
        .ok_or_else(|| CompileError::NoMatchingPattern(leaf.to_string()))?;

    let operator_groups = capture_groups(&caps, leaf);

    match definition {
        PatternDefinition::Raw { build, .. } => {
            let raw_match = RawMatch {
                leaf,
                groups: operator_groups,
            };
            let mut embedder = Embedder::new(embedded);
            let node = build(&raw_match, &mut embedder)?;

            Ok(Invocation::Raw {
                leaf: leaf.to_string(),
                node,
            })
        }

        PatternDefinition::Operator {
            shape,
            matcher,
            validate,
            handler,
        } => {
            let full = match caps.get(0) {
                Some(m) => m,
                None => return Err(CompileError::NoMatchingPattern(leaf.to_string())),
            };

            let (spans, all_values) = match shape {
                OperatorShape::Infix => (split_ranges(leaf_masked, matcher), false),
                OperatorShape::Prefix => (vec![full.end()..leaf.len()], false),
                OperatorShape::Postfix => (vec![0..full.start()], false),
                OperatorShape::Function => function_arguments(leaf, &caps),
            };

            let arg_sources: Vec<String> =
                spans.iter().map(|s| leaf[s.clone()].to_string()).collect();

            if let Some(validate) = validate {
                let seen_by_validator: Vec<String> = if all_values {
                    vec!["..._".to_string()]
                } else {
                    arg_sources.clone()
                };
                validate(&seen_by_validator, &operator_groups).map_err(|e| {
                    CompileError::Validation {
                        leaf: leaf.to_string(),
                        message: e.message().to_string(),
                    }
                })?;
            }

            let args = if all_values {
                ArgList::AllValues
            } else {
                ArgList::Exact(
                    arg_sources
                        .iter()
                        .map(|source| parse_argument(leaf, source, slots))
                        .collect::<Result<_, _>>()?,
                )
            };

            let leaf_info = if all_values {
                LeafInfo {
                    arg_sources: Vec::new(),
                    fragments: vec![leaf.to_string()],
                    snippets: vec![leaf.to_string()],
                }
            } else {
                let mut snippets = Vec::with_capacity(arg_sources.len() + 1);
                snippets.push(leaf.to_string());
                snippets.extend(arg_sources.iter().cloned());

                LeafInfo {
                    fragments: leaf_fragments(leaf, &spans),
                    arg_sources,
                    snippets,
                }
            };

            Ok(Invocation::Call {
                handler: handler_slot(handlers, handler),
                args,
                leaf: leaf_info,
            })
        }
    }
}

/// Argument spans of a function-call leaf, relative to the leaf.
///
/// The whole-condition mask fills the call's parentheses, so the interior is
/// re-masked on its own before splitting on top-level commas. Returns the
/// spans and whether the call is the `..._` spread.
fn function_arguments(leaf: &str, caps: &Captures<'_>) -> (Vec<Range<usize>>, bool) {
    let name_end = caps.get(1).map(|g| g.end()).unwrap_or(0);
    let inner_start = name_end + 1;
    let inner_end = leaf.len() - 1;
    let interior = &leaf[inner_start..inner_end];

    if interior.trim().is_empty() {
        return (Vec::new(), false);
    }
    if interior.trim() == "..._" {
        return (Vec::new(), true);
    }

    let interior_masked = mask(interior);
    let spans = split_ranges(&interior_masked, &ARGUMENT_COMMA)
        .into_iter()
        .map(|r| inner_start + r.start..inner_start + r.end)
        .collect();

    (spans, false)
}

/// The leaf split around its argument spans; `spans.len() + 1` fragments.
fn leaf_fragments(leaf: &str, spans: &[Range<usize>]) -> Vec<String> {
    let mut fragments = Vec::with_capacity(spans.len() + 1);
    let mut previous = 0;

    for span in spans {
        fragments.push(leaf[previous..span.start].to_string());
        previous = span.end;
    }
    fragments.push(leaf[previous..].to_string());

    fragments
}

fn handler_slot(handlers: &mut Vec<Handler>, handler: &Handler) -> usize {
    match handlers.iter().position(|h| Rc::ptr_eq(h, handler)) {
        Some(slot) => slot,
        None => {
            handlers.push(handler.clone());
            handlers.len() - 1
        }
    }
}

fn unsupported(leaf: &str, argument: &str) -> CompileError {
    CompileError::UnsupportedArgument {
        leaf: leaf.to_string(),
        argument: argument.to_string(),
    }
}

/// Parses one argument's source text into the evaluable grammar: a lone slot
/// marker, or a literal (number, string, regex, boolean, null). Anything else
/// is a compile error.
fn parse_argument(leaf: &str, source: &str, slots: usize) -> Result<ArgExpr, CompileError> {
    let text = source.trim();

    if let Some(caps) = SLOT_MARKER.captures(text) {
        let index: usize = caps[1].parse().map_err(|_| unsupported(leaf, source))?;
        if index >= slots {
            return Err(CompileError::UnknownSlot {
                leaf: leaf.to_string(),
                index,
            });
        }
        return Ok(ArgExpr::Slot(index));
    }

    match text {
        "true" => return Ok(ArgExpr::Literal(Value::Bool(true))),
        "false" => return Ok(ArgExpr::Literal(Value::Bool(false))),
        "null" => return Ok(ArgExpr::Literal(Value::Null)),
        _ => {}
    }

    if NUMBER.is_match(text) {
        if !text.contains('.') && !text.contains('e') && !text.contains('E') {
            if let Ok(int) = text.parse::<i64>() {
                return Ok(ArgExpr::Literal(Value::Int(int)));
            }
        }
        return text
            .parse::<f64>()
            .map(|float| ArgExpr::Literal(Value::Float(float)))
            .map_err(|_| unsupported(leaf, source));
    }

    if text.len() >= 2 {
        let bytes = text.as_bytes();
        if (bytes[0] == b'"' && bytes[text.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[text.len() - 1] == b'\'')
        {
            return Ok(ArgExpr::Literal(Value::Str(unescape(
                &text[1..text.len() - 1],
            ))));
        }
    }

    if let Some(caps) = REGEX_LITERAL.captures(text) {
        let body = &caps[1];
        let flags: String = caps[2].chars().filter(|c| "imsxuU".contains(*c)).collect();
        let pattern = if flags.is_empty() {
            body.to_string()
        } else {
            format!("(?{}){}", flags, body)
        };
        return Regex::new(&pattern)
            .map(|re| ArgExpr::Literal(Value::pattern(re)))
            .map_err(|_| unsupported(leaf, source));
    }

    Err(unsupported(leaf, source))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }

    out
}

/// Deterministic rendering of the compiled form, exposed through `source()`.
fn render_source(branches: &[Vec<Invocation>], embedded: &[Value]) -> String {
    let mut out = String::new();

    for (i, value) in embedded.iter().enumerate() {
        writeln!(out, "values[{}] = {:?}", i, value).unwrap();
    }

    for (i, branch) in branches.iter().enumerate() {
        writeln!(out, "branch {}:", i).unwrap();

        for invocation in branch {
            match invocation {
                Invocation::Call { handler, args, leaf } => {
                    let rendered_args = match args {
                        ArgList::AllValues => "..._".to_string(),
                        ArgList::Exact(list) => list
                            .iter()
                            .map(|arg| match arg {
                                ArgExpr::Slot(slot) => format!("_[{}]", slot),
                                ArgExpr::Literal(value) => format!("{:?}", value),
                            })
                            .collect::<Vec<_>>()
                            .join(", "),
                    };
                    let snippets = leaf
                        .snippets
                        .iter()
                        .map(|s| format!("{:?}", s))
                        .collect::<Vec<_>>()
                        .join(", ");

                    writeln!(out, "  handlers[{}]([{}], [{}])", handler, rendered_args, snippets)
                        .unwrap();
                }
                Invocation::Raw { node, .. } => {
                    writeln!(out, "  {}", node.rendering).unwrap();
                }
            }
        }
    }

    out.push_str("raise first failure\n");
    out
}
