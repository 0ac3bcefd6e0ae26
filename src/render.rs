//! Failure report rendering.
//!
//! Builds the aligned multi-line diagnostic for an
//! [`AssertionFailure`](crate::failure::AssertionFailure): a summary line with
//! the failing condition and its values inlined (or elided), underline rows
//! beneath the spans the values came from, value rows aligned by column, and
//! an overflow block for values too large to place inline. Rendering never
//! errors: cycles collapse to `...`, oversized values to `(...)` or the
//! overflow block.

use crate::failure::AssertionFailure;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Default column budget for the summary line.
pub const MAX_SUMMARY_WIDTH: usize = 80;

/// Column budget under which a value may still be inlined in the short-form
/// summary.
const SHORT_VALUE_WIDTH: usize = 6;

/// The fixed-width placeholder standing in for a value that could not be
/// inlined.
const PLACEHOLDER: &str = "(...)";

static TEMPLATE_ARG: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\[(\d+)\]").unwrap());
static BARE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{L}0-9$_]+$").unwrap());

fn text_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

// Value stringification ----------------------------------------------------

/// Renders `value` within a display-width budget. `None` means the rendering
/// would exceed the budget; the value is "unrenderable" at this width, never
/// truncated.
pub fn stringify_value(value: &Value, max_width: usize) -> Option<String> {
    stringify(value, String::new(), "\n", max_width, &mut Vec::new())
}

/// Cycle-safe single-line rendering with no budget, used by `Debug`.
pub(crate) fn debug_value(value: &Value) -> String {
    stringify(value, String::new(), "\n", usize::MAX, &mut Vec::new())
        .unwrap_or_else(|| "...".to_string())
}

/// The workhorse renderer. Threads the accumulated text through so the budget
/// covers the whole line under construction; `max_len == 0` selects the
/// unconstrained indentation-based multi-line mode used by the overflow
/// block. `seen` holds the container identities already visited in this
/// rendering; revisiting one yields `...` instead of recursing.
pub(crate) fn stringify(
    value: &Value,
    text: String,
    indent: &str,
    max_len: usize,
    seen: &mut Vec<usize>,
) -> Option<String> {
    let bounded = |text: String| {
        if max_len > 0 && text_width(&text) > max_len {
            None
        } else {
            Some(text)
        }
    };

    // Cycle detection up front: a container already on the path renders as
    // an ellipsis instead of recursing.
    if let Some(identity) = value.container_id() {
        if seen.contains(&identity) {
            return bounded(text + "...");
        }
        seen.push(identity);
    }

    match value {
        Value::Null => bounded(text + "null"),
        Value::Bool(true) => bounded(text + "true"),
        Value::Bool(false) => bounded(text + "false"),
        Value::Int(int) => bounded(format!("{}{}", text, int)),
        Value::Float(float) => {
            if float.is_nan() {
                bounded(text + "NaN")
            } else {
                bounded(format!("{}{}", text, float))
            }
        }
        Value::Str(string) => bounded(format!("{}{:?}", text, string)),
        Value::Pattern(regex) => bounded(format!("{}/{}/", text, regex.as_str())),
        Value::Func(func) => {
            if func.class_like {
                bounded(format!("{}class {}", text, func.name))
            } else {
                let name = if func.name.is_empty() { "ƒ" } else { &func.name };
                bounded(format!("{}{}({})", text, name, func.params))
            }
        }

        Value::List(items) => {
            let items = items.borrow().clone();
            stringify_items(items, text, indent, max_len, seen)
        }
        Value::Set(items) => {
            let mut items = items.borrow().clone();
            items.sort_by_cached_key(|item| sort_key(item, seen));
            stringify_items(items, text + "Set ", indent, max_len, seen)
        }
        Value::Map(entries) => {
            // Entries render as [key, value] pairs, sorted for determinism.
            let mut items: Vec<Value> = entries
                .borrow()
                .iter()
                .map(|(key, value)| Value::list(vec![key.clone(), value.clone()]))
                .collect();
            items.sort_by_cached_key(|item| sort_key(item, seen));
            stringify_items(items, text + "Map ", indent, max_len, seen)
        }
        Value::Record(record) => {
            if let Some(display) = &record.display {
                if max_len > 0
                    && (text_width(&text) + text_width(display) > max_len
                        || display.contains('\n'))
                {
                    return None;
                }
                return Some(text + display);
            }
            stringify_fields(record, text, indent, max_len, seen)
        }
    }
}

/// Single-line rendering used to order container entries. Inherits the
/// current `seen` path so sorting a cyclic container terminates.
fn sort_key(item: &Value, seen: &[usize]) -> String {
    stringify(item, String::new(), "\n", usize::MAX, &mut seen.to_vec())
        .unwrap_or_else(|| "...".to_string())
}

fn stringify_items(
    items: Vec<Value>,
    mut text: String,
    indent: &str,
    max_len: usize,
    seen: &mut Vec<usize>,
) -> Option<String> {
    let child_indent = format!("{}  ", indent);
    let comma = if max_len == 0 {
        format!(",{}", child_indent)
    } else {
        ", ".to_string()
    };

    text.push('[');
    if max_len == 0 {
        text.push_str(&child_indent);
    }

    let count = items.len();
    for (i, item) in items.into_iter().enumerate() {
        text = stringify(&item, text, &child_indent, max_len, seen)?;

        if max_len > 0 && text_width(&text) > max_len {
            return None;
        }
        if i + 1 < count {
            text.push_str(&comma);
        }
    }

    if max_len == 0 {
        text.push(',');
        text.push_str(indent);
    }
    text.push(']');

    Some(text)
}

fn stringify_fields(
    record: &crate::value::RecordValue,
    mut text: String,
    indent: &str,
    max_len: usize,
    seen: &mut Vec<usize>,
) -> Option<String> {
    let fields = record.fields.borrow().clone();
    let child_indent = format!("{}  ", indent);
    let comma = if max_len == 0 {
        format!(",{}", child_indent)
    } else {
        ", ".to_string()
    };

    if fields.is_empty() {
        text.push_str("{}");
        return Some(text);
    }

    for (i, (key, value)) in fields.iter().enumerate() {
        if i == 0 {
            if max_len == 0 {
                text.push('{');
                text.push_str(&child_indent);
            } else {
                text.push_str("{ ");
            }
        } else {
            text.push_str(&comma);
        }

        if BARE_KEY.is_match(key) {
            text.push_str(key);
        } else {
            text.push_str(&format!("{:?}", key));
        }
        text.push_str(": ");

        text = stringify(value, text, &child_indent, max_len, seen)?;

        if max_len > 0 && text_width(&text) > max_len {
            return None;
        }
    }

    text.push_str(if max_len == 0 { "}" } else { " }" });
    Some(text)
}

// Summary line assembly -----------------------------------------------------

/// Which value a recorded column span belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// The n-th argument of the failing leaf.
    Argument(usize),
    /// The n-th interpolated value, elided to a placeholder in the short-form
    /// summary.
    Shortened(usize),
}

/// A column span in the summary line attributed to one value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SummaryRange {
    slot: Slot,
    start: usize,
    end: usize,
}

/// Substitutes each `_[i]` marker in an argument source with the bounded
/// rendering of its value; `None` aborts to the short form.
fn substitute_bounded(
    arg_source: &str,
    interpolated: &[Value],
    max_len: usize,
) -> Option<String> {
    let mut result = String::new();
    let mut last = 0;

    for caps in TEMPLATE_ARG.captures_iter(arg_source) {
        let marker = caps.get(0)?;
        let index: usize = caps[1].parse().ok()?;

        result.push_str(&arg_source[last..marker.start()]);
        result = stringify(
            interpolated.get(index)?,
            result,
            "\n  ",
            max_len,
            &mut Vec::new(),
        )?;
        last = marker.end();
    }

    result.push_str(&arg_source[last..]);
    Some(result)
}

/// Short-form substitution: values that fit [`SHORT_VALUE_WIDTH`] columns are
/// still inlined; the rest become placeholders with a recorded range.
fn substitute_short(
    arg_source: &str,
    interpolated: &[Value],
    range_offset: usize,
    ranges: &mut Vec<SummaryRange>,
) -> String {
    let mut result = String::new();
    let mut last = 0;

    for caps in TEMPLATE_ARG.captures_iter(arg_source) {
        let marker = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let index: usize = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };

        result.push_str(&arg_source[last..marker.start()]);
        last = marker.end();

        let short = interpolated
            .get(index)
            .and_then(|value| stringify(value, String::new(), "\n", SHORT_VALUE_WIDTH, &mut Vec::new()));

        match short {
            Some(rendered) => result.push_str(&rendered),
            None => {
                let start = range_offset + text_width(&result);
                ranges.push(SummaryRange {
                    slot: Slot::Shortened(index),
                    start,
                    end: start + PLACEHOLDER.len(),
                });
                result.push_str(PLACEHOLDER);
            }
        }
    }

    result.push_str(&arg_source[last..]);
    result
}

fn build_summary(
    failure: &AssertionFailure,
    max_width: usize,
    ranges: &mut Vec<SummaryRange>,
) -> String {
    let fragments = failure.fragments();
    let mut line = String::from("  ");

    for (i, arg_source) in failure.argument_sources().iter().enumerate() {
        let remaining = max_width.saturating_sub(text_width(&line));

        let rendered = match substitute_bounded(arg_source, failure.interpolated(), remaining) {
            Some(rendered) => rendered,
            None => return build_summary_short(failure, ranges),
        };

        line.push_str(&fragments[i]);
        let start = text_width(&line);
        line.push_str(&rendered);

        if text_width(&line) >= max_width {
            return build_summary_short(failure, ranges);
        }

        ranges.push(SummaryRange {
            slot: Slot::Argument(i),
            start,
            end: text_width(&line),
        });
    }

    line.push_str(fragments.last().map(String::as_str).unwrap_or(""));
    line
}

fn build_summary_short(failure: &AssertionFailure, ranges: &mut Vec<SummaryRange>) -> String {
    ranges.clear();

    let fragments = failure.fragments();
    let mut line = String::from("  ");

    for (i, arg_source) in failure.argument_sources().iter().enumerate() {
        line.push_str(&fragments[i]);
        let start = text_width(&line);

        let rendered = substitute_short(arg_source, failure.interpolated(), start, ranges);
        line.push_str(&rendered);

        if let Some(last) = ranges.last() {
            // The whole argument collapsed to exactly one placeholder; its
            // range already covers it.
            if last.start == start && text_width(&line) == last.end {
                continue;
            }
        }

        ranges.push(SummaryRange {
            slot: Slot::Argument(i),
            start,
            end: text_width(&line),
        });
    }

    line.push_str(fragments.last().map(String::as_str).unwrap_or(""));
    line
}

// Layout --------------------------------------------------------------------

/// True when every character covering display columns `[start, end)` is a
/// space (positions past the end of the line count as blank).
fn columns_blank(line: &str, start: usize, end: usize) -> bool {
    let mut column = 0;

    for ch in line.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if column + w > start && column < end && ch != ' ' {
            return false;
        }
        column += w;
        if column >= end {
            break;
        }
    }

    true
}

/// Overwrites display columns `[start, end)` with the glyph.
fn fill_columns(line: &mut String, start: usize, end: usize, glyph: char) {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;

    for ch in line.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if column >= start && column < end && w == 1 {
            out.push(glyph);
        } else {
            out.push(ch);
        }
        column += w;
    }

    *line = out;
}

/// Writes the glyph at the given column when the character there is one of
/// `allowed`; otherwise leaves the line alone.
fn set_column_if(line: &mut String, target: usize, allowed: &[char], glyph: char) {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    let mut done = false;

    for ch in line.chars() {
        if !done && column == target && allowed.contains(&ch) {
            out.push(glyph);
            done = true;
        } else {
            out.push(ch);
        }
        column += UnicodeWidthChar::width(ch).unwrap_or(0);
    }

    *line = out;
}

/// Renders the full report for a failure.
pub(crate) fn render_report(failure: &AssertionFailure, max_width: usize) -> String {
    let mut ranges = Vec::new();
    let summary = build_summary(failure, max_width, &mut ranges);
    let relaxed_width = std::cmp::max(max_width, text_width(&summary) + 10);

    let mut underlines: Vec<String> = Vec::new();
    let mut value_lines: Vec<String> = Vec::new();
    let mut placements: Vec<(usize, usize, usize)> = Vec::new();
    let mut used_columns: Vec<usize> = Vec::new();
    let mut overflow = String::new();
    let mut overflow_count = 0usize;

    for range in &ranges {
        let underline_row = match underlines
            .iter()
            .position(|line| columns_blank(line, range.start, range.end))
        {
            Some(row) => row,
            None => {
                underlines.push(" ".repeat(text_width(&summary)));
                underlines.len() - 1
            }
        };

        // Prefer the range's own start column; failing that, a free column
        // right after the previous free candidate; else the last free column
        // seen. No free column at all: give up on this connector.
        let mut candidate = None;
        for column in range.start..range.end {
            if !used_columns.contains(&column) {
                if column == range.start || candidate == Some(column.wrapping_sub(1)) {
                    candidate = Some(column);
                    break;
                }
                candidate = Some(column);
            }
        }
        let column = match candidate {
            Some(column) => column,
            None => continue,
        };

        fill_columns(&mut underlines[underline_row], range.start, range.end, '¯');

        let value = match range.slot {
            Slot::Argument(index) => failure.argument_values().get(index),
            Slot::Shortened(index) => failure.interpolated().get(index),
        };
        let value = match value {
            Some(value) => value,
            None => continue,
        };

        let rendered = match stringify(value, String::new(), "", relaxed_width, &mut Vec::new()) {
            Some(rendered) => rendered,
            None => {
                let label = format!("value #{}", overflow_count);
                let prefix = format!("\n  {}: ", label);
                let block = stringify(value, prefix.clone(), "\n  ", 0, &mut Vec::new())
                    .unwrap_or_else(|| format!("{}...", prefix));
                overflow.push_str(&block);
                overflow_count += 1;
                label
            }
        };

        let value_row = match value_lines
            .iter()
            .position(|line| text_width(line) < column)
        {
            Some(row) => {
                let padding = column - text_width(&value_lines[row]);
                value_lines[row].push_str(&" ".repeat(padding));
                value_lines[row].push_str(&rendered);
                row
            }
            None => {
                value_lines.push(format!("{}{}", " ".repeat(column), rendered));
                value_lines.len() - 1
            }
        };

        used_columns.push(column);
        placements.push((column, underline_row, value_row));
    }

    // Vertical connectors: through every underline row from the value's own
    // downward, and every value row above its own.
    for &(column, underline_row, value_row) in &placements {
        for line in underlines.iter_mut().skip(underline_row) {
            set_column_if(line, column, &[' ', '¯'], '|');
        }
        for line in value_lines.iter_mut().take(value_row) {
            if text_width(line) < column {
                let padding = column - text_width(line);
                line.push_str(&" ".repeat(padding));
                line.push('|');
            } else {
                set_column_if(line, column, &[' '], '|');
            }
        }
    }

    let mut message = format!("assertion failed:\n{}", summary);

    if value_lines.is_empty() {
        return message;
    }

    for line in &underlines {
        message.push('\n');
        message.push_str(line.trim_end());
    }
    for line in &value_lines {
        message.push('\n');
        message.push_str(line.trim_end());
    }

    if overflow_count > 0 {
        message.push_str("\n\nwith:");
        message.push_str(&overflow);
    }

    message
}
