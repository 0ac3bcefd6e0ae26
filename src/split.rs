//! Boundary splitting over masked text.

use regex::Regex;
use std::ops::Range;

/// Splits `text` at every match of `boundary`, returning the byte ranges of
/// the spans between matches.
///
/// The intended use is to run this against a masked copy (see
/// [`mask`](crate::mask::mask)) so boundaries inside quotes or brackets are
/// never hit; because the masked copy is byte-aligned with the original, the
/// returned ranges index the original text directly.
///
/// With no match at all the whole text is one span. A zero-length match
/// advances by one character instead of looping.
pub fn split_ranges(text: &str, boundary: &Regex) -> Vec<Range<usize>> {
    let mut sections = Vec::new();
    let mut start = 0;

    loop {
        let rest = &text[start..];

        let m = match boundary.find(rest) {
            Some(m) => m,
            None => {
                sections.push(start..text.len());
                return sections;
            }
        };

        sections.push(start..start + m.start());

        let mut advance = m.end();
        if advance == m.start() {
            match rest[advance..].chars().next() {
                Some(ch) => advance += ch.len_utf8(),
                None => return sections,
            }
        }
        start += advance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static OR_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r" +(\|\||or) +").unwrap());

    #[test]
    fn test_no_match_is_single_span() {
        let spans = split_ranges("a === b", &OR_BOUNDARY);
        assert_eq!(spans, vec![0..7]);
    }

    #[test]
    fn test_splits_between_boundaries() {
        let text = "a or b or c";
        let spans = split_ranges(text, &OR_BOUNDARY);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].clone()], "a");
        assert_eq!(&text[spans[1].clone()], "b");
        assert_eq!(&text[spans[2].clone()], "c");
    }

    #[test]
    fn test_symbolic_and_alphabetic_boundaries_mix() {
        let text = "a || b or c";
        let spans = split_ranges(text, &OR_BOUNDARY);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[2].clone()], "c");
    }

    #[test]
    fn test_masked_offsets_index_original() {
        let original = "\"x or y\" or z";
        let masked = crate::mask::mask(original);
        let spans = split_ranges(&masked, &OR_BOUNDARY);
        assert_eq!(spans.len(), 2);
        assert_eq!(&original[spans[0].clone()], "\"x or y\"");
        assert_eq!(&original[spans[1].clone()], "z");
    }

    #[test]
    fn test_zero_length_match_advances() {
        let boundary = Regex::new("x*").unwrap();
        // Every position matches with length zero; must terminate.
        let spans = split_ranges("ab", &boundary);
        assert!(spans.len() <= 3);
    }

    #[test]
    fn test_boundary_needs_surrounding_spaces() {
        // "orbit" contains "or" but is not a boundary.
        let spans = split_ranges("a orbit b", &OR_BOUNDARY);
        assert_eq!(spans, vec![0..9]);
    }
}
