//! Text helpers shared by the evaluator and the payload resolver

use std::sync::OnceLock;

use regex::{NoExpand, Regex};

use crate::marker::INPUT_MARKER;

/// Replace every `input` (case-sensitive) with the payload
pub fn replace_input(text: &str, payload: &str) -> String {
    text.replace(INPUT_MARKER, payload)
}

/// Replace every `input` regardless of case with the payload
pub fn replace_input_ignore_case(text: &str, payload: &str) -> String {
    static INPUT: OnceLock<Regex> = OnceLock::new();
    let re = INPUT.get_or_init(|| Regex::new(r"(?i)input").expect("valid input regex"));
    re.replace_all(text, NoExpand(payload)).into_owned()
}

pub fn contains_ignore_case(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(&needle.to_lowercase())
}

/// Any of `+ - * / ^ = %`
pub fn has_math_operators(text: &str) -> bool {
    text.contains(['+', '-', '*', '/', '^', '=', '%'])
}

/// Whether a resolved payload should be handed to the scalar evaluator
pub fn looks_like_calculation(text: &str) -> bool {
    has_math_operators(text) || contains_ignore_case(text, "NOT")
}

/// Split on every occurrence of any of `separators`
///
/// Returns `None` when no separator is present. Parts are trimmed.
pub fn split_any<'a>(text: &'a str, separators: &[&str]) -> Option<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut rest = text;

    loop {
        let next = separators
            .iter()
            .filter_map(|sep| rest.find(sep).map(|pos| (pos, sep.len())))
            .min_by_key(|(pos, _)| *pos);

        match next {
            Some((pos, len)) => {
                parts.push(rest[..pos].trim());
                rest = &rest[pos + len..];
            }
            None => {
                parts.push(rest.trim());
                break;
            }
        }
    }

    (parts.len() > 1).then_some(parts)
}

/// Resolve backslash escapes the way C-like string literals do
///
/// Unknown escapes keep the escaped character, a trailing backslash is kept.
pub fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        out.push(decoded);
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_input() {
        assert_eq!(replace_input("input > 5", "7"), "7 > 5");
        assert_eq!(replace_input("INPUT > 5", "7"), "INPUT > 5");
        assert_eq!(replace_input_ignore_case("Input + INPUT", "2"), "2 + 2");
        assert_eq!(replace_input_ignore_case("input", "$1 cost"), "$1 cost");
    }

    #[test]
    fn test_looks_like_calculation() {
        assert!(looks_like_calculation("200 + 10"));
        assert!(looks_like_calculation("not 1"));
        assert!(looks_like_calculation("a = b"));
        assert!(!looks_like_calculation("ON"));
        assert!(!looks_like_calculation("#27F25E"));
    }

    #[test]
    fn test_split_any() {
        assert_eq!(
            split_any("a > 1 && b < 2", &[" && ", " and "]),
            Some(vec!["a > 1", "b < 2"])
        );
        assert_eq!(
            split_any("a and b", &[" && ", " and "]),
            Some(vec!["a", "b"])
        );
        assert_eq!(
            split_any("a && b and c", &[" && ", " and "]),
            Some(vec!["a", "b", "c"])
        );
        assert_eq!(split_any("a > 1", &[" && ", " and "]), None);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"line\nbreak"), "line\nbreak");
        assert_eq!(unescape(r#"say \"hi\""#), "say \"hi\"");
        assert_eq!(unescape(r"°C"), "°C");
        assert_eq!(unescape(r"a\/b\\c"), r"a/b\c");
        assert_eq!(unescape(r"\q"), "q");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("tail\\"), "tail\\");
    }
}
