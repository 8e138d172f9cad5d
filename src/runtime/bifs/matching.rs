//! Regex operators: `=~`, `sub`, `gsub`, `regextract` and capture
//! interpolation for `"\1"`-style string literals.

use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Mlrval,
};
use regex::{Captures, Regex, RegexBuilder};

/// Captures `\0` through `\9` of the most recent successful `=~`.
pub const CAPTURE_SLOTS: usize = 10;

pub fn compile(pattern: &str, case_insensitive: bool) -> RuntimeResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| RuntimeError::InvalidRegex {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}

/// `=~`. The second element is the new capture list: filled on a match,
/// all-empty on a non-match, `None` when the input is absent and captures
/// should be left alone.
pub fn matches(input: &Mlrval, regex: &Regex) -> (Mlrval, Option<Vec<String>>) {
    match input {
        Mlrval::Absent => (Mlrval::Absent, None),
        Mlrval::Error => (Mlrval::Error, None),
        other => {
            let text = other.to_string();
            match regex.captures(&text) {
                Some(found) => (Mlrval::Boolean(true), Some(capture_list(&found))),
                None => (Mlrval::Boolean(false), Some(vec![String::new(); CAPTURE_SLOTS])),
            }
        }
    }
}

pub fn does_not_match(input: &Mlrval, regex: &Regex) -> Mlrval {
    match matches(input, regex).0 {
        Mlrval::Boolean(b) => Mlrval::Boolean(!b),
        other => other,
    }
}

fn capture_list(found: &Captures<'_>) -> Vec<String> {
    let mut captures: Vec<String> = found
        .iter()
        .take(CAPTURE_SLOTS)
        .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect();
    captures.resize(CAPTURE_SLOTS, String::new());
    captures
}

/// True when `text` mentions any of `\0`..`\9`.
pub fn has_capture_refs(text: &str) -> bool {
    text.as_bytes()
        .windows(2)
        .any(|pair| pair[0] == b'\\' && pair[1].is_ascii_digit())
}

/// Replaces `\0`..`\9` in `text` from `captures`. Without captures the text
/// is returned as written.
pub fn interpolate_captures(text: &str, captures: Option<&[String]>) -> String {
    let Some(captures) = captures else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(index) = chars.peek().and_then(|next| next.to_digit(10)) {
                if let Some(capture) = captures.get(index as usize) {
                    out.push_str(capture);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Rewrites `\1`-style references into the regex crate's `${1}` syntax and
/// escapes literal dollars.
fn replacement_template(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '$' => out.push_str("$$"),
            '\\' if chars.peek().is_some_and(char::is_ascii_digit) => {
                if let Some(digit) = chars.next() {
                    out.push_str("${");
                    out.push(digit);
                    out.push('}');
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn substitute(input: &Mlrval, regex: &Regex, replacement: &Mlrval, limit: usize) -> Mlrval {
    match (input, replacement) {
        (Mlrval::Error, _) | (_, Mlrval::Error) => Mlrval::Error,
        (Mlrval::Absent, _) => Mlrval::Absent,
        _ => {
            let text = input.to_string();
            let template = replacement_template(&replacement.to_string());
            Mlrval::from_string(regex.replacen(&text, limit, template.as_str()).into_owned())
        }
    }
}

pub fn sub(input: &Mlrval, regex: &Regex, replacement: &Mlrval) -> Mlrval {
    substitute(input, regex, replacement, 1)
}

pub fn gsub(input: &Mlrval, regex: &Regex, replacement: &Mlrval) -> Mlrval {
    substitute(input, regex, replacement, 0)
}

/// The first match, or error when there is none.
pub fn regextract(input: &Mlrval, regex: &Regex) -> Mlrval {
    regextract_or_else(input, regex, &Mlrval::Error)
}

pub fn regextract_or_else(input: &Mlrval, regex: &Regex, fallback: &Mlrval) -> Mlrval {
    match input {
        Mlrval::Absent | Mlrval::Error => input.clone(),
        other => {
            let text = other.to_string();
            match regex.find(&text) {
                Some(found) => Mlrval::from_string(found.as_str()),
                None => fallback.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Mlrval {
        Mlrval::String(text.into())
    }

    fn re(pattern: &str) -> Regex {
        compile(pattern, false).expect("regex")
    }

    #[test]
    fn match_sets_and_clears_captures() {
        let (result, captures) = matches(&s("ab_cde"), &re("(..)_(...)"));
        assert_eq!(result, Mlrval::Boolean(true));
        let captures = captures.expect("captures");
        assert_eq!(interpolate_captures("\\2:\\1", Some(&captures)), "cde:ab");
        assert_eq!(interpolate_captures("\\0!", Some(&captures)), "ab_cde!");

        let (result, cleared) = matches(&s("zzz"), &re("(..)_(...)"));
        assert_eq!(result, Mlrval::Boolean(false));
        assert_eq!(interpolate_captures("[\\1]", cleared.as_deref()), "[]");
    }

    #[test]
    fn without_captures_text_is_verbatim() {
        assert_eq!(interpolate_captures("a\\1b", None), "a\\1b");
        assert!(has_capture_refs("x\\3"));
        assert!(!has_capture_refs("x\\t"));
    }

    #[test]
    fn case_insensitive_literals() {
        let regex = compile("^ABC", true).expect("regex");
        assert_eq!(matches(&s("abcdef"), &regex).0, Mlrval::Boolean(true));
        assert_eq!(does_not_match(&s("xabc"), &regex), Mlrval::Boolean(true));
        assert!(compile("(", false).is_err());
    }

    #[test]
    fn sub_and_gsub_use_backslash_groups() {
        assert_eq!(sub(&s("abcabc"), &re("b"), &s("X")), s("aXcabc"));
        assert_eq!(gsub(&s("abcabc"), &re("b"), &s("X")), s("aXcaXc"));
        assert_eq!(sub(&s("ab_cd"), &re("(..)_(..)"), &s("\\2_\\1")), s("cd_ab"));
        assert_eq!(sub(&s("price"), &re("price"), &s("$5")), s("$5"));
        assert_eq!(sub(&Mlrval::Absent, &re("a"), &s("b")), Mlrval::Absent);
    }

    #[test]
    fn regextract_variants() {
        assert_eq!(regextract(&s("abc123def"), &re("[0-9]+")), s("123"));
        assert_eq!(regextract(&s("abc"), &re("[0-9]+")), Mlrval::Error);
        assert_eq!(
            regextract_or_else(&s("abc"), &re("[0-9]+"), &s("none")),
            s("none")
        );
    }
}
