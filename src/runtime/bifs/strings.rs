//! String and conversion functions.

use crate::runtime::{
    format::NumberFormat,
    infer::Number,
    value::Mlrval,
};

/// Applies `f` to the text of string inputs. Numbers and booleans pass
/// through unchanged, as do the signal values.
fn on_strings(a: &Mlrval, f: impl Fn(&str) -> String) -> Mlrval {
    match a {
        Mlrval::String(s) => Mlrval::from_string(f(s)),
        other => other.clone(),
    }
}

pub fn strlen(a: &Mlrval) -> Mlrval {
    match a {
        Mlrval::Absent | Mlrval::Error => a.clone(),
        other => Mlrval::Int(other.to_string().chars().count() as i64),
    }
}

pub fn toupper(a: &Mlrval) -> Mlrval {
    on_strings(a, str::to_uppercase)
}

pub fn tolower(a: &Mlrval) -> Mlrval {
    on_strings(a, str::to_lowercase)
}

pub fn capitalize(a: &Mlrval) -> Mlrval {
    on_strings(a, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    })
}

pub fn lstrip(a: &Mlrval) -> Mlrval {
    on_strings(a, |s| s.trim_start().to_string())
}

pub fn rstrip(a: &Mlrval) -> Mlrval {
    on_strings(a, |s| s.trim_end().to_string())
}

pub fn strip(a: &Mlrval) -> Mlrval {
    on_strings(a, |s| s.trim().to_string())
}

fn collapse(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

pub fn collapse_whitespace(a: &Mlrval) -> Mlrval {
    on_strings(a, collapse)
}

pub fn clean_whitespace(a: &Mlrval) -> Mlrval {
    on_strings(a, |s| collapse(s).trim().to_string())
}

pub fn truncate(a: &Mlrval, length: &Mlrval) -> Mlrval {
    match (a, length) {
        (Mlrval::Error, _) | (_, Mlrval::Error) => Mlrval::Error,
        (Mlrval::Absent, _) => Mlrval::Absent,
        (_, Mlrval::Absent) => a.clone(),
        _ => match length.as_int() {
            Some(n) if n >= 0 => {
                let text = a.to_string();
                match text.char_indices().nth(n as usize) {
                    Some((cut, _)) => Mlrval::from_string(&text[..cut]),
                    None => a.clone(),
                }
            }
            _ => Mlrval::Error,
        },
    }
}

/// Characters `m` through `n` of the string form, 0-up and inclusive.
pub fn substr(a: &Mlrval, m: &Mlrval, n: &Mlrval) -> Mlrval {
    if a.is_absent() {
        return Mlrval::Absent;
    }
    if a.is_error() {
        return Mlrval::Error;
    }
    let (Some(m), Some(n)) = (m.as_int(), n.as_int()) else {
        return Mlrval::Error;
    };
    let chars: Vec<char> = a.to_string().chars().collect();
    let len = chars.len() as i64;
    if m < 0 || n >= len {
        return Mlrval::Error;
    }
    if n < m {
        return Mlrval::Void;
    }
    Mlrval::from_string(chars[m as usize..=n as usize].iter().collect::<String>())
}

/// Replaces the first literal occurrence of `old`.
pub fn ssub(a: &Mlrval, old: &Mlrval, new: &Mlrval) -> Mlrval {
    match (a, old, new) {
        (Mlrval::Error, _, _) | (_, Mlrval::Error, _) | (_, _, Mlrval::Error) => Mlrval::Error,
        (Mlrval::Absent, _, _) => Mlrval::Absent,
        _ => Mlrval::from_string(a.to_string().replacen(&old.to_string(), &new.to_string(), 1)),
    }
}

pub fn to_int(a: &Mlrval) -> Mlrval {
    match a {
        Mlrval::Absent | Mlrval::Void | Mlrval::Error => a.clone(),
        Mlrval::Boolean(b) => Mlrval::Int(i64::from(*b)),
        other => match other.as_number() {
            Some(Number::Int(i)) => Mlrval::Int(i),
            Some(Number::Float(f)) => Mlrval::Int(f.trunc() as i64),
            None => Mlrval::Error,
        },
    }
}

pub fn to_float(a: &Mlrval) -> Mlrval {
    match a {
        Mlrval::Absent | Mlrval::Void | Mlrval::Error => a.clone(),
        Mlrval::Boolean(b) => Mlrval::Float(if *b { 1.0 } else { 0.0 }),
        other => match other.as_number() {
            Some(number) => Mlrval::Float(number.as_f64()),
            None => Mlrval::Error,
        },
    }
}

pub fn to_boolean(a: &Mlrval) -> Mlrval {
    match a {
        Mlrval::Absent | Mlrval::Void | Mlrval::Error | Mlrval::Boolean(_) => a.clone(),
        other => match (other.as_boolean(), other.as_number()) {
            (Some(b), _) => Mlrval::Boolean(b),
            (None, Some(Number::Int(i))) => Mlrval::Boolean(i != 0),
            (None, Some(Number::Float(f))) => Mlrval::Boolean(f != 0.0),
            (None, None) => Mlrval::Error,
        },
    }
}

pub fn to_string(a: &Mlrval) -> Mlrval {
    match a {
        Mlrval::Absent => Mlrval::Void,
        other => Mlrval::from_string(other.to_string()),
    }
}

pub fn hexfmt(a: &Mlrval) -> Mlrval {
    match a.as_int() {
        Some(i) if !matches!(a, Mlrval::Boolean(_)) => {
            Mlrval::String(format!("0x{:x}", i as u64))
        }
        _ => a.clone(),
    }
}

pub fn fmtnum(a: &Mlrval, format: &Mlrval) -> Mlrval {
    match (a, format) {
        (Mlrval::Absent, _) => Mlrval::Absent,
        (_, Mlrval::String(spec)) => match (a.as_number(), NumberFormat::parse(spec)) {
            (Some(number), Ok(format)) => Mlrval::String(format.format(number)),
            _ => Mlrval::Error,
        },
        _ => Mlrval::Error,
    }
}
