//! `typeof` and the `is_*` predicates. Each predicate also backs an
//! `asserting_*` twin registered alongside it.

use crate::runtime::{value::Mlrval, xvalue::Xvalue};

pub type Predicate = fn(&Xvalue) -> bool;

pub fn type_of(value: &Xvalue) -> Mlrval {
    Mlrval::String(value.type_name().to_string())
}

fn terminal(value: &Xvalue, test: fn(&Mlrval) -> bool) -> bool {
    value.as_terminal().is_some_and(test)
}

pub fn is_absent(value: &Xvalue) -> bool {
    value.is_absent()
}

pub fn is_present(value: &Xvalue) -> bool {
    !value.is_absent()
}

pub fn is_empty(value: &Xvalue) -> bool {
    terminal(value, |v| v.is_void())
}

pub fn is_not_empty(value: &Xvalue) -> bool {
    terminal(value, |v| !v.is_void() && !v.is_absent())
}

pub fn is_null(value: &Xvalue) -> bool {
    terminal(value, |v| v.is_void() || v.is_absent())
}

pub fn is_not_null(value: &Xvalue) -> bool {
    !is_null(value)
}

pub fn is_error(value: &Xvalue) -> bool {
    terminal(value, Mlrval::is_error)
}

pub fn is_string(value: &Xvalue) -> bool {
    terminal(value, |v| matches!(v, Mlrval::String(_)) && !v.is_numeric())
}

pub fn is_numeric(value: &Xvalue) -> bool {
    terminal(value, Mlrval::is_numeric)
}

pub fn is_int(value: &Xvalue) -> bool {
    terminal(value, |v| v.as_int().is_some())
}

pub fn is_float(value: &Xvalue) -> bool {
    terminal(value, |v| v.is_numeric() && v.as_int().is_none())
}

pub fn is_boolean(value: &Xvalue) -> bool {
    terminal(value, |v| matches!(v, Mlrval::Boolean(_)))
}

pub fn is_map(value: &Xvalue) -> bool {
    value.is_map()
}

pub fn is_not_map(value: &Xvalue) -> bool {
    !value.is_map()
}

pub fn is_empty_map(value: &Xvalue) -> bool {
    value.as_map().is_some_and(|level| level.is_empty())
}

pub fn is_nonempty_map(value: &Xvalue) -> bool {
    value.as_map().is_some_and(|level| !level.is_empty())
}

/// Name and test of every predicate, in registration order.
pub const PREDICATES: &[(&str, Predicate, &str)] = &[
    ("is_absent", is_absent, "True if the argument is absent."),
    ("is_present", is_present, "True if the argument is present."),
    ("is_empty", is_empty, "True if the argument is an empty value."),
    ("is_not_empty", is_not_empty, "True if the argument is present and not empty."),
    ("is_null", is_null, "True if the argument is absent or empty."),
    ("is_not_null", is_not_null, "True if the argument is neither absent nor empty."),
    ("is_error", is_error, "True if the argument is an error value."),
    ("is_string", is_string, "True if the argument is a non-numeric string."),
    ("is_numeric", is_numeric, "True if the argument is an int or float."),
    ("is_int", is_int, "True if the argument is an int."),
    ("is_float", is_float, "True if the argument is a float."),
    ("is_boolean", is_boolean, "True if the argument is a boolean."),
    ("is_map", is_map, "True if the argument is a map."),
    ("is_not_map", is_not_map, "True if the argument is not a map."),
    ("is_empty_map", is_empty_map, "True if the argument is a map with no entries."),
    ("is_nonempty_map", is_nonempty_map, "True if the argument is a map with entries."),
];
