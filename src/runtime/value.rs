use crate::runtime::{
    format::NumberFormat,
    infer::{scan_number, Number},
};
use std::fmt;

/// Terminal value flowing through the DSL. `Absent`, `Void` and `Error` are
/// signal values with their own propagation rules.
#[derive(Clone, Debug, PartialEq)]
pub enum Mlrval {
    Absent,
    Error,
    Void,
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
}

impl Mlrval {
    /// Value of a record field. Empty text is void; with `infer` set, numeric
    /// text becomes int or float.
    pub fn from_data(text: &str, infer: bool) -> Self {
        if text.is_empty() {
            return Mlrval::Void;
        }
        if infer {
            if let Some(number) = scan_number(text) {
                return number.into();
            }
        }
        Mlrval::String(text.to_string())
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Mlrval::Void
        } else {
            Mlrval::String(text)
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Mlrval::Absent => "absent",
            Mlrval::Error => "error",
            Mlrval::Void => "empty",
            Mlrval::String(_) => "string",
            Mlrval::Int(_) => "int",
            Mlrval::Float(_) => "float",
            Mlrval::Boolean(_) => "boolean",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Mlrval::Absent)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Mlrval::Error)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Mlrval::Void)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Strings that scan as numbers count: literals such as `"3"` and
    /// concatenation results take part in arithmetic.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Mlrval::Int(i) => Some(Number::Int(*i)),
            Mlrval::Float(f) => Some(Number::Float(*f)),
            Mlrval::String(s) => scan_number(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Mlrval::Boolean(b) => Some(*b),
            Mlrval::String(s) if s == "true" => Some(true),
            Mlrval::String(s) if s == "false" => Some(false),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.as_number()? {
            Number::Int(i) => Some(i),
            Number::Float(_) => None,
        }
    }

    /// Text form with floats written through `ofmt`.
    pub fn render(&self, ofmt: &NumberFormat) -> String {
        match self {
            Mlrval::Float(f) => ofmt.format(Number::Float(*f)),
            other => other.to_string(),
        }
    }
}

impl From<Number> for Mlrval {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(i) => Mlrval::Int(i),
            Number::Float(f) => Mlrval::Float(f),
        }
    }
}

impl From<bool> for Mlrval {
    fn from(b: bool) -> Self {
        Mlrval::Boolean(b)
    }
}

impl From<i64> for Mlrval {
    fn from(i: i64) -> Self {
        Mlrval::Int(i)
    }
}

impl fmt::Display for Mlrval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mlrval::Absent | Mlrval::Void => Ok(()),
            Mlrval::Error => write!(f, "(error)"),
            Mlrval::String(s) => write!(f, "{s}"),
            Mlrval::Int(i) => write!(f, "{i}"),
            Mlrval::Float(v) => write!(f, "{}", NumberFormat::default().format(Number::Float(*v))),
            Mlrval::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_inference_respects_the_flag() {
        assert_eq!(Mlrval::from_data("3", true), Mlrval::Int(3));
        assert_eq!(Mlrval::from_data("3", false), Mlrval::String("3".into()));
        assert_eq!(Mlrval::from_data("", true), Mlrval::Void);
        assert_eq!(Mlrval::from_data("0.25", true), Mlrval::Float(0.25));
        assert_eq!(Mlrval::from_data("pan", true), Mlrval::String("pan".into()));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Mlrval::Float(0.5).to_string(), "0.500000");
        assert_eq!(Mlrval::Int(-7).to_string(), "-7");
        assert_eq!(Mlrval::Boolean(true).to_string(), "true");
        assert_eq!(Mlrval::Error.to_string(), "(error)");
        assert_eq!(Mlrval::Absent.to_string(), "");
    }

    #[test]
    fn render_uses_the_output_format() {
        let ofmt = NumberFormat::parse("%.2lf").expect("format");
        assert_eq!(Mlrval::Float(3.14159).render(&ofmt), "3.14");
        assert_eq!(Mlrval::Int(3).render(&ofmt), "3");
    }

    #[test]
    fn numeric_strings_take_part_in_arithmetic() {
        assert_eq!(Mlrval::String("0x10".into()).as_int(), Some(16));
        assert!(!Mlrval::String("abc".into()).is_numeric());
        assert_eq!(Mlrval::String("true".into()).as_boolean(), Some(true));
    }
}
