//! Type inference for text coming from records and string literals.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit0, digit1, hex_digit1, one_of},
    combinator::{all_consuming, opt, recognize, verify},
    sequence::{pair, preceded, tuple},
    IResult,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn sign(input: &str) -> IResult<&str, Option<char>> {
    opt(one_of("+-"))(input)
}

fn hex_body(input: &str) -> IResult<&str, &str> {
    preceded(
        tag_no_case("0x"),
        verify(hex_digit1, |digits: &str| digits.len() <= 16),
    )(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn float_body(input: &str) -> IResult<&str, &str> {
    let with_point = recognize(tuple((
        digit0,
        char('.'),
        digit0,
        opt(exponent),
    )));
    let with_exponent = recognize(pair(digit1, exponent));
    verify(alt((with_point, with_exponent)), |text: &str| {
        text.bytes().any(|b| b.is_ascii_digit())
            && !text.starts_with(['e', 'E'])
            && !text.starts_with(".e")
            && !text.starts_with(".E")
    })(input)
}

/// Scans `text` as an int (decimal or `0x` hex) or float. Returns `None` for
/// anything that is not entirely a number.
pub fn scan_number(text: &str) -> Option<Number> {
    if text.is_empty() {
        return None;
    }
    if let Ok((_, (sign, digits))) = all_consuming(pair(sign, hex_body))(text) {
        let magnitude = u64::from_str_radix(digits, 16).ok()? as i64;
        return Some(Number::Int(if sign == Some('-') {
            magnitude.wrapping_neg()
        } else {
            magnitude
        }));
    }
    if let Ok((_, (_, digits))) = all_consuming(pair(sign, digit1))(text) {
        return match text.parse::<i64>() {
            Ok(value) => Some(Number::Int(value)),
            Err(_) => digits.parse::<f64>().ok().map(|magnitude| {
                Number::Float(if text.starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                })
            }),
        };
    }
    if all_consuming(pair(sign, float_body))(text).is_ok() {
        return text.parse::<f64>().ok().map(Number::Float);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_and_hex_ints() {
        assert_eq!(scan_number("17"), Some(Number::Int(17)));
        assert_eq!(scan_number("-4"), Some(Number::Int(-4)));
        assert_eq!(scan_number("+4"), Some(Number::Int(4)));
        assert_eq!(scan_number("0xff"), Some(Number::Int(255)));
        assert_eq!(scan_number("0xffffffffffffffff"), Some(Number::Int(-1)));
        assert_eq!(scan_number("-0x10"), Some(Number::Int(-16)));
    }

    #[test]
    fn floats_in_several_spellings() {
        assert_eq!(scan_number("1.5"), Some(Number::Float(1.5)));
        assert_eq!(scan_number(".5"), Some(Number::Float(0.5)));
        assert_eq!(scan_number("5."), Some(Number::Float(5.0)));
        assert_eq!(scan_number("1e3"), Some(Number::Float(1000.0)));
        assert_eq!(scan_number("-2.5E-1"), Some(Number::Float(-0.25)));
    }

    #[test]
    fn big_decimal_ints_fall_back_to_float() {
        assert_eq!(
            scan_number("99999999999999999999"),
            Some(Number::Float(1e20))
        );
    }

    #[test]
    fn non_numbers() {
        for text in ["", "abc", "1a", "0x", "0xg1", ".", "-", "e5", "1e", "1.2.3", " 1"] {
            assert_eq!(scan_number(text), None, "{text:?}");
        }
    }
}
