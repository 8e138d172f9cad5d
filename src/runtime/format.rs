//! printf-style number formatting for `fmtnum` and `--ofmt`.

use crate::runtime::infer::Number;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt},
    multi::{many0, many0_count},
    sequence::{preceded, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid number format \"{format}\": {reason}")]
pub struct FormatError {
    pub format: String,
    pub reason: String,
}

const MAX_FIELD: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Conversion {
    Decimal,
    Hex { upper: bool },
    Octal,
    Exponent { upper: bool },
    Fixed,
    General { upper: bool },
    Text,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumberFormat {
    prefix: String,
    flags: Flags,
    width: usize,
    precision: Option<usize>,
    conversion: Conversion,
    suffix: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            flags: Flags::default(),
            width: 0,
            precision: None,
            conversion: Conversion::Fixed,
            suffix: String::new(),
        }
    }
}

fn literal_text(input: &str) -> IResult<&str, String> {
    map(
        many0(alt((
            map(tag("%%"), |_| "%".to_string()),
            map(is_not("%"), str::to_string),
        ))),
        |pieces: Vec<String>| pieces.concat(),
    )(input)
}

fn flags(input: &str) -> IResult<&str, Flags> {
    map(many0(one_of("-+ 0#")), |chars: Vec<char>| {
        let mut flags = Flags::default();
        for ch in chars {
            match ch {
                '-' => flags.left = true,
                '+' => flags.plus = true,
                ' ' => flags.space = true,
                '0' => flags.zero = true,
                _ => flags.alternate = true,
            }
        }
        flags
    })(input)
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse)(input)
}

fn conversion(input: &str) -> IResult<&str, Conversion> {
    preceded(
        many0_count(one_of("lhjzt")),
        map(one_of("dixXoeEfFgGs"), |ch| match ch {
            'd' | 'i' => Conversion::Decimal,
            'x' => Conversion::Hex { upper: false },
            'X' => Conversion::Hex { upper: true },
            'o' => Conversion::Octal,
            'e' => Conversion::Exponent { upper: false },
            'E' => Conversion::Exponent { upper: true },
            'f' | 'F' => Conversion::Fixed,
            'g' => Conversion::General { upper: false },
            'G' => Conversion::General { upper: true },
            _ => Conversion::Text,
        }),
    )(input)
}

fn directive(input: &str) -> IResult<&str, (Flags, Option<usize>, Option<usize>, Conversion)> {
    preceded(
        char('%'),
        tuple((
            flags,
            opt(number),
            opt(preceded(char('.'), map(opt(number), |p| p.unwrap_or(0)))),
            conversion,
        )),
    )(input)
}

impl NumberFormat {
    pub fn parse(format: &str) -> Result<Self, FormatError> {
        let fail = |reason: &str| FormatError {
            format: format.to_string(),
            reason: reason.to_string(),
        };
        let (rest, prefix) = literal_text(format).map_err(|_| fail("unreadable prefix"))?;
        let (rest, (flags, width, precision, conversion)) =
            directive(rest).map_err(|_| fail("expected one %-directive such as %d or %.3lf"))?;
        let (rest, suffix) = literal_text(rest).map_err(|_| fail("unreadable suffix"))?;
        if !rest.is_empty() {
            return Err(fail("only one %-directive is allowed"));
        }
        if width.unwrap_or(0) > MAX_FIELD || precision.unwrap_or(0) > MAX_FIELD {
            return Err(fail("width and precision may not exceed 1000"));
        }
        Ok(Self {
            prefix,
            flags,
            width: width.unwrap_or(0),
            precision,
            conversion,
            suffix,
        })
    }

    pub fn is_integer_format(&self) -> bool {
        matches!(
            self.conversion,
            Conversion::Decimal | Conversion::Hex { .. } | Conversion::Octal
        )
    }

    pub fn format(&self, number: Number) -> String {
        let body = match self.conversion {
            Conversion::Decimal => {
                let value = int_of(number);
                self.signed(value < 0, value.unsigned_abs().to_string())
            }
            Conversion::Hex { upper } => {
                let bits = int_of(number) as u64;
                let digits = if upper {
                    format!("{bits:X}")
                } else {
                    format!("{bits:x}")
                };
                let marker = match (self.flags.alternate, upper) {
                    (true, false) => "0x",
                    (true, true) => "0X",
                    _ => "",
                };
                self.pad(marker, digits)
            }
            Conversion::Octal => {
                let bits = int_of(number) as u64;
                self.pad(if self.flags.alternate { "0" } else { "" }, format!("{bits:o}"))
            }
            Conversion::Fixed => {
                let value = number.as_f64();
                let precision = self.precision.unwrap_or(6);
                self.signed_float(value, format!("{:.*}", precision, value.abs()))
            }
            Conversion::Exponent { upper } => {
                let value = number.as_f64();
                let precision = self.precision.unwrap_or(6);
                let text = c_exponent(value.abs(), precision, upper);
                self.signed_float(value, text)
            }
            Conversion::General { upper } => {
                let value = number.as_f64();
                let text = c_general(value.abs(), self.precision, upper, self.flags.alternate);
                self.signed_float(value, text)
            }
            Conversion::Text => match number {
                Number::Int(i) => self.pad("", i.to_string()),
                Number::Float(f) => self.pad("", f.to_string()),
            },
        };
        format!("{}{}{}", self.prefix, body, self.suffix)
    }

    fn signed_float(&self, value: f64, magnitude: String) -> String {
        if value.is_nan() {
            return self.pad("", "NaN".to_string());
        }
        self.signed(value.is_sign_negative() && value != 0.0, magnitude)
    }

    fn signed(&self, negative: bool, magnitude: String) -> String {
        let sign = if negative {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        };
        self.pad(sign, magnitude)
    }

    fn pad(&self, sign: &str, digits: String) -> String {
        let len = sign.len() + digits.len();
        if len >= self.width {
            return format!("{sign}{digits}");
        }
        let fill = self.width - len;
        if self.flags.left {
            format!("{sign}{digits}{}", " ".repeat(fill))
        } else if self.flags.zero {
            format!("{sign}{}{digits}", "0".repeat(fill))
        } else {
            format!("{}{sign}{digits}", " ".repeat(fill))
        }
    }
}

fn int_of(number: Number) -> i64 {
    match number {
        Number::Int(i) => i,
        Number::Float(f) => f as i64,
    }
}

fn c_exponent(value: f64, precision: usize, upper: bool) -> String {
    let rust = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = rust.split_once('e').unwrap_or((rust.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:02}", exponent.abs())
}

fn c_general(value: f64, precision: Option<usize>, upper: bool, keep_zeros: bool) -> String {
    let precision = match precision {
        Some(0) => 1,
        Some(p) => p,
        None => 6,
    };
    if value == 0.0 {
        return if keep_zeros {
            format!("{:.*}", precision - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let exponent = value.log10().floor() as i32;
    let text = if exponent < -4 || exponent >= precision as i32 {
        c_exponent(value, precision - 1, upper)
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, value)
    };
    if keep_zeros {
        return text;
    }
    match text.find(['e', 'E']) {
        Some(pos) => {
            let (mantissa, exponent) = text.split_at(pos);
            format!("{}{}", strip_fraction_zeros(mantissa), exponent)
        }
        None => strip_fraction_zeros(&text).to_string(),
    }
}

fn strip_fraction_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &str, number: Number) -> String {
        NumberFormat::parse(format).expect("format").format(number)
    }

    #[test]
    fn default_is_six_decimal_fixed() {
        assert_eq!(NumberFormat::default().format(Number::Float(0.5)), "0.500000");
        assert_eq!(fmt("%lf", Number::Int(3)), "3.000000");
    }

    #[test]
    fn integer_directives() {
        assert_eq!(fmt("%d", Number::Int(42)), "42");
        assert_eq!(fmt("%05d", Number::Int(-42)), "-0042");
        assert_eq!(fmt("%-5d|", Number::Int(7)), "7    |");
        assert_eq!(fmt("%lld", Number::Float(3.9)), "3");
        assert_eq!(fmt("%x", Number::Int(255)), "ff");
        assert_eq!(fmt("%08llx", Number::Int(255)), "000000ff");
        assert_eq!(fmt("%#X", Number::Int(255)), "0XFF");
        assert_eq!(fmt("%o", Number::Int(8)), "10");
    }

    #[test]
    fn float_directives() {
        assert_eq!(fmt("%.3lf", Number::Float(3.14159)), "3.142");
        assert_eq!(fmt("%08.3f", Number::Float(-3.14159)), "-003.142");
        assert_eq!(fmt("%+.1f", Number::Int(2)), "+2.0");
        assert_eq!(fmt("%.2e", Number::Float(1234.5)), "1.23e+03");
        assert_eq!(fmt("%E", Number::Float(0.00012)), "1.200000E-04");
        assert_eq!(fmt("%g", Number::Float(0.0001)), "0.0001");
        assert_eq!(fmt("%g", Number::Float(1234567.0)), "1.23457e+06");
        assert_eq!(fmt("%g", Number::Float(2.5)), "2.5");
    }

    #[test]
    fn literal_text_around_the_directive() {
        assert_eq!(fmt("X%dY", Number::Int(1)), "X1Y");
        assert_eq!(fmt("%d%%", Number::Int(50)), "50%");
        assert_eq!(fmt("[%5s]", Number::Float(2.5)), "[  2.5]");
    }

    #[test]
    fn rejects_malformed_formats() {
        assert!(NumberFormat::parse("no directive").is_err());
        assert!(NumberFormat::parse("%d and %d").is_err());
        assert!(NumberFormat::parse("%q").is_err());
    }

    #[test]
    fn rejects_oversized_width_and_precision() {
        assert!(NumberFormat::parse("%.70000lf").is_err());
        assert!(NumberFormat::parse("%99999d").is_err());
        assert_eq!(fmt("%.1000lf", Number::Int(1)).len(), 1002);
    }
}
