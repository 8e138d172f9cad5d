//! Time and duration functions. Instants are seconds since the Unix epoch
//! and are always rendered and parsed as UTC.

use crate::runtime::{infer::Number, value::Mlrval};
use chrono::{
    format::{Item, StrftimeItems},
    DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, success},
    number::complete::recognize_float,
    sequence::{terminated, tuple},
    IResult,
};

const GMT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%d",
];

pub fn systime(_: &[Mlrval]) -> Mlrval {
    Mlrval::Float(Utc::now().timestamp_micros() as f64 / 1e6)
}

fn instant(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9) as u32;
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
}

/// `.` plus the leading `places` digits of the sub-second part, truncated.
fn fraction(at: &DateTime<Utc>, places: usize) -> String {
    if places == 0 {
        return String::new();
    }
    let digits = format!("{:09}", at.timestamp_subsec_nanos());
    format!(".{}", &digits[..places.min(9)])
}

fn gmt_text(a: &Mlrval, places: usize) -> Mlrval {
    let Some(number) = a.as_number() else {
        return a.clone();
    };
    match instant(number.as_f64()) {
        Some(at) => Mlrval::String(format!(
            "{}{}Z",
            at.format("%Y-%m-%dT%H:%M:%S"),
            fraction(&at, places)
        )),
        None => Mlrval::Error,
    }
}

pub fn sec2gmt(a: &Mlrval) -> Mlrval {
    gmt_text(a, 0)
}

pub fn sec2gmt_places(a: &Mlrval, places: &Mlrval) -> Mlrval {
    match places.as_int() {
        Some(n @ 0..=9) => gmt_text(a, n as usize),
        _ => Mlrval::Error,
    }
}

pub fn sec2gmtdate(a: &Mlrval) -> Mlrval {
    let Some(number) = a.as_number() else {
        return a.clone();
    };
    match instant(number.as_f64()) {
        Some(at) => Mlrval::String(at.format("%Y-%m-%d").to_string()),
        None => Mlrval::Error,
    }
}

/// Rewrites `%S` and `%1S` through `%9S` into chrono's vocabulary.
/// `seconds` supplies the replacement for a given digit count, 0 for `%S`.
fn rewrite_seconds(format: &str, seconds: impl Fn(usize) -> String) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('S') => out.push_str(&seconds(0)),
            Some(digit @ '1'..='9') if chars.peek() == Some(&'S') => {
                chars.next();
                out.push_str(&seconds(digit as usize - '0' as usize));
            }
            Some(next) => {
                out.push('%');
                out.push(next);
            }
            None => out.push('%'),
        }
    }
    out
}

fn valid_items(format: &str) -> Option<Vec<Item<'_>>> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        None
    } else {
        Some(items)
    }
}

pub fn strftime(seconds: &Mlrval, format: &Mlrval) -> Mlrval {
    match (seconds, format) {
        (Mlrval::Absent | Mlrval::Void | Mlrval::Error, _) => seconds.clone(),
        (_, Mlrval::String(format)) => {
            let Some(at) = seconds.as_number().and_then(|n| instant(n.as_f64())) else {
                return Mlrval::Error;
            };
            let format = rewrite_seconds(format, |places| format!("%S{}", fraction(&at, places)));
            match valid_items(&format) {
                Some(items) => Mlrval::from_string(at.format_with_items(items.into_iter()).to_string()),
                None => Mlrval::Error,
            }
        }
        _ => Mlrval::Error,
    }
}

/// Seconds since the epoch: int when the parsed time has no fractional
/// part, float otherwise.
fn epoch_seconds(at: DateTime<Utc>) -> Mlrval {
    match at.timestamp_subsec_nanos() {
        0 => Mlrval::Int(at.timestamp()),
        nanos => Mlrval::Float(at.timestamp() as f64 + f64::from(nanos) / 1e9),
    }
}

fn parse_utc(text: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_str(text, format) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(text, format).ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Timestamp text for the time parsers; numbers count since a field like
/// `2019` infers as int.
fn time_text(a: &Mlrval) -> Option<String> {
    match a {
        Mlrval::String(_) | Mlrval::Int(_) | Mlrval::Float(_) => Some(a.to_string()),
        _ => None,
    }
}

/// `%S` also accepts fractional seconds when parsing.
fn parse_format(format: &str) -> String {
    rewrite_seconds(format, |_| "%S%.f".to_string())
}

pub fn strptime(text: &Mlrval, format: &Mlrval) -> Mlrval {
    match (text, format) {
        (Mlrval::Absent | Mlrval::Error, _) => text.clone(),
        (_, Mlrval::String(format)) => {
            let Some(text) = time_text(text) else {
                return Mlrval::Error;
            };
            parse_utc(&text, &parse_format(format)).map_or(Mlrval::Error, epoch_seconds)
        }
        _ => Mlrval::Error,
    }
}

pub fn gmt2sec(a: &Mlrval) -> Mlrval {
    if matches!(a, Mlrval::Absent | Mlrval::Error) {
        return a.clone();
    }
    let Some(text) = time_text(a) else {
        return Mlrval::Error;
    };
    GMT_FORMATS
        .iter()
        .find_map(|format| parse_utc(text.trim(), &parse_format(format)))
        .map_or(Mlrval::Error, |at| Mlrval::Int(at.timestamp()))
}

/// A duration broken into units, sign kept apart. Hours are below 24 only
/// when days are split out.
struct Dhms {
    negative: bool,
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

impl Dhms {
    fn split(negative: bool, total: u64) -> Self {
        Self {
            negative,
            days: total / 86_400,
            hours: total / 3_600 % 24,
            minutes: total / 60 % 60,
            seconds: total % 60,
        }
    }

    fn sign(&self) -> &'static str {
        if self.negative {
            "-"
        } else {
            ""
        }
    }
}

fn whole_seconds(a: &Mlrval) -> Result<Dhms, Mlrval> {
    match a {
        Mlrval::Absent | Mlrval::Error => Err(a.clone()),
        _ => match a.as_number() {
            Some(Number::Int(i)) => Ok(Dhms::split(i < 0, i.unsigned_abs())),
            _ => Err(Mlrval::Error),
        },
    }
}

fn float_seconds(a: &Mlrval) -> Result<(Dhms, f64), Mlrval> {
    match a {
        Mlrval::Absent | Mlrval::Error => Err(a.clone()),
        _ => match a.as_number() {
            Some(number) => {
                let value = number.as_f64();
                let magnitude = value.abs();
                let whole = magnitude.trunc();
                Ok((Dhms::split(value < 0.0, whole as u64), magnitude - whole))
            }
            None => Err(Mlrval::Error),
        },
    }
}

pub fn sec2dhms(a: &Mlrval) -> Mlrval {
    let parts = match whole_seconds(a) {
        Ok(parts) => parts,
        Err(done) => return done,
    };
    let Dhms { days, hours, minutes, seconds, .. } = parts;
    let sign = parts.sign();
    Mlrval::String(if days > 0 {
        format!("{sign}{days}d{hours:02}h{minutes:02}m{seconds:02}s")
    } else if hours > 0 {
        format!("{sign}{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{seconds:02}s")
    } else {
        format!("{sign}{seconds}s")
    })
}

pub fn fsec2dhms(a: &Mlrval) -> Mlrval {
    let (parts, subsecond) = match float_seconds(a) {
        Ok(split) => split,
        Err(done) => return done,
    };
    let Dhms { days, hours, minutes, seconds, .. } = parts;
    let sign = parts.sign();
    let seconds = seconds as f64 + subsecond;
    Mlrval::String(if days > 0 {
        format!("{sign}{days}d{hours:02}h{minutes:02}m{seconds:09.6}s")
    } else if hours > 0 {
        format!("{sign}{hours}h{minutes:02}m{seconds:09.6}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{seconds:09.6}s")
    } else {
        format!("{sign}{seconds:.6}s")
    })
}

pub fn sec2hms(a: &Mlrval) -> Mlrval {
    match whole_seconds(a) {
        Ok(parts) => Mlrval::String(format!(
            "{}{:02}:{:02}:{:02}",
            parts.sign(),
            parts.days * 24 + parts.hours,
            parts.minutes,
            parts.seconds
        )),
        Err(done) => done,
    }
}

pub fn fsec2hms(a: &Mlrval) -> Mlrval {
    match float_seconds(a) {
        Ok((parts, subsecond)) => {
            let seconds = parts.seconds as f64 + subsecond;
            let pad = if parts.seconds < 10 { "0" } else { "" };
            Mlrval::String(format!(
                "{}{:02}:{:02}:{pad}{seconds:.6}",
                parts.sign(),
                parts.days * 24 + parts.hours,
                parts.minutes
            ))
        }
        Err(done) => done,
    }
}

fn int(input: &str) -> IResult<&str, i64> {
    map_res(digit1, str::parse)(input)
}

fn float(input: &str) -> IResult<&str, f64> {
    map_res(recognize_float, str::parse)(input)
}

fn unit(symbol: char) -> impl FnMut(&str) -> IResult<&str, i64> {
    move |input| terminated(int, char(symbol))(input)
}

/// `[-][Nd]NhNm` prefixes, each form requiring every smaller unit. Yields
/// the sign and the prefix in whole seconds.
fn dhms_prefix(input: &str) -> IResult<&str, (bool, i64, i64, i64)> {
    let (input, minus) = opt(char('-'))(input)?;
    let (input, (d, h, m)) = alt((
        tuple((unit('d'), unit('h'), unit('m'))),
        map(tuple((unit('h'), unit('m'))), |(h, m)| (0, h, m)),
        map(unit('m'), |m| (0, 0, m)),
        success((0, 0, 0)),
    ))(input)?;
    Ok((input, (minus.is_some(), d, h, m)))
}

fn prefix_seconds(d: i64, h: i64, m: i64) -> Option<i64> {
    d.checked_mul(86_400)?
        .checked_add(h.checked_mul(3_600)?)?
        .checked_add(m.checked_mul(60)?)
}

pub fn dhms2sec(a: &Mlrval) -> Mlrval {
    let Mlrval::String(text) = a else {
        return if a.is_absent() { Mlrval::Absent } else { Mlrval::Error };
    };
    let parsed = all_consuming(tuple((dhms_prefix, terminated(int, char('s')))))(text.as_str());
    let Ok((_, ((negative, d, h, m), s))) = parsed else {
        return Mlrval::Error;
    };
    match prefix_seconds(d, h, m).and_then(|prefix| prefix.checked_add(s)) {
        Some(total) if negative => Mlrval::Int(-total),
        Some(total) => Mlrval::Int(total),
        None => Mlrval::Error,
    }
}

pub fn dhms2fsec(a: &Mlrval) -> Mlrval {
    let Mlrval::String(text) = a else {
        return if a.is_absent() { Mlrval::Absent } else { Mlrval::Error };
    };
    let parsed = all_consuming(tuple((dhms_prefix, terminated(float, char('s')))))(text.as_str());
    let Ok((_, ((negative, d, h, m), s))) = parsed else {
        return Mlrval::Error;
    };
    match prefix_seconds(d, h, m) {
        Some(prefix) => {
            let total = prefix as f64 + s;
            Mlrval::Float(if negative { -total } else { total })
        }
        None => Mlrval::Error,
    }
}

fn hms<'a, S>(
    text: &'a str,
    seconds: impl FnMut(&'a str) -> IResult<&'a str, S>,
) -> Option<(bool, i64, S)> {
    let parsed = all_consuming(tuple((
        opt(char('-')),
        terminated(int, char(':')),
        terminated(int, char(':')),
        seconds,
    )))(text);
    let (_, (minus, h, m, s)) = parsed.ok()?;
    Some((minus.is_some(), prefix_seconds(0, h, m)?, s))
}

pub fn hms2sec(a: &Mlrval) -> Mlrval {
    let Mlrval::String(text) = a else {
        return if a.is_absent() { Mlrval::Absent } else { Mlrval::Error };
    };
    match hms(text, int) {
        Some((negative, prefix, s)) => match prefix.checked_add(s) {
            Some(total) => Mlrval::Int(if negative { -total } else { total }),
            None => Mlrval::Error,
        },
        None => Mlrval::Error,
    }
}

pub fn hms2fsec(a: &Mlrval) -> Mlrval {
    let Mlrval::String(text) = a else {
        return if a.is_absent() { Mlrval::Absent } else { Mlrval::Error };
    };
    match hms(text, float) {
        Some((negative, prefix, s)) => {
            let total = prefix as f64 + s;
            Mlrval::Float(if negative { -total } else { total })
        }
        None => Mlrval::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Mlrval {
        Mlrval::String(text.into())
    }

    #[test]
    fn gmt_formatting() {
        assert_eq!(sec2gmt(&Mlrval::Float(1440768801.7)), s("2015-08-28T13:33:21Z"));
        assert_eq!(sec2gmt(&Mlrval::Int(0)), s("1970-01-01T00:00:00Z"));
        assert_eq!(
            sec2gmt_places(&Mlrval::Float(1440768801.7), &Mlrval::Int(1)),
            s("2015-08-28T13:33:21.7Z")
        );
        assert_eq!(
            sec2gmt_places(&Mlrval::Int(1440768801), &Mlrval::Int(3)),
            s("2015-08-28T13:33:21.000Z")
        );
        assert_eq!(sec2gmt(&s("abc")), s("abc"));
        assert_eq!(sec2gmt(&Mlrval::Void), Mlrval::Void);
        assert_eq!(sec2gmtdate(&Mlrval::Float(1440768801.7)), s("2015-08-28"));
        assert_eq!(sec2gmtdate(&s("abc")), s("abc"));
    }

    #[test]
    fn strftime_with_fractional_seconds() {
        let t = Mlrval::Float(1440768801.7);
        assert_eq!(
            strftime(&t, &s("%Y-%m-%dT%H:%M:%SZ")),
            s("2015-08-28T13:33:21Z")
        );
        assert_eq!(
            strftime(&t, &s("%Y-%m-%dT%H:%M:%3SZ")),
            s("2015-08-28T13:33:21.700Z")
        );
        assert_eq!(strftime(&Mlrval::Int(0), &s("%j %%S")), s("001 %S"));
        assert_eq!(strftime(&s("abc"), &s("%Y")), Mlrval::Error);
        assert_eq!(strftime(&Mlrval::Void, &s("%Y")), Mlrval::Void);
        assert_eq!(strftime(&Mlrval::Int(0), &s("%Q")), Mlrval::Error);
    }

    #[test]
    fn strptime_parses_to_epoch_seconds() {
        let iso = s("%Y-%m-%dT%H:%M:%SZ");
        assert_eq!(strptime(&s("2015-08-28T13:33:21Z"), &iso), Mlrval::Int(1440768801));
        assert_eq!(
            strptime(&s("2015-08-28T13:33:21.5Z"), &iso),
            Mlrval::Float(1440768801.5)
        );
        assert_eq!(strptime(&s("1970-01-02"), &s("%Y-%m-%d")), Mlrval::Int(86400));
        assert_eq!(strptime(&s("nope"), &iso), Mlrval::Error);
        assert_eq!(strptime(&Mlrval::Absent, &iso), Mlrval::Absent);
    }

    #[test]
    fn gmt2sec_accepts_common_layouts() {
        assert_eq!(gmt2sec(&s("2001-02-03T04:05:06Z")), Mlrval::Int(981173106));
        assert_eq!(gmt2sec(&s("2001-02-03 04:05:06")), Mlrval::Int(981173106));
        assert_eq!(gmt2sec(&s("1970-01-01")), Mlrval::Int(0));
        assert_eq!(gmt2sec(&s("yesterday")), Mlrval::Error);
    }

    #[test]
    fn durations_to_text() {
        assert_eq!(sec2dhms(&Mlrval::Int(500000)), s("5d18h53m20s"));
        assert_eq!(sec2dhms(&Mlrval::Int(5000)), s("1h23m20s"));
        assert_eq!(sec2dhms(&Mlrval::Int(65)), s("1m05s"));
        assert_eq!(sec2dhms(&Mlrval::Int(-7)), s("-7s"));
        assert_eq!(sec2dhms(&Mlrval::Float(1.5)), Mlrval::Error);
        assert_eq!(fsec2dhms(&Mlrval::Float(500000.25)), s("5d18h53m20.250000s"));
        assert_eq!(fsec2dhms(&Mlrval::Float(-1.25)), s("-1.250000s"));
        assert_eq!(sec2hms(&Mlrval::Int(5000)), s("01:23:20"));
        assert_eq!(sec2hms(&Mlrval::Int(-100000)), s("-27:46:40"));
        assert_eq!(fsec2hms(&Mlrval::Float(5000.25)), s("01:23:20.250000"));
        assert_eq!(fsec2hms(&Mlrval::Float(1.5)), s("00:00:01.500000"));
    }

    #[test]
    fn durations_from_text() {
        assert_eq!(dhms2sec(&s("5d18h53m20s")), Mlrval::Int(500000));
        assert_eq!(dhms2sec(&s("-1h00m01s")), Mlrval::Int(-3601));
        assert_eq!(dhms2sec(&s("20s")), Mlrval::Int(20));
        assert_eq!(dhms2sec(&s("1d20s")), Mlrval::Error);
        assert_eq!(dhms2sec(&Mlrval::Int(3)), Mlrval::Error);
        assert_eq!(dhms2fsec(&s("1d2h3m4.5s")), Mlrval::Float(93784.5));
        assert_eq!(hms2sec(&s("01:23:20")), Mlrval::Int(5000));
        assert_eq!(hms2sec(&s("-00:00:05")), Mlrval::Int(-5));
        assert_eq!(hms2sec(&s("01:23")), Mlrval::Error);
        assert_eq!(hms2fsec(&s("01:23:20.25")), Mlrval::Float(5000.25));
    }

    #[test]
    fn systime_is_recent() {
        let Mlrval::Float(now) = systime(&[]) else {
            panic!("systime should be float");
        };
        assert!(now > 1.5e9);
    }
}
