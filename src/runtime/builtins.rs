//! The built-in function table. Built once per process and handed to the
//! compiler; never mutated afterwards.

use crate::language::types::Shape;
use crate::runtime::{
    bifs::{arithmetic, matching, strings, time, types},
    error::RuntimeResult,
    value::Mlrval,
    xfuncs,
    xvalue::{BoxedXvalue, Xvalue},
};
use regex::Regex;
use std::{collections::HashMap, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionClass {
    Arithmetic,
    Math,
    Boolean,
    String,
    Conversion,
    Typing,
    Maps,
    Time,
}

impl fmt::Display for FunctionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionClass::Arithmetic => "arithmetic",
            FunctionClass::Math => "math",
            FunctionClass::Boolean => "boolean",
            FunctionClass::String => "string",
            FunctionClass::Conversion => "conversion",
            FunctionClass::Typing => "typing",
            FunctionClass::Maps => "maps",
            FunctionClass::Time => "time",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// How a builtin is invoked. Scalar variants receive evaluated terminals;
/// map variants receive boxed xvalues evaluated in map context.
#[derive(Clone, Copy)]
pub enum BuiltinImpl {
    Unary(fn(&Mlrval) -> Mlrval),
    Binary(fn(&Mlrval, &Mlrval) -> Mlrval),
    Ternary(fn(&Mlrval, &Mlrval, &Mlrval) -> Mlrval),
    Variadic(fn(&[Mlrval]) -> Mlrval),
    /// Second argument is a regex; string literals are compiled once.
    RegexBinary(fn(&Mlrval, &Regex) -> Mlrval),
    RegexTernary(fn(&Mlrval, &Regex, &Mlrval) -> Mlrval),
    MapUnary(fn(BoxedXvalue<'_>) -> Xvalue),
    MapBinary(fn(BoxedXvalue<'_>, BoxedXvalue<'_>) -> Xvalue),
    MapTernary(fn(BoxedXvalue<'_>, BoxedXvalue<'_>, BoxedXvalue<'_>) -> Xvalue),
    MapVariadic(fn(Vec<BoxedXvalue<'_>>) -> RuntimeResult<Xvalue>),
    Predicate(types::Predicate),
    /// Fatal when the predicate fails; otherwise passes its argument through.
    Asserting(types::Predicate),
    /// Operators with evaluation-order rules the compiler builds itself:
    /// `&&`, `||`, `?:`, `=~`, `!=~`.
    Special,
}

impl BuiltinImpl {
    pub fn takes_map_arguments(&self) -> bool {
        matches!(
            self,
            BuiltinImpl::MapUnary(_)
                | BuiltinImpl::MapBinary(_)
                | BuiltinImpl::MapTernary(_)
                | BuiltinImpl::MapVariadic(_)
                | BuiltinImpl::Predicate(_)
                | BuiltinImpl::Asserting(_)
        )
    }
}

pub struct BuiltinInfo {
    pub name: &'static str,
    pub class: FunctionClass,
    pub arity: Arity,
    pub shape: Shape,
    pub help: &'static str,
    pub implementation: BuiltinImpl,
}

impl BuiltinInfo {
    pub fn usage(&self) -> String {
        format!(
            "{} (class={} #args={}): {}",
            self.name, self.class, self.arity, self.help
        )
    }
}

impl fmt::Debug for BuiltinInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinInfo")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Result of looking a name up with a given argument count.
#[derive(Debug)]
pub enum ArityCheck<'r> {
    Pass(&'r BuiltinInfo),
    /// Known name, wrong count. Carries the accepted counts for messages.
    Mismatch(String),
    Unknown,
}

pub struct BuiltinRegistry {
    entries: Vec<BuiltinInfo>,
    by_name: HashMap<&'static str, Vec<usize>>,
}

impl BuiltinRegistry {
    pub fn new(entries: Vec<BuiltinInfo>) -> Self {
        let mut by_name: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_name.entry(entry.name).or_default().push(index);
        }
        Self { entries, by_name }
    }

    pub fn standard() -> Self {
        Self::new(standard_entries())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn lookup(&self, name: &str, arg_count: usize) -> ArityCheck<'_> {
        let Some(indices) = self.by_name.get(name) else {
            return ArityCheck::Unknown;
        };
        let candidates: Vec<&BuiltinInfo> = indices.iter().map(|&i| &self.entries[i]).collect();
        if let Some(info) = candidates.iter().copied().find(|info| info.arity.accepts(arg_count)) {
            return ArityCheck::Pass(info);
        }
        let mut accepted: Vec<String> = candidates.iter().map(|info| info.arity.to_string()).collect();
        accepted.sort();
        let plural = match candidates.last().map(|info| info.arity) {
            Some(Arity::Exactly(1)) | Some(Arity::AtLeast(1)) if candidates.len() == 1 => "argument",
            _ => "arguments",
        };
        ArityCheck::Mismatch(format!("{} {plural}", accepted.join(" or ")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuiltinInfo> {
        self.entries.iter()
    }

    /// Usage lines for every entry registered under `name`.
    pub fn usage(&self, name: &str) -> Option<String> {
        let indices = self.by_name.get(name)?;
        Some(
            indices
                .iter()
                .map(|&i| self.entries[i].usage())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn entry(
    name: &'static str,
    class: FunctionClass,
    arity: Arity,
    shape: Shape,
    implementation: BuiltinImpl,
    help: &'static str,
) -> BuiltinInfo {
    BuiltinInfo {
        name,
        class,
        arity,
        shape,
        help,
        implementation,
    }
}

fn unary(name: &'static str, class: FunctionClass, f: fn(&Mlrval) -> Mlrval, help: &'static str) -> BuiltinInfo {
    entry(name, class, Arity::Exactly(1), Shape::Scalar, BuiltinImpl::Unary(f), help)
}

fn binary(
    name: &'static str,
    class: FunctionClass,
    f: fn(&Mlrval, &Mlrval) -> Mlrval,
    help: &'static str,
) -> BuiltinInfo {
    entry(name, class, Arity::Exactly(2), Shape::Scalar, BuiltinImpl::Binary(f), help)
}

fn ternary(
    name: &'static str,
    class: FunctionClass,
    f: fn(&Mlrval, &Mlrval, &Mlrval) -> Mlrval,
    help: &'static str,
) -> BuiltinInfo {
    entry(name, class, Arity::Exactly(3), Shape::Scalar, BuiltinImpl::Ternary(f), help)
}

fn special(name: &'static str, class: FunctionClass, arity: usize, help: &'static str) -> BuiltinInfo {
    entry(name, class, Arity::Exactly(arity), Shape::Scalar, BuiltinImpl::Special, help)
}

fn map_fn(name: &'static str, arity: Arity, shape: Shape, implementation: BuiltinImpl, help: &'static str) -> BuiltinInfo {
    entry(name, FunctionClass::Maps, arity, shape, implementation, help)
}

fn type_of(value: BoxedXvalue<'_>) -> Xvalue {
    Xvalue::Terminal(types::type_of(&value))
}

fn standard_entries() -> Vec<BuiltinInfo> {
    use FunctionClass::*;

    let mut entries = vec![
        binary("+", Arithmetic, arithmetic::plus, "Addition."),
        unary("+", Arithmetic, arithmetic::positive, "Unary plus."),
        binary("-", Arithmetic, arithmetic::minus, "Subtraction."),
        unary("-", Arithmetic, arithmetic::negate, "Unary minus."),
        binary("*", Arithmetic, arithmetic::times, "Multiplication."),
        binary("/", Arithmetic, arithmetic::divide, "Division. Exact int quotients stay int."),
        binary("//", Arithmetic, arithmetic::int_divide, "Integer division, rounding toward negative."),
        binary("%", Arithmetic, arithmetic::modulus, "Remainder; never negative with positive modulus."),
        binary("**", Arithmetic, arithmetic::pow, "Exponentiation. Same as pow."),
        binary(".", String, arithmetic::dot, "String concatenation."),
        binary(".+", Arithmetic, arithmetic::dot_plus, "Addition, with integer overflow wrapping around."),
        unary(".+", Arithmetic, arithmetic::positive, "Unary plus, integer-preserving."),
        binary(".-", Arithmetic, arithmetic::dot_minus, "Subtraction, with integer overflow wrapping around."),
        unary(".-", Arithmetic, arithmetic::dot_negate, "Unary minus, with integer overflow wrapping around."),
        binary(".*", Arithmetic, arithmetic::dot_times, "Multiplication, with integer overflow wrapping around."),
        binary("./", Arithmetic, arithmetic::dot_divide, "Integer division, rounding toward zero."),
        binary(".//", Arithmetic, arithmetic::dot_int_divide, "Integer division, rounding toward negative, without float fallback."),
        unary("bitcount", Arithmetic, arithmetic::bitcount, "Count of 1-bits."),
        ternary("madd", Arithmetic, arithmetic::madd, "a .+ b mod m (integers)."),
        ternary("msub", Arithmetic, arithmetic::msub, "a .- b mod m (integers)."),
        ternary("mmul", Arithmetic, arithmetic::mmul, "a .* b mod m (integers)."),
        ternary("mexp", Arithmetic, arithmetic::mexp, "a ** b mod m (integers); b must be non-negative."),
        unary("~", Arithmetic, arithmetic::bitwise_not, "Bitwise NOT."),
        binary("&", Arithmetic, arithmetic::bitwise_and, "Bitwise AND."),
        binary("|", Arithmetic, arithmetic::bitwise_or, "Bitwise OR."),
        binary("^", Arithmetic, arithmetic::bitwise_xor, "Bitwise XOR."),
        binary("<<", Arithmetic, arithmetic::shift_left, "Bitwise left-shift."),
        binary(">>", Arithmetic, arithmetic::shift_right, "Bitwise signed right-shift."),
        binary(">>>", Arithmetic, arithmetic::shift_right_unsigned, "Bitwise unsigned right-shift."),
        binary("==", Boolean, arithmetic::equals, "String/numeric equality."),
        binary("!=", Boolean, arithmetic::not_equals, "String/numeric inequality."),
        binary("<", Boolean, arithmetic::less_than, "String/numeric less-than."),
        binary("<=", Boolean, arithmetic::less_than_or_equals, "String/numeric less-than-or-equals."),
        binary(">", Boolean, arithmetic::greater_than, "String/numeric greater-than."),
        binary(">=", Boolean, arithmetic::greater_than_or_equals, "String/numeric greater-than-or-equals."),
        unary("!", Boolean, arithmetic::logical_not, "Logical negation."),
        binary("^^", Boolean, arithmetic::logical_xor, "Logical XOR."),
        special("&&", Boolean, 2, "Logical AND, short-circuiting."),
        special("||", Boolean, 2, "Logical OR, short-circuiting."),
        special("?:", Boolean, 3, "Ternary operator."),
        special("=~", Boolean, 2, "Regex match. Sets the captures \\1 through \\9 on success."),
        special("!=~", Boolean, 2, "Regex non-match. Leaves captures unchanged."),
        unary("abs", Math, arithmetic::abs, "Absolute value."),
        unary("ceiling", Math, arithmetic::ceiling, "Ceiling of a number."),
        unary("floor", Math, arithmetic::floor, "Floor of a number."),
        unary("round", Math, arithmetic::round, "Round to nearest integer."),
        binary("roundm", Math, arithmetic::roundm, "Round to nearest multiple of m: roundm($x,$m)."),
        unary("sgn", Math, arithmetic::sgn, "+1, 0, -1 for positive, zero, negative input."),
        unary("exp", Math, arithmetic::exp, "Exponential function e**x."),
        unary("expm1", Math, arithmetic::expm1, "e**x - 1."),
        unary("log", Math, arithmetic::log, "Natural (base-e) logarithm."),
        unary("log10", Math, arithmetic::log10, "Base-10 logarithm."),
        unary("log1p", Math, arithmetic::log1p, "log(1+x)."),
        unary("sqrt", Math, arithmetic::sqrt, "Square root."),
        unary("cbrt", Math, arithmetic::cbrt, "Cube root."),
        binary("pow", Math, arithmetic::pow, "Exponentiation. Same as **."),
        unary("sin", Math, arithmetic::sin, "Trigonometric sine."),
        unary("cos", Math, arithmetic::cos, "Trigonometric cosine."),
        unary("tan", Math, arithmetic::tan, "Trigonometric tangent."),
        unary("asin", Math, arithmetic::asin, "Inverse trigonometric sine."),
        unary("acos", Math, arithmetic::acos, "Inverse trigonometric cosine."),
        unary("atan", Math, arithmetic::atan, "One-argument arctangent."),
        binary("atan2", Math, arithmetic::atan2, "Two-argument arctangent."),
        unary("sinh", Math, arithmetic::sinh, "Hyperbolic sine."),
        unary("cosh", Math, arithmetic::cosh, "Hyperbolic cosine."),
        unary("tanh", Math, arithmetic::tanh, "Hyperbolic tangent."),
        unary("asinh", Math, arithmetic::asinh, "Inverse hyperbolic sine."),
        unary("acosh", Math, arithmetic::acosh, "Inverse hyperbolic cosine."),
        unary("atanh", Math, arithmetic::atanh, "Inverse hyperbolic tangent."),
        unary("erf", Math, arithmetic::erf, "Error function."),
        unary("erfc", Math, arithmetic::erfc, "Complementary error function."),
        unary("qnorm", Math, arithmetic::qnorm, "Normal cumulative distribution function."),
        unary("invqnorm", Math, arithmetic::invqnorm,
            "Inverse of normal cumulative distribution function. Returns 0 for arguments outside (0, 1)."),
        ternary("logifit", Math, arithmetic::logifit,
            "Given m and b from logistic regression, compute fit: $yhat=logifit($x,$m,$b)."),
        entry("urand", Math, Arity::Exactly(0), Shape::Scalar, BuiltinImpl::Variadic(arithmetic::urand),
            "Floating-point numbers uniformly distributed on the unit interval."),
        entry("urand32", Math, Arity::Exactly(0), Shape::Scalar, BuiltinImpl::Variadic(arithmetic::urand32),
            "Integer uniformly distributed 0 and 2**32-1 inclusive."),
        binary("urandint", Math, arithmetic::urandint,
            "Integer uniformly distributed between inclusive integer endpoints."),
        entry("min", Math, Arity::AtLeast(0), Shape::Scalar, BuiltinImpl::Variadic(arithmetic::min),
            "Minimum; booleans sort before numbers, numbers before strings."),
        entry("max", Math, Arity::AtLeast(0), Shape::Scalar, BuiltinImpl::Variadic(arithmetic::max),
            "Maximum; strings sort after numbers, numbers after booleans."),
        unary("int", Conversion, strings::to_int, "Convert int/float/bool/string to int."),
        unary("float", Conversion, strings::to_float, "Convert int/float/bool/string to float."),
        unary("boolean", Conversion, strings::to_boolean, "Convert int/float/bool/string to boolean."),
        unary("string", Conversion, strings::to_string, "Convert int/float/bool/string to string."),
        unary("hexfmt", Conversion, strings::hexfmt, "Converts int to hex string, e.g. 255 to 0xff."),
        binary("fmtnum", Conversion, strings::fmtnum,
            "Convert int/float/bool to string using printf-style format, e.g. fmtnum($x, \"%08.3lf\")."),
        unary("strlen", String, strings::strlen, "String length."),
        unary("toupper", String, strings::toupper, "Convert string to uppercase."),
        unary("tolower", String, strings::tolower, "Convert string to lowercase."),
        unary("capitalize", String, strings::capitalize, "Convert string's first character to uppercase."),
        unary("lstrip", String, strings::lstrip, "Strip leading whitespace from string."),
        unary("rstrip", String, strings::rstrip, "Strip trailing whitespace from string."),
        unary("strip", String, strings::strip, "Strip leading and trailing whitespace from string."),
        unary("clean_whitespace", String, strings::clean_whitespace, "Same as collapse_whitespace and strip."),
        unary("collapse_whitespace", String, strings::collapse_whitespace,
            "Strip repeated whitespace from string."),
        binary("truncate", String, strings::truncate, "Truncates string first argument to max length of int second argument."),
        ternary("substr", String, strings::substr,
            "substr(s,m,n) gives substring of s from 0-up position m to n inclusive. Negative indices are errors."),
        ternary("ssub", String, strings::ssub, "Like sub but does no regexing. No characters are special."),
        entry("sub", String, Arity::Exactly(3), Shape::Scalar, BuiltinImpl::RegexTernary(matching::sub),
            "Example: sub(\"ababab\", \"ab\", \"XY\") gives \"XYabab\": replacement on the first match only."),
        entry("gsub", String, Arity::Exactly(3), Shape::Scalar, BuiltinImpl::RegexTernary(matching::gsub),
            "Example: gsub(\"ababab\", \"ab\", \"XY\") gives \"XYXYXY\": replacement on all matches."),
        entry("regextract", String, Arity::Exactly(2), Shape::Scalar, BuiltinImpl::RegexBinary(matching::regextract),
            "Example: regextract(\"index ab09 file\", \"[a-z][a-z][0-9][0-9]\") gives \"ab09\"."),
        entry("regextract_or_else", String, Arity::Exactly(3), Shape::Scalar,
            BuiltinImpl::RegexTernary(matching::regextract_or_else),
            "Like regextract but the third argument is returned when there is no match."),
        entry("systime", Time, Arity::Exactly(0), Shape::Scalar, BuiltinImpl::Variadic(time::systime),
            "Floating-point seconds since the epoch."),
        unary("sec2gmt", Time, time::sec2gmt,
            "Formats seconds since epoch as GMT timestamp, e.g. sec2gmt(1440768801.7) = \"2015-08-28T13:33:21Z\". Leaves non-numbers as-is."),
        binary("sec2gmt", Time, time::sec2gmt_places,
            "With second integer argument n, shows n decimal places for the seconds, e.g. sec2gmt(1440768801.7, 1) = \"2015-08-28T13:33:21.7Z\"."),
        unary("sec2gmtdate", Time, time::sec2gmtdate,
            "Formats seconds since epoch (integer part) as GMT date, e.g. sec2gmtdate(1440768801.7) = \"2015-08-28\". Leaves non-numbers as-is."),
        binary("strftime", Time, time::strftime,
            "Formats seconds since epoch as GMT timestamp. %1S through %9S give fractional seconds, e.g. strftime(1440768801.7, \"%Y-%m-%dT%H:%M:%3SZ\") = \"2015-08-28T13:33:21.700Z\"."),
        binary("strptime", Time, time::strptime,
            "Parses timestamp as seconds since epoch, e.g. strptime(\"2015-08-28T13:33:21Z\", \"%Y-%m-%dT%H:%M:%SZ\") = 1440768801."),
        unary("gmt2sec", Time, time::gmt2sec,
            "Parses GMT timestamp as integer seconds since epoch, e.g. gmt2sec(\"2001-02-03T04:05:06Z\") = 981173106."),
        unary("sec2dhms", Time, time::sec2dhms, "Formats integer seconds as in sec2dhms(500000) = \"5d18h53m20s\"."),
        unary("fsec2dhms", Time, time::fsec2dhms,
            "Formats floating-point seconds as in fsec2dhms(500000.25) = \"5d18h53m20.250000s\"."),
        unary("sec2hms", Time, time::sec2hms, "Formats integer seconds as in sec2hms(5000) = \"01:23:20\"."),
        unary("fsec2hms", Time, time::fsec2hms,
            "Formats floating-point seconds as in fsec2hms(5000.25) = \"01:23:20.250000\"."),
        unary("dhms2sec", Time, time::dhms2sec, "Recovers integer seconds as in dhms2sec(\"1d2h3m4s\") = 93784."),
        unary("dhms2fsec", Time, time::dhms2fsec,
            "Recovers floating-point seconds as in dhms2fsec(\"1d2h3m4.5s\") = 93784.500000."),
        unary("hms2sec", Time, time::hms2sec, "Recovers integer seconds as in hms2sec(\"01:23:20\") = 5000."),
        unary("hms2fsec", Time, time::hms2fsec,
            "Recovers floating-point seconds as in hms2fsec(\"01:23:20.25\") = 5000.250000."),
        entry("typeof", Typing, Arity::Exactly(1), Shape::Scalar, BuiltinImpl::MapUnary(type_of),
            "Type of the argument: absent, empty, error, string, int, float, boolean or map."),
    ];

    for &(name, predicate, help) in types::PREDICATES {
        entries.push(entry(name, Typing, Arity::Exactly(1), Shape::Scalar, BuiltinImpl::Predicate(predicate), help));
    }
    for &(name, predicate, _) in types::PREDICATES {
        let asserting: &'static str = ASSERTING_NAMES
            .iter()
            .find(|candidate| candidate.strip_prefix("asserting_") == name.strip_prefix("is_"))
            .copied()
            .unwrap_or(name);
        entries.push(entry(
            asserting,
            Typing,
            Arity::Exactly(1),
            Shape::Any,
            BuiltinImpl::Asserting(predicate),
            "Returns the argument when the matching is_ predicate holds, else aborts the program.",
        ));
    }

    entries.extend([
        map_fn("haskey", Arity::Exactly(2), Shape::Scalar, BuiltinImpl::MapBinary(xfuncs::haskey),
            "True if the map has the key, else false."),
        map_fn("length", Arity::Exactly(1), Shape::Scalar, BuiltinImpl::MapUnary(xfuncs::length),
            "Counts number of top-level entries in a map; 1 for scalars, 0 for absent."),
        map_fn("depth", Arity::Exactly(1), Shape::Scalar, BuiltinImpl::MapUnary(xfuncs::depth),
            "Prints maximum depth of a map. Scalars have depth 0."),
        map_fn("leafcount", Arity::Exactly(1), Shape::Scalar, BuiltinImpl::MapUnary(xfuncs::leafcount),
            "Counts total number of terminal values in a map."),
        map_fn("mapsum", Arity::AtLeast(0), Shape::Map, BuiltinImpl::MapVariadic(xfuncs::mapsum),
            "With 0 args, returns empty map. With >= 1 arg, returns a map with key-value pairs from all arguments. Rightmost collisions win."),
        map_fn("mapdiff", Arity::AtLeast(0), Shape::Map, BuiltinImpl::MapVariadic(xfuncs::mapdiff),
            "With 0 args, returns empty map. With 1 arg, returns copy of arg. With 2 or more, returns copy of arg 1 with all keys from any of remaining argument maps removed."),
        map_fn("mapexcept", Arity::AtLeast(1), Shape::Map, BuiltinImpl::MapVariadic(xfuncs::mapexcept),
            "Returns a map with keys from remaining arguments, if any, unset."),
        map_fn("maponly", Arity::AtLeast(1), Shape::Map, BuiltinImpl::MapVariadic(xfuncs::maponly),
            "Returns a map with only keys from remaining arguments set."),
        map_fn("mapselect", Arity::AtLeast(1), Shape::Map, BuiltinImpl::MapVariadic(xfuncs::maponly),
            "Same as maponly."),
        map_fn("splitnv", Arity::Exactly(2), Shape::Map, BuiltinImpl::MapBinary(xfuncs::splitnv),
            "Splits string by separator into integer-indexed map with type inference."),
        map_fn("splitnvx", Arity::Exactly(2), Shape::Map, BuiltinImpl::MapBinary(xfuncs::splitnvx),
            "Splits string by separator into integer-indexed map without type inference (values are strings)."),
        map_fn("splitkv", Arity::Exactly(3), Shape::Map, BuiltinImpl::MapTernary(xfuncs::splitkv),
            "Splits string by separators into map with type inference."),
        map_fn("splitkvx", Arity::Exactly(3), Shape::Map, BuiltinImpl::MapTernary(xfuncs::splitkvx),
            "Splits string by separators into map without type inference (keys and values are strings)."),
        map_fn("joink", Arity::Exactly(2), Shape::Scalar, BuiltinImpl::MapBinary(xfuncs::joink),
            "Makes string from map keys."),
        map_fn("joinv", Arity::Exactly(2), Shape::Scalar, BuiltinImpl::MapBinary(xfuncs::joinv),
            "Makes string from map values."),
        map_fn("joinkv", Arity::Exactly(3), Shape::Scalar, BuiltinImpl::MapTernary(xfuncs::joinkv),
            "Makes string from map key-value pairs."),
        map_fn("json_encode", Arity::Exactly(1), Shape::Scalar, BuiltinImpl::MapUnary(xfuncs::json_encode),
            "Converts value to JSON-encoded string. Default output is single-line."),
        map_fn("json_encode", Arity::Exactly(2), Shape::Scalar, BuiltinImpl::MapBinary(xfuncs::json_encode_multiline),
            "With optional second boolean argument set to true, produces multiline output."),
        map_fn("json_decode", Arity::Exactly(1), Shape::Any, BuiltinImpl::MapUnary(xfuncs::json_decode),
            "Converts value from JSON-encoded string."),
    ]);
    entries
}

const ASSERTING_NAMES: &[&str] = &[
    "asserting_absent",
    "asserting_present",
    "asserting_empty",
    "asserting_not_empty",
    "asserting_null",
    "asserting_not_null",
    "asserting_error",
    "asserting_string",
    "asserting_numeric",
    "asserting_int",
    "asserting_float",
    "asserting_boolean",
    "asserting_map",
    "asserting_not_map",
    "asserting_empty_map",
    "asserting_nonempty_map",
];
