//! Conversions between xvalues and JSON for `dump`, `json_encode`,
//! `json_decode` and the JSON record formats.

use crate::runtime::{
    format::NumberFormat,
    infer::{scan_number, Number},
    value::Mlrval,
    xvalue::{MapKey, Xvalue},
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::str::FromStr;

pub fn scalar_to_json(value: &Mlrval, ofmt: &NumberFormat) -> Value {
    match value {
        Mlrval::Int(i) => Value::from(*i),
        Mlrval::Float(f) => number_value(&ofmt.format(Number::Float(*f))),
        Mlrval::Boolean(b) => Value::Bool(*b),
        Mlrval::String(s) => match scan_number(s) {
            Some(_) => number_value(s),
            None => Value::String(s.clone()),
        },
        Mlrval::Absent | Mlrval::Void => Value::String(String::new()),
        Mlrval::Error => Value::String(Mlrval::Error.to_string()),
    }
}

/// Numbers keep their text exactly; hex and other spellings JSON cannot
/// carry fall back to strings.
fn number_value(text: &str) -> Value {
    serde_json::Number::from_str(text)
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Serializes an xvalue entry by entry, so keys that render alike
/// (`1` and `"1"`) are both written in insertion order.
pub struct JsonView<'a> {
    value: &'a Xvalue,
    ofmt: &'a NumberFormat,
}

impl<'a> JsonView<'a> {
    pub fn new(value: &'a Xvalue, ofmt: &'a NumberFormat) -> Self {
        Self { value, ofmt }
    }
}

impl Serialize for JsonView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Xvalue::Terminal(scalar) => scalar_to_json(scalar, self.ofmt).serialize(serializer),
            Xvalue::Map(level) => {
                let mut map = serializer.serialize_map(Some(level.len()))?;
                for (key, child) in level.iter() {
                    map.serialize_entry(&key.to_string(), &JsonView::new(child, self.ofmt))?;
                }
                map.end()
            }
        }
    }
}

pub fn from_json(value: Value, infer: bool) -> Xvalue {
    match value {
        Value::Null => Xvalue::Terminal(Mlrval::Void),
        Value::Bool(b) => Xvalue::Terminal(Mlrval::Boolean(b)),
        Value::Number(n) => Xvalue::Terminal(Mlrval::from_data(&n.to_string(), true)),
        Value::String(s) => Xvalue::Terminal(Mlrval::from_data(&s, infer)),
        Value::Array(items) => Xvalue::Map(
            items
                .into_iter()
                .zip(1..)
                .map(|(item, index)| (MapKey::Int(index), from_json(item, infer)))
                .collect(),
        ),
        Value::Object(entries) => Xvalue::Map(
            entries
                .into_iter()
                .map(|(key, child)| (MapKey::String(key), from_json(child, infer)))
                .collect(),
        ),
    }
}

pub fn encode(value: &Xvalue, multiline: bool, ofmt: &NumberFormat) -> String {
    let view = JsonView::new(value, ofmt);
    let text = if multiline {
        serde_json::to_string_pretty(&view)
    } else {
        serde_json::to_string(&view)
    };
    text.unwrap_or_default()
}

pub fn decode(text: &str) -> Option<Xvalue> {
    serde_json::from_str::<Value>(text)
        .ok()
        .map(|value| from_json(value, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::xvalue::tests::{int, map_of};

    #[test]
    fn encodes_nested_maps_in_order() {
        let value = map_of(&[
            ("b", int(1)),
            ("a", map_of(&[("x", Xvalue::Terminal(Mlrval::String("hi".into())))])),
        ]);
        assert_eq!(
            encode(&value, false, &NumberFormat::default()),
            r#"{"b":1,"a":{"x":"hi"}}"#
        );
    }

    #[test]
    fn int_and_string_keys_that_render_alike_are_both_kept() {
        let mut level = crate::runtime::xvalue::Level::new();
        level.insert(MapKey::Int(1), map_of(&[("x", int(5))]));
        level.insert(MapKey::from("1"), int(6));
        let value = Xvalue::Map(level);
        assert_eq!(
            encode(&value, false, &NumberFormat::default()),
            r#"{"1":{"x":5},"1":6}"#
        );
        assert_eq!(
            encode(&value, true, &NumberFormat::default()),
            "{\n  \"1\": {\n    \"x\": 5\n  },\n  \"1\": 6\n}"
        );
    }

    #[test]
    fn pretty_form_uses_two_space_indent() {
        let value = map_of(&[("sum", Xvalue::Terminal(Mlrval::Float(0.5)))]);
        assert_eq!(
            encode(&value, true, &NumberFormat::default()),
            "{\n  \"sum\": 0.500000\n}"
        );
    }

    #[test]
    fn numeric_strings_are_unquoted_and_hex_stays_text() {
        let ofmt = NumberFormat::default();
        assert_eq!(scalar_to_json(&Mlrval::String("12".into()), &ofmt).to_string(), "12");
        assert_eq!(
            scalar_to_json(&Mlrval::String("0xff".into()), &ofmt).to_string(),
            "\"0xff\""
        );
    }

    #[test]
    fn decodes_arrays_as_one_up_maps() {
        let decoded = decode(r#"{"a":[10,"x"],"b":{"c":true}}"#).expect("json");
        assert_eq!(decoded.lookup(&[MapKey::from("a"), MapKey::Int(1)]), Some(&int(10)));
        assert_eq!(
            decoded.lookup(&[MapKey::from("b"), MapKey::from("c")]),
            Some(&Xvalue::Terminal(Mlrval::Boolean(true)))
        );
        assert!(decode("{not json").is_none());
    }
}
