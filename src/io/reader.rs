use crate::io::{IoOptions, Record, RecordFormat};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    format::NumberFormat,
    xvalue::Xvalue,
};
use serde_json::{Deserializer, Value};
use std::io::BufRead;
use tracing::warn;

/// Splits one DKVP line. A field without the pair separator is keyed by its
/// 1-up position.
pub fn parse_dkvp_line(line: &str, ifs: &str, ips: &str) -> Record {
    let mut record = Record::new();
    if line.is_empty() {
        return record;
    }
    for (index, field) in line.split(ifs).enumerate() {
        match field.split_once(ips) {
            Some((key, value)) => {
                record.insert(key.to_string(), value.to_string());
            }
            None => {
                record.insert((index + 1).to_string(), field.to_string());
            }
        }
    }
    record
}

/// Reads every record from `input`. `filename` only labels errors.
pub fn read_records<'o, R: BufRead + 'o>(
    input: R,
    filename: &str,
    options: &'o IoOptions,
) -> Box<dyn Iterator<Item = RuntimeResult<Record>> + 'o> {
    match options.input_format {
        RecordFormat::Dkvp => Box::new(read_dkvp(input, filename.to_string(), options)),
        RecordFormat::Json => Box::new(read_json(input, filename.to_string(), options)),
    }
}

fn read_dkvp<'o, R: BufRead + 'o>(
    input: R,
    filename: String,
    options: &'o IoOptions,
) -> impl Iterator<Item = RuntimeResult<Record>> + 'o {
    input.lines().filter_map(move |line| match line {
        Err(source) => Some(Err(RuntimeError::Io {
            action: "read",
            target: filename.clone(),
            source,
        })),
        Ok(line) => {
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                None
            } else {
                Some(Ok(parse_dkvp_line(line, &options.ifs, &options.ips)))
            }
        }
    })
}

fn read_json<'o, R: BufRead + 'o>(
    input: R,
    filename: String,
    options: &'o IoOptions,
) -> impl Iterator<Item = RuntimeResult<Record>> + 'o {
    Deserializer::from_reader(input)
        .into_iter::<Value>()
        .filter_map(move |item| match item {
            Err(err) => Some(Err(RuntimeError::MalformedInput {
                filename: filename.clone(),
                message: err.to_string(),
            })),
            Ok(value @ Value::Object(_)) => {
                let mut record = Record::new();
                flatten_json(&mut record, "", &value, &options.oflatsep);
                Some(Ok(record))
            }
            Ok(other) => {
                warn!(filename = %filename, "skipping non-object JSON value: {other}");
                None
            }
        })
}

/// Nested objects join their keys with `separator`; arrays are keyed 1-up.
/// Scalars keep their JSON text so numbers round-trip unchanged.
fn flatten_json(record: &mut Record, prefix: &str, value: &Value, separator: &str) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}{separator}{key}")
        }
    };
    match value {
        Value::Object(object) if object.is_empty() && !prefix.is_empty() => {
            record.insert(prefix.to_string(), "{}".to_string());
        }
        Value::Object(object) => {
            for (key, child) in object {
                flatten_json(record, &join(key), child, separator);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_json(record, &join(&(index + 1).to_string()), child, separator);
            }
        }
        Value::String(text) => {
            record.insert(prefix.to_string(), text.clone());
        }
        Value::Null => {
            record.insert(prefix.to_string(), String::new());
        }
        other => {
            record.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Flattens an xvalue into record fields, joining nested keys with
/// `separator`. An empty nested map becomes a single `{}` field; absent
/// leaves are dropped.
pub fn flatten_to_record(value: &Xvalue, separator: &str, ofmt: &NumberFormat) -> Record {
    let mut record = Record::new();
    flatten_into(&mut record, "", value, separator, ofmt);
    record
}

pub fn flatten_into(record: &mut Record, prefix: &str, value: &Xvalue, separator: &str, ofmt: &NumberFormat) {
    match value {
        Xvalue::Map(level) if level.is_empty() && !prefix.is_empty() => {
            record.insert(prefix.to_string(), "{}".to_string());
        }
        Xvalue::Map(_) => {
            for (path, scalar) in value.flatten(prefix, separator) {
                if !scalar.is_absent() {
                    record.insert(path, scalar.render(ofmt));
                }
            }
        }
        Xvalue::Terminal(scalar) => {
            if !scalar.is_absent() {
                record.insert(prefix.to_string(), scalar.render(ofmt));
            }
        }
    }
}
