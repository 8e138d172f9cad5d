use crate::io::{IoOptions, Record, RecordFormat};
use crate::runtime::{format::NumberFormat, json, value::Mlrval};
use serde_json::{Map, Value};
use std::io::{self, Write};

/// Formats records in the configured output format.
#[derive(Clone, Debug)]
pub struct RecordWriter {
    format: RecordFormat,
    ofs: String,
    ops: String,
    ors: String,
    jvstack: bool,
    ofmt: NumberFormat,
}

impl RecordWriter {
    pub fn new(options: &IoOptions) -> Self {
        Self {
            format: options.output_format,
            ofs: options.ofs.clone(),
            ops: options.ops.clone(),
            ors: options.ors.clone(),
            jvstack: options.jvstack,
            ofmt: options.ofmt.clone(),
        }
    }

    pub fn format(&self, record: &Record) -> String {
        match self.format {
            RecordFormat::Dkvp => {
                let body = record
                    .iter()
                    .map(|(key, value)| format!("{key}{}{value}", self.ops))
                    .collect::<Vec<_>>()
                    .join(&self.ofs);
                format!("{body}{}", self.ors)
            }
            RecordFormat::Json => {
                let object: Map<String, Value> = record
                    .iter()
                    .map(|(key, value)| {
                        let scalar = Mlrval::from_string(value.clone());
                        (key.clone(), json::scalar_to_json(&scalar, &self.ofmt))
                    })
                    .collect();
                let object = Value::Object(object);
                let text = if self.jvstack {
                    serde_json::to_string_pretty(&object)
                } else {
                    serde_json::to_string(&object)
                };
                format!("{}\n", text.unwrap_or_default())
            }
        }
    }

    pub fn write<W: Write>(&self, out: &mut W, record: &Record) -> io::Result<()> {
        out.write_all(self.format(record).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::parse_dkvp_line;

    #[test]
    fn dkvp_uses_output_separators() {
        let options = IoOptions {
            ofs: ";".to_string(),
            ops: ":".to_string(),
            ..IoOptions::default()
        };
        let record = parse_dkvp_line("a=1,b=xyz", ",", "=");
        assert_eq!(RecordWriter::new(&options).format(&record), "a:1;b:xyz\n");
    }

    #[test]
    fn json_unquotes_numbers() {
        let options = IoOptions {
            output_format: RecordFormat::Json,
            ..IoOptions::default()
        };
        let record = parse_dkvp_line("a=1,b=xyz,c=0.25,d=", ",", "=");
        assert_eq!(
            RecordWriter::new(&options).format(&record),
            "{\"a\":1,\"b\":\"xyz\",\"c\":0.25,\"d\":\"\"}\n"
        );
    }

    #[test]
    fn jvstack_writes_one_field_per_line() {
        let options = IoOptions {
            output_format: RecordFormat::Json,
            jvstack: true,
            ..IoOptions::default()
        };
        let record = parse_dkvp_line("a=1,b=x", ",", "=");
        assert_eq!(
            RecordWriter::new(&options).format(&record),
            "{\n  \"a\": 1,\n  \"b\": \"x\"\n}\n"
        );
    }
}
