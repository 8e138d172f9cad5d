//! Record readers and writers for DKVP and JSON, and the redirected-output
//! manager used by `tee`, `emit > ...` and `print > ...`.

pub mod reader;
pub mod redirect;
pub mod writer;

use crate::runtime::format::NumberFormat;
use indexmap::IndexMap;

/// One record: field names to field text, in input order.
pub type Record = IndexMap<String, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordFormat {
    #[default]
    Dkvp,
    Json,
}

#[derive(Clone, Debug)]
pub struct IoOptions {
    pub input_format: RecordFormat,
    pub output_format: RecordFormat,
    pub ifs: String,
    pub ips: String,
    pub irs: String,
    pub ofs: String,
    pub ops: String,
    pub ors: String,
    pub jvstack: bool,
    pub ofmt: NumberFormat,
    pub oflatsep: String,
}

impl Default for IoOptions {
    fn default() -> Self {
        Self {
            input_format: RecordFormat::Dkvp,
            output_format: RecordFormat::Dkvp,
            ifs: ",".to_string(),
            ips: "=".to_string(),
            irs: "\n".to_string(),
            ofs: ",".to_string(),
            ops: "=".to_string(),
            ors: "\n".to_string(),
            jvstack: false,
            ofmt: NumberFormat::default(),
            oflatsep: ":".to_string(),
        }
    }
}
