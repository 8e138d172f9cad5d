pub mod bifs;
pub mod builtins;
pub mod environment;
pub mod error;
pub mod format;
pub mod infer;
pub mod interpreter;
pub mod json;
pub mod state;
pub mod value;
pub mod xfuncs;
pub mod xvalue;

pub use interpreter::Interpreter;
