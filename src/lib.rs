pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod io;
pub mod language;
pub mod runtime;
