use crate::{
    language::{
        compiler::CompileError,
        errors::{SyntaxError, SyntaxErrors},
    },
    runtime::error::RuntimeError,
};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

/// Name shown above the highlighted DSL expression.
pub const EXPRESSION_NAME: &str = "(DSL expression)";

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(mlr::parse))]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(source: &str, err: &SyntaxError) -> Self {
        Self {
            src: NamedSource::new(EXPRESSION_NAME, source.to_string()),
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
            label: err.label.clone(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(mlr::compile))]
pub struct CompileDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    message: String,
    label: String,
}

impl CompileDiagnostic {
    pub fn from_error(source: &str, err: &CompileError) -> Self {
        Self {
            src: NamedSource::new(EXPRESSION_NAME, source.to_string()),
            span: err.span().into(),
            message: err.to_string(),
            label: err.label().to_string(),
        }
    }
}

pub fn emit_syntax_errors(source: &str, errors: &SyntaxErrors) {
    eprintln!("{errors}");
    for err in &errors.errors {
        eprintln!("{:?}", Report::new(SyntaxDiagnostic::from_error(source, err)));
    }
}

pub fn emit_compile_error(source: &str, error: &CompileError) {
    eprintln!("{:?}", Report::new(CompileDiagnostic::from_error(source, error)));
}

pub fn report_runtime_error(error: &RuntimeError) {
    eprintln!("{error}");
}
