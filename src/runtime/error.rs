use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("mlr: {predicate} type-assertion failed at NR={nr} FNR={fnr} FILENAME={filename}")]
    TypeAssertion {
        predicate: String,
        nr: u64,
        fnr: u64,
        filename: String,
    },
    #[error("mlr: couldn't {action} variable {type_name} {name} from value {value}")]
    TypeDeclaration {
        action: &'static str,
        type_name: String,
        name: String,
        value: String,
    },
    #[error("mlr: {construct} condition did not evaluate to boolean; got {type_name}")]
    NonBooleanCondition {
        construct: &'static str,
        type_name: &'static str,
    },
    #[error("mlr: map keys must be string or int; got {type_name}")]
    InvalidMapKey { type_name: &'static str },
    #[error("mlr: positional names must be integers; got \"{got}\".")]
    PositionalIndex { got: String },
    #[error("mlr: output redirection yielded {type_name}, not string")]
    RedirectTarget { type_name: &'static str },
    #[error("mlr: could not compile regex \"{pattern}\": {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("mlr: {action} \"{target}\": {source}")]
    Io {
        action: &'static str,
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mlr: data parse error in {filename}: {message}")]
    MalformedInput { filename: String, message: String },
    #[error("mlr: internal coding error detected at {file}:{line}: {message}")]
    Internal {
        file: &'static str,
        line: u32,
        message: String,
    },
}

/// Builds a [`RuntimeError::Internal`] tagged with the caller's location.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::runtime::error::RuntimeError::Internal {
            file: file!(),
            line: line!(),
            message: format!($($arg)*),
        }
    };
}
