//! Error types for binding and dispatch.

use sb_protocol::SanitizeError;

/// Result type for signal handlers and hooks.
pub type HandlerResult = Result<(), HandlerError>;

/// A payload whose shape does not fit the handler's signature.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("takes {expected} positional argument(s) but {given} were given")]
    TooManyPositional { expected: usize, given: usize },
    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    #[error("argument '{name}': {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Errors a handler invocation can end with.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("argument error: {0}")]
    Argument(#[from] ArgumentError),
    #[error("payload is not JSON-safe: {0}")]
    Sanitize(#[from] SanitizeError),
    #[error("failed: {0}")]
    Failed(String),
    #[error("handler panicked")]
    Panicked,
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced at the dispatch boundary.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("unknown signal: {0}")]
    UnknownSignal(String),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}
