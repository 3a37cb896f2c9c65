use std::num::ParseFloatError;

/// Errors produced while decoding an exposition payload.
///
/// Only [`ParseError::InvalidUtf8`] is raised eagerly by [`super::Parser::new`]; all other
/// variants are recorded by the parser when it stops early and can be inspected through
/// [`super::Parser::error`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid metric name at line {line}: `{text}`")]
    InvalidMetricName { line: usize, text: String },

    #[error("invalid label set at line {line}: {reason}")]
    InvalidLabels { line: usize, reason: &'static str },

    #[error("missing sample value at line {line}")]
    MissingValue { line: usize },

    #[error("invalid sample value at line {line}: '{value}': {source}")]
    InvalidValue {
        line: usize,
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("invalid timestamp at line {line}: '{value}'")]
    InvalidTimestamp { line: usize, value: String },

    #[error("unexpected trailing content at line {line}: `{text}`")]
    TrailingContent { line: usize, text: String },

    #[error("malformed `{directive}` line {line}")]
    MalformedDirective {
        line: usize,
        directive: &'static str,
    },

    #[error("unknown metric type '{value}' at line {line}")]
    UnknownType { line: usize, value: String },
}

impl ParseError {
    /// Returns the 1-based line the error was found on, if it is tied to a line.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::InvalidUtf8(_) => None,
            ParseError::InvalidMetricName { line, .. }
            | ParseError::InvalidLabels { line, .. }
            | ParseError::MissingValue { line }
            | ParseError::InvalidValue { line, .. }
            | ParseError::InvalidTimestamp { line, .. }
            | ParseError::TrailingContent { line, .. }
            | ParseError::MalformedDirective { line, .. }
            | ParseError::UnknownType { line, .. } => Some(*line),
        }
    }
}
