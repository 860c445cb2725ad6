//! Centralized error types for mailtmpl.

use thiserror::Error;

/// All errors produced by the mailtmpl library.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the name of the stream or file involved.
    #[error("I/O error reading '{source_name}': {source}")]
    Io {
        source_name: String,
        source: std::io::Error,
    },

    /// The input is not a structurally valid RFC 5322 message (or MIME part).
    #[error("Parse error at offset {offset}: {reason}")]
    ParseError { offset: u64, reason: String },

    /// A `Content-Type` value could not be parsed.
    #[error("Invalid Content-Type '{value}': {reason}")]
    ContentType { value: String, reason: String },

    /// A multipart body is structurally broken.
    #[error("MIME multipart error: {0}")]
    MimeError(String),

    /// The template source could not be parsed.
    #[error("template: {name}:{line}: {reason}")]
    TemplateParse {
        name: String,
        line: usize,
        reason: String,
    },

    /// Template execution failed (unknown field, helper failure, ...).
    #[error("template: {name}:{line}: executing \"{name}\" at <{context}>: {reason}")]
    TemplateExec {
        name: String,
        line: usize,
        context: String,
        reason: String,
    },
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a stream name and an `io::Error`.
    pub fn io(source_name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            source_name: source_name.into(),
            source,
        }
    }

    /// Create a `ParseError` at the given byte offset.
    pub fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Self::ParseError {
            offset: offset as u64,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_exec_display() {
        let err = MailError::TemplateExec {
            name: "email".into(),
            line: 1,
            context: ".Foo".into(),
            reason: "can't evaluate field Foo in type Email".into(),
        };
        assert_eq!(
            err.to_string(),
            "template: email:1: executing \"email\" at <.Foo>: can't evaluate field Foo in type Email"
        );
    }

    #[test]
    fn test_parse_error_offset() {
        let err = MailError::parse(12, "malformed header line");
        assert_eq!(err.to_string(), "Parse error at offset 12: malformed header line");
    }
}
