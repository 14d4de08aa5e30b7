//! Error types for the IPE compiler

use serde::Serialize;
use thiserror::Error;

use crate::lexer::Span;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Lexical error during tokenization
    #[error("Lex error at {}:{}: {message}", .span.line, .span.col)]
    LexError { message: String, span: Span },

    /// Syntax error during parsing
    #[error("Parse error at {}:{}: {message}", .span.line, .span.col)]
    ParseError { message: String, span: Span },

    /// Type checking, name resolution and layout errors
    #[error("Semantic error at {}:{}: {message}", .span.line, .span.col)]
    SemanticError { message: String, span: Span },

    /// I/O error
    #[error("I/O error: {message}")]
    IoError { message: String },

    /// Unit loading and import errors
    #[error("Module error at {}:{}: {message}", .span.line, .span.col)]
    ModuleError { message: String, span: Span },

    /// Manifest (ipe.toml) error
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Code generator invariant broken
    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

/// Error category reported with a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Lex,
    Parse,
    Semantic,
    Io,
    Module,
    Manifest,
    Internal,
}

impl Error {
    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Error::SemanticError { message: message.into(), span }
    }

    pub fn module(message: impl Into<String>, span: Span) -> Self {
        Error::ModuleError { message: message.into(), span }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal { message: message.into() }
    }

    /// Source location, when the error has one
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::LexError { span, .. }
            | Error::ParseError { span, .. }
            | Error::SemanticError { span, .. }
            | Error::ModuleError { span, .. } => Some(*span),
            Error::IoError { .. } | Error::Manifest(_) | Error::Internal { .. } => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LexError { .. } => ErrorKind::Lex,
            Error::ParseError { .. } => ErrorKind::Parse,
            Error::SemanticError { .. } => ErrorKind::Semantic,
            Error::IoError { .. } => ErrorKind::Io,
            Error::ModuleError { .. } => ErrorKind::Module,
            Error::Manifest(_) => ErrorKind::Manifest,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Message without the location prefix
    pub fn message(&self) -> &str {
        match self {
            Error::LexError { message, .. }
            | Error::ParseError { message, .. }
            | Error::SemanticError { message, .. }
            | Error::IoError { message }
            | Error::ModuleError { message, .. }
            | Error::Internal { message } => message,
            Error::Manifest(message) => message,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError { message: err.to_string() }
    }
}

impl From<ipe_core::AsmError> for Error {
    fn from(err: ipe_core::AsmError) -> Self {
        Error::internal(err.to_string())
    }
}

/// A compile error as seen by the diagnostic hook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Unit or file the error belongs to
    pub file: String,
    pub span: Option<Span>,
    pub message: String,
    pub kind: ErrorKind,
}

impl Diagnostic {
    pub fn new(file: impl Into<String>, error: &Error) -> Self {
        Self {
            file: file.into(),
            span: error.span(),
            message: error.message().to_string(),
            kind: error.kind(),
        }
    }

    pub fn line(&self) -> usize {
        self.span.map_or(0, |s| s.line)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}:{}: {}", self.file, span.line, self.message),
            None => write!(f, "{}: {}", self.file, self.message),
        }
    }
}
