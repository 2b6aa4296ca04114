// Copyright 2025 Cornell University
// released under MIT License

use thiserror::Error;

/// Byte range of the offending line in the source text
pub type Span = (usize, usize);

/// Errors detected while loading a network description. All of them are
/// fatal for the file being loaded.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Wrong number of fields, unknown operation, bad integer, empty block
    #[error("{message}")]
    Format {
        message: String,
        line: usize,
        span: Span,
    },
    /// A process name or an action at a state was declared twice
    #[error("{message}")]
    DuplicateDeclaration {
        message: String,
        line: usize,
        span: Span,
    },
    /// Process count below one, or negative buffer capacity
    #[error("{message}")]
    InvalidCount {
        message: String,
        line: usize,
        span: Span,
    },
    /// Buffer declared after its channel was already used
    #[error("{message}")]
    Ordering {
        message: String,
        line: usize,
        span: Span,
    },
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn format(message: impl Into<String>, line: usize, span: Span) -> Self {
        LoadError::Format {
            message: message.into(),
            line,
            span,
        }
    }

    pub fn duplicate(message: impl Into<String>, line: usize, span: Span) -> Self {
        LoadError::DuplicateDeclaration {
            message: message.into(),
            line,
            span,
        }
    }

    pub fn invalid_count(message: impl Into<String>, line: usize, span: Span) -> Self {
        LoadError::InvalidCount {
            message: message.into(),
            line,
            span,
        }
    }

    pub fn ordering(message: impl Into<String>, line: usize, span: Span) -> Self {
        LoadError::Ordering {
            message: message.into(),
            line,
            span,
        }
    }

    /// 1-based line number of the error, if it came from the input text
    pub fn line(&self) -> Option<usize> {
        match self {
            LoadError::Format { line, .. }
            | LoadError::DuplicateDeclaration { line, .. }
            | LoadError::InvalidCount { line, .. }
            | LoadError::Ordering { line, .. } => Some(*line),
            LoadError::Io(_) => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            LoadError::Format { span, .. }
            | LoadError::DuplicateDeclaration { span, .. }
            | LoadError::InvalidCount { span, .. }
            | LoadError::Ordering { span, .. } => Some(*span),
            LoadError::Io(_) => None,
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
