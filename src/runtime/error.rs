use crate::language::span::Span;
use std::path::PathBuf;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The error taxonomy of the runtime. Kinds carry their message; the span,
/// source file and function stack are attached as the error unwinds.
#[derive(Clone, Debug, Error)]
pub enum ErrorKind {
    #[error("Reversibility violation: {0}")]
    Reversibility(String),
    #[error("Scope error: {0}")]
    Scope(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("Index error: {0}")]
    Index(String),
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
    #[error("Try exhausted: {0}")]
    TryExhausted(String),
    #[error("Load error: {0}")]
    Load(String),
    #[error("Sync error: {0}")]
    Sync(String),
    /// Raised in threads halted because a sibling failed first. Never the
    /// reported root cause.
    #[error("Halted by a failure in a sibling thread")]
    Sympathetic,
}

#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub span: Span,
    pub path: Option<PathBuf>,
    /// Function names, innermost first.
    pub stack: Vec<String>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            path: None,
            stack: Vec::new(),
        }
    }

    pub fn bare(kind: ErrorKind) -> Self {
        Self::new(kind, Span::default())
    }

    pub fn in_function(mut self, name: &str) -> Self {
        self.stack.push(name.to_string());
        self
    }

    pub fn with_path(mut self, path: &std::path::Path) -> Self {
        if self.path.is_none() {
            self.path = Some(path.to_path_buf());
        }
        self
    }

    pub fn is_sympathetic(&self) -> bool {
        matches!(self.kind, ErrorKind::Sympathetic)
    }
}
