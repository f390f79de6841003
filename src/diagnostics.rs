use crate::language::errors::SyntaxError;
use crate::runtime::error::RuntimeError;
use crate::runtime::registry::LoadFailure;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
            label: "here".to_string(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
struct RuntimeDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("raised here")]
    span: SourceSpan,
    message: String,
}

pub fn emit_syntax_errors(path: &Path, source: &str, errors: &[SyntaxError]) {
    let src = NamedSource::new(path.display().to_string(), source.to_string());
    for err in errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err.clone());
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

/// Prints a runtime error with its call stack and, when the source of the
/// erring module is at hand, a labeled source snippet.
pub fn report_runtime_error(error: &RuntimeError, source: Option<(&Path, &str)>) {
    if !error.stack.is_empty() {
        eprintln!("Error call stack:");
        for frame in error.stack.iter().rev() {
            eprintln!("-> {}", frame);
        }
    }
    match source {
        Some((path, text)) if !error.span.is_empty() => {
            let line = error.span.line(text);
            eprintln!("{} (line {} of {})", error, line, path.display());
            let diagnostic = RuntimeDiagnostic {
                src: NamedSource::new(path.display().to_string(), text.to_string()),
                span: (error.span.start, error.span.len()).into(),
                message: error.to_string(),
            };
            eprintln!("{:?}", Report::new(diagnostic));
        }
        _ => eprintln!("{}", error),
    }
}

pub fn report_load_failure(failure: &LoadFailure) {
    match failure {
        LoadFailure::Io { path, error } => {
            eprintln!("Load error: failed to access {}: {}", path.display(), error);
        }
        LoadFailure::Syntax {
            path,
            source,
            errors,
        } => emit_syntax_errors(path, source, &errors.errors),
        LoadFailure::Runtime(error) => report_runtime_error(error, None),
    }
}
