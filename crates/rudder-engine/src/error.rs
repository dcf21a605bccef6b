//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("template error in {}: {}", .0.template, .0.message)]
    Template(#[from] TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to list templates: {0}")]
    Chart(#[from] rudder_core::CoreError),
}

/// Rendering failure pointing at the offending template line
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(rudder::template::render))]
pub struct TemplateError {
    pub message: String,

    /// Template path relative to `templates/`
    pub template: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, source: &str) -> Self {
        let span = err.line().and_then(|line| line_span(source, line));
        let suggestion = match err.kind() {
            minijinja::ErrorKind::UndefinedError => Some(
                "check that the value exists in values.yaml or guard it with `is defined`"
                    .to_string(),
            ),
            minijinja::ErrorKind::UnknownFilter => Some(format!(
                "available filters: {}",
                crate::filters::AVAILABLE_FILTERS.join(", ")
            )),
            _ => None,
        };

        Self {
            message: err
                .to_string()
                .replace("undefined value", "undefined variable"),
            template: template_name.to_string(),
            src: NamedSource::new(template_name, source.to_string()),
            span,
            suggestion,
        }
    }
}

fn line_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, line) in source.lines().enumerate() {
        if idx + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_span() {
        let src = "a: 1\nbb: 2\nccc: 3";
        let span = line_span(src, 2).unwrap();
        assert_eq!(span.offset(), 5);
        assert_eq!(span.len(), 5);
        assert!(line_span(src, 9).is_none());
    }
}
