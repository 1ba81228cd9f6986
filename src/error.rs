use std::ops::Range;

use crate::normalize;

/// A fatal query syntax error from normalization, stage splitting, or
/// expression parsing.
///
/// The span is a byte range into the normalized query text. When the
/// query text is attached (the top-level compile step does this), the
/// error renders as a highlighted diagnostic:
///
/// ```text
/// syntax error: expected ':' in object literal
///   {"id" .a}
///         ^~
/// ```
///
/// Reserved-name escape markers inserted by the normalizer are stripped
/// back out before display, so the user sees the field names they wrote.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub span: Range<usize>,
    query: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        SyntaxError {
            message: message.into(),
            span,
            query: None,
        }
    }

    /// Shorthand for a zero-width span at a single position.
    pub fn at(message: impl Into<String>, position: usize) -> Self {
        SyntaxError::new(message, position..position + 1)
    }

    /// Attach the normalized query text for caret rendering.
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.query {
            Some(query) => {
                let (display, span) = normalize::display_with_span(query, self.span.clone());
                let start = span.start.min(display.len());
                let width = span.end.saturating_sub(span.start).max(1);
                writeln!(f, "syntax error: {}", self.message)?;
                writeln!(f, "  {}", display)?;
                write!(f, "  {}^{}", " ".repeat(start), "~".repeat(width - 1))
            }
            None => write!(
                f,
                "syntax error at position {}: {}",
                self.span.start, self.message
            ),
        }
    }
}

impl std::error::Error for SyntaxError {}
