use crate::diagnostic::Diagnostic;
use crate::lexer::Span;

/// A syntax error with location information. Most carry the generic
/// E200 code; casing and verb-shape violations carry their own codes
/// so the driver reports them in the right family.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
    pub suggestion: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            code: "E200",
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn with_code(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn suggest(mut self, replacement: impl Into<String>) -> Self {
        self.suggestion = Some(replacement.into());
        self
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.code, self.message, self.span);
        if let Some(replacement) = self.suggestion {
            diag = diag.with_suggestion("write it as", replacement);
        }
        diag
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}
