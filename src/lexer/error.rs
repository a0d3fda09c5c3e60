use crate::diagnostic::Diagnostic;
use crate::lexer::Span;

/// A lexical error with location information. Converted into an E100
/// diagnostic by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl LexError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(message: impl Into<String>, span: Span, help: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
            help: Some(help.into()),
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        let mut diag = Diagnostic::error("E100", self.message, self.span);
        if let Some(help) = self.help {
            diag = diag.with_note(help);
        }
        diag
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lexical error: {}", self.message)
    }
}

impl std::error::Error for LexError {}
