//! Rust-style diagnostic rendering.
//!
//! Output format:
//!
//! ```text
//! error[E361]: fail marker on pure verb
//!   --> app.prv:4:12
//!    |
//!  4 | transforms parse(s String)!
//!    |                           ^
//!   = note: pure verbs cannot fail
//!   try: remove the `!`
//! ```

use super::styles::{severity_color, BLUE, BOLD, RESET};
use super::{ColorConfig, Diagnostic, Files, LabelStyle};

pub struct DiagnosticEmitter<'a> {
    files: &'a Files,
    color: bool,
}

impl<'a> DiagnosticEmitter<'a> {
    pub fn new(files: &'a Files, color: ColorConfig) -> Self {
        Self {
            files,
            color: color.enabled(),
        }
    }

    fn c<'b>(&self, code: &'b str) -> &'b str {
        if self.color {
            code
        } else {
            ""
        }
    }

    pub fn render(&self, diag: &Diagnostic) -> String {
        let mut lines: Vec<String> = Vec::new();
        let color = severity_color(diag.severity);

        lines.push(format!(
            "{}{}[{}]{}{}: {}{}",
            self.c(color),
            diag.severity.as_str(),
            diag.code,
            self.c(RESET),
            self.c(BOLD),
            diag.message,
            self.c(RESET),
        ));

        for label in &diag.labels {
            let span = label.span;
            let loc = self.files.location(span.file, span.start);
            let end_loc = self.files.location(span.file, span.end);
            lines.push(format!(
                "  {}-->{} {}:{}:{}",
                self.c(BLUE),
                self.c(RESET),
                self.files.name(span.file),
                loc.line,
                loc.column,
            ));
            let blank_gutter = format!("  {}     |{}", self.c(BLUE), self.c(RESET));
            lines.push(blank_gutter.clone());

            if let Some(source_line) = self.files.line_text(span.file, loc.line) {
                lines.push(format!(
                    "  {}{:>4} |{} {}",
                    self.c(BLUE),
                    loc.line,
                    self.c(RESET),
                    source_line,
                ));
                let caret_len = if loc.line == end_loc.line {
                    (end_loc.column.saturating_sub(loc.column)).max(1)
                } else {
                    1
                };
                let marker = match label.style {
                    LabelStyle::Primary => "^",
                    LabelStyle::Secondary => "-",
                };
                lines.push(format!(
                    "{} {}{}{}{}",
                    blank_gutter,
                    " ".repeat(loc.column - 1),
                    self.c(color),
                    marker.repeat(caret_len),
                    self.c(RESET),
                ));
            }

            if !label.message.is_empty() {
                lines.push(format!(
                    "{}   {}{}{}",
                    blank_gutter,
                    self.c(color),
                    label.message,
                    self.c(RESET),
                ));
            }
        }

        for note in &diag.notes {
            lines.push(format!("  {}={} note: {}", self.c(BLUE), self.c(RESET), note));
        }

        for suggestion in &diag.suggestions {
            lines.push(format!(
                "  {}try:{} {}",
                self.c(BLUE),
                self.c(RESET),
                suggestion.replacement,
            ));
        }

        lines.join("\n")
    }

    pub fn render_all(&self, diagnostics: &[Diagnostic]) -> String {
        diagnostics
            .iter()
            .map(|d| self.render(d))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;
    use crate::source::Source;

    #[test]
    fn test_render_plain() {
        let mut files = Files::new();
        let id = files.add(&Source::from_str("t.prv", "port as Port = 70000\n"));
        let diag = Diagnostic::error("E341", "value 70000 violates refinement", Span::new(id, 15, 20))
            .with_suggestion("clamp the value", "clamp(70000, 1, 65535)");
        let emitter = DiagnosticEmitter::new(&files, ColorConfig::Never);
        let out = emitter.render(&diag);
        assert!(out.starts_with("error[E341]: value 70000 violates refinement"));
        assert!(out.contains("--> t.prv:1:16"));
        assert!(out.contains("^^^^^"));
        assert!(out.contains("try: clamp(70000, 1, 65535)"));
    }
}
