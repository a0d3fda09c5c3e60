//! Lexical analyzer for the Prove language.
//!
//! Converts source text into a token stream with explicit
//! INDENT/DEDENT tokens. Newlines after binary operators, commas,
//! opening brackets, `=>`, `|>`, `->`, and `:` are continuations and
//! produce no layout tokens.

mod error;
mod span;
mod token;

pub use error::LexError;
pub use span::Span;
pub use token::{StringPiece, Token, TokenKind};

use crate::diagnostic::FileId;

pub const DEFAULT_TAB_WIDTH: usize = 4;

/// The lexer for the Prove language.
pub struct Lexer<'a> {
    file: FileId,
    text: &'a str,
    pos: usize,
    end: usize,
    tab_width: usize,
    indent_stack: Vec<usize>,
    bracket_depth: usize,
    at_line_start: bool,
    prev_kind: Option<TokenKind>,
    prev_end: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(file: FileId, text: &'a str) -> Self {
        Self::bounded(file, text, 0, text.len())
    }

    /// A bounded lexer over `text[start..end]`, used to sub-lex the
    /// `{expr}` holes of format strings. Spans stay absolute.
    fn bounded(file: FileId, text: &'a str, start: usize, end: usize) -> Self {
        Lexer {
            file,
            text,
            pos: start,
            end,
            tab_width: DEFAULT_TAB_WIDTH,
            indent_stack: vec![0],
            bracket_depth: 0,
            at_line_start: true,
            prev_kind: None,
            prev_end: start,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_tab_width(mut self, width: usize) -> Self {
        self.tab_width = width;
        self
    }

    /// Tokenize the entire input. Errors are collected rather than
    /// aborting so later stages can still run on what lexed cleanly.
    pub fn lex(mut self) -> (Vec<Token>, Vec<LexError>) {
        while self.pos < self.end {
            if self.at_line_start && self.bracket_depth == 0 && !self.in_continuation() {
                self.handle_indentation();
            }
            self.at_line_start = false;
            self.skip_spaces();
            if self.pos >= self.end {
                break;
            }
            let ch = self.peek();
            if ch == '\n' {
                self.handle_newline();
            } else if self.starts_with("///") {
                self.lex_doc_comment();
            } else if self.starts_with("//") {
                self.skip_line_comment();
            } else if self.starts_with("\"\"\"") {
                self.lex_triple_string();
            } else if ch == '"' {
                self.lex_string(self.pos, false);
            } else if ch == 'f' && self.peek_at(1) == Some('"') {
                let start = self.pos;
                self.advance();
                self.lex_string(start, true);
            } else if ch == 'r' && self.peek_at(1) == Some('"') {
                self.lex_raw_string();
            } else if ch == '\'' {
                self.lex_char();
            } else if ch == '/' && self.regex_can_start() {
                self.lex_regex();
            } else if ch.is_ascii_digit() {
                self.lex_number();
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                self.lex_identifier();
            } else {
                self.lex_operator_or_punct();
            }
        }

        // Close any open indentation levels.
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.emit(TokenKind::Dedent, self.pos, self.pos);
        }
        self.emit(TokenKind::Eof, self.pos, self.pos);

        (self.tokens, self.errors)
    }

    // ── Cursor helpers ───────────────────────────────────────────

    fn peek(&self) -> char {
        self.text[self.pos..self.end].chars().next().unwrap_or('\0')
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        let mut chars = self.text[self.pos..self.end].chars();
        for _ in 0..offset {
            chars.next()?;
        }
        chars.next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.text[self.pos..self.end].starts_with(s)
    }

    fn advance(&mut self) -> char {
        let ch = self.peek();
        self.pos += ch.len_utf8();
        ch
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.prev_kind = Some(kind.clone());
        self.prev_end = end;
        self.tokens
            .push(Token::new(kind, Span::new(self.file, start, end)));
    }

    fn error(&mut self, message: impl Into<String>, start: usize, end: usize) {
        self.errors
            .push(LexError::new(message, Span::new(self.file, start, end)));
    }

    fn error_with_help(
        &mut self,
        message: impl Into<String>,
        start: usize,
        end: usize,
        help: impl Into<String>,
    ) {
        self.errors.push(LexError::with_help(
            message,
            Span::new(self.file, start, end),
            help,
        ));
    }

    fn skip_spaces(&mut self) {
        while self.pos < self.end {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// The previous line ended in a continuation token, so this
    /// physical line extends the current logical line.
    fn in_continuation(&self) -> bool {
        match &self.prev_kind {
            Some(kind) => kind.suppresses_newline(),
            None => false,
        }
    }

    // ── Indentation ──────────────────────────────────────────────

    fn handle_indentation(&mut self) {
        let line_start = self.pos;
        let mut width = 0usize;
        while self.pos < self.end {
            match self.peek() {
                ' ' => {
                    width += 1;
                    self.advance();
                }
                '\t' => {
                    width += self.tab_width;
                    self.advance();
                }
                _ => break,
            }
        }

        // Blank lines and plain-comment lines never change layout.
        if self.pos >= self.end || self.peek() == '\n' || self.peek() == '\r' {
            return;
        }
        if self.starts_with("//") && !self.starts_with("///") {
            return;
        }

        let current = *self.indent_stack.last().expect("indent stack is never empty");
        if width > current {
            self.indent_stack.push(width);
            self.emit(TokenKind::Indent, line_start, self.pos);
        } else if width < current {
            while self.indent_stack.len() > 1
                && *self.indent_stack.last().expect("checked above") > width
            {
                self.indent_stack.pop();
                self.emit(TokenKind::Dedent, line_start, self.pos);
            }
            let top = *self.indent_stack.last().expect("indent stack is never empty");
            if top != width {
                self.error(
                    format!("inconsistent indentation: expected {} spaces, got {}", top, width),
                    line_start,
                    self.pos,
                );
            }
        }
    }

    // ── Newlines ─────────────────────────────────────────────────

    fn handle_newline(&mut self) {
        let start = self.pos;
        self.advance();
        self.at_line_start = true;

        if self.bracket_depth > 0 {
            return;
        }
        match &self.prev_kind {
            Some(kind) if kind.suppresses_newline() => return,
            Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent) => return,
            None => return,
            _ => {}
        }
        self.emit(TokenKind::Newline, start, start + 1);
    }

    // ── Comments ─────────────────────────────────────────────────

    fn lex_doc_comment(&mut self) {
        let start = self.pos;
        self.pos += 3;
        if self.pos < self.end && self.peek() == ' ' {
            self.advance();
        }
        let text_start = self.pos;
        while self.pos < self.end && self.peek() != '\n' {
            self.advance();
        }
        let text = self.text[text_start..self.pos].to_string();
        self.emit(TokenKind::DocComment(text), start, self.pos);
    }

    fn skip_line_comment(&mut self) {
        while self.pos < self.end && self.peek() != '\n' {
            self.advance();
        }
    }

    // ── Strings ──────────────────────────────────────────────────

    fn lex_triple_string(&mut self) {
        let start = self.pos;
        self.pos += 3;
        let body_start = self.pos;
        while self.pos < self.end {
            if self.starts_with("\"\"\"") {
                let text = self.text[body_start..self.pos].to_string();
                self.pos += 3;
                self.emit(TokenKind::TripleStr(text), start, self.pos);
                return;
            }
            self.advance();
        }
        self.error("unterminated triple-quoted string", start, self.pos);
    }

    fn lex_raw_string(&mut self) {
        let start = self.pos;
        self.advance(); // r
        self.advance(); // "
        let body_start = self.pos;
        while self.pos < self.end && self.peek() != '"' {
            if self.peek() == '\n' {
                self.error("unterminated raw string literal", start, self.pos);
                return;
            }
            self.advance();
        }
        if self.pos >= self.end {
            self.error("unterminated raw string literal", start, self.pos);
            return;
        }
        let text = self.text[body_start..self.pos].to_string();
        self.advance(); // closing "
        self.emit(TokenKind::RawStr(text), start, self.pos);
    }

    /// Lex a plain or format string starting at the opening quote.
    /// For format strings, `{expr}` holes are sub-lexed with a bounded
    /// expression lexer and carried as token sequences in the payload.
    fn lex_string(&mut self, start: usize, is_format: bool) {
        self.advance(); // opening "
        let mut pieces: Vec<StringPiece> = Vec::new();
        let mut text = String::new();

        while self.pos < self.end && self.peek() != '"' {
            let ch = self.peek();
            if ch == '\\' {
                if let Some(escaped) = self.lex_escape() {
                    text.push(escaped);
                }
            } else if ch == '{' && is_format {
                if !text.is_empty() {
                    pieces.push(StringPiece::Text(std::mem::take(&mut text)));
                }
                self.advance(); // {
                let expr_start = self.pos;
                let mut depth = 1usize;
                while self.pos < self.end && depth > 0 {
                    match self.peek() {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        '\n' => break,
                        _ => {}
                    }
                    if depth > 0 {
                        self.advance();
                    }
                }
                if depth > 0 {
                    self.error("unterminated interpolation in format string", expr_start, self.pos);
                    return;
                }
                let expr_end = self.pos;
                self.advance(); // }
                let sub = Lexer::bounded(self.file, self.text, expr_start, expr_end);
                let (mut sub_tokens, sub_errors) = sub.lex();
                self.errors.extend(sub_errors);
                sub_tokens.retain(|t| {
                    !matches!(
                        t.kind,
                        TokenKind::Eof | TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                    )
                });
                pieces.push(StringPiece::Interp(sub_tokens));
            } else if ch == '\n' {
                self.error("unterminated string literal", start, self.pos);
                return;
            } else {
                text.push(self.advance());
            }
        }

        if self.pos >= self.end {
            self.error("unterminated string literal", start, self.pos);
            return;
        }
        self.advance(); // closing "

        if !text.is_empty() || pieces.is_empty() {
            pieces.push(StringPiece::Text(text));
        }
        self.emit(TokenKind::Str(pieces), start, self.pos);
    }

    fn lex_escape(&mut self) -> Option<char> {
        let esc_start = self.pos;
        self.advance(); // backslash
        if self.pos >= self.end {
            self.error("unexpected end of escape sequence", esc_start, self.pos);
            return None;
        }
        let ch = self.advance();
        match ch {
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            '0' => Some('\0'),
            '{' => Some('{'),
            '}' => Some('}'),
            '\'' => Some('\''),
            other => {
                self.error(format!("unknown escape sequence: \\{}", other), esc_start, self.pos);
                Some(other)
            }
        }
    }

    fn lex_char(&mut self) {
        let start = self.pos;
        self.advance(); // opening '
        if self.pos >= self.end {
            self.error("unterminated character literal", start, self.pos);
            return;
        }
        let value = if self.peek() == '\\' {
            self.lex_escape().unwrap_or('\0')
        } else {
            self.advance()
        };
        if self.pos < self.end && self.peek() == '\'' {
            self.advance();
        } else {
            self.error("unterminated character literal", start, self.pos);
        }
        self.emit(TokenKind::Char(value), start, self.pos);
    }

    // ── Regex ────────────────────────────────────────────────────

    fn regex_can_start(&self) -> bool {
        match &self.prev_kind {
            Some(kind) => !kind.is_value_end(),
            None => true,
        }
    }

    fn lex_regex(&mut self) {
        let start = self.pos;
        self.advance(); // opening /
        let body_start = self.pos;
        while self.pos < self.end && self.peek() != '/' {
            if self.peek() == '\\' {
                self.advance();
                if self.pos < self.end {
                    self.advance();
                }
            } else if self.peek() == '\n' {
                self.error("unterminated regex literal", start, self.pos);
                return;
            } else {
                self.advance();
            }
        }
        if self.pos >= self.end {
            self.error("unterminated regex literal", start, self.pos);
            return;
        }
        let pattern = self.text[body_start..self.pos].to_string();
        self.advance(); // closing /
        self.emit(TokenKind::Regex(pattern), start, self.pos);
    }

    // ── Numbers ──────────────────────────────────────────────────

    fn lex_number(&mut self) {
        let start = self.pos;

        if self.peek() == '0' {
            match self.peek_at(1) {
                Some('x') | Some('X') => {
                    self.pos += 2;
                    self.lex_radix_digits(start, 16, |c| c.is_ascii_hexdigit());
                    return;
                }
                Some('b') | Some('B') => {
                    self.pos += 2;
                    self.lex_radix_digits(start, 2, |c| c == '0' || c == '1');
                    return;
                }
                Some('o') | Some('O') => {
                    self.pos += 2;
                    self.lex_radix_digits(start, 8, |c| ('0'..='7').contains(&c));
                    return;
                }
                _ => {}
            }
        }

        while self.pos < self.end && (self.peek().is_ascii_digit() || self.peek() == '_') {
            self.advance();
        }

        let is_decimal = self.peek() == '.'
            && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false);
        if is_decimal {
            self.advance(); // .
            while self.pos < self.end && (self.peek().is_ascii_digit() || self.peek() == '_') {
                self.advance();
            }
            let digits: String = self.text[start..self.pos].chars().filter(|c| *c != '_').collect();
            match digits.parse::<f64>() {
                Ok(v) => self.emit(TokenKind::Dec(v.into()), start, self.pos),
                Err(_) => self.error("invalid decimal literal", start, self.pos),
            }
        } else {
            let digits: String = self.text[start..self.pos].chars().filter(|c| *c != '_').collect();
            match digits.parse::<i64>() {
                Ok(v) => self.emit(TokenKind::Int(v), start, self.pos),
                Err(_) => self.error("integer literal out of range", start, self.pos),
            }
        }
    }

    fn lex_radix_digits(&mut self, start: usize, radix: u32, valid: fn(char) -> bool) {
        let digit_start = self.pos;
        while self.pos < self.end && (valid(self.peek()) || self.peek() == '_') {
            self.advance();
        }
        let digits: String = self.text[digit_start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if digits.is_empty() {
            self.error("numeric literal missing digits after prefix", start, self.pos);
            return;
        }
        match i64::from_str_radix(&digits, radix) {
            Ok(v) => self.emit(TokenKind::Int(v), start, self.pos),
            Err(_) => self.error("integer literal out of range", start, self.pos),
        }
    }

    // ── Identifiers and keywords ─────────────────────────────────

    fn lex_identifier(&mut self) {
        let start = self.pos;
        while self.pos < self.end {
            let ch = self.peek();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let word = &self.text[start..self.pos];

        if let Some(kind) = TokenKind::keyword(word) {
            self.emit(kind, start, self.pos);
            return;
        }

        let kind = classify_identifier(word);
        self.emit(kind, start, self.pos);
    }

    // ── Operators and punctuation ────────────────────────────────

    fn lex_operator_or_punct(&mut self) {
        let start = self.pos;
        let ch = self.peek();

        let two: Option<TokenKind> = if self.pos + 2 <= self.end {
            match self.text.get(self.pos..self.pos + 2).unwrap_or("") {
                "|>" => Some(TokenKind::PipeArrow),
                "=>" => Some(TokenKind::FatArrow),
                "->" => Some(TokenKind::Arrow),
                "==" => Some(TokenKind::EqEq),
                "!=" => Some(TokenKind::NotEq),
                "<=" => Some(TokenKind::Le),
                ">=" => Some(TokenKind::Ge),
                "&&" => Some(TokenKind::AndAnd),
                "||" => Some(TokenKind::OrOr),
                ".." => Some(TokenKind::DotDot),
                _ => None,
            }
        } else {
            None
        };
        if let Some(kind) = two {
            self.pos += 2;
            self.emit(kind, start, self.pos);
            return;
        }

        self.advance();
        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '=' => TokenKind::Assign,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '|' => TokenKind::Pipe,
            '!' => {
                // Glued to a completed value it is the fail-propagation
                // postfix; anywhere else it is logical not.
                let glued = self.prev_end == start
                    && self.prev_kind.as_ref().map(|k| k.is_value_end()).unwrap_or(false);
                if glued {
                    TokenKind::BangPostfix
                } else {
                    TokenKind::Bang
                }
            }
            '(' => {
                self.bracket_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.bracket_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBracket
            }
            other => {
                self.error_with_help(
                    format!("unexpected character: {:?}", other),
                    start,
                    self.pos,
                    "Prove source files are UTF-8 but this character is not part of the grammar",
                );
                return;
            }
        };
        self.emit(kind, start, self.pos);
    }
}

/// Classify a non-keyword word by its casing.
fn classify_identifier(word: &str) -> TokenKind {
    if word == "_" {
        return TokenKind::Ident(word.to_string());
    }
    let all_upper = word
        .chars()
        .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit());
    if word.len() >= 2 && all_upper && word.starts_with(|c: char| c.is_ascii_uppercase()) {
        return TokenKind::ConstIdent(word.to_string());
    }
    let mut chars = word.chars();
    let first_upper = chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
    if first_upper && (word.len() == 1 || word.chars().any(|c| c.is_ascii_lowercase())) {
        return TokenKind::TypeIdent(word.to_string());
    }
    TokenKind::Ident(word.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FileId;

    fn lex_ok(text: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(FileId(0), text).lex();
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_indent_dedent_balance() {
        let kinds = lex_ok("main()!\nfrom\n    println(\"hi\")\n");
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, dedents);
        assert_eq!(kinds.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_fail_marker_adjacency() {
        let kinds = lex_ok("load(path)!\n");
        assert!(kinds.contains(&TokenKind::BangPostfix));
        let kinds = lex_ok("a = ! b\n");
        assert!(kinds.contains(&TokenKind::Bang));
        assert!(!kinds.contains(&TokenKind::BangPostfix));
    }

    #[test]
    fn test_identifier_classification() {
        let kinds = lex_ok("port Port PORT_MAX\n");
        assert_eq!(kinds[0], TokenKind::Ident("port".into()));
        assert_eq!(kinds[1], TokenKind::TypeIdent("Port".into()));
        assert_eq!(kinds[2], TokenKind::ConstIdent("PORT_MAX".into()));
    }

    #[test]
    fn test_regex_vs_division() {
        let kinds = lex_ok("a = x / y\n");
        assert!(kinds.contains(&TokenKind::Slash));
        let kinds = lex_ok("a = /ab+c/\n");
        assert!(kinds.contains(&TokenKind::Regex("ab+c".into())));
    }

    #[test]
    fn test_format_string_sub_lexing() {
        let kinds = lex_ok("f\"hello {name}!\"\n");
        let pieces = match &kinds[0] {
            TokenKind::Str(p) => p,
            other => panic!("expected string token, got {:?}", other),
        };
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], StringPiece::Text("hello ".into()));
        match &pieces[1] {
            StringPiece::Interp(tokens) => {
                assert_eq!(tokens.len(), 1);
                assert_eq!(tokens[0].kind, TokenKind::Ident("name".into()));
            }
            other => panic!("expected interpolation, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_string_brace_is_literal() {
        let kinds = lex_ok("\"a {b} c\"\n");
        match &kinds[0] {
            TokenKind::Str(pieces) => {
                assert_eq!(pieces, &vec![StringPiece::Text("a {b} c".into())]);
            }
            other => panic!("expected string token, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_underscores_and_radix() {
        let kinds = lex_ok("1_000 0xFF 0b1010 0o17 3.14\n");
        assert_eq!(kinds[0], TokenKind::Int(1000));
        assert_eq!(kinds[1], TokenKind::Int(255));
        assert_eq!(kinds[2], TokenKind::Int(10));
        assert_eq!(kinds[3], TokenKind::Int(15));
        assert_eq!(kinds[4], TokenKind::Dec(3.14.into()));
    }

    #[test]
    fn test_newline_suppression_after_operator() {
        let kinds = lex_ok("a = 1 +\n    2\n");
        // The continuation line produces no INDENT.
        assert!(!kinds.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_inconsistent_dedent_is_error() {
        let (_, errors) = Lexer::new(FileId(0), "main()!\nfrom\n        a as Integer = 1\n   b\n").lex();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_doc_comment() {
        let kinds = lex_ok("/// adds two numbers\ntransforms add(a Integer, b Integer) Integer\n");
        assert_eq!(kinds[0], TokenKind::DocComment("adds two numbers".into()));
    }

    #[test]
    fn test_spans_contained_in_source() {
        let text = "transforms add(a Integer) Integer\nfrom\n    a + 1\n";
        let (tokens, _) = Lexer::new(FileId(0), text).lex();
        for tok in &tokens {
            assert!(tok.span.end as usize <= text.len());
            assert!(tok.span.start <= tok.span.end);
        }
    }
}
