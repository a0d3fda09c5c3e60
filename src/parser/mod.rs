//! Parser for the Prove language.
//!
//! Recursive descent for declarations, Pratt-style binding powers for
//! expressions. The parser records diagnostics and recovers to the
//! next top-level declaration so a single syntax error does not hide
//! the rest of the file.

mod error;

pub use error::ParseError;

use crate::ast::{
    Annotation, AnnotationKind, BinaryOp, ConstantDef, Decl, ExplainRow, Expr, ExprKind,
    FieldDef, ForeignBlock, ForeignFn, FunctionDef, ImportDecl, ImportGroup, InvariantNetwork,
    LiteralValue, MainDef, MatchArm, Module, NearMiss, Param, Pattern, ProofObligation, Stmt,
    StmtKind, TypeBody, TypeDef, TypeExpr, TypeModifier, UnaryOp, Variant, Verb,
};
use crate::lexer::{Span, StringPiece, Token, TokenKind};

/// Binding powers for the Pratt expression parser, low to high:
/// `|>`, `||`, `&&`, comparisons, `..`, additive, multiplicative.
fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8)> {
    Some(match kind {
        TokenKind::PipeArrow => (1, 2),
        TokenKind::OrOr => (3, 4),
        TokenKind::AndAnd => (5, 6),
        TokenKind::EqEq
        | TokenKind::NotEq
        | TokenKind::Lt
        | TokenKind::Gt
        | TokenKind::Le
        | TokenKind::Ge => (7, 8),
        TokenKind::DotDot => (9, 10),
        TokenKind::Plus | TokenKind::Minus => (11, 12),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (13, 14),
        _ => return None,
    })
}

const PREFIX_BP: u8 = 15;
const POSTFIX_BP: u8 = 17;

/// Unit marker used to unwind to the nearest recovery point.
struct Recover;

type ParseResult<T> = Result<T, Recover>;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream. Always returns a module; syntax
    /// errors are reported through the error list.
    pub fn parse(mut self) -> (Module, Vec<ParseError>) {
        let start_span = self.current().span;
        let mut module = Module {
            name: None,
            narrative: None,
            temporal: None,
            declarations: Vec::new(),
            span: start_span,
        };

        self.skip_newlines();
        while !self.at(&TokenKind::Eof) {
            match self.parse_top_level(&mut module) {
                Ok(()) => {}
                Err(Recover) => self.synchronize(),
            }
            self.skip_newlines();
        }

        module.span = start_span.to(self.current().span);
        (module, self.errors)
    }

    // ── Token access ─────────────────────────────────────────────

    fn current(&self) -> &Token {
        if self.pos < self.tokens.len() {
            &self.tokens[self.pos]
        } else {
            self.tokens.last().expect("token stream always ends in Eof")
        }
    }

    fn peek(&self, offset: usize) -> &Token {
        let idx = self.pos + offset;
        if idx < self.tokens.len() {
            &self.tokens[idx]
        } else {
            self.tokens.last().expect("token stream always ends in Eof")
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<Token> {
        if self.at(kind) {
            return Ok(self.advance());
        }
        let tok = self.current().clone();
        self.error(
            format!("expected {}, got '{}'", what, describe(&tok.kind)),
            tok.span,
        );
        Err(Recover)
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let span = self.current().span;
                self.advance();
                Ok((name, span))
            }
            _ => {
                let tok = self.current().clone();
                self.error(
                    format!("expected {}, got '{}'", what, describe(&tok.kind)),
                    tok.span,
                );
                Err(Recover)
            }
        }
    }

    fn expect_type_ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match &self.current().kind {
            TokenKind::TypeIdent(name) => {
                let name = name.clone();
                let span = self.current().span;
                self.advance();
                Ok((name, span))
            }
            _ => {
                let tok = self.current().clone();
                self.error(
                    format!("expected {}, got '{}'", what, describe(&tok.kind)),
                    tok.span,
                );
                Err(Recover)
            }
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(ParseError::new(message, span));
    }

    /// Skip tokens until a top-level recovery point.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        while !self.at(&TokenKind::Eof) {
            match self.current().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Newline if depth == 0 => {
                    self.advance();
                    if !self.at(&TokenKind::Indent) {
                        return;
                    }
                    continue;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ── Top-level parsing ────────────────────────────────────────

    fn parse_top_level(&mut self, module: &mut Module) -> ParseResult<()> {
        self.skip_newlines();

        if self.at(&TokenKind::Module) {
            self.parse_module_header(module)?;
            return Ok(());
        }

        if let Some(decl) = self.parse_declaration()? {
            module.declarations.push(decl);
        }
        Ok(())
    }

    fn parse_declaration(&mut self) -> ParseResult<Option<Decl>> {
        self.skip_newlines();

        // Doc comments attach to the following declaration.
        let mut doc_lines: Vec<String> = Vec::new();
        while let TokenKind::DocComment(text) = &self.current().kind {
            doc_lines.push(text.clone());
            self.advance();
            self.skip_newlines();
        }
        let doc = if doc_lines.is_empty() {
            None
        } else {
            Some(doc_lines.join("\n"))
        };

        let tok = self.current().clone();
        match &tok.kind {
            TokenKind::Transforms
            | TokenKind::Validates
            | TokenKind::Reads
            | TokenKind::Creates
            | TokenKind::Matches
            | TokenKind::Inputs
            | TokenKind::Outputs => Ok(Some(Decl::Function(self.parse_function_def(doc)?))),
            TokenKind::Main => Ok(Some(Decl::Main(self.parse_main_def(doc)?))),
            TokenKind::Type => Ok(Some(Decl::Type(self.parse_type_def(doc)?))),
            TokenKind::With => Ok(Some(Decl::Import(self.parse_import_decl()?))),
            TokenKind::Foreign => Ok(Some(Decl::Foreign(self.parse_foreign_block()?))),
            TokenKind::InvariantNetwork => {
                Ok(Some(Decl::InvariantNetwork(self.parse_invariant_network()?)))
            }
            TokenKind::ConstIdent(_) => Ok(Some(Decl::Constant(self.parse_constant_def()?))),
            TokenKind::Eof => Ok(None),
            _ => {
                self.error(
                    format!(
                        "unexpected token at module level: '{}'",
                        describe(&tok.kind)
                    ),
                    tok.span,
                );
                Err(Recover)
            }
        }
    }

    fn parse_module_header(&mut self, module: &mut Module) -> ParseResult<()> {
        self.advance(); // 'module'
        let (name, _) = self.expect_type_ident("module name")?;
        module.name = Some(name);
        self.skip_newlines();

        if !self.eat(&TokenKind::Indent) {
            return Ok(());
        }
        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            self.skip_newlines();
            if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                break;
            }
            if self.at(&TokenKind::Narrative) {
                self.advance();
                self.expect(&TokenKind::Colon, "':'")?;
                module.narrative = Some(self.parse_string_text()?);
            } else if self.at(&TokenKind::Temporal) {
                self.advance();
                self.expect(&TokenKind::Colon, "':'")?;
                let mut steps = vec![self.expect_ident("step name")?.0];
                while self.eat(&TokenKind::Arrow) {
                    steps.push(self.expect_ident("step name")?.0);
                }
                module.temporal = Some(steps);
            } else if let Some(decl) = self.parse_declaration()? {
                module.declarations.push(decl);
            }
            self.skip_newlines();
        }
        self.eat(&TokenKind::Dedent);
        Ok(())
    }

    /// A plain or triple string whose literal text is the payload.
    fn parse_string_text(&mut self) -> ParseResult<String> {
        let tok = self.current().clone();
        match &tok.kind {
            TokenKind::Str(pieces) => {
                self.advance();
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        StringPiece::Text(t) => out.push_str(t),
                        StringPiece::Interp(_) => {
                            self.error("interpolation is not allowed here", tok.span);
                        }
                    }
                }
                Ok(out)
            }
            TokenKind::TripleStr(text) => {
                let text = text.clone();
                self.advance();
                Ok(text)
            }
            _ => {
                self.error(
                    format!("expected string literal, got '{}'", describe(&tok.kind)),
                    tok.span,
                );
                Err(Recover)
            }
        }
    }

    // ── Function definitions ─────────────────────────────────────

    fn parse_verb(&mut self) -> Verb {
        let verb = match self.current().kind {
            TokenKind::Transforms => Verb::Transforms,
            TokenKind::Validates => Verb::Validates,
            TokenKind::Reads => Verb::Reads,
            TokenKind::Creates => Verb::Creates,
            TokenKind::Matches => Verb::Matches,
            TokenKind::Inputs => Verb::Inputs,
            TokenKind::Outputs => Verb::Outputs,
            _ => unreachable!("caller checked for a verb token"),
        };
        self.advance();
        verb
    }

    fn parse_function_def(&mut self, doc: Option<String>) -> ParseResult<FunctionDef> {
        let start = self.current().span;
        let verb = self.parse_verb();

        // Function names are snake_case; a CamelCase name is a casing
        // error with a rewrite hint, not a parse failure.
        let name = match &self.current().kind {
            TokenKind::Ident(n) => {
                let n = n.clone();
                self.advance();
                n
            }
            TokenKind::TypeIdent(n) => {
                let n = n.clone();
                let span = self.current().span;
                let snake = to_snake_case(&n);
                self.errors.push(
                    ParseError::with_code(
                        "E303",
                        format!("function names are snake_case: '{}'", n),
                        span,
                    )
                    .suggest(snake.clone()),
                );
                self.advance();
                snake
            }
            _ => {
                let tok = self.current().clone();
                self.error(
                    format!("expected function name, got '{}'", describe(&tok.kind)),
                    tok.span,
                );
                return Err(Recover);
            }
        };

        let params = self.parse_param_list()?;
        let return_type = self.try_parse_return_type()?;
        let mut can_fail = false;
        if self.at(&TokenKind::Bang) || self.at(&TokenKind::BangPostfix) {
            can_fail = true;
            let bang_span = self.current().span;
            self.advance();
            if verb.is_pure() {
                self.errors.push(ParseError::with_code(
                    "E361",
                    format!("'{}' functions cannot carry the fail marker", verb),
                    bang_span,
                ));
            }
        }
        if verb == Verb::Validates {
            if let Some(rt) = &return_type {
                self.errors.push(ParseError::with_code(
                    "E360",
                    "validates functions have an implicit Boolean return",
                    crate::ast::Spanned::span(rt),
                ));
            }
        }

        self.skip_newlines();
        let mut in_indent = false;
        if self.at(&TokenKind::Indent) {
            in_indent = true;
            self.advance();
        }

        let annotations = self.parse_annotations()?;

        // `from` may sit back at the declaration's own indentation.
        if in_indent && self.at(&TokenKind::Dedent) {
            self.advance();
            in_indent = false;
        }
        self.expect(&TokenKind::From, "'from'")?;
        self.skip_newlines();
        let body = self.parse_body()?;

        if in_indent {
            self.eat(&TokenKind::Dedent);
        }

        let span = start.to(self.prev_span());
        Ok(FunctionDef {
            verb,
            name,
            params,
            return_type,
            can_fail,
            annotations,
            body,
            doc,
            span,
        })
    }

    fn parse_main_def(&mut self, doc: Option<String>) -> ParseResult<MainDef> {
        let start = self.current().span;
        self.advance(); // 'main'
        self.expect(&TokenKind::LParen, "'('")?;
        self.expect(&TokenKind::RParen, "')'")?;

        let return_type = self.try_parse_return_type()?;
        let mut can_fail = false;
        if self.at(&TokenKind::Bang) || self.at(&TokenKind::BangPostfix) {
            can_fail = true;
            self.advance();
        }

        self.skip_newlines();
        let mut in_indent = false;
        if self.at(&TokenKind::Indent) {
            in_indent = true;
            self.advance();
        }
        self.skip_newlines();
        if in_indent && self.at(&TokenKind::Dedent) {
            self.advance();
            in_indent = false;
        }
        self.expect(&TokenKind::From, "'from'")?;
        self.skip_newlines();
        let body = self.parse_body()?;

        if in_indent {
            self.eat(&TokenKind::Dedent);
        }

        let span = start.to(self.prev_span());
        Ok(MainDef {
            return_type,
            can_fail,
            body,
            doc,
            span,
        })
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current().span
        }
    }

    fn parse_param_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params: Vec<Param> = Vec::new();
        while !self.at(&TokenKind::RParen) && !self.at(&TokenKind::Eof) {
            if !params.is_empty() {
                self.expect(&TokenKind::Comma, "','")?;
            }
            params.push(self.parse_param()?);
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        let start = self.current().span;
        let (name, _) = self.expect_ident("parameter name")?;
        let type_expr = self.parse_type_expr()?;
        let mut constraint = None;
        if self.eat(&TokenKind::Where) {
            constraint = Some(self.parse_refinement_constraint()?);
        }
        let span = start.to(self.prev_span());
        Ok(Param {
            name,
            type_expr,
            constraint,
            span,
        })
    }

    fn try_parse_return_type(&mut self) -> ParseResult<Option<TypeExpr>> {
        if self.at(&TokenKind::TypeIdent(String::new())) {
            return Ok(Some(self.parse_type_expr()?));
        }
        Ok(None)
    }

    // ── Annotations ──────────────────────────────────────────────

    fn parse_annotations(&mut self) -> ParseResult<Vec<Annotation>> {
        let mut annotations: Vec<Annotation> = Vec::new();
        loop {
            self.skip_newlines();
            let start = self.current().span;
            let kind = match self.current().kind {
                TokenKind::Ensures => {
                    self.advance();
                    AnnotationKind::Ensures(self.parse_expression(0)?)
                }
                TokenKind::Requires => {
                    self.advance();
                    AnnotationKind::Requires(self.parse_expression(0)?)
                }
                TokenKind::Terminates => {
                    self.advance();
                    self.eat(&TokenKind::Colon);
                    AnnotationKind::Terminates(self.parse_expression(0)?)
                }
                TokenKind::Trusted => {
                    self.advance();
                    let reason = if self.at(&TokenKind::Str(Vec::new())) {
                        Some(self.parse_string_text()?)
                    } else {
                        None
                    };
                    AnnotationKind::Trusted(reason)
                }
                TokenKind::Know => {
                    self.advance();
                    self.eat(&TokenKind::Colon);
                    AnnotationKind::Know(self.parse_expression(0)?)
                }
                TokenKind::Assume => {
                    self.advance();
                    self.eat(&TokenKind::Colon);
                    AnnotationKind::Assume(self.parse_expression(0)?)
                }
                TokenKind::Believe => {
                    self.advance();
                    self.eat(&TokenKind::Colon);
                    AnnotationKind::Believe(self.parse_expression(0)?)
                }
                TokenKind::WhyNot => {
                    self.advance();
                    self.expect(&TokenKind::Colon, "':'")?;
                    AnnotationKind::WhyNot(self.parse_string_text()?)
                }
                TokenKind::Chosen => {
                    self.advance();
                    self.expect(&TokenKind::Colon, "':'")?;
                    AnnotationKind::Chosen(self.parse_string_text()?)
                }
                TokenKind::Intent => {
                    self.advance();
                    self.expect(&TokenKind::Colon, "':'")?;
                    AnnotationKind::Intent(self.parse_string_text()?)
                }
                TokenKind::NearMiss => {
                    self.advance();
                    self.eat(&TokenKind::Colon);
                    let input = self.parse_expression(0)?;
                    self.expect(&TokenKind::FatArrow, "'=>'")?;
                    let expected = self.parse_expression(0)?;
                    let span = input.span.to(expected.span);
                    AnnotationKind::NearMiss(NearMiss {
                        input,
                        expected,
                        span,
                    })
                }
                TokenKind::Satisfies => {
                    self.advance();
                    self.eat(&TokenKind::Colon);
                    AnnotationKind::Satisfies(self.expect_type_ident("invariant network name")?.0)
                }
                TokenKind::Explain => {
                    self.advance();
                    AnnotationKind::Explain(self.parse_explain_rows()?)
                }
                TokenKind::Proof => {
                    self.advance();
                    AnnotationKind::Proof(self.parse_proof_obligations()?)
                }
                _ => break,
            };
            let span = start.to(self.prev_span());
            annotations.push(Annotation { kind, span });
            self.skip_newlines();
        }
        Ok(annotations)
    }

    /// Explain rows: the rest of each physical line is one row; an
    /// indented block under a row continues it. Text is preserved for
    /// the CNL verifier.
    fn parse_explain_rows(&mut self) -> ParseResult<Vec<ExplainRow>> {
        let mut rows: Vec<ExplainRow> = Vec::new();
        self.skip_newlines();
        if !self.eat(&TokenKind::Indent) {
            // Single inline row.
            let (text, span) = self.collect_row_text();
            if !text.is_empty() {
                rows.push(ExplainRow { text, span });
            }
            return Ok(rows);
        }

        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            self.skip_newlines();
            if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                break;
            }
            let (mut text, mut span) = self.collect_row_text();
            self.skip_newlines();
            // Indented continuation lines extend the row.
            if self.eat(&TokenKind::Indent) {
                while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                    self.skip_newlines();
                    if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                        break;
                    }
                    let (cont, cont_span) = self.collect_row_text();
                    if !cont.is_empty() {
                        text.push(' ');
                        text.push_str(&cont);
                        span = span.to(cont_span);
                    }
                    self.skip_newlines();
                }
                self.eat(&TokenKind::Dedent);
            }
            if !text.is_empty() {
                rows.push(ExplainRow { text, span });
            }
        }
        self.eat(&TokenKind::Dedent);
        Ok(rows)
    }

    /// Collect the remainder of the current logical line as text.
    fn collect_row_text(&mut self) -> (String, Span) {
        let start = self.current().span;
        let mut words: Vec<String> = Vec::new();
        let mut end = start;
        while !matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
        ) {
            let tok = self.advance();
            end = tok.span;
            words.push(tok.lexeme());
        }
        (words.join(" "), start.to(end))
    }

    fn parse_proof_obligations(&mut self) -> ParseResult<Vec<ProofObligation>> {
        let mut obligations: Vec<ProofObligation> = Vec::new();
        self.skip_newlines();
        if !self.eat(&TokenKind::Indent) {
            obligations.push(self.parse_proof_obligation()?);
            return Ok(obligations);
        }
        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            self.skip_newlines();
            if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                break;
            }
            obligations.push(self.parse_proof_obligation()?);
            self.skip_newlines();
        }
        self.eat(&TokenKind::Dedent);
        Ok(obligations)
    }

    fn parse_proof_obligation(&mut self) -> ParseResult<ProofObligation> {
        let start = self.current().span;
        let (name, _) = self.expect_ident("obligation name")?;
        self.expect(&TokenKind::Colon, "':'")?;
        let (text, text_span) = self.collect_row_text();
        Ok(ProofObligation {
            name,
            text,
            span: start.to(text_span),
        })
    }

    // ── Type definitions ─────────────────────────────────────────

    fn parse_type_def(&mut self, doc: Option<String>) -> ParseResult<TypeDef> {
        let start = self.current().span;
        self.advance(); // 'type'

        let name = match &self.current().kind {
            TokenKind::TypeIdent(n) => {
                let n = n.clone();
                self.advance();
                n
            }
            TokenKind::Ident(n) => {
                let n = n.clone();
                let span = self.current().span;
                let camel = to_camel_case(&n);
                self.errors.push(
                    ParseError::with_code(
                        "E303",
                        format!("type names are CamelCase: '{}'", n),
                        span,
                    )
                    .suggest(camel.clone()),
                );
                self.advance();
                camel
            }
            _ => {
                let tok = self.current().clone();
                self.error(
                    format!("expected type name, got '{}'", describe(&tok.kind)),
                    tok.span,
                );
                return Err(Recover);
            }
        };

        let mut type_params: Vec<String> = Vec::new();
        if self.eat(&TokenKind::Lt) {
            while !self.at(&TokenKind::Gt) && !self.at(&TokenKind::Eof) {
                if !type_params.is_empty() {
                    self.expect(&TokenKind::Comma, "','")?;
                }
                type_params.push(self.expect_type_ident("type parameter")?.0);
            }
            self.expect(&TokenKind::Gt, "'>'")?;
        }

        self.expect(&TokenKind::Is, "'is'")?;
        self.skip_newlines();
        let body = self.parse_type_body()?;

        let span = start.to(self.prev_span());
        Ok(TypeDef {
            name,
            type_params,
            body,
            doc,
            span,
        })
    }

    fn parse_type_body(&mut self) -> ParseResult<TypeBody> {
        if self.at(&TokenKind::Indent) {
            return self.parse_indented_type_body();
        }
        self.parse_inline_type_body()
    }

    fn parse_indented_type_body(&mut self) -> ParseResult<TypeBody> {
        self.advance(); // INDENT
        self.skip_newlines();
        let start = self.current().span;

        // A lowercase field name means a record; CamelCase means
        // algebraic variants.
        if matches!(self.current().kind, TokenKind::Ident(_)) {
            let mut fields: Vec<FieldDef> = Vec::new();
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                fields.push(self.parse_field_def()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
            let span = start.to(self.prev_span());
            return Ok(TypeBody::Record { fields, span });
        }

        if matches!(self.current().kind, TokenKind::TypeIdent(_)) {
            let mut variants: Vec<Variant> = Vec::new();
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                self.eat(&TokenKind::Pipe);
                variants.push(self.parse_variant()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
            let span = start.to(self.prev_span());
            return Ok(TypeBody::Algebraic { variants, span });
        }

        let tok = self.current().clone();
        self.error(
            format!(
                "expected field or variant name in type body, got '{}'",
                describe(&tok.kind)
            ),
            tok.span,
        );
        Err(Recover)
    }

    fn parse_inline_type_body(&mut self) -> ParseResult<TypeBody> {
        if !matches!(self.current().kind, TokenKind::TypeIdent(_)) {
            let tok = self.current().clone();
            self.error(
                format!("expected type body, got '{}'", describe(&tok.kind)),
                tok.span,
            );
            return Err(Recover);
        }

        let start = self.current().span;

        if self.looks_like_refinement() {
            let base = self.parse_type_expr()?;
            self.expect(&TokenKind::Where, "'where'")?;
            let constraint = self.parse_refinement_constraint()?;
            let span = start.to(self.prev_span());
            return Ok(TypeBody::Refinement {
                base,
                constraint,
                span,
            });
        }

        // Algebraic: one or more `|`-separated variants, with an
        // optional indented continuation block.
        let mut variants = vec![self.parse_variant()?];
        while self.at(&TokenKind::Pipe) {
            self.advance();
            self.skip_newlines();
            variants.push(self.parse_variant()?);
        }
        self.skip_newlines();
        if self.eat(&TokenKind::Indent) {
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                self.eat(&TokenKind::Pipe);
                variants.push(self.parse_variant()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
        }

        let span = start.to(self.prev_span());
        Ok(TypeBody::Algebraic { variants, span })
    }

    /// Lookahead to decide refinement (`Base where ...`) vs algebraic.
    fn looks_like_refinement(&self) -> bool {
        let mut idx = self.pos + 1;
        while idx < self.tokens.len() {
            match self.tokens[idx].kind {
                TokenKind::Where => return true,
                TokenKind::Colon
                    if idx + 1 < self.tokens.len()
                        && self.tokens[idx + 1].kind == TokenKind::LBracket =>
                {
                    idx += 2;
                    let mut depth = 1;
                    while idx < self.tokens.len() && depth > 0 {
                        match self.tokens[idx].kind {
                            TokenKind::LBracket => depth += 1,
                            TokenKind::RBracket => depth -= 1,
                            _ => {}
                        }
                        idx += 1;
                    }
                }
                TokenKind::Lt => {
                    idx += 1;
                    let mut depth = 1;
                    while idx < self.tokens.len() && depth > 0 {
                        match self.tokens[idx].kind {
                            TokenKind::Lt => depth += 1,
                            TokenKind::Gt => depth -= 1,
                            _ => {}
                        }
                        idx += 1;
                    }
                }
                TokenKind::LParen
                | TokenKind::Pipe
                | TokenKind::Newline
                | TokenKind::Indent
                | TokenKind::Dedent
                | TokenKind::Eof => return false,
                _ => idx += 1,
            }
        }
        false
    }

    /// Refinement constraints allow the comparison shorthand
    /// `>= 0` meaning `self >= 0`, plus ranges and full expressions.
    fn parse_refinement_constraint(&mut self) -> ParseResult<Expr> {
        let tok = self.current().clone();
        if let Some(op) = BinaryOp::from_token(&tok.kind) {
            if op.is_comparison() {
                self.advance();
                let right = self.parse_expression(0)?;
                let span = tok.span.to(right.span);
                return Ok(Expr::new(
                    ExprKind::Binary {
                        left: Box::new(Expr::new(
                            ExprKind::Identifier("self".to_string()),
                            tok.span,
                        )),
                        op,
                        right: Box::new(right),
                    },
                    span,
                ));
            }
        }
        self.parse_expression(0)
    }

    fn parse_variant(&mut self) -> ParseResult<Variant> {
        let start = self.current().span;
        let (name, _) = self.expect_type_ident("variant name")?;

        let mut fields: Vec<FieldDef> = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while !self.at(&TokenKind::RParen) && !self.at(&TokenKind::Eof) {
                if !fields.is_empty() {
                    self.expect(&TokenKind::Comma, "','")?;
                }
                fields.push(self.parse_field_def()?);
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }

        let span = start.to(self.prev_span());
        Ok(Variant { name, fields, span })
    }

    fn parse_field_def(&mut self) -> ParseResult<FieldDef> {
        let start = self.current().span;
        let (name, _) = self.expect_ident("field name")?;
        let type_expr = self.parse_type_expr()?;
        let mut constraint = None;
        if self.eat(&TokenKind::Where) {
            constraint = Some(self.parse_refinement_constraint()?);
        }
        let span = start.to(self.prev_span());
        Ok(FieldDef {
            name,
            type_expr,
            constraint,
            span,
        })
    }

    // ── Type expressions ─────────────────────────────────────────

    fn parse_type_expr(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current().span;
        let (name, name_span) = self.expect_type_ident("type name")?;

        // Modified type: Type:[mods]
        if self.at(&TokenKind::Colon) && self.peek(1).kind == TokenKind::LBracket {
            self.advance(); // :
            self.advance(); // [
            let mut modifiers: Vec<TypeModifier> = Vec::new();
            while !self.at(&TokenKind::RBracket) && !self.at(&TokenKind::Eof) {
                modifiers.push(self.parse_type_modifier()?);
            }
            self.expect(&TokenKind::RBracket, "']'")?;
            let span = start.to(self.prev_span());
            return Ok(TypeExpr::Modified {
                name,
                modifiers,
                span,
            });
        }

        // Generic type: Type<A, B>
        if self.eat(&TokenKind::Lt) {
            let mut args: Vec<TypeExpr> = Vec::new();
            while !self.at(&TokenKind::Gt) && !self.at(&TokenKind::Eof) {
                if !args.is_empty() {
                    self.expect(&TokenKind::Comma, "','")?;
                }
                args.push(self.parse_type_expr()?);
            }
            self.expect(&TokenKind::Gt, "'>'")?;
            let span = start.to(self.prev_span());
            return Ok(TypeExpr::Generic { name, args, span });
        }

        Ok(TypeExpr::Simple {
            name,
            span: name_span,
        })
    }

    fn parse_type_modifier(&mut self) -> ParseResult<TypeModifier> {
        let start = self.current().span;

        // Named modifier: Axis:value
        if matches!(self.current().kind, TokenKind::TypeIdent(_))
            && self.peek(1).kind == TokenKind::Colon
        {
            let (name, _) = self.expect_type_ident("modifier axis")?;
            self.advance(); // :
            let value_tok = self.advance();
            return Ok(TypeModifier {
                name: Some(name),
                value: value_tok.lexeme(),
                span: start.to(value_tok.span),
            });
        }

        let value_tok = self.advance();
        Ok(TypeModifier {
            name: None,
            value: value_tok.lexeme(),
            span: value_tok.span,
        })
    }

    // ── Imports ──────────────────────────────────────────────────

    fn parse_import_decl(&mut self) -> ParseResult<ImportDecl> {
        let start = self.current().span;
        self.advance(); // 'with'
        let (module, _) = self.expect_type_ident("module name")?;
        self.expect(&TokenKind::Use, "'use'")?;

        let mut groups: Vec<ImportGroup> = Vec::new();
        loop {
            groups.push(self.parse_import_group()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let span = start.to(self.prev_span());
        Ok(ImportDecl {
            module,
            groups,
            span,
        })
    }

    /// One comma-separated group: an optional verb (or the literal
    /// `types`) qualifying the space-separated names that follow.
    fn parse_import_group(&mut self) -> ParseResult<ImportGroup> {
        let verb = match self.current().kind {
            TokenKind::Transforms
            | TokenKind::Validates
            | TokenKind::Reads
            | TokenKind::Creates
            | TokenKind::Matches
            | TokenKind::Inputs
            | TokenKind::Outputs => Some(self.parse_verb()),
            _ => None,
        };

        if verb.is_none() {
            if let TokenKind::Ident(word) = &self.current().kind {
                if word == "types" && matches!(self.peek(1).kind, TokenKind::TypeIdent(_)) {
                    self.advance();
                    let mut names = Vec::new();
                    while matches!(self.current().kind, TokenKind::TypeIdent(_)) {
                        names.push(self.expect_type_ident("type name")?.0);
                    }
                    return Ok(ImportGroup::Types(names));
                }
            }
        }

        let mut names = Vec::new();
        while matches!(self.current().kind, TokenKind::Ident(_)) {
            names.push(self.expect_ident("imported name")?.0);
        }
        if names.is_empty() {
            let tok = self.current().clone();
            self.error(
                format!("expected imported name, got '{}'", describe(&tok.kind)),
                tok.span,
            );
            return Err(Recover);
        }

        Ok(match verb {
            Some(v) => ImportGroup::Verb(v, names),
            None => ImportGroup::Plain(names),
        })
    }

    // ── Foreign blocks ───────────────────────────────────────────

    fn parse_foreign_block(&mut self) -> ParseResult<ForeignBlock> {
        let start = self.current().span;
        self.advance(); // 'foreign'
        let library = match &self.current().kind {
            TokenKind::Ident(n) | TokenKind::TypeIdent(n) => {
                let n = n.clone();
                self.advance();
                n
            }
            TokenKind::Str(_) => self.parse_string_text()?,
            _ => {
                let tok = self.current().clone();
                self.error(
                    format!("expected library name, got '{}'", describe(&tok.kind)),
                    tok.span,
                );
                return Err(Recover);
            }
        };
        self.skip_newlines();

        let mut functions: Vec<ForeignFn> = Vec::new();
        if self.eat(&TokenKind::Indent) {
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                functions.push(self.parse_foreign_fn()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
        }

        let span = start.to(self.prev_span());
        Ok(ForeignBlock {
            library,
            functions,
            span,
        })
    }

    fn parse_foreign_fn(&mut self) -> ParseResult<ForeignFn> {
        let start = self.current().span;
        let (name, _) = self.expect_ident("foreign function name")?;
        let params = self.parse_param_list()?;
        let return_type = self.try_parse_return_type()?;
        let span = start.to(self.prev_span());
        Ok(ForeignFn {
            name,
            params,
            return_type,
            span,
        })
    }

    // ── Invariant networks ───────────────────────────────────────

    fn parse_invariant_network(&mut self) -> ParseResult<InvariantNetwork> {
        let start = self.current().span;
        self.advance(); // 'invariant_network'
        let (name, _) = self.expect_type_ident("invariant network name")?;
        self.skip_newlines();

        let mut constraints: Vec<Expr> = Vec::new();
        if self.eat(&TokenKind::Indent) {
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                constraints.push(self.parse_expression(0)?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
        }

        let span = start.to(self.prev_span());
        Ok(InvariantNetwork {
            name,
            constraints,
            span,
        })
    }

    // ── Constants ────────────────────────────────────────────────

    fn parse_constant_def(&mut self) -> ParseResult<ConstantDef> {
        let start = self.current().span;
        let name = match &self.current().kind {
            TokenKind::ConstIdent(n) => {
                let n = n.clone();
                self.advance();
                n
            }
            _ => unreachable!("caller checked for a constant identifier"),
        };

        let mut type_expr = None;
        if self.eat(&TokenKind::As) {
            type_expr = Some(self.parse_type_expr()?);
        }

        self.expect(&TokenKind::Assign, "'='")?;

        let value = if self.at(&TokenKind::Comptime) {
            self.parse_comptime_expr()?
        } else {
            self.parse_expression(0)?
        };

        let span = start.to(self.prev_span());
        Ok(ConstantDef {
            name,
            type_expr,
            value,
            span,
        })
    }

    fn parse_comptime_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        self.advance(); // 'comptime'
        self.skip_newlines();

        let mut stmts: Vec<Stmt> = Vec::new();
        if self.eat(&TokenKind::Indent) {
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                stmts.push(self.parse_statement()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
        } else {
            stmts.push(self.parse_statement()?);
        }

        let span = start.to(self.prev_span());
        Ok(Expr::new(ExprKind::Comptime(stmts), span))
    }

    // ── Bodies ───────────────────────────────────────────────────

    fn parse_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts: Vec<Stmt> = Vec::new();
        if !self.at(&TokenKind::Indent) {
            stmts.push(self.parse_statement()?);
            return Ok(stmts);
        }

        self.advance(); // INDENT
        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            self.skip_newlines();
            if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                break;
            }

            if self.looks_like_match_arm() {
                let start = self.current().span;
                let arms = self.parse_implicit_match_arms()?;
                let span = arms
                    .first()
                    .map(|a| a.span.to(arms.last().expect("nonempty").span))
                    .unwrap_or(start);
                stmts.push(Stmt {
                    kind: StmtKind::Expr(Expr::new(
                        ExprKind::Match {
                            subject: None,
                            arms,
                        },
                        span,
                    )),
                    span,
                });
                continue;
            }

            stmts.push(self.parse_statement()?);
            self.skip_newlines();
        }
        self.eat(&TokenKind::Dedent);
        Ok(stmts)
    }

    fn looks_like_match_arm(&self) -> bool {
        match &self.current().kind {
            TokenKind::TypeIdent(_) => self.scan_for_fat_arrow(),
            TokenKind::Ident(name) if name == "_" => self.peek(1).kind == TokenKind::FatArrow,
            TokenKind::Int(_) | TokenKind::Dec(_) | TokenKind::Str(_) | TokenKind::Bool(_) => {
                self.peek(1).kind == TokenKind::FatArrow
            }
            _ => false,
        }
    }

    fn scan_for_fat_arrow(&self) -> bool {
        let mut idx = self.pos + 1;
        if idx < self.tokens.len() && self.tokens[idx].kind == TokenKind::LParen {
            let mut depth = 1;
            idx += 1;
            while idx < self.tokens.len() && depth > 0 {
                match self.tokens[idx].kind {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => depth -= 1,
                    _ => {}
                }
                idx += 1;
            }
        }
        idx < self.tokens.len() && self.tokens[idx].kind == TokenKind::FatArrow
    }

    fn parse_implicit_match_arms(&mut self) -> ParseResult<Vec<MatchArm>> {
        let mut arms: Vec<MatchArm> = Vec::new();
        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            self.skip_newlines();
            if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                break;
            }
            if !self.looks_like_match_arm() {
                break;
            }
            arms.push(self.parse_match_arm()?);
            self.skip_newlines();
        }
        Ok(arms)
    }

    // ── Statements ───────────────────────────────────────────────

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        // Variable declaration: ident 'as' Type '=' expr
        if matches!(self.current().kind, TokenKind::Ident(_))
            && self.peek(1).kind == TokenKind::As
        {
            return self.parse_var_decl();
        }

        // Assignment: ident '=' expr
        if matches!(self.current().kind, TokenKind::Ident(_))
            && self.peek(1).kind == TokenKind::Assign
        {
            let start = self.current().span;
            let (target, _) = self.expect_ident("assignment target")?;
            self.advance(); // '='
            let value = self.parse_expression(0)?;
            let span = start.to(value.span);
            return Ok(Stmt {
                kind: StmtKind::Assign { target, value },
                span,
            });
        }

        let expr = self.parse_expression(0)?;
        let span = expr.span;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span,
        })
    }

    fn parse_var_decl(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        let (name, _) = self.expect_ident("variable name")?;
        self.advance(); // 'as'
        let type_expr = if matches!(self.current().kind, TokenKind::TypeIdent(_)) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Assign, "'='")?;
        let value = self.parse_expression(0)?;
        let span = start.to(value.span);
        Ok(Stmt {
            kind: StmtKind::VarDecl {
                name,
                type_expr,
                value,
            },
            span,
        })
    }

    // ── Pratt expression parser ──────────────────────────────────

    fn parse_expression(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        loop {
            let tok = self.current().clone();

            // Postfix operators: !, ., (), []
            match &tok.kind {
                TokenKind::BangPostfix => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let span = left.span.to(tok.span);
                    left = Expr::new(ExprKind::FailProp(Box::new(left)), span);
                    continue;
                }
                TokenKind::Dot => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let (field, field_span) = self.expect_ident("field name")?;
                    let span = left.span.to(field_span);
                    left = Expr::new(
                        ExprKind::Field {
                            obj: Box::new(left),
                            field,
                        },
                        span,
                    );
                    continue;
                }
                TokenKind::LParen
                    if matches!(
                        left.kind,
                        ExprKind::Identifier(_) | ExprKind::TypeIdentifier(_) | ExprKind::Field { .. }
                    ) =>
                {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    left = self.parse_call(left)?;
                    continue;
                }
                TokenKind::LBracket => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let index = self.parse_expression(0)?;
                    let end = self.expect(&TokenKind::RBracket, "']'")?;
                    let span = left.span.to(end.span);
                    left = Expr::new(
                        ExprKind::Index {
                            obj: Box::new(left),
                            index: Box::new(index),
                        },
                        span,
                    );
                    continue;
                }
                // `<` after a TypeIdentifier is a type-argument list
                // when it closes as one; otherwise it is comparison.
                TokenKind::Lt if matches!(left.kind, ExprKind::TypeIdentifier(_)) => {
                    if POSTFIX_BP >= min_bp && self.type_args_close() {
                        self.advance(); // <
                        let mut args = vec![self.parse_type_expr()?];
                        while self.eat(&TokenKind::Comma) {
                            args.push(self.parse_type_expr()?);
                        }
                        self.expect(&TokenKind::Gt, "'>'")?;
                        // Concrete arguments are recovered by unification;
                        // the head keeps its identity.
                        let span = left.span.to(self.prev_span());
                        left = Expr::new(left.kind.clone(), span);
                        continue;
                    }
                }
                _ => {}
            }

            // Infix operators
            if let Some((left_bp, right_bp)) = infix_binding_power(&tok.kind) {
                if left_bp < min_bp {
                    break;
                }
                self.advance();
                self.skip_newlines();
                let right = self.parse_expression(right_bp)?;
                let span = left.span.to(right.span);
                left = match tok.kind {
                    TokenKind::PipeArrow => Expr::new(
                        ExprKind::Pipe {
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    ),
                    TokenKind::DotDot => Expr::new(
                        ExprKind::Range {
                            lo: Box::new(left),
                            hi: Box::new(right),
                        },
                        span,
                    ),
                    _ => {
                        let op = BinaryOp::from_token(&tok.kind)
                            .expect("infix_binding_power admitted a binary operator");
                        Expr::new(
                            ExprKind::Binary {
                                left: Box::new(left),
                                op,
                                right: Box::new(right),
                            },
                            span,
                        )
                    }
                };
                continue;
            }

            break;
        }

        Ok(left)
    }

    /// Restricted lookahead: does the `<` at the current position
    /// close as a well-formed type-argument list?
    fn type_args_close(&self) -> bool {
        let mut idx = self.pos + 1;
        let mut depth = 1usize;
        let mut expect_type = true;
        while idx < self.tokens.len() {
            match &self.tokens[idx].kind {
                TokenKind::TypeIdent(_) if expect_type => {
                    expect_type = false;
                }
                TokenKind::Comma if !expect_type && depth == 1 => {
                    expect_type = true;
                }
                TokenKind::Lt if !expect_type => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return !expect_type;
                    }
                }
                _ => return false,
            }
            idx += 1;
        }
        false
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let tok = self.current().clone();

        match &tok.kind {
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_expression(PREFIX_BP)?;
                let span = tok.span.to(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_expression(PREFIX_BP)?;
                let span = tok.span.to(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Pipe => self.parse_lambda(),
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(*v), tok.span))
            }
            TokenKind::Dec(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Dec(*v), tok.span))
            }
            TokenKind::Bool(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(*v), tok.span))
            }
            TokenKind::Char(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Char(*v), tok.span))
            }
            TokenKind::Str(_) => self.parse_string_expr(),
            TokenKind::TripleStr(text) => {
                let text = text.clone();
                self.advance();
                Ok(Expr::new(ExprKind::TripleStr(text), tok.span))
            }
            TokenKind::RawStr(text) => {
                let text = text.clone();
                self.advance();
                Ok(Expr::new(ExprKind::RawStr(text), tok.span))
            }
            TokenKind::Regex(pattern) => {
                let pattern = pattern.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Regex(pattern), tok.span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                let end = self.expect(&TokenKind::RParen, "')'")?;
                let span = tok.span.to(end.span);
                Ok(Expr::new(ExprKind::Paren(Box::new(inner)), span))
            }
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::Valid => self.parse_valid_expr(),
            TokenKind::If => self.parse_if_expr(),
            TokenKind::Match => self.parse_match_expr(),
            TokenKind::Comptime => self.parse_comptime_expr(),
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), tok.span))
            }
            TokenKind::TypeIdent(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::new(ExprKind::TypeIdentifier(name), tok.span))
            }
            TokenKind::ConstIdent(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), tok.span))
            }
            _ => {
                self.error(
                    format!(
                        "unexpected token in expression: '{}'",
                        describe(&tok.kind)
                    ),
                    tok.span,
                );
                Err(Recover)
            }
        }
    }

    /// Build a string expression from the lexer's pieces. Interpolated
    /// holes are parsed by a nested expression parser over their
    /// sub-lexed tokens.
    fn parse_string_expr(&mut self) -> ParseResult<Expr> {
        let tok = self.advance();
        let pieces = match &tok.kind {
            TokenKind::Str(pieces) => pieces.clone(),
            _ => unreachable!("caller checked for a string token"),
        };

        if pieces.len() == 1 {
            if let StringPiece::Text(text) = &pieces[0] {
                return Ok(Expr::new(ExprKind::Str(text.clone()), tok.span));
            }
        }

        let mut parts: Vec<Expr> = Vec::new();
        for piece in pieces {
            match piece {
                StringPiece::Text(text) => {
                    parts.push(Expr::new(ExprKind::Str(text), tok.span));
                }
                StringPiece::Interp(mut sub_tokens) => {
                    let end_span = sub_tokens
                        .last()
                        .map(|t| t.span)
                        .unwrap_or(tok.span);
                    sub_tokens.push(Token::new(TokenKind::Eof, end_span));
                    let sub_parser = Parser::new(&sub_tokens);
                    let (expr, sub_errors) = sub_parser.parse_single_expression();
                    self.errors.extend(sub_errors);
                    if let Some(expr) = expr {
                        parts.push(expr);
                    }
                }
            }
        }
        Ok(Expr::new(ExprKind::StrInterp(parts), tok.span))
    }

    /// Entry point for sub-parsing one interpolated expression.
    fn parse_single_expression(mut self) -> (Option<Expr>, Vec<ParseError>) {
        if self.at(&TokenKind::Eof) {
            let span = self.current().span;
            self.error("empty interpolation", span);
            return (None, self.errors);
        }
        match self.parse_expression(0) {
            Ok(expr) => (Some(expr), self.errors),
            Err(Recover) => (None, self.errors),
        }
    }

    fn parse_call(&mut self, func: Expr) -> ParseResult<Expr> {
        self.advance(); // (
        let mut args: Vec<Expr> = Vec::new();
        while !self.at(&TokenKind::RParen) && !self.at(&TokenKind::Eof) {
            if !args.is_empty() {
                self.expect(&TokenKind::Comma, "','")?;
            }
            args.push(self.parse_expression(0)?);
        }
        let end = self.expect(&TokenKind::RParen, "')'")?;
        let span = func.span.to(end.span);
        Ok(Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
            },
            span,
        ))
    }

    fn parse_list_literal(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        self.advance(); // [
        let mut elements: Vec<Expr> = Vec::new();
        while !self.at(&TokenKind::RBracket) && !self.at(&TokenKind::Eof) {
            if !elements.is_empty() {
                self.expect(&TokenKind::Comma, "','")?;
            }
            elements.push(self.parse_expression(0)?);
        }
        let end = self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::new(ExprKind::List(elements), start.to(end.span)))
    }

    fn parse_valid_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        self.advance(); // 'valid'
        let (name, _) = self.expect_ident("function name")?;
        let mut args = None;
        if self.eat(&TokenKind::LParen) {
            let mut list: Vec<Expr> = Vec::new();
            while !self.at(&TokenKind::RParen) && !self.at(&TokenKind::Eof) {
                if !list.is_empty() {
                    self.expect(&TokenKind::Comma, "','")?;
                }
                list.push(self.parse_expression(0)?);
            }
            self.expect(&TokenKind::RParen, "')'")?;
            args = Some(list);
        }
        let span = start.to(self.prev_span());
        Ok(Expr::new(ExprKind::Valid { name, args }, span))
    }

    fn parse_if_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        self.advance(); // 'if'
        let condition = self.parse_expression(0)?;
        self.skip_newlines();

        let then_body = self.parse_branch_body()?;
        self.skip_newlines();

        let mut else_body: Vec<Stmt> = Vec::new();
        if self.eat(&TokenKind::Else) {
            self.skip_newlines();
            else_body = self.parse_branch_body()?;
        }

        let span = start.to(self.prev_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_body,
                else_body,
            },
            span,
        ))
    }

    fn parse_branch_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut body: Vec<Stmt> = Vec::new();
        if self.eat(&TokenKind::Indent) {
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                body.push(self.parse_statement()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
        } else {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_match_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        self.advance(); // 'match'
        let subject = self.parse_expression(0)?;
        self.skip_newlines();

        let mut arms: Vec<MatchArm> = Vec::new();
        if self.eat(&TokenKind::Indent) {
            while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
                self.skip_newlines();
                if self.at(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                    break;
                }
                arms.push(self.parse_match_arm()?);
                self.skip_newlines();
            }
            self.eat(&TokenKind::Dedent);
        } else {
            arms.push(self.parse_match_arm()?);
        }

        let span = start.to(self.prev_span());
        Ok(Expr::new(
            ExprKind::Match {
                subject: Some(Box::new(subject)),
                arms,
            },
            span,
        ))
    }

    fn parse_match_arm(&mut self) -> ParseResult<MatchArm> {
        let start = self.current().span;
        let pattern = self.parse_pattern()?;
        self.expect(&TokenKind::FatArrow, "'=>'")?;
        self.skip_newlines();
        let body = self.parse_branch_body()?;
        let span = start.to(self.prev_span());
        Ok(MatchArm {
            pattern,
            body,
            span,
        })
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        self.advance(); // |
        let mut params: Vec<String> = Vec::new();
        while !self.at(&TokenKind::Pipe) && !self.at(&TokenKind::Eof) {
            if !params.is_empty() {
                self.expect(&TokenKind::Comma, "','")?;
            }
            params.push(self.expect_ident("lambda parameter")?.0);
        }
        self.expect(&TokenKind::Pipe, "'|'")?;
        let body = self.parse_expression(0)?;
        let span = start.to(body.span);
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    // ── Patterns ─────────────────────────────────────────────────

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let tok = self.current().clone();

        match &tok.kind {
            TokenKind::TypeIdent(_) => self.parse_variant_pattern(),
            TokenKind::Ident(name) if name == "_" => {
                self.advance();
                Ok(Pattern::Wildcard { span: tok.span })
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Pattern::Binding {
                    name,
                    span: tok.span,
                })
            }
            TokenKind::Int(v) => {
                self.advance();
                Ok(Pattern::Literal {
                    value: LiteralValue::Int(*v),
                    span: tok.span,
                })
            }
            TokenKind::Dec(v) => {
                self.advance();
                Ok(Pattern::Literal {
                    value: LiteralValue::Dec(*v),
                    span: tok.span,
                })
            }
            TokenKind::Bool(v) => {
                self.advance();
                Ok(Pattern::Literal {
                    value: LiteralValue::Bool(*v),
                    span: tok.span,
                })
            }
            TokenKind::Str(pieces) => {
                let text = pieces
                    .iter()
                    .map(|p| match p {
                        StringPiece::Text(t) => t.clone(),
                        StringPiece::Interp(_) => String::new(),
                    })
                    .collect::<String>();
                self.advance();
                Ok(Pattern::Literal {
                    value: LiteralValue::Str(text),
                    span: tok.span,
                })
            }
            _ => {
                self.error(
                    format!("expected pattern, got '{}'", describe(&tok.kind)),
                    tok.span,
                );
                Err(Recover)
            }
        }
    }

    fn parse_variant_pattern(&mut self) -> ParseResult<Pattern> {
        let start = self.current().span;
        let (name, _) = self.expect_type_ident("variant name")?;
        let mut fields: Vec<Pattern> = Vec::new();

        if self.eat(&TokenKind::LParen) {
            while !self.at(&TokenKind::RParen) && !self.at(&TokenKind::Eof) {
                if !fields.is_empty() {
                    self.expect(&TokenKind::Comma, "','")?;
                }
                fields.push(self.parse_pattern()?);
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }

        let span = start.to(self.prev_span());
        Ok(Pattern::Variant { name, fields, span })
    }
}

/// Human-readable token description for error messages.
fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Indent => "indent".to_string(),
        TokenKind::Dedent => "dedent".to_string(),
        TokenKind::Eof => "end of file".to_string(),
        other => other.lexeme(),
    }
}

/// `ParseEmail` → `parse_email`
fn to_snake_case(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `parse_email` → `ParseEmail`
fn to_camel_case(name: &str) -> String {
    name.split('_')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FileId;
    use crate::lexer::Lexer;

    fn parse_ok(text: &str) -> Module {
        let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let (module, errors) = Parser::new(&tokens).parse();
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        module
    }

    fn parse_errs(text: &str) -> Vec<ParseError> {
        let (tokens, _) = Lexer::new(FileId(0), text).lex();
        Parser::new(&tokens).parse().1
    }

    #[test]
    fn test_hello_world() {
        let module = parse_ok("main()!\nfrom\n    println(\"Hello from Prove!\")\n");
        let main = module.main().expect("main should parse");
        assert!(main.can_fail);
        assert_eq!(main.body.len(), 1);
    }

    #[test]
    fn test_function_with_params_and_return() {
        let module = parse_ok(
            "transforms add(a Integer, b Integer) Integer\nfrom\n    a + b\n",
        );
        let f = module.functions().next().expect("one function");
        assert_eq!(f.verb, Verb::Transforms);
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert!(f.return_type.is_some());
        assert!(!f.can_fail);
    }

    #[test]
    fn test_validates_explicit_return_is_e360() {
        let errors = parse_errs("validates email(a String) Boolean\nfrom\n    true\n");
        assert!(errors.iter().any(|e| e.code == "E360"));
    }

    #[test]
    fn test_pure_verb_fail_marker_is_e361() {
        let errors = parse_errs("transforms add(a Integer) Integer!\nfrom\n    a\n");
        assert!(errors.iter().any(|e| e.code == "E361"));
    }

    #[test]
    fn test_casing_hint_on_function_name() {
        let errors = parse_errs("transforms AddTwo(a Integer) Integer\nfrom\n    a\n");
        let err = errors.iter().find(|e| e.code == "E303").expect("casing error");
        assert_eq!(err.suggestion.as_deref(), Some("add_two"));
    }

    #[test]
    fn test_refinement_type_def() {
        let module = parse_ok("type Port is Integer where 1..65535\n");
        let td = module.types().next().expect("one type");
        assert!(matches!(td.body, TypeBody::Refinement { .. }));
    }

    #[test]
    fn test_algebraic_type_def() {
        let module =
            parse_ok("type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)\n");
        let td = module.types().next().expect("one type");
        match &td.body {
            TypeBody::Algebraic { variants, .. } => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0].name, "Circle");
                assert_eq!(variants[1].fields.len(), 2);
            }
            other => panic!("expected algebraic body, got {:?}", other),
        }
    }

    #[test]
    fn test_matches_implicit_body() {
        let module = parse_ok(
            "matches area(s Shape) Decimal\nfrom\n    Circle(r) => 3 * r * r\n    Rect(w, h) => w * h\n",
        );
        let f = module.functions().next().expect("one function");
        assert_eq!(f.body.len(), 1);
        match &f.body[0].kind {
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Match { subject, arms } => {
                    assert!(subject.is_none());
                    assert_eq!(arms.len(), 2);
                }
                other => panic!("expected implicit match, got {:?}", other),
            },
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_annotations_recorded_in_order() {
        let module = parse_ok(
            "transforms clamp(x Integer, lo Integer, hi Integer) Integer\n    requires lo <= hi\n    ensures result >= lo\n    from\n        max(lo, x)\n",
        );
        let f = module.functions().next().expect("one function");
        assert_eq!(f.annotations.len(), 2);
        assert!(matches!(f.annotations[0].kind, AnnotationKind::Requires(_)));
        assert!(matches!(f.annotations[1].kind, AnnotationKind::Ensures(_)));
    }

    #[test]
    fn test_explain_rows() {
        let module = parse_ok(
            "transforms clamp(x Integer, lo Integer, hi Integer) Integer\n    ensures result >= lo\n    explain\n        bound value from below using lo\n        return result\n    from\n        a as Integer = max(lo, x)\n        min(a, hi)\n",
        );
        let f = module.functions().next().expect("one function");
        let (rows, _) = f.explain().expect("explain block");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "bound value from below using lo");
    }

    #[test]
    fn test_pipe_and_fail_prop() {
        let module = parse_ok(
            "inputs load(path String) Config!\nfrom\n    raw as String = read_file(path)!\n    decode(raw)!\n",
        );
        let f = module.functions().next().expect("one function");
        assert!(f.can_fail);
        assert_eq!(f.body.len(), 2);
        match &f.body[1].kind {
            StmtKind::Expr(e) => assert!(matches!(e.kind, ExprKind::FailProp(_))),
            other => panic!("expected fail-prop expression, got {:?}", other),
        }
    }

    #[test]
    fn test_generic_vs_comparison() {
        // snake_case < is comparison
        let module = parse_ok("validates small(n Integer)\nfrom\n    n < 10\n");
        let f = module.functions().next().expect("one function");
        match &f.body[0].kind {
            StmtKind::Expr(e) => assert!(matches!(
                e.kind,
                ExprKind::Binary {
                    op: BinaryOp::Lt,
                    ..
                }
            )),
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_import_groups() {
        let module = parse_ok("with Text use transforms trim lower, validates email\n");
        match &module.declarations[0] {
            Decl::Import(imp) => {
                assert_eq!(imp.module, "Text");
                assert_eq!(imp.groups.len(), 2);
                match &imp.groups[0] {
                    ImportGroup::Verb(Verb::Transforms, names) => {
                        assert_eq!(names, &vec!["trim".to_string(), "lower".to_string()]);
                    }
                    other => panic!("expected verb group, got {:?}", other),
                }
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_block() {
        let module = parse_ok("foreign libm\n    sqrt(x Decimal) Decimal\n    pow(x Decimal, y Decimal) Decimal\n");
        let fb = module.foreign_blocks().next().expect("one foreign block");
        assert_eq!(fb.library, "libm");
        assert_eq!(fb.functions.len(), 2);
    }

    #[test]
    fn test_lambda_expression() {
        let module = parse_ok(
            "transforms doubled(xs List<Integer>) List<Integer>\nfrom\n    map(xs, |x| x * 2)\n",
        );
        let f = module.functions().next().expect("one function");
        match &f.body[0].kind {
            StmtKind::Expr(e) => match &e.kind {
                ExprKind::Call { args, .. } => {
                    assert!(matches!(args[1].kind, ExprKind::Lambda { .. }));
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_error_recovery_continues() {
        let errors = parse_errs("type is\n\ntransforms ok(a Integer) Integer\nfrom\n    a\n");
        assert!(!errors.is_empty());
        // The good function after the bad type still parses.
        let (tokens, _) = Lexer::new(FileId(0), "type is\n\ntransforms ok(a Integer) Integer\nfrom\n    a\n").lex();
        let (module, _) = Parser::new(&tokens).parse();
        assert_eq!(module.functions().count(), 1);
    }

    #[test]
    fn test_near_miss_annotation() {
        let module = parse_ok(
            "validates port(n Integer)\n    near_miss: 0 => false\n    from\n        n >= 1 && n <= 65535\n",
        );
        let f = module.functions().next().expect("one function");
        assert!(f
            .annotations
            .iter()
            .any(|a| matches!(a.kind, AnnotationKind::NearMiss(_))));
    }

    #[test]
    fn test_constant_def() {
        let module = parse_ok("MAX_RETRIES as Integer = 3\n");
        match &module.declarations[0] {
            Decl::Constant(c) => {
                assert_eq!(c.name, "MAX_RETRIES");
                assert!(c.type_expr.is_some());
            }
            other => panic!("expected constant, got {:?}", other),
        }
    }
}
