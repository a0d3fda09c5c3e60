use prove_compiler::diagnostic::FileId;
use prove_compiler::lexer::{Lexer, StringPiece, Token, TokenKind};

fn lex(text: &str) -> Vec<Token> {
    let (tokens, errors) = Lexer::new(FileId(0), text).lex();
    assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
    tokens
}

#[test]
fn test_indent_dedent_balance_across_nesting() {
    let source = "\
type Config is
    host String
    port Integer

main()!
from
    c as Config = Config(\"localhost\", 8080)
    match c.port
        8080 => println(\"default\")
        _ => println(\"custom\")
";
    let tokens = lex(source);
    let indents = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Indent)
        .count();
    let dedents = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Dedent)
        .count();
    assert_eq!(indents, dedents, "INDENT/DEDENT must balance");
}

#[test]
fn test_every_span_is_contained_in_source() {
    let source = "transforms add(a Integer, b Integer) Integer\nfrom\n    a + b\n";
    let tokens = lex(source);
    for token in &tokens {
        assert!(
            (token.span.end as usize) <= source.len(),
            "span {:?} escapes the source",
            token.span
        );
        assert!(token.span.start <= token.span.end);
    }
}

#[test]
fn test_newline_suppression_set() {
    // Each line ends in a continuation token; no NEWLINE or INDENT
    // may be produced for the wrapped lines.
    let source = "a as Integer = 1 +\n    2 *\n    3\n";
    let tokens = lex(source);
    assert!(!tokens.iter().any(|t| t.kind == TokenKind::Indent));
    let newlines = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Newline)
        .count();
    assert_eq!(newlines, 1, "only the final physical line ends the statement");
}

#[test]
fn test_fail_marker_requires_adjacency() {
    let tokens = lex("load(path)!\n");
    assert!(tokens.iter().any(|t| t.kind == TokenKind::BangPostfix));

    // With whitespace it is logical not.
    let tokens = lex("flag = ! ready\n");
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Bang));
    assert!(!tokens.iter().any(|t| t.kind == TokenKind::BangPostfix));
}

#[test]
fn test_string_forms() {
    let tokens = lex("\"plain\" \"\"\"multi\nline\"\"\" r\"raw\\no-escape\" f\"x = {x}\"\n");
    assert!(matches!(&tokens[0].kind, TokenKind::Str(_)));
    assert_eq!(tokens[1].kind, TokenKind::TripleStr("multi\nline".into()));
    assert_eq!(tokens[2].kind, TokenKind::RawStr("raw\\no-escape".into()));
    match &tokens[3].kind {
        TokenKind::Str(pieces) => {
            assert_eq!(pieces[0], StringPiece::Text("x = ".into()));
            assert!(matches!(&pieces[1], StringPiece::Interp(inner) if inner.len() == 1));
        }
        other => panic!("expected format string, got {:?}", other),
    }
}

#[test]
fn test_regex_only_in_expression_position() {
    let tokens = lex("ratio as Integer = total / count\n");
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Slash));
    assert!(!tokens.iter().any(|t| matches!(t.kind, TokenKind::Regex(_))));

    let tokens = lex("pattern as String = /[a-z]+/\n");
    assert!(tokens
        .iter()
        .any(|t| t.kind == TokenKind::Regex("[a-z]+".into())));
}

#[test]
fn test_keywords_take_precedence_over_identifiers() {
    let tokens = lex("transforms validates match from\n");
    assert_eq!(tokens[0].kind, TokenKind::Transforms);
    assert_eq!(tokens[1].kind, TokenKind::Validates);
    assert_eq!(tokens[2].kind, TokenKind::Match);
    assert_eq!(tokens[3].kind, TokenKind::From);
}

#[test]
fn test_casing_classification() {
    let tokens = lex("value Port HTTP_TIMEOUT T\n");
    assert_eq!(tokens[0].kind, TokenKind::Ident("value".into()));
    assert_eq!(tokens[1].kind, TokenKind::TypeIdent("Port".into()));
    assert_eq!(tokens[2].kind, TokenKind::ConstIdent("HTTP_TIMEOUT".into()));
    assert_eq!(tokens[3].kind, TokenKind::TypeIdent("T".into()));
}

#[test]
fn test_numeric_literals() {
    let tokens = lex("1_000_000 0xDEAD 0b101 0o777 2.5 0.125\n");
    assert_eq!(tokens[0].kind, TokenKind::Int(1_000_000));
    assert_eq!(tokens[1].kind, TokenKind::Int(0xDEAD));
    assert_eq!(tokens[2].kind, TokenKind::Int(5));
    assert_eq!(tokens[3].kind, TokenKind::Int(0o777));
    assert_eq!(tokens[4].kind, TokenKind::Dec(2.5.into()));
    assert_eq!(tokens[5].kind, TokenKind::Dec(0.125.into()));
}

#[test]
fn test_doc_comments_attach_and_line_comments_vanish() {
    let source = "/// first line\n/// second line\n// discarded\ntransforms id(a Integer) Integer\nfrom\n    a\n";
    let tokens = lex(source);
    let docs: Vec<&Token> = tokens
        .iter()
        .filter(|t| matches!(t.kind, TokenKind::DocComment(_)))
        .collect();
    assert_eq!(docs.len(), 2);
    assert!(!tokens.iter().any(|t| t.lexeme().contains("discarded")));
}

#[test]
fn test_lex_print_relex_round_trip() {
    // Printing tokens back to text and re-lexing gives the same
    // kinds, modulo layout tokens.
    let source = "transforms add(a Integer, b Integer) Integer\nfrom\n    a + b\n";
    let tokens = lex(source);
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
            )
        })
        .collect();
    let printed: String = significant
        .iter()
        .map(|t| t.lexeme())
        .collect::<Vec<_>>()
        .join(" ");
    let (reparsed, errors) = Lexer::new(FileId(0), &printed).lex();
    assert!(errors.is_empty(), "re-lex failed: {:?}", errors);
    let reparsed_kinds: Vec<&TokenKind> = reparsed
        .iter()
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
            )
        })
        .map(|t| &t.kind)
        .collect();
    let original_kinds: Vec<&TokenKind> = significant.iter().map(|t| &t.kind).collect();
    assert_eq!(original_kinds, reparsed_kinds);
}

#[test]
fn test_tab_indentation_normalizes() {
    // One tab equals the default tab width, so tab and four-space
    // bodies lex identically.
    let with_tabs = "main()!\nfrom\n\tprintln(\"hi\")\n";
    let with_spaces = "main()!\nfrom\n    println(\"hi\")\n";
    let kinds_tabs: Vec<TokenKind> = lex(with_tabs).into_iter().map(|t| t.kind).collect();
    let kinds_spaces: Vec<TokenKind> = lex(with_spaces).into_iter().map(|t| t.kind).collect();
    assert_eq!(kinds_tabs, kinds_spaces);
}

#[test]
fn test_bad_dedent_reports_error() {
    let (_, errors) = Lexer::new(
        FileId(0),
        "main()!\nfrom\n        a as Integer = 1\n   println(\"x\")\n",
    )
    .lex();
    assert!(!errors.is_empty());
    assert!(errors[0].message.contains("indentation"));
}
