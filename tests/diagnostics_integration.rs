use insta::assert_snapshot;

use prove_compiler::diagnostic::{
    ColorConfig, Diagnostic, DiagnosticEmitter, Files, Label,
};
use prove_compiler::lexer::Span;
use prove_compiler::source::Source;

#[test]
fn test_rust_style_rendering() {
    let mut files = Files::new();
    let id = files.add(&Source::from_str("app.prv", "port as Port = 70000\n"));
    let diag = Diagnostic::error(
        "E341",
        "value 70000 does not satisfy the refinement on 'Port'",
        Span::new(id, 15, 20),
    )
    .with_note("Port is Integer where 1..65535")
    .with_suggestion("clamp the value into range", "clamp(70000, 1, 65535)");

    let emitter = DiagnosticEmitter::new(&files, ColorConfig::Never);
    assert_snapshot!(emitter.render(&diag), @r###"
    error[E341]: value 70000 does not satisfy the refinement on 'Port'
      --> app.prv:1:16
           |
         1 | port as Port = 70000
           |                ^^^^^
      = note: Port is Integer where 1..65535
      try: clamp(70000, 1, 65535)
    "###);
}

#[test]
fn test_secondary_label_rendering() {
    let mut files = Files::new();
    let id = files.add(&Source::from_str(
        "app.prv",
        "transforms id(a Integer) Integer\nfrom\n    a\n",
    ));
    let diag = Diagnostic::error("E301", "duplicate definition of 'id'", Span::new(id, 11, 13))
        .with_label(Label::secondary(Span::new(id, 11, 13), "first defined here"));

    let emitter = DiagnosticEmitter::new(&files, ColorConfig::Never);
    let rendered = emitter.render(&diag);
    assert!(rendered.contains("error[E301]: duplicate definition of 'id'"));
    assert!(rendered.contains("first defined here"));
    assert!(rendered.contains("--"));
}

#[test]
fn test_warning_rendering() {
    let mut files = Files::new();
    let id = files.add(&Source::from_str("app.prv", "x as Integer = 1\n"));
    let diag = Diagnostic::warning("W300", "unused variable 'x'", Span::new(id, 0, 1));
    let emitter = DiagnosticEmitter::new(&files, ColorConfig::Never);
    let rendered = emitter.render(&diag);
    assert!(rendered.starts_with("warning[W300]: unused variable 'x'"));
}

#[test]
fn test_multiline_span_renders_single_caret() {
    let mut files = Files::new();
    let id = files.add(&Source::from_str("app.prv", "a as Integer = 1 +\n    2\n"));
    // Span stretches across the continuation line.
    let diag = Diagnostic::error("E200", "example", Span::new(id, 15, 24));
    let emitter = DiagnosticEmitter::new(&files, ColorConfig::Never);
    let rendered = emitter.render(&diag);
    assert!(rendered.contains("--> app.prv:1:16"));
}
