use prove_compiler::ast::Verb;
use prove_compiler::diagnostic::{Diagnostic, FileId};
use prove_compiler::lexer::Lexer;
use prove_compiler::parser::Parser;
use prove_compiler::resolver::Resolver;
use prove_compiler::semantics::{check_module, TypedModule};

fn analyze(text: &str) -> (TypedModule, Vec<Diagnostic>) {
    let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    let (module, parse_errors) = Parser::new(&tokens).parse();
    assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
    let mut res = Resolver::new().resolve(&module);
    let (typed, mut diags) = check_module(&module, &mut res);
    diags.extend(res.diagnostics);
    (typed, diags)
}

fn errors(diags: &[Diagnostic]) -> Vec<&str> {
    diags
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.code.as_str())
        .collect()
}

#[test]
fn test_verb_dispatch_scenario() {
    // The same bare name resolves to the validates variant in a
    // Boolean context and the transforms variant when the expected
    // type matches its return.
    let source = "\
type Email is String where len(self) > 0

validates email(a String)
from
    contains(a, \"@\")

transforms email(raw String) Email
from
    lower(trim(raw))

main()!
from
    ok as Boolean = email(\"a@b.c\")
    name as Email = email(\"  A@B.C \")
    println(name)
";
    let (typed, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);

    let email_targets: Vec<Option<Verb>> = typed
        .call_targets
        .values()
        .filter(|k| k.name == "email")
        .map(|k| k.verb)
        .collect();
    assert!(email_targets.contains(&Some(Verb::Validates)));
    assert!(email_targets.contains(&Some(Verb::Transforms)));
}

#[test]
fn test_refinement_rejection_scenario() {
    let source = "\
type Port is Integer where 1..65535

main()!
from
    port as Port = 70000
    println(to_string(port))
";
    let (_, diags) = analyze(source);
    let violation = diags
        .iter()
        .find(|d| d.code == "E341")
        .expect("out-of-range literal must be rejected statically");
    assert!(violation
        .suggestions
        .iter()
        .any(|s| s.replacement == "clamp(70000, 1, 65535)"));

    // The span points at the offending literal.
    let span = violation.primary_span().expect("has a primary span");
    assert_eq!(&source[span.start as usize..span.end as usize], "70000");
}

#[test]
fn test_refinement_boundaries_accepted() {
    let source = "\
type Port is Integer where 1..65535

main()!
from
    low as Port = 1
    high as Port = 65535
    println(to_string(low + high))
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
}

#[test]
fn test_exhaustiveness_scenario() {
    let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
";
    let (_, diags) = analyze(source);
    let err = diags.iter().find(|d| d.code == "E371").expect("E371");
    assert!(err.message.contains("Rect"));
}

#[test]
fn test_purity_boundaries() {
    let source = "\
transforms shout(a String) String
from
    println(a)
    upper(a)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).contains(&"E362"));

    let source = "\
inputs fetch(path String) String!
from
    read_file(path)!

reads peek(path String) String
from
    fetch(path)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).contains(&"E363"));
}

#[test]
fn test_lambda_capture_rejected() {
    let source = "\
transforms scale(xs List<Integer>, k Integer) List<Integer>
from
    map(xs, |x| x * k)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).contains(&"E364"));
}

#[test]
fn test_lambda_through_parameters_accepted() {
    let source = "\
transforms doubled(xs List<Integer>) List<Integer>
from
    map(xs, |x| x * 2)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
}

#[test]
fn test_terminates_required_for_recursion() {
    let source = "\
transforms fact(n Integer) Integer
from
    n * fact(n - 1)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).contains(&"E366"));

    let source = "\
transforms fact(n Integer) Integer
    terminates: n
    from
        n * fact(n - 1)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
}

#[test]
fn test_terminates_rejects_growing_argument() {
    let source = "\
transforms runaway(n Integer) Integer
    terminates: n
    from
        runaway(n + 1)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).contains(&"E366"));
}

#[test]
fn test_mutual_recursion_needs_terminates() {
    let source = "\
transforms ping(n Integer) Integer
from
    pong(n - 1)

transforms pong(n Integer) Integer
from
    ping(n - 1)
";
    let (_, diags) = analyze(source);
    let e366_count = errors(&diags).iter().filter(|c| **c == "E366").count();
    assert_eq!(e366_count, 2);
}

#[test]
fn test_fallibility_only_in_io_verbs() {
    let source = "\
transforms risky(path String) String
from
    read_file(path)!
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).contains(&"E361"));
}

#[test]
fn test_fail_prop_scenario_types() {
    let source = "\
type Config is
    host String

transforms decode(raw String) Config
from
    Config(raw)

inputs load(path String) Config!
from
    raw as String = read_file(path)!
    decode(raw)
";
    let (_, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
}

#[test]
fn test_ambiguous_call_lists_candidates() {
    let source = "\
transforms score(a Integer) Integer
from
    a

reads score(a Integer) Integer
from
    a

main()!
from
    s as Integer = score(3)
    println(to_string(s))
";
    let (_, diags) = analyze(source);
    // Both candidates return Integer and accept Integer; verb
    // preference picks transforms without an ambiguity error.
    assert!(errors(&diags).is_empty(), "{:?}", diags);

    let source = "\
transforms render(a Integer) String
from
    to_string(a)

reads render(a Integer) Integer
from
    a

validates render(a Integer)
from
    a > 0

main()!
from
    x as Boolean = render(3)
    println(to_string(x))
";
    let (typed, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
    // Boolean context must have picked the validates variant.
    assert!(typed
        .call_targets
        .values()
        .any(|k| k.name == "render" && k.verb == Some(Verb::Validates)));
}

#[test]
fn test_monomorphization_per_instantiation() {
    let source = "\
transforms first(xs List<T>) T
from
    xs[0]

main()!
from
    n as Integer = first([1, 2, 3])
    s as String = first([\"a\", \"b\"])
    println(s)
    println(to_string(n))
";
    let (typed, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
    assert_eq!(typed.mono.len(), 2);
}

#[test]
fn test_every_checked_expression_has_a_type() {
    let source = "\
transforms add(a Integer, b Integer) Integer
from
    a + b
";
    let (typed, diags) = analyze(source);
    assert!(errors(&diags).is_empty(), "{:?}", diags);
    assert!(typed
        .expr_types
        .values()
        .all(|t| !matches!(t, prove_compiler::semantics::types::Type::Error)));
}
