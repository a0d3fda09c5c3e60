use prove_compiler::ast::{
    AnnotationKind, BinaryOp, Decl, ExprKind, ImportGroup, Module, StmtKind, TypeBody, Verb,
};
use prove_compiler::diagnostic::FileId;
use prove_compiler::lexer::Lexer;
use prove_compiler::parser::{ParseError, Parser};

fn parse(text: &str) -> Module {
    let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    let (module, errors) = Parser::new(&tokens).parse();
    assert!(errors.is_empty(), "parse errors: {:?}", errors);
    module
}

fn parse_with_errors(text: &str) -> (Module, Vec<ParseError>) {
    let (tokens, _) = Lexer::new(FileId(0), text).lex();
    Parser::new(&tokens).parse()
}

#[test]
fn test_full_module_shape() {
    let source = "\
module Billing
    narrative: \"Invoice arithmetic with contracts.\"
    temporal: load -> compute -> emit

    type Money is Integer where >= 0

    transforms total(amounts List<Integer>) Integer
    from
        sum(amounts)

MAX_ITEMS as Integer = 100

main()!
from
    println(\"billing\")
";
    let module = parse(source);
    assert_eq!(module.name.as_deref(), Some("Billing"));
    assert_eq!(
        module.narrative.as_deref(),
        Some("Invoice arithmetic with contracts.")
    );
    assert_eq!(
        module.temporal,
        Some(vec!["load".into(), "compute".into(), "emit".into()])
    );
    assert_eq!(module.types().count(), 1);
    assert_eq!(module.functions().count(), 1);
    assert!(module.main().is_some());
    assert!(module
        .declarations
        .iter()
        .any(|d| matches!(d, Decl::Constant(_))));
}

#[test]
fn test_all_seven_verbs_parse() {
    let source = "\
transforms t(a Integer) Integer
from
    a

validates v(a Integer)
from
    a > 0

reads r(a Integer) Integer
from
    a

creates c(a Integer) Integer
from
    a

matches m(s Shape) Integer
from
    _ => 0

inputs i(path String) String!
from
    read_file(path)!

outputs o(line String)!
from
    println(line)
";
    let module = parse(source);
    let verbs: Vec<Verb> = module.functions().map(|f| f.verb).collect();
    assert_eq!(
        verbs,
        vec![
            Verb::Transforms,
            Verb::Validates,
            Verb::Reads,
            Verb::Creates,
            Verb::Matches,
            Verb::Inputs,
            Verb::Outputs,
        ]
    );
}

#[test]
fn test_annotation_order_preserved() {
    let source = "\
transforms clamp_to(x Integer, lo Integer, hi Integer) Integer
    ensures result >= lo
    requires lo <= hi
    intent: \"keep x within bounds\"
    why_not: \"modular wrapping surprises callers\"
    chosen: \"saturating clamp\"
    near_miss: 0 => 0
    from
        clamp(x, lo, hi)
";
    let module = parse(source);
    let f = module.functions().next().expect("one function");
    let kinds: Vec<&str> = f
        .annotations
        .iter()
        .map(|a| match &a.kind {
            AnnotationKind::Ensures(_) => "ensures",
            AnnotationKind::Requires(_) => "requires",
            AnnotationKind::Intent(_) => "intent",
            AnnotationKind::WhyNot(_) => "why_not",
            AnnotationKind::Chosen(_) => "chosen",
            AnnotationKind::NearMiss(_) => "near_miss",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["ensures", "requires", "intent", "why_not", "chosen", "near_miss"]
    );
}

#[test]
fn test_proof_block_obligations() {
    let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    proof
        growth: result grows monotonically with a
        parity: result stays even for any a
    from
        a * 2
";
    let module = parse(source);
    let f = module.functions().next().expect("one function");
    let (obligations, _) = f.proof().expect("proof block");
    assert_eq!(obligations.len(), 2);
    assert_eq!(obligations[0].name, "growth");
    assert!(obligations[0].text.contains("monotonically"));
    assert_eq!(obligations[1].name, "parity");
}

#[test]
fn test_explain_rows_with_continuation() {
    let source = "\
transforms normalize(raw String) String
    ensures len(result) <= len(raw)
    explain
        trim whitespace from raw
            and collapse interior runs
        lower the remaining characters
    from
        t as String = trim(raw)
        lower(t)
";
    let module = parse(source);
    let f = module.functions().next().expect("one function");
    let (rows, _) = f.explain().expect("explain block");
    assert_eq!(rows.len(), 2);
    assert!(rows[0].text.contains("collapse interior runs"));
}

#[test]
fn test_type_definitions() {
    let source = "\
type Port is Integer where 1..65535

type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

type Config is
    host String
    port Port
";
    let module = parse(source);
    let bodies: Vec<&TypeBody> = module.types().map(|t| &t.body).collect();
    assert!(matches!(bodies[0], TypeBody::Refinement { .. }));
    assert!(matches!(bodies[1], TypeBody::Algebraic { .. }));
    assert!(matches!(bodies[2], TypeBody::Record { .. }));
}

#[test]
fn test_pipe_chain() {
    let source = "\
transforms normalize(raw String) String
from
    raw |> trim |> lower
";
    let module = parse(source);
    let f = module.functions().next().expect("one function");
    match &f.body[0].kind {
        StmtKind::Expr(e) => {
            assert!(matches!(e.kind, ExprKind::Pipe { .. }));
        }
        other => panic!("expected pipe expression, got {:?}", other),
    }
}

#[test]
fn test_valid_forms() {
    let source = "\
validates email(a String)
from
    contains(a, \"@\")

transforms keep_valid(xs List<String>) List<String>
from
    filter(xs, valid email)

validates both(a String)
from
    valid email(a) && contains(a, \".\")
";
    let module = parse(source);
    let functions: Vec<_> = module.functions().collect();
    assert_eq!(functions.len(), 3);
}

#[test]
fn test_generic_type_args_vs_comparison() {
    let module = parse("validates small(n Integer)\nfrom\n    n < 10\n");
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

    let module = parse(
        "transforms build(n Integer) List<Integer>\nfrom\n    [n]\n",
    );
    assert_eq!(module.functions().count(), 1);
}

#[test]
fn test_import_decl_groups() {
    let source = "with Text use transforms trim lower upper, validates email, types Builder\n";
    let module = parse(source);
    match &module.declarations[0] {
        Decl::Import(imp) => {
            assert_eq!(imp.module, "Text");
            assert_eq!(imp.groups.len(), 3);
            assert!(matches!(&imp.groups[0], ImportGroup::Verb(Verb::Transforms, names) if names.len() == 3));
            assert!(matches!(&imp.groups[1], ImportGroup::Verb(Verb::Validates, names) if names.len() == 1));
            assert!(matches!(&imp.groups[2], ImportGroup::Types(names) if names == &vec!["Builder".to_string()]));
        }
        other => panic!("expected import, got {:?}", other),
    }
}

#[test]
fn test_invariant_network() {
    let source = "\
invariant_network Ledger
    debits == credits
    balance >= 0
";
    let module = parse(source);
    match &module.declarations[0] {
        Decl::InvariantNetwork(net) => {
            assert_eq!(net.name, "Ledger");
            assert_eq!(net.constraints.len(), 2);
        }
        other => panic!("expected invariant network, got {:?}", other),
    }
}

#[test]
fn test_recovery_after_bad_declaration() {
    let source = "\
type is

transforms ok(a Integer) Integer
from
    a
";
    let (module, errors) = parse_with_errors(source);
    assert!(!errors.is_empty());
    assert_eq!(module.functions().count(), 1);
}

#[test]
fn test_parse_format_parse_round_trip_shape() {
    // Parsing twice from the same text yields structurally equal
    // ASTs; spans and all.
    let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
    Rect(w, h) => w * h
";
    let first = parse(source);
    let second = parse(source);
    assert_eq!(first, second);
}

#[test]
fn test_string_interpolation_parses_inner_expression() {
    let source = "\
outputs report(count Integer)!
from
    println(f\"processed {count} items\")
";
    let module = parse(source);
    let f = module.functions().next().expect("one function");
    match &f.body[0].kind {
        StmtKind::Expr(e) => match &e.kind {
            ExprKind::Call { args, .. } => {
                assert!(matches!(&args[0].kind, ExprKind::StrInterp(parts) if parts.len() == 3));
            }
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}
