use prove_compiler::diagnostic::{Diagnostic, FileId};
use prove_compiler::lexer::Lexer;
use prove_compiler::parser::Parser;
use prove_compiler::resolver::Resolver;
use prove_compiler::semantics::check_module;
use prove_compiler::verifier::{verify_module, CnlVocabulary, CoverageSummary};

fn verify(text: &str) -> (Vec<Diagnostic>, CoverageSummary) {
    verify_with_vocab(text, CnlVocabulary::default())
}

fn verify_with_vocab(text: &str, vocab: CnlVocabulary) -> (Vec<Diagnostic>, CoverageSummary) {
    let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    let (module, parse_errors) = Parser::new(&tokens).parse();
    assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
    let mut res = Resolver::new().resolve(&module);
    let (typed, check_diags) = check_module(&module, &mut res);
    assert!(
        check_diags.iter().all(|d| !d.is_error()),
        "checker errors: {:?}",
        check_diags
    );
    verify_module(&module, &res, &typed, vocab)
}

fn codes(diags: &[Diagnostic]) -> Vec<&str> {
    diags.iter().map(|d| d.code.as_str()).collect()
}

#[test]
fn test_explain_strict_mode_scenario() {
    // Spec scenario: two explain rows against three body statements.
    let source = "\
transforms clamp_to(x Integer, lo Integer, hi Integer) Integer
    ensures result >= lo
    explain
        bound value from below using lo
        return result
    from
        a as Integer = max(lo, x)
        b as Integer = min(a, hi)
        b
";
    let (diags, _) = verify(source);
    let err = diags.iter().find(|d| d.code == "E390").expect("E390");
    assert!(err.message.contains("2 row(s)"));
    assert!(err.message.contains("3 top-level statement(s)"));
}

#[test]
fn test_explain_strict_mode_balanced() {
    let source = "\
transforms clamp_to(x Integer, lo Integer, hi Integer) Integer
    requires lo <= hi
    ensures result >= lo
    explain
        bound value from below using lo
        bound value from above using hi
        return result
    from
        a as Integer = max(lo, x)
        b as Integer = min(a, hi)
        b
";
    let (diags, _) = verify(source);
    assert!(
        diags.iter().all(|d| !d.is_error()),
        "expected clean verification: {:?}",
        diags
    );
}

#[test]
fn test_explain_loose_mode_free_rows() {
    let source = "\
transforms double(a Integer) Integer
    explain
        multiply a by two because callers expect growth
    from
        a * 2
";
    let (diags, _) = verify(source);
    assert!(diags.iter().all(|d| d.code != "E390"));
    assert!(diags.iter().all(|d| d.code != "E394"));
    // Loose mode still warns that explain lacks ensures.
    assert!(codes(&diags).contains(&"W325"));
}

#[test]
fn test_explain_vocabulary_extension() {
    let source = "\
transforms shuffle(xs List<Integer>) List<Integer>
    ensures len(result) == len(xs)
    explain
        permute xs preserving length
    from
        xs
";
    // Without the custom verb the row leads with an unknown word.
    let (diags, _) = verify(source);
    assert!(codes(&diags).contains(&"E394"));

    let vocab = CnlVocabulary {
        operations: vec!["permute".to_string()],
        connectors: Vec::new(),
    };
    let (diags, _) = verify_with_vocab(source, vocab);
    assert!(diags.iter().all(|d| d.code != "E394"), "{:?}", diags);
}

#[test]
fn test_near_miss_duplicates_and_believe() {
    let source = "\
validates port(n Integer)
    near_miss: 0 => false
    near_miss: 0 => false
    near_miss: 65536 => false
    from
        n >= 1 && n <= 65535
";
    let (diags, _) = verify(source);
    let w322_count = codes(&diags).iter().filter(|c| **c == "W322").count();
    assert_eq!(w322_count, 1);

    let source = "\
transforms double(a Integer) Integer
    believe: result >= a
    from
        a * 2
";
    let (diags, _) = verify(source);
    assert!(codes(&diags).contains(&"E393"));
}

#[test]
fn test_proof_legacy_checks() {
    let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    ensures result % 2 == 0
    proof
        growth: result grows with a
    from
        a * 2
";
    let (diags, _) = verify(source);
    // One obligation for two ensures clauses.
    let err = diags.iter().find(|d| d.code == "E392").expect("E392");
    assert!(err.message.contains("1 obligation(s)"));
}

#[test]
fn test_chain_gap_surfaced_in_coverage() {
    let source = "\
transforms helper(a Integer) Integer
from
    a + 1

transforms trusted_helper(a Integer) Integer
    trusted \"audited\"
    from
        a + 2

transforms outer(a Integer) Integer
    ensures result >= a
    explain
        add helpers to a
    from
        helper(trusted_helper(a))
";
    let (_, coverage) = verify(source);
    assert_eq!(coverage.total_functions, 3);
    assert_eq!(coverage.with_ensures, 1);
    assert_eq!(coverage.chain_gaps.len(), 1);
    assert_eq!(coverage.chain_gaps[0].caller, "outer");
    assert_eq!(coverage.chain_gaps[0].callee, "helper");
}

#[test]
fn test_contract_structure_warnings() {
    let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    from
        a * 2
";
    let (diags, _) = verify(source);
    assert!(codes(&diags).contains(&"W323"));
    assert!(codes(&diags).contains(&"W324"));
}
