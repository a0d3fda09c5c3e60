//! Pipeline orchestration: source → tokens → AST → resolution →
//! typed AST → contract verification → C.
//!
//! Each stage appends to the diagnostics list and continues as far
//! as possible; a stage that produced an error stops later stages
//! for the module. Warnings never stop anything.

use thiserror::Error;

use crate::codegen::{self, CUnit};
use crate::diagnostic::{has_errors, Diagnostic, Files};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::semantics::check_module;
use crate::source::Source;
use crate::verifier::{verify_module, CnlVocabulary, CoverageSummary};

/// Fatal, non-diagnostic failures: the pipeline aborts.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to read source file: {0}")]
    SourceLoad(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Extra `[explain]` operation verbs.
    pub explain_operations: Vec<String>,
    /// Extra `[explain]` connector words.
    pub explain_connectors: Vec<String>,
}

pub struct CompileOutcome {
    pub diagnostics: Vec<Diagnostic>,
    pub coverage: Option<CoverageSummary>,
    pub c_unit: Option<CUnit>,
}

impl CompileOutcome {
    pub fn success(&self) -> bool {
        !has_errors(&self.diagnostics)
    }
}

/// Run the front-end and, when requested and error-free, the C
/// emitter over a single source buffer.
pub fn compile(
    source: &Source,
    files: &mut Files,
    options: &CompileOptions,
    emit_c: bool,
) -> CompileOutcome {
    let file = files.add(source);
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    // Lex.
    let (tokens, lex_errors) = Lexer::new(file, &source.text).lex();
    let lex_failed = !lex_errors.is_empty();
    diagnostics.extend(lex_errors.into_iter().map(|e| e.into_diagnostic()));
    if lex_failed {
        return CompileOutcome {
            diagnostics,
            coverage: None,
            c_unit: None,
        };
    }

    // Parse.
    let (module, parse_errors) = Parser::new(&tokens).parse();
    let parse_failed = !parse_errors.is_empty();
    diagnostics.extend(parse_errors.into_iter().map(|e| e.into_diagnostic()));
    if parse_failed {
        return CompileOutcome {
            diagnostics,
            coverage: None,
            c_unit: None,
        };
    }

    // Resolve.
    let mut resolution = Resolver::new().resolve(&module);
    let resolve_failed = has_errors(&resolution.diagnostics);
    diagnostics.append(&mut resolution.diagnostics);
    if resolve_failed {
        return CompileOutcome {
            diagnostics,
            coverage: None,
            c_unit: None,
        };
    }

    // Type and verb check.
    let (typed, check_diags) = check_module(&module, &mut resolution);
    let check_failed = has_errors(&check_diags);
    diagnostics.extend(check_diags);
    if check_failed {
        return CompileOutcome {
            diagnostics,
            coverage: None,
            c_unit: None,
        };
    }

    // Contracts and proofs.
    let vocab = CnlVocabulary {
        operations: options.explain_operations.clone(),
        connectors: options.explain_connectors.clone(),
    };
    let (verify_diags, coverage) = verify_module(&module, &resolution, &typed, vocab);
    let verify_failed = has_errors(&verify_diags);
    diagnostics.extend(verify_diags);
    if verify_failed {
        return CompileOutcome {
            diagnostics,
            coverage: Some(coverage),
            c_unit: None,
        };
    }

    let c_unit = if emit_c {
        Some(codegen::emit(&module, &resolution, &typed))
    } else {
        None
    };

    CompileOutcome {
        diagnostics,
        coverage: Some(coverage),
        c_unit,
    }
}

/// Load a file and compile it.
pub fn compile_file(
    path: &str,
    files: &mut Files,
    options: &CompileOptions,
    emit_c: bool,
) -> Result<CompileOutcome, DriverError> {
    let source = Source::read(path)?;
    Ok(compile(&source, files, options, emit_c))
}

/// Human-readable coverage lines for `prove check`.
pub fn render_coverage(coverage: &CoverageSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "contracts: {}/{} functions carry ensures",
        coverage.with_ensures, coverage.total_functions
    )];
    for gap in &coverage.chain_gaps {
        lines.push(format!(
            "chain gap: '{}' calls '{}', which has no ensures and is not trusted",
            gap.caller, gap.callee
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_text(text: &str, emit: bool) -> CompileOutcome {
        let mut files = Files::new();
        let source = Source::from_str("test.prv", text);
        compile(&source, &mut files, &CompileOptions::default(), emit)
    }

    #[test]
    fn test_hello_world_compiles() {
        let outcome = compile_text(
            "main()!\nfrom\n    println(\"Hello from Prove!\")\n",
            true,
        );
        assert!(outcome.success(), "{:?}", outcome.diagnostics);
        let unit = outcome.c_unit.expect("emitted C");
        assert!(unit.source.contains("int main(int argc, char **argv)"));
        assert!(unit
            .source
            .contains("prove_println(prove_string_from_cstr(\"Hello from Prove!\"))"));
    }

    #[test]
    fn test_stage_gating_stops_after_parse_errors() {
        let outcome = compile_text("type is\n", true);
        assert!(!outcome.success());
        assert!(outcome.c_unit.is_none());
        // No cascading resolver diagnostics for the broken declaration.
        assert!(outcome.diagnostics.iter().all(|d| d.code.starts_with("E2")
            || d.code.starts_with("E1")
            || d.code.starts_with("E3")));
    }

    #[test]
    fn test_emission_is_deterministic() {
        let text = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
    Rect(w, h) => w * h

main()!
from
    x as Decimal = area(Circle(2.0))
    println(to_string(x))
";
        let first = compile_text(text, true);
        let second = compile_text(text, true);
        assert!(first.success(), "{:?}", first.diagnostics);
        assert_eq!(
            first.c_unit.expect("emitted").source,
            second.c_unit.expect("emitted").source
        );
    }
}
