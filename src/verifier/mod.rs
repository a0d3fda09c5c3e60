//! Contract and proof verification.
//!
//! Walks the typed AST and turns annotations into checked
//! obligations: `explain` blocks are parsed as controlled natural
//! language (strict when the function has `ensures`), legacy `proof`
//! blocks are checked for uniqueness and coverage, near-miss examples
//! for redundancy, and the call chain of every contracted function is
//! scanned for gaps.

pub mod cnl;

pub use cnl::CnlVocabulary;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ast::{
    AnnotationKind, Decl, ExplainRow, Expr, ExprKind, FunctionDef, Module, NearMiss,
    ProofObligation, Stmt, StmtKind,
};
use crate::diagnostic::Diagnostic;
use crate::lexer::Span;
use crate::resolver::{FnKind, FunctionKey, Resolution};
use crate::semantics::TypedModule;
use cnl::{expected_shape, is_code_shaped, parse_row, ContractShape, ParsedRow};

/// A contracted function calling an uncontracted, untrusted callee.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainGap {
    pub caller: String,
    pub callee: String,
    pub span: Span,
}

/// Summary printed by `prove check`.
#[derive(Debug, Default)]
pub struct CoverageSummary {
    pub total_functions: usize,
    pub with_ensures: usize,
    pub chain_gaps: Vec<ChainGap>,
}

pub struct Verifier<'a> {
    res: &'a Resolution,
    typed: &'a TypedModule,
    vocab: CnlVocabulary,
    /// Declaration-span index into the module's function defs, used
    /// to read a callee's ensures clauses from its signature.
    defs: HashMap<Span, &'a FunctionDef>,
    diagnostics: Vec<Diagnostic>,
    coverage: CoverageSummary,
}

pub fn verify_module(
    module: &Module,
    res: &Resolution,
    typed: &TypedModule,
    vocab: CnlVocabulary,
) -> (Vec<Diagnostic>, CoverageSummary) {
    let mut defs: HashMap<Span, &FunctionDef> = HashMap::new();
    for decl in &module.declarations {
        if let Decl::Function(fd) = decl {
            defs.insert(fd.span, fd);
        }
    }
    let mut verifier = Verifier {
        res,
        typed,
        vocab,
        defs,
        diagnostics: Vec::new(),
        coverage: CoverageSummary::default(),
    };
    for decl in &module.declarations {
        if let Decl::Function(fd) = decl {
            verifier.verify_function(fd);
        }
    }
    (verifier.diagnostics, verifier.coverage)
}

impl<'a> Verifier<'a> {
    fn error(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics
            .push(Diagnostic::warning(code, message, span));
    }

    fn verify_function(&mut self, fd: &FunctionDef) {
        self.coverage.total_functions += 1;
        let has_ensures = fd.ensures().next().is_some();
        if has_ensures {
            self.coverage.with_ensures += 1;
        }

        self.check_believe(fd, has_ensures);
        self.check_near_misses(fd);
        self.check_explain(fd, has_ensures);
        self.check_proof(fd, has_ensures);

        if has_ensures && !fd.is_trusted() {
            self.check_chain(fd);
        }

        // Companion warnings on contract structure.
        if has_ensures && fd.requires().next().is_none() {
            self.warning(
                "W324",
                format!("function '{}' has ensures but no requires", fd.name),
                fd.span,
            );
        }
        if has_ensures && fd.explain().is_none() && !fd.is_trusted() {
            self.warning(
                "W323",
                format!("function '{}' has ensures but no explain", fd.name),
                fd.span,
            );
        }
        if !has_ensures && fd.explain().is_some() {
            self.warning(
                "W325",
                format!("function '{}' has explain but no ensures", fd.name),
                fd.span,
            );
        }
    }

    fn check_believe(&mut self, fd: &FunctionDef, has_ensures: bool) {
        let believes: Vec<Span> = fd
            .annotations
            .iter()
            .filter(|a| matches!(a.kind, AnnotationKind::Believe(_)))
            .map(|a| a.span)
            .collect();
        if !has_ensures {
            for span in believes {
                self.error(
                    "E393",
                    format!("function '{}' has believe but no ensures", fd.name),
                    span,
                );
            }
        }
    }

    fn check_near_misses(&mut self, fd: &FunctionDef) {
        let misses: Vec<&NearMiss> = fd
            .annotations
            .iter()
            .filter_map(|a| match &a.kind {
                AnnotationKind::NearMiss(nm) => Some(nm),
                _ => None,
            })
            .collect();
        for (i, nm) in misses.iter().enumerate() {
            if misses[..i].iter().any(|prev| exprs_equal(&prev.input, &nm.input)) {
                self.warning("W322", "duplicate near-miss input", nm.span);
            }
        }
    }

    // ── explain ──────────────────────────────────────────────────

    fn check_explain(&mut self, fd: &FunctionDef, strict: bool) {
        let Some((rows, block_span)) = fd.explain() else {
            return;
        };
        let rows: Vec<ExplainRow> = rows.to_vec();

        if strict {
            let statements = count_top_level_statements(&fd.body);
            if rows.len() != statements {
                self.error(
                    "E390",
                    format!(
                        "explain has {} row(s) but the body has {} top-level statement(s)",
                        rows.len(),
                        statements
                    ),
                    block_span,
                );
            }
        }

        // Duplicate rows are rejected in either mode.
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for row in &rows {
            if !seen.insert(row.text.as_str()) {
                self.error("E391", "duplicate explain row", row.span);
            }
        }

        let known = self.known_references(fd);
        let called = self.called_functions(fd);

        for row in &rows {
            let parsed = parse_row(&row.text, &self.vocab);
            if strict {
                if let Some(unknown) = &parsed.unknown_operation {
                    self.error(
                        "E394",
                        format!("unknown explain operation '{}'", unknown),
                        row.span,
                    );
                }
                // Prose words pass through; code-shaped words must
                // resolve to a parameter, local, field chain, or
                // `result`.
                for reference in &parsed.references {
                    if is_code_shaped(reference) && !reference_known(reference, &known) {
                        self.error(
                            "E392",
                            format!("explain references unknown name '{}'", reference),
                            row.span,
                        );
                    }
                }
            } else {
                // Loose mode: only dotted chains are checked for
                // existence.
                for reference in parsed.references.iter().filter(|r| r.contains('.')) {
                    if !reference_known(reference, &known) {
                        self.error(
                            "E392",
                            format!("explain references unknown name '{}'", reference),
                            row.span,
                        );
                    }
                }
            }

            self.check_operation_claim(&parsed, &called, row.span);
        }
    }

    /// If a row's operation names a called function, the callee's own
    /// ensures clauses must match the operation's known contract
    /// shape.
    fn check_operation_claim(
        &mut self,
        parsed: &ParsedRow,
        called: &HashMap<String, FunctionKey>,
        span: Span,
    ) {
        let Some(operation) = &parsed.operation else {
            return;
        };
        let Some(shape) = expected_shape(operation) else {
            return;
        };
        let Some(key) = called.get(operation) else {
            return;
        };
        let Some(sig) = self.res.table.function(key) else {
            return;
        };
        if !sig.has_ensures || !matches!(sig.kind, FnKind::User) {
            return;
        }

        // The contract shapes are checked against the callee's
        // declared ensures expressions.
        let ensures = self.ensures_of(key);
        let compatible = ensures.iter().any(|e| shape_matches(e, shape, sig));
        if !compatible {
            self.warning(
                "W326",
                format!(
                    "explain claims '{}' but '{}' declares no matching contract",
                    operation, sig.name
                ),
                span,
            );
        }
    }

    fn ensures_of(&self, key: &FunctionKey) -> Vec<Expr> {
        // Ensures clauses live on the AST; the signature's span ties
        // the two together.
        let Some(sig) = self.res.table.function(key) else {
            return Vec::new();
        };
        match self.defs.get(&sig.span) {
            Some(fd) => fd.ensures().cloned().collect(),
            None => Vec::new(),
        }
    }

    // ── proof (legacy) ───────────────────────────────────────────

    fn check_proof(&mut self, fd: &FunctionDef, has_ensures: bool) {
        let Some((obligations, block_span)) = fd.proof() else {
            return;
        };
        let obligations: Vec<ProofObligation> = obligations.to_vec();

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for obl in &obligations {
            if !seen.insert(obl.name.as_str()) {
                self.error(
                    "E391",
                    format!("duplicate proof obligation name '{}'", obl.name),
                    obl.span,
                );
            }
        }

        let ensures_count = fd.ensures().count();
        if has_ensures && obligations.len() < ensures_count {
            self.error(
                "E392",
                format!(
                    "proof has {} obligation(s) but {} ensures clause(s)",
                    obligations.len(),
                    ensures_count
                ),
                block_span,
            );
        }

        // Each obligation should mention at least one concept: a
        // parameter, a local, the function name, or `result`.
        let mut concepts: BTreeSet<String> = BTreeSet::new();
        concepts.insert(fd.name.clone());
        concepts.insert("result".to_string());
        for p in &fd.params {
            concepts.insert(p.name.clone());
        }
        collect_locals(&fd.body, &mut concepts);

        for obl in &obligations {
            let text = obl.text.to_ascii_lowercase();
            if !concepts.iter().any(|c| text.contains(&c.to_ascii_lowercase())) {
                self.warning(
                    "W321",
                    format!(
                        "proof obligation '{}' doesn't reference any function concepts",
                        obl.name
                    ),
                    obl.span,
                );
            }
        }
    }

    // ── Verification chain ───────────────────────────────────────

    fn check_chain(&mut self, fd: &FunctionDef) {
        let mut gap_keys: HashSet<FunctionKey> = HashSet::new();
        let mut spans: Vec<(FunctionKey, Span)> = Vec::new();
        collect_call_spans(&fd.body, self.typed, &mut spans);
        for (key, span) in spans {
            let Some(sig) = self.res.table.function(&key) else {
                continue;
            };
            if !matches!(sig.kind, FnKind::User) {
                continue;
            }
            if sig.has_ensures || sig.trusted {
                continue;
            }
            if gap_keys.insert(key.clone()) {
                self.coverage.chain_gaps.push(ChainGap {
                    caller: fd.name.clone(),
                    callee: sig.name.clone(),
                    span,
                });
            }
        }
    }

    // ── Reference helpers ────────────────────────────────────────

    fn known_references(&self, fd: &FunctionDef) -> BTreeSet<String> {
        let mut known: BTreeSet<String> = BTreeSet::new();
        known.insert("result".to_string());
        known.insert(fd.name.clone());
        for p in &fd.params {
            known.insert(p.name.clone());
        }
        collect_locals(&fd.body, &mut known);
        // Record fields are addressable through dotted chains.
        for (_, ty) in self.res.table.all_types() {
            if let crate::semantics::types::Type::Record { fields, .. } = ty {
                for (fname, _) in fields.iter() {
                    known.insert(fname.clone());
                }
            }
        }
        known
    }

    fn called_functions(&self, fd: &FunctionDef) -> HashMap<String, FunctionKey> {
        let mut spans: Vec<(FunctionKey, Span)> = Vec::new();
        collect_call_spans(&fd.body, self.typed, &mut spans);
        spans
            .into_iter()
            .map(|(key, _)| (key.name.clone(), key))
            .collect()
    }
}

/// A reference is known when it is a parameter, local, `result`, the
/// function name, or a dotted chain whose head is known.
fn reference_known(reference: &str, known: &BTreeSet<String>) -> bool {
    if known.contains(reference) {
        return true;
    }
    if let Some(head) = reference.split('.').next() {
        return known.contains(head);
    }
    false
}

/// Top-level statement counting for strict explain mode: a var-decl,
/// an assignment, or the terminal expression each count as one; an
/// implicit match counts one per arm.
fn count_top_level_statements(body: &[Stmt]) -> usize {
    body.iter()
        .map(|stmt| match &stmt.kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Match { subject: None, arms },
                ..
            }) => arms.len(),
            _ => 1,
        })
        .sum()
}

fn collect_locals(body: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::VarDecl { name, value, .. } => {
                out.insert(name.clone());
                collect_locals_expr(value, out);
            }
            StmtKind::Assign { value, .. } => collect_locals_expr(value, out),
            StmtKind::Expr(expr) => collect_locals_expr(expr, out),
        }
    }
}

fn collect_locals_expr(expr: &Expr, out: &mut BTreeSet<String>) {
    if let ExprKind::Match { arms, .. } = &expr.kind {
        for arm in arms {
            collect_pattern_names(&arm.pattern, out);
            collect_locals(&arm.body, out);
        }
    }
}

fn collect_pattern_names(pattern: &crate::ast::Pattern, out: &mut BTreeSet<String>) {
    match pattern {
        crate::ast::Pattern::Binding { name, .. } => {
            out.insert(name.clone());
        }
        crate::ast::Pattern::Variant { fields, .. } => {
            for f in fields {
                collect_pattern_names(f, out);
            }
        }
        _ => {}
    }
}

/// Gather every resolved call target inside a body, in source order.
fn collect_call_spans(body: &[Stmt], typed: &TypedModule, out: &mut Vec<(FunctionKey, Span)>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::VarDecl { value, .. } | StmtKind::Assign { value, .. } => {
                collect_call_spans_expr(value, typed, out);
            }
            StmtKind::Expr(expr) => collect_call_spans_expr(expr, typed, out),
        }
    }
}

fn collect_call_spans_expr(expr: &Expr, typed: &TypedModule, out: &mut Vec<(FunctionKey, Span)>) {
    if let Some(key) = typed.call_targets.get(&expr.span) {
        out.push((key.clone(), expr.span));
    }
    match &expr.kind {
        ExprKind::Binary { left, right, .. } => {
            collect_call_spans_expr(left, typed, out);
            collect_call_spans_expr(right, typed, out);
        }
        ExprKind::Range { lo, hi } => {
            collect_call_spans_expr(lo, typed, out);
            collect_call_spans_expr(hi, typed, out);
        }
        ExprKind::Unary { operand, .. } => collect_call_spans_expr(operand, typed, out),
        ExprKind::Call { func, args } => {
            collect_call_spans_expr(func, typed, out);
            for arg in args {
                collect_call_spans_expr(arg, typed, out);
            }
        }
        ExprKind::Field { obj, .. } => collect_call_spans_expr(obj, typed, out),
        ExprKind::Index { obj, index } => {
            collect_call_spans_expr(obj, typed, out);
            collect_call_spans_expr(index, typed, out);
        }
        ExprKind::Pipe { left, right } => {
            collect_call_spans_expr(left, typed, out);
            collect_call_spans_expr(right, typed, out);
        }
        ExprKind::FailProp(inner) => collect_call_spans_expr(inner, typed, out),
        ExprKind::Lambda { body, .. } => collect_call_spans_expr(body, typed, out),
        ExprKind::Valid { args, .. } => {
            if let Some(args) = args {
                for arg in args {
                    collect_call_spans_expr(arg, typed, out);
                }
            }
        }
        ExprKind::Match { subject, arms } => {
            if let Some(subject) = subject {
                collect_call_spans_expr(subject, typed, out);
            }
            for arm in arms {
                collect_call_spans(&arm.body, typed, out);
            }
        }
        ExprKind::If {
            condition,
            then_body,
            else_body,
        } => {
            collect_call_spans_expr(condition, typed, out);
            collect_call_spans(then_body, typed, out);
            collect_call_spans(else_body, typed, out);
        }
        ExprKind::Paren(inner) => collect_call_spans_expr(inner, typed, out),
        ExprKind::StrInterp(parts) | ExprKind::List(parts) => {
            for part in parts {
                collect_call_spans_expr(part, typed, out);
            }
        }
        ExprKind::Comptime(stmts) => collect_call_spans(stmts, typed, out),
        _ => {}
    }
}

/// Structural equality for near-miss inputs, ignoring spans.
fn exprs_equal(a: &Expr, b: &Expr) -> bool {
    match (&a.kind, &b.kind) {
        (ExprKind::Int(x), ExprKind::Int(y)) => x == y,
        (ExprKind::Dec(x), ExprKind::Dec(y)) => x == y,
        (ExprKind::Bool(x), ExprKind::Bool(y)) => x == y,
        (ExprKind::Str(x), ExprKind::Str(y)) => x == y,
        (
            ExprKind::Unary {
                op: oa,
                operand: ia,
            },
            ExprKind::Unary {
                op: ob,
                operand: ib,
            },
        ) => oa == ob && exprs_equal(ia, ib),
        (ExprKind::List(xa), ExprKind::List(xb)) => {
            xa.len() == xb.len() && xa.iter().zip(xb).all(|(x, y)| exprs_equal(x, y))
        }
        _ => false,
    }
}

/// Shallow shape test of an ensures clause against a claimed
/// operation contract.
fn shape_matches(
    ensures: &Expr,
    shape: ContractShape,
    sig: &crate::resolver::FunctionSig,
) -> bool {
    match shape {
        ContractShape::MonotoneNonDecreasing => contains_comparison(ensures, "result", true),
        ContractShape::OutputShape => mentions(ensures, "result"),
        ContractShape::Commutative => {
            sig.param_names.len() >= 2
                && mentions(ensures, &sig.param_names[0])
                && mentions(ensures, &sig.param_names[1])
        }
    }
}

fn mentions(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Identifier(n) => n == name,
        ExprKind::Binary { left, right, .. } => mentions(left, name) || mentions(right, name),
        ExprKind::Unary { operand, .. } => mentions(operand, name),
        ExprKind::Call { func, args } => {
            mentions(func, name) || args.iter().any(|a| mentions(a, name))
        }
        ExprKind::Field { obj, .. } => mentions(obj, name),
        ExprKind::Paren(inner) => mentions(inner, name),
        ExprKind::Range { lo, hi } => mentions(lo, name) || mentions(hi, name),
        _ => false,
    }
}

fn contains_comparison(expr: &Expr, name: &str, non_decreasing: bool) -> bool {
    match &expr.kind {
        ExprKind::Binary { left, op, right } => {
            let cmp_ok = if non_decreasing {
                matches!(op, crate::ast::BinaryOp::Ge | crate::ast::BinaryOp::Gt)
            } else {
                op.is_comparison()
            };
            (cmp_ok && (mentions(left, name) || mentions(right, name)))
                || contains_comparison(left, name, non_decreasing)
                || contains_comparison(right, name, non_decreasing)
        }
        ExprKind::Paren(inner) => contains_comparison(inner, name, non_decreasing),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FileId;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::semantics::check_module;

    fn verify_source(text: &str) -> (Vec<Diagnostic>, CoverageSummary) {
        let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let (module, parse_errors) = Parser::new(&tokens).parse();
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        let mut res = Resolver::new().resolve(&module);
        let (typed, _) = check_module(&module, &mut res);
        verify_module(&module, &res, &typed, CnlVocabulary::default())
    }

    fn codes(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_strict_explain_row_count_mismatch_is_e390() {
        // Two explain rows against three top-level statements.
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
        let (diags, _) = verify_source(source);
        let err = diags.iter().find(|d| d.code == "E390").expect("E390");
        assert!(err.message.contains("2 row(s)"));
        assert!(err.message.contains("3 top-level statement(s)"));
    }

    #[test]
    fn test_strict_explain_matching_count_passes() {
        let source = "\
transforms clamp_to(x Integer, lo Integer, hi Integer) Integer
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
        let (diags, _) = verify_source(source);
        assert!(diags.iter().all(|d| d.code != "E390"), "{:?}", diags);
    }

    #[test]
    fn test_duplicate_explain_rows_are_e391() {
        let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    explain
        multiply a by two
        multiply a by two
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        // One row matches the single statement count check fails too,
        // but the duplicate must be reported on its own.
        assert!(codes(&diags).contains(&"E391"));
    }

    #[test]
    fn test_unknown_reference_is_e392() {
        let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    explain
        multiply bogus_value by two
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        assert!(codes(&diags).contains(&"E392"));
    }

    #[test]
    fn test_unknown_operation_is_e394() {
        let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    explain
        frobnicate a
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        assert!(codes(&diags).contains(&"E394"));
    }

    #[test]
    fn test_loose_mode_row_count_is_free() {
        let source = "\
transforms double(a Integer) Integer
    explain
        multiply a by two
        celebrate wildly
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        assert!(diags.iter().all(|d| d.code != "E390"), "{:?}", diags);
        assert!(diags.iter().all(|d| d.code != "E394"), "{:?}", diags);
    }

    #[test]
    fn test_believe_without_ensures_is_e393() {
        let source = "\
transforms double(a Integer) Integer
    believe: result >= a
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        assert!(codes(&diags).contains(&"E393"));
    }

    #[test]
    fn test_duplicate_near_miss_is_w322() {
        let source = "\
validates port(n Integer)
    near_miss: 0 => false
    near_miss: 0 => false
    from
        n >= 1 && n <= 65535
";
        let (diags, _) = verify_source(source);
        assert!(codes(&diags).contains(&"W322"));
    }

    #[test]
    fn test_proof_duplicate_names_and_coverage() {
        let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    ensures result % 2 == 0
    proof
        growth: result grows with a
        growth: result stays even
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        assert!(codes(&diags).contains(&"E391"));
    }

    #[test]
    fn test_proof_without_concepts_is_w321() {
        let source = "\
transforms double(a Integer) Integer
    ensures result >= a
    proof
        truth: obviously correct
    from
        a * 2
";
        let (diags, _) = verify_source(source);
        assert!(codes(&diags).contains(&"W321"));
    }

    #[test]
    fn test_chain_gap_reported_in_coverage() {
        let source = "\
transforms helper(a Integer) Integer
from
    a + 1

transforms outer(a Integer) Integer
    ensures result >= a
    explain
        add one to a
    from
        helper(a)
";
        let (_, coverage) = verify_source(source);
        assert_eq!(coverage.chain_gaps.len(), 1);
        assert_eq!(coverage.chain_gaps[0].callee, "helper");
    }

    #[test]
    fn test_trusted_callee_is_not_a_gap() {
        let source = "\
transforms helper(a Integer) Integer
    trusted \"verified by review\"
    from
        a + 1

transforms outer(a Integer) Integer
    ensures result >= a
    explain
        add one to a
    from
        helper(a)
";
        let (_, coverage) = verify_source(source);
        assert!(coverage.chain_gaps.is_empty());
    }

    #[test]
    fn test_implicit_match_counts_arms() {
        let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
    ensures result >= 0.0
    explain
        multiply r by itself
        multiply w by h
    from
        Circle(r) => 3.14 * r * r
        Rect(w, h) => w * h
";
        let (diags, _) = verify_source(source);
        assert!(diags.iter().all(|d| d.code != "E390"), "{:?}", diags);
    }
}
