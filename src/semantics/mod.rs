//! Type and verb checker for the Prove language.
//!
//! Bidirectional: expressions are checked against an expected type
//! where the context provides one (declarations, call arguments,
//! Boolean positions) and inferred otherwise. The expected type also
//! drives context-aware call resolution across verb variants.
//!
//! The checker annotates the AST through side tables: an expression
//! type per span, the selected function identity per call site, the
//! set of assignment sites that need a runtime refinement check, and
//! the monomorphization table.

pub mod format;
pub mod types;
pub mod unifier;

use std::collections::{HashMap, HashSet};

use crate::ast::{
    AnnotationKind, BinaryOp, ConstantDef, Decl, Expr, ExprKind, FunctionDef, MainDef, MatchArm,
    Module, Pattern, Stmt, StmtKind, UnaryOp, Verb,
};
use crate::diagnostic::Diagnostic;
use crate::lexer::Span;
use crate::monomorphize::MonoTable;
use crate::resolver::{FnKind, FunctionKey, FunctionSig, Resolution, SymbolKind};
use format::format_type;
use types::{boolean, decimal, integer, string, types_compatible, Type, VariantInfo};
use unifier::Unifier;

/// Side tables produced by a successful (or partial) check.
#[derive(Debug, Default)]
pub struct TypedModule {
    pub expr_types: HashMap<Span, Type>,
    pub call_targets: HashMap<Span, FunctionKey>,
    pub runtime_checks: HashSet<Span>,
    pub mono: MonoTable,
}

struct CurrentFn {
    key: FunctionKey,
    verb: Option<Verb>,
    can_fail: bool,
    return_type: Type,
    /// Scrutinee type for an implicit-match body.
    implicit_subject: Option<Type>,
}

/// A compile-time constant value, used for refinement evaluation.
#[derive(Debug, Clone, PartialEq)]
enum ConstValue {
    Int(i64),
    Dec(f64),
    Bool(bool),
    Str(String),
}

impl ConstValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(v) => Some(*v as f64),
            ConstValue::Dec(v) => Some(*v),
            _ => None,
        }
    }
}

pub struct Checker<'a> {
    res: &'a mut Resolution,
    diagnostics: Vec<Diagnostic>,
    typed: TypedModule,
    current: Option<CurrentFn>,
    comptime_depth: usize,
    lambda_allowed: bool,
    /// User-function call edges for the recursion post-pass.
    call_edges: Vec<(FunctionKey, FunctionKey)>,
    /// Direct self-calls: (caller key, argument expressions).
    self_calls: Vec<(FunctionKey, Vec<Expr>)>,
}

pub fn check_module(module: &Module, res: &mut Resolution) -> (TypedModule, Vec<Diagnostic>) {
    let mut checker = Checker {
        res,
        diagnostics: Vec::new(),
        typed: TypedModule::default(),
        current: None,
        comptime_depth: 0,
        lambda_allowed: false,
        call_edges: Vec::new(),
        self_calls: Vec::new(),
    };
    checker.run(module);
    (checker.typed, checker.diagnostics)
}

impl<'a> Checker<'a> {
    fn run(&mut self, module: &Module) {
        for decl in &module.declarations {
            match decl {
                Decl::Function(fd) => self.check_function(fd),
                Decl::Main(md) => self.check_main(md),
                Decl::Constant(cd) => self.check_constant(cd),
                _ => {}
            }
        }
        self.check_termination(module);
    }

    fn error(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics
            .push(Diagnostic::warning(code, message, span));
    }

    fn record_type(&mut self, span: Span, ty: Type) -> Type {
        self.typed.expr_types.insert(span, ty.clone());
        ty
    }

    // ── Declarations ─────────────────────────────────────────────

    fn signature_of(&self, fd: &FunctionDef) -> Option<FunctionSig> {
        self.res
            .table
            .candidates(&fd.name)
            .into_iter()
            .find(|s| s.verb == Some(fd.verb) && s.span == fd.span)
            .cloned()
    }

    fn check_function(&mut self, fd: &FunctionDef) {
        let sig = match self.signature_of(fd) {
            Some(sig) => sig,
            // Registration failed (duplicate identity); skip the body.
            None => return,
        };

        let implicit_subject = if fd.verb == Verb::Matches {
            match sig.param_types.first() {
                Some(ty) if matches!(ty.unwrap_refined(), Type::Algebraic { .. }) => {
                    Some(ty.clone())
                }
                Some(ty) if !ty.is_error() => {
                    self.error(
                        "E372",
                        format!(
                            "matches functions take an algebraic first parameter, got '{}'",
                            format_type(ty)
                        ),
                        fd.span,
                    );
                    None
                }
                _ => None,
            }
        } else if fd.verb == Verb::Inputs {
            sig.param_types
                .first()
                .filter(|ty| matches!(ty.unwrap_refined(), Type::Algebraic { .. }))
                .cloned()
        } else {
            None
        };

        self.current = Some(CurrentFn {
            key: sig.key(),
            verb: Some(fd.verb),
            can_fail: fd.can_fail,
            return_type: sig.return_type.clone(),
            implicit_subject,
        });

        let expected_body = self.body_expectation(&sig);
        let body_type = self.check_body(&fd.body, expected_body.as_ref());

        // Return type agreement. Failable functions may produce the
        // success type directly; the emitter wraps it.
        if !body_type.is_error() && !matches!(body_type, Type::Unit) {
            let ret = &sig.return_type;
            let mut ok = types_compatible(ret, &body_type);
            if !ok && fd.can_fail {
                if let Some(success) = ret.success_type() {
                    ok = types_compatible(success, &body_type);
                }
            }
            if !ok {
                self.error(
                    "E322",
                    format!(
                        "return type mismatch: expected '{}', got '{}'",
                        format_type(ret),
                        format_type(&body_type)
                    ),
                    fd.span,
                );
            }
        }

        self.check_contracts(fd, &sig);
        self.current = None;
    }

    /// The expected type for the body's terminal expression.
    fn body_expectation(&self, sig: &FunctionSig) -> Option<Type> {
        match &sig.return_type {
            Type::Unit | Type::Error => None,
            ret if sig.can_fail => ret.success_type().cloned().or_else(|| Some(ret.clone())),
            ret => Some(ret.clone()),
        }
    }

    fn check_main(&mut self, md: &MainDef) {
        let key = FunctionKey {
            verb: None,
            name: "main".to_string(),
            param_key: String::new(),
        };
        let return_type = self
            .res
            .table
            .function(&key)
            .map(|s| s.return_type.clone())
            .unwrap_or(Type::Unit);
        self.current = Some(CurrentFn {
            key,
            verb: None,
            can_fail: md.can_fail,
            return_type,
            implicit_subject: None,
        });
        self.check_body(&md.body, None);
        self.current = None;
    }

    fn check_constant(&mut self, cd: &ConstantDef) {
        let declared = cd.type_expr.is_some();
        let inferred = if declared {
            let expected = self
                .res
                .table
                .lookup(&cd.name)
                .map(|r| self.res.table.symbol(r.id).ty.clone())
                .unwrap_or(Type::Error);
            self.check_expr(&cd.value, Some(&expected));
            if !types_compatible(&expected, &self.type_of(&cd.value)) {
                self.error(
                    "E321",
                    format!(
                        "type mismatch: expected '{}', got '{}'",
                        format_type(&expected),
                        format_type(&self.type_of(&cd.value))
                    ),
                    cd.span,
                );
            }
            expected
        } else {
            self.infer_expr(&cd.value)
        };
        if !declared {
            if let Some(found) = self.res.table.lookup(&cd.name) {
                self.res.table.symbol_mut(found.id).ty = inferred;
            }
        }
    }

    fn type_of(&self, expr: &Expr) -> Type {
        self.typed
            .expr_types
            .get(&expr.span)
            .cloned()
            .unwrap_or(Type::Error)
    }

    // ── Contracts (type side only; obligations live in the verifier) ──

    fn check_contracts(&mut self, fd: &FunctionDef, sig: &FunctionSig) {
        for ann in &fd.annotations {
            match &ann.kind {
                AnnotationKind::Ensures(e) => self.expect_boolean_contract(e, "E380", "ensures"),
                AnnotationKind::Requires(e) => self.expect_boolean_contract(e, "E381", "requires"),
                AnnotationKind::Know(e) => self.expect_boolean_contract(e, "E384", "know"),
                AnnotationKind::Assume(e) => self.expect_boolean_contract(e, "E385", "assume"),
                AnnotationKind::Believe(e) => self.expect_boolean_contract(e, "E386", "believe"),
                AnnotationKind::Terminates(e) => {
                    let ty = self.infer_expr(e);
                    if !ty.is_error() && !ty.is_numeric() {
                        self.error(
                            "E383",
                            format!(
                                "terminates measure must be numeric, got '{}'",
                                format_type(&ty)
                            ),
                            e.span,
                        );
                    }
                }
                AnnotationKind::Satisfies(name) => {
                    if !self.res.networks.contains(name) {
                        self.error(
                            "E382",
                            format!("satisfies references undefined invariant network '{}'", name),
                            ann.span,
                        );
                    }
                }
                _ => {}
            }
        }
        let _ = sig;
    }

    fn expect_boolean_contract(&mut self, expr: &Expr, code: &str, what: &str) {
        let ty = self.check_expr(expr, Some(&boolean()));
        if !ty.is_error() && !types_compatible(&boolean(), &ty) {
            self.error(
                code,
                format!(
                    "{} expression must be Boolean, got '{}'",
                    what,
                    format_type(&ty)
                ),
                expr.span,
            );
        }
    }

    // ── Bodies and statements ────────────────────────────────────

    fn check_body(&mut self, body: &[Stmt], expected_last: Option<&Type>) -> Type {
        let mut body_type = Type::Unit;
        for (i, stmt) in body.iter().enumerate() {
            let is_last = i == body.len() - 1;
            let expected = if is_last { expected_last } else { None };
            body_type = self.check_stmt(stmt, expected);
        }
        body_type
    }

    fn check_stmt(&mut self, stmt: &Stmt, expected: Option<&Type>) -> Type {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                type_expr,
                value,
            } => {
                if matches!(value.kind, ExprKind::Lambda { .. }) {
                    self.error(
                        "E364",
                        "lambdas may only be passed as function arguments",
                        value.span,
                    );
                }
                let declared = type_expr.is_some().then(|| {
                    self.res
                        .bindings
                        .get(&stmt.span)
                        .map(|id| self.res.table.symbol(*id).ty.clone())
                        .unwrap_or(Type::Error)
                });
                let inferred = match &declared {
                    Some(expected_ty) => {
                        let actual = self.check_expr(value, Some(expected_ty));
                        if !types_compatible(expected_ty, &actual) {
                            self.error(
                                "E321",
                                format!(
                                    "type mismatch: expected '{}', got '{}'",
                                    format_type(expected_ty),
                                    format_type(&actual)
                                ),
                                stmt.span,
                            );
                        }
                        expected_ty.clone()
                    }
                    None => self.infer_expr(value),
                };
                if declared.is_none() {
                    if let Some(id) = self.res.bindings.get(&stmt.span).copied() {
                        self.res.table.symbol_mut(id).ty = inferred;
                    }
                }
                let _ = name;
                Type::Unit
            }
            StmtKind::Assign { target, value } => {
                let sym = self
                    .res
                    .bindings
                    .get(&stmt.span)
                    .map(|id| self.res.table.symbol(*id).clone());
                match sym {
                    Some(sym) => {
                        if !sym.mutable
                            && matches!(sym.kind, SymbolKind::Local | SymbolKind::Parameter)
                        {
                            self.error(
                                "E323",
                                format!(
                                    "cannot assign to immutable binding '{}'; declare it with ':[Mutable]'",
                                    target
                                ),
                                stmt.span,
                            );
                        }
                        let actual = self.check_expr(value, Some(&sym.ty));
                        if !types_compatible(&sym.ty, &actual) {
                            self.error(
                                "E321",
                                format!(
                                    "type mismatch: expected '{}', got '{}'",
                                    format_type(&sym.ty),
                                    format_type(&actual)
                                ),
                                stmt.span,
                            );
                        }
                    }
                    None => {
                        // The resolver already reported E310.
                        self.infer_expr(value);
                    }
                }
                Type::Unit
            }
            StmtKind::Expr(expr) => self.check_expr(expr, expected),
        }
    }

    // ── Expressions ──────────────────────────────────────────────

    fn infer_expr(&mut self, expr: &Expr) -> Type {
        self.check_expr(expr, None)
    }

    fn check_expr(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        let lambda_allowed = std::mem::replace(&mut self.lambda_allowed, false);
        let ty = match &expr.kind {
            ExprKind::Int(_) => integer(),
            ExprKind::Dec(_) => decimal(),
            ExprKind::Bool(_) => boolean(),
            ExprKind::Str(_) | ExprKind::TripleStr(_) | ExprKind::RawStr(_) => string(),
            ExprKind::Regex(_) => string(),
            ExprKind::Char(_) => types::character(),
            ExprKind::StrInterp(parts) => {
                for part in parts {
                    self.infer_expr(part);
                }
                string()
            }
            ExprKind::List(elements) => self.infer_list(elements),
            ExprKind::Range { lo, hi } => {
                for side in [lo, hi] {
                    let ty = self.infer_expr(side);
                    if !ty.is_error() && !ty.is_numeric() {
                        self.error(
                            "E320",
                            format!("range bounds must be numeric, got '{}'", format_type(&ty)),
                            side.span,
                        );
                    }
                }
                Type::List(Box::new(integer()))
            }
            ExprKind::Identifier(name) => self.infer_identifier(expr, name, expected),
            ExprKind::TypeIdentifier(name) => self.infer_type_identifier(name),
            ExprKind::Binary { left, op, right } => self.infer_binary(expr, left, *op, right),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    let ty = self.check_expr(operand, Some(&boolean()));
                    if !ty.is_error() && !types_compatible(&boolean(), &ty) {
                        self.error(
                            "E320",
                            format!("logical not requires Boolean, got '{}'", format_type(&ty)),
                            operand.span,
                        );
                    }
                    boolean()
                }
                UnaryOp::Neg => {
                    let ty = self.infer_expr(operand);
                    if !ty.is_error() && !ty.is_numeric() {
                        self.error(
                            "E320",
                            format!("negation requires a numeric type, got '{}'", format_type(&ty)),
                            operand.span,
                        );
                    }
                    ty
                }
            },
            ExprKind::Call { func, args } => self.infer_call(expr, func, args, expected),
            ExprKind::Field { obj, field } => self.infer_field(expr, obj, field),
            ExprKind::Index { obj, index } => {
                let obj_ty = self.infer_expr(obj);
                let idx_ty = self.infer_expr(index);
                if !idx_ty.is_error() && !idx_ty.is_numeric() {
                    self.error(
                        "E320",
                        format!("index must be an Integer, got '{}'", format_type(&idx_ty)),
                        index.span,
                    );
                }
                match obj_ty.unwrap_refined() {
                    Type::List(inner) => (**inner).clone(),
                    Type::Primitive { name, .. } if name == "String" => types::character(),
                    Type::Error => Type::Error,
                    other => {
                        self.error(
                            "E320",
                            format!("cannot index into '{}'", format_type(other)),
                            obj.span,
                        );
                        Type::Error
                    }
                }
            }
            ExprKind::Pipe { left, right } => self.infer_pipe(expr, left, right, expected),
            ExprKind::FailProp(inner) => self.infer_fail_prop(expr, inner),
            ExprKind::Lambda { params, body } => {
                if !lambda_allowed {
                    self.error(
                        "E364",
                        "lambdas may only be passed as function arguments",
                        expr.span,
                    );
                }
                self.infer_lambda(expr, params, body, expected)
            }
            ExprKind::Valid { name, args } => self.infer_valid(expr, name, args),
            ExprKind::Match { subject, arms } => self.infer_match(expr, subject.as_deref(), arms),
            ExprKind::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.comptime_depth == 0 {
                    self.error(
                        "E367",
                        "if/else is only available inside comptime blocks; use match",
                        expr.span,
                    );
                }
                let cond_ty = self.check_expr(condition, Some(&boolean()));
                if !cond_ty.is_error() && !types_compatible(&boolean(), &cond_ty) {
                    self.error(
                        "E321",
                        format!(
                            "type mismatch: expected 'Boolean', got '{}'",
                            format_type(&cond_ty)
                        ),
                        condition.span,
                    );
                }
                let then_ty = self.check_body(then_body, expected);
                let else_ty = self.check_body(else_body, expected);
                if types_compatible(&then_ty, &else_ty) {
                    then_ty
                } else {
                    Type::Error
                }
            }
            ExprKind::Paren(inner) => self.check_expr(inner, expected),
            ExprKind::Comptime(stmts) => {
                self.comptime_depth += 1;
                let mut ty = Type::Unit;
                for stmt in stmts {
                    ty = self.check_stmt(stmt, None);
                }
                self.comptime_depth -= 1;
                ty
            }
        };

        // Refinement acceptance: statically check known values,
        // subsume narrower refinements, otherwise insert a runtime
        // check at this site.
        if let Some(Type::Refined {
            name, constraint, ..
        }) = expected.map(|t| t.clone()).as_ref()
        {
            if !ty.is_error() {
                self.check_refinement(expr, name, constraint, &ty);
            }
        }

        self.record_type(expr.span, ty)
    }

    fn infer_list(&mut self, elements: &[Expr]) -> Type {
        if elements.is_empty() {
            return Type::List(Box::new(Type::Var("T".to_string())));
        }
        let first = self.infer_expr(&elements[0]);
        for elem in &elements[1..] {
            let ty = self.infer_expr(elem);
            if !ty.is_error() && !first.is_error() && !types_compatible(&first, &ty) {
                self.error(
                    "E321",
                    format!(
                        "list elements must share a type: expected '{}', got '{}'",
                        format_type(&first),
                        format_type(&ty)
                    ),
                    elem.span,
                );
            }
        }
        Type::List(Box::new(first))
    }

    fn infer_identifier(&mut self, expr: &Expr, name: &str, expected: Option<&Type>) -> Type {
        if let Some(id) = self.res.bindings.get(&expr.span).copied() {
            return self.res.table.symbol(id).ty.clone();
        }
        // A bare reference to a function resolves through the
        // verb-dispatched table.
        let candidates = self.res.table.candidates(name);
        if candidates.is_empty() {
            return Type::Error;
        }
        let chosen: Option<&FunctionSig> = if candidates.len() == 1 {
            Some(candidates[0])
        } else if let Some(Type::Function { params, ret, .. }) = expected {
            candidates
                .iter()
                .find(|s| {
                    s.param_types.len() == params.len()
                        && types_compatible(&s.return_type, ret)
                })
                .copied()
        } else {
            None
        };
        match chosen {
            Some(sig) => Type::Function {
                verb: sig.verb,
                params: sig.param_types.clone(),
                ret: Box::new(sig.return_type.clone()),
                can_fail: sig.can_fail,
            },
            None => {
                let names: Vec<String> = candidates
                    .iter()
                    .map(|s| describe_candidate(s))
                    .collect();
                self.error(
                    "E332",
                    format!(
                        "ambiguous reference to '{}'; candidates: {}",
                        name,
                        names.join(", ")
                    ),
                    expr.span,
                );
                Type::Error
            }
        }
    }

    fn infer_type_identifier(&mut self, name: &str) -> Type {
        if let Some(ty) = self.res.table.resolve_type(name) {
            return ty.clone();
        }
        // A bare variant constructor reference.
        let candidates = self.res.table.candidates(name);
        if let Some(sig) = candidates.first() {
            return sig.return_type.clone();
        }
        Type::Error
    }

    fn infer_binary(&mut self, expr: &Expr, left: &Expr, op: BinaryOp, right: &Expr) -> Type {
        if op.is_logical() {
            for side in [left, right] {
                let ty = self.check_expr(side, Some(&boolean()));
                if !ty.is_error() && !types_compatible(&boolean(), &ty) {
                    self.error(
                        "E320",
                        format!(
                            "logical operator requires Boolean operands, got '{}'",
                            format_type(&ty)
                        ),
                        side.span,
                    );
                }
            }
            return boolean();
        }

        let lt = self.infer_expr(left);
        let rt = self.infer_expr(right);
        if lt.is_error() || rt.is_error() {
            return if op.is_comparison() { boolean() } else { Type::Error };
        }

        if op.is_comparison() {
            if !types_compatible(&lt, &rt) && numeric_widen(&lt, &rt).is_none() {
                self.error(
                    "E320",
                    format!(
                        "cannot compare '{}' with '{}'",
                        format_type(&lt),
                        format_type(&rt)
                    ),
                    expr.span,
                );
            }
            return boolean();
        }

        // Arithmetic. String concatenation rides on `+`; mixed
        // numerics widen Integer → Decimal → Float.
        if op == BinaryOp::Add && lt.is_string() {
            if !rt.is_string() {
                self.error(
                    "E320",
                    format!("cannot concatenate String with '{}'", format_type(&rt)),
                    right.span,
                );
            }
            return string();
        }
        if let Some(wide) = numeric_widen(&lt, &rt) {
            return wide;
        }
        if !types_compatible(&lt, &rt) {
            self.error(
                "E320",
                format!(
                    "type mismatch in binary expression: '{}' and '{}'",
                    format_type(&lt),
                    format_type(&rt)
                ),
                expr.span,
            );
            return Type::Error;
        }
        lt
    }

    fn infer_field(&mut self, expr: &Expr, obj: &Expr, field: &str) -> Type {
        let obj_ty = self.infer_expr(obj);
        match obj_ty.unwrap_refined() {
            Type::Record { fields, .. } => {
                match fields.iter().find(|(n, _)| n == field) {
                    Some((_, ty)) => ty.clone(),
                    None => {
                        self.error(
                            "E340",
                            format!(
                                "no field '{}' on type '{}'",
                                field,
                                format_type(&obj_ty)
                            ),
                            expr.span,
                        );
                        Type::Error
                    }
                }
            }
            Type::Error | Type::Var(_) | Type::Applied { .. } => Type::Error,
            other => {
                self.error(
                    "E340",
                    format!("no field '{}' on type '{}'", field, format_type(other)),
                    expr.span,
                );
                Type::Error
            }
        }
    }

    // ── Calls and context-aware resolution ───────────────────────

    fn infer_call(
        &mut self,
        expr: &Expr,
        func: &Expr,
        args: &[Expr],
        expected: Option<&Type>,
    ) -> Type {
        match &func.kind {
            ExprKind::Identifier(name) => {
                // A local binding holding a function value shadows the
                // function table.
                if let Some(id) = self.res.bindings.get(&func.span).copied() {
                    let ty = self.res.table.symbol(id).ty.clone();
                    if let Type::Function { params, ret, .. } = ty {
                        return self.check_args_against(&params, args, expr.span, None, *ret);
                    }
                }
                let name = name.clone();
                self.resolve_and_check_call(expr.span, &name, args, expected)
            }
            ExprKind::TypeIdentifier(name) => {
                let name = name.clone();
                self.infer_constructor_call(expr, &name, args)
            }
            ExprKind::Field { obj, field } => {
                // Namespaced call through an imported module.
                if matches!(obj.kind, ExprKind::TypeIdentifier(_)) {
                    let field = field.clone();
                    return self.resolve_and_check_call(expr.span, &field, args, expected);
                }
                let fty = self.infer_expr(func);
                self.check_callable(fty, args, expr.span)
            }
            _ => {
                let fty = self.infer_expr(func);
                self.check_callable(fty, args, expr.span)
            }
        }
    }

    fn check_callable(&mut self, fty: Type, args: &[Expr], span: Span) -> Type {
        match fty {
            Type::Function { params, ret, .. } => {
                self.check_args_against(&params, args, span, None, *ret)
            }
            Type::Error => {
                for arg in args {
                    self.infer_expr(arg);
                }
                Type::Error
            }
            other => {
                self.error(
                    "E333",
                    format!("expression of type '{}' is not callable", format_type(&other)),
                    span,
                );
                for arg in args {
                    self.infer_expr(arg);
                }
                Type::Error
            }
        }
    }

    /// Context-aware call resolution, §4.3 rules applied in order.
    fn resolve_and_check_call(
        &mut self,
        call_span: Span,
        name: &str,
        args: &[Expr],
        expected: Option<&Type>,
    ) -> Type {
        let candidates: Vec<FunctionSig> = self
            .res
            .table
            .candidates_with_arity(name, args.len())
            .into_iter()
            .cloned()
            .collect();
        if candidates.is_empty() {
            for arg in args {
                self.infer_expr(arg);
            }
            return Type::Error;
        }

        let sig = if candidates.len() == 1 {
            candidates.into_iter().next().expect("one candidate")
        } else {
            match self.select_candidate(call_span, name, &candidates, args, expected) {
                Some(sig) => sig,
                None => {
                    for arg in args {
                        self.infer_expr(arg);
                    }
                    return Type::Error;
                }
            }
        };

        self.check_call_with_sig(call_span, &sig, args)
    }

    fn select_candidate(
        &mut self,
        call_span: Span,
        name: &str,
        candidates: &[FunctionSig],
        args: &[Expr],
        expected: Option<&Type>,
    ) -> Option<FunctionSig> {
        // Rule 1: Boolean context selects the validates variant.
        if expected.map(|t| t.is_boolean()).unwrap_or(false) {
            let validates: Vec<&FunctionSig> = candidates
                .iter()
                .filter(|s| s.verb == Some(Verb::Validates))
                .collect();
            if validates.len() == 1 {
                return Some(validates[0].clone());
            }
        }

        // Rule 2: the expected type equals exactly one return type.
        if let Some(expected) = expected {
            if !expected.is_error() {
                let matching: Vec<&FunctionSig> = candidates
                    .iter()
                    .filter(|s| {
                        !s.return_type.is_error() && types_compatible(expected, &s.return_type)
                    })
                    .collect();
                if matching.len() == 1 {
                    return Some(matching[0].clone());
                }
            }
        }

        // Rule 3: keep candidates whose parameters unify with the
        // argument expressions.
        let arg_types: Vec<Option<Type>> = args.iter().map(|a| self.quick_type(a)).collect();
        let survivors: Vec<&FunctionSig> = candidates
            .iter()
            .filter(|s| {
                s.param_types.len() == args.len()
                    && s.param_types.iter().zip(&arg_types).all(|(p, a)| match a {
                        Some(a) => {
                            let mut unifier = Unifier::new();
                            unifier.unify(p, a).is_ok()
                        }
                        None => true,
                    })
            })
            .collect();
        let survivors: Vec<&FunctionSig> = if survivors.is_empty() {
            candidates.iter().collect()
        } else {
            survivors
        };
        if survivors.len() == 1 {
            return Some(survivors[0].clone());
        }

        // Rule 4: prefer transforms, validates, reads, creates,
        // matches, inputs, outputs, in that order.
        let best_rank = survivors
            .iter()
            .map(|s| verb_rank(s))
            .min()
            .expect("survivors is nonempty");
        let preferred: Vec<&&FunctionSig> = survivors
            .iter()
            .filter(|s| verb_rank(s) == best_rank)
            .collect();
        if preferred.len() == 1 {
            return Some((*preferred[0]).clone());
        }

        // Rule 5: ambiguity.
        let listed: Vec<String> = survivors.iter().map(|s| describe_candidate(s)).collect();
        self.error(
            "E332",
            format!(
                "ambiguous call to '{}'; candidates: {}",
                name,
                listed.join(", ")
            ),
            call_span,
        );
        None
    }

    /// A cheap, diagnostic-free type approximation used only to
    /// filter resolution candidates.
    fn quick_type(&self, expr: &Expr) -> Option<Type> {
        match &expr.kind {
            ExprKind::Int(_) => Some(integer()),
            ExprKind::Dec(_) => Some(decimal()),
            ExprKind::Bool(_) => Some(boolean()),
            ExprKind::Str(_) | ExprKind::TripleStr(_) | ExprKind::RawStr(_)
            | ExprKind::Regex(_) | ExprKind::StrInterp(_) => Some(string()),
            ExprKind::Char(_) => Some(types::character()),
            ExprKind::Identifier(_) => self
                .res
                .bindings
                .get(&expr.span)
                .map(|id| self.res.table.symbol(*id).ty.clone()),
            ExprKind::Paren(inner) => self.quick_type(inner),
            ExprKind::Binary { op, left, .. } => {
                if op.is_comparison() || op.is_logical() {
                    Some(boolean())
                } else {
                    self.quick_type(left)
                }
            }
            ExprKind::Unary { op: UnaryOp::Not, .. } => Some(boolean()),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => self.quick_type(operand),
            ExprKind::Call { func, .. } => {
                if let ExprKind::Identifier(name) = &func.kind {
                    let sigs = self.res.table.candidates(name);
                    if sigs.len() == 1 {
                        return Some(sigs[0].return_type.clone());
                    }
                }
                None
            }
            ExprKind::FailProp(inner) => self
                .quick_type(inner)
                .and_then(|t| t.success_type().cloned()),
            _ => None,
        }
    }

    fn check_call_with_sig(&mut self, call_span: Span, sig: &FunctionSig, args: &[Expr]) -> Type {
        // Imported signatures are unknown; check nothing.
        if matches!(sig.kind, FnKind::Imported) {
            for arg in args {
                self.infer_expr(arg);
            }
            return Type::Error;
        }

        self.check_purity_of_call(sig, call_span);
        self.record_call_edge(sig, args);

        if sig.param_types.len() != args.len() {
            self.error(
                "E330",
                format!(
                    "wrong number of arguments: expected {}, got {}",
                    sig.param_types.len(),
                    args.len()
                ),
                call_span,
            );
            for arg in args {
                self.infer_expr(arg);
            }
            return sig.return_type.clone();
        }

        self.typed.call_targets.insert(call_span, sig.key());
        self.check_args_against(
            &sig.param_types.clone(),
            args,
            call_span,
            Some(sig),
            sig.return_type.clone(),
        )
    }

    fn check_args_against(
        &mut self,
        params: &[Type],
        args: &[Expr],
        call_span: Span,
        sig: Option<&FunctionSig>,
        ret: Type,
    ) -> Type {
        if params.len() != args.len() {
            self.error(
                "E330",
                format!(
                    "wrong number of arguments: expected {}, got {}",
                    params.len(),
                    args.len()
                ),
                call_span,
            );
            for arg in args {
                self.infer_expr(arg);
            }
            return ret;
        }

        let mut unifier = Unifier::new();
        for (param, arg) in params.iter().zip(args) {
            let expected = unifier.apply(param);
            self.lambda_allowed = true;
            let actual = self.check_expr(arg, Some(&expected));
            self.lambda_allowed = false;
            if actual.is_error() {
                continue;
            }
            if unifier.unify(&expected, &actual).is_err()
                && !types_compatible(&expected, &actual)
                && numeric_widen(&expected, &actual).is_none()
            {
                self.error(
                    "E331",
                    format!(
                        "argument type mismatch: expected '{}', got '{}'",
                        format_type(&expected),
                        format_type(&actual)
                    ),
                    arg.span,
                );
            }
        }

        // Record the instantiation of a generic user function.
        if let Some(sig) = sig {
            if sig.is_generic() && matches!(sig.kind, FnKind::User) {
                let type_args: Vec<Type> = sig
                    .type_params
                    .iter()
                    .map(|p| unifier.apply(&Type::Var(p.clone())))
                    .collect();
                if type_args.iter().all(|t| !matches!(t, Type::Var(_))) {
                    self.typed.mono.record(sig.key(), type_args);
                }
            }
        }

        unifier.apply(&ret)
    }

    fn check_purity_of_call(&mut self, sig: &FunctionSig, span: Span) {
        let Some(current) = &self.current else {
            return;
        };
        let pure = current.verb.map(|v| v.is_pure()).unwrap_or(false);
        if !pure {
            return;
        }
        if sig.is_io_builtin() {
            self.error(
                "E362",
                format!(
                    "pure function cannot call IO function '{}'",
                    sig.name
                ),
                span,
            );
            return;
        }
        if matches!(sig.verb, Some(Verb::Inputs) | Some(Verb::Outputs)) {
            self.error(
                "E363",
                format!(
                    "pure function cannot call '{} {}'",
                    sig.verb.expect("checked above"),
                    sig.name
                ),
                span,
            );
        }
    }

    fn record_call_edge(&mut self, sig: &FunctionSig, args: &[Expr]) {
        let Some(current) = &self.current else {
            return;
        };
        if !matches!(sig.kind, FnKind::User) {
            return;
        }
        let callee = sig.key();
        self.call_edges.push((current.key.clone(), callee.clone()));
        if callee == current.key {
            self.self_calls.push((callee, args.to_vec()));
        }
    }

    fn infer_constructor_call(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Type {
        let candidate = self
            .res
            .table
            .candidates(name)
            .into_iter()
            .find(|s| matches!(s.kind, FnKind::Variant { .. }))
            .cloned();
        if let Some(sig) = candidate {
            self.typed.call_targets.insert(expr.span, sig.key());
            return self.check_args_against(
                &sig.param_types.clone(),
                args,
                expr.span,
                Some(&sig),
                sig.return_type.clone(),
            );
        }
        // Record construction by field order.
        if let Some(ty) = self.res.table.resolve_type(name).cloned() {
            if let Type::Record { fields, .. } = &ty {
                let field_types: Vec<Type> = fields.iter().map(|(_, t)| t.clone()).collect();
                self.check_args_against(&field_types, args, expr.span, None, ty.clone());
                return ty;
            }
            for arg in args {
                self.infer_expr(arg);
            }
            return ty;
        }
        for arg in args {
            self.infer_expr(arg);
        }
        Type::Error
    }

    fn infer_pipe(
        &mut self,
        expr: &Expr,
        left: &Expr,
        right: &Expr,
        expected: Option<&Type>,
    ) -> Type {
        // `a |> f` is `f(a)`; `a |> f(b)` is `f(a, b)`. The desugar is
        // recorded through the call target on the pipe's span.
        match &right.kind {
            ExprKind::Identifier(name) => {
                let name = name.clone();
                let args = vec![left.clone()];
                self.resolve_and_check_call(expr.span, &name, &args, expected)
            }
            ExprKind::Call { func, args } => {
                if let ExprKind::Identifier(name) = &func.kind {
                    let name = name.clone();
                    let mut full_args = vec![left.clone()];
                    full_args.extend(args.iter().cloned());
                    self.resolve_and_check_call(expr.span, &name, &full_args, expected)
                } else {
                    self.infer_expr(left);
                    let fty = self.infer_expr(right);
                    match fty {
                        Type::Function { ret, .. } => *ret,
                        _ => Type::Error,
                    }
                }
            }
            _ => {
                self.infer_expr(left);
                let fty = self.infer_expr(right);
                match fty {
                    Type::Function { ret, .. } => *ret,
                    _ => Type::Error,
                }
            }
        }
    }

    fn infer_fail_prop(&mut self, expr: &Expr, inner: &Expr) -> Type {
        match &self.current {
            Some(current) => {
                let in_fallible_context = matches!(
                    current.verb,
                    None | Some(Verb::Inputs) | Some(Verb::Outputs)
                );
                if !in_fallible_context {
                    self.error(
                        "E361",
                        "'!' is only permitted inside inputs, outputs, and main",
                        expr.span,
                    );
                } else if !current.can_fail {
                    self.error(
                        "E350",
                        "fail propagation in a function that cannot fail",
                        expr.span,
                    );
                }
            }
            None => {
                self.error(
                    "E361",
                    "'!' is only permitted inside inputs, outputs, and main",
                    expr.span,
                );
            }
        }

        let inner_ty = self.infer_expr(inner);
        if inner_ty.is_error() {
            return Type::Error;
        }
        match inner_ty.success_type() {
            Some(success) => success.clone(),
            None => {
                self.error(
                    "E350",
                    format!(
                        "'!' requires a Result or Option, got '{}'",
                        format_type(&inner_ty)
                    ),
                    inner.span,
                );
                Type::Error
            }
        }
    }

    fn infer_lambda(
        &mut self,
        expr: &Expr,
        params: &[String],
        body: &Expr,
        expected: Option<&Type>,
    ) -> Type {
        let param_ids = self
            .res
            .lambda_params
            .get(&expr.span)
            .cloned()
            .unwrap_or_default();

        let expected_params: Vec<Option<Type>> = match expected {
            Some(Type::Function { params: eps, .. }) if eps.len() == params.len() => {
                eps.iter().map(|p| Some(p.clone())).collect()
            }
            _ => params.iter().map(|_| None).collect(),
        };

        let mut param_types: Vec<Type> = Vec::new();
        for (i, id) in param_ids.iter().enumerate() {
            let ty = expected_params
                .get(i)
                .cloned()
                .flatten()
                .unwrap_or_else(|| Type::Var(params[i].clone()));
            self.res.table.symbol_mut(*id).ty = ty.clone();
            param_types.push(ty);
        }

        let body_ty = self.infer_expr(body);
        Type::Function {
            verb: None,
            params: param_types,
            ret: Box::new(body_ty),
            can_fail: false,
        }
    }

    fn infer_valid(&mut self, expr: &Expr, name: &str, args: &Option<Vec<Expr>>) -> Type {
        let sig = self
            .res
            .table
            .verb_variant(Verb::Validates, name)
            .cloned();
        let Some(sig) = sig else {
            if let Some(args) = args {
                for arg in args {
                    self.infer_expr(arg);
                }
            }
            return Type::Error;
        };
        self.typed.call_targets.insert(expr.span, sig.key());
        match args {
            Some(args) => {
                self.check_args_against(
                    &sig.param_types.clone(),
                    args,
                    expr.span,
                    Some(&sig),
                    boolean(),
                );
                boolean()
            }
            None => Type::Function {
                verb: Some(Verb::Validates),
                params: sig.param_types.clone(),
                ret: Box::new(boolean()),
                can_fail: false,
            },
        }
    }

    // ── Matches ──────────────────────────────────────────────────

    fn infer_match(&mut self, expr: &Expr, subject: Option<&Expr>, arms: &[MatchArm]) -> Type {
        let subject_ty = match subject {
            Some(subject) => self.infer_expr(subject),
            None => self
                .current
                .as_ref()
                .and_then(|c| c.implicit_subject.clone())
                .unwrap_or(Type::Error),
        };

        if let Type::Algebraic { variants, .. } = subject_ty.unwrap_refined() {
            let variants = variants.clone();
            self.check_exhaustiveness(expr, arms, &variants);
        }

        let mut result: Type = Type::Unit;
        for arm in arms {
            self.check_pattern(&arm.pattern, &subject_ty);
            let mut arm_ty = Type::Unit;
            for (i, stmt) in arm.body.iter().enumerate() {
                let _ = i;
                arm_ty = self.check_stmt(stmt, None);
            }
            if matches!(result, Type::Unit) || result.is_error() {
                result = arm_ty;
            } else if !arm_ty.is_error()
                && !matches!(arm_ty, Type::Unit)
                && !types_compatible(&result, &arm_ty)
                && numeric_widen(&result, &arm_ty).is_none()
            {
                self.error(
                    "E321",
                    format!(
                        "match arms disagree: expected '{}', got '{}'",
                        format_type(&result),
                        format_type(&arm_ty)
                    ),
                    arm.span,
                );
            }
        }
        result
    }

    fn check_exhaustiveness(&mut self, expr: &Expr, arms: &[MatchArm], variants: &[VariantInfo]) {
        let variant_names: HashSet<&str> = variants.iter().map(|v| v.name.as_str()).collect();
        let mut covered: HashSet<String> = HashSet::new();
        let mut wildcard_seen = false;

        for arm in arms {
            if wildcard_seen {
                self.warning("W301", "unreachable match arm after wildcard", arm.span);
            }
            match &arm.pattern {
                Pattern::Variant { name, span, .. } => {
                    if variant_names.contains(name.as_str()) {
                        covered.insert(name.clone());
                    } else {
                        self.error("E370", format!("unknown variant '{}'", name), *span);
                    }
                }
                Pattern::Wildcard { .. } | Pattern::Binding { .. } => {
                    wildcard_seen = true;
                }
                Pattern::Literal { .. } => {}
            }
        }

        if !wildcard_seen {
            let missing: Vec<&str> = variants
                .iter()
                .map(|v| v.name.as_str())
                .filter(|n| !covered.contains(*n))
                .collect();
            if !missing.is_empty() {
                self.error(
                    "E371",
                    format!("non-exhaustive match: missing {}", missing.join(", ")),
                    expr.span,
                );
            }
        }
    }

    fn check_pattern(&mut self, pattern: &Pattern, subject_ty: &Type) {
        match pattern {
            Pattern::Binding { span, .. } => {
                if let Some(id) = self.res.bindings.get(span).copied() {
                    self.res.table.symbol_mut(id).ty = subject_ty.clone();
                }
            }
            Pattern::Variant { name, fields, .. } => {
                if let Type::Algebraic { variants, .. } = subject_ty.unwrap_refined() {
                    if let Some(info) = variants.iter().find(|v| &v.name == name) {
                        for (i, sub) in fields.iter().enumerate() {
                            let field_ty = info
                                .fields
                                .get(i)
                                .map(|(_, t)| t.clone())
                                .unwrap_or(Type::Error);
                            self.check_pattern(sub, &field_ty);
                        }
                    }
                }
            }
            Pattern::Wildcard { .. } | Pattern::Literal { .. } => {}
        }
    }

    // ── Refinements ──────────────────────────────────────────────

    fn check_refinement(&mut self, expr: &Expr, name: &str, constraint: &Expr, actual: &Type) {
        // A known value is evaluated at compile time.
        if let Some(value) = const_eval(expr) {
            match eval_constraint(constraint, &value) {
                Some(true) => return,
                Some(false) => {
                    let mut diag = Diagnostic::error(
                        "E341",
                        format!(
                            "value {} does not satisfy the refinement on '{}'",
                            render_const(&value),
                            name
                        ),
                        expr.span,
                    );
                    if let Some((lo, hi)) = int_range_of(constraint) {
                        diag = diag.with_suggestion(
                            "clamp the value into range",
                            format!("clamp({}, {}, {})", render_const(&value), lo, hi),
                        );
                    } else {
                        diag = diag.with_suggestion(
                            "validate at runtime",
                            format!("check({})!", render_const(&value)),
                        );
                    }
                    self.diagnostics.push(diag);
                    return;
                }
                None => {
                    self.typed.runtime_checks.insert(expr.span);
                    return;
                }
            }
        }

        // A narrower refinement subsumes structurally.
        if let Type::Refined {
            constraint: actual_constraint,
            ..
        } = actual
        {
            if constraint_implies(actual_constraint, constraint) {
                return;
            }
        }

        self.typed.runtime_checks.insert(expr.span);
    }

    // ── Termination ──────────────────────────────────────────────

    /// Recursive functions (direct or through a same-module cycle)
    /// must declare a terminates measure; direct self-calls are
    /// checked syntactically for a strictly decreasing argument.
    fn check_termination(&mut self, module: &Module) {
        let recursive = self.recursive_keys();

        for fd in module.functions() {
            let Some(sig) = self.signature_of(fd) else {
                continue;
            };
            let key = sig.key();
            if !recursive.contains(&key) {
                continue;
            }
            let Some(measure) = fd.terminates() else {
                self.error(
                    "E366",
                    format!(
                        "recursive function '{}' must declare 'terminates'",
                        fd.name
                    ),
                    fd.span,
                );
                continue;
            };

            // The measure must reference at least one parameter, and
            // each direct recursive call must shrink it.
            let measured: Vec<String> = sig
                .param_names
                .iter()
                .filter(|p| expr_mentions(measure, p))
                .cloned()
                .collect();
            if measured.is_empty() {
                self.error(
                    "E366",
                    "terminates measure must reference a parameter".to_string(),
                    measure.span,
                );
                continue;
            }

            let self_calls: Vec<Vec<Expr>> = self
                .self_calls
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, args)| args.clone())
                .collect();
            for args in &self_calls {
                for pname in &measured {
                    let idx = sig
                        .param_names
                        .iter()
                        .position(|p| p == pname)
                        .expect("measured names come from param_names");
                    let Some(arg) = args.get(idx) else { continue };
                    if !arg_strictly_smaller(arg, pname) {
                        self.error(
                            "E366",
                            format!(
                                "cannot verify that '{}' strictly decreases at this recursive call",
                                pname
                            ),
                            arg.span,
                        );
                    }
                }
            }
        }
    }

    fn recursive_keys(&self) -> HashSet<FunctionKey> {
        let mut adjacency: HashMap<&FunctionKey, Vec<&FunctionKey>> = HashMap::new();
        for (from, to) in &self.call_edges {
            adjacency.entry(from).or_default().push(to);
        }
        let mut recursive: HashSet<FunctionKey> = HashSet::new();
        for start in adjacency.keys() {
            let mut stack: Vec<&FunctionKey> = adjacency.get(*start).cloned().unwrap_or_default();
            let mut seen: HashSet<&FunctionKey> = HashSet::new();
            while let Some(node) = stack.pop() {
                if node == *start {
                    recursive.insert((*start).clone());
                    break;
                }
                if seen.insert(node) {
                    if let Some(next) = adjacency.get(node) {
                        stack.extend(next.iter().copied());
                    }
                }
            }
        }
        recursive
    }
}

fn verb_rank(sig: &FunctionSig) -> u8 {
    sig.verb.map(|v| v.preference_rank()).unwrap_or(7)
}

fn describe_candidate(sig: &FunctionSig) -> String {
    match sig.verb {
        Some(verb) => format!("{} {}({})", verb, sig.name, sig.key().param_key),
        None => format!("{}({})", sig.name, sig.key().param_key),
    }
}

/// Integer → Decimal → Float widening for mixed numeric operands.
fn numeric_widen(a: &Type, b: &Type) -> Option<Type> {
    fn rank(ty: &Type) -> Option<u8> {
        match ty.unwrap_refined() {
            Type::Primitive { name, .. } => match name.as_str() {
                "Integer" => Some(0),
                "Decimal" => Some(1),
                "Float" => Some(2),
                _ => None,
            },
            _ => None,
        }
    }
    let ra = rank(a)?;
    let rb = rank(b)?;
    Some(if ra >= rb { a.clone() } else { b.clone() })
}

// ── Compile-time evaluation for refinements ──────────────────────

fn const_eval(expr: &Expr) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::Int(v) => Some(ConstValue::Int(*v)),
        ExprKind::Dec(v) => Some(ConstValue::Dec(v.into_inner())),
        ExprKind::Bool(v) => Some(ConstValue::Bool(*v)),
        ExprKind::Str(v) => Some(ConstValue::Str(v.clone())),
        ExprKind::Paren(inner) => const_eval(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match const_eval(operand)? {
            ConstValue::Int(v) => Some(ConstValue::Int(-v)),
            ConstValue::Dec(v) => Some(ConstValue::Dec(-v)),
            _ => None,
        },
        ExprKind::Binary { left, op, right } if op.is_arithmetic() => {
            let l = const_eval(left)?;
            let r = const_eval(right)?;
            match (l, r) {
                (ConstValue::Int(a), ConstValue::Int(b)) => {
                    let v = match op {
                        BinaryOp::Add => a.checked_add(b)?,
                        BinaryOp::Sub => a.checked_sub(b)?,
                        BinaryOp::Mul => a.checked_mul(b)?,
                        BinaryOp::Div => a.checked_div(b)?,
                        BinaryOp::Rem => a.checked_rem(b)?,
                        _ => return None,
                    };
                    Some(ConstValue::Int(v))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Evaluate a refinement constraint against a known value bound to
/// `self`. Range constraints are inclusive on both ends.
fn eval_constraint(constraint: &Expr, value: &ConstValue) -> Option<bool> {
    match &constraint.kind {
        ExprKind::Range { lo, hi } => {
            let v = value.as_f64()?;
            let lo = const_eval(lo)?.as_f64()?;
            let hi = const_eval(hi)?.as_f64()?;
            Some(v >= lo && v <= hi)
        }
        ExprKind::Binary { left, op, right } if op.is_comparison() => {
            let (lhs, rhs) = match (&left.kind, &right.kind) {
                (ExprKind::Identifier(n), _) if n == "self" => {
                    (value.clone(), const_eval(right)?)
                }
                (_, ExprKind::Identifier(n)) if n == "self" => {
                    (const_eval(left)?, value.clone())
                }
                _ => return None,
            };
            let a = lhs.as_f64()?;
            let b = rhs.as_f64()?;
            Some(match op {
                BinaryOp::Eq => a == b,
                BinaryOp::NotEq => a != b,
                BinaryOp::Lt => a < b,
                BinaryOp::Gt => a > b,
                BinaryOp::Le => a <= b,
                BinaryOp::Ge => a >= b,
                _ => return None,
            })
        }
        ExprKind::Binary { left, op, right } if op.is_logical() => {
            let l = eval_constraint(left, value)?;
            let r = eval_constraint(right, value)?;
            Some(match op {
                BinaryOp::And => l && r,
                BinaryOp::Or => l || r,
                _ => return None,
            })
        }
        ExprKind::Paren(inner) => eval_constraint(inner, value),
        _ => None,
    }
}

fn render_const(value: &ConstValue) -> String {
    match value {
        ConstValue::Int(v) => v.to_string(),
        ConstValue::Dec(v) => v.to_string(),
        ConstValue::Bool(v) => v.to_string(),
        ConstValue::Str(v) => format!("\"{}\"", v),
    }
}

/// The closed integer interval a constraint admits, when it is a
/// pure range shape.
fn int_range_of(constraint: &Expr) -> Option<(i64, i64)> {
    match &constraint.kind {
        ExprKind::Range { lo, hi } => {
            let lo = match const_eval(lo)? {
                ConstValue::Int(v) => v,
                _ => return None,
            };
            let hi = match const_eval(hi)? {
                ConstValue::Int(v) => v,
                _ => return None,
            };
            Some((lo, hi))
        }
        ExprKind::Paren(inner) => int_range_of(inner),
        _ => None,
    }
}

/// The interval `[lo, hi]` a constraint admits over `self`, with
/// open ends as infinities. Only range, self-comparison, and
/// conjunction shapes are understood; anything else is opaque.
fn interval_of(constraint: &Expr) -> Option<(f64, f64)> {
    match &constraint.kind {
        ExprKind::Range { lo, hi } => {
            let lo = const_eval(lo)?.as_f64()?;
            let hi = const_eval(hi)?.as_f64()?;
            Some((lo, hi))
        }
        ExprKind::Binary { left, op, right } if op.is_comparison() => {
            let (bound, flipped) = match (&left.kind, &right.kind) {
                (ExprKind::Identifier(n), _) if n == "self" => (const_eval(right)?, false),
                (_, ExprKind::Identifier(n)) if n == "self" => (const_eval(left)?, true),
                _ => return None,
            };
            let b = bound.as_f64()?;
            let op = if flipped {
                match op {
                    BinaryOp::Lt => BinaryOp::Gt,
                    BinaryOp::Gt => BinaryOp::Lt,
                    BinaryOp::Le => BinaryOp::Ge,
                    BinaryOp::Ge => BinaryOp::Le,
                    other => *other,
                }
            } else {
                *op
            };
            Some(match op {
                BinaryOp::Ge => (b, f64::INFINITY),
                BinaryOp::Gt => (b + 1.0, f64::INFINITY),
                BinaryOp::Le => (f64::NEG_INFINITY, b),
                BinaryOp::Lt => (f64::NEG_INFINITY, b - 1.0),
                BinaryOp::Eq => (b, b),
                _ => return None,
            })
        }
        ExprKind::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let (alo, ahi) = interval_of(left)?;
            let (blo, bhi) = interval_of(right)?;
            Some((alo.max(blo), ahi.min(bhi)))
        }
        ExprKind::Paren(inner) => interval_of(inner),
        _ => None,
    }
}

/// Structural subsumption over range constraints: `sub` implies
/// `super` when its admitted interval is contained.
fn constraint_implies(sub: &Expr, superset: &Expr) -> bool {
    match (interval_of(sub), interval_of(superset)) {
        (Some((slo, shi)), Some((plo, phi))) => slo >= plo && shi <= phi,
        _ => false,
    }
}

fn expr_mentions(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Identifier(n) => n == name,
        ExprKind::Binary { left, right, .. } => {
            expr_mentions(left, name) || expr_mentions(right, name)
        }
        ExprKind::Range { lo, hi } => expr_mentions(lo, name) || expr_mentions(hi, name),
        ExprKind::Unary { operand, .. } => expr_mentions(operand, name),
        ExprKind::Call { func, args } => {
            expr_mentions(func, name) || args.iter().any(|a| expr_mentions(a, name))
        }
        ExprKind::Field { obj, .. } => expr_mentions(obj, name),
        ExprKind::Paren(inner) => expr_mentions(inner, name),
        _ => false,
    }
}

/// Syntactic strict-decrease check at a recursive call site: an
/// integer decrement of the parameter, a structural piece bound by a
/// match on it, or a shrinking list operation.
fn arg_strictly_smaller(arg: &Expr, param: &str) -> bool {
    match &arg.kind {
        ExprKind::Binary {
            left,
            op: BinaryOp::Sub,
            right,
        } => {
            matches!(&left.kind, ExprKind::Identifier(n) if n == param)
                && matches!(&right.kind, ExprKind::Int(v) if *v > 0)
        }
        // A different identifier came from destructuring the
        // parameter in a match arm.
        ExprKind::Identifier(n) => n != param,
        ExprKind::Call { func, args } => {
            let shrinking = matches!(
                &func.kind,
                ExprKind::Identifier(n) if n == "tail" || n == "rest"
            );
            shrinking && args.iter().any(|a| expr_mentions(a, param))
        }
        ExprKind::Paren(inner) => arg_strictly_smaller(inner, param),
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

    fn check_source(text: &str) -> (TypedModule, Vec<Diagnostic>) {
        let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let (module, parse_errors) = Parser::new(&tokens).parse();
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        let mut res = Resolver::new().resolve(&module);
        assert!(
            res.diagnostics.iter().all(|d| !d.is_error()),
            "resolver errors: {:?}",
            res.diagnostics
        );
        check_module(&module, &mut res)
    }

    fn error_codes(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_verb_dispatch_boolean_context() {
        let source = "\
validates email(a String)
from
    contains(a, \"@\")

transforms email(raw String) String
from
    trim(raw)

main()!
from
    ok as Boolean = email(\"a@b.c\")
    name as String = email(\"  A@B.C \")
    println(name)
";
        let (typed, diags) = check_source(source);
        assert!(diags.iter().all(|d| !d.is_error()), "{:?}", diags);
        let mut verbs: Vec<Option<Verb>> = typed
            .call_targets
            .values()
            .filter(|k| k.name == "email")
            .map(|k| k.verb)
            .collect();
        verbs.sort();
        assert_eq!(verbs, vec![Some(Verb::Transforms), Some(Verb::Validates)]);
    }

    #[test]
    fn test_refinement_rejects_out_of_range_literal() {
        let source = "\
type Port is Integer where 1..65535

main()!
from
    port as Port = 70000
    println(to_string(port))
";
        let (_, diags) = check_source(source);
        let refinement = diags
            .iter()
            .find(|d| d.code == "E341")
            .expect("refinement violation");
        assert!(refinement
            .suggestions
            .iter()
            .any(|s| s.replacement == "clamp(70000, 1, 65535)"));
    }

    #[test]
    fn test_refinement_accepts_boundary_literals() {
        let source = "\
type Port is Integer where 1..65535

main()!
from
    low as Port = 1
    high as Port = 65535
    println(to_string(low))
    println(to_string(high))
";
        let (_, diags) = check_source(source);
        assert!(diags.iter().all(|d| d.code != "E341"), "{:?}", diags);
    }

    #[test]
    fn test_refinement_unknown_value_gets_runtime_check() {
        let source = "\
type Port is Integer where 1..65535

inputs configure(n Integer) Port!
from
    port as Port = n
    port
";
        let (typed, _) = check_source(source);
        assert!(!typed.runtime_checks.is_empty());
    }

    #[test]
    fn test_pure_verb_calling_println_is_e362() {
        let source = "\
transforms shout(a String) String
from
    println(a)
    upper(a)
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E362"));
    }

    #[test]
    fn test_pure_verb_calling_inputs_fn_is_e363() {
        let source = "\
inputs fetch(path String) String!
from
    read_file(path)!

transforms wrap(path String) String
from
    fetch(path)
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E363"));
    }

    #[test]
    fn test_fail_prop_in_pure_verb_is_e361() {
        let source = "\
transforms risky(path String) String
from
    read_file(path)!
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E361"));
    }

    #[test]
    fn test_non_exhaustive_match_is_e371() {
        let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
";
        let (_, diags) = check_source(source);
        let err = diags.iter().find(|d| d.code == "E371").expect("E371");
        assert!(err.message.contains("Rect"));
    }

    #[test]
    fn test_exhaustive_match_passes() {
        let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
    Rect(w, h) => w * h
";
        let (_, diags) = check_source(source);
        assert!(diags.iter().all(|d| !d.is_error()), "{:?}", diags);
    }

    #[test]
    fn test_wildcard_then_arm_is_w301() {
        let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    _ => 0.0
    Circle(r) => 3.14 * r * r
";
        let (_, diags) = check_source(source);
        assert!(diags.iter().any(|d| d.code == "W301"));
    }

    #[test]
    fn test_recursion_without_terminates_is_e366() {
        let source = "\
transforms countdown(n Integer) Integer
from
    countdown(n - 1)
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E366"));
    }

    #[test]
    fn test_recursion_with_decreasing_measure_passes() {
        let source = "\
transforms countdown(n Integer) Integer
    terminates: n
    from
        countdown(n - 1)
";
        let (_, diags) = check_source(source);
        assert!(diags.iter().all(|d| d.code != "E366"), "{:?}", diags);
    }

    #[test]
    fn test_if_outside_comptime_is_e367() {
        let source = "\
transforms pick(a Integer) Integer
from
    if a > 0
        a
    else
        0 - a
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E367"));
    }

    #[test]
    fn test_assignment_to_immutable_is_e323() {
        let source = "\
transforms bump(a Integer) Integer
from
    x as Integer = a
    x = x + 1
    x
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E323"));
    }

    #[test]
    fn test_mutable_assignment_passes() {
        let source = "\
transforms bump(a Integer) Integer
from
    x as Integer:[Mutable] = a
    x = x + 1
    x
";
        let (_, diags) = check_source(source);
        assert!(diags.iter().all(|d| d.code != "E323"), "{:?}", diags);
    }

    #[test]
    fn test_fail_prop_on_non_result_is_e350() {
        let source = "\
inputs oops(a Integer) Integer!
from
    a!
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E350"));
    }

    #[test]
    fn test_generic_instantiation_recorded() {
        let source = "\
transforms first(xs List<T>) T
from
    xs[0]

main()!
from
    n as Integer = first([1, 2, 3])
    println(to_string(n))
";
        let (typed, diags) = check_source(source);
        assert!(diags.iter().all(|d| !d.is_error()), "{:?}", diags);
        assert_eq!(typed.mono.len(), 1);
    }

    #[test]
    fn test_ensures_must_be_boolean() {
        let source = "\
transforms double(a Integer) Integer
    ensures result + 1
    from
        a * 2
";
        let (_, diags) = check_source(source);
        assert!(error_codes(&diags).contains(&"E380"));
    }
}
