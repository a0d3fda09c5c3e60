//! Statement-level C emission: declarations, assignments, refinement
//! guards, and pattern-match lowering.

use crate::ast::{BinaryOp, Expr, ExprKind, MatchArm, Pattern, Stmt, StmtKind};
use crate::semantics::types::Type;

use super::ctypes::{is_arena, variant_tag};
use super::CEmitter;

impl<'a> CEmitter<'a> {
    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { name, value, .. } => self.emit_var_decl(stmt, name, value),
            StmtKind::Assign { target, value } => {
                let rendered = self.emit_expr(value);
                self.line(format!("{} = {};", target, rendered));
            }
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Match { subject, arms } => {
                    self.emit_match_stmt(subject.as_deref(), arms)
                }
                _ => {
                    let rendered = self.emit_expr(expr);
                    if rendered != "(void)0" {
                        self.line(format!("{};", rendered));
                    }
                }
            },
        }
    }

    fn emit_var_decl(&mut self, stmt: &Stmt, name: &str, value: &Expr) {
        let declared = self
            .res
            .bindings
            .get(&stmt.span)
            .map(|id| self.res.table.symbol(*id).ty.clone());
        let ty = match declared {
            Some(ty) if !ty.is_error() => self.apply_subst(&ty),
            _ => self.expr_type(value),
        };

        let rendered = self.emit_expr(value);
        let ct = self.ctype(&ty);
        self.line(format!("{} {} = {};", ct.decl, name, rendered));

        // Deferred refinement check at the assignment site.
        if self.typed.runtime_checks.contains(&value.span) {
            if let Type::Refined {
                name: refined_name,
                constraint,
                ..
            } = &ty
            {
                let constraint = constraint.clone();
                let guard = self.emit_constraint(name, &constraint);
                self.line(format!(
                    "if (!({})) prove_panic(\"value out of range for {}\");",
                    guard, refined_name
                ));
            }
        }

        if ct.is_pointer && !is_arena(&ty) {
            self.line(format!("prove_retain({});", name));
        }
        self.set_local(name, ty);
    }

    /// Render a refinement constraint as a C condition over `var`.
    /// `self` in the constraint refers to the checked value.
    pub(crate) fn emit_constraint(&mut self, var: &str, constraint: &Expr) -> String {
        match &constraint.kind {
            ExprKind::Range { lo, hi } => {
                let lo = self.emit_expr(lo);
                let hi = self.emit_expr(hi);
                format!("{} >= {} && {} <= {}", var, lo, var, hi)
            }
            ExprKind::Binary { left, op, right } if op.is_comparison() || op.is_logical() => {
                let l = self.emit_constraint_operand(var, left);
                let r = self.emit_constraint_operand(var, right);
                format!("({} {} {})", l, c_op(*op), r)
            }
            ExprKind::Paren(inner) => self.emit_constraint(var, inner),
            _ => {
                // Opaque constraints route through the checked
                // expression itself.
                self.emit_constraint_operand(var, constraint)
            }
        }
    }

    fn emit_constraint_operand(&mut self, var: &str, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Identifier(name) if name == "self" => var.to_string(),
            ExprKind::Binary { left, op, right } => {
                let l = self.emit_constraint_operand(var, left);
                let r = self.emit_constraint_operand(var, right);
                format!("({} {} {})", l, c_op(*op), r)
            }
            ExprKind::Paren(inner) => self.emit_constraint_operand(var, inner),
            _ => self.emit_expr(expr),
        }
    }

    // ── Match lowering ───────────────────────────────────────────

    /// A statement-position match: switch on the tag with
    /// destructuring assignments, or an if/else chain for literal
    /// subjects.
    pub(crate) fn emit_match_stmt(&mut self, subject: Option<&Expr>, arms: &[MatchArm]) {
        self.emit_match_with(subject, arms, None, false);
    }

    /// An implicit match forming a whole function body; each arm's
    /// terminal expression becomes a return.
    pub(crate) fn emit_implicit_match_return(&mut self, expr: &Expr) {
        let ExprKind::Match { arms, .. } = &expr.kind else {
            return;
        };
        self.emit_match_with(None, arms, None, true);
    }

    /// An expression-position match: lowers into a result temporary.
    pub(crate) fn emit_match_expr(&mut self, expr: &Expr) -> String {
        let ExprKind::Match { subject, arms } = &expr.kind else {
            return "(void)0".to_string();
        };
        let result_ty = self.expr_type(expr);
        if matches!(result_ty, Type::Unit | Type::Error) {
            self.emit_match_stmt(subject.as_deref(), arms);
            return "(void)0".to_string();
        }
        let result = self.tmp();
        let ct = self.ctype(&result_ty);
        self.line(format!("{} {};", ct.decl, result));
        self.emit_match_with(subject.as_deref(), arms, Some(result.as_str()), false);
        result
    }

    fn emit_match_with(
        &mut self,
        subject: Option<&Expr>,
        arms: &[MatchArm],
        result_var: Option<&str>,
        arms_return: bool,
    ) {
        let (subject_code, subject_ty) = match subject {
            Some(expr) => (self.emit_expr(expr), self.expr_type(expr)),
            None => match self.implicit_subject.clone() {
                Some((name, ty)) => (name, self.apply_subst(&ty)),
                None => return,
            },
        };

        if let Type::Algebraic { name, variants, .. } = subject_ty.unwrap_refined().clone() {
            let subj_tmp = self.tmp();
            let sct = self.ctype(&subject_ty);
            self.line(format!("{} {} = {};", sct.decl, subj_tmp, subject_code));
            self.line(format!("switch ({}.tag) {{", subj_tmp));
            for arm in arms {
                match &arm.pattern {
                    Pattern::Variant {
                        name: vname,
                        fields,
                        ..
                    } => {
                        self.line(format!("case {}: {{", variant_tag(&name, vname)));
                        self.indent += 1;
                        if let Some(info) = variants.iter().find(|v| &v.name == vname) {
                            for (i, sub) in fields.iter().enumerate() {
                                if let Pattern::Binding { name: bind, .. } = sub {
                                    if let Some((fname, fty)) = info.fields.get(i) {
                                        let fct = self.ctype(fty);
                                        self.line(format!(
                                            "{} {} = {}.payload.{}.{};",
                                            fct.decl, bind, subj_tmp, vname, fname
                                        ));
                                        let fty = fty.clone();
                                        self.set_local(bind, fty);
                                    }
                                }
                            }
                        }
                        self.emit_arm_body(&arm.body, result_var, arms_return);
                        self.line("break;");
                        self.indent -= 1;
                        self.line("}");
                    }
                    Pattern::Wildcard { .. } | Pattern::Binding { .. } => {
                        self.line("default: {");
                        self.indent += 1;
                        if let Pattern::Binding { name: bind, .. } = &arm.pattern {
                            let sct = self.ctype(&subject_ty);
                            self.line(format!("{} {} = {};", sct.decl, bind, subj_tmp));
                            self.set_local(bind, subject_ty.clone());
                        }
                        self.emit_arm_body(&arm.body, result_var, arms_return);
                        self.line("break;");
                        self.indent -= 1;
                        self.line("}");
                    }
                    Pattern::Literal { .. } => {}
                }
            }
            self.line("}");
            return;
        }

        // Literal / wildcard match over a non-algebraic subject.
        let subj_tmp = self.tmp();
        let sct = self.ctype(&subject_ty);
        self.line(format!("{} {} = {};", sct.decl, subj_tmp, subject_code));
        let mut first = true;
        let mut open = 0usize;
        for arm in arms {
            match &arm.pattern {
                Pattern::Literal { value, .. } => {
                    let cond = self.literal_condition(&subj_tmp, value, &subject_ty);
                    if first {
                        self.line(format!("if ({}) {{", cond));
                    } else {
                        self.line(format!("}} else if ({}) {{", cond));
                    }
                    self.indent += 1;
                    self.emit_arm_body(&arm.body, result_var, arms_return);
                    self.indent -= 1;
                    open = 1;
                }
                Pattern::Wildcard { .. } | Pattern::Binding { .. } => {
                    if first {
                        self.line("{");
                    } else {
                        self.line("} else {");
                    }
                    self.indent += 1;
                    if let Pattern::Binding { name: bind, .. } = &arm.pattern {
                        let bct = self.ctype(&subject_ty);
                        self.line(format!("{} {} = {};", bct.decl, bind, subj_tmp));
                        self.set_local(bind, subject_ty.clone());
                    }
                    self.emit_arm_body(&arm.body, result_var, arms_return);
                    self.indent -= 1;
                    open = 1;
                }
                Pattern::Variant { .. } => {}
            }
            first = false;
        }
        if open > 0 {
            self.line("}");
        }
    }

    fn literal_condition(
        &mut self,
        subj: &str,
        value: &crate::ast::LiteralValue,
        subject_ty: &Type,
    ) -> String {
        match value {
            crate::ast::LiteralValue::Int(v) => format!("{} == {}L", subj, v),
            crate::ast::LiteralValue::Dec(v) => format!("{} == {}", subj, v),
            crate::ast::LiteralValue::Bool(v) => format!("{} == {}", subj, v),
            crate::ast::LiteralValue::Str(v) => {
                let _ = subject_ty;
                self.need("prove_string.h");
                format!(
                    "prove_string_eq({}, prove_string_from_cstr(\"{}\"))",
                    subj,
                    escape_c(v)
                )
            }
        }
    }

    fn emit_arm_body(&mut self, body: &[Stmt], result_var: Option<&str>, arms_return: bool) {
        for (i, stmt) in body.iter().enumerate() {
            let is_last = i == body.len() - 1;
            if is_last {
                if let StmtKind::Expr(expr) = &stmt.kind {
                    if arms_return {
                        let value_ty = self.expr_type(expr);
                        let rendered = self.emit_expr(expr);
                        if self.current_can_fail
                            && !matches!(&value_ty, Type::Applied { base, .. } if base == "Result")
                        {
                            self.emit_fallible_return(&rendered, &value_ty);
                        } else if matches!(self.current_ret, Type::Unit) {
                            self.line(format!("{};", rendered));
                            self.line("return;");
                        } else {
                            self.line(format!("return {};", rendered));
                        }
                        continue;
                    }
                    if let Some(result) = result_var {
                        let rendered = self.emit_expr(expr);
                        self.line(format!("{} = {};", result, rendered));
                        continue;
                    }
                }
            }
            self.emit_stmt(stmt);
        }
    }
}

fn c_op(op: BinaryOp) -> &'static str {
    op.as_str()
}

fn escape_c(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn escape_c_string(text: &str) -> String {
    escape_c(text)
}
