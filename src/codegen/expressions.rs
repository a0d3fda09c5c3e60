//! Expression-level C emission.
//!
//! Some lowerings (fail propagation, list construction, higher-order
//! calls) emit statements into the current block and hand back the
//! name of a temporary.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp, Verb};
use crate::resolver::{FnKind, FunctionKey, FunctionSig};
use crate::semantics::types::Type;
use crate::semantics::unifier::Unifier;

use super::ctypes::{mangle_instance, mangle_name, mangle_variant};
use super::statements::escape_c_string;
use super::CEmitter;

impl<'a> CEmitter<'a> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Int(v) => format!("{}L", v),
            ExprKind::Dec(v) => {
                let text = v.to_string();
                if text.contains('.') || text.contains('e') {
                    text
                } else {
                    format!("{}.0", text)
                }
            }
            ExprKind::Bool(v) => v.to_string(),
            ExprKind::Char(v) => format!("'{}'", escape_c_string(&v.to_string())),
            ExprKind::Str(v) | ExprKind::TripleStr(v) | ExprKind::RawStr(v)
            | ExprKind::Regex(v) => {
                self.need("prove_string.h");
                format!("prove_string_from_cstr(\"{}\")", escape_c_string(v))
            }
            ExprKind::StrInterp(parts) => self.emit_string_interp(parts),
            ExprKind::List(elements) => self.emit_list_literal(expr, elements),
            ExprKind::Range { lo, hi } => self.emit_range(lo, hi),
            ExprKind::Identifier(name) => name.clone(),
            ExprKind::TypeIdentifier(name) => name.clone(),
            ExprKind::Binary { left, op, right } => self.emit_binary(left, *op, right),
            ExprKind::Unary { op, operand } => {
                let inner = self.emit_expr(operand);
                match op {
                    UnaryOp::Not => format!("(!{})", inner),
                    UnaryOp::Neg => format!("(-{})", inner),
                }
            }
            ExprKind::Call { func, args } => self.emit_call(expr, func, args),
            ExprKind::Field { obj, field } => {
                let rendered = self.emit_expr(obj);
                let obj_ty = self.expr_type(obj);
                if super::map_type(&obj_ty).decl.ends_with('*') {
                    format!("{}->{}", rendered, field)
                } else {
                    format!("{}.{}", rendered, field)
                }
            }
            ExprKind::Index { obj, index } => self.emit_index(obj, index),
            ExprKind::Pipe { left, right } => self.emit_pipe(expr, left, right),
            ExprKind::FailProp(inner) => self.emit_fail_prop(inner),
            ExprKind::Lambda { .. } => {
                // Reached only as a plain argument to an unknown
                // function; hoist with void* plumbing.
                self.hoist_lambda(expr, &Type::Error, "map", None)
            }
            ExprKind::Valid { name, args } => self.emit_valid(expr, name, args),
            ExprKind::Match { .. } => self.emit_match_expr(expr),
            ExprKind::If { .. } | ExprKind::Comptime(_) => {
                // Comptime bodies fold before emission; the checker
                // rejects runtime `if`.
                "(void)0".to_string()
            }
            ExprKind::Paren(inner) => {
                let rendered = self.emit_expr(inner);
                format!("({})", rendered)
            }
        }
    }

    // ── Strings ──────────────────────────────────────────────────

    fn emit_string_interp(&mut self, parts: &[Expr]) -> String {
        self.need("prove_string.h");
        let mut rendered: Vec<String> = Vec::new();
        for part in parts {
            let ty = self.expr_type(part);
            let code = self.emit_expr(part);
            rendered.push(self.to_string_call(&code, &ty));
        }
        match rendered.len() {
            0 => "prove_string_from_cstr(\"\")".to_string(),
            1 => rendered.remove(0),
            _ => {
                let mut acc = rendered.remove(0);
                for piece in rendered {
                    acc = format!("prove_string_concat({}, {})", acc, piece);
                }
                acc
            }
        }
    }

    pub(crate) fn to_string_call(&mut self, code: &str, ty: &Type) -> String {
        self.need("prove_string.h");
        match ty.unwrap_refined() {
            Type::Primitive { name, .. } => match name.as_str() {
                "String" | "Error" => code.to_string(),
                "Integer" | "Byte" => format!("prove_string_from_int({})", code),
                "Decimal" | "Float" => format!("prove_string_from_double({})", code),
                "Boolean" => format!("prove_string_from_bool({})", code),
                "Character" => format!("prove_string_from_char({})", code),
                _ => format!("prove_string_from_int((int64_t){})", code),
            },
            _ => format!("prove_string_from_int((int64_t){})", code),
        }
    }

    // ── Collections ──────────────────────────────────────────────

    fn emit_list_literal(&mut self, expr: &Expr, elements: &[Expr]) -> String {
        self.need("prove_list.h");
        let list_ty = self.expr_type(expr);
        let elem_ty = match list_ty.unwrap_refined() {
            Type::List(inner) => (**inner).clone(),
            _ => Type::Error,
        };
        let elem_ct = self.ctype(&elem_ty);
        let tmp = self.tmp();
        self.line(format!(
            "Prove_List *{} = prove_list_new(sizeof({}), {});",
            tmp,
            elem_ct.decl,
            elements.len().max(1)
        ));
        for element in elements {
            let value = self.emit_expr(element);
            let slot = self.tmp();
            self.line(format!("{} {} = {};", elem_ct.decl, slot, value));
            self.line(format!("prove_list_push(&{}, &{});", tmp, slot));
        }
        tmp
    }

    fn emit_range(&mut self, lo: &Expr, hi: &Expr) -> String {
        self.need("prove_list.h");
        let lo_code = self.emit_expr(lo);
        let hi_code = self.emit_expr(hi);
        let tmp = self.tmp();
        let idx = self.tmp();
        self.line(format!(
            "Prove_List *{} = prove_list_new(sizeof(int64_t), 8);",
            tmp
        ));
        self.line(format!(
            "for (int64_t {i} = {lo}; {i} <= {hi}; {i}++) {{",
            i = idx,
            lo = lo_code,
            hi = hi_code
        ));
        self.indent += 1;
        self.line(format!("prove_list_push(&{}, &{});", tmp, idx));
        self.indent -= 1;
        self.line("}");
        tmp
    }

    fn emit_index(&mut self, obj: &Expr, index: &Expr) -> String {
        let obj_code = self.emit_expr(obj);
        let idx_code = self.emit_expr(index);
        let obj_ty = self.expr_type(obj);
        match obj_ty.unwrap_refined() {
            Type::List(inner) => {
                self.need("prove_list.h");
                let ct = self.ctype(inner);
                format!(
                    "(*({}*)prove_list_get({}, {}))",
                    ct.decl, obj_code, idx_code
                )
            }
            Type::Primitive { name, .. } if name == "String" => {
                format!("({}->data[{}])", obj_code, idx_code)
            }
            _ => format!("{}[{}]", obj_code, idx_code),
        }
    }

    // ── Operators ────────────────────────────────────────────────

    fn emit_binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> String {
        let lt = self.expr_type(left);
        let l = self.emit_expr(left);
        let r = self.emit_expr(right);

        if lt.is_string() {
            self.need("prove_string.h");
            match op {
                BinaryOp::Add => return format!("prove_string_concat({}, {})", l, r),
                BinaryOp::Eq => return format!("prove_string_eq({}, {})", l, r),
                BinaryOp::NotEq => return format!("(!prove_string_eq({}, {}))", l, r),
                _ => {}
            }
        }

        format!("({} {} {})", l, op.as_str(), r)
    }

    // ── Calls ────────────────────────────────────────────────────

    fn emit_call(&mut self, expr: &Expr, func: &Expr, args: &[Expr]) -> String {
        // The checker recorded the selected identity per call site.
        let target: Option<FunctionKey> = self.typed.call_targets.get(&expr.span).cloned();
        if let Some(key) = target {
            if let Some(sig) = self.res.table.function(&key).cloned() {
                return self.emit_resolved_call(&sig, args);
            }
        }

        match &func.kind {
            ExprKind::TypeIdentifier(name) => {
                // Record construction by field order.
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                let cname = super::mangle_type_name(name);
                format!("({}){{{}}}", cname, rendered.join(", "))
            }
            _ => {
                let callee = self.emit_expr(func);
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("{}({})", callee, rendered.join(", "))
            }
        }
    }

    fn emit_resolved_call(&mut self, sig: &FunctionSig, args: &[Expr]) -> String {
        match &sig.kind {
            FnKind::Builtin { .. } => self.emit_builtin_call(sig, args),
            FnKind::Variant { type_name } => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!(
                    "{}({})",
                    mangle_variant(type_name, &sig.name),
                    rendered.join(", ")
                )
            }
            FnKind::Foreign { .. } => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("{}({})", sig.name, rendered.join(", "))
            }
            FnKind::Imported | FnKind::User => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                let mangled = if sig.is_generic() {
                    let key = self.instance_key_for(sig, args);
                    mangle_instance(sig.verb, &sig.name, &sig.param_types, &key)
                } else {
                    mangle_name(sig.verb, &sig.name, &sig.param_types)
                };
                format!("{}({})", mangled, rendered.join(", "))
            }
        }
    }

    /// Recover the concrete type arguments of a generic call from the
    /// argument types at this site.
    fn instance_key_for(&mut self, sig: &FunctionSig, args: &[Expr]) -> String {
        let mut unifier = Unifier::new();
        for (param, arg) in sig.param_types.iter().zip(args) {
            let actual = self.expr_type(arg);
            let _ = unifier.unify(param, &actual);
        }
        sig.type_params
            .iter()
            .map(|p| unifier.apply(&Type::Var(p.clone())).key())
            .collect::<Vec<_>>()
            .join("_")
    }

    fn emit_builtin_call(&mut self, sig: &FunctionSig, args: &[Expr]) -> String {
        let arg0_ty = args.first().map(|a| self.expr_type(a));
        match sig.name.as_str() {
            "println" | "print" => {
                let code = self.emit_expr(&args[0]);
                self.need("prove_string.h");
                format!("prove_{}({})", sig.name, code)
            }
            "readln" => "prove_readln()".to_string(),
            "read_file" => {
                self.need("prove_result.h");
                let code = self.emit_expr(&args[0]);
                format!("prove_file_read({})", code)
            }
            "write_file" => {
                self.need("prove_result.h");
                let path = self.emit_expr(&args[0]);
                let content = self.emit_expr(&args[1]);
                format!("prove_file_write({}, {})", path, content)
            }
            "open" | "close" | "flush" | "sleep" => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("prove_io_{}({})", sig.name, rendered.join(", "))
            }
            "clamp" => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("prove_clamp({})", rendered.join(", "))
            }
            "max" => {
                let a = self.emit_expr(&args[0]);
                let b = self.emit_expr(&args[1]);
                format!("(({a}) > ({b}) ? ({a}) : ({b}))", a = a, b = b)
            }
            "min" => {
                let a = self.emit_expr(&args[0]);
                let b = self.emit_expr(&args[1]);
                format!("(({a}) < ({b}) ? ({a}) : ({b}))", a = a, b = b)
            }
            "abs" => {
                let a = self.emit_expr(&args[0]);
                format!("(({a}) < 0 ? -({a}) : ({a}))", a = a)
            }
            "len" => {
                let code = self.emit_expr(&args[0]);
                match arg0_ty.as_ref().map(|t| t.is_string()) {
                    Some(true) => {
                        self.need("prove_string.h");
                        format!("prove_string_len({})", code)
                    }
                    _ => {
                        self.need("prove_list.h");
                        format!("prove_list_len({})", code)
                    }
                }
            }
            "to_string" => {
                let code = self.emit_expr(&args[0]);
                let ty = arg0_ty.unwrap_or(Type::Error);
                self.to_string_call(&code, &ty)
            }
            "trim" => self.text_call("prove_text_trim", args),
            "lower" => self.text_call("prove_text_to_lower", args),
            "upper" => self.text_call("prove_text_to_upper", args),
            "contains" => self.text_call("prove_text_contains", args),
            "split" => self.text_call("prove_text_split", args),
            "join" => self.text_call("prove_text_join", args),
            "char_at" => {
                let s = self.emit_expr(&args[0]);
                let i = self.emit_expr(&args[1]);
                format!("({}->data[{}])", s, i)
            }
            "map" => self.emit_hof_map(args),
            "filter" => self.emit_hof_filter(args),
            "reduce" => self.emit_hof_reduce(args),
            "each" => self.emit_hof_each(args),
            "append" => {
                self.need("prove_list.h");
                let list = self.emit_expr(&args[0]);
                let elem_ty = self.expr_type(&args[1]);
                let elem = self.emit_expr(&args[1]);
                let ct = self.ctype(&elem_ty);
                let list_tmp = self.tmp();
                let elem_tmp = self.tmp();
                self.line(format!("Prove_List *{} = {};", list_tmp, list));
                self.line(format!("{} {} = {};", ct.decl, elem_tmp, elem));
                self.line(format!("prove_list_push(&{}, &{});", list_tmp, elem_tmp));
                list_tmp
            }
            "sum" => {
                self.need("prove_list.h");
                let list = self.emit_expr(&args[0]);
                let acc = self.tmp();
                let idx = self.tmp();
                self.line(format!("int64_t {} = 0;", acc));
                self.line(format!(
                    "for (int64_t {i} = 0; {i} < prove_list_len({list}); {i}++) {{",
                    i = idx,
                    list = list
                ));
                self.indent += 1;
                self.line(format!(
                    "{acc} += *(int64_t*)prove_list_get({list}, {i});",
                    acc = acc,
                    list = list,
                    i = idx
                ));
                self.indent -= 1;
                self.line("}");
                acc
            }
            other => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("prove_{}({})", other, rendered.join(", "))
            }
        }
    }

    fn text_call(&mut self, c_name: &str, args: &[Expr]) -> String {
        self.need("prove_text.h");
        let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
        format!("{}({})", c_name, rendered.join(", "))
    }

    // ── Higher-order functions ───────────────────────────────────

    fn emit_hof_map(&mut self, args: &[Expr]) -> String {
        self.need("prove_hof.h");
        let list = self.emit_expr(&args[0]);
        let elem_ty = self.list_elem_type(&args[0]);
        let result_ty = self.lambda_result_type(&args[1], &elem_ty);
        let fn_name = self.hoist_lambda(&args[1], &elem_ty, "map", None);
        let result_ct = self.ctype(&result_ty);
        format!(
            "prove_list_map({}, {}, sizeof({}))",
            list, fn_name, result_ct.decl
        )
    }

    fn emit_hof_filter(&mut self, args: &[Expr]) -> String {
        self.need("prove_hof.h");
        let list = self.emit_expr(&args[0]);
        let elem_ty = self.list_elem_type(&args[0]);
        let fn_name = self.hoist_lambda(&args[1], &elem_ty, "filter", None);
        format!("prove_list_filter({}, {})", list, fn_name)
    }

    fn emit_hof_reduce(&mut self, args: &[Expr]) -> String {
        self.need("prove_hof.h");
        let list = self.emit_expr(&args[0]);
        let elem_ty = self.list_elem_type(&args[0]);
        let accum_ty = self.expr_type(&args[1]);
        let accum_ct = self.ctype(&accum_ty);
        let accum_tmp = self.tmp();
        let accum_init = self.emit_expr(&args[1]);
        self.line(format!("{} {} = {};", accum_ct.decl, accum_tmp, accum_init));
        let fn_name = self.hoist_lambda(&args[2], &elem_ty, "reduce", Some(&accum_ty));
        self.line(format!(
            "prove_list_reduce({}, &{}, {});",
            list, accum_tmp, fn_name
        ));
        accum_tmp
    }

    fn emit_hof_each(&mut self, args: &[Expr]) -> String {
        self.need("prove_hof.h");
        let list = self.emit_expr(&args[0]);
        let elem_ty = self.list_elem_type(&args[0]);
        let fn_name = self.hoist_lambda(&args[1], &elem_ty, "each", None);
        format!("prove_list_each({}, {})", list, fn_name)
    }

    fn list_elem_type(&mut self, expr: &Expr) -> Type {
        match self.expr_type(expr).unwrap_refined() {
            Type::List(inner) => (**inner).clone(),
            _ => Type::Error,
        }
    }

    fn lambda_result_type(&mut self, expr: &Expr, elem_ty: &Type) -> Type {
        if let ExprKind::Lambda { body, .. } = &expr.kind {
            let ty = self.expr_type(body);
            if !ty.is_error() {
                return ty;
            }
        }
        elem_ty.clone()
    }

    /// Hoist a captureless lambda to a file-scope C function matching
    /// the runtime's higher-order calling convention and return its
    /// name. Non-lambda arguments pass through as function values.
    fn hoist_lambda(
        &mut self,
        expr: &Expr,
        elem_ty: &Type,
        kind: &str,
        accum_ty: Option<&Type>,
    ) -> String {
        let ExprKind::Lambda { params, body } = &expr.kind else {
            return self.emit_expr(expr);
        };

        self.lambda_counter += 1;
        let name = format!("_lambda_{}", self.lambda_counter);
        let elem_ct = self.ctype(elem_ty);

        // Lambda bodies are pure expressions; render into a scratch
        // buffer so enclosing statements are not disturbed.
        let saved_out = std::mem::take(&mut self.out);
        let saved_indent = std::mem::replace(&mut self.indent, 1);
        let saved_locals = self.locals.clone();
        match kind {
            "reduce" => {
                let accum = params.first().cloned().unwrap_or_else(|| "_acc".to_string());
                let elem = params.get(1).cloned().unwrap_or_else(|| "_el".to_string());
                let accum_ty = accum_ty.cloned().unwrap_or_else(|| elem_ty.clone());
                self.set_local(&accum, accum_ty.clone());
                self.set_local(&elem, elem_ty.clone());
                let accum_ct = self.ctype(&accum_ty);
                let body_code = self.emit_expr(body);
                let lam = format!(
                    "static void {name}(void *_accum, const void *_elem) {{\n    {act} *{accum} = ({act}*)_accum;\n    {ect} {elem} = *({ect}*)_elem;\n    *{accum} = {body};\n}}\n",
                    name = name,
                    act = accum_ct.decl,
                    accum = accum,
                    ect = elem_ct.decl,
                    elem = elem,
                    body = body_code
                );
                self.lambdas.push(lam);
            }
            "filter" => {
                let param = params.first().cloned().unwrap_or_else(|| "_x".to_string());
                self.set_local(&param, elem_ty.clone());
                let body_code = self.emit_expr(body);
                let lam = format!(
                    "static bool {name}(const void *_arg) {{\n    {ect} {param} = *({ect}*)_arg;\n    return {body};\n}}\n",
                    name = name,
                    ect = elem_ct.decl,
                    param = param,
                    body = body_code
                );
                self.lambdas.push(lam);
            }
            "each" => {
                let param = params.first().cloned().unwrap_or_else(|| "_x".to_string());
                self.set_local(&param, elem_ty.clone());
                let body_code = self.emit_expr(body);
                let lam = format!(
                    "static void {name}(const void *_arg) {{\n    {ect} {param} = *({ect}*)_arg;\n    {body};\n}}\n",
                    name = name,
                    ect = elem_ct.decl,
                    param = param,
                    body = body_code
                );
                self.lambdas.push(lam);
            }
            _ => {
                let param = params.first().cloned().unwrap_or_else(|| "_x".to_string());
                self.set_local(&param, elem_ty.clone());
                let result_ty = {
                    let ty = self.expr_type(body);
                    if ty.is_error() {
                        elem_ty.clone()
                    } else {
                        ty
                    }
                };
                let result_ct = self.ctype(&result_ty);
                let body_code = self.emit_expr(body);
                let lam = format!(
                    "static void *{name}(const void *_arg) {{\n    {ect} {param} = *({ect}*)_arg;\n    static {rct} _result;\n    _result = {body};\n    return &_result;\n}}\n",
                    name = name,
                    ect = elem_ct.decl,
                    param = param,
                    rct = result_ct.decl,
                    body = body_code
                );
                self.lambdas.push(lam);
            }
        }
        self.locals = saved_locals;
        self.indent = saved_indent;
        self.out = saved_out;
        name
    }

    // ── Pipes ────────────────────────────────────────────────────

    fn emit_pipe(&mut self, expr: &Expr, left: &Expr, right: &Expr) -> String {
        // Desugared on the typed AST: the pipe's call target was
        // recorded against the pipe span.
        let target = self.typed.call_targets.get(&expr.span).cloned();
        let mut args: Vec<Expr> = vec![left.clone()];
        if let ExprKind::Call {
            args: extra_args, ..
        } = &right.kind
        {
            args.extend(extra_args.iter().cloned());
        }
        if let Some(key) = target {
            if let Some(sig) = self.res.table.function(&key).cloned() {
                return self.emit_resolved_call(&sig, &args);
            }
        }
        let callee = self.emit_expr(right);
        let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
        format!("{}({})", callee, rendered.join(", "))
    }

    // ── Fail propagation ─────────────────────────────────────────

    /// `expr!` lowers to an early return of the error arm. Option
    /// carriers are treated as `Result<T, Unit>` at this layer: the
    /// none arm synthesizes an error, or panics when the enclosing
    /// function cannot fail.
    fn emit_fail_prop(&mut self, inner: &Expr) -> String {
        let inner_ty = self.expr_type(inner);
        let rendered = self.emit_expr(inner);
        let tmp = self.tmp();

        let is_option = matches!(
            inner_ty.unwrap_refined(),
            Type::Applied { base, .. } if base == "Option"
        );

        if is_option {
            let ct = self.ctype(&inner_ty);
            self.line(format!("{} {} = {};", ct.decl, tmp, rendered));
            self.line(format!("if ({}.tag == 0) {{", tmp));
            self.indent += 1;
            if self.in_main {
                self.line("fprintf(stderr, \"error: unexpected none\\n\");");
                self.line("prove_runtime_cleanup();");
                self.line("return 1;");
            } else if self.current_can_fail {
                self.need("prove_result.h");
                self.line("return prove_result_err(prove_string_from_cstr(\"none\"));");
            } else {
                self.line("prove_panic(\"unwrapped none\");");
            }
            self.indent -= 1;
            self.line("}");
            return format!("{}.value", tmp);
        }

        self.need("prove_result.h");
        self.line(format!("Prove_Result {} = {};", tmp, rendered));
        if self.in_main {
            self.line(format!("if (prove_result_is_err({})) {{", tmp));
            self.indent += 1;
            let err_str = self.tmp();
            self.line(format!(
                "Prove_String *{} = (Prove_String*){}.data;",
                err_str, tmp
            ));
            self.line(format!(
                "if ({e}) fprintf(stderr, \"error: %.*s\\n\", (int){e}->length, {e}->data);",
                e = err_str
            ));
            self.line("prove_runtime_cleanup();");
            self.line("return 1;");
            self.indent -= 1;
            self.line("}");
        } else {
            self.line(format!(
                "if (prove_result_is_err({t})) return {t};",
                t = tmp
            ));
        }

        // Unwrap the success value.
        match inner_ty.success_type() {
            Some(success) => {
                let success = self.apply_subst(success);
                let ct = self.ctype(&success);
                if ct.decl.ends_with('*') {
                    format!("({})prove_result_unwrap_ptr({})", ct.decl, tmp)
                } else {
                    match ct.decl.as_str() {
                        "double" | "float" => format!("prove_result_unwrap_double({})", tmp),
                        "bool" => format!("(bool)prove_result_unwrap_int({})", tmp),
                        _ => format!("({})prove_result_unwrap_int({})", ct.decl, tmp),
                    }
                }
            }
            None => tmp,
        }
    }

    // ── valid ────────────────────────────────────────────────────

    fn emit_valid(&mut self, expr: &Expr, name: &str, args: &Option<Vec<Expr>>) -> String {
        let target = self.typed.call_targets.get(&expr.span).cloned();
        let Some(key) = target else {
            return format!("/* unresolved valid {} */ false", name);
        };
        let Some(sig) = self.res.table.function(&key).cloned() else {
            return format!("/* unresolved valid {} */ false", name);
        };
        let mangled = mangle_name(Some(Verb::Validates), &sig.name, &sig.param_types);
        match args {
            Some(args) => {
                let rendered: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("{}({})", mangled, rendered.join(", "))
            }
            None => mangled,
        }
    }
}
