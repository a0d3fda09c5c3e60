//! C code generation for checked Prove modules.
//!
//! Emits one translation unit per module against the fixed
//! reference-counted runtime ABI. Algebraic types become tagged
//! unions with inline constructor helpers, refinements erase to
//! their base C type, fail propagation lowers to early returns, and
//! captureless lambdas are hoisted to file-scope functions.
//!
//! Emission is deterministic: the same typed module always produces
//! byte-identical C.

pub mod ctypes;

mod expressions;
mod statements;

pub use ctypes::{mangle_name, mangle_type_name, map_type};

use std::collections::{BTreeSet, HashMap};

use crate::ast::{
    Decl, Expr, ExprKind, FunctionDef, MainDef, Module, Stmt, StmtKind, TypeBody, TypeDef,
};
use crate::resolver::{FunctionSig, Resolution};
use crate::semantics::types::Type;
use crate::semantics::TypedModule;
use ctypes::{is_arena, mangle_instance, mangle_variant, variant_tag, CType};

/// Foreign library → system header, for the include block.
fn foreign_header(library: &str) -> Option<&'static str> {
    match library {
        "libm" => Some("math.h"),
        "libpthread" => Some("pthread.h"),
        "libdl" => Some("dlfcn.h"),
        "librt" => Some("time.h"),
        _ => None,
    }
}

/// A generated translation unit plus the libraries its foreign
/// blocks require at link time.
#[derive(Debug, Clone)]
pub struct CUnit {
    pub source: String,
    pub link_libs: Vec<String>,
}

pub struct CEmitter<'a> {
    module: &'a Module,
    pub(crate) res: &'a Resolution,
    pub(crate) typed: &'a TypedModule,
    pub(crate) out: Vec<String>,
    pub(crate) indent: usize,
    pub(crate) tmp_counter: usize,
    pub(crate) lambda_counter: usize,
    pub(crate) lambdas: Vec<String>,
    /// Locals of the function being emitted, in declaration order.
    pub(crate) locals: Vec<(String, Type)>,
    pub(crate) needed_headers: BTreeSet<&'static str>,
    pub(crate) current_ret: Type,
    pub(crate) current_can_fail: bool,
    pub(crate) in_main: bool,
    /// Active monomorphization substitution while emitting a generic
    /// function's specialization.
    pub(crate) subst: HashMap<String, Type>,
    /// Scrutinee of an implicit-match body: the first parameter.
    pub(crate) implicit_subject: Option<(String, Type)>,
    foreign_libs: BTreeSet<String>,
}

pub fn emit(module: &Module, res: &Resolution, typed: &TypedModule) -> CUnit {
    let mut emitter = CEmitter {
        module,
        res,
        typed,
        out: Vec::new(),
        indent: 0,
        tmp_counter: 0,
        lambda_counter: 0,
        lambdas: Vec::new(),
        locals: Vec::new(),
        needed_headers: BTreeSet::new(),
        current_ret: Type::Unit,
        current_can_fail: false,
        in_main: false,
        subst: HashMap::new(),
        implicit_subject: None,
        foreign_libs: BTreeSet::new(),
    };
    emitter.emit_unit()
}

impl<'a> CEmitter<'a> {
    fn emit_unit(&mut self) -> CUnit {
        let module: &'a Module = self.module;

        // The main wrapper always touches strings and process args.
        self.needed_headers.insert("prove_runtime.h");
        self.needed_headers.insert("prove_string.h");
        self.needed_headers.insert("prove_input_output.h");

        for fb in module.foreign_blocks() {
            self.foreign_libs.insert(fb.library.clone());
        }

        // Types first.
        let mut type_section: Vec<String> = Vec::new();
        for td in module.types() {
            type_section.push(format!(
                "typedef struct {} {};",
                mangle_type_name(&td.name),
                mangle_type_name(&td.name)
            ));
        }
        if !type_section.is_empty() {
            type_section.push(String::new());
        }
        for td in module.types() {
            self.emit_type_def(td);
        }
        type_section.extend(self.take_out());

        // Foreign externs.
        let mut extern_section: Vec<String> = Vec::new();
        for fb in module.foreign_blocks() {
            for ff in &fb.functions {
                if let Some(sig) = self.foreign_sig(&ff.name) {
                    let ret = map_type(&sig.return_type).decl;
                    let params = self.c_params(&sig);
                    extern_section.push(format!("extern {} {}({});", ret, ff.name, params));
                }
            }
        }
        if !extern_section.is_empty() {
            extern_section.push(String::new());
        }

        // Function bodies (and forwards collected along the way).
        let mut forwards: Vec<String> = Vec::new();
        for decl in &module.declarations {
            if let Decl::Function(fd) = decl {
                for (mangled, sig, subst) in self.specializations_of(fd) {
                    let ret = self.c_return_decl(&sig, &subst);
                    let params = self.c_params_subst(&sig, &subst);
                    forwards.push(format!("{} {}({});", ret, mangled, params));
                }
            }
        }
        if !forwards.is_empty() {
            forwards.push(String::new());
        }

        let mut body_section: Vec<String> = Vec::new();
        for decl in &module.declarations {
            if let Decl::Function(fd) = decl {
                for (mangled, sig, subst) in self.specializations_of(fd) {
                    self.emit_function(fd, &mangled, &sig, subst);
                }
                body_section.extend(self.take_out());
            }
        }
        if let Some(md) = module.main() {
            self.emit_main(md);
            body_section.extend(self.take_out());
        }

        // Includes last: emission decided which headers are needed.
        let mut lines: Vec<String> = Vec::new();
        lines.push("#include <stdint.h>".to_string());
        lines.push("#include <stdbool.h>".to_string());
        lines.push("#include <stdlib.h>".to_string());
        lines.push("#include <stdio.h>".to_string());
        for lib in &self.foreign_libs {
            if let Some(header) = foreign_header(lib) {
                lines.push(format!("#include <{}>", header));
            }
        }
        for header in &self.needed_headers {
            lines.push(format!("#include \"{}\"", header));
        }
        lines.push(String::new());
        lines.extend(type_section);
        lines.extend(extern_section);
        lines.extend(forwards);
        for lambda in &self.lambdas {
            lines.push(lambda.clone());
        }
        lines.extend(body_section);

        CUnit {
            source: lines.join("\n") + "\n",
            link_libs: self.foreign_libs.iter().cloned().collect(),
        }
    }

    // ── Output helpers ───────────────────────────────────────────

    pub(crate) fn line(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.out.push(String::new());
        } else {
            self.out.push(format!("{}{}", "    ".repeat(self.indent), text));
        }
    }

    pub(crate) fn tmp(&mut self) -> String {
        self.tmp_counter += 1;
        format!("_tmp{}", self.tmp_counter)
    }

    fn take_out(&mut self) -> Vec<String> {
        std::mem::take(&mut self.out)
    }

    pub(crate) fn need(&mut self, header: &'static str) {
        self.needed_headers.insert(header);
    }

    pub(crate) fn ctype(&mut self, ty: &Type) -> CType {
        let applied = self.apply_subst(ty);
        let ct = map_type(&applied);
        if let Some(header) = ct.header {
            self.needed_headers.insert(header);
        }
        ct
    }

    pub(crate) fn apply_subst(&self, ty: &Type) -> Type {
        if self.subst.is_empty() {
            return ty.clone();
        }
        match ty {
            Type::Var(name) => self.subst.get(name).cloned().unwrap_or_else(|| ty.clone()),
            Type::List(inner) => Type::List(Box::new(self.apply_subst(inner))),
            Type::Applied { base, args } => Type::Applied {
                base: base.clone(),
                args: args.iter().map(|a| self.apply_subst(a)).collect(),
            },
            Type::Function {
                verb,
                params,
                ret,
                can_fail,
            } => Type::Function {
                verb: *verb,
                params: params.iter().map(|p| self.apply_subst(p)).collect(),
                ret: Box::new(self.apply_subst(ret)),
                can_fail: *can_fail,
            },
            _ => ty.clone(),
        }
    }

    /// The checked type of an expression, with the active
    /// monomorphization substitution applied.
    pub(crate) fn expr_type(&self, expr: &Expr) -> Type {
        let ty = self
            .typed
            .expr_types
            .get(&expr.span)
            .cloned()
            .unwrap_or(Type::Error);
        let ty = self.apply_subst(&ty);
        if !ty.is_error() {
            return ty;
        }
        // Pattern-bound locals inside specialized generic bodies can
        // be looked up by name.
        if let ExprKind::Identifier(name) = &expr.kind {
            if let Some((_, ty)) = self.locals.iter().rev().find(|(n, _)| n == name) {
                return ty.clone();
            }
        }
        ty
    }

    pub(crate) fn set_local(&mut self, name: &str, ty: Type) {
        self.locals.push((name.to_string(), ty));
    }

    // ── Signatures ───────────────────────────────────────────────

    fn signature_of(&self, fd: &FunctionDef) -> Option<FunctionSig> {
        self.res
            .table
            .candidates(&fd.name)
            .into_iter()
            .find(|s| s.verb == Some(fd.verb) && s.span == fd.span)
            .cloned()
    }

    fn foreign_sig(&self, name: &str) -> Option<FunctionSig> {
        self.res
            .table
            .candidates(name)
            .into_iter()
            .find(|s| matches!(s.kind, crate::resolver::FnKind::Foreign { .. }))
            .cloned()
    }

    /// Every concrete emission of a function: one entry for plain
    /// functions, one per recorded instantiation for generics.
    fn specializations_of(
        &self,
        fd: &FunctionDef,
    ) -> Vec<(String, FunctionSig, HashMap<String, Type>)> {
        let Some(sig) = self.signature_of(fd) else {
            return Vec::new();
        };
        if !sig.is_generic() {
            let mangled = mangle_name(sig.verb, &sig.name, &sig.param_types);
            return vec![(mangled, sig, HashMap::new())];
        }
        let mut result = Vec::new();
        for inst in self.typed.mono.instantiations_of(&sig.key()) {
            let subst: HashMap<String, Type> = sig
                .type_params
                .iter()
                .cloned()
                .zip(inst.type_args.iter().cloned())
                .collect();
            let mangled = mangle_instance(
                sig.verb,
                &sig.name,
                &sig.param_types,
                &inst.args_key(),
            );
            result.push((mangled, sig.clone(), subst));
        }
        result
    }

    fn c_return_decl(&self, sig: &FunctionSig, subst: &HashMap<String, Type>) -> String {
        let saved = subst.clone();
        let ret = apply_map(&sig.return_type, &saved);
        if sig.can_fail {
            return "Prove_Result".to_string();
        }
        map_type(&ret).decl
    }

    fn c_params(&self, sig: &FunctionSig) -> String {
        self.c_params_subst(sig, &HashMap::new())
    }

    fn c_params_subst(&self, sig: &FunctionSig, subst: &HashMap<String, Type>) -> String {
        if sig.param_types.is_empty() {
            return "void".to_string();
        }
        sig.param_names
            .iter()
            .zip(&sig.param_types)
            .map(|(name, ty)| format!("{} {}", map_type(&apply_map(ty, subst)).decl, name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ── Type definitions ─────────────────────────────────────────

    fn emit_type_def(&mut self, td: &TypeDef) {
        let cname = mangle_type_name(&td.name);
        match &td.body {
            TypeBody::Record { fields, .. } => {
                self.line(format!("struct {} {{", cname));
                self.indent += 1;
                for f in fields {
                    let ty = self.resolved_field_type(&td.name, &f.name);
                    let ct = self.ctype(&ty);
                    self.line(format!("{} {};", ct.decl, f.name));
                }
                self.indent -= 1;
                self.line("};");
                self.line("");
            }
            TypeBody::Algebraic { variants, .. } => {
                self.line("enum {");
                self.indent += 1;
                for (i, v) in variants.iter().enumerate() {
                    self.line(format!("{} = {},", variant_tag(&td.name, &v.name), i));
                }
                self.indent -= 1;
                self.line("};");
                self.line("");

                self.line(format!("struct {} {{", cname));
                self.indent += 1;
                self.line("uint8_t tag;");
                self.line("union {");
                self.indent += 1;
                for v in variants {
                    if v.fields.is_empty() {
                        self.line(format!("uint8_t _{};", v.name));
                        continue;
                    }
                    self.line("struct {");
                    self.indent += 1;
                    for f in &v.fields {
                        let ty = self.resolved_variant_field_type(&td.name, &v.name, &f.name);
                        let ct = self.ctype(&ty);
                        self.line(format!("{} {};", ct.decl, f.name));
                    }
                    self.indent -= 1;
                    self.line(format!("}} {};", v.name));
                }
                self.indent -= 1;
                self.line("} payload;");
                self.indent -= 1;
                self.line("};");
                self.line("");

                for v in variants {
                    let tag = variant_tag(&td.name, &v.name);
                    let ctor = mangle_variant(&td.name, &v.name);
                    let params: Vec<String> = v
                        .fields
                        .iter()
                        .map(|f| {
                            let ty = self.resolved_variant_field_type(&td.name, &v.name, &f.name);
                            let ct = self.ctype(&ty);
                            format!("{} {}", ct.decl, f.name)
                        })
                        .collect();
                    let param_str = if params.is_empty() {
                        "void".to_string()
                    } else {
                        params.join(", ")
                    };
                    self.line(format!(
                        "static inline {} {}({}) {{",
                        cname, ctor, param_str
                    ));
                    self.indent += 1;
                    self.line(format!("{} _v;", cname));
                    self.line(format!("_v.tag = {};", tag));
                    for f in &v.fields {
                        self.line(format!("_v.payload.{}.{} = {};", v.name, f.name, f.name));
                    }
                    self.line("return _v;");
                    self.indent -= 1;
                    self.line("}");
                    self.line("");
                }
            }
            TypeBody::Refinement { .. } => {
                // Refinements erase; only the typedef alias remains.
                let base = self
                    .res
                    .table
                    .resolve_type(&td.name)
                    .cloned()
                    .unwrap_or(Type::Error);
                let ct = self.ctype(&base);
                self.line(format!("typedef {} {}_Repr;", ct.decl, cname));
                self.line("");
            }
        }
    }

    fn resolved_field_type(&self, type_name: &str, field: &str) -> Type {
        match self.res.table.resolve_type(type_name) {
            Some(Type::Record { fields, .. }) => fields
                .iter()
                .find(|(n, _)| n == field)
                .map(|(_, t)| t.clone())
                .unwrap_or(Type::Error),
            _ => Type::Error,
        }
    }

    fn resolved_variant_field_type(&self, type_name: &str, variant: &str, field: &str) -> Type {
        match self.res.table.resolve_type(type_name) {
            Some(Type::Algebraic { variants, .. }) => variants
                .iter()
                .find(|v| v.name == variant)
                .and_then(|v| v.fields.iter().find(|(n, _)| n == field))
                .map(|(_, t)| t.clone())
                .unwrap_or(Type::Error),
            _ => Type::Error,
        }
    }

    // ── Functions ────────────────────────────────────────────────

    fn emit_function(
        &mut self,
        fd: &FunctionDef,
        mangled: &str,
        sig: &FunctionSig,
        subst: HashMap<String, Type>,
    ) {
        self.subst = subst;
        self.current_ret = self.apply_subst(&sig.return_type);
        self.current_can_fail = sig.can_fail;
        self.locals.clear();
        self.tmp_counter = 0;
        self.implicit_subject = None;

        let ret_decl = if sig.can_fail {
            self.need("prove_result.h");
            "Prove_Result".to_string()
        } else {
            self.ctype(&sig.return_type).decl
        };
        let mut params: Vec<String> = Vec::new();
        for (name, ty) in sig.param_names.iter().zip(&sig.param_types) {
            let ct = self.ctype(ty);
            params.push(format!("{} {}", ct.decl, name));
            let applied = self.apply_subst(ty);
            self.set_local(name, applied);
        }
        let param_str = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };

        if let (Some(pname), Some(pty)) = (
            sig.param_names.first(),
            sig.param_types.first(),
        ) {
            if matches!(pty.unwrap_refined(), Type::Algebraic { .. }) {
                self.implicit_subject = Some((pname.clone(), pty.clone()));
            }
        }

        self.line(format!("{} {}({}) {{", ret_decl, mangled, param_str));
        self.indent += 1;

        // `assume` clauses validate at the boundary.
        for ann in &fd.annotations {
            if let crate::ast::AnnotationKind::Assume(cond) = &ann.kind {
                let rendered = self.emit_expr(cond);
                self.line(format!(
                    "if (!({})) prove_panic(\"assumption violated in {}\");",
                    rendered, fd.name
                ));
            }
        }

        let param_names: Vec<String> = sig.param_names.clone();
        self.emit_body(&fd.body, &param_names);

        self.indent -= 1;
        self.line("}");
        self.line("");
        self.subst.clear();
    }

    /// The type the body's terminal expression must produce: the
    /// success arm for failable functions, the return type otherwise.
    fn effective_value_type(&self) -> Type {
        if self.current_can_fail {
            self.current_ret
                .success_type()
                .cloned()
                .unwrap_or(Type::Unit)
        } else {
            self.current_ret.clone()
        }
    }

    /// Emit a body with last-expression-is-return semantics.
    fn emit_body(&mut self, body: &[Stmt], param_names: &[String]) {
        let is_unit = matches!(self.effective_value_type(), Type::Unit);

        for (i, stmt) in body.iter().enumerate() {
            let is_last = i == body.len() - 1;
            if !is_last {
                self.emit_stmt(stmt);
                continue;
            }
            match &stmt.kind {
                StmtKind::Expr(expr) if !is_unit => {
                    self.emit_return_expr(expr, param_names);
                }
                _ => {
                    self.emit_stmt(stmt);
                    self.emit_releases(None, param_names);
                    if self.current_can_fail {
                        self.need("prove_result.h");
                        self.line("return prove_result_ok();");
                    }
                }
            }
        }
        if body.is_empty() {
            self.emit_releases(None, param_names);
            if self.current_can_fail {
                self.need("prove_result.h");
                self.line("return prove_result_ok();");
            }
        }
    }

    fn emit_return_expr(&mut self, expr: &Expr, param_names: &[String]) {
        // An implicit match body returns from inside its arms.
        if let ExprKind::Match { subject: None, .. } = &expr.kind {
            self.emit_implicit_match_return(expr);
            return;
        }

        let value_ty = self.expr_type(expr);
        let rendered = self.emit_expr(expr);
        let tmp = self.tmp();
        let ct = self.ctype(&value_ty);
        self.line(format!("{} {} = {};", ct.decl, tmp, rendered));
        self.emit_releases(Some(&tmp), param_names);
        if self.current_can_fail
            && !matches!(value_ty, Type::Applied { ref base, .. } if base == "Result")
        {
            self.emit_fallible_return(&tmp, &value_ty);
        } else {
            self.line(format!("return {};", tmp));
        }
    }

    /// Return a success value from a failable function, wrapping it
    /// into the payload-carrying Prove_Result. Aggregate values are
    /// boxed so the pointer arm can carry them.
    pub(crate) fn emit_fallible_return(&mut self, value: &str, ty: &Type) {
        self.need("prove_result.h");
        let ct = map_type(&self.apply_subst(ty));
        if is_aggregate_decl(&ct.decl) {
            let boxed = self.tmp();
            self.line(format!(
                "{decl} *{boxed} = ({decl}*)prove_alloc(sizeof({decl}));",
                decl = ct.decl,
                boxed = boxed
            ));
            self.line(format!("*{} = {};", boxed, value));
            self.line(format!("return prove_result_ok_ptr({});", boxed));
            return;
        }
        let wrapped = self.wrap_result_ok(value, ty);
        self.line(format!("return {};", wrapped));
    }

    /// Release every owned heap local at scope exit, keeping the
    /// returned value alive. Arena values are exempt.
    pub(crate) fn emit_releases(&mut self, keep: Option<&str>, param_names: &[String]) {
        let releases: Vec<String> = self
            .locals
            .iter()
            .filter(|(name, ty)| {
                Some(name.as_str()) != keep
                    && !param_names.iter().any(|p| p == name)
                    && map_type(ty).is_pointer
                    && !is_arena(ty)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in releases {
            self.line(format!("prove_release({});", name));
        }
    }

    pub(crate) fn wrap_result_ok(&mut self, value: &str, ty: &Type) -> String {
        self.need("prove_result.h");
        let ct = map_type(ty);
        if ct.is_pointer || ct.decl.ends_with('*') {
            format!("prove_result_ok_ptr({})", value)
        } else {
            match ct.decl.as_str() {
                "double" | "float" => format!("prove_result_ok_double({})", value),
                "void" => "prove_result_ok()".to_string(),
                _ => format!("prove_result_ok_int((int64_t){})", value),
            }
        }
    }

    // ── main ─────────────────────────────────────────────────────

    fn emit_main(&mut self, md: &MainDef) {
        self.subst.clear();
        self.current_ret = Type::Unit;
        self.current_can_fail = md.can_fail;
        self.in_main = true;
        self.locals.clear();
        self.tmp_counter = 0;
        self.implicit_subject = None;

        self.line("int main(int argc, char **argv) {");
        self.indent += 1;
        self.line("prove_runtime_init();");
        self.line("prove_io_init_args(argc, argv);");

        for stmt in &md.body {
            self.emit_stmt(stmt);
        }

        self.emit_releases(None, &[]);
        self.line("prove_runtime_cleanup();");
        self.line("return 0;");
        self.indent -= 1;
        self.line("}");
        self.in_main = false;
    }
}

/// Struct-valued C types cannot ride in the Result payload union
/// directly; they are boxed.
fn is_aggregate_decl(decl: &str) -> bool {
    !decl.ends_with('*')
        && !matches!(
            decl,
            "int8_t" | "int16_t" | "int32_t" | "int64_t" | "uint8_t" | "uint16_t" | "uint32_t"
                | "uint64_t" | "double" | "float" | "bool" | "char" | "void"
        )
}

fn apply_map(ty: &Type, subst: &HashMap<String, Type>) -> Type {
    if subst.is_empty() {
        return ty.clone();
    }
    match ty {
        Type::Var(name) => subst.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::List(inner) => Type::List(Box::new(apply_map(inner, subst))),
        Type::Applied { base, args } => Type::Applied {
            base: base.clone(),
            args: args.iter().map(|a| apply_map(a, subst)).collect(),
        },
        _ => ty.clone(),
    }
}
