//! Name resolution for the Prove language.
//!
//! Two passes per module. Pass 1 registers every top-level
//! declaration under the module's root scope: types, constants,
//! functions keyed by `(verb, name, param-type-key)`, algebraic
//! variant constructors, foreign bindings, and invariant networks.
//! Pass 2 walks each body, opening a scope per lambda, match arm, and
//! block, binding parameters and `as`-declarations, and resolving
//! every identifier outermost-out.

pub mod symbol_table;

pub use symbol_table::{
    FnKind, FunctionKey, FunctionSig, Resolved, Symbol, SymbolId, SymbolKind, SymbolTable,
};

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::ast::{
    AnnotationKind, ConstantDef, Decl, Expr, ExprKind, FunctionDef, ImportGroup, MainDef, MatchArm,
    Module, Param, Pattern, Stmt, StmtKind, TypeBody, TypeDef, TypeExpr, Verb,
};
use crate::diagnostic::Diagnostic;
use crate::lexer::Span;
use crate::semantics::types::{
    boolean, character, error_type, integer, string, Type, VariantInfo, PRIMITIVE_NAMES,
};

/// Builtin signature row: name, parameter types, return type, IO flag.
struct BuiltinSig(&'static str, Vec<Type>, Type, bool);

fn built_in_functions() -> Vec<BuiltinSig> {
    {
        let var = |n: &str| Type::Var(n.to_string());
        let list = |t: Type| Type::List(Box::new(t));
        let func = |params: Vec<Type>, ret: Type| Type::Function {
            verb: None,
            params,
            ret: Box::new(ret),
            can_fail: false,
        };
        vec![
            // io
            BuiltinSig("println", vec![string()], Type::Unit, true),
            BuiltinSig("print", vec![string()], Type::Unit, true),
            BuiltinSig("readln", vec![], string(), true),
            BuiltinSig("read_file", vec![string()], Type::result(string(), error_type()), true),
            BuiltinSig(
                "write_file",
                vec![string(), string()],
                Type::result(Type::Unit, error_type()),
                true,
            ),
            BuiltinSig("open", vec![string()], Type::result(integer(), error_type()), true),
            BuiltinSig("close", vec![integer()], Type::Unit, true),
            BuiltinSig("flush", vec![integer()], Type::Unit, true),
            BuiltinSig("sleep", vec![integer()], Type::Unit, true),
            // numeric
            BuiltinSig("clamp", vec![integer(), integer(), integer()], integer(), false),
            BuiltinSig("max", vec![integer(), integer()], integer(), false),
            BuiltinSig("min", vec![integer(), integer()], integer(), false),
            BuiltinSig("abs", vec![integer()], integer(), false),
            // strings
            BuiltinSig("trim", vec![string()], string(), false),
            BuiltinSig("lower", vec![string()], string(), false),
            BuiltinSig("upper", vec![string()], string(), false),
            BuiltinSig("contains", vec![string(), string()], boolean(), false),
            BuiltinSig("split", vec![string(), string()], list(string()), false),
            BuiltinSig("join", vec![list(string()), string()], string(), false),
            BuiltinSig("char_at", vec![string(), integer()], character(), false),
            BuiltinSig("to_string", vec![var("T")], string(), false),
            BuiltinSig("len", vec![var("T")], integer(), false),
            // lists
            BuiltinSig(
                "map",
                vec![list(var("T")), func(vec![var("T")], var("U"))],
                list(var("U")),
                false,
            ),
            BuiltinSig(
                "filter",
                vec![list(var("T")), func(vec![var("T")], boolean())],
                list(var("T")),
                false,
            ),
            BuiltinSig(
                "reduce",
                vec![
                    list(var("T")),
                    var("U"),
                    func(vec![var("U"), var("T")], var("U")),
                ],
                var("U"),
                false,
            ),
            BuiltinSig(
                "each",
                vec![list(var("T")), func(vec![var("T")], Type::Unit)],
                Type::Unit,
                false,
            ),
            BuiltinSig("append", vec![list(var("T")), var("T")], list(var("T")), false),
            BuiltinSig("sum", vec![list(integer())], integer(), false),
        ]
    }
}

lazy_static! {
    /// Standard library modules a `with ... use` may name.
    static ref KNOWN_MODULES: BTreeSet<&'static str> = {
        ["Text", "List", "Table", "File", "Process", "Http", "Parse", "Time", "Math", "Io"]
            .into_iter()
            .collect()
    };
}

/// Everything later stages need from resolution.
pub struct Resolution {
    pub table: SymbolTable,
    /// Identifier-use, declaration, and pattern-binding spans →
    /// resolved scope symbol.
    pub bindings: HashMap<Span, SymbolId>,
    /// Lambda expression span → its parameter symbols in order.
    pub lambda_params: HashMap<Span, Vec<SymbolId>>,
    pub networks: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Resolver {
    table: SymbolTable,
    bindings: HashMap<Span, SymbolId>,
    lambda_params: HashMap<Span, Vec<SymbolId>>,
    networks: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
    /// Type parameters in scope while resolving a signature.
    type_params: Vec<String>,
    /// Implicit type parameters collected from a signature.
    collected_params: Vec<String>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            table: SymbolTable::new(),
            bindings: HashMap::new(),
            lambda_params: HashMap::new(),
            networks: BTreeSet::new(),
            diagnostics: Vec::new(),
            type_params: Vec::new(),
            collected_params: Vec::new(),
        }
    }

    pub fn resolve(mut self, module: &Module) -> Resolution {
        self.register_builtins();

        // Pass 1: declaration collection.
        for decl in &module.declarations {
            match decl {
                Decl::Type(td) => self.register_type(td),
                Decl::InvariantNetwork(net) => {
                    if !self.networks.insert(net.name.clone()) {
                        self.error("E301", format!("duplicate definition of '{}'", net.name), net.span);
                    }
                }
                _ => {}
            }
        }
        for decl in &module.declarations {
            match decl {
                Decl::Function(fd) => self.register_function(fd),
                Decl::Main(md) => self.register_main(md),
                Decl::Constant(cd) => self.register_constant(cd),
                Decl::Import(imp) => {
                    if !KNOWN_MODULES.contains(imp.module.as_str()) {
                        self.error(
                            "E312",
                            format!("unknown module '{}' in import", imp.module),
                            imp.span,
                        );
                    }
                    for group in &imp.groups {
                        self.register_import_group(group, imp.span);
                    }
                }
                Decl::Foreign(fb) => {
                    for ff in &fb.functions {
                        self.register_foreign_fn(&fb.library, ff);
                    }
                }
                _ => {}
            }
        }

        // Pass 2: reference resolution.
        for decl in &module.declarations {
            match decl {
                Decl::Function(fd) => self.resolve_function(fd),
                Decl::Main(md) => self.resolve_main(md),
                Decl::Constant(cd) => self.resolve_expr(&cd.value),
                Decl::InvariantNetwork(net) => {
                    // Constraints may reference functions by name only.
                    for c in &net.constraints {
                        self.resolve_expr(c);
                    }
                }
                _ => {}
            }
        }

        Resolution {
            table: self.table,
            bindings: self.bindings,
            lambda_params: self.lambda_params,
            networks: self.networks,
            diagnostics: self.diagnostics,
        }
    }

    fn error(&mut self, code: &str, message: String, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    fn warning(&mut self, code: &str, message: String, span: Span) {
        self.diagnostics.push(Diagnostic::warning(code, message, span));
    }

    // ── Builtins ─────────────────────────────────────────────────

    fn register_builtins(&mut self) {
        for name in PRIMITIVE_NAMES {
            self.table.define_type(name, Type::primitive(name));
        }
        self.table.define_type(
            "Result",
            Type::Applied {
                base: "Result".to_string(),
                args: vec![Type::Var("T".to_string()), Type::Var("E".to_string())],
            },
        );
        self.table.define_type(
            "Option",
            Type::Applied {
                base: "Option".to_string(),
                args: vec![Type::Var("T".to_string())],
            },
        );
        self.table
            .define_type("List", Type::List(Box::new(Type::Var("T".to_string()))));
        self.table.define_type(
            "Table",
            Type::Applied {
                base: "Table".to_string(),
                args: vec![Type::Var("V".to_string())],
            },
        );

        let builtin_span = Span::new(crate::diagnostic::FileId(0), 0, 0);
        for BuiltinSig(name, params, ret, io) in built_in_functions().iter() {
            let type_params: Vec<String> = collect_vars(params);
            let sig = FunctionSig {
                verb: None,
                name: name.to_string(),
                param_names: (0..params.len()).map(|i| format!("p{}", i)).collect(),
                param_types: params.clone(),
                return_type: ret.clone(),
                can_fail: false,
                span: builtin_span,
                kind: FnKind::Builtin { io: *io },
                type_params,
                has_ensures: false,
                trusted: true,
            };
            let _ = self.table.define_function(sig);
        }
    }

    // ── Pass 1: declaration collection ───────────────────────────

    fn register_type(&mut self, td: &TypeDef) {
        if self.table.resolve_type(&td.name).is_some() {
            self.error("E301", format!("duplicate definition of '{}'", td.name), td.span);
            return;
        }

        self.type_params = td.type_params.clone();

        let resolved = match &td.body {
            TypeBody::Record { fields, .. } => {
                let mut resolved_fields: Vec<(String, Type)> = Vec::new();
                for f in fields {
                    resolved_fields.push((f.name.clone(), self.resolve_type_expr(&f.type_expr)));
                }
                Type::Record {
                    name: td.name.clone(),
                    fields: Rc::new(resolved_fields),
                    type_params: td.type_params.clone(),
                }
            }
            TypeBody::Algebraic { variants, .. } => {
                let mut infos: Vec<VariantInfo> = Vec::new();
                for v in variants {
                    let mut vfields: Vec<(String, Type)> = Vec::new();
                    for f in &v.fields {
                        vfields.push((f.name.clone(), self.resolve_type_expr(&f.type_expr)));
                    }
                    infos.push(VariantInfo {
                        name: v.name.clone(),
                        fields: vfields,
                    });
                }
                let algebraic = Type::Algebraic {
                    name: td.name.clone(),
                    variants: Rc::new(infos.clone()),
                    type_params: td.type_params.clone(),
                };
                // Each variant is both a constructor callable and a
                // pattern head.
                for info in &infos {
                    let sig = FunctionSig {
                        verb: None,
                        name: info.name.clone(),
                        param_names: info.fields.iter().map(|(n, _)| n.clone()).collect(),
                        param_types: info.fields.iter().map(|(_, t)| t.clone()).collect(),
                        return_type: algebraic.clone(),
                        can_fail: false,
                        span: td.span,
                        kind: FnKind::Variant {
                            type_name: td.name.clone(),
                        },
                        type_params: td.type_params.clone(),
                        has_ensures: false,
                        trusted: true,
                    };
                    if self.table.define_function(sig).is_err() {
                        self.error(
                            "E301",
                            format!("duplicate variant constructor '{}'", info.name),
                            td.span,
                        );
                    }
                }
                algebraic
            }
            TypeBody::Refinement {
                base, constraint, ..
            } => {
                let base_ty = self.resolve_type_expr(base);
                Type::Refined {
                    name: td.name.clone(),
                    base: Box::new(base_ty),
                    constraint: Rc::new(constraint.clone()),
                }
            }
        };

        self.type_params.clear();
        self.table.define_type(&td.name, resolved.clone());
        let _ = self.table.define(Symbol {
            kind: SymbolKind::TypeDef,
            name: td.name.clone(),
            span: td.span,
            ty: resolved,
            verb: None,
            mutable: false,
            used: false,
        });
    }

    fn register_function(&mut self, fd: &FunctionDef) {
        self.collected_params.clear();
        let param_types: Vec<Type> = fd
            .params
            .iter()
            .map(|p| self.resolve_signature_type(&p.type_expr))
            .collect();
        let mut return_type = match &fd.return_type {
            Some(te) => self.resolve_signature_type(te),
            None => {
                if fd.verb == Verb::Validates {
                    boolean()
                } else {
                    Type::Unit
                }
            }
        };
        if fd.can_fail && !return_type.is_fallible_carrier() {
            return_type = Type::result(return_type, error_type());
        }

        let has_ensures = fd.ensures().next().is_some();
        let sig = FunctionSig {
            verb: Some(fd.verb),
            name: fd.name.clone(),
            param_names: fd.params.iter().map(|p| p.name.clone()).collect(),
            param_types,
            return_type,
            can_fail: fd.can_fail,
            span: fd.span,
            kind: FnKind::User,
            type_params: std::mem::take(&mut self.collected_params),
            has_ensures,
            trusted: fd.is_trusted(),
        };

        if let Err(key) = self.table.define_function(sig) {
            let code = if matches!(fd.verb, Verb::Inputs | Verb::Outputs) {
                "E365"
            } else {
                "E301"
            };
            self.error(
                code,
                format!(
                    "duplicate function identity ({}, {}, [{}])",
                    fd.verb, fd.name, key.param_key
                ),
                fd.span,
            );
        }
    }

    fn register_main(&mut self, md: &MainDef) {
        let mut return_type = match &md.return_type {
            Some(te) => self.resolve_signature_type(te),
            None => Type::Unit,
        };
        if md.can_fail && !return_type.is_fallible_carrier() {
            return_type = Type::result(return_type, error_type());
        }
        let sig = FunctionSig {
            verb: None,
            name: "main".to_string(),
            param_names: Vec::new(),
            param_types: Vec::new(),
            return_type,
            can_fail: md.can_fail,
            span: md.span,
            kind: FnKind::User,
            type_params: Vec::new(),
            has_ensures: false,
            trusted: false,
        };
        if self.table.define_function(sig).is_err() {
            self.error("E301", "duplicate definition of 'main'".to_string(), md.span);
        }
    }

    fn register_constant(&mut self, cd: &ConstantDef) {
        let ty = match &cd.type_expr {
            Some(te) => self.resolve_type_expr(te),
            None => Type::Error,
        };
        let defined = self.table.define(Symbol {
            kind: SymbolKind::Constant,
            name: cd.name.clone(),
            span: cd.span,
            ty,
            verb: None,
            mutable: false,
            used: false,
        });
        if defined.is_err() {
            self.error("E301", format!("duplicate definition of '{}'", cd.name), cd.span);
        }
    }

    fn register_import_group(&mut self, group: &ImportGroup, span: Span) {
        match group {
            ImportGroup::Types(names) => {
                for name in names {
                    if self.table.resolve_type(name).is_none() {
                        // Imported types are opaque nominal records.
                        self.table.define_type(
                            name,
                            Type::Record {
                                name: name.clone(),
                                fields: Rc::new(Vec::new()),
                                type_params: Vec::new(),
                            },
                        );
                    }
                }
            }
            ImportGroup::Verb(verb, names) => {
                for name in names {
                    self.register_imported_fn(Some(*verb), name, span);
                }
            }
            ImportGroup::Plain(names) => {
                for name in names {
                    self.register_imported_fn(None, name, span);
                }
            }
        }
    }

    /// Imported signatures are unknown until the module is compiled;
    /// the Error return type makes the checker skip strict checks.
    fn register_imported_fn(&mut self, verb: Option<Verb>, name: &str, span: Span) {
        let sig = FunctionSig {
            verb,
            name: name.to_string(),
            param_names: Vec::new(),
            param_types: Vec::new(),
            return_type: Type::Error,
            can_fail: false,
            span,
            kind: FnKind::Imported,
            type_params: Vec::new(),
            has_ensures: false,
            trusted: true,
        };
        let _ = self.table.define_function(sig);
    }

    fn register_foreign_fn(&mut self, library: &str, ff: &crate::ast::ForeignFn) {
        let param_types: Vec<Type> = ff
            .params
            .iter()
            .map(|p| self.resolve_type_expr(&p.type_expr))
            .collect();
        let return_type = match &ff.return_type {
            Some(te) => self.resolve_type_expr(te),
            None => Type::Unit,
        };
        let sig = FunctionSig {
            verb: None,
            name: ff.name.clone(),
            param_names: ff.params.iter().map(|p| p.name.clone()).collect(),
            param_types,
            return_type,
            can_fail: false,
            span: ff.span,
            kind: FnKind::Foreign {
                library: library.to_string(),
            },
            type_params: Vec::new(),
            has_ensures: false,
            trusted: true,
        };
        if self.table.define_function(sig).is_err() {
            self.error(
                "E301",
                format!("duplicate foreign function '{}'", ff.name),
                ff.span,
            );
        }
    }

    // ── Type expression resolution ───────────────────────────────

    /// Resolve a type inside a function signature; unknown
    /// single-letter type names become generic parameters.
    fn resolve_signature_type(&mut self, te: &TypeExpr) -> Type {
        self.resolve_type_expr_inner(te, true)
    }

    pub fn resolve_type_expr(&mut self, te: &TypeExpr) -> Type {
        self.resolve_type_expr_inner(te, false)
    }

    fn resolve_type_expr_inner(&mut self, te: &TypeExpr, signature: bool) -> Type {
        match te {
            TypeExpr::Simple { name, span } => {
                if self.type_params.contains(name) {
                    return Type::Var(name.clone());
                }
                if let Some(ty) = self.table.resolve_type(name) {
                    return ty.clone();
                }
                if is_type_var_name(name) && signature {
                    if !self.collected_params.contains(name) {
                        self.collected_params.push(name.clone());
                    }
                    return Type::Var(name.clone());
                }
                self.error("E300", format!("undefined type '{}'", name), *span);
                Type::Error
            }
            TypeExpr::Generic { name, args, span } => {
                let resolved_args: Vec<Type> = args
                    .iter()
                    .map(|a| self.resolve_type_expr_inner(a, signature))
                    .collect();
                if name == "List" && resolved_args.len() == 1 {
                    return Type::List(Box::new(resolved_args.into_iter().next().expect("one arg")));
                }
                if self.table.resolve_type(name).is_none() {
                    self.error("E300", format!("undefined type '{}'", name), *span);
                    return Type::Error;
                }
                Type::Applied {
                    base: name.clone(),
                    args: resolved_args,
                }
            }
            TypeExpr::Modified {
                name,
                modifiers,
                span,
            } => {
                if self.table.resolve_type(name).is_none() {
                    self.error("E300", format!("undefined type '{}'", name), *span);
                    return Type::Error;
                }
                let values: Vec<String> = modifiers.iter().map(|m| m.value.clone()).collect();
                Type::with_modifiers(name, values)
            }
            TypeExpr::Refined {
                base, constraint, ..
            } => {
                let base_ty = self.resolve_type_expr_inner(base, signature);
                Type::Refined {
                    name: base_ty.key(),
                    base: Box::new(base_ty),
                    constraint: Rc::new((**constraint).clone()),
                }
            }
        }
    }

    // ── Pass 2: reference resolution ─────────────────────────────

    fn resolve_function(&mut self, fd: &FunctionDef) {
        self.collected_params = Vec::new();
        self.table.push_scope();

        for p in &fd.params {
            self.define_param(p);
        }

        // Contract expressions resolve with `result` in scope where
        // the annotation form allows it.
        for ann in &fd.annotations {
            match &ann.kind {
                AnnotationKind::Ensures(e) | AnnotationKind::Believe(e) => {
                    self.table.push_scope();
                    let ret_ty = self.current_return_type(fd);
                    let _ = self.table.define(Symbol {
                        kind: SymbolKind::Local,
                        name: "result".to_string(),
                        span: ann.span,
                        ty: ret_ty,
                        verb: None,
                        mutable: false,
                        used: true,
                    });
                    self.resolve_expr(e);
                    self.table.pop_scope();
                }
                AnnotationKind::Requires(e)
                | AnnotationKind::Know(e)
                | AnnotationKind::Assume(e)
                | AnnotationKind::Terminates(e) => self.resolve_expr(e),
                AnnotationKind::NearMiss(nm) => {
                    // Near-miss inputs are example values, checked
                    // against the signature rather than the scope.
                    self.resolve_literal_refs(&nm.input);
                    self.resolve_literal_refs(&nm.expected);
                }
                _ => {}
            }
        }

        for stmt in &fd.body {
            self.resolve_stmt(stmt);
        }

        self.finish_body_scope();
    }

    fn current_return_type(&self, fd: &FunctionDef) -> Type {
        let key = FunctionKey {
            verb: Some(fd.verb),
            name: fd.name.clone(),
            param_key: crate::semantics::types::param_key(
                &fd.params
                    .iter()
                    .map(|p| {
                        // Signature types were resolved during pass 1;
                        // re-resolve quietly for the key.
                        self.peek_type(&p.type_expr)
                    })
                    .collect::<Vec<_>>(),
            ),
        };
        self.table
            .function(&key)
            .map(|s| s.return_type.clone())
            .unwrap_or(Type::Error)
    }

    /// Resolve a type expression without emitting diagnostics, for
    /// key reconstruction.
    fn peek_type(&self, te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Simple { name, .. } => {
                if let Some(ty) = self.table.resolve_type(name) {
                    ty.clone()
                } else if is_type_var_name(name) {
                    Type::Var(name.clone())
                } else {
                    Type::Error
                }
            }
            TypeExpr::Generic { name, args, .. } => {
                let resolved: Vec<Type> = args.iter().map(|a| self.peek_type(a)).collect();
                if name == "List" && resolved.len() == 1 {
                    Type::List(Box::new(resolved.into_iter().next().expect("one arg")))
                } else {
                    Type::Applied {
                        base: name.clone(),
                        args: resolved,
                    }
                }
            }
            TypeExpr::Modified { name, modifiers, .. } => Type::with_modifiers(
                name,
                modifiers.iter().map(|m| m.value.clone()).collect(),
            ),
            TypeExpr::Refined { base, .. } => self.peek_type(base),
        }
    }

    fn resolve_main(&mut self, md: &MainDef) {
        self.table.push_scope();
        for stmt in &md.body {
            self.resolve_stmt(stmt);
        }
        self.finish_body_scope();
    }

    fn define_param(&mut self, p: &Param) {
        let ty = self.resolve_type_expr(&p.type_expr);
        let mutable = is_mutable(&ty);
        let defined = self.table.define(Symbol {
            kind: SymbolKind::Parameter,
            name: p.name.clone(),
            span: p.span,
            ty,
            verb: None,
            mutable,
            used: false,
        });
        if defined.is_err() {
            self.error("E302", format!("duplicate parameter '{}'", p.name), p.span);
        }
        if let Some(constraint) = &p.constraint {
            self.resolve_expr(constraint);
        }
    }

    /// Pop a function body scope, reporting unused locals (W300).
    fn finish_body_scope(&mut self) {
        let ids = self.table.pop_scope();
        for id in ids {
            let sym = self.table.symbol(id);
            if sym.kind == SymbolKind::Local && !sym.used && !sym.name.starts_with('_') {
                let (name, span) = (sym.name.clone(), sym.span);
                self.warning("W300", format!("unused variable '{}'", name), span);
            }
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                type_expr,
                value,
            } => {
                self.resolve_expr(value);
                let ty = match type_expr {
                    Some(te) => self.resolve_type_expr(te),
                    None => Type::Error,
                };
                let mutable = is_mutable(&ty);
                match self.table.define(Symbol {
                    kind: SymbolKind::Local,
                    name: name.clone(),
                    span: stmt.span,
                    ty,
                    verb: None,
                    mutable,
                    used: false,
                }) {
                    Ok(id) => {
                        self.bindings.insert(stmt.span, id);
                    }
                    Err(_) => {
                        self.error(
                            "E302",
                            format!("variable '{}' already defined in this scope", name),
                            stmt.span,
                        );
                    }
                }
            }
            StmtKind::Assign { target, value } => {
                self.resolve_expr(value);
                match self.table.lookup(target) {
                    Some(found) => {
                        self.table.mark_used(found.id);
                        self.bindings.insert(stmt.span, found.id);
                    }
                    None => {
                        self.error("E310", format!("undefined name '{}'", target), stmt.span);
                    }
                }
            }
            StmtKind::Expr(expr) => self.resolve_expr(expr),
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                if let Some(found) = self.table.lookup(name) {
                    if found.crossed_barrier && !found.from_root {
                        let kind = self.table.symbol(found.id).kind;
                        if matches!(kind, SymbolKind::Local | SymbolKind::Parameter) {
                            self.error(
                                "E364",
                                format!(
                                    "lambda captures '{}' from an enclosing scope; pass it as a parameter",
                                    name
                                ),
                                expr.span,
                            );
                        }
                    }
                    self.table.mark_used(found.id);
                    self.bindings.insert(expr.span, found.id);
                    return;
                }
                // Bare function references resolve through the
                // verb-dispatched table.
                if !self.table.candidates(name).is_empty() {
                    return;
                }
                self.error("E310", format!("undefined name '{}'", name), expr.span);
            }
            ExprKind::TypeIdentifier(name) => {
                if self.table.resolve_type(name).is_some()
                    || !self.table.candidates(name).is_empty()
                {
                    return;
                }
                self.error("E310", format!("undefined name '{}'", name), expr.span);
            }
            ExprKind::Call { func, args } => {
                match &func.kind {
                    ExprKind::Identifier(name) => {
                        // Prefer a local binding holding a function
                        // value; otherwise the call resolves through
                        // the function table.
                        if let Some(found) = self.table.lookup(name) {
                            self.table.mark_used(found.id);
                            self.bindings.insert(func.span, found.id);
                        } else if self.table.candidates(name).is_empty() {
                            self.error(
                                "E311",
                                format!("undefined function '{}'", name),
                                func.span,
                            );
                        }
                    }
                    ExprKind::TypeIdentifier(name) => {
                        if self.table.candidates(name).is_empty()
                            && self.table.resolve_type(name).is_none()
                        {
                            self.error(
                                "E311",
                                format!("undefined function '{}'", name),
                                func.span,
                            );
                        }
                    }
                    _ => self.resolve_expr(func),
                }
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Range { lo, hi } => {
                self.resolve_expr(lo);
                self.resolve_expr(hi);
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Field { obj, .. } => self.resolve_expr(obj),
            ExprKind::Index { obj, index } => {
                self.resolve_expr(obj);
                self.resolve_expr(index);
            }
            ExprKind::Pipe { left, right } => {
                self.resolve_expr(left);
                // The right side of a pipe may be a bare function name.
                match &right.kind {
                    ExprKind::Identifier(name) => {
                        if self.table.lookup(name).is_none()
                            && self.table.candidates(name).is_empty()
                        {
                            self.error(
                                "E311",
                                format!("undefined function '{}'", name),
                                right.span,
                            );
                        }
                    }
                    _ => self.resolve_expr(right),
                }
            }
            ExprKind::FailProp(inner) => self.resolve_expr(inner),
            ExprKind::Lambda { params, body } => {
                self.table.push_barrier_scope();
                let mut ids: Vec<SymbolId> = Vec::new();
                for pname in params {
                    if let Ok(id) = self.table.define(Symbol {
                        kind: SymbolKind::Parameter,
                        name: pname.clone(),
                        span: expr.span,
                        ty: Type::Var(pname.clone()),
                        verb: None,
                        mutable: false,
                        used: true,
                    }) {
                        ids.push(id);
                    }
                }
                self.lambda_params.insert(expr.span, ids);
                self.resolve_expr(body);
                self.table.pop_scope();
            }
            ExprKind::Valid { name, args } => {
                if self.table.verb_variant(Verb::Validates, name).is_none() {
                    self.error(
                        "E311",
                        format!("no validates variant of '{}' in scope", name),
                        expr.span,
                    );
                }
                if let Some(args) = args {
                    for arg in args {
                        self.resolve_expr(arg);
                    }
                }
            }
            ExprKind::Match { subject, arms } => {
                if let Some(subject) = subject {
                    self.resolve_expr(subject);
                }
                for arm in arms {
                    self.resolve_match_arm(arm);
                }
            }
            ExprKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.resolve_expr(condition);
                self.table.push_scope();
                for s in then_body {
                    self.resolve_stmt(s);
                }
                self.finish_body_scope();
                self.table.push_scope();
                for s in else_body {
                    self.resolve_stmt(s);
                }
                self.finish_body_scope();
            }
            ExprKind::Paren(inner) => self.resolve_expr(inner),
            ExprKind::StrInterp(parts) => {
                for part in parts {
                    self.resolve_expr(part);
                }
            }
            ExprKind::List(elements) => {
                for e in elements {
                    self.resolve_expr(e);
                }
            }
            ExprKind::Comptime(stmts) => {
                self.table.push_scope();
                for s in stmts {
                    self.resolve_stmt(s);
                }
                self.finish_body_scope();
            }
            ExprKind::Int(_)
            | ExprKind::Dec(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::TripleStr(_)
            | ExprKind::RawStr(_)
            | ExprKind::Regex(_)
            | ExprKind::Char(_) => {}
        }
    }

    fn resolve_match_arm(&mut self, arm: &MatchArm) {
        self.table.push_scope();
        self.bind_pattern(&arm.pattern);
        for stmt in &arm.body {
            self.resolve_stmt(stmt);
        }
        self.finish_body_scope();
    }

    fn bind_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Binding { name, span } => {
                if let Ok(id) = self.table.define(Symbol {
                    kind: SymbolKind::Local,
                    name: name.clone(),
                    span: *span,
                    ty: Type::Error,
                    verb: None,
                    mutable: false,
                    used: true,
                }) {
                    self.bindings.insert(*span, id);
                }
            }
            Pattern::Variant { name, fields, span } => {
                if self.table.candidates(name).is_empty() {
                    self.error("E370", format!("unknown variant '{}'", name), *span);
                }
                for f in fields {
                    self.bind_pattern(f);
                }
            }
            Pattern::Wildcard { .. } | Pattern::Literal { .. } => {}
        }
    }

    /// Near-miss payloads are value examples; only nested calls and
    /// constructors are resolved, bare names are left alone.
    fn resolve_literal_refs(&mut self, expr: &Expr) {
        if let ExprKind::Call { func, args } = &expr.kind {
            if let ExprKind::TypeIdentifier(name) = &func.kind {
                if self.table.candidates(name).is_empty() {
                    self.error("E370", format!("unknown variant '{}'", name), func.span);
                }
            }
            for arg in args {
                self.resolve_literal_refs(arg);
            }
        }
    }
}

fn collect_vars(types: &[Type]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    fn walk(ty: &Type, out: &mut Vec<String>) {
        match ty {
            Type::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Type::List(inner) => walk(inner, out),
            Type::Applied { args, .. } => {
                for a in args {
                    walk(a, out);
                }
            }
            Type::Function { params, ret, .. } => {
                for p in params {
                    walk(p, out);
                }
                walk(ret, out);
            }
            _ => {}
        }
    }
    for t in types {
        walk(t, &mut out);
    }
    out
}

/// Single uppercase letters name generic parameters.
fn is_type_var_name(name: &str) -> bool {
    name.len() == 1 && name.chars().all(|c| c.is_ascii_uppercase())
}

fn is_mutable(ty: &Type) -> bool {
    matches!(ty, Type::Primitive { modifiers, .. } if modifiers.iter().any(|m| m == "Mutable"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FileId;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn resolve_source(text: &str) -> Resolution {
        let (tokens, lex_errors) = Lexer::new(FileId(0), text).lex();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let (module, parse_errors) = Parser::new(&tokens).parse();
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        Resolver::new().resolve(&module)
    }

    fn codes(res: &Resolution) -> Vec<&str> {
        res.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_verb_dispatch_registration() {
        let res = resolve_source(
            "validates email(a String)\nfrom\n    contains(a, \"@\")\n\ntransforms email(raw String) String\nfrom\n    trim(raw)\n",
        );
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        assert_eq!(res.table.candidates("email").len(), 2);
    }

    #[test]
    fn test_duplicate_identity_io_pair_is_e365() {
        let res = resolve_source(
            "inputs load(path String) String!\nfrom\n    read_file(path)!\n\ninputs load(path String) String!\nfrom\n    read_file(path)!\n",
        );
        assert!(codes(&res).contains(&"E365"));
    }

    #[test]
    fn test_duplicate_pure_identity_is_e301() {
        let res = resolve_source(
            "transforms id(a Integer) Integer\nfrom\n    a\n\ntransforms id(a Integer) Integer\nfrom\n    a\n",
        );
        assert!(codes(&res).contains(&"E301"));
    }

    #[test]
    fn test_unknown_identifier_is_e310() {
        let res = resolve_source("transforms id(a Integer) Integer\nfrom\n    b\n");
        assert!(codes(&res).contains(&"E310"));
    }

    #[test]
    fn test_lambda_capture_is_e364() {
        let res = resolve_source(
            "transforms scale(xs List<Integer>, k Integer) List<Integer>\nfrom\n    map(xs, |x| x * k)\n",
        );
        assert!(codes(&res).contains(&"E364"));
    }

    #[test]
    fn test_lambda_params_are_fine() {
        let res = resolve_source(
            "transforms doubled(xs List<Integer>) List<Integer>\nfrom\n    map(xs, |x| x * 2)\n",
        );
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
    }

    #[test]
    fn test_variant_constructors_registered() {
        let res = resolve_source(
            "type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)\n",
        );
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        assert_eq!(res.table.candidates("Circle").len(), 1);
        assert_eq!(res.table.candidates("Rect").len(), 1);
    }

    #[test]
    fn test_unused_local_is_w300() {
        let res = resolve_source(
            "transforms id(a Integer) Integer\nfrom\n    unused as Integer = 3\n    a\n",
        );
        assert!(codes(&res).contains(&"W300"));
    }

    #[test]
    fn test_unknown_module_is_e312() {
        let res = resolve_source("with Nonsense use transforms foo\n");
        assert!(codes(&res).contains(&"E312"));
    }

    #[test]
    fn test_refinement_type_registered() {
        let res = resolve_source("type Port is Integer where 1..65535\n");
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        match res.table.resolve_type("Port") {
            Some(Type::Refined { base, .. }) => {
                assert_eq!(**base, integer());
            }
            other => panic!("expected refined type, got {:?}", other),
        }
    }
}
