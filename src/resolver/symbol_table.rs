//! Symbol storage for the resolver and later stages.
//!
//! Scopes hold symbol IDs, not references; symbols live in a flat
//! table indexed by ID. Only the root scope stores the
//! verb-dispatched function table, keyed by the triple
//! `(verb, name, parameter-type-key)`.

use std::collections::BTreeMap;

use crate::ast::Verb;
use crate::lexer::Span;
use crate::semantics::types::{param_key, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    BuiltinFunction,
    VariantConstructor,
    TypeDef,
    Constant,
    Parameter,
    Local,
    Field,
    Module,
    Foreign,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub span: Span,
    pub ty: Type,
    pub verb: Option<Verb>,
    pub mutable: bool,
    pub used: bool,
}

/// How a function entered the table; drives purity checks, mangling,
/// and the contract-chain walk.
#[derive(Debug, Clone, PartialEq)]
pub enum FnKind {
    User,
    Builtin { io: bool },
    Variant { type_name: String },
    Foreign { library: String },
    Imported,
}

/// Function identity: unique over `(verb, name, param-type-key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    pub verb: Option<Verb>,
    pub name: String,
    pub param_key: String,
}

impl FunctionKey {
    pub fn new(verb: Option<Verb>, name: &str, param_types: &[Type]) -> Self {
        Self {
            verb,
            name: name.to_string(),
            param_key: param_key(param_types),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub verb: Option<Verb>,
    pub name: String,
    pub param_names: Vec<String>,
    pub param_types: Vec<Type>,
    pub return_type: Type,
    pub can_fail: bool,
    pub span: Span,
    pub kind: FnKind,
    pub type_params: Vec<String>,
    pub has_ensures: bool,
    pub trusted: bool,
}

impl FunctionSig {
    pub fn key(&self) -> FunctionKey {
        FunctionKey::new(self.verb, &self.name, &self.param_types)
    }

    pub fn is_io_builtin(&self) -> bool {
        matches!(self.kind, FnKind::Builtin { io: true })
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    /// Lambda scopes are barriers: lookups may not cross one except
    /// into the root scope.
    barrier: bool,
    names: BTreeMap<String, SymbolId>,
}

/// A lookup result that remembers whether a lambda boundary was
/// crossed on the way out.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub id: SymbolId,
    pub crossed_barrier: bool,
    pub from_root: bool,
}

#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
    functions: BTreeMap<FunctionKey, FunctionSig>,
    by_name: BTreeMap<String, Vec<FunctionKey>>,
    types: BTreeMap<String, Type>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: Vec::new(),
            scopes: vec![Scope::default()],
            stack: vec![ScopeId(0)],
            functions: BTreeMap::new(),
            by_name: BTreeMap::new(),
            types: BTreeMap::new(),
        }
    }

    // ── Scopes ───────────────────────────────────────────────────

    pub fn push_scope(&mut self) -> ScopeId {
        self.push_scope_inner(false)
    }

    pub fn push_barrier_scope(&mut self) -> ScopeId {
        self.push_scope_inner(true)
    }

    fn push_scope_inner(&mut self, barrier: bool) -> ScopeId {
        let parent = *self.stack.last().expect("scope stack is never empty");
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            barrier,
            names: BTreeMap::new(),
        });
        self.stack.push(id);
        id
    }

    pub fn pop_scope(&mut self) -> Vec<SymbolId> {
        let id = self
            .stack
            .pop()
            .expect("pop_scope called more often than push_scope");
        assert!(!self.stack.is_empty(), "cannot pop the root scope");
        self.scopes[id.0 as usize].names.values().copied().collect()
    }

    pub fn at_root(&self) -> bool {
        self.stack.len() == 1
    }

    // ── Symbols ──────────────────────────────────────────────────

    /// Define a symbol in the current scope. Returns the existing
    /// symbol's ID if the name is already bound in this scope.
    pub fn define(&mut self, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let scope_id = *self.stack.last().expect("scope stack is never empty");
        let scope = &mut self.scopes[scope_id.0 as usize];
        if let Some(existing) = scope.names.get(&symbol.name) {
            return Err(*existing);
        }
        let id = SymbolId(self.symbols.len() as u32);
        scope.names.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn mark_used(&mut self, id: SymbolId) {
        self.symbols[id.0 as usize].used = true;
    }

    /// Walk outward from the current scope. Records whether the
    /// lookup crossed a lambda barrier (other than into the root
    /// scope, where functions and constants live).
    pub fn lookup(&self, name: &str) -> Option<Resolved> {
        let mut scope_id = *self.stack.last().expect("scope stack is never empty");
        let mut crossed_barrier = false;
        loop {
            let scope = &self.scopes[scope_id.0 as usize];
            if let Some(id) = scope.names.get(name) {
                return Some(Resolved {
                    id: *id,
                    crossed_barrier,
                    from_root: scope_id.0 == 0,
                });
            }
            if scope.barrier {
                crossed_barrier = true;
            }
            match scope.parent {
                Some(parent) => scope_id = parent,
                None => return None,
            }
        }
    }

    // ── Functions ────────────────────────────────────────────────

    pub fn define_function(&mut self, sig: FunctionSig) -> Result<(), FunctionKey> {
        let key = sig.key();
        if self.functions.contains_key(&key) {
            return Err(key);
        }
        self.by_name
            .entry(sig.name.clone())
            .or_default()
            .push(key.clone());
        self.functions.insert(key, sig);
        Ok(())
    }

    pub fn function(&self, key: &FunctionKey) -> Option<&FunctionSig> {
        self.functions.get(key)
    }

    pub fn function_mut(&mut self, key: &FunctionKey) -> Option<&mut FunctionSig> {
        self.functions.get_mut(key)
    }

    /// All candidates sharing a bare name, any verb.
    pub fn candidates(&self, name: &str) -> Vec<&FunctionSig> {
        self.by_name
            .get(name)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.functions.get(k))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Candidates narrowed by arity; falls back to all candidates
    /// when none match so callers can report arity mismatches.
    pub fn candidates_with_arity(&self, name: &str, arity: usize) -> Vec<&FunctionSig> {
        let all = self.candidates(name);
        let matching: Vec<&FunctionSig> = all
            .iter()
            .filter(|s| s.param_types.len() == arity)
            .copied()
            .collect();
        if matching.is_empty() {
            all
        } else {
            matching
        }
    }

    /// Look up the unique function with the given verb and name,
    /// regardless of parameter key. Used for `valid f` and the
    /// Boolean-context resolution rule.
    pub fn verb_variant(&self, verb: Verb, name: &str) -> Option<&FunctionSig> {
        self.candidates(name)
            .into_iter()
            .find(|s| s.verb == Some(verb))
    }

    pub fn all_functions(&self) -> impl Iterator<Item = (&FunctionKey, &FunctionSig)> {
        self.functions.iter()
    }

    // ── Types ────────────────────────────────────────────────────

    pub fn define_type(&mut self, name: &str, ty: Type) -> Option<Type> {
        self.types.insert(name.to_string(), ty)
    }

    pub fn resolve_type(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn all_types(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.types.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FileId;
    use crate::semantics::types::{boolean, integer, string};

    fn dummy_span() -> Span {
        Span::new(FileId(0), 0, 0)
    }

    fn sig(verb: Option<Verb>, name: &str, params: Vec<Type>, ret: Type) -> FunctionSig {
        FunctionSig {
            verb,
            name: name.to_string(),
            param_names: (0..params.len()).map(|i| format!("p{}", i)).collect(),
            param_types: params,
            return_type: ret,
            can_fail: false,
            span: dummy_span(),
            kind: FnKind::User,
            type_params: Vec::new(),
            has_ensures: false,
            trusted: false,
        }
    }

    #[test]
    fn test_verb_dispatched_identity() {
        let mut table = SymbolTable::new();
        table
            .define_function(sig(Some(Verb::Validates), "email", vec![string()], boolean()))
            .expect("first identity");
        table
            .define_function(sig(
                Some(Verb::Transforms),
                "email",
                vec![string()],
                string(),
            ))
            .expect("distinct verb, distinct identity");
        assert_eq!(table.candidates("email").len(), 2);

        // Same triple again collides.
        let dup = table.define_function(sig(
            Some(Verb::Validates),
            "email",
            vec![string()],
            boolean(),
        ));
        assert!(dup.is_err());
    }

    #[test]
    fn test_scope_lookup_walks_outward() {
        let mut table = SymbolTable::new();
        let outer = Symbol {
            kind: SymbolKind::Local,
            name: "x".into(),
            span: dummy_span(),
            ty: integer(),
            verb: None,
            mutable: false,
            used: false,
        };
        table.define(outer).expect("fresh name");
        table.push_scope();
        let found = table.lookup("x").expect("visible from inner scope");
        assert!(!found.crossed_barrier);
        table.pop_scope();
    }

    #[test]
    fn test_barrier_scope_marks_crossing() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table
            .define(Symbol {
                kind: SymbolKind::Local,
                name: "captured".into(),
                span: dummy_span(),
                ty: integer(),
                verb: None,
                mutable: false,
                used: false,
            })
            .expect("fresh name");
        table.push_barrier_scope();
        let found = table.lookup("captured").expect("found in outer scope");
        assert!(found.crossed_barrier);
    }
}
