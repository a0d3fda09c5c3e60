//! Monomorphization table for generic functions.
//!
//! The checker records every concrete instantiation of a generic
//! user function discovered at a call site; the emitter generates one
//! specialized C function per instantiation. The merge into a single
//! table is single-threaded by design.

use std::collections::BTreeMap;

use crate::resolver::FunctionKey;
use crate::semantics::types::Type;

/// A concrete instantiation of a generic function: type arguments in
/// declaration order of the function's type parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiation {
    pub key: FunctionKey,
    pub type_args: Vec<Type>,
}

impl Instantiation {
    /// Suffix appended to the mangled function name,
    /// e.g. `first<Integer>` → `Integer`.
    pub fn args_key(&self) -> String {
        self.type_args
            .iter()
            .map(|t| t.key())
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Per-module table of instantiations, deterministic by construction.
#[derive(Debug, Default)]
pub struct MonoTable {
    instantiations: BTreeMap<FunctionKey, BTreeMap<String, Vec<Type>>>,
}

impl MonoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: FunctionKey, type_args: Vec<Type>) {
        let args_key = type_args
            .iter()
            .map(|t| t.key())
            .collect::<Vec<_>>()
            .join("_");
        self.instantiations
            .entry(key)
            .or_default()
            .insert(args_key, type_args);
    }

    pub fn instantiations_of(&self, key: &FunctionKey) -> Vec<Instantiation> {
        self.instantiations
            .get(key)
            .map(|m| {
                m.values()
                    .map(|args| Instantiation {
                        key: key.clone(),
                        type_args: args.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_instantiated(&self, key: &FunctionKey) -> bool {
        self.instantiations.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instantiations.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.instantiations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Verb;
    use crate::semantics::types::{integer, string};

    #[test]
    fn test_record_deduplicates() {
        let mut table = MonoTable::new();
        let key = FunctionKey {
            verb: Some(Verb::Transforms),
            name: "first".into(),
            param_key: "List<T>".into(),
        };
        table.record(key.clone(), vec![integer()]);
        table.record(key.clone(), vec![integer()]);
        table.record(key.clone(), vec![string()]);
        assert_eq!(table.len(), 2);
        let insts = table.instantiations_of(&key);
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].args_key(), "Integer");
        assert_eq!(insts[1].args_key(), "String");
    }
}
