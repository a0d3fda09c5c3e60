//! Hindley-Milner unification with algebraic-type rigidity and
//! refinement erasure. Nominal types unify only with themselves;
//! refinements unify through their base type.

use std::collections::HashMap;

use super::format::format_type;
use super::types::Type;

#[derive(Debug, Clone, Default)]
pub struct Unifier {
    pub substitutions: HashMap<String, Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifyError {
    pub message: String,
}

impl Unifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unify(&mut self, a: &Type, b: &Type) -> Result<(), UnifyError> {
        // Refinements erase during inference.
        let a = a.unwrap_refined();
        let b = b.unwrap_refined();
        match (a, b) {
            (Type::Var(var), t) | (t, Type::Var(var)) => {
                if let Type::Var(tvar) = t {
                    if tvar == var {
                        return Ok(());
                    }
                }
                if let Some(existing) = self.substitutions.get(var).cloned() {
                    return self.unify(&existing, t);
                }
                if self.occurs(var, t) {
                    return Err(UnifyError {
                        message: format!("recursive type: {} occurs in {}", var, format_type(t)),
                    });
                }
                self.substitutions.insert(var.clone(), t.clone());
                Ok(())
            }
            (Type::Error, _) | (_, Type::Error) => Ok(()),
            (Type::Never, _) | (_, Type::Never) => Ok(()),
            (Type::Primitive { name: n1, .. }, Type::Primitive { name: n2, .. }) if n1 == n2 => {
                Ok(())
            }
            (Type::Unit, Type::Unit) => Ok(()),
            (Type::Algebraic { name: n1, .. }, Type::Algebraic { name: n2, .. }) if n1 == n2 => {
                Ok(())
            }
            (Type::Record { name: n1, .. }, Type::Record { name: n2, .. }) if n1 == n2 => Ok(()),
            (Type::List(e1), Type::List(e2)) => self.unify(e1, e2),
            (
                Type::Applied { base: b1, args: a1 },
                Type::Applied { base: b2, args: a2 },
            ) if b1 == b2 && a1.len() == a2.len() => {
                for (x, y) in a1.iter().zip(a2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (
                Type::Function {
                    params: p1,
                    ret: r1,
                    ..
                },
                Type::Function {
                    params: p2,
                    ret: r2,
                    ..
                },
            ) if p1.len() == p2.len() => {
                for (x, y) in p1.iter().zip(p2) {
                    self.unify(x, y)?;
                }
                self.unify(r1, r2)
            }
            _ => Err(UnifyError {
                message: format!(
                    "type mismatch: expected {}, got {}",
                    format_type(a),
                    format_type(b)
                ),
            }),
        }
    }

    fn occurs(&self, var: &str, t: &Type) -> bool {
        match t {
            Type::Var(v) if v == var => true,
            Type::List(inner) => self.occurs(var, inner),
            Type::Applied { args, .. } => args.iter().any(|a| self.occurs(var, a)),
            Type::Function { params, ret, .. } => {
                params.iter().any(|p| self.occurs(var, p)) || self.occurs(var, ret)
            }
            Type::Refined { base, .. } => self.occurs(var, base),
            _ => false,
        }
    }

    pub fn apply(&self, t: &Type) -> Type {
        match t {
            Type::Var(var) => self
                .substitutions
                .get(var)
                .map(|s| self.apply(s))
                .unwrap_or_else(|| t.clone()),
            Type::List(inner) => Type::List(Box::new(self.apply(inner))),
            Type::Applied { base, args } => Type::Applied {
                base: base.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Type::Function {
                verb,
                params,
                ret,
                can_fail,
            } => Type::Function {
                verb: *verb,
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(ret)),
                can_fail: *can_fail,
            },
            Type::Refined {
                name,
                base,
                constraint,
            } => Type::Refined {
                name: name.clone(),
                base: Box::new(self.apply(base)),
                constraint: constraint.clone(),
            },
            _ => t.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::types::{integer, string};

    #[test]
    fn test_var_binds() {
        let mut u = Unifier::new();
        u.unify(&Type::Var("T".into()), &integer()).expect("binds");
        assert_eq!(u.apply(&Type::Var("T".into())), integer());
    }

    #[test]
    fn test_nominal_rigidity() {
        let mut u = Unifier::new();
        let err = u.unify(&integer(), &string());
        assert!(err.is_err());
    }

    #[test]
    fn test_list_unifies_elementwise() {
        let mut u = Unifier::new();
        u.unify(
            &Type::List(Box::new(Type::Var("T".into()))),
            &Type::List(Box::new(string())),
        )
        .expect("unifies");
        assert_eq!(u.apply(&Type::Var("T".into())), string());
    }
}
