//! Canonical type values produced by resolution and inference.
//!
//! These are distinct from the syntactic `TypeExpr` nodes: a resolved
//! type has its base canonicalized, its modifier bag normalized, and
//! refinement constraints attached as stored ASTs.

use std::rc::Rc;

use crate::ast::{Expr, Verb};

/// One variant of an algebraic type, with its fields in declaration
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantInfo {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Integer/Decimal/Float/Boolean/String/Byte/Character plus a
    /// normalized modifier bag. Each axis admits one modifier; the
    /// bag is kept sorted so equality ignores written order.
    Primitive {
        name: String,
        modifiers: Vec<String>,
    },
    /// A named refinement: base already canonicalized, constraint
    /// kept as the parsed expression for static evaluation.
    Refined {
        name: String,
        base: Box<Type>,
        constraint: Rc<Expr>,
    },
    Algebraic {
        name: String,
        variants: Rc<Vec<VariantInfo>>,
        type_params: Vec<String>,
    },
    Record {
        name: String,
        fields: Rc<Vec<(String, Type)>>,
        type_params: Vec<String>,
    },
    Function {
        verb: Option<Verb>,
        params: Vec<Type>,
        ret: Box<Type>,
        can_fail: bool,
    },
    /// A generic parameter such as `T`.
    Var(String),
    /// An applied type constructor: `Result<T, E>`, `Option<T>`,
    /// `Table<V>`, or a user generic instance.
    Applied {
        base: String,
        args: Vec<Type>,
    },
    List(Box<Type>),
    Unit,
    Never,
    /// Poison type that suppresses cascading diagnostics.
    Error,
}

impl Type {
    pub fn primitive(name: &str) -> Type {
        Type::Primitive {
            name: name.to_string(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifiers(name: &str, mut modifiers: Vec<String>) -> Type {
        modifiers.sort();
        Type::Primitive {
            name: name.to_string(),
            modifiers,
        }
    }

    pub fn result(ok: Type, err: Type) -> Type {
        Type::Applied {
            base: "Result".to_string(),
            args: vec![ok, err],
        }
    }

    pub fn option(inner: Type) -> Type {
        Type::Applied {
            base: "Option".to_string(),
            args: vec![inner],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.unwrap_refined(), Type::Primitive { name, .. } if name == "Boolean")
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.unwrap_refined(),
            Type::Primitive { name, .. } if name == "Integer" || name == "Decimal" || name == "Float"
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self.unwrap_refined(), Type::Primitive { name, .. } if name == "String")
    }

    /// Strip refinement layers down to the base type.
    pub fn unwrap_refined(&self) -> &Type {
        let mut ty = self;
        while let Type::Refined { base, .. } = ty {
            ty = base;
        }
        ty
    }

    /// The `T` of `Result<T, E>` or `Option<T>`, if this is one.
    pub fn success_type(&self) -> Option<&Type> {
        match self.unwrap_refined() {
            Type::Applied { base, args } if base == "Result" || base == "Option" => args.first(),
            _ => None,
        }
    }

    pub fn is_fallible_carrier(&self) -> bool {
        matches!(
            self.unwrap_refined(),
            Type::Applied { base, .. } if base == "Result" || base == "Option"
        )
    }

    /// Normalized key component for verb-dispatched function identity,
    /// e.g. `Integer`, `Integer:[32 Unsigned]`, `List<String>`.
    pub fn key(&self) -> String {
        match self {
            Type::Primitive { name, modifiers } => {
                if modifiers.is_empty() {
                    name.clone()
                } else {
                    format!("{}:[{}]", name, modifiers.join(" "))
                }
            }
            Type::Refined { name, .. } => name.clone(),
            Type::Algebraic { name, .. } => name.clone(),
            Type::Record { name, .. } => name.clone(),
            Type::Function { params, ret, .. } => {
                let parts: Vec<String> = params.iter().map(|p| p.key()).collect();
                format!("Fn({})->{}", parts.join(","), ret.key())
            }
            Type::Var(name) => name.clone(),
            Type::Applied { base, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.key()).collect();
                format!("{}<{}>", base, parts.join(","))
            }
            Type::List(inner) => format!("List<{}>", inner.key()),
            Type::Unit => "Unit".to_string(),
            Type::Never => "Never".to_string(),
            Type::Error => "<error>".to_string(),
        }
    }
}

/// The normalized parameter-type key of a function identity.
pub fn param_key(types: &[Type]) -> String {
    types.iter().map(|t| t.key()).collect::<Vec<_>>().join(",")
}

pub fn integer() -> Type {
    Type::primitive("Integer")
}

pub fn decimal() -> Type {
    Type::primitive("Decimal")
}

pub fn boolean() -> Type {
    Type::primitive("Boolean")
}

pub fn string() -> Type {
    Type::primitive("String")
}

pub fn character() -> Type {
    Type::primitive("Character")
}

pub fn error_type() -> Type {
    Type::primitive("Error")
}

/// Built-in primitive type names, registered before user types.
pub const PRIMITIVE_NAMES: &[&str] = &[
    "Integer",
    "Decimal",
    "Float",
    "Boolean",
    "String",
    "Character",
    "Byte",
    "Unit",
    "Error",
];

/// Structural compatibility between an expected and an actual type.
///
/// `Error` and type variables are compatible with anything so one bad
/// expression does not cascade. Refinements are compatible with their
/// base in both directions; the static constraint check is a separate
/// concern handled by the checker.
pub fn types_compatible(expected: &Type, actual: &Type) -> bool {
    if expected.is_error() || actual.is_error() {
        return true;
    }
    if matches!(expected, Type::Var(_)) || matches!(actual, Type::Var(_)) {
        return true;
    }
    if matches!(actual, Type::Never) {
        return true;
    }
    let expected = expected.unwrap_refined();
    let actual = actual.unwrap_refined();
    match (expected, actual) {
        (Type::Primitive { name: a, .. }, Type::Primitive { name: b, .. }) => a == b,
        (Type::Unit, Type::Unit) => true,
        (Type::Algebraic { name: a, .. }, Type::Algebraic { name: b, .. }) => a == b,
        (Type::Record { name: a, .. }, Type::Record { name: b, .. }) => a == b,
        (
            Type::Applied { base: a, args: aa },
            Type::Applied { base: b, args: ba },
        ) => a == b && aa.len() == ba.len() && aa.iter().zip(ba).all(|(x, y)| types_compatible(x, y)),
        (Type::List(a), Type::List(b)) => types_compatible(a, b),
        (
            Type::Function {
                params: ap,
                ret: ar,
                ..
            },
            Type::Function {
                params: bp,
                ret: br,
                ..
            },
        ) => {
            ap.len() == bp.len()
                && ap.iter().zip(bp).all(|(x, y)| types_compatible(x, y))
                && types_compatible(ar, br)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_bag_ignores_order() {
        let a = Type::with_modifiers("Integer", vec!["Unsigned".into(), "32".into()]);
        let b = Type::with_modifiers("Integer", vec!["32".into(), "Unsigned".into()]);
        assert_eq!(a, b);
        assert_eq!(a.key(), "Integer:[32 Unsigned]");
    }

    #[test]
    fn test_refinement_compatible_with_base() {
        let port = Type::Refined {
            name: "Port".into(),
            base: Box::new(integer()),
            constraint: Rc::new(crate::ast::Expr::new(
                crate::ast::ExprKind::Bool(true),
                crate::lexer::Span::new(crate::diagnostic::FileId(0), 0, 0),
            )),
        };
        assert!(types_compatible(&integer(), &port));
        assert!(types_compatible(&port, &integer()));
        assert!(!types_compatible(&port, &string()));
    }

    #[test]
    fn test_param_key() {
        assert_eq!(param_key(&[integer(), string()]), "Integer,String");
        assert_eq!(param_key(&[]), "");
    }
}
