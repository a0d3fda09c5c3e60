//! Prove type → C type mapping and name mangling against the fixed
//! runtime ABI.

use crate::ast::Verb;
use crate::semantics::types::Type;

/// A C type representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CType {
    /// C declaration string, e.g. `int64_t`, `Prove_String*`.
    pub decl: String,
    /// Heap value that participates in retain/release.
    pub is_pointer: bool,
    /// Runtime header this type needs, e.g. `prove_string.h`.
    pub header: Option<&'static str>,
}

impl CType {
    fn new(decl: &str, is_pointer: bool, header: Option<&'static str>) -> Self {
        CType {
            decl: decl.to_string(),
            is_pointer,
            header,
        }
    }
}

fn map_integer(modifiers: &[String]) -> CType {
    let unsigned = modifiers.iter().any(|m| m == "Unsigned");
    let mut size = 64usize;
    for m in modifiers {
        if let Ok(bits) = m.parse::<usize>() {
            size = bits;
        }
    }
    let decl = match (unsigned, size) {
        (false, 8) => "int8_t",
        (false, 16) => "int16_t",
        (false, 32) => "int32_t",
        (true, 8) => "uint8_t",
        (true, 16) => "uint16_t",
        (true, 32) => "uint32_t",
        (true, 64) => "uint64_t",
        _ => "int64_t",
    };
    CType::new(decl, false, None)
}

/// Values carrying the `Arena` modifier opt out of reference
/// counting; they are freed en masse with their arena.
pub fn is_arena(ty: &Type) -> bool {
    matches!(ty, Type::Primitive { modifiers, .. } if modifiers.iter().any(|m| m == "Arena"))
}

pub fn map_type(ty: &Type) -> CType {
    match ty {
        Type::Primitive { name, modifiers } => match name.as_str() {
            "Integer" => map_integer(modifiers),
            "Decimal" | "Float" => {
                if modifiers.iter().any(|m| m == "32") {
                    CType::new("float", false, None)
                } else {
                    CType::new("double", false, None)
                }
            }
            "Boolean" => CType::new("bool", false, None),
            "Character" => CType::new("char", false, None),
            "Byte" => CType::new("uint8_t", false, None),
            "String" => {
                let pointer = !is_arena(ty);
                CType::new("Prove_String*", pointer, Some("prove_string.h"))
            }
            "Error" => CType::new("Prove_String*", true, Some("prove_string.h")),
            _ => CType::new("int64_t", false, None),
        },
        Type::Unit => CType::new("void", false, None),
        Type::Refined { base, .. } => map_type(base),
        Type::Record { name, .. } | Type::Algebraic { name, .. } => {
            CType::new(&mangle_type_name(name), false, None)
        }
        Type::List(_) => CType::new("Prove_List*", true, Some("prove_list.h")),
        Type::Applied { base, args } => match base.as_str() {
            "Result" => CType::new("Prove_Result", false, Some("prove_result.h")),
            "Table" => CType::new("Prove_Table*", true, Some("prove_table.h")),
            "Option" => {
                let inner = args.first().map(map_type).unwrap_or_else(|| {
                    CType::new("int64_t", false, None)
                });
                let safe = sanitize(&inner.decl);
                CType::new(
                    &format!("Prove_Option_{}", safe),
                    false,
                    Some("prove_option.h"),
                )
            }
            other => CType::new(&mangle_type_name(other), false, None),
        },
        Type::Function { .. } | Type::Var(_) => CType::new("void*", false, None),
        Type::Never => CType::new("void", false, None),
        Type::Error => CType::new("int64_t", false, None),
    }
}

/// `prove_<verb>_<name>_<paramtypekey>`, with the key's punctuation
/// flattened for C. The prefix keeps user names clear of the C
/// standard library.
pub fn mangle_name(verb: Option<Verb>, name: &str, param_types: &[Type]) -> String {
    let mut parts: Vec<String> = vec!["prove".to_string()];
    if let Some(verb) = verb {
        parts.push(verb.as_str().to_string());
    }
    parts.push(name.to_string());
    for ty in param_types {
        parts.push(sanitize(&ty.key()));
    }
    parts.join("_")
}

/// Mangled name of a monomorphized generic instantiation.
pub fn mangle_instance(
    verb: Option<Verb>,
    name: &str,
    param_types: &[Type],
    type_args_key: &str,
) -> String {
    if type_args_key.is_empty() {
        mangle_name(verb, name, param_types)
    } else {
        format!(
            "{}__{}",
            mangle_name(verb, name, param_types),
            sanitize(type_args_key)
        )
    }
}

/// `Port` → `Type_Port`
pub fn mangle_type_name(name: &str) -> String {
    format!("Type_{}", name)
}

/// Constructor helper for an algebraic variant: `Type_Shape_Circle`.
pub fn mangle_variant(type_name: &str, variant: &str) -> String {
    format!("{}_{}", mangle_type_name(type_name), variant)
}

/// Tag constant for a variant: `TYPE_SHAPE_TAG_CIRCLE`.
pub fn variant_tag(type_name: &str, variant: &str) -> String {
    format!(
        "{}_TAG_{}",
        mangle_type_name(type_name).to_uppercase(),
        variant.to_uppercase()
    )
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::types::{integer, string};

    #[test]
    fn test_mangle_verb_dispatch() {
        assert_eq!(
            mangle_name(Some(Verb::Validates), "email", &[string()]),
            "prove_validates_email_String"
        );
        assert_eq!(
            mangle_name(Some(Verb::Transforms), "email", &[string()]),
            "prove_transforms_email_String"
        );
    }

    #[test]
    fn test_mangle_modified_type() {
        let ty = Type::with_modifiers("Integer", vec!["Unsigned".into(), "32".into()]);
        assert_eq!(
            mangle_name(Some(Verb::Transforms), "mask", &[ty]),
            "prove_transforms_mask_Integer__32_Unsigned_"
        );
    }

    #[test]
    fn test_map_modified_integer() {
        let ty = Type::with_modifiers("Integer", vec!["Unsigned".into(), "32".into()]);
        assert_eq!(map_type(&ty).decl, "uint32_t");
    }

    #[test]
    fn test_option_monomorphizes() {
        let ty = Type::option(integer());
        assert_eq!(map_type(&ty).decl, "Prove_Option_int64_t");
    }

    #[test]
    fn test_refinement_erases_to_base() {
        let ty = Type::Refined {
            name: "Port".into(),
            base: Box::new(integer()),
            constraint: std::rc::Rc::new(crate::ast::Expr::new(
                crate::ast::ExprKind::Bool(true),
                crate::lexer::Span::new(crate::diagnostic::FileId(0), 0, 0),
            )),
        };
        assert_eq!(map_type(&ty).decl, "int64_t");
    }
}
