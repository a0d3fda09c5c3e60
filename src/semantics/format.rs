//! Human-readable type rendering for diagnostics.

use super::types::Type;

pub fn format_type(ty: &Type) -> String {
    match ty {
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
            let parts: Vec<String> = params.iter().map(format_type).collect();
            format!("({}) -> {}", parts.join(", "), format_type(ret))
        }
        Type::Var(name) => name.clone(),
        Type::Applied { base, args } => {
            let parts: Vec<String> = args.iter().map(format_type).collect();
            format!("{}<{}>", base, parts.join(", "))
        }
        Type::List(inner) => format!("List<{}>", format_type(inner)),
        Type::Unit => "Unit".to_string(),
        Type::Never => "Never".to_string(),
        Type::Error => "<error>".to_string(),
    }
}
