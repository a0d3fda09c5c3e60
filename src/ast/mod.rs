//! Abstract Syntax Tree definitions for the Prove language.
//!
//! Every node carries a span. The tree is immutable once parsed;
//! the resolver and checker annotate it through side tables keyed by
//! span rather than rewriting nodes.

use crate::lexer::Span;

pub mod nodes;
pub mod operators;
pub mod patterns;
pub mod types;

pub use nodes::{
    Annotation, AnnotationKind, ConstantDef, Decl, ExplainRow, Expr, ExprKind, ForeignBlock,
    ForeignFn, FunctionDef, ImportDecl, ImportGroup, InvariantNetwork, MainDef, MatchArm, Module,
    NearMiss, Param, ProofObligation, Stmt, StmtKind, TypeDef, Verb,
};
pub use operators::{BinaryOp, UnaryOp};
pub use patterns::{LiteralValue, Pattern};
pub use types::{FieldDef, TypeBody, TypeExpr, TypeModifier, Variant};

/// Trait for AST nodes that have source location information.
pub trait Spanned {
    fn span(&self) -> Span;
}
