use ordered_float::OrderedFloat;

use crate::lexer::Span;

use super::operators::{BinaryOp, UnaryOp};
use super::patterns::Pattern;
use super::types::{TypeBody, TypeExpr};
use super::Spanned;

/// The seven effect-class verbs that prefix function declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Transforms,
    Validates,
    Reads,
    Creates,
    Matches,
    Inputs,
    Outputs,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Transforms => "transforms",
            Verb::Validates => "validates",
            Verb::Reads => "reads",
            Verb::Creates => "creates",
            Verb::Matches => "matches",
            Verb::Inputs => "inputs",
            Verb::Outputs => "outputs",
        }
    }

    /// Pure verbs cannot perform IO and cannot carry the fail marker.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Verb::Transforms | Verb::Validates | Verb::Reads | Verb::Creates | Verb::Matches
        )
    }

    /// Preference order for context-aware call resolution.
    pub fn preference_rank(&self) -> u8 {
        match self {
            Verb::Transforms => 0,
            Verb::Validates => 1,
            Verb::Reads => 2,
            Verb::Creates => 3,
            Verb::Matches => 4,
            Verb::Inputs => 5,
            Verb::Outputs => 6,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Expressions ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Dec(OrderedFloat<f64>),
    Bool(bool),
    Str(String),
    /// Alternating literal and expression parts of a format string.
    StrInterp(Vec<Expr>),
    TripleStr(String),
    RawStr(String),
    Regex(String),
    Char(char),
    List(Vec<Expr>),
    /// `lo..hi`
    Range {
        lo: Box<Expr>,
        hi: Box<Expr>,
    },
    Identifier(String),
    /// Constructors and type references in expression position.
    TypeIdentifier(String),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Field {
        obj: Box<Expr>,
        field: String,
    },
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
    /// `a |> f` — desugared to a call on the typed AST.
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Postfix `!`.
    FailProp(Box<Expr>),
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    /// `valid f` (function reference) or `valid f(x)` (forced call).
    Valid {
        name: String,
        args: Option<Vec<Expr>>,
    },
    /// Explicit `match subject` or an implicit match (no subject)
    /// forming the whole body of a `matches` function.
    Match {
        subject: Option<Box<Expr>>,
        arms: Vec<MatchArm>,
    },
    If {
        condition: Box<Expr>,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Paren(Box<Expr>),
    Comptime(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        self.span
    }
}

// ── Statements ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `name as Type = expr` (the type is optional).
    VarDecl {
        name: String,
        type_expr: Option<TypeExpr>,
        value: Expr,
    },
    /// Re-assignment of an existing binding.
    Assign { target: String, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Spanned for Stmt {
    fn span(&self) -> Span {
        self.span
    }
}

// ── Function parts ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_expr: TypeExpr,
    pub constraint: Option<Expr>,
    pub span: Span,
}

/// One row of an `explain` block, kept verbatim for CNL parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainRow {
    pub text: String,
    pub span: Span,
}

/// One named obligation of a legacy `proof` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofObligation {
    pub name: String,
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    pub input: Expr,
    pub expected: Expr,
    pub span: Span,
}

/// Annotations appear between the signature and `from`, in any order;
/// source order is preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    Requires(Expr),
    Ensures(Expr),
    Terminates(Expr),
    Trusted(Option<String>),
    Know(Expr),
    Assume(Expr),
    Believe(Expr),
    WhyNot(String),
    Chosen(String),
    NearMiss(NearMiss),
    Satisfies(String),
    Intent(String),
    Explain(Vec<ExplainRow>),
    Proof(Vec<ProofObligation>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub span: Span,
}

// ── Top-level declarations ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub verb: Verb,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub can_fail: bool,
    pub annotations: Vec<Annotation>,
    pub body: Vec<Stmt>,
    pub doc: Option<String>,
    pub span: Span,
}

impl FunctionDef {
    pub fn requires(&self) -> impl Iterator<Item = &Expr> {
        self.annotations.iter().filter_map(|a| match &a.kind {
            AnnotationKind::Requires(e) => Some(e),
            _ => None,
        })
    }

    pub fn ensures(&self) -> impl Iterator<Item = &Expr> {
        self.annotations.iter().filter_map(|a| match &a.kind {
            AnnotationKind::Ensures(e) => Some(e),
            _ => None,
        })
    }

    pub fn terminates(&self) -> Option<&Expr> {
        self.annotations.iter().find_map(|a| match &a.kind {
            AnnotationKind::Terminates(e) => Some(e),
            _ => None,
        })
    }

    pub fn is_trusted(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| matches!(a.kind, AnnotationKind::Trusted(_)))
    }

    pub fn explain(&self) -> Option<(&[ExplainRow], Span)> {
        self.annotations.iter().find_map(|a| match &a.kind {
            AnnotationKind::Explain(rows) => Some((rows.as_slice(), a.span)),
            _ => None,
        })
    }

    pub fn proof(&self) -> Option<(&[ProofObligation], Span)> {
        self.annotations.iter().find_map(|a| match &a.kind {
            AnnotationKind::Proof(obls) => Some((obls.as_slice(), a.span)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MainDef {
    pub return_type: Option<TypeExpr>,
    pub can_fail: bool,
    pub body: Vec<Stmt>,
    pub doc: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub type_params: Vec<String>,
    pub body: TypeBody,
    pub doc: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDef {
    pub name: String,
    pub type_expr: Option<TypeExpr>,
    pub value: Expr,
    pub span: Span,
}

/// One imported name, optionally qualified by a verb or `types`.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportGroup {
    Verb(Verb, Vec<String>),
    Types(Vec<String>),
    Plain(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub module: String,
    pub groups: Vec<ImportGroup>,
    pub span: Span,
}

/// A C function binding inside a foreign block.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignFn {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignBlock {
    pub library: String,
    pub functions: Vec<ForeignFn>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvariantNetwork {
    pub name: String,
    pub constraints: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FunctionDef),
    Main(MainDef),
    Type(TypeDef),
    Constant(ConstantDef),
    Import(ImportDecl),
    Foreign(ForeignBlock),
    InvariantNetwork(InvariantNetwork),
}

impl Spanned for Decl {
    fn span(&self) -> Span {
        match self {
            Decl::Function(d) => d.span,
            Decl::Main(d) => d.span,
            Decl::Type(d) => d.span,
            Decl::Constant(d) => d.span,
            Decl::Import(d) => d.span,
            Decl::Foreign(d) => d.span,
            Decl::InvariantNetwork(d) => d.span,
        }
    }
}

/// A parsed compilation unit. The `module` header is optional; its
/// narrative and temporal chain are stored but ordering verification
/// is out of scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Option<String>,
    pub narrative: Option<String>,
    pub temporal: Option<Vec<String>>,
    pub declarations: Vec<Decl>,
    pub span: Span,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.declarations.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn main(&self) -> Option<&MainDef> {
        self.declarations.iter().find_map(|d| match d {
            Decl::Main(m) => Some(m),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.declarations.iter().filter_map(|d| match d {
            Decl::Type(t) => Some(t),
            _ => None,
        })
    }

    pub fn foreign_blocks(&self) -> impl Iterator<Item = &ForeignBlock> {
        self.declarations.iter().filter_map(|d| match d {
            Decl::Foreign(f) => Some(f),
            _ => None,
        })
    }
}
