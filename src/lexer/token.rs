//! Token kinds and token structure for the Prove lexer.

use ordered_float::OrderedFloat;

use super::span::Span;

/// A token with its kind and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token { kind, span }
    }

    /// The surface text of the token, reconstructed from the kind.
    /// Used when explain/proof rows are reassembled into plain text
    /// and when token streams are printed back to source.
    pub fn lexeme(&self) -> String {
        self.kind.lexeme()
    }
}

/// One piece of a format string: literal text or a sub-lexed `{expr}`
/// hole. Pieces survive to the parser so interpolation can be parsed
/// as ordinary expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringPiece {
    Text(String),
    Interp(Vec<Token>),
}

/// All token kinds in the Prove language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Verbs
    Transforms,
    Validates,
    Reads,
    Creates,
    Matches,
    Inputs,
    Outputs,

    // Keywords
    Main,
    Module,
    Type,
    Is,
    As,
    With,
    Use,
    Where,
    Match,
    If,
    Else,
    From,
    Comptime,
    Valid,
    Foreign,
    Narrative,
    Temporal,
    InvariantNetwork,

    // Contract keywords
    Ensures,
    Requires,
    Proof,
    Explain,
    Terminates,
    Trusted,
    Know,
    Assume,
    Believe,
    WhyNot,
    Chosen,
    NearMiss,
    Intent,
    Satisfies,

    // Literals
    Int(i64),
    Dec(OrderedFloat<f64>),
    Bool(bool),
    Str(Vec<StringPiece>),
    TripleStr(String),
    RawStr(String),
    Regex(String),
    Char(char),

    // Identifiers
    Ident(String),
    TypeIdent(String),
    ConstIdent(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    BangPostfix,
    PipeArrow,
    FatArrow,
    Arrow,
    DotDot,
    Dot,
    Assign,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Pipe,

    // Layout
    Newline,
    Indent,
    Dedent,

    // Comments
    DocComment(String),

    // Special
    Eof,
}

impl TokenKind {
    pub fn lexeme(&self) -> String {
        match self {
            TokenKind::Transforms => "transforms".into(),
            TokenKind::Validates => "validates".into(),
            TokenKind::Reads => "reads".into(),
            TokenKind::Creates => "creates".into(),
            TokenKind::Matches => "matches".into(),
            TokenKind::Inputs => "inputs".into(),
            TokenKind::Outputs => "outputs".into(),
            TokenKind::Main => "main".into(),
            TokenKind::Module => "module".into(),
            TokenKind::Type => "type".into(),
            TokenKind::Is => "is".into(),
            TokenKind::As => "as".into(),
            TokenKind::With => "with".into(),
            TokenKind::Use => "use".into(),
            TokenKind::Where => "where".into(),
            TokenKind::Match => "match".into(),
            TokenKind::If => "if".into(),
            TokenKind::Else => "else".into(),
            TokenKind::From => "from".into(),
            TokenKind::Comptime => "comptime".into(),
            TokenKind::Valid => "valid".into(),
            TokenKind::Foreign => "foreign".into(),
            TokenKind::Narrative => "narrative".into(),
            TokenKind::Temporal => "temporal".into(),
            TokenKind::InvariantNetwork => "invariant_network".into(),
            TokenKind::Ensures => "ensures".into(),
            TokenKind::Requires => "requires".into(),
            TokenKind::Proof => "proof".into(),
            TokenKind::Explain => "explain".into(),
            TokenKind::Terminates => "terminates".into(),
            TokenKind::Trusted => "trusted".into(),
            TokenKind::Know => "know".into(),
            TokenKind::Assume => "assume".into(),
            TokenKind::Believe => "believe".into(),
            TokenKind::WhyNot => "why_not".into(),
            TokenKind::Chosen => "chosen".into(),
            TokenKind::NearMiss => "near_miss".into(),
            TokenKind::Intent => "intent".into(),
            TokenKind::Satisfies => "satisfies".into(),
            TokenKind::Int(v) => v.to_string(),
            TokenKind::Dec(v) => v.to_string(),
            TokenKind::Bool(v) => v.to_string(),
            TokenKind::Str(pieces) => {
                let mut out = String::from("\"");
                for piece in pieces {
                    match piece {
                        StringPiece::Text(t) => out.push_str(t),
                        StringPiece::Interp(tokens) => {
                            out.push('{');
                            let inner: Vec<String> =
                                tokens.iter().map(|t| t.lexeme()).collect();
                            out.push_str(&inner.join(" "));
                            out.push('}');
                        }
                    }
                }
                out.push('"');
                out
            }
            TokenKind::TripleStr(v) => format!("\"\"\"{}\"\"\"", v),
            TokenKind::RawStr(v) => format!("r\"{}\"", v),
            TokenKind::Regex(v) => format!("/{}/", v),
            TokenKind::Char(v) => format!("'{}'", v),
            TokenKind::Ident(v) | TokenKind::TypeIdent(v) | TokenKind::ConstIdent(v) => v.clone(),
            TokenKind::Plus => "+".into(),
            TokenKind::Minus => "-".into(),
            TokenKind::Star => "*".into(),
            TokenKind::Slash => "/".into(),
            TokenKind::Percent => "%".into(),
            TokenKind::EqEq => "==".into(),
            TokenKind::NotEq => "!=".into(),
            TokenKind::Lt => "<".into(),
            TokenKind::Gt => ">".into(),
            TokenKind::Le => "<=".into(),
            TokenKind::Ge => ">=".into(),
            TokenKind::AndAnd => "&&".into(),
            TokenKind::OrOr => "||".into(),
            TokenKind::Bang | TokenKind::BangPostfix => "!".into(),
            TokenKind::PipeArrow => "|>".into(),
            TokenKind::FatArrow => "=>".into(),
            TokenKind::Arrow => "->".into(),
            TokenKind::DotDot => "..".into(),
            TokenKind::Dot => ".".into(),
            TokenKind::Assign => "=".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
            TokenKind::LBracket => "[".into(),
            TokenKind::RBracket => "]".into(),
            TokenKind::Comma => ",".into(),
            TokenKind::Colon => ":".into(),
            TokenKind::Pipe => "|".into(),
            TokenKind::Newline => "\n".into(),
            TokenKind::Indent | TokenKind::Dedent => String::new(),
            TokenKind::DocComment(v) => format!("/// {}", v),
            TokenKind::Eof => String::new(),
        }
    }

    /// Keyword lookup for a lexed identifier.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "transforms" => TokenKind::Transforms,
            "validates" => TokenKind::Validates,
            "reads" => TokenKind::Reads,
            "creates" => TokenKind::Creates,
            "matches" => TokenKind::Matches,
            "inputs" => TokenKind::Inputs,
            "outputs" => TokenKind::Outputs,
            "main" => TokenKind::Main,
            "module" => TokenKind::Module,
            "type" => TokenKind::Type,
            "is" => TokenKind::Is,
            "as" => TokenKind::As,
            "with" => TokenKind::With,
            "use" => TokenKind::Use,
            "where" => TokenKind::Where,
            "match" => TokenKind::Match,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "from" => TokenKind::From,
            "comptime" => TokenKind::Comptime,
            "valid" => TokenKind::Valid,
            "foreign" => TokenKind::Foreign,
            "narrative" => TokenKind::Narrative,
            "temporal" => TokenKind::Temporal,
            "invariant_network" => TokenKind::InvariantNetwork,
            "ensures" => TokenKind::Ensures,
            "requires" => TokenKind::Requires,
            "proof" => TokenKind::Proof,
            "explain" => TokenKind::Explain,
            "terminates" => TokenKind::Terminates,
            "trusted" => TokenKind::Trusted,
            "know" => TokenKind::Know,
            "assume" => TokenKind::Assume,
            "believe" => TokenKind::Believe,
            "why_not" => TokenKind::WhyNot,
            "chosen" => TokenKind::Chosen,
            "near_miss" => TokenKind::NearMiss,
            "intent" => TokenKind::Intent,
            "satisfies" => TokenKind::Satisfies,
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => return None,
        })
    }

    /// A newline after one of these kinds is a continuation, not a
    /// logical line end.
    pub fn suppresses_newline(&self) -> bool {
        matches!(
            self,
            TokenKind::Comma
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::EqEq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::Le
                | TokenKind::Ge
                | TokenKind::AndAnd
                | TokenKind::OrOr
                | TokenKind::PipeArrow
                | TokenKind::FatArrow
                | TokenKind::Arrow
                | TokenKind::Colon
                | TokenKind::Pipe
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Assign
                | TokenKind::Dot
                | TokenKind::DotDot
        )
    }

    /// Kinds that complete a value. A `/` after one of these is
    /// division; elsewhere it starts a regex literal. A `!` glued to
    /// one of these is the fail-propagation postfix.
    pub fn is_value_end(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::TypeIdent(_)
                | TokenKind::ConstIdent(_)
                | TokenKind::Int(_)
                | TokenKind::Dec(_)
                | TokenKind::Bool(_)
                | TokenKind::Str(_)
                | TokenKind::TripleStr(_)
                | TokenKind::RawStr(_)
                | TokenKind::Regex(_)
                | TokenKind::Char(_)
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::BangPostfix
        )
    }
}
