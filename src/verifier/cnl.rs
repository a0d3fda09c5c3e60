//! Controlled-natural-language parsing for `explain` rows.
//!
//! Intentionally lightweight: tokenize the row, find the first
//! recognized operation verb, classify connector words, and gather
//! the remaining identifiers as references. No semantic NLP.

use std::collections::BTreeSet;

use lazy_static::lazy_static;

lazy_static! {
    /// Operation verbs recognized out of the box; extendable through
    /// driver options.
    pub static ref BUILTIN_OPERATIONS: BTreeSet<&'static str> = {
        [
            "bound", "clamp", "sum", "add", "subtract", "multiply", "divide", "map", "filter",
            "reduce", "parse", "read", "write", "return", "compare", "check", "trim", "lower",
            "upper", "split", "join", "count", "find", "validate", "convert", "build", "format",
        ]
        .into_iter()
        .collect()
    };

    /// Connector prepositions.
    pub static ref BUILTIN_CONNECTORS: BTreeSet<&'static str> = {
        ["from", "using", "with", "to", "of", "by", "into", "over", "within", "below", "above"]
            .into_iter()
            .collect()
    };

    /// Sugar words carry no meaning and are skipped.
    static ref SUGAR_WORDS: BTreeSet<&'static str> = {
        ["the", "a", "an", "all", "applicable", "every", "some"]
            .into_iter()
            .collect()
    };
}

/// Extra vocabulary supplied by the project manifest's `[explain]`
/// section (loaded externally and passed through the driver).
#[derive(Debug, Clone, Default)]
pub struct CnlVocabulary {
    pub operations: Vec<String>,
    pub connectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// First recognized operation verb, if any.
    pub operation: Option<String>,
    /// Candidate reference words: everything that was not an
    /// operation, connector, or sugar. The verifier decides which of
    /// these must resolve (code-shaped words) and which are prose.
    pub references: Vec<String>,
    pub connectors: Vec<String>,
    /// Words that sit in operation position but are unknown.
    pub unknown_operation: Option<String>,
}

/// A word the verifier must resolve: a dotted field chain or a
/// snake_case identifier. Plain prose words are ignored.
pub fn is_code_shaped(word: &str) -> bool {
    word.contains('.') || word.contains('_')
}

/// Tokenize one explain row. The first non-sugar word is expected to
/// be an operation verb; later identifier-shaped words become
/// references.
pub fn parse_row(text: &str, vocab: &CnlVocabulary) -> ParsedRow {
    let mut operation: Option<String> = None;
    let mut unknown_operation: Option<String> = None;
    let mut references: Vec<String> = Vec::new();
    let mut connectors: Vec<String> = Vec::new();
    let mut saw_first_word = false;

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '.');
        if word.is_empty() {
            continue;
        }
        let lower = word.to_ascii_lowercase();

        if SUGAR_WORDS.contains(lower.as_str()) {
            continue;
        }
        if is_operation(&lower, vocab) {
            if operation.is_none() {
                operation = Some(lower);
                saw_first_word = true;
                continue;
            }
            // Later operations read as references to the functions
            // they name.
            references.push(lower);
            continue;
        }
        if is_connector(&lower, vocab) {
            connectors.push(lower);
            saw_first_word = true;
            continue;
        }
        if !saw_first_word && operation.is_none() {
            // The row leads with a word we do not recognize as an
            // operation.
            unknown_operation = Some(word.to_string());
            saw_first_word = true;
            continue;
        }
        saw_first_word = true;
        if is_identifier_shaped(word) {
            references.push(word.to_string());
        }
    }

    ParsedRow {
        operation,
        references,
        connectors,
        unknown_operation,
    }
}

fn is_operation(word: &str, vocab: &CnlVocabulary) -> bool {
    BUILTIN_OPERATIONS.contains(word) || vocab.operations.iter().any(|o| o == word)
}

fn is_connector(word: &str, vocab: &CnlVocabulary) -> bool {
    BUILTIN_CONNECTORS.contains(word) || vocab.connectors.iter().any(|c| c == word)
}

/// Identifier or dotted field-access chain.
fn is_identifier_shaped(word: &str) -> bool {
    !word.is_empty()
        && word.split('.').all(|seg| {
            !seg.is_empty()
                && seg.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
                && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// The contract shape an operation verb claims of its callee; used
/// to cross-check `explain` rows against the named function's own
/// `ensures` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractShape {
    /// Monotone non-decreasing on non-negative inputs.
    MonotoneNonDecreasing,
    /// An output-shape statement about `result`.
    OutputShape,
    /// Commutativity of the two operands.
    Commutative,
}

pub fn expected_shape(operation: &str) -> Option<ContractShape> {
    match operation {
        "sum" => Some(ContractShape::MonotoneNonDecreasing),
        "reduce" => Some(ContractShape::OutputShape),
        "add" => Some(ContractShape::Commutative),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vocab() -> CnlVocabulary {
        CnlVocabulary::default()
    }

    #[test]
    fn test_operation_and_references() {
        let row = parse_row("bound value from below using lo", &no_vocab());
        assert_eq!(row.operation.as_deref(), Some("bound"));
        assert_eq!(row.connectors, vec!["from", "below", "using"]);
        assert_eq!(row.references, vec!["value", "lo"]);
        assert!(row.unknown_operation.is_none());
    }

    #[test]
    fn test_sugar_words_ignored() {
        let row = parse_row("sum all the values of xs", &no_vocab());
        assert_eq!(row.operation.as_deref(), Some("sum"));
        assert_eq!(row.references, vec!["values", "xs"]);
    }

    #[test]
    fn test_unknown_leading_word() {
        let row = parse_row("frobnicate the widget", &no_vocab());
        assert!(row.operation.is_none());
        assert_eq!(row.unknown_operation.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn test_custom_vocabulary() {
        let vocab = CnlVocabulary {
            operations: vec!["frobnicate".to_string()],
            connectors: Vec::new(),
        };
        let row = parse_row("frobnicate the widget", &vocab);
        assert_eq!(row.operation.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn test_dotted_reference() {
        let row = parse_row("return config.port to the caller", &no_vocab());
        assert_eq!(row.operation.as_deref(), Some("return"));
        assert!(row.references.contains(&"config.port".to_string()));
    }
}
