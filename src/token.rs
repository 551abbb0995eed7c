//! The token definition for the filter query language.

use std::borrow::Cow;

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Literals and names
    /// A field name, possibly dotted: `author.country.name`. The dots are part
    /// of the token; splitting the path is the parser's job.
    Name(&'a str),
    /// Unescaped string content, without the surrounding quotes. Borrowed when
    /// the literal contains no escape sequences.
    String(Cow<'a, str>),
    Number(f64),
    Bool(bool),
    Null,

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // list-item separator

    // Comparison operators
    Eq,         // =
    NotEq,      // !=
    Gt,         // >
    Gte,        // >=
    Lt,         // <
    Lte,        // <=
    Matches,    // ~
    NotMatches, // !~
    In,         // in

    // Logical keywords
    And,
    Or,
    Not,

    // Special
    Illegal, // An illegal/unknown character or an unterminated string
    End,     // End of input
}

impl TokenKind<'_> {
    /// True for comparison operator tokens, `in` included.
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Gt
                | TokenKind::Gte
                | TokenKind::Lt
                | TokenKind::Lte
                | TokenKind::Matches
                | TokenKind::NotMatches
                | TokenKind::In
        )
    }

    /// True for tokens lexed from an unquoted word. A trailing token of this
    /// kind may still be a field name the user is in the middle of typing,
    /// which is what completion needs to know.
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Name(_)
                | TokenKind::Bool(_)
                | TokenKind::Null
                | TokenKind::In
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
        )
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
