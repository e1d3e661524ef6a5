use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Uid / Gid — numeric principal identities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl Uid {
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(pub u32);

impl Gid {
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Token — one lexical unit of the configuration dialect
// ---------------------------------------------------------------------------

/// The kinds of token a [`crate::TokenSource`] produces.
///
/// Attribute values and text are already unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    TagOpen(String),
    TagClose(String),
    TagCloseEmpty(String),
    AttributeName(String),
    AttributeValue(String),
    Text(String),
    End,
}

impl TokenKind {
    /// True for text tokens made only of XML whitespace.
    pub fn is_blank_text(&self) -> bool {
        match self {
            TokenKind::Text(content) => content
                .chars()
                .all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')),
            _ => false,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::TagOpen(name) => write!(f, "opening tag <{}>", name),
            TokenKind::TagClose(name) => write!(f, "closing tag </{}>", name),
            TokenKind::TagCloseEmpty(name) => write!(f, "end of empty tag <{}/>", name),
            TokenKind::AttributeName(name) => write!(f, "attribute {}=", name),
            TokenKind::AttributeValue(_) => write!(f, "attribute value"),
            TokenKind::Text(_) => write!(f, "text"),
            TokenKind::End => write!(f, "end of input"),
        }
    }
}

/// A token annotated with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32) -> Self {
        Self { kind, line }
    }
}
