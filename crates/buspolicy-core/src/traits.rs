use std::collections::VecDeque;

use crate::error::CoreResult;
use crate::types::{Gid, Token, TokenKind, Uid};

// ---------------------------------------------------------------------------
// TokenSource — pull-based lexer over the configuration dialect
//
// Produces TagOpen/TagClose/TagCloseEmpty/AttributeName/AttributeValue/
// Text tokens in document order and then End, repeatedly. Malformed input
// is reported as CoreError::Lexical.
// ---------------------------------------------------------------------------

pub trait TokenSource {
    fn next_token(&mut self) -> CoreResult<Token>;
}

// ---------------------------------------------------------------------------
// IdentityResolver — user/group name to numeric id
// ---------------------------------------------------------------------------

pub trait IdentityResolver: Send + Sync {
    fn resolve_user(&self, name: &str) -> CoreResult<Uid>;
    fn resolve_group(&self, name: &str) -> CoreResult<Gid>;
}

/// Replays a prepared token sequence, then yields `End` forever.
///
/// Lets callers drive the compiler without going through XML text.
#[derive(Debug, Default)]
pub struct VecTokenSource {
    tokens: VecDeque<Token>,
    last_line: u32,
}

impl VecTokenSource {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
            last_line: 1,
        }
    }

    /// Build a source where every token sits on line 1.
    pub fn from_kinds(kinds: impl IntoIterator<Item = TokenKind>) -> Self {
        Self::new(kinds.into_iter().map(|kind| Token::new(kind, 1)))
    }
}

impl TokenSource for VecTokenSource {
    fn next_token(&mut self) -> CoreResult<Token> {
        match self.tokens.pop_front() {
            Some(token) => {
                self.last_line = token.line;
                Ok(token)
            }
            None => Ok(Token::new(TokenKind::End, self.last_line)),
        }
    }
}
