use buspolicy_core::CoreError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rule::{RuleClass, RuleField};

/// A failure that aborts compilation of the current fragment.
///
/// Every variant carries the 1-based line of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("XML parse failure: {cause}")]
    Lexical { line: u32, cause: String },

    #[error("unexpected {found} in {state}")]
    UnexpectedToken {
        line: u32,
        state: &'static str,
        found: String,
    },

    #[error("unexpected tag <{tag}>, expected <busconfig>")]
    UnexpectedTag { line: u32, tag: String },

    #[error("unknown tag <{tag}> in <policy>")]
    UnknownPolicyElement { line: u32, tag: String },

    #[error("context= parameter '{value}' unknown for <policy>")]
    InvalidContext { line: u32, value: String },

    #[error("mixing {existing} and {requested} attributes on the same rule")]
    ClassMismatch {
        line: u32,
        existing: RuleClass,
        requested: RuleClass,
    },

    #[error("duplicate {field} attribute")]
    DuplicateAttribute { line: u32, field: RuleField },

    #[error("rule has no send_, receive_, own, own_prefix, user or group attribute")]
    ClassNotSet { line: u32 },

    #[error("invalid message type '{value}'")]
    InvalidMessageType { line: u32, value: String },

    #[error("closing tag </{found}> does not match <{expected}>")]
    MismatchedClose {
        line: u32,
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of input")]
    UnexpectedEnd { line: u32 },

    #[error("{source}")]
    Identity {
        line: u32,
        #[source]
        source: CoreError,
    },
}

/// Discriminator for [`CompileError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    Lexical,
    UnexpectedToken,
    UnexpectedTag,
    UnknownPolicyElement,
    InvalidContext,
    ClassMismatch,
    DuplicateAttribute,
    ClassNotSet,
    InvalidMessageType,
    MismatchedClose,
    UnexpectedEnd,
    Identity,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::Lexical => write!(f, "Lexical"),
            CompileErrorKind::UnexpectedToken => write!(f, "UnexpectedToken"),
            CompileErrorKind::UnexpectedTag => write!(f, "UnexpectedTag"),
            CompileErrorKind::UnknownPolicyElement => write!(f, "UnknownPolicyElement"),
            CompileErrorKind::InvalidContext => write!(f, "InvalidContext"),
            CompileErrorKind::ClassMismatch => write!(f, "ClassMismatch"),
            CompileErrorKind::DuplicateAttribute => write!(f, "DuplicateAttribute"),
            CompileErrorKind::ClassNotSet => write!(f, "ClassNotSet"),
            CompileErrorKind::InvalidMessageType => write!(f, "InvalidMessageType"),
            CompileErrorKind::MismatchedClose => write!(f, "MismatchedClose"),
            CompileErrorKind::UnexpectedEnd => write!(f, "UnexpectedEnd"),
            CompileErrorKind::Identity => write!(f, "Identity"),
        }
    }
}

impl CompileError {
    pub fn line(&self) -> u32 {
        match self {
            CompileError::Lexical { line, .. }
            | CompileError::UnexpectedToken { line, .. }
            | CompileError::UnexpectedTag { line, .. }
            | CompileError::UnknownPolicyElement { line, .. }
            | CompileError::InvalidContext { line, .. }
            | CompileError::ClassMismatch { line, .. }
            | CompileError::DuplicateAttribute { line, .. }
            | CompileError::ClassNotSet { line }
            | CompileError::InvalidMessageType { line, .. }
            | CompileError::MismatchedClose { line, .. }
            | CompileError::UnexpectedEnd { line }
            | CompileError::Identity { line, .. } => *line,
        }
    }

    pub fn kind(&self) -> CompileErrorKind {
        match self {
            CompileError::Lexical { .. } => CompileErrorKind::Lexical,
            CompileError::UnexpectedToken { .. } => CompileErrorKind::UnexpectedToken,
            CompileError::UnexpectedTag { .. } => CompileErrorKind::UnexpectedTag,
            CompileError::UnknownPolicyElement { .. } => CompileErrorKind::UnknownPolicyElement,
            CompileError::InvalidContext { .. } => CompileErrorKind::InvalidContext,
            CompileError::ClassMismatch { .. } => CompileErrorKind::ClassMismatch,
            CompileError::DuplicateAttribute { .. } => CompileErrorKind::DuplicateAttribute,
            CompileError::ClassNotSet { .. } => CompileErrorKind::ClassNotSet,
            CompileError::InvalidMessageType { .. } => CompileErrorKind::InvalidMessageType,
            CompileError::MismatchedClose { .. } => CompileErrorKind::MismatchedClose,
            CompileError::UnexpectedEnd { .. } => CompileErrorKind::UnexpectedEnd,
            CompileError::Identity { .. } => CompileErrorKind::Identity,
        }
    }

    /// Convert a token source failure. Lexical errors keep their own line;
    /// anything else is pinned to `line`.
    pub(crate) fn from_source(err: CoreError, line: u32) -> Self {
        match err {
            CoreError::Lexical { line, cause } => CompileError::Lexical { line, cause },
            other => CompileError::Lexical {
                line,
                cause: other.to_string(),
            },
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// A fragment that could not be read or compiled.
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source} at {}:{}", .path.display(), .source.line())]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },
}

impl FragmentError {
    pub fn path(&self) -> &Path {
        match self {
            FragmentError::Io { path, .. } | FragmentError::Compile { path, .. } => path,
        }
    }

    /// Line of the failure, when it happened while compiling.
    pub fn line(&self) -> Option<u32> {
        match self {
            FragmentError::Io { .. } => None,
            FragmentError::Compile { source, .. } => Some(source.line()),
        }
    }
}
