use thiserror::Error;

/// Failures reported by the external collaborators (token source and
/// identity resolver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("XML parse failure at line {line}: {cause}")]
    Lexical { line: u32, cause: String },

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("identity lookup failed: {0}")]
    Identity(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
