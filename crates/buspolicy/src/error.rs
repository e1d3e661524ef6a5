use thiserror::Error;

/// Error type for the buspolicy binary, aggregating errors from the
/// compiler crates.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("compile error: {0}")]
    Compile(#[from] buspolicy_compiler::CompileError),

    #[error("fragment error: {0}")]
    Fragment(#[from] buspolicy_compiler::FragmentError),

    #[error("identity error: {0}")]
    Identity(#[from] buspolicy_core::CoreError),

    /// The load finished but some fragments failed and the caller asked for
    /// a strict result.
    #[error("{0} fragment(s) failed to load")]
    LoadFailed(usize),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(format!("TOML parse error: {}", e))
    }
}

pub type AppResult<T> = Result<T, AppError>;
