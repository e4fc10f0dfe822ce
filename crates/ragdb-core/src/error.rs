use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A sparse or dense backend is not present. Search paths turn this into
    /// an empty partial result; it never escapes `search`.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Build failed: {0}")]
    BuildFailure(String),

    #[error("Cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a model or backend failure raised while building indices.
    pub fn build(context: &str, err: impl std::fmt::Display) -> Self {
        Self::BuildFailure(format!("{context}: {err}"))
    }

    pub fn operation(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Operation(format!("{context}: {err}"))
    }

    pub fn corrupt(context: &str, err: impl std::fmt::Display) -> Self {
        Self::CacheCorrupt(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
