use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Highlight error: {0}")]
    Highlight(String),

    #[error("Typeset error: {0}")]
    Typeset(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Block not found: {0}")]
    BlockNotFound(usize),
}

impl Error {
    pub fn highlight(message: impl Into<String>) -> Self {
        Self::Highlight(message.into())
    }

    pub fn typeset(message: impl Into<String>) -> Self {
        Self::Typeset(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn clipboard(message: impl Into<String>) -> Self {
        Self::Clipboard(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Highlighting or typesetting produced nothing usable; recovered per span.
    pub fn is_render_failure(&self) -> bool {
        matches!(self, Error::Highlight(_) | Error::Typeset(_))
    }

    /// The history collaborator failed; callers fall back to an empty collection.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Error::Persistence(_) | Error::Serialization(_) | Error::Io(_)
        )
    }

    pub fn is_copy_failure(&self) -> bool {
        matches!(self, Error::Clipboard(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
