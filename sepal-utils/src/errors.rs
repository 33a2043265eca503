//! Error type shared by all Sepal crates.
use crate::Id;
use thiserror::Error;

/// Convenience alias to reduce `Result` boilerplate.
pub type SepalResult<T> = std::result::Result<T, Error>;

/// Errors generated by the IR and the transformation framework.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A name is already bound in the enclosing scope.
    #[error("name `{0}' is already bound {1}")]
    AlreadyExists(Id, String),
    /// The IR is structurally malformed.
    #[error("malformed structure: {0}")]
    MalformedStructure(String),
    /// Miscellaneous error.
    #[error("{0}")]
    Misc(String),
}

impl Error {
    pub fn already_exists<S: ToString>(name: Id, context: S) -> Self {
        Error::AlreadyExists(name, context.to_string())
    }

    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Error::MalformedStructure(msg.to_string())
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Error::Misc(msg.to_string())
    }
}
