use thiserror::Error;

use crate::source::QueryError;

/// Top-level error type for the subgrid table builder.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid build parameters or layer configuration. Raised before any
    /// block is processed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A data-source query or reprojection failed hard. A query that merely
    /// returns no data is not an error (see [`crate::source::DataSource`]).
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The cooperative cancellation flag was raised between blocks.
    #[error("build cancelled")]
    Cancelled,
}

/// Convenience type alias for results using [`BuildError`].
pub type Result<T> = std::result::Result<T, BuildError>;
