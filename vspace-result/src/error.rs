use std::{fmt, io};
use thiserror::Error;

/// Unified error type for all vspace operations.
///
/// Errors propagate upward with the `?` operator. Only [`Error::Io`] is worth
/// retrying; every other variant describes a condition that will not go away
/// by calling the same operation again.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reported by the file-system collaborator.
    ///
    /// Surfaced verbatim; no automatic retry is performed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow error while building, slicing, or projecting record batches.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error while encoding or decoding a column file.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// The logical schema and column roles do not describe a valid space.
    ///
    /// Always fatal to `open`; never retried internally.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The persisted configuration conflicts with the one supplied by the caller.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// The space has been closed and accepts no further operations.
    #[error("space is closed")]
    ClosedSpace,

    /// A read projection omits a column the read path depends on, or names an
    /// unknown column.
    #[error("projection error: {0}")]
    Projection(String),

    /// Invalid user input or API parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// A file or persisted entity was not found.
    #[error("Storage key not found")]
    NotFound,

    /// The manifest could not be decoded or is internally inconsistent.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Internal error indicating a bug or unexpected state.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create a manifest error from any displayable error.
    ///
    /// # Examples
    ///
    /// ```
    /// use vspace_result::Error;
    ///
    /// let err = Error::manifest("truncated header");
    /// assert!(matches!(err, Error::Manifest(msg) if msg == "truncated header"));
    /// ```
    #[inline]
    pub fn manifest<E: fmt::Display>(err: E) -> Self {
        Error::Manifest(err.to_string())
    }

    /// Create an internal error from any displayable error.
    #[inline]
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Error::Internal(err.to_string())
    }

    /// Whether retrying the failed operation could succeed.
    ///
    /// Only I/O failures qualify; schema, configuration, and projection errors
    /// are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

/// Column-role validation failures.
///
/// Rules are checked in a fixed order and the first violation wins, so a schema
/// with several problems always reports the same one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The primary column is unset, missing, or not `Int64`/`Utf8`.
    #[error("invalid primary key column: {0}")]
    InvalidPrimaryKey(String),

    /// The version column is missing or not `Int64`.
    #[error("invalid version column: {0}")]
    InvalidVersionColumn(String),

    /// The vector column is unset, missing, or not fixed-size binary.
    #[error("invalid vector column: {0}")]
    InvalidVectorColumn(String),

    /// One column name is used for more than one role, or a reserved name is taken.
    #[error("column role collision: {0}")]
    RoleCollision(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_errors_are_retryable() {
        let io = Error::from(io::Error::other("disk unplugged"));
        assert!(io.is_retryable());

        let schema = Error::from(SchemaError::InvalidVectorColumn("vec".into()));
        assert!(!schema.is_retryable());
        assert!(!Error::ClosedSpace.is_retryable());
        assert!(!Error::ConfigMismatch("schema".into()).is_retryable());
    }

    #[test]
    fn schema_error_wraps_with_context() {
        let err: Error = SchemaError::RoleCollision("pk used twice".into()).into();
        assert_eq!(
            err.to_string(),
            "Schema error: column role collision: pk used twice"
        );
    }
}
