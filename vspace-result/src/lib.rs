//! Error and result types shared by every vspace crate.
//!
//! All fallible operations return [`Result<T>`], whose error side is the single
//! [`Error`] enum. Errors are plain values so callers can tell a retryable I/O
//! failure apart from a permanent schema or configuration violation.
//!
//! # Error Categories
//!
//! - **I/O errors** ([`Error::Io`]): file-system collaborator failures
//! - **Data format errors** ([`Error::Arrow`], [`Error::Parquet`]): encode/decode failures
//! - **Schema errors** ([`Error::Schema`]): column-role validation failures, see [`SchemaError`]
//! - **Configuration errors** ([`Error::ConfigMismatch`]): persisted layout disagrees with the caller
//! - **Lifecycle errors** ([`Error::ClosedSpace`]): use of a space after `close`
//! - **Projection errors** ([`Error::Projection`]): read projections missing key columns
//! - **User input errors** ([`Error::InvalidArgumentError`])
//! - **Manifest errors** ([`Error::Manifest`]): unreadable persisted configuration
//! - **Internal errors** ([`Error::Internal`]): bugs or unexpected states

pub mod error;
pub mod result;

pub use error::{Error, SchemaError};
pub use result::Result;
