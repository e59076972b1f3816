//! Minimal file-system trait plus local and in-memory implementations.
//!
//! Reads return `bytes::Bytes` so Parquet readers can decode straight out of
//! the buffer without another copy.

use bytes::Bytes;
use std::io::Write;
use vspace_result::{Error, Result};

pub mod local_fs;
pub use local_fs::*;

pub mod mem_fs;
pub use mem_fs::*;

/// Writable handle to a file that becomes durable on [`OutputFile::finish`].
pub trait OutputFile: Write + Send {
    /// Flush buffered bytes and finalize the file. Returns the total number of
    /// bytes written.
    fn finish(self: Box<Self>) -> Result<u64>;
}

pub trait FileSystem: Send + Sync + 'static {
    /// Read a whole file.
    fn open_input_file(&self, path: &str) -> Result<Bytes>;

    /// Create (or truncate) a file for writing. Parent directories are created
    /// as needed.
    fn open_output_file(&self, path: &str) -> Result<Box<dyn OutputFile>>;

    fn exists(&self, path: &str) -> Result<bool>;

    fn delete_file(&self, path: &str) -> Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// List files directly under `dir`, as full relative paths, sorted.
    /// A missing directory lists as empty.
    fn list_files(&self, dir: &str) -> Result<Vec<String>>;
}

/// Reject paths that would escape the file-system root.
pub(crate) fn check_relative_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|part| part == ".." || part.is_empty())
    {
        return Err(Error::InvalidArgumentError(format!(
            "'{path}' is not a relative file path"
        )));
    }
    Ok(())
}
