//! Resolve a space URI to the file system that serves it.

use crate::fs::{FileSystem, LocalFileSystem, MemFileSystem};
use std::sync::Arc;
use vspace_result::{Error, Result};

const FILE_SCHEME: &str = "file://";
const MEMORY_SCHEME: &str = "memory://";

/// Build a file system for `uri`.
///
/// - `file:///abs/path` and scheme-less paths map to a [`LocalFileSystem`]
/// - `memory://...` maps to a fresh, empty [`MemFileSystem`]
///
/// Any other scheme is rejected.
pub fn file_system_for_uri(uri: &str) -> Result<Arc<dyn FileSystem>> {
    if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
        if path.is_empty() {
            return Err(Error::InvalidArgumentError(format!(
                "uri '{uri}' has no path"
            )));
        }
        return Ok(Arc::new(LocalFileSystem::new(path)?));
    }
    if uri.starts_with(MEMORY_SCHEME) {
        return Ok(Arc::new(MemFileSystem::new()));
    }
    if uri.contains("://") {
        return Err(Error::InvalidArgumentError(format!(
            "unsupported uri scheme in '{uri}'"
        )));
    }
    if uri.is_empty() {
        return Err(Error::InvalidArgumentError("empty uri".into()));
    }
    Ok(Arc::new(LocalFileSystem::new(uri)?))
}
