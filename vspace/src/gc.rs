//! Garbage collection of files the manifest no longer references.
//!
//! A failed write can leave column files behind that were never committed, and
//! a crash during [`Manifest::save`] can leave the staging file. Neither is
//! ever read, so both are safe to remove while writes are held off.

use crate::manifest::{MANIFEST_TMP_PATH, Manifest};
use crate::types::ColumnGroup;
use rustc_hash::FxHashSet;
use vspace_result::Result;
use vspace_storage::FileSystem;

/// Every path reachable from `manifest`, including the manifest itself.
pub fn collect_referenced_paths(manifest: &Manifest) -> FxHashSet<&str> {
    manifest.referenced_paths().collect()
}

/// Delete every file under the group directories that `manifest` does not
/// reference, plus a leftover manifest staging file.
///
/// Returns the number of files deleted.
pub fn garbage_collect(fs: &dyn FileSystem, manifest: &Manifest) -> Result<usize> {
    let referenced = collect_referenced_paths(manifest);

    let mut unreferenced = Vec::new();
    for group in ColumnGroup::ALL {
        for path in fs.list_files(group.dir())? {
            if !referenced.contains(path.as_str()) {
                unreferenced.push(path);
            }
        }
    }
    if fs.exists(MANIFEST_TMP_PATH)? {
        unreferenced.push(MANIFEST_TMP_PATH.to_string());
    }

    for path in &unreferenced {
        tracing::trace!(path = %path, "deleting unreferenced file");
        fs.delete_file(path)?;
    }
    tracing::debug!(removed = unreferenced.len(), "garbage collection complete");
    Ok(unreferenced.len())
}
