//! Core type definitions for a space's physical layout.

use serde::{Deserialize, Serialize};

/// Identifier of a sealed column file.
///
/// Ids come from a single counter per space, so they also order commits: a
/// file with a larger id was committed later.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct FileId(pub u64);

impl From<u64> for FileId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<FileId> for u64 {
    fn from(id: FileId) -> Self {
        id.0
    }
}

/// The three physically separate file series of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnGroup {
    Scalar,
    Vector,
    Delete,
}

impl ColumnGroup {
    pub const ALL: [ColumnGroup; 3] = [ColumnGroup::Scalar, ColumnGroup::Vector, ColumnGroup::Delete];

    /// Directory, relative to the space root, holding this group's files.
    pub fn dir(self) -> &'static str {
        match self {
            ColumnGroup::Scalar => "scalar",
            ColumnGroup::Vector => "vector",
            ColumnGroup::Delete => "delete",
        }
    }

    /// Path of the file `id` within this group.
    pub fn file_path(self, id: FileId) -> String {
        format!("{}/{:020}.parquet", self.dir(), id.0)
    }
}
