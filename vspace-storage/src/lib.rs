//! File-system collaborators for vspace.
//!
//! A space never touches `std::fs` directly. Every column file and the manifest
//! go through the [`FileSystem`] trait, which hands out whole-file reads as
//! [`bytes::Bytes`] and streaming writes as [`OutputFile`] handles. Paths are
//! relative, `/`-separated, and resolved against the root the file system was
//! built for.

pub mod fs;
pub mod uri;

pub use fs::{FileSystem, LocalFileSystem, MemFileSystem, OutputFile};
pub use uri::file_system_for_uri;
