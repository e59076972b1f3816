use super::*;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::io;
use std::sync::{Arc, RwLock};
use vspace_result::{Error, Result};

type FileMap = Arc<RwLock<FxHashMap<String, Bytes>>>;

/// In-memory file system used for tests and transient spaces.
///
/// Clones share the same files, so a space can be closed and reopened against
/// a clone to exercise persistence without touching disk.
#[derive(Clone, Default)]
pub struct MemFileSystem {
    files: FileMap,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.files.read().map(|files| files.len()).unwrap_or(0)
    }
}

fn poisoned() -> Error {
    Error::Internal("MemFileSystem lock poisoned".into())
}

fn not_found(path: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("file '{path}' not found"),
    ))
}

impl FileSystem for MemFileSystem {
    fn open_input_file(&self, path: &str) -> Result<Bytes> {
        check_relative_path(path)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn open_output_file(&self, path: &str) -> Result<Box<dyn OutputFile>> {
        check_relative_path(path)?;
        Ok(Box::new(MemOutputFile {
            files: Arc::clone(&self.files),
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        check_relative_path(path)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.contains_key(path))
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        check_relative_path(path)?;
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        check_relative_path(from)?;
        check_relative_path(to)?;
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let bytes = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_string(), bytes);
        Ok(())
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let files = self.files.read().map_err(|_| poisoned())?;
        let mut out: Vec<String> = files
            .keys()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }
}

/// Buffers writes and publishes the file on `finish`. Dropping the handle
/// without finishing leaves no file behind.
struct MemOutputFile {
    files: FileMap,
    path: String,
    buf: Vec<u8>,
}

impl io::Write for MemOutputFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputFile for MemOutputFile {
    fn finish(self: Box<Self>) -> Result<u64> {
        let MemOutputFile { files, path, buf } = *self;
        let len = buf.len() as u64;
        let mut files = files.write().map_err(|_| poisoned())?;
        files.insert(path, Bytes::from(buf));
        Ok(len)
    }
}
