//! Row visibility: tombstones and per-key version resolution.

use crate::manifest::DataFile;
use crate::reader::{ReaderConfig, open_file_reader};
use crate::schema::{OFFSET_COLUMN, SpaceSchema};
use crate::statistics::select_chunks;
use crate::types::FileId;
use arrow::array::{Array, AsArray, Int64Array, StringArray};
use arrow::datatypes::{DataType, Int64Type};
use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use vspace_filter::Filter;
use vspace_result::{Error, Result};
use vspace_storage::FileSystem;

/// A primary-key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimaryKey {
    Int64(i64),
    Utf8(String),
}

/// Typed view over a primary-key column.
pub enum KeyColumn<'a> {
    Int64(&'a Int64Array),
    Utf8(&'a StringArray),
}

impl<'a> KeyColumn<'a> {
    pub fn try_new(array: &'a dyn Array) -> Result<Self> {
        match array.data_type() {
            DataType::Int64 => Ok(KeyColumn::Int64(array.as_primitive::<Int64Type>())),
            DataType::Utf8 => Ok(KeyColumn::Utf8(array.as_string::<i32>())),
            other => Err(Error::Internal(format!(
                "primary key column has type {other:?}"
            ))),
        }
    }

    /// `None` for null slots.
    pub fn key(&self, row: usize) -> Option<PrimaryKey> {
        match self {
            KeyColumn::Int64(a) => a.is_valid(row).then(|| PrimaryKey::Int64(a.value(row))),
            KeyColumn::Utf8(a) => a
                .is_valid(row)
                .then(|| PrimaryKey::Utf8(a.value(row).to_owned())),
        }
    }
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| Error::Internal(format!("missing Int64 column '{name}'")))
}

fn key_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<KeyColumn<'a>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::Internal(format!("missing key column '{name}'")))?;
    KeyColumn::try_new(column.as_ref())
}

/// Decode `columns` of every row of a file, skipping row groups `filters`
/// prove empty.
fn read_columns(
    fs: &dyn FileSystem,
    file: &DataFile,
    columns: &[&str],
    filters: &[Filter],
    config: &ReaderConfig,
) -> Result<Vec<RecordBatch>> {
    let reader = open_file_reader(fs, &file.path, config)?;
    let selection = select_chunks(reader.metadata(), reader.schema(), filters, columns)?;
    let batches = reader
        .scan(&selection.chunk_indices, &selection.column_indices)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batches)
}

/// Delete records gathered from every delete file of a layout snapshot.
#[derive(Debug, Default)]
pub struct Tombstones {
    /// Unversioned tables: the newest delete file naming each key.
    latest_file: FxHashMap<PrimaryKey, FileId>,
    /// Versioned tables: every delete version per key, ascending.
    versions: FxHashMap<PrimaryKey, Vec<i64>>,
}

impl Tombstones {
    pub fn load(
        fs: &dyn FileSystem,
        files: &[DataFile],
        schema: &SpaceSchema,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let pk = schema.primary_column();
        let version = schema.version_column();
        let mut columns = vec![pk];
        columns.extend(version);

        let per_file: Vec<Vec<RecordBatch>> = files
            .par_iter()
            .map(|file| read_columns(fs, file, &columns, &[], config))
            .collect::<Result<_>>()?;

        let mut tombstones = Tombstones::default();
        for (file, batches) in files.iter().zip(per_file) {
            for batch in &batches {
                let keys = key_column(batch, pk)?;
                let versions = version.map(|v| int64_column(batch, v)).transpose()?;
                for row in 0..batch.num_rows() {
                    let Some(key) = keys.key(row) else {
                        continue;
                    };
                    match versions {
                        Some(versions) if versions.is_valid(row) => {
                            tombstones
                                .versions
                                .entry(key)
                                .or_default()
                                .push(versions.value(row));
                        }
                        Some(_) => {}
                        None => {
                            let latest = tombstones.latest_file.entry(key).or_insert(file.file_id);
                            *latest = (*latest).max(file.file_id);
                        }
                    }
                }
            }
        }
        for versions in tombstones.versions.values_mut() {
            versions.sort_unstable();
        }

        tracing::trace!(
            files = files.len(),
            keys = tombstones.len(),
            "loaded tombstones"
        );
        Ok(tombstones)
    }

    pub fn len(&self) -> usize {
        self.latest_file.len() + self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unversioned rule: a row is gone when its key was deleted by a file
    /// committed after the row's own file.
    pub fn hides_unversioned(&self, key: &PrimaryKey, row_file: FileId) -> bool {
        self.latest_file
            .get(key)
            .is_some_and(|&deleted_in| deleted_in > row_file)
    }

    /// Versioned rule: a row at `row_version` is gone at `snapshot` when some
    /// delete version `d` satisfies `row_version <= d <= snapshot`.
    pub fn hides_versioned(&self, key: &PrimaryKey, row_version: i64, snapshot: i64) -> bool {
        let Some(versions) = self.versions.get(key) else {
            return false;
        };
        let first = versions.partition_point(|&d| d < row_version);
        versions.get(first).is_some_and(|&d| d <= snapshot)
    }
}

/// Offsets, per scalar file, of the rows visible at one snapshot of a
/// versioned table.
#[derive(Debug, Default)]
pub struct VisibleRows {
    by_file: FxHashMap<FileId, FxHashSet<i64>>,
}

impl VisibleRows {
    /// Pick, per primary key, the row with the greatest version not above
    /// `snapshot`, then drop the ones a tombstone covers.
    ///
    /// Equal versions resolve to the later file, then the later offset.
    pub fn resolve(
        fs: &dyn FileSystem,
        scalar_files: &[DataFile],
        schema: &SpaceSchema,
        config: &ReaderConfig,
        snapshot: Option<i64>,
        tombstones: &Tombstones,
    ) -> Result<Self> {
        let pk = schema.primary_column();
        let version = schema.version_column().ok_or_else(|| {
            Error::Internal("version resolution on an unversioned table".into())
        })?;
        let columns = [pk, version, OFFSET_COLUMN];
        let filters: Vec<Filter> = snapshot.map(|v| Filter::le(version, v)).into_iter().collect();

        let per_file: Vec<Vec<RecordBatch>> = scalar_files
            .par_iter()
            .map(|file| {
                if file.stats.can_skip(&filters) {
                    return Ok(Vec::new());
                }
                read_columns(fs, file, &columns, &filters, config)
            })
            .collect::<Result<_>>()?;

        let mut latest: FxHashMap<PrimaryKey, (i64, FileId, i64)> = FxHashMap::default();
        for (file, batches) in scalar_files.iter().zip(per_file) {
            for batch in &batches {
                let keys = key_column(batch, pk)?;
                let versions = int64_column(batch, version)?;
                let offsets = int64_column(batch, OFFSET_COLUMN)?;
                for row in 0..batch.num_rows() {
                    let (Some(key), true) = (keys.key(row), versions.is_valid(row)) else {
                        continue;
                    };
                    let row_version = versions.value(row);
                    if snapshot.is_some_and(|v| row_version > v) {
                        continue;
                    }
                    let candidate = (row_version, file.file_id, offsets.value(row));
                    latest
                        .entry(key)
                        .and_modify(|best| {
                            if candidate.0 >= best.0 {
                                *best = candidate;
                            }
                        })
                        .or_insert(candidate);
                }
            }
        }

        let snapshot = snapshot.unwrap_or(i64::MAX);
        let mut visible = VisibleRows::default();
        for (key, (row_version, file_id, offset)) in latest {
            if tombstones.hides_versioned(&key, row_version, snapshot) {
                continue;
            }
            visible.by_file.entry(file_id).or_default().insert(offset);
        }

        tracing::trace!(
            files = scalar_files.len(),
            files_with_rows = visible.by_file.len(),
            rows = visible.len(),
            "resolved versioned visibility"
        );
        Ok(visible)
    }

    pub fn file(&self, file_id: FileId) -> Option<&FxHashSet<i64>> {
        self.by_file.get(&file_id)
    }

    pub fn len(&self) -> usize {
        self.by_file.values().map(FxHashSet::len).sum()
    }
}
