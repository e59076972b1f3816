//! Lazy read of a space snapshot.

use crate::manifest::{DataFile, Layout};
use crate::mvcc::{KeyColumn, Tombstones, VisibleRows};
use crate::reader::{ReaderConfig, open_file_reader};
use crate::schema::{OFFSET_COLUMN, SpaceSchema};
use crate::statistics::select_chunks;
use arrow::array::{ArrayRef, AsArray, BooleanArray, UInt32Array};
use arrow::compute::{and, concat_batches, filter_record_batch, take};
use arrow::datatypes::{Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use vspace_filter::Filter;
use vspace_result::{Error, Result};
use vspace_storage::FileSystem;

/// A validated read request, ready to run against a layout snapshot.
pub(crate) struct ScanPlan {
    pub filters: Vec<Filter>,
    /// Output columns, in output order.
    pub columns: Vec<String>,
    pub output_schema: SchemaRef,
    pub limit: Option<usize>,
    pub version: Option<i64>,
}

enum Visibility {
    Unversioned(Tombstones),
    Versioned(VisibleRows),
}

/// Iterator over the rows of a read, one batch per surviving scalar file.
///
/// Construction does no I/O. Tombstones and version resolution are loaded on
/// the first call to `next`, and each later call decodes one more file pair.
/// The scan reads only files sealed when it was created.
pub struct SpaceScan {
    fs: Arc<dyn FileSystem>,
    schema: Arc<SpaceSchema>,
    layout: Layout,
    plan: ScanPlan,
    config: ReaderConfig,
    visibility: Option<Visibility>,
    next_file: usize,
    remaining: Option<usize>,
    done: bool,
}

impl SpaceScan {
    pub(crate) fn new(
        fs: Arc<dyn FileSystem>,
        schema: Arc<SpaceSchema>,
        layout: Layout,
        plan: ScanPlan,
        config: ReaderConfig,
    ) -> Self {
        let remaining = plan.limit;
        Self {
            fs,
            schema,
            layout,
            plan,
            config,
            visibility: None,
            next_file: 0,
            remaining,
            done: false,
        }
    }

    /// Schema of every batch this scan yields.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.plan.output_schema)
    }

    /// Manifest version the scan reads.
    pub fn layout_version(&self) -> u64 {
        self.layout.version
    }

    fn prepare(&mut self) -> Result<()> {
        if self.visibility.is_some() {
            return Ok(());
        }
        let tombstones = Tombstones::load(
            self.fs.as_ref(),
            &self.layout.delete_files,
            &self.schema,
            &self.config,
        )?;
        let visibility = if self.schema.has_version_column() {
            Visibility::Versioned(VisibleRows::resolve(
                self.fs.as_ref(),
                &self.layout.scalar_files,
                &self.schema,
                &self.config,
                self.plan.version,
                &tombstones,
            )?)
        } else {
            Visibility::Unversioned(tombstones)
        };
        self.visibility = Some(visibility);
        Ok(())
    }

    /// Scalar columns this scan decodes: keys, offsets, filter columns, and
    /// every requested non-vector column.
    fn scalar_columns(&self) -> Vec<&str> {
        let vector = self.schema.vector_column();
        let mut columns: Vec<&str> = self
            .plan
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| *c != vector)
            .collect();
        columns.push(self.schema.primary_column());
        columns.extend(self.schema.version_column());
        columns.push(OFFSET_COLUMN);
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    fn read_file(&self, file: &DataFile) -> Result<Option<RecordBatch>> {
        if file.stats.can_skip(&self.plan.filters) {
            tracing::trace!(path = %file.path, "scalar file pruned by statistics");
            return Ok(None);
        }
        let visible = match &self.visibility {
            Some(Visibility::Versioned(rows)) => match rows.file(file.file_id) {
                Some(offsets) => Some(offsets),
                None => return Ok(None),
            },
            _ => None,
        };

        let reader = open_file_reader(self.fs.as_ref(), &file.path, &self.config)?;
        let columns = self.scalar_columns();
        let selection = select_chunks(
            reader.metadata(),
            reader.schema(),
            &self.plan.filters,
            &columns,
        )?;
        if selection.chunk_indices.is_empty() {
            return Ok(None);
        }
        let batches = reader
            .scan(&selection.chunk_indices, &selection.column_indices)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let Some(first) = batches.first() else {
            return Ok(None);
        };
        let scalar = concat_batches(&first.schema(), &batches)?;

        let mut mask = self.row_mask(&scalar, file, visible)?;
        for filter in &self.plan.filters {
            let column = scalar.column_by_name(filter.column()).ok_or_else(|| {
                Error::Internal(format!("filter column '{}' was not decoded", filter.column()))
            })?;
            mask = and(&mask, &filter.evaluate_array(column.as_ref())?)?;
        }
        let survivors = filter_record_batch(&scalar, &mask)?;
        if survivors.num_rows() == 0 {
            return Ok(None);
        }

        let vector = if self.plan.columns.iter().any(|c| c == self.schema.vector_column()) {
            Some(self.join_vectors(&survivors, file)?)
        } else {
            None
        };

        let output = self
            .plan
            .columns
            .iter()
            .map(|name| {
                if name == self.schema.vector_column() {
                    vector
                        .clone()
                        .ok_or_else(|| Error::Internal("vector column was not joined".into()))
                } else {
                    survivors.column_by_name(name).cloned().ok_or_else(|| {
                        Error::Internal(format!("column '{name}' was not decoded"))
                    })
                }
            })
            .collect::<Result<Vec<ArrayRef>>>()?;

        Ok(Some(RecordBatch::try_new(
            Arc::clone(&self.plan.output_schema),
            output,
        )?))
    }

    /// Rows of `scalar` that are visible at the scan's snapshot.
    fn row_mask(
        &self,
        scalar: &RecordBatch,
        file: &DataFile,
        visible: Option<&rustc_hash::FxHashSet<i64>>,
    ) -> Result<BooleanArray> {
        if let Some(visible) = visible {
            let offsets = offsets(scalar)?;
            return Ok(offsets
                .values()
                .iter()
                .map(|o| Some(visible.contains(o)))
                .collect());
        }
        let Some(Visibility::Unversioned(tombstones)) = &self.visibility else {
            return Ok(BooleanArray::from(vec![true; scalar.num_rows()]));
        };
        if tombstones.is_empty() {
            return Ok(BooleanArray::from(vec![true; scalar.num_rows()]));
        }
        let keys_array = scalar
            .column_by_name(self.schema.primary_column())
            .ok_or_else(|| Error::Internal("primary key was not decoded".into()))?;
        let keys = KeyColumn::try_new(keys_array.as_ref())?;
        Ok((0..scalar.num_rows())
            .map(|row| {
                Some(
                    keys.key(row)
                        .is_none_or(|key| !tombstones.hides_unversioned(&key, file.file_id)),
                )
            })
            .collect())
    }

    /// Fetch the vector payload for each surviving row from the linked vector
    /// file, in the rows' order.
    fn join_vectors(&self, survivors: &RecordBatch, file: &DataFile) -> Result<ArrayRef> {
        let linked = file.linked_vector_file.ok_or_else(|| {
            Error::manifest(format!("scalar file {} has no vector file", file.path))
        })?;
        let vector_file = self.layout.vector_file(linked).ok_or_else(|| {
            Error::manifest(format!("vector file {} is not in the layout", linked.0))
        })?;

        let offsets = offsets(survivors)?;
        let mut rows = Vec::with_capacity(offsets.len());
        for &offset in offsets.values() {
            let row = usize::try_from(offset)
                .map_err(|_| Error::Internal(format!("negative offset {offset}")))?;
            rows.push(row);
        }
        let mut unique = rows.clone();
        unique.sort_unstable();
        unique.dedup();

        let reader = open_file_reader(self.fs.as_ref(), &vector_file.path, &self.config)?;
        let vector_idx = reader
            .schema()
            .index_of(self.schema.vector_column())
            .map_err(|_| Error::Internal("vector file has no vector column".into()))?;
        let fetched = reader.scan_rows(&[vector_idx], &unique)?;
        if fetched.num_rows() != unique.len() {
            return Err(Error::Internal(format!(
                "vector file {} returned {} of {} rows",
                vector_file.path,
                fetched.num_rows(),
                unique.len()
            )));
        }

        let mut indices = Vec::with_capacity(rows.len());
        for row in &rows {
            let pos = unique
                .binary_search(row)
                .map_err(|_| Error::Internal("offset lost during vector join".into()))?;
            indices.push(pos as u32);
        }
        Ok(take(fetched.column(0).as_ref(), &UInt32Array::from(indices), None)?)
    }

    fn advance(&mut self) -> Result<Option<RecordBatch>> {
        self.prepare()?;
        while self.next_file < self.layout.scalar_files.len() {
            let file = &self.layout.scalar_files[self.next_file];
            self.next_file += 1;
            if let Some(batch) = self.read_file(file)? {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }
}

fn offsets(batch: &RecordBatch) -> Result<&arrow::array::Int64Array> {
    batch
        .column_by_name(OFFSET_COLUMN)
        .and_then(|c| c.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| Error::Internal("offset column was not decoded".into()))
}

impl Iterator for SpaceScan {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            self.done = true;
            return None;
        }
        match self.advance() {
            Ok(Some(batch)) => {
                let batch = match self.remaining.as_mut() {
                    Some(remaining) => {
                        let rows = batch.num_rows().min(*remaining);
                        *remaining -= rows;
                        batch.slice(0, rows)
                    }
                    None => batch,
                };
                Some(Ok(batch))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
