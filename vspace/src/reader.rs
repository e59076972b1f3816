//! Parquet file reading against a [`FileSystem`].

use arrow::array::{Array, ArrayData};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use bytes::Bytes;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReader,
    ParquetRecordBatchReaderBuilder, RowSelection,
};
use parquet::file::metadata::ParquetMetaData;
use std::ops::Range;
use std::sync::Arc;
use vspace_result::{Error, Result};
use vspace_storage::FileSystem;

/// Default number of rows per decoded batch.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Configuration applied to every Parquet reader a space opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Upper bound on rows per decoded batch. Zero is read as one.
    pub batch_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ReaderConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Open `path` and decode its footer.
pub fn open_file_reader(
    fs: &dyn FileSystem,
    path: &str,
    config: &ReaderConfig,
) -> Result<FileReader> {
    let bytes = fs.open_input_file(path)?;
    let metadata = ArrowReaderMetadata::load(&bytes, ArrowReaderOptions::default())?;
    tracing::trace!(
        path,
        row_groups = metadata.metadata().num_row_groups(),
        "opened column file"
    );
    Ok(FileReader {
        bytes,
        metadata,
        config: *config,
    })
}

/// A decoded footer plus the file's bytes. Every scan builds a fresh
/// single-pass reader over the same bytes.
pub struct FileReader {
    bytes: Bytes,
    metadata: ArrowReaderMetadata,
    config: ReaderConfig,
}

impl FileReader {
    pub fn metadata(&self) -> &Arc<ParquetMetaData> {
        self.metadata.metadata()
    }

    pub fn schema(&self) -> &SchemaRef {
        self.metadata.schema()
    }

    pub fn num_row_groups(&self) -> usize {
        self.metadata().num_row_groups()
    }

    pub fn num_rows(&self) -> usize {
        usize::try_from(self.metadata().file_metadata().num_rows()).unwrap_or(0)
    }

    fn builder(&self, columns: &[usize]) -> ParquetRecordBatchReaderBuilder<Bytes> {
        let builder =
            ParquetRecordBatchReaderBuilder::new_with_metadata(self.bytes.clone(), self.metadata.clone());
        let mask = ProjectionMask::roots(builder.parquet_schema(), columns.iter().copied());
        builder
            .with_projection(mask)
            .with_batch_size(self.config.batch_size.max(1))
    }

    /// Lazily decode `columns` (Arrow root indices) of the row groups in
    /// `chunks`, in the order given.
    pub fn scan(&self, chunks: &[usize], columns: &[usize]) -> Result<ParquetRecordBatchReader> {
        let reader = self
            .builder(columns)
            .with_row_groups(chunks.to_vec())
            .build()?;
        Ok(reader)
    }

    /// Decode `columns` for the file-wide row positions in `rows`, which must
    /// be strictly ascending. Rows come back in ascending order as one batch.
    pub fn scan_rows(&self, columns: &[usize], rows: &[usize]) -> Result<RecordBatch> {
        let total = self.num_rows();
        if let Some(&last) = rows.last()
            && last >= total
        {
            return Err(Error::Internal(format!(
                "row {last} is out of range for a file of {total} rows"
            )));
        }

        let selection = RowSelection::from_consecutive_ranges(consecutive_ranges(rows), total);
        let reader = self.builder(columns).with_row_selection(selection).build()?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}

/// Collapse ascending row positions into half-open ranges.
fn consecutive_ranges(rows: &[usize]) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut i = 0;
    std::iter::from_fn(move || {
        let start = *rows.get(i)?;
        let mut end = start + 1;
        i += 1;
        while rows.get(i) == Some(&end) {
            end += 1;
            i += 1;
        }
        Some(start..end)
    })
}

/// Bytes held by the buffers of `batch`, including validity bitmaps and
/// nested child data.
pub fn record_batch_memory_size(batch: &RecordBatch) -> usize {
    batch
        .columns()
        .iter()
        .map(|column| array_data_size(&column.to_data()))
        .sum()
}

fn array_data_size(data: &ArrayData) -> usize {
    let buffers: usize = data.buffers().iter().map(|b| b.len()).sum();
    let nulls = data.nulls().map_or(0, |n| n.buffer().len());
    let children: usize = data.child_data().iter().map(array_data_size).sum();
    buffers + nulls + children
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Int64Type, Schema};
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use vspace_storage::MemFileSystem;

    fn write_sample(fs: &MemFileSystem, path: &str) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from_iter_values(0..40)),
                Arc::new(StringArray::from_iter_values((0..40).map(|i| format!("n{i}")))),
            ],
        )
        .unwrap();
        let props = WriterProperties::builder().set_max_row_group_size(10).build();
        let out = fs.open_output_file(path).unwrap();
        let mut writer = ArrowWriter::try_new(out, schema, Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_scan_selected_chunks_and_columns() {
        let fs = MemFileSystem::new();
        write_sample(&fs, "scalar/a.parquet");
        let reader =
            open_file_reader(&fs, "scalar/a.parquet", &ReaderConfig::default().with_batch_size(4))
                .unwrap();
        assert_eq!(reader.num_row_groups(), 4);
        assert_eq!(reader.num_rows(), 40);

        let batches: Vec<RecordBatch> = reader
            .scan(&[1, 3], &[0])
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert!(batches.iter().all(|b| b.num_rows() <= 4 && b.num_columns() == 1));
        let ids: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.column(0).as_primitive::<Int64Type>().values().to_vec())
            .collect();
        let expected: Vec<i64> = (10..20).chain(30..40).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_scan_rows_by_position() {
        let fs = MemFileSystem::new();
        write_sample(&fs, "vector/a.parquet");
        let reader = open_file_reader(&fs, "vector/a.parquet", &ReaderConfig::default()).unwrap();

        let batch = reader.scan_rows(&[1], &[0, 1, 2, 9, 10, 39]).unwrap();
        let names = batch.column(0).as_string::<i32>();
        let got: Vec<&str> = (0..names.len()).map(|i| names.value(i)).collect();
        assert_eq!(got, vec!["n0", "n1", "n2", "n9", "n10", "n39"]);

        assert!(reader.scan_rows(&[0], &[40]).is_err());
        assert_eq!(reader.scan_rows(&[0], &[]).unwrap().num_rows(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let fs = MemFileSystem::new();
        let err = open_file_reader(&fs, "scalar/none.parquet", &ReaderConfig::default())
            .err()
            .unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_consecutive_ranges() {
        let ranges: Vec<_> = consecutive_ranges(&[0, 1, 2, 5, 7, 8]).collect();
        assert_eq!(ranges, vec![0..3, 5..6, 7..9]);
        assert_eq!(consecutive_ranges(&[]).count(), 0);
    }

    #[test]
    fn test_record_batch_memory_size() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["ab", "c", ""])),
            ],
        )
        .unwrap();
        // 3 * 8 value bytes, 4 * 4 offset bytes, 3 string bytes.
        assert_eq!(record_batch_memory_size(&batch), 24 + 16 + 3);

        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        let with_nulls = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![Some(1), None, Some(3)]))],
        )
        .unwrap();
        assert!(record_batch_memory_size(&with_nulls) > 24);
    }
}
