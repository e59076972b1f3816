//! Parquet file writing for one column group.

use crate::manifest::DataFile;
use crate::statistics::FileStatistics;
use crate::types::{ColumnGroup, FileId};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::RowGroupMetaData;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::borrow::Borrow;
use vspace_result::{Error, Result};
use vspace_storage::{FileSystem, OutputFile};

/// Parquet encoding settings used for every file a space writes.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    pub compression: Compression,
    pub max_row_group_size: usize,
    /// Chunk statistics are what pruning relies on; disabling them makes every
    /// chunk a candidate.
    pub enable_statistics: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::snappy()
    }
}

impl WriterConfig {
    pub fn snappy() -> Self {
        Self {
            compression: Compression::SNAPPY,
            max_row_group_size: 8192,
            enable_statistics: true,
        }
    }

    pub fn uncompressed() -> Self {
        Self {
            compression: Compression::UNCOMPRESSED,
            ..Self::snappy()
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_max_row_group_size(mut self, max_row_group_size: usize) -> Self {
        self.max_row_group_size = max_row_group_size.max(1);
        self
    }

    pub fn with_statistics(mut self, enable: bool) -> Self {
        self.enable_statistics = enable;
        self
    }

    pub fn to_writer_properties(&self) -> WriterProperties {
        let statistics = if self.enable_statistics {
            EnabledStatistics::Chunk
        } else {
            EnabledStatistics::None
        };
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.max_row_group_size.max(1))
            .set_statistics_enabled(statistics)
            .build()
    }
}

/// An open, unsealed file of one column group.
pub struct GroupFileWriter {
    group: ColumnGroup,
    file_id: FileId,
    path: String,
    schema: SchemaRef,
    writer: ArrowWriter<Box<dyn OutputFile>>,
    row_count: u64,
}

impl GroupFileWriter {
    pub fn create(
        fs: &dyn FileSystem,
        group: ColumnGroup,
        file_id: FileId,
        schema: SchemaRef,
        config: &WriterConfig,
    ) -> Result<Self> {
        let path = group.file_path(file_id);
        let out = fs.open_output_file(&path)?;
        let writer =
            ArrowWriter::try_new(out, schema.clone(), Some(config.to_writer_properties()))?;
        tracing::trace!(path = %path, "opened column file for writing");
        Ok(Self {
            group,
            file_id,
            path,
            schema,
            writer,
            row_count: 0,
        })
    }

    pub fn group(&self) -> ColumnGroup {
        self.group
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn append(&mut self, batch: &RecordBatch) -> Result<()> {
        if batch.schema() != self.schema {
            return Err(Error::Internal(format!(
                "batch schema does not match {} file schema",
                self.group.dir()
            )));
        }
        self.writer.write(batch)?;
        self.row_count += batch.num_rows() as u64;
        Ok(())
    }

    /// Write the footer, finish the output file, and describe the result.
    pub fn seal(mut self) -> Result<DataFile> {
        self.writer.flush()?;
        let stats = FileStatistics::from_row_groups(
            &self.schema,
            self.writer
                .flushed_row_groups()
                .iter()
                .map(|rg| -> &RowGroupMetaData { rg.borrow() }),
        );
        let out = self.writer.into_inner()?;
        let size_bytes = out.finish()?;
        tracing::debug!(
            path = %self.path,
            rows = self.row_count,
            size_bytes,
            "sealed column file"
        );
        Ok(DataFile {
            file_id: self.file_id,
            path: self.path,
            row_count: self.row_count,
            size_bytes,
            linked_vector_file: None,
            stats,
        })
    }
}
