//! Per-space and per-call configuration.

use arrow::datatypes::SchemaRef;
use serde::{Deserialize, Serialize};
use vspace_filter::Filter;

use crate::reader::ReaderConfig;
use crate::writer::WriterConfig;

/// Default file rollover threshold for writes.
pub const DEFAULT_MAX_RECORD_PER_FILE: usize = 1024;

/// Column roles for a logical schema.
///
/// An empty `version_column` means the table is not versioned.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct SchemaOptions {
    /// Must name an `Int64` or `Utf8` field.
    pub primary_column: String,
    /// Optional; must name an `Int64` field when set.
    pub version_column: String,
    /// Must name a fixed-size binary field.
    pub vector_column: String,
}

impl SchemaOptions {
    pub fn new(primary_column: impl Into<String>, vector_column: impl Into<String>) -> Self {
        Self {
            primary_column: primary_column.into(),
            version_column: String::new(),
            vector_column: vector_column.into(),
        }
    }

    pub fn with_version_column(mut self, version_column: impl Into<String>) -> Self {
        self.version_column = version_column.into();
        self
    }

    pub fn has_version_column(&self) -> bool {
        !self.version_column.is_empty()
    }
}

/// Persisted location settings.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct SpaceOptions {
    pub uri: String,
}

/// Everything `Space::open` needs to create a space.
#[derive(Debug, Clone)]
pub struct Options {
    pub schema: SchemaRef,
    pub schema_options: SchemaOptions,
    pub writer_config: WriterConfig,
    pub reader_config: ReaderConfig,
}

impl Options {
    pub fn new(schema: SchemaRef, schema_options: SchemaOptions) -> Self {
        Self {
            schema,
            schema_options,
            writer_config: WriterConfig::default(),
            reader_config: ReaderConfig::default(),
        }
    }

    pub fn with_writer_config(mut self, writer_config: WriterConfig) -> Self {
        self.writer_config = writer_config;
        self
    }

    pub fn with_reader_config(mut self, reader_config: ReaderConfig) -> Self {
        self.reader_config = reader_config;
        self
    }
}

/// Per-call write settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOption {
    /// Rows per vector-group file before it is sealed and a new one begins.
    pub max_record_per_file: usize,
}

impl Default for WriteOption {
    fn default() -> Self {
        Self {
            max_record_per_file: DEFAULT_MAX_RECORD_PER_FILE,
        }
    }
}

impl WriteOption {
    pub fn new(max_record_per_file: usize) -> Self {
        Self {
            max_record_per_file,
        }
    }
}

/// Per-call read settings.
///
/// `columns` must include the primary column and, for versioned tables, the
/// version column. An empty list projects the whole logical schema.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub filters: Vec<Filter>,
    pub columns: Vec<String>,
    /// Upper bound on rows across the whole scan; `None` is unbounded.
    pub limit: Option<usize>,
    /// Snapshot version; `None` reads the latest state.
    pub version: Option<i64>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}
