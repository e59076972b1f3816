//! Columnar storage for vector search.
//!
//! A [`Space`] stores one logical table under one uri. The table has a primary
//! key, an optional version column, one fixed-width vector column, and any
//! number of plain scalar columns. On disk the table is split into three
//! column groups, each a series of Parquet files:
//!
//! - **scalar**: keys, plain columns, and a synthetic `__offset` column
//! - **vector**: keys and the vector payload
//! - **delete**: tombstones (keys, plus a version for versioned tables)
//!
//! Scalar and vector files are written in pairs. A scalar row's `__offset` is
//! the position of its vector in the paired vector file, and the manifest
//! records which vector file each scalar file pairs with.
//!
//! Reads scan the scalar group, prune files and row groups with Parquet
//! statistics, apply tombstones and version resolution, and then fetch only
//! the vector rows that survive.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use arrow::array::{FixedSizeBinaryArray, Int64Array};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//! use vspace::{Options, ReadOptions, SchemaOptions, Space, WriteOption};
//!
//! # fn main() -> vspace::Result<()> {
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("pk", DataType::Int64, false),
//!     Field::new("ts", DataType::Int64, false),
//!     Field::new("vec", DataType::FixedSizeBinary(4), false),
//! ]));
//! let options = Options::new(
//!     Arc::clone(&schema),
//!     SchemaOptions::new("pk", "vec").with_version_column("ts"),
//! );
//! let space = Space::open("file:///tmp/vspace-demo", options)?;
//!
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![
//!         Arc::new(Int64Array::from(vec![1, 2])),
//!         Arc::new(Int64Array::from(vec![1, 1])),
//!         Arc::new(FixedSizeBinaryArray::try_from_iter(
//!             vec![b"abcd".to_vec(), b"efgh".to_vec()].into_iter(),
//!         )?),
//!     ],
//! )?;
//! space.write([batch], &WriteOption::default())?;
//!
//! for batch in space.read(&ReadOptions::new().with_version(1))? {
//!     println!("{} rows", batch?.num_rows());
//! }
//! space.close()?;
//! # Ok(())
//! # }
//! ```

mod gc;
pub mod manifest;
mod mvcc;
pub mod options;
pub mod reader;
mod scan;
pub mod schema;
mod space;
pub mod statistics;
pub mod types;
pub mod writer;

pub use manifest::{DataFile, Layout};
pub use options::{
    DEFAULT_MAX_RECORD_PER_FILE, Options, ReadOptions, SchemaOptions, SpaceOptions, WriteOption,
};
pub use reader::{ReaderConfig, record_batch_memory_size};
pub use scan::SpaceScan;
pub use schema::{OFFSET_COLUMN, SpaceSchema, validate};
pub use space::Space;
pub use statistics::{ChunkSelection, FileStatistics, select_chunks};
pub use types::{ColumnGroup, FileId};
pub use writer::WriterConfig;

pub use vspace_filter::{CompareOp, Filter, Predicate, ScalarValue, StatisticsFilter};
pub use vspace_result::{Error, Result, SchemaError};
pub use vspace_storage::{FileSystem, LocalFileSystem, MemFileSystem};
