//! The space: one uri, one manifest, three column groups.

use crate::gc;
use crate::manifest::{Layout, Manifest};
use crate::options::{Options, ReadOptions, SpaceOptions, WriteOption};
use crate::reader::ReaderConfig;
use crate::scan::{ScanPlan, SpaceScan};
use crate::schema::SpaceSchema;
use crate::types::ColumnGroup;
use crate::writer::{GroupFileWriter, WriterConfig};
use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::datatypes::Schema;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use vspace_filter::value::is_supported_type;
use vspace_result::{Error, Result};
use vspace_storage::{FileSystem, file_system_for_uri};

/// The scalar and vector files currently being filled by a write.
struct OpenPair {
    scalar: GroupFileWriter,
    vector: GroupFileWriter,
}

/// A storage location holding one logical table.
///
/// Writes and deletes are serialized internally. Reads snapshot the manifest
/// when they are created and only ever see sealed files, so they can run
/// alongside a write. After [`Space::close`] every call fails with
/// [`Error::ClosedSpace`].
pub struct Space {
    fs: Arc<dyn FileSystem>,
    uri: String,
    schema: Arc<SpaceSchema>,
    manifest: RwLock<Manifest>,
    write_lock: Mutex<()>,
    closed: AtomicBool,
    writer_config: WriterConfig,
    reader_config: ReaderConfig,
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("uri", &self.uri)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Space {
    /// Open the space at `uri`, creating it from `options` if the location
    /// holds no manifest yet.
    pub fn open(uri: &str, options: Options) -> Result<Self> {
        let fs = file_system_for_uri(uri)?;
        Self::open_with_file_system(fs, uri, options)
    }

    /// Like [`Space::open`], over a caller-supplied file system rooted at the
    /// space.
    ///
    /// An existing space must have been created with the same schema (field
    /// names, types, nullability, and order) and the same column roles;
    /// otherwise this returns [`Error::ConfigMismatch`].
    pub fn open_with_file_system(
        fs: Arc<dyn FileSystem>,
        uri: &str,
        options: Options,
    ) -> Result<Self> {
        let Options {
            schema,
            schema_options,
            writer_config,
            reader_config,
        } = options;

        let manifest = match Manifest::load(fs.as_ref())? {
            Some(manifest) => {
                let existing =
                    SpaceSchema::try_new(Arc::clone(&manifest.schema), manifest.schema_options.clone())?;
                if !existing.is_same_layout(&schema, &schema_options) {
                    return Err(Error::ConfigMismatch(format!(
                        "space at '{uri}' was created with a different schema or column roles"
                    )));
                }
                tracing::debug!(uri, version = manifest.version(), "opened space");
                manifest
            }
            None => {
                SpaceSchema::try_new(Arc::clone(&schema), schema_options.clone())?;
                let manifest = Manifest::new(
                    SpaceOptions {
                        uri: uri.to_string(),
                    },
                    schema,
                    schema_options,
                );
                manifest.save(fs.as_ref())?;
                tracing::debug!(uri, "created space");
                manifest
            }
        };

        Self::from_manifest(fs, uri, manifest, writer_config, reader_config)
    }

    /// Open a space that already exists, taking schema and column roles from
    /// its manifest. Returns [`Error::NotFound`] if there is none.
    pub fn open_existing(uri: &str) -> Result<Self> {
        let fs = file_system_for_uri(uri)?;
        Self::open_existing_with_file_system(fs, uri)
    }

    pub fn open_existing_with_file_system(fs: Arc<dyn FileSystem>, uri: &str) -> Result<Self> {
        let manifest = Manifest::load(fs.as_ref())?.ok_or(Error::NotFound)?;
        tracing::debug!(uri, version = manifest.version(), "opened existing space");
        Self::from_manifest(
            fs,
            uri,
            manifest,
            WriterConfig::default(),
            ReaderConfig::default(),
        )
    }

    fn from_manifest(
        fs: Arc<dyn FileSystem>,
        uri: &str,
        manifest: Manifest,
        writer_config: WriterConfig,
        reader_config: ReaderConfig,
    ) -> Result<Self> {
        let schema = SpaceSchema::try_new(
            Arc::clone(&manifest.schema),
            manifest.schema_options.clone(),
        )?;
        Ok(Self {
            fs,
            uri: uri.to_string(),
            schema: Arc::new(schema),
            manifest: RwLock::new(manifest),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            writer_config,
            reader_config,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn schema(&self) -> &SpaceSchema {
        &self.schema
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClosedSpace);
        }
        Ok(())
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(Error::internal)
    }

    fn manifest_read(&self) -> Result<RwLockReadGuard<'_, Manifest>> {
        self.manifest
            .read()
            .map_err(Error::internal)
    }

    fn manifest_write(&self) -> Result<RwLockWriteGuard<'_, Manifest>> {
        self.manifest
            .write()
            .map_err(Error::internal)
    }

    /// Current sealed files of every group.
    pub fn layout(&self) -> Result<Layout> {
        self.check_open()?;
        Ok(self.manifest_read()?.layout().clone())
    }

    /// Append record batches.
    ///
    /// Rows are split into the scalar and vector groups. A new file pair is
    /// started whenever the current vector file reaches
    /// `option.max_record_per_file` rows. Every file pair is committed as
    /// soon as it is sealed, and the last partial pair is sealed before this
    /// returns. On error, pairs committed earlier stay.
    pub fn write<I>(&self, batches: I, option: &WriteOption) -> Result<()>
    where
        I: IntoIterator<Item = RecordBatch>,
    {
        self.write_results(batches.into_iter().map(Ok), option)
    }

    /// [`Space::write`] over an Arrow batch reader.
    pub fn write_stream<R>(&self, reader: R, option: &WriteOption) -> Result<()>
    where
        R: RecordBatchReader,
    {
        self.write_results(reader.map(|b| b.map_err(Error::from)), option)
    }

    fn write_results<I>(&self, batches: I, option: &WriteOption) -> Result<()>
    where
        I: Iterator<Item = Result<RecordBatch>>,
    {
        self.check_open()?;
        if option.max_record_per_file == 0 {
            return Err(Error::InvalidArgumentError(
                "max_record_per_file must be greater than zero".into(),
            ));
        }
        let max_rows = option.max_record_per_file as u64;

        let _guard = self.lock_writes()?;
        self.check_open()?;

        let mut open: Option<OpenPair> = None;
        let mut total_rows = 0usize;
        for batch in batches {
            let batch = batch?;
            self.check_write_batch(&batch)?;

            let mut start = 0;
            while start < batch.num_rows() {
                if open.is_none() {
                    open = Some(self.open_pair()?);
                }
                let Some(pair) = open.as_mut() else {
                    return Err(Error::Internal("no open file pair".into()));
                };
                let room = (max_rows - pair.vector.row_count()) as usize;
                let len = room.min(batch.num_rows() - start);
                let first_offset = pair.vector.row_count() as i64;
                let (scalar, vector) = self
                    .schema
                    .split_batch(&batch.slice(start, len), first_offset)?;
                pair.vector.append(&vector)?;
                pair.scalar.append(&scalar)?;
                start += len;
                total_rows += len;

                if pair.vector.row_count() >= max_rows
                    && let Some(full) = open.take()
                {
                    self.commit_pair(full)?;
                }
            }
        }
        if let Some(pair) = open.take() {
            self.commit_pair(pair)?;
        }

        tracing::debug!(rows = total_rows, "write complete");
        Ok(())
    }

    fn check_write_batch(&self, batch: &RecordBatch) -> Result<()> {
        self.schema.check_batch_schema(&batch.schema())?;
        let key_columns = std::iter::once(self.schema.primary_column())
            .chain(self.schema.version_column());
        for name in key_columns {
            if batch
                .column_by_name(name)
                .is_some_and(|c| c.null_count() > 0)
            {
                return Err(Error::InvalidArgumentError(format!(
                    "column '{name}' must not contain nulls"
                )));
            }
        }
        Ok(())
    }

    fn open_pair(&self) -> Result<OpenPair> {
        let (vector_id, scalar_id) = {
            let mut manifest = self.manifest_write()?;
            (manifest.allocate_file_id(), manifest.allocate_file_id())
        };
        let vector = GroupFileWriter::create(
            self.fs.as_ref(),
            ColumnGroup::Vector,
            vector_id,
            Arc::clone(self.schema.vector_schema()),
            &self.writer_config,
        )?;
        let scalar = GroupFileWriter::create(
            self.fs.as_ref(),
            ColumnGroup::Scalar,
            scalar_id,
            Arc::clone(self.schema.scalar_schema()),
            &self.writer_config,
        )?;
        Ok(OpenPair { scalar, vector })
    }

    fn commit_pair(&self, pair: OpenPair) -> Result<()> {
        let OpenPair { scalar, vector } = pair;
        let (vector, scalar) = rayon::join(|| vector.seal(), || scalar.seal());
        let vector = vector?;
        let mut scalar = scalar?;
        scalar.linked_vector_file = Some(vector.file_id);

        let mut manifest = self.manifest_write()?;
        manifest.add_file(ColumnGroup::Vector, vector);
        manifest.add_file(ColumnGroup::Scalar, scalar);
        manifest.save(self.fs.as_ref())
    }

    /// Mark `keys` deleted.
    ///
    /// Versioned tables require `version`, the version at which the keys stop
    /// being visible. Unversioned tables reject one.
    pub fn delete(&self, keys: ArrayRef, version: Option<i64>) -> Result<()> {
        self.check_open()?;
        let delete_schema = Arc::clone(self.schema.delete_schema());
        let mut columns = vec![keys];
        match (self.schema.has_version_column(), version) {
            (true, Some(version)) => {
                let len = columns[0].len();
                columns.push(Arc::new(Int64Array::from(vec![version; len])));
            }
            (true, None) => {
                return Err(Error::InvalidArgumentError(
                    "deletes on a versioned space need a version".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(Error::InvalidArgumentError(
                    "deletes on an unversioned space take no version".into(),
                ));
            }
            (false, None) => {}
        }
        let pk_type = delete_schema.field(0).data_type();
        if columns[0].data_type() != pk_type {
            return Err(Error::InvalidArgumentError(format!(
                "delete keys have type {:?}, expected {pk_type:?}",
                columns[0].data_type()
            )));
        }
        let batch = RecordBatch::try_new(delete_schema, columns)?;
        self.delete_batch(&batch)
    }

    /// Append tombstones from a batch carrying the delete schema's columns
    /// (primary key and, for versioned tables, version). Extra columns are
    /// ignored.
    pub fn delete_batch(&self, batch: &RecordBatch) -> Result<()> {
        self.check_open()?;
        let delete_schema = Arc::clone(self.schema.delete_schema());
        let columns = delete_schema
            .fields()
            .iter()
            .map(|field| {
                let column = batch.column_by_name(field.name()).ok_or_else(|| {
                    Error::InvalidArgumentError(format!(
                        "delete batch is missing column '{}'",
                        field.name()
                    ))
                })?;
                if column.data_type() != field.data_type() {
                    return Err(Error::InvalidArgumentError(format!(
                        "delete column '{}' has type {:?}, expected {:?}",
                        field.name(),
                        column.data_type(),
                        field.data_type()
                    )));
                }
                if column.null_count() > 0 {
                    return Err(Error::InvalidArgumentError(format!(
                        "delete column '{}' must not contain nulls",
                        field.name()
                    )));
                }
                Ok(Arc::clone(column))
            })
            .collect::<Result<Vec<_>>>()?;
        if batch.num_rows() == 0 {
            return Ok(());
        }
        let tombstones = RecordBatch::try_new(Arc::clone(&delete_schema), columns)?;

        let _guard = self.lock_writes()?;
        self.check_open()?;
        let file_id = self.manifest_write()?.allocate_file_id();
        let mut writer = GroupFileWriter::create(
            self.fs.as_ref(),
            ColumnGroup::Delete,
            file_id,
            delete_schema,
            &self.writer_config,
        )?;
        writer.append(&tombstones)?;
        let file = writer.seal()?;

        let mut manifest = self.manifest_write()?;
        manifest.add_file(ColumnGroup::Delete, file);
        manifest.save(self.fs.as_ref())?;
        tracing::debug!(keys = tombstones.num_rows(), "delete committed");
        Ok(())
    }

    /// Start a read. Validation happens here; all file I/O is deferred to the
    /// returned iterator.
    pub fn read(&self, options: &ReadOptions) -> Result<SpaceScan> {
        self.check_open()?;
        let plan = self.plan_read(options)?;
        let layout = self.manifest_read()?.layout().clone();
        tracing::trace!(
            version = layout.version,
            scalar_files = layout.scalar_files.len(),
            "read planned"
        );
        Ok(SpaceScan::new(
            Arc::clone(&self.fs),
            Arc::clone(&self.schema),
            layout,
            plan,
            self.reader_config,
        ))
    }

    fn plan_read(&self, options: &ReadOptions) -> Result<ScanPlan> {
        let logical = self.schema.schema();
        let columns: Vec<String> = if options.columns.is_empty() {
            logical.fields().iter().map(|f| f.name().clone()).collect()
        } else {
            options.columns.clone()
        };

        let mut seen = FxHashSet::default();
        let mut fields = Vec::with_capacity(columns.len());
        for name in &columns {
            let field = logical
                .field_with_name(name)
                .map_err(|_| Error::Projection(format!("unknown column '{name}'")))?;
            if !seen.insert(name.as_str()) {
                return Err(Error::Projection(format!("column '{name}' requested twice")));
            }
            fields.push(field.clone());
        }
        let required = std::iter::once(self.schema.primary_column())
            .chain(self.schema.version_column());
        for name in required {
            if !seen.contains(name) {
                return Err(Error::Projection(format!(
                    "projection must include '{name}'"
                )));
            }
        }

        for filter in &options.filters {
            let name = filter.column();
            if name == self.schema.vector_column() {
                return Err(Error::InvalidArgumentError(format!(
                    "cannot filter on vector column '{name}'"
                )));
            }
            let field = logical.field_with_name(name).map_err(|_| {
                Error::InvalidArgumentError(format!("filter on unknown column '{name}'"))
            })?;
            if !is_supported_type(field.data_type()) {
                return Err(Error::InvalidArgumentError(format!(
                    "cannot filter on column '{name}' of type {:?}",
                    field.data_type()
                )));
            }
        }

        if options.version.is_some() && !self.schema.has_version_column() {
            return Err(Error::InvalidArgumentError(
                "read version given for an unversioned space".into(),
            ));
        }

        Ok(ScanPlan {
            filters: options.filters.clone(),
            columns,
            output_schema: Arc::new(Schema::new(fields)),
            limit: options.limit,
            version: options.version,
        })
    }

    /// Delete files under the space that the manifest does not reference,
    /// such as files left by a failed write. Returns how many were removed.
    pub fn garbage_collect(&self) -> Result<usize> {
        self.check_open()?;
        let _guard = self.lock_writes()?;
        let manifest = self.manifest_read()?;
        gc::garbage_collect(self.fs.as_ref(), &manifest)
    }

    /// Persist the manifest and close the space. Later calls, including a
    /// second `close`, fail with [`Error::ClosedSpace`].
    pub fn close(&self) -> Result<()> {
        let _guard = self.lock_writes()?;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::ClosedSpace);
        }
        self.manifest_read()?.save(self.fs.as_ref())?;
        tracing::debug!(uri = %self.uri, "closed space");
        Ok(())
    }
}
