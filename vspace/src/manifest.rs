//! Persistent manifest: the space's configuration plus its sealed file lists.
//!
//! Encoded with bitcode. The Arrow schema is kept as IPC bytes because Arrow
//! types do not implement bitcode's traits.

use crate::options::{SchemaOptions, SpaceOptions};
use crate::statistics::FileStatistics;
use crate::types::{ColumnGroup, FileId};
use arrow::datatypes::SchemaRef;
use std::io::Write;
use vspace_result::{Error, Result};
use vspace_storage::FileSystem;

/// Path of the manifest relative to the space root.
pub const MANIFEST_PATH: &str = "_manifest";
/// Staging path for [`Manifest::save`].
pub const MANIFEST_TMP_PATH: &str = "_manifest.tmp";

/// Bumped whenever the encoded layout of [`Manifest`] changes.
const FORMAT_VERSION: u32 = 1;

/// A sealed column file.
#[derive(Debug, Clone, PartialEq, bitcode::Encode, bitcode::Decode)]
pub struct DataFile {
    pub file_id: FileId,
    /// Path relative to the space root.
    pub path: String,
    pub row_count: u64,
    pub size_bytes: u64,
    /// For scalar files: the vector file whose rows the offsets address.
    pub linked_vector_file: Option<FileId>,
    pub stats: FileStatistics,
}

/// Sealed files of every group at one manifest version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub version: u64,
    pub scalar_files: Vec<DataFile>,
    pub vector_files: Vec<DataFile>,
    pub delete_files: Vec<DataFile>,
}

impl Layout {
    pub fn files(&self, group: ColumnGroup) -> &[DataFile] {
        match group {
            ColumnGroup::Scalar => &self.scalar_files,
            ColumnGroup::Vector => &self.vector_files,
            ColumnGroup::Delete => &self.delete_files,
        }
    }

    pub fn vector_file(&self, id: FileId) -> Option<&DataFile> {
        self.vector_files
            .binary_search_by_key(&id, |f| f.file_id)
            .ok()
            .map(|idx| &self.vector_files[idx])
    }

    /// Rows written across all scalar files, deleted or not.
    pub fn total_rows(&self) -> u64 {
        self.scalar_files.iter().map(|f| f.row_count).sum()
    }
}

#[derive(bitcode::Encode, bitcode::Decode)]
struct ManifestRecord {
    format_version: u32,
    version: u64,
    space_options: SpaceOptions,
    schema_bytes: Vec<u8>,
    schema_options: SchemaOptions,
    next_file_id: u64,
    scalar_files: Vec<DataFile>,
    vector_files: Vec<DataFile>,
    delete_files: Vec<DataFile>,
}

/// In-memory manifest. Only the owning space mutates it.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub space_options: SpaceOptions,
    pub schema: SchemaRef,
    pub schema_options: SchemaOptions,
    next_file_id: u64,
    layout: Layout,
}

impl Manifest {
    pub fn new(space_options: SpaceOptions, schema: SchemaRef, schema_options: SchemaOptions) -> Self {
        Self {
            space_options,
            schema,
            schema_options,
            next_file_id: 1,
            layout: Layout::default(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn version(&self) -> u64 {
        self.layout.version
    }

    /// Reserve the next file id. Ids are never reused.
    pub fn allocate_file_id(&mut self) -> FileId {
        let id = FileId(self.next_file_id);
        self.next_file_id += 1;
        id
    }

    /// Record a sealed file and bump the manifest version.
    pub fn add_file(&mut self, group: ColumnGroup, file: DataFile) {
        let files = match group {
            ColumnGroup::Scalar => &mut self.layout.scalar_files,
            ColumnGroup::Vector => &mut self.layout.vector_files,
            ColumnGroup::Delete => &mut self.layout.delete_files,
        };
        files.push(file);
        self.layout.version += 1;
    }

    /// Every path the manifest references, including itself.
    pub fn referenced_paths(&self) -> impl Iterator<Item = &str> {
        ColumnGroup::ALL
            .into_iter()
            .flat_map(|g| self.layout.files(g).iter().map(|f| f.path.as_str()))
            .chain(std::iter::once(MANIFEST_PATH))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = ManifestRecord {
            format_version: FORMAT_VERSION,
            version: self.layout.version,
            space_options: self.space_options.clone(),
            schema_bytes: schema_to_ipc(&self.schema)?,
            schema_options: self.schema_options.clone(),
            next_file_id: self.next_file_id,
            scalar_files: self.layout.scalar_files.clone(),
            vector_files: self.layout.vector_files.clone(),
            delete_files: self.layout.delete_files.clone(),
        };
        Ok(bitcode::encode(&record))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: ManifestRecord = bitcode::decode(bytes)
            .map_err(|e| Error::Manifest(format!("bitcode decode failed: {e}")))?;
        if record.format_version != FORMAT_VERSION {
            return Err(Error::Manifest(format!(
                "unsupported manifest format {}",
                record.format_version
            )));
        }

        let manifest = Self {
            space_options: record.space_options,
            schema: schema_from_ipc(&record.schema_bytes)?,
            schema_options: record.schema_options,
            next_file_id: record.next_file_id,
            layout: Layout {
                version: record.version,
                scalar_files: record.scalar_files,
                vector_files: record.vector_files,
                delete_files: record.delete_files,
            },
        };
        manifest.check_consistency()?;
        Ok(manifest)
    }

    fn check_consistency(&self) -> Result<()> {
        for group in ColumnGroup::ALL {
            let files = self.layout.files(group);
            if files.windows(2).any(|w| w[0].file_id >= w[1].file_id) {
                return Err(Error::manifest(format!(
                    "{} files are not in commit order",
                    group.dir()
                )));
            }
            if let Some(last) = files.last()
                && last.file_id.0 >= self.next_file_id
            {
                return Err(Error::manifest(format!(
                    "file id {} is not below the next id {}",
                    last.file_id.0, self.next_file_id
                )));
            }
        }
        for scalar in &self.layout.scalar_files {
            let Some(linked) = scalar.linked_vector_file else {
                return Err(Error::manifest(format!(
                    "scalar file {} has no vector file",
                    scalar.path
                )));
            };
            match self.layout.vector_file(linked) {
                Some(vector) if vector.row_count == scalar.row_count => {}
                _ => {
                    return Err(Error::manifest(format!(
                        "scalar file {} does not match vector file {}",
                        scalar.path, linked.0
                    )));
                }
            }
        }
        Ok(())
    }

    /// Read the manifest, or `None` when the space has none yet.
    pub fn load(fs: &dyn FileSystem) -> Result<Option<Self>> {
        if !fs.exists(MANIFEST_PATH)? {
            return Ok(None);
        }
        let bytes = fs.open_input_file(MANIFEST_PATH)?;
        Self::from_bytes(&bytes).map(Some)
    }

    /// Write the manifest to a temporary file, then rename it into place.
    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut out = fs.open_output_file(MANIFEST_TMP_PATH)?;
        out.write_all(&bytes)?;
        out.finish()?;
        fs.rename(MANIFEST_TMP_PATH, MANIFEST_PATH)?;
        tracing::debug!(
            version = self.layout.version,
            bytes = bytes.len(),
            "saved manifest"
        );
        Ok(())
    }
}

fn schema_to_ipc(schema: &SchemaRef) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = arrow::ipc::writer::FileWriter::try_new(&mut buffer, schema.as_ref())
        .map_err(|e| Error::Manifest(format!("failed to create IPC writer: {e}")))?;
    writer
        .finish()
        .map_err(|e| Error::Manifest(format!("failed to finish IPC writer: {e}")))?;
    drop(writer);
    Ok(buffer)
}

fn schema_from_ipc(bytes: &[u8]) -> Result<SchemaRef> {
    let reader = arrow::ipc::reader::FileReader::try_new(std::io::Cursor::new(bytes), None)
        .map_err(|e| Error::Manifest(format!("failed to read IPC schema: {e}")))?;
    Ok(reader.schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::collections::HashMap;
    use std::sync::Arc;
    use vspace_filter::ScalarValue;
    use vspace_storage::MemFileSystem;

    fn manifest() -> Manifest {
        let schema = Arc::new(Schema::new(vec![
            Field::new("pk", DataType::Int64, false)
                .with_metadata(HashMap::from([("k".to_string(), "v".to_string())])),
            Field::new("vec", DataType::FixedSizeBinary(8), false),
        ]));
        Manifest::new(
            SpaceOptions {
                uri: "memory://".into(),
            },
            schema,
            SchemaOptions::new("pk", "vec"),
        )
    }

    fn data_file(group: ColumnGroup, id: FileId, rows: u64, linked: Option<FileId>) -> DataFile {
        DataFile {
            file_id: id,
            path: group.file_path(id),
            row_count: rows,
            size_bytes: 100,
            linked_vector_file: linked,
            stats: FileStatistics::default(),
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let mut manifest = manifest();
        let vector_id = manifest.allocate_file_id();
        let scalar_id = manifest.allocate_file_id();
        manifest.add_file(ColumnGroup::Vector, data_file(ColumnGroup::Vector, vector_id, 5, None));
        let mut scalar = data_file(ColumnGroup::Scalar, scalar_id, 5, Some(vector_id));
        scalar.stats.columns.push(crate::statistics::ColumnStatistics {
            name: "pk".into(),
            min: Some(ScalarValue::Int64(1)),
            max: Some(ScalarValue::Int64(5)),
        });
        manifest.add_file(ColumnGroup::Scalar, scalar);

        let restored = Manifest::from_bytes(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.layout(), manifest.layout());
        assert_eq!(restored.version(), 2);
        assert_eq!(restored.schema, manifest.schema);
        assert_eq!(restored.schema.field(0).metadata().get("k"), Some(&"v".to_string()));
        assert_eq!(restored.schema_options, manifest.schema_options);

        let mut restored = restored;
        assert_eq!(restored.allocate_file_id(), FileId(3));
    }

    #[test]
    fn test_save_and_load() {
        let fs = MemFileSystem::new();
        assert!(Manifest::load(&fs).unwrap().is_none());

        let manifest = manifest();
        manifest.save(&fs).unwrap();
        assert!(!fs.exists(MANIFEST_TMP_PATH).unwrap());

        let loaded = Manifest::load(&fs).unwrap().unwrap();
        assert_eq!(loaded.space_options.uri, "memory://");
    }

    #[test]
    fn test_inconsistent_manifest_is_rejected() {
        let mut manifest = manifest();
        let vector_id = manifest.allocate_file_id();
        let scalar_id = manifest.allocate_file_id();
        manifest.add_file(ColumnGroup::Vector, data_file(ColumnGroup::Vector, vector_id, 5, None));
        manifest.add_file(
            ColumnGroup::Scalar,
            data_file(ColumnGroup::Scalar, scalar_id, 4, Some(vector_id)),
        );
        let err = Manifest::from_bytes(&manifest.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));

        assert!(matches!(
            Manifest::from_bytes(b"garbage"),
            Err(Error::Manifest(_))
        ));
    }
}
