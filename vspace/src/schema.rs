//! Derive the scalar, vector, and delete schemas from one logical schema.
//!
//! Field order inside each derived schema is fixed and load-bearing:
//!
//! | Schema | Fields                                                      |
//! |--------|-------------------------------------------------------------|
//! | scalar | primary, [version], plain scalar columns..., `__offset`     |
//! | vector | primary, [version], vector                                  |
//! | delete | primary, [version]                                          |

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;
use vspace_result::{Error, Result, SchemaError};

use crate::options::SchemaOptions;

/// Name of the synthetic column linking a scalar row to its vector row.
pub const OFFSET_COLUMN: &str = "__offset";

/// Check the column roles of `schema`. Rules run in order; the first
/// violation is returned.
pub fn validate(schema: &Schema, options: &SchemaOptions) -> std::result::Result<(), SchemaError> {
    let pk = options.primary_column.as_str();
    if pk.is_empty() {
        return Err(SchemaError::InvalidPrimaryKey(
            "primary column is not set".into(),
        ));
    }
    match schema.field_with_name(pk).map(|f| f.data_type()) {
        Ok(DataType::Int64 | DataType::Utf8) => {}
        Ok(other) => {
            return Err(SchemaError::InvalidPrimaryKey(format!(
                "'{pk}' has type {other:?}, expected Int64 or Utf8"
            )));
        }
        Err(_) => {
            return Err(SchemaError::InvalidPrimaryKey(format!(
                "'{pk}' is not a field of the schema"
            )));
        }
    }

    let version = options.version_column.as_str();
    if !version.is_empty() {
        match schema.field_with_name(version).map(|f| f.data_type()) {
            Ok(DataType::Int64) => {}
            Ok(other) => {
                return Err(SchemaError::InvalidVersionColumn(format!(
                    "'{version}' has type {other:?}, expected Int64"
                )));
            }
            Err(_) => {
                return Err(SchemaError::InvalidVersionColumn(format!(
                    "'{version}' is not a field of the schema"
                )));
            }
        }
    }

    let vector = options.vector_column.as_str();
    if vector.is_empty() {
        return Err(SchemaError::InvalidVectorColumn(
            "vector column is not set".into(),
        ));
    }
    match schema.field_with_name(vector).map(|f| f.data_type()) {
        Ok(DataType::FixedSizeBinary(_)) => {}
        Ok(other) => {
            return Err(SchemaError::InvalidVectorColumn(format!(
                "'{vector}' has type {other:?}, expected FixedSizeBinary"
            )));
        }
        Err(_) => {
            return Err(SchemaError::InvalidVectorColumn(format!(
                "'{vector}' is not a field of the schema"
            )));
        }
    }

    if pk == vector || pk == version {
        return Err(SchemaError::RoleCollision(format!(
            "'{pk}' is used for more than one role"
        )));
    }
    if version == vector {
        return Err(SchemaError::RoleCollision(format!(
            "'{version}' is used for more than one role"
        )));
    }
    let mut seen = FxHashSet::default();
    for field in schema.fields() {
        if field.name() == OFFSET_COLUMN {
            return Err(SchemaError::RoleCollision(format!(
                "'{OFFSET_COLUMN}' is reserved"
            )));
        }
        if !seen.insert(field.name().as_str()) {
            return Err(SchemaError::RoleCollision(format!(
                "'{}' appears more than once",
                field.name()
            )));
        }
    }

    Ok(())
}

/// A validated logical schema together with its derived physical schemas.
///
/// Built once per space; immutable afterwards.
#[derive(Debug, Clone)]
pub struct SpaceSchema {
    schema: SchemaRef,
    options: SchemaOptions,
    scalar_schema: SchemaRef,
    vector_schema: SchemaRef,
    delete_schema: SchemaRef,
}

impl SpaceSchema {
    pub fn try_new(schema: SchemaRef, options: SchemaOptions) -> Result<Self> {
        validate(&schema, &options)?;

        let field = |name: &str| -> Result<FieldRef> {
            schema
                .field_with_name(name)
                .map(|f| Arc::new(f.clone()))
                .map_err(Error::from)
        };

        let mut key_fields = vec![field(&options.primary_column)?];
        if options.has_version_column() {
            key_fields.push(field(&options.version_column)?);
        }

        let mut scalar_fields = key_fields.clone();
        scalar_fields.extend(
            schema
                .fields()
                .iter()
                .filter(|f| !is_role_column(f.name(), &options))
                .cloned(),
        );
        scalar_fields.push(Arc::new(Field::new(OFFSET_COLUMN, DataType::Int64, false)));

        let mut vector_fields = key_fields.clone();
        vector_fields.push(field(&options.vector_column)?);

        Ok(Self {
            scalar_schema: Arc::new(Schema::new(scalar_fields)),
            vector_schema: Arc::new(Schema::new(vector_fields)),
            delete_schema: Arc::new(Schema::new(key_fields)),
            schema,
            options,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    pub fn scalar_schema(&self) -> &SchemaRef {
        &self.scalar_schema
    }

    pub fn vector_schema(&self) -> &SchemaRef {
        &self.vector_schema
    }

    pub fn delete_schema(&self) -> &SchemaRef {
        &self.delete_schema
    }

    pub fn has_version_column(&self) -> bool {
        self.options.has_version_column()
    }

    pub fn primary_column(&self) -> &str {
        &self.options.primary_column
    }

    pub fn version_column(&self) -> Option<&str> {
        self.has_version_column()
            .then_some(self.options.version_column.as_str())
    }

    pub fn vector_column(&self) -> &str {
        &self.options.vector_column
    }

    /// Whether `schema`/`options` describe the same space as `self`.
    ///
    /// Field names, types, nullability, and order must match; field metadata
    /// is not compared.
    pub fn is_same_layout(&self, schema: &Schema, options: &SchemaOptions) -> bool {
        self.options == *options
            && self.schema.fields().len() == schema.fields().len()
            && self
                .schema
                .fields()
                .iter()
                .zip(schema.fields().iter())
                .all(|(a, b)| {
                    a.name() == b.name()
                        && a.data_type() == b.data_type()
                        && a.is_nullable() == b.is_nullable()
                })
    }

    /// Check that an incoming batch carries every logical field with the
    /// declared type. Extra columns are ignored.
    pub fn check_batch_schema(&self, batch_schema: &Schema) -> Result<()> {
        for field in self.schema.fields() {
            let Ok(incoming) = batch_schema.field_with_name(field.name()) else {
                return Err(Error::InvalidArgumentError(format!(
                    "batch is missing column '{}'",
                    field.name()
                )));
            };
            if incoming.data_type() != field.data_type() {
                return Err(Error::InvalidArgumentError(format!(
                    "column '{}' has type {:?}, expected {:?}",
                    field.name(),
                    incoming.data_type(),
                    field.data_type()
                )));
            }
        }
        Ok(())
    }

    /// Split a logical batch into its scalar and vector projections.
    ///
    /// Offsets `first_offset..first_offset + num_rows` are written into the
    /// scalar projection's offset column.
    pub fn split_batch(
        &self,
        batch: &RecordBatch,
        first_offset: i64,
    ) -> Result<(RecordBatch, RecordBatch)> {
        let column = |name: &str| -> Result<ArrayRef> {
            batch.column_by_name(name).cloned().ok_or_else(|| {
                Error::InvalidArgumentError(format!("batch is missing column '{name}'"))
            })
        };

        let num_rows = i64::try_from(batch.num_rows())
            .map_err(|_| Error::InvalidArgumentError("batch too large".into()))?;
        let offsets: ArrayRef = Arc::new(Int64Array::from_iter_values(
            first_offset..first_offset + num_rows,
        ));

        let mut scalar_columns = Vec::with_capacity(self.scalar_schema.fields().len());
        for field in self.scalar_schema.fields() {
            if field.name() == OFFSET_COLUMN {
                scalar_columns.push(Arc::clone(&offsets));
            } else {
                scalar_columns.push(column(field.name())?);
            }
        }

        let vector_columns = self
            .vector_schema
            .fields()
            .iter()
            .map(|f| column(f.name()))
            .collect::<Result<Vec<_>>>()?;

        let scalar = RecordBatch::try_new(Arc::clone(&self.scalar_schema), scalar_columns)?;
        let vector = RecordBatch::try_new(Arc::clone(&self.vector_schema), vector_columns)?;
        Ok((scalar, vector))
    }
}

fn is_role_column(name: &str, options: &SchemaOptions) -> bool {
    name == options.primary_column
        || name == options.vector_column
        || (options.has_version_column() && name == options.version_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{FixedSizeBinaryArray, StringArray};
    use std::collections::HashMap;

    fn field_with_metadata(name: &str, data_type: DataType) -> Field {
        let metadata = HashMap::from([
            ("key1".to_string(), "value1".to_string()),
            ("key2".to_string(), "value2".to_string()),
        ]);
        Field::new(name, data_type, false).with_metadata(metadata)
    }

    fn names(schema: &Schema) -> Vec<&str> {
        schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    #[test]
    fn test_derive_without_version_column() {
        let schema = Arc::new(Schema::new(vec![
            field_with_metadata("pk_field", DataType::Int64),
            field_with_metadata("vec_field", DataType::FixedSizeBinary(10)),
        ]));
        let options = SchemaOptions::new("pk_field", "vec_field");
        let space_schema = SpaceSchema::try_new(schema, options).unwrap();

        assert_eq!(
            names(space_schema.scalar_schema()),
            vec!["pk_field", OFFSET_COLUMN]
        );
        assert_eq!(
            names(space_schema.vector_schema()),
            vec!["pk_field", "vec_field"]
        );
        assert_eq!(names(space_schema.delete_schema()), vec!["pk_field"]);
        assert_eq!(
            space_schema.scalar_schema().field(0).metadata().get("key1"),
            Some(&"value1".to_string())
        );
    }

    #[test]
    fn test_derive_with_version_and_plain_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("note", DataType::Utf8, true),
            Field::new("vec_field", DataType::FixedSizeBinary(10), false),
            Field::new("ts_field", DataType::Int64, false),
            Field::new("pk_field", DataType::Int64, false),
            Field::new("score", DataType::Float64, true),
        ]));
        let options = SchemaOptions::new("pk_field", "vec_field").with_version_column("ts_field");
        let space_schema = SpaceSchema::try_new(Arc::clone(&schema), options.clone()).unwrap();
        let again = SpaceSchema::try_new(schema, options).unwrap();
        assert_eq!(space_schema.scalar_schema(), again.scalar_schema());
        assert_eq!(space_schema.vector_schema(), again.vector_schema());
        assert_eq!(space_schema.delete_schema(), again.delete_schema());

        assert_eq!(
            names(space_schema.scalar_schema()),
            vec!["pk_field", "ts_field", "note", "score", OFFSET_COLUMN]
        );
        assert!(!space_schema.scalar_schema().field(4).is_nullable());
        assert_eq!(
            names(space_schema.vector_schema()),
            vec!["pk_field", "ts_field", "vec_field"]
        );
        assert_eq!(
            names(space_schema.delete_schema()),
            vec!["pk_field", "ts_field"]
        );
    }

    #[test]
    fn test_validation_order_and_rules() {
        let schema = Schema::new(vec![
            Field::new("pk", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("ts", DataType::Int64, false),
            Field::new("score", DataType::Float64, false),
            Field::new("vec", DataType::FixedSizeBinary(4), false),
        ]);

        let missing_pk = SchemaOptions::new("", "vec");
        assert!(matches!(
            validate(&schema, &missing_pk),
            Err(SchemaError::InvalidPrimaryKey(_))
        ));

        let float_pk = SchemaOptions::new("score", "vec");
        assert!(matches!(
            validate(&schema, &float_pk),
            Err(SchemaError::InvalidPrimaryKey(_))
        ));

        let string_pk = SchemaOptions::new("name", "vec");
        assert!(validate(&schema, &string_pk).is_ok());

        let bad_version = SchemaOptions::new("pk", "vec").with_version_column("score");
        assert!(matches!(
            validate(&schema, &bad_version),
            Err(SchemaError::InvalidVersionColumn(_))
        ));

        let bad_vector = SchemaOptions::new("pk", "name");
        assert!(matches!(
            validate(&schema, &bad_vector),
            Err(SchemaError::InvalidVectorColumn(_))
        ));

        // Both the primary key and the vector are wrong; the primary key rule
        // runs first.
        let both_bad = SchemaOptions::new("score", "name");
        assert!(matches!(
            validate(&schema, &both_bad),
            Err(SchemaError::InvalidPrimaryKey(_))
        ));

        let shared = SchemaOptions::new("pk", "vec").with_version_column("pk");
        assert!(matches!(
            validate(&schema, &shared),
            Err(SchemaError::RoleCollision(_))
        ));
    }

    #[test]
    fn test_reserved_offset_name_is_rejected() {
        let schema = Schema::new(vec![
            Field::new("pk", DataType::Int64, false),
            Field::new(OFFSET_COLUMN, DataType::Int64, false),
            Field::new("vec", DataType::FixedSizeBinary(4), false),
        ]);
        assert!(matches!(
            validate(&schema, &SchemaOptions::new("pk", "vec")),
            Err(SchemaError::RoleCollision(_))
        ));
    }

    #[test]
    fn test_split_batch_assigns_offsets() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("pk", DataType::Utf8, false),
            Field::new("vec", DataType::FixedSizeBinary(2), false),
        ]));
        let space_schema =
            SpaceSchema::try_new(Arc::clone(&schema), SchemaOptions::new("pk", "vec")).unwrap();

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
                Arc::new(
                    FixedSizeBinaryArray::try_from_iter(
                        vec![b"aa".to_vec(), b"bb".to_vec(), b"cc".to_vec()].into_iter(),
                    )
                    .unwrap(),
                ),
            ],
        )
        .unwrap();

        let (scalar, vector) = space_schema.split_batch(&batch, 7).unwrap();
        assert_eq!(scalar.schema(), *space_schema.scalar_schema());
        assert_eq!(vector.schema(), *space_schema.vector_schema());

        let offsets = scalar
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(offsets.values().to_vec(), vec![7, 8, 9]);
    }
}
