//! Chunk selection from Parquet summary statistics.
//!
//! Parquet records min/max per column chunk. Those bounds are decoded into
//! [`ScalarValue`]s using the Arrow field type, then handed to each filter's
//! conservative skip check. Anything that cannot be decoded is treated as
//! "no statistics", which never skips.

use arrow::datatypes::{DataType, Schema};
use parquet::file::metadata::{ParquetMetaData, RowGroupMetaData};
use parquet::file::statistics::Statistics;
use parquet::schema::types::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use vspace_filter::{Filter, ScalarValue, StatisticsFilter};
use vspace_result::{Error, Result};

/// Row groups and root columns a scan should decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSelection {
    /// Row groups in physical order.
    pub chunk_indices: Vec<usize>,
    /// Arrow root column indices, ascending.
    pub column_indices: Vec<usize>,
}

/// Select the row groups of a file that may hold rows matching every filter,
/// and the columns needed to answer the request.
///
/// `column_indices` is the union of `requested_columns` and the columns the
/// filters reference.
pub fn select_chunks(
    metadata: &ParquetMetaData,
    arrow_schema: &Schema,
    filters: &[Filter],
    requested_columns: &[&str],
) -> Result<ChunkSelection> {
    let mut column_indices = Vec::with_capacity(requested_columns.len() + filters.len());
    for name in requested_columns {
        let idx = arrow_schema
            .index_of(name)
            .map_err(|_| Error::Projection(format!("column '{name}' is not in the file")))?;
        column_indices.push(idx);
    }

    let mut filter_columns = Vec::with_capacity(filters.len());
    for filter in filters {
        let idx = arrow_schema.index_of(filter.column_name()).map_err(|_| {
            Error::InvalidArgumentError(format!(
                "filter column '{}' is not in the file",
                filter.column_name()
            ))
        })?;
        column_indices.push(idx);
        filter_columns.push(idx);
    }
    column_indices.sort_unstable();
    column_indices.dedup();

    let leaves = leaf_for_root(metadata.file_metadata().schema_descr(), arrow_schema);

    let mut chunk_indices = Vec::with_capacity(metadata.num_row_groups());
    for (rg_idx, row_group) in metadata.row_groups().iter().enumerate() {
        let skip = filters.iter().zip(&filter_columns).any(|(filter, &root)| {
            let Some(leaf) = leaves[root] else {
                return false;
            };
            let data_type = arrow_schema.field(root).data_type();
            match row_group.column(leaf).statistics().and_then(|s| decode_min_max(s, data_type)) {
                Some((min, max)) => filter.check_statistics(Some(&min), Some(&max)),
                None => false,
            }
        });
        if skip {
            tracing::trace!(row_group = rg_idx, "row group pruned by statistics");
        } else {
            chunk_indices.push(rg_idx);
        }
    }

    Ok(ChunkSelection {
        chunk_indices,
        column_indices,
    })
}

/// Map each Arrow root column to its Parquet leaf column, when the root is a
/// single leaf. Nested roots get `None` and are never used for pruning.
fn leaf_for_root(descr: &SchemaDescriptor, arrow_schema: &Schema) -> Vec<Option<usize>> {
    let num_roots = arrow_schema.fields().len();
    let mut first_leaf = vec![None; num_roots];
    let mut leaf_count = vec![0usize; num_roots];
    for leaf in 0..descr.num_columns() {
        let root = descr.get_column_root_idx(leaf);
        if root < num_roots {
            leaf_count[root] += 1;
            first_leaf[root].get_or_insert(leaf);
        }
    }
    first_leaf
        .into_iter()
        .zip(leaf_count)
        .map(|(leaf, count)| if count == 1 { leaf } else { None })
        .collect()
}

/// Decode Parquet min/max statistics into scalar values for `data_type`.
///
/// Unsigned Arrow types are stored in signed physical columns with unsigned
/// sort order, so their bits are reinterpreted.
pub fn decode_min_max(
    stats: &Statistics,
    data_type: &DataType,
) -> Option<(ScalarValue, ScalarValue)> {
    let pair = match (stats, data_type) {
        (Statistics::Boolean(s), DataType::Boolean) => (
            ScalarValue::Boolean(*s.min_opt()?),
            ScalarValue::Boolean(*s.max_opt()?),
        ),
        (Statistics::Int32(s), DataType::Int8 | DataType::Int16 | DataType::Int32) => (
            ScalarValue::Int64(i64::from(*s.min_opt()?)),
            ScalarValue::Int64(i64::from(*s.max_opt()?)),
        ),
        (Statistics::Int32(s), DataType::UInt8 | DataType::UInt16 | DataType::UInt32) => (
            ScalarValue::UInt64(u64::from(*s.min_opt()? as u32)),
            ScalarValue::UInt64(u64::from(*s.max_opt()? as u32)),
        ),
        (Statistics::Int64(s), DataType::Int64) => (
            ScalarValue::Int64(*s.min_opt()?),
            ScalarValue::Int64(*s.max_opt()?),
        ),
        (Statistics::Int64(s), DataType::UInt64) => (
            ScalarValue::UInt64(*s.min_opt()? as u64),
            ScalarValue::UInt64(*s.max_opt()? as u64),
        ),
        (Statistics::Float(s), DataType::Float32) => (
            ScalarValue::Float64(f64::from(*s.min_opt()?)),
            ScalarValue::Float64(f64::from(*s.max_opt()?)),
        ),
        (Statistics::Double(s), DataType::Float64) => (
            ScalarValue::Float64(*s.min_opt()?),
            ScalarValue::Float64(*s.max_opt()?),
        ),
        (Statistics::ByteArray(s), DataType::Utf8 | DataType::LargeUtf8) => (
            ScalarValue::Utf8(std::str::from_utf8(s.min_opt()?.data()).ok()?.to_owned()),
            ScalarValue::Utf8(std::str::from_utf8(s.max_opt()?.data()).ok()?.to_owned()),
        ),
        (Statistics::ByteArray(s), DataType::Binary | DataType::LargeBinary) => (
            ScalarValue::Binary(s.min_opt()?.data().to_vec()),
            ScalarValue::Binary(s.max_opt()?.data().to_vec()),
        ),
        (Statistics::FixedLenByteArray(s), DataType::FixedSizeBinary(_)) => (
            ScalarValue::Binary(s.min_opt()?.data().to_vec()),
            ScalarValue::Binary(s.max_opt()?.data().to_vec()),
        ),
        _ => return None,
    };
    Some(pair)
}

/// Whole-file min/max for one column.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct ColumnStatistics {
    pub name: String,
    pub min: Option<ScalarValue>,
    pub max: Option<ScalarValue>,
}

/// Per-file statistics kept in the manifest so a scan can skip a file
/// without opening it.
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct FileStatistics {
    pub columns: Vec<ColumnStatistics>,
}

impl FileStatistics {
    /// Fold row-group statistics into whole-file bounds. A column loses its
    /// bounds if any row group lacks decodable statistics for it.
    pub fn from_row_groups<'a, I>(arrow_schema: &Schema, row_groups: I) -> Self
    where
        I: IntoIterator<Item = &'a RowGroupMetaData>,
    {
        let mut bounds: Vec<Option<(ScalarValue, ScalarValue)>> = Vec::new();
        let mut leaves = Vec::new();
        let mut seen_any = false;

        for row_group in row_groups {
            if !seen_any {
                leaves = leaf_for_root(row_group.schema_descr(), arrow_schema);
                bounds = leaves
                    .iter()
                    .enumerate()
                    .map(|(root, leaf)| {
                        let leaf = (*leaf)?;
                        let stats = row_group.column(leaf).statistics()?;
                        decode_min_max(stats, arrow_schema.field(root).data_type())
                    })
                    .collect();
                seen_any = true;
                continue;
            }

            for (root, slot) in bounds.iter_mut().enumerate() {
                let Some((min, max)) = slot.as_mut() else {
                    continue;
                };
                let next = leaves[root].and_then(|leaf| {
                    let stats = row_group.column(leaf).statistics()?;
                    decode_min_max(stats, arrow_schema.field(root).data_type())
                });
                let merged = next.and_then(|(next_min, next_max)| {
                    if next_min.compare(min)? == Ordering::Less {
                        *min = next_min;
                    }
                    if next_max.compare(max)? == Ordering::Greater {
                        *max = next_max;
                    }
                    Some(())
                });
                if merged.is_none() {
                    *slot = None;
                }
            }
        }

        let columns = arrow_schema
            .fields()
            .iter()
            .zip(bounds.into_iter().chain(std::iter::repeat(None)))
            .map(|(field, bound)| {
                let (min, max) = match bound {
                    Some((min, max)) => (Some(min), Some(max)),
                    None => (None, None),
                };
                ColumnStatistics {
                    name: field.name().clone(),
                    min,
                    max,
                }
            })
            .collect();

        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStatistics> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether some filter proves no row of the file can match.
    pub fn can_skip(&self, filters: &[Filter]) -> bool {
        filters.iter().any(|filter| {
            self.column(filter.column_name())
                .is_some_and(|c| filter.check_statistics(c.min.as_ref(), c.max.as_ref()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray, UInt32Array};
    use arrow::datatypes::Field;
    use arrow::record_batch::RecordBatch;
    use bytes::Bytes;
    use parquet::arrow::ArrowWriter;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use parquet::file::properties::WriterProperties;
    use std::sync::Arc;

    /// Four row groups of 25 rows: id 0..100, tag "g0".."g3", unsigned 4e9+id.
    fn sample_file() -> (Bytes, Arc<Schema>) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("tag", DataType::Utf8, false),
            Field::new("big", DataType::UInt32, false),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from_iter_values(0..100)),
                Arc::new(StringArray::from_iter_values(
                    (0..100).map(|i| format!("g{}", i / 25)),
                )),
                Arc::new(UInt32Array::from_iter_values(
                    (0..100u32).map(|i| 4_000_000_000 + i),
                )),
            ],
        )
        .unwrap();

        let props = WriterProperties::builder()
            .set_max_row_group_size(25)
            .build();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, Arc::clone(&schema), Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        (Bytes::from(buffer), schema)
    }

    fn metadata(bytes: Bytes) -> Arc<ParquetMetaData> {
        ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .metadata()
            .clone()
    }

    #[test]
    fn test_select_chunks_prunes_row_groups() {
        let (bytes, schema) = sample_file();
        let metadata = metadata(bytes);
        assert_eq!(metadata.num_row_groups(), 4);

        let selection =
            select_chunks(&metadata, &schema, &[Filter::ge("id", 60i64)], &["tag"]).unwrap();
        assert_eq!(selection.chunk_indices, vec![2, 3]);
        assert_eq!(selection.column_indices, vec![0, 1]);

        let selection =
            select_chunks(&metadata, &schema, &[Filter::eq("tag", "g1")], &["id"]).unwrap();
        assert_eq!(selection.chunk_indices, vec![1]);

        let selection = select_chunks(&metadata, &schema, &[], &["id"]).unwrap();
        assert_eq!(selection.chunk_indices, vec![0, 1, 2, 3]);
        assert_eq!(selection.column_indices, vec![0]);
    }

    #[test]
    fn test_unsigned_statistics_are_reinterpreted() {
        let (bytes, schema) = sample_file();
        let metadata = metadata(bytes);

        // 4e9 overflows i32; a signed reading would put every group below 0.
        let selection = select_chunks(
            &metadata,
            &schema,
            &[Filter::lt("big", 4_000_000_010u64)],
            &["id"],
        )
        .unwrap();
        assert_eq!(selection.chunk_indices, vec![0]);
    }

    #[test]
    fn test_unknown_filter_column_is_rejected() {
        let (bytes, schema) = sample_file();
        let metadata = metadata(bytes);
        let err = select_chunks(&metadata, &schema, &[Filter::eq("nope", 1i64)], &["id"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgumentError(_)));
    }

    #[test]
    fn test_file_statistics_span_all_row_groups() {
        let (bytes, schema) = sample_file();
        let metadata = metadata(bytes);
        let stats = FileStatistics::from_row_groups(&schema, metadata.row_groups());

        let id = stats.column("id").unwrap();
        assert_eq!(id.min, Some(ScalarValue::Int64(0)));
        assert_eq!(id.max, Some(ScalarValue::Int64(99)));
        let tag = stats.column("tag").unwrap();
        assert_eq!(tag.min, Some(ScalarValue::Utf8("g0".into())));
        assert_eq!(tag.max, Some(ScalarValue::Utf8("g3".into())));

        assert!(stats.can_skip(&[Filter::gt("id", 99i64)]));
        assert!(!stats.can_skip(&[Filter::gt("id", 98i64)]));
        assert!(!stats.can_skip(&[Filter::eq("missing", 1i64)]));
    }

    #[test]
    fn test_file_statistics_without_row_groups_have_no_bounds() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let stats = FileStatistics::from_row_groups(&schema, std::iter::empty());
        assert_eq!(stats.columns.len(), 1);
        assert!(stats.columns[0].min.is_none());
        assert!(!stats.can_skip(&[Filter::eq("id", 1i64)]));
    }
}
