//! Shared fixtures for space integration tests.
//!
//! Tables used here carry a vector derived from the primary key, so any
//! mis-joined offset shows up as a vector/key mismatch.

#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, FixedSizeBinaryArray, Float64Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use vspace::{FileSystem, MemFileSystem, Options, SchemaOptions, Space, SpaceScan};

pub const VECTOR_WIDTH: i32 = 10;

/// `pk: Int64, ts: Int64 (version), vec: FixedSizeBinary(10), score: Float64?`
pub fn versioned_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("pk", DataType::Int64, false),
        Field::new("ts", DataType::Int64, false),
        Field::new("vec", DataType::FixedSizeBinary(VECTOR_WIDTH), false),
        Field::new("score", DataType::Float64, true),
    ]))
}

pub fn versioned_options() -> Options {
    Options::new(
        versioned_schema(),
        SchemaOptions::new("pk", "vec").with_version_column("ts"),
    )
}

/// `label: Utf8, pk: Utf8, vec: FixedSizeBinary(10)`
pub fn unversioned_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("label", DataType::Utf8, true),
        Field::new("pk", DataType::Utf8, false),
        Field::new("vec", DataType::FixedSizeBinary(VECTOR_WIDTH), false),
    ]))
}

pub fn unversioned_options() -> Options {
    Options::new(unversioned_schema(), SchemaOptions::new("pk", "vec"))
}

/// Ten ASCII digits identifying `pk` and `ts`.
pub fn vector_for(pk: i64, ts: i64) -> Vec<u8> {
    format!("{:07}{:03}", pk, ts).into_bytes()
}

fn vectors(values: impl Iterator<Item = Vec<u8>>) -> ArrayRef {
    Arc::new(FixedSizeBinaryArray::try_from_iter(values).expect("vector array"))
}

/// Rows `(pk, ts)` with `vec = vector_for(pk, ts)` and `score = pk`.
pub fn versioned_batch(rows: &[(i64, i64)]) -> RecordBatch {
    RecordBatch::try_new(
        versioned_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
            vectors(rows.iter().map(|&(pk, ts)| vector_for(pk, ts))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.0 as f64))),
        ],
    )
    .expect("versioned batch")
}

/// Rows keyed by `pk` with `vec = vector_for(index, 0)`.
pub fn unversioned_batch(keys: &[&str]) -> RecordBatch {
    RecordBatch::try_new(
        unversioned_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(
                keys.iter().map(|k| format!("label-{k}")),
            )),
            Arc::new(StringArray::from_iter_values(keys.iter().copied())),
            vectors(keys.iter().map(|k| key_vector(k))),
        ],
    )
    .expect("unversioned batch")
}

pub fn key_vector(key: &str) -> Vec<u8> {
    format!("{key:>10}").into_bytes()
}

/// Open a fresh space over a shared in-memory file system.
pub fn mem_space(options: Options) -> (MemFileSystem, Space) {
    let fs = MemFileSystem::new();
    let space = reopen(&fs, options).expect("open space");
    (fs, space)
}

pub fn reopen(fs: &MemFileSystem, options: Options) -> vspace::Result<Space> {
    let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
    Space::open_with_file_system(shared, "memory://test", options)
}

pub fn collect(scan: SpaceScan) -> Vec<RecordBatch> {
    scan.collect::<vspace::Result<Vec<_>>>().expect("scan")
}

pub fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}

pub fn int64_column(batches: &[RecordBatch], name: &str) -> Vec<i64> {
    batches
        .iter()
        .flat_map(|b| {
            b.column_by_name(name)
                .expect("column")
                .as_primitive::<Int64Type>()
                .values()
                .to_vec()
        })
        .collect()
}

pub fn float64_column(batches: &[RecordBatch], name: &str) -> Vec<Option<f64>> {
    batches
        .iter()
        .flat_map(|b| {
            let array = b.column_by_name(name).expect("column").as_primitive::<Float64Type>();
            (0..array.len())
                .map(|i| array.is_valid(i).then(|| array.value(i)))
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn string_column(batches: &[RecordBatch], name: &str) -> Vec<String> {
    batches
        .iter()
        .flat_map(|b| {
            let array = b.column_by_name(name).expect("column").as_string::<i32>();
            (0..array.len())
                .map(|i| array.value(i).to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn vector_column(batches: &[RecordBatch], name: &str) -> Vec<Vec<u8>> {
    batches
        .iter()
        .flat_map(|b| {
            let array = b.column_by_name(name).expect("column").as_fixed_size_binary();
            (0..array.len())
                .map(|i| array.value(i).to_vec())
                .collect::<Vec<_>>()
        })
        .collect()
}
