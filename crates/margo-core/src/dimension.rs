//! Single-file dimension tables: union with existing rows, full-row dedupe
//!
//! Dimensions are not partitioned. A refresh rewrites the whole file as
//! `existing ∪ new` with exact-duplicate rows dropped, so the file grows
//! monotonically and repeated refreshes are idempotent. Deduplication is by
//! full row equality, not by business key.

use std::collections::HashSet;
use std::hash::Hash;
use std::io;
use std::path::Path;

use arrow::array::RecordBatch;
use arrow::error::ArrowError;

use crate::sink;

/// Merge `new_rows` into the dimension file at `path`.
///
/// `decode` turns a stored batch back into rows; `encode` builds the batch
/// to persist. Returns the merged row count. The write is atomic; a
/// concurrent refresh of the same dimension is last-writer-wins.
pub fn merge_dimension<T, D, E>(
    path: &Path,
    new_rows: Vec<T>,
    decode: D,
    encode: E,
) -> io::Result<usize>
where
    T: Eq + Hash + Clone,
    D: Fn(&RecordBatch) -> io::Result<Vec<T>>,
    E: Fn(&[T]) -> Result<RecordBatch, ArrowError>,
{
    let mut merged: Vec<T> = Vec::new();
    if path.exists() {
        for batch in sink::read_batches(path)? {
            merged.extend(decode(&batch)?);
        }
    }
    merged.extend(new_rows);

    let mut seen: HashSet<T> = HashSet::with_capacity(merged.len());
    let mut deduped = Vec::with_capacity(merged.len());
    for row in merged {
        if seen.insert(row.clone()) {
            deduped.push(row);
        }
    }

    let batch = encode(&deduped).map_err(io::Error::other)?;
    sink::write_batch(&batch, path)?;
    Ok(deduped.len())
}

/// Replace the dimension file outright (force refresh).
pub fn replace_dimension<T, E>(path: &Path, rows: &[T], encode: E) -> io::Result<usize>
where
    E: Fn(&[T]) -> Result<RecordBatch, ArrowError>,
{
    let batch = encode(rows).map_err(io::Error::other)?;
    sink::write_batch(&batch, path)?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::column::{i64_col, opt_str, str_col};

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Row {
        id: i64,
        name: Option<String>,
    }

    fn encode(rows: &[Row]) -> Result<RecordBatch, ArrowError> {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(rows.iter().map(|r| r.id).collect::<Vec<_>>())),
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
                )),
            ],
        )
    }

    fn decode(batch: &RecordBatch) -> io::Result<Vec<Row>> {
        let ids = i64_col(batch, "id")?;
        let names = str_col(batch, "name")?;
        Ok((0..batch.num_rows())
            .map(|i| Row {
                id: ids.value(i),
                name: opt_str(names, i),
            })
            .collect())
    }

    fn row(id: i64, name: &str) -> Row {
        Row {
            id,
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn first_merge_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dim_products.parquet");
        let n = merge_dimension(&path, vec![row(1, "a"), row(2, "b")], decode, encode).unwrap();
        assert_eq!(n, 2);
        assert!(path.exists());
    }

    #[test]
    fn merge_is_union_with_dedupe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dim.parquet");
        merge_dimension(&path, vec![row(1, "a"), row(2, "b")], decode, encode).unwrap();
        let n = merge_dimension(&path, vec![row(2, "b"), row(3, "c")], decode, encode).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn remerge_same_rows_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dim.parquet");
        merge_dimension(&path, vec![row(1, "a")], decode, encode).unwrap();
        let n = merge_dimension(&path, vec![row(1, "a")], decode, encode).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn changed_attribute_keeps_both_rows() {
        // Full-row dedupe: a renamed entity persists under both names
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dim.parquet");
        merge_dimension(&path, vec![row(1, "old")], decode, encode).unwrap();
        let n = merge_dimension(&path, vec![row(1, "new")], decode, encode).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn replace_discards_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dim.parquet");
        merge_dimension(&path, vec![row(1, "a"), row(2, "b")], decode, encode).unwrap();
        let n = replace_dimension(&path, &[row(9, "z")], encode).unwrap();
        assert_eq!(n, 1);
        let rows = decode(&sink::read_batches(&path).unwrap()[0]).unwrap();
        assert_eq!(rows, vec![row(9, "z")]);
    }
}
