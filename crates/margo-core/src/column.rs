//! Typed column access for record batches read back from the lake

use std::io;

use arrow::array::{
    Array, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray,
};
use chrono::NaiveDate;

fn downcast<'a, T: 'static>(batch: &'a RecordBatch, name: &str, type_name: &str) -> io::Result<&'a T> {
    let col = batch.column_by_name(name).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, format!("missing column: {name}"))
    })?;
    col.as_any().downcast_ref::<T>().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("column {name} is not {type_name}"),
        )
    })
}

pub fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> io::Result<&'a StringArray> {
    downcast(batch, name, "Utf8")
}

pub fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> io::Result<&'a Int64Array> {
    downcast(batch, name, "Int64")
}

pub fn f64_col<'a>(batch: &'a RecordBatch, name: &str) -> io::Result<&'a Float64Array> {
    downcast(batch, name, "Float64")
}

pub fn bool_col<'a>(batch: &'a RecordBatch, name: &str) -> io::Result<&'a BooleanArray> {
    downcast(batch, name, "Boolean")
}

pub fn date_col<'a>(batch: &'a RecordBatch, name: &str) -> io::Result<&'a Date32Array> {
    downcast(batch, name, "Date32")
}

pub fn opt_i64(arr: &Int64Array, row: usize) -> Option<i64> {
    arr.is_valid(row).then(|| arr.value(row))
}

pub fn opt_f64(arr: &Float64Array, row: usize) -> Option<f64> {
    arr.is_valid(row).then(|| arr.value(row))
}

pub fn opt_str(arr: &StringArray, row: usize) -> Option<String> {
    arr.is_valid(row).then(|| arr.value(row).to_string())
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch")
}

/// Days since 1970-01-01, the Date32 representation.
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(unix_epoch()).num_days() as i32
}

pub fn days_to_date(days: i32) -> NaiveDate {
    unix_epoch() + chrono::Duration::days(i64::from(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn date32_roundtrip() {
        let d: NaiveDate = "2025-03-15".parse().unwrap();
        assert_eq!(days_to_date(date_to_days(d)), d);
        assert_eq!(date_to_days(unix_epoch()), 0);
    }

    #[test]
    fn missing_column_is_invalid_data() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(vec![1]))],
        )
        .unwrap();
        let err = str_col(&batch, "name").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn wrong_type_is_invalid_data() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(vec![1]))],
        )
        .unwrap();
        assert!(f64_col(&batch, "id").is_err());
        assert!(i64_col(&batch, "id").is_ok());
    }

    #[test]
    fn opt_accessors_respect_nulls() {
        let arr = Int64Array::from(vec![Some(5), None]);
        assert_eq!(opt_i64(&arr, 0), Some(5));
        assert_eq!(opt_i64(&arr, 1), None);
    }
}
