//! Fixture writers for engine tests

use std::sync::Arc;

use arrow::array::{Date32Array, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;

use margo_core::column::date_to_days;
use margo_core::{LakeLayout, write_batch};

/// (move_id, product_id, actual_price, quantity, tax_id)
pub fn write_purchases(
    layout: &LakeLayout,
    date: NaiveDate,
    rows: &[(i64, i64, f64, f64, i64)],
) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("actual_price", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("tax_id", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|_| date_to_days(date)))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.3))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.4))),
        ],
    )
    .unwrap();
    write_batch(&batch, &layout.fact_file("fact_purchases", date)).unwrap();
}

/// (order_id, line_id, product_id, quantity, revenue)
pub fn write_sales(layout: &LakeLayout, date: NaiveDate, rows: &[(i64, i64, i64, f64, f64)]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("order_id", DataType::Int64, false),
        Field::new("line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("revenue", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|_| date_to_days(date)))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.3))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.4))),
        ],
    )
    .unwrap();
    write_batch(&batch, &layout.fact_file("fact_sales", date)).unwrap();
}

/// (move_id, move_line_id, product_id, quantity, price_unit, tax_id)
pub fn write_invoice_sales(
    layout: &LakeLayout,
    date: NaiveDate,
    rows: &[(i64, i64, i64, f64, f64, i64)],
) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("price_unit", DataType::Float64, false),
        Field::new("tax_id", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|_| date_to_days(date)))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.3))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.4))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.5))),
        ],
    )
    .unwrap();
    write_batch(&batch, &layout.fact_file("fact_invoice_sales", date)).unwrap();
}
