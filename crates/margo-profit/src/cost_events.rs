//! Stage 1: cost events from qualifying purchase lines

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{Date32Array, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::NaiveDate;

use margo_core::column::{date_col, date_to_days, days_to_date, f64_col, i64_col};
use margo_core::{LakeLayout, read_batches, write_batch};

pub const FACT: &str = "fact_product_cost_events";
const PURCHASES: &str = "fact_purchases";

/// One cost observation, derived 1:1 from a qualifying purchase line.
/// Never mutated once written.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEvent {
    pub date: NaiveDate,
    pub product_id: i64,
    pub cost_unit_tax_in: f64,
    pub source_move_id: i64,
    pub source_tax_id: i64,
}

pub(crate) static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("cost_unit_tax_in", DataType::Float64, false),
        Field::new("source_move_id", DataType::Int64, false),
        Field::new("source_tax_id", DataType::Int64, false),
    ]))
});

/// Derive cost events from the purchase fact for `date`. Lines with a
/// non-positive price or quantity are not cost evidence (bonus and
/// correction lines) and are skipped. Missing partition means no purchases.
pub fn build(layout: &LakeLayout, date: NaiveDate) -> io::Result<Vec<CostEvent>> {
    let path = layout.fact_file(PURCHASES, date);
    if !path.exists() {
        log::info!("no {PURCHASES} partition for {date}");
        return Ok(Vec::new());
    }

    let mut events = Vec::new();
    for batch in read_batches(&path)? {
        let dates = date_col(&batch, "date")?;
        let move_ids = i64_col(&batch, "move_id")?;
        let product_ids = i64_col(&batch, "product_id")?;
        let prices = f64_col(&batch, "actual_price")?;
        let quantities = f64_col(&batch, "quantity")?;
        let tax_ids = i64_col(&batch, "tax_id")?;

        for i in 0..batch.num_rows() {
            let price = prices.value(i);
            if price <= 0.0 || quantities.value(i) <= 0.0 {
                continue;
            }
            let tax_id = tax_ids.value(i);
            events.push(CostEvent {
                date: days_to_date(dates.value(i)),
                product_id: product_ids.value(i),
                cost_unit_tax_in: price * crate::tax::tax_multiplier(tax_id),
                source_move_id: move_ids.value(i),
                source_tax_id: tax_id,
            });
        }
    }
    Ok(events)
}

pub fn to_batch(rows: &[CostEvent]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|r| date_to_days(r.date)))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.cost_unit_tax_in))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.source_move_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.source_tax_id))),
        ],
    )
}

pub fn from_batch(batch: &RecordBatch) -> io::Result<Vec<CostEvent>> {
    let dates = date_col(batch, "date")?;
    let product_ids = i64_col(batch, "product_id")?;
    let costs = f64_col(batch, "cost_unit_tax_in")?;
    let move_ids = i64_col(batch, "source_move_id")?;
    let tax_ids = i64_col(batch, "source_tax_id")?;
    Ok((0..batch.num_rows())
        .map(|i| CostEvent {
            date: days_to_date(dates.value(i)),
            product_id: product_ids.value(i),
            cost_unit_tax_in: costs.value(i),
            source_move_id: move_ids.value(i),
            source_tax_id: tax_ids.value(i),
        })
        .collect())
}

/// Build and persist the cost-event partition for `date`.
pub fn update(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let events = build(layout, date)?;
    let path = layout.fact_file(FACT, date);
    let batch = to_batch(&events).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("wrote {} cost events for {date}", events.len());
    Ok(path)
}
