//! Stage 3: per-line profit, POS and invoice sales unioned

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{Date32Array, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use margo_core::column::{date_col, date_to_days, days_to_date, f64_col, i64_col, opt_f64};
use margo_core::{LakeLayout, read_batches, write_batch};

use crate::latest_cost;
use crate::tax::tax_multiplier;

pub const FACT: &str = "fact_sales_lines_profit";
const POS_SALES: &str = "fact_sales";
const INVOICE_SALES: &str = "fact_invoice_sales";

/// One sold line with its attributed cost. `txn_id` is the POS order id or
/// the invoice move id. `cost_unit_tax_in` stays null when the product has
/// no cost evidence yet; such lines contribute zero COGS.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitLine {
    pub date: NaiveDate,
    pub txn_id: i64,
    pub line_id: i64,
    pub product_id: i64,
    pub quantity: f64,
    pub revenue_tax_in: f64,
    pub cost_unit_tax_in: Option<f64>,
    pub cogs_tax_in: f64,
    pub gross_profit: f64,
}

static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("txn_id", DataType::Int64, false),
        Field::new("line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("revenue_tax_in", DataType::Float64, false),
        Field::new("cost_unit_tax_in", DataType::Float64, true),
        Field::new("cogs_tax_in", DataType::Float64, false),
        Field::new("gross_profit", DataType::Float64, false),
    ]))
});

fn with_cost(
    date: NaiveDate,
    txn_id: i64,
    line_id: i64,
    product_id: i64,
    quantity: f64,
    revenue_tax_in: f64,
    costs: &FxHashMap<i64, f64>,
) -> ProfitLine {
    let cost_unit_tax_in = costs.get(&product_id).copied();
    let cogs_tax_in = cost_unit_tax_in.map(|c| c * quantity).unwrap_or(0.0);
    ProfitLine {
        date,
        txn_id,
        line_id,
        product_id,
        quantity,
        revenue_tax_in,
        cost_unit_tax_in,
        cogs_tax_in,
        gross_profit: revenue_tax_in - cogs_tax_in,
    }
}

/// Join the day's sales against the latest-cost snapshot.
pub fn build(layout: &LakeLayout, date: NaiveDate) -> io::Result<Vec<ProfitLine>> {
    let costs = latest_cost::load(layout, date)?;
    let mut lines = Vec::new();

    // POS revenue is already tax-inclusive
    let pos_path = layout.fact_file(POS_SALES, date);
    if pos_path.exists() {
        for batch in read_batches(&pos_path)? {
            let dates = date_col(&batch, "date")?;
            let order_ids = i64_col(&batch, "order_id")?;
            let line_ids = i64_col(&batch, "line_id")?;
            let product_ids = i64_col(&batch, "product_id")?;
            let quantities = f64_col(&batch, "quantity")?;
            let revenues = f64_col(&batch, "revenue")?;
            for i in 0..batch.num_rows() {
                lines.push(with_cost(
                    days_to_date(dates.value(i)),
                    order_ids.value(i),
                    line_ids.value(i),
                    product_ids.value(i),
                    quantities.value(i),
                    revenues.value(i),
                    &costs,
                ));
            }
        }
    } else {
        log::info!("no {POS_SALES} partition for {date}");
    }

    let invoice_path = layout.fact_file(INVOICE_SALES, date);
    if invoice_path.exists() {
        for batch in read_batches(&invoice_path)? {
            let dates = date_col(&batch, "date")?;
            let move_ids = i64_col(&batch, "move_id")?;
            let line_ids = i64_col(&batch, "move_line_id")?;
            let product_ids = i64_col(&batch, "product_id")?;
            let quantities = f64_col(&batch, "quantity")?;
            let prices = f64_col(&batch, "price_unit")?;
            let tax_ids = i64_col(&batch, "tax_id")?;
            for i in 0..batch.num_rows() {
                let quantity = quantities.value(i);
                let revenue = prices.value(i) * quantity * tax_multiplier(tax_ids.value(i));
                lines.push(with_cost(
                    days_to_date(dates.value(i)),
                    move_ids.value(i),
                    line_ids.value(i),
                    product_ids.value(i),
                    quantity,
                    revenue,
                    &costs,
                ));
            }
        }
    } else {
        log::info!("no {INVOICE_SALES} partition for {date}");
    }

    Ok(lines)
}

pub fn to_batch(rows: &[ProfitLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|r| date_to_days(r.date)))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.txn_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.line_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.revenue_tax_in))),
            Arc::new(rows.iter().map(|r| r.cost_unit_tax_in).collect::<Float64Array>()),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.cogs_tax_in))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.gross_profit))),
        ],
    )
}

pub fn from_batch(batch: &RecordBatch) -> io::Result<Vec<ProfitLine>> {
    let dates = date_col(batch, "date")?;
    let txn_ids = i64_col(batch, "txn_id")?;
    let line_ids = i64_col(batch, "line_id")?;
    let product_ids = i64_col(batch, "product_id")?;
    let quantities = f64_col(batch, "quantity")?;
    let revenues = f64_col(batch, "revenue_tax_in")?;
    let costs = f64_col(batch, "cost_unit_tax_in")?;
    let cogs = f64_col(batch, "cogs_tax_in")?;
    let profits = f64_col(batch, "gross_profit")?;
    Ok((0..batch.num_rows())
        .map(|i| ProfitLine {
            date: days_to_date(dates.value(i)),
            txn_id: txn_ids.value(i),
            line_id: line_ids.value(i),
            product_id: product_ids.value(i),
            quantity: quantities.value(i),
            revenue_tax_in: revenues.value(i),
            cost_unit_tax_in: opt_f64(costs, i),
            cogs_tax_in: cogs.value(i),
            gross_profit: profits.value(i),
        })
        .collect())
}

/// Build and persist the profit-line partition for `date`.
pub fn update(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let lines = build(layout, date)?;
    let path = layout.fact_file(FACT, date);
    let batch = to_batch(&lines).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("wrote {} profit lines for {date}", lines.len());
    Ok(path)
}
