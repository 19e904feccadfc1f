//! Stage 4: daily and daily-by-product rollups

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{Date32Array, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

use margo_core::column::date_to_days;
use margo_core::{LakeLayout, read_batches, write_batch};

use crate::profit_lines::{self, ProfitLine};

pub const DAILY: &str = "agg_profit_daily";
pub const BY_PRODUCT: &str = "agg_profit_daily_by_product";

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub revenue_tax_in: f64,
    pub cogs_tax_in: f64,
    pub gross_profit: f64,
    pub quantity: f64,
    pub transactions: i64,
    pub lines: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductDailyAggregate {
    pub date: NaiveDate,
    pub product_id: i64,
    pub revenue_tax_in: f64,
    pub cogs_tax_in: f64,
    pub gross_profit: f64,
    pub quantity: f64,
    pub transactions: i64,
    pub lines: i64,
}

static DAILY_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("revenue_tax_in", DataType::Float64, false),
        Field::new("cogs_tax_in", DataType::Float64, false),
        Field::new("gross_profit", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("transactions", DataType::Int64, false),
        Field::new("lines", DataType::Int64, false),
    ]))
});

static BY_PRODUCT_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("revenue_tax_in", DataType::Float64, false),
        Field::new("cogs_tax_in", DataType::Float64, false),
        Field::new("gross_profit", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("transactions", DataType::Int64, false),
        Field::new("lines", DataType::Int64, false),
    ]))
});

#[derive(Default)]
struct Bucket {
    revenue: f64,
    cogs: f64,
    profit: f64,
    quantity: f64,
    txns: FxHashSet<i64>,
    lines: i64,
}

impl Bucket {
    fn add(&mut self, line: &ProfitLine) {
        self.revenue += line.revenue_tax_in;
        self.cogs += line.cogs_tax_in;
        self.profit += line.gross_profit;
        self.quantity += line.quantity;
        self.txns.insert(line.txn_id);
        self.lines += 1;
    }
}

/// Roll profit lines up by date and by (date, product). Both tables are
/// recomputed wholesale from the given lines, never merged incrementally.
pub fn build(lines: &[ProfitLine]) -> (Vec<DailyAggregate>, Vec<ProductDailyAggregate>) {
    let mut daily: FxHashMap<NaiveDate, Bucket> = FxHashMap::default();
    let mut by_product: FxHashMap<(NaiveDate, i64), Bucket> = FxHashMap::default();
    for line in lines {
        daily.entry(line.date).or_default().add(line);
        by_product
            .entry((line.date, line.product_id))
            .or_default()
            .add(line);
    }

    let mut daily_rows: Vec<DailyAggregate> = daily
        .into_iter()
        .map(|(date, b)| DailyAggregate {
            date,
            revenue_tax_in: b.revenue,
            cogs_tax_in: b.cogs,
            gross_profit: b.profit,
            quantity: b.quantity,
            transactions: b.txns.len() as i64,
            lines: b.lines,
        })
        .collect();
    daily_rows.sort_by_key(|r| r.date);

    let mut product_rows: Vec<ProductDailyAggregate> = by_product
        .into_iter()
        .map(|((date, product_id), b)| ProductDailyAggregate {
            date,
            product_id,
            revenue_tax_in: b.revenue,
            cogs_tax_in: b.cogs,
            gross_profit: b.profit,
            quantity: b.quantity,
            transactions: b.txns.len() as i64,
            lines: b.lines,
        })
        .collect();
    product_rows.sort_by_key(|r| (r.date, r.product_id));

    (daily_rows, product_rows)
}

pub fn daily_to_batch(rows: &[DailyAggregate]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        DAILY_SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|r| date_to_days(r.date)))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.revenue_tax_in))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.cogs_tax_in))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.gross_profit))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.transactions))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.lines))),
        ],
    )
}

pub fn by_product_to_batch(rows: &[ProductDailyAggregate]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        BY_PRODUCT_SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(rows.iter().map(|r| date_to_days(r.date)))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.revenue_tax_in))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.cogs_tax_in))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.gross_profit))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.transactions))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.lines))),
        ],
    )
}

/// Rebuild both aggregate partitions for `date` from the persisted profit
/// lines. Returns the daily aggregate path.
pub fn update(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let profit_path = layout.fact_file(profit_lines::FACT, date);
    let mut lines = Vec::new();
    if profit_path.exists() {
        for batch in read_batches(&profit_path)? {
            lines.extend(profit_lines::from_batch(&batch)?);
        }
    } else {
        log::warn!("no {} partition for {date}", profit_lines::FACT);
    }

    let (daily, by_product) = build(&lines);
    let daily_path = layout.fact_file(DAILY, date);
    write_batch(&daily_to_batch(&daily).map_err(io::Error::other)?, &daily_path)?;
    write_batch(
        &by_product_to_batch(&by_product).map_err(io::Error::other)?,
        &layout.fact_file(BY_PRODUCT, date),
    )?;
    log::info!(
        "aggregated {} profit lines into {} daily and {} product rows for {date}",
        lines.len(),
        daily.len(),
        by_product.len()
    );
    Ok(daily_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(txn_id: i64, line_id: i64, product_id: i64, qty: f64, rev: f64, cogs: f64) -> ProfitLine {
        ProfitLine {
            date: "2025-03-15".parse().unwrap(),
            txn_id,
            line_id,
            product_id,
            quantity: qty,
            revenue_tax_in: rev,
            cost_unit_tax_in: Some(cogs / qty),
            cogs_tax_in: cogs,
            gross_profit: rev - cogs,
        }
    }

    #[test]
    fn daily_rollup_counts_distinct_transactions() {
        let lines = vec![
            line(1, 10, 1, 2.0, 25.0, 20.0),
            line(2, 20, 2, 1.0, 22.2, 20.0),
            line(2, 21, 2, 1.0, 11.1, 20.0),
            line(3, 30, 1, 3.0, 45.0, 30.0),
        ];
        let (daily, by_product) = build(&lines);

        assert_eq!(daily.len(), 1);
        let d = &daily[0];
        assert!((d.revenue_tax_in - 103.3).abs() < 1e-9);
        assert!((d.cogs_tax_in - 90.0).abs() < 1e-9);
        assert!((d.gross_profit - 13.3).abs() < 1e-9);
        assert_eq!(d.transactions, 3);
        assert_eq!(d.lines, 4);

        assert_eq!(by_product.len(), 2);
        let p1 = &by_product[0];
        assert_eq!(p1.product_id, 1);
        assert!((p1.gross_profit - 20.0).abs() < 1e-9);
        let p2 = &by_product[1];
        assert!((p2.gross_profit - (-6.7)).abs() < 1e-9);
        assert_eq!(p2.transactions, 1);
        assert_eq!(p2.lines, 2);
    }

    #[test]
    fn empty_input_builds_empty_tables() {
        let (daily, by_product) = build(&[]);
        assert!(daily.is_empty());
        assert!(by_product.is_empty());
    }
}
