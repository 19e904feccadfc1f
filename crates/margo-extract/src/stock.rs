//! Stock-on-hand snapshots from `stock.quant`

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{Date32Array, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::NaiveDate;

use margo_core::column::{date_to_days, f64_col, i64_col, opt_i64};
use margo_core::{LakeLayout, read_batches, write_batch};
use margo_source::{Condition, SourceClient, SourceError};

pub const DATASET: &str = "stock_quants";
pub const FACT: &str = "fact_stock_on_hand";

/// One quant as seen at snapshot time. Unlike the event datasets this is a
/// full scan, stamped with the target date.
#[derive(Debug, Clone)]
pub struct RawQuant {
    pub quant_id: i64,
    pub snapshot_date: NaiveDate,
    pub product_id: Option<i64>,
    pub location_id: Option<i64>,
    pub lot_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub company_id: Option<i64>,
    pub quantity: f64,
    pub reserved_quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanQuant {
    pub snapshot_date: NaiveDate,
    pub quant_id: i64,
    pub product_id: i64,
    pub location_id: i64,
    pub lot_id: i64,
    pub owner_id: i64,
    pub company_id: i64,
    pub quantity: f64,
    pub reserved_quantity: f64,
}

static RAW_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("snapshot_date", DataType::Date32, false),
        Field::new("quant_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, true),
        Field::new("location_id", DataType::Int64, true),
        Field::new("lot_id", DataType::Int64, true),
        Field::new("owner_id", DataType::Int64, true),
        Field::new("company_id", DataType::Int64, true),
        Field::new("quantity", DataType::Float64, false),
        Field::new("reserved_quantity", DataType::Float64, false),
    ]))
});

static CLEAN_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("snapshot_date", DataType::Date32, false),
        Field::new("quant_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("location_id", DataType::Int64, false),
        Field::new("lot_id", DataType::Int64, false),
        Field::new("owner_id", DataType::Int64, false),
        Field::new("company_id", DataType::Int64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("reserved_quantity", DataType::Float64, false),
    ]))
});

static FACT_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("quant_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("location_id", DataType::Int64, false),
        Field::new("lot_id", DataType::Int64, false),
        Field::new("owner_id", DataType::Int64, false),
        Field::new("company_id", DataType::Int64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("reserved_quantity", DataType::Float64, false),
    ]))
});

/// Scan every non-zero quant and stamp it with `date`.
pub fn extract(
    client: &mut dyn SourceClient,
    date: NaiveDate,
) -> Result<Vec<RawQuant>, SourceError> {
    let candidates = [
        "product_id",
        "location_id",
        "quantity",
        "reserved_quantity",
        "lot_id",
        "owner_id",
        "company_id",
    ];
    let available = match client.available_fields("stock.quant", &candidates) {
        Ok(fields) => fields,
        Err(SourceError::MissingModel(model)) => {
            log::warn!("source does not expose {model}, skipping stock snapshot");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let fields: Vec<&str> = available.iter().map(String::as_str).collect();

    let mut domain = Vec::new();
    if available.iter().any(|f| f == "quantity") {
        domain.push(Condition::ne("quantity", 0));
    }

    let quants = client.search_read("stock.quant", &domain, &fields)?;
    if quants.is_empty() {
        log::info!("no stock.quant data found for snapshot {date}");
        return Ok(Vec::new());
    }

    let mut rows = Vec::with_capacity(quants.len());
    for qt in &quants {
        let Some(quant_id) = qt.id() else { continue };
        rows.push(RawQuant {
            quant_id,
            snapshot_date: date,
            product_id: qt.m2o_id("product_id"),
            location_id: qt.m2o_id("location_id"),
            lot_id: qt.m2o_id("lot_id"),
            owner_id: qt.m2o_id("owner_id"),
            company_id: qt.m2o_id("company_id"),
            quantity: qt.as_f64("quantity").unwrap_or(0.0),
            reserved_quantity: qt.as_f64("reserved_quantity").unwrap_or(0.0),
        });
    }
    log::info!("extracted {} stock quants for snapshot {date}", rows.len());
    Ok(rows)
}

/// Null-fill; quants carry no timestamps so nothing can fail validation.
pub fn clean(rows: &[RawQuant]) -> Vec<CleanQuant> {
    rows.iter()
        .map(|row| CleanQuant {
            snapshot_date: row.snapshot_date,
            quant_id: row.quant_id,
            product_id: row.product_id.unwrap_or(0),
            location_id: row.location_id.unwrap_or(0),
            lot_id: row.lot_id.unwrap_or(0),
            owner_id: row.owner_id.unwrap_or(0),
            company_id: row.company_id.unwrap_or(0),
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
        })
        .collect()
}

pub fn raw_to_batch(rows: &[RawQuant]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        RAW_SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date_to_days(r.snapshot_date)),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.quant_id))),
            Arc::new(rows.iter().map(|r| r.product_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.location_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.lot_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.owner_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.company_id).collect::<Int64Array>()),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.reserved_quantity))),
        ],
    )
}

pub fn raw_from_batch(batch: &RecordBatch) -> io::Result<Vec<RawQuant>> {
    let snapshot_date = margo_core::column::date_col(batch, "snapshot_date")?;
    let quant_id = i64_col(batch, "quant_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let location_id = i64_col(batch, "location_id")?;
    let lot_id = i64_col(batch, "lot_id")?;
    let owner_id = i64_col(batch, "owner_id")?;
    let company_id = i64_col(batch, "company_id")?;
    let quantity = f64_col(batch, "quantity")?;
    let reserved_quantity = f64_col(batch, "reserved_quantity")?;

    Ok((0..batch.num_rows())
        .map(|i| RawQuant {
            quant_id: quant_id.value(i),
            snapshot_date: margo_core::column::days_to_date(snapshot_date.value(i)),
            product_id: opt_i64(product_id, i),
            location_id: opt_i64(location_id, i),
            lot_id: opt_i64(lot_id, i),
            owner_id: opt_i64(owner_id, i),
            company_id: opt_i64(company_id, i),
            quantity: quantity.value(i),
            reserved_quantity: reserved_quantity.value(i),
        })
        .collect())
}

fn quant_columns(rows: &[CleanQuant]) -> Vec<Arc<dyn arrow::array::Array>> {
    vec![
        Arc::new(Date32Array::from_iter_values(
            rows.iter().map(|r| date_to_days(r.snapshot_date)),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.quant_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.location_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.lot_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.owner_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.company_id))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.reserved_quantity))),
    ]
}

pub fn clean_to_batch(rows: &[CleanQuant]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(CLEAN_SCHEMA.clone(), quant_columns(rows))
}

pub fn clean_from_batch(batch: &RecordBatch) -> io::Result<Vec<CleanQuant>> {
    let snapshot_date = margo_core::column::date_col(batch, "snapshot_date")?;
    let quant_id = i64_col(batch, "quant_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let location_id = i64_col(batch, "location_id")?;
    let lot_id = i64_col(batch, "lot_id")?;
    let owner_id = i64_col(batch, "owner_id")?;
    let company_id = i64_col(batch, "company_id")?;
    let quantity = f64_col(batch, "quantity")?;
    let reserved_quantity = f64_col(batch, "reserved_quantity")?;

    Ok((0..batch.num_rows())
        .map(|i| CleanQuant {
            snapshot_date: margo_core::column::days_to_date(snapshot_date.value(i)),
            quant_id: quant_id.value(i),
            product_id: product_id.value(i),
            location_id: location_id.value(i),
            lot_id: lot_id.value(i),
            owner_id: owner_id.value(i),
            company_id: company_id.value(i),
            quantity: quantity.value(i),
            reserved_quantity: reserved_quantity.value(i),
        })
        .collect())
}

pub fn fact_to_batch(rows: &[CleanQuant]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(FACT_SCHEMA.clone(), quant_columns(rows))
}

pub fn save_raw(layout: &LakeLayout, date: NaiveDate, rows: &[RawQuant]) -> io::Result<PathBuf> {
    let path = layout.raw_file(DATASET, date);
    let batch = raw_to_batch(rows).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("saved {} raw {DATASET} rows to {}", rows.len(), path.display());
    Ok(path)
}

pub fn clean_partition(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let raw_path = layout.raw_file(DATASET, date);
    let mut rows = Vec::new();
    for batch in read_batches(&raw_path)? {
        rows.extend(raw_from_batch(&batch)?);
    }
    let cleaned = clean(&rows);
    let path = layout.clean_file(DATASET, date);
    let batch = clean_to_batch(&cleaned).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("cleaned {} {DATASET} rows for {date}", cleaned.len());
    Ok(path)
}

pub fn merge_fact(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let clean_path = layout.clean_file(DATASET, date);
    let mut rows = Vec::new();
    for batch in read_batches(&clean_path)? {
        rows.extend(clean_from_batch(&batch)?);
    }
    let path = layout.fact_file(FACT, date);
    let batch = fact_to_batch(&rows).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use margo_source::MemoryClient;
    use serde_json::json;

    fn seeded() -> MemoryClient {
        let mut client = MemoryClient::new();
        client.insert(
            "stock.quant",
            json!({
                "id": 1,
                "product_id": [42, "Widget A"],
                "location_id": [5, "WH/Stock"],
                "quantity": 12.0,
                "reserved_quantity": 2.0,
                "company_id": [1, "Main"],
            }),
        );
        client.insert(
            "stock.quant",
            json!({
                "id": 2,
                "product_id": [43, "Widget B"],
                "location_id": [5, "WH/Stock"],
                "quantity": 0.0,
                "reserved_quantity": 0.0,
                "company_id": [1, "Main"],
            }),
        );
        client
    }

    #[test]
    fn extract_skips_zero_quantity_quants() {
        let mut client = seeded();
        let date: NaiveDate = "2025-03-15".parse().unwrap();
        let rows = extract(&mut client, date).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quant_id, 1);
        assert_eq!(rows[0].snapshot_date, date);
        assert_eq!(rows[0].quantity, 12.0);
    }

    #[test]
    fn missing_model_degrades_to_empty() {
        let mut client = MemoryClient::new();
        let rows = extract(&mut client, "2025-03-15".parse().unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn clean_null_fills_ids() {
        let raw = RawQuant {
            quant_id: 1,
            snapshot_date: "2025-03-15".parse().unwrap(),
            product_id: Some(42),
            location_id: None,
            lot_id: None,
            owner_id: None,
            company_id: None,
            quantity: 5.0,
            reserved_quantity: 0.0,
        };
        let cleaned = clean(&[raw]);
        assert_eq!(cleaned[0].location_id, 0);
        assert_eq!(cleaned[0].product_id, 42);
    }

    #[test]
    fn partition_flow_roundtrips() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let date: NaiveDate = "2025-03-15".parse().unwrap();

        let mut client = seeded();
        let rows = extract(&mut client, date).unwrap();
        save_raw(&layout, date, &rows).unwrap();
        clean_partition(&layout, date).unwrap();
        let fact_path = merge_fact(&layout, date).unwrap();

        let batches = read_batches(&fact_path).unwrap();
        assert_eq!(batches[0].num_rows(), 1);
        let qty = f64_col(&batches[0], "quantity").unwrap();
        assert_eq!(qty.value(0), 12.0);
    }
}
