//! Invoice line extraction shared by customer invoices and vendor bills

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

use margo_core::column::{bool_col, date_to_days, f64_col, i64_col, opt_i64, str_col};
use margo_core::{LakeLayout, read_batches, write_batch};
use margo_source::{Condition, SourceClient, SourceError, batch_ids};

/// The two flavours of `account.move` this extractor serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    CustomerInvoice,
    VendorBill,
}

impl MoveKind {
    pub fn move_type(self) -> &'static str {
        match self {
            Self::CustomerInvoice => "out_invoice",
            Self::VendorBill => "in_invoice",
        }
    }

    /// Partner role, which names the partner columns.
    pub fn partner_role(self) -> &'static str {
        match self {
            Self::CustomerInvoice => "customer",
            Self::VendorBill => "vendor",
        }
    }

    pub fn dataset(self) -> &'static str {
        match self {
            Self::CustomerInvoice => "invoice_sales_lines",
            Self::VendorBill => "purchase_lines",
        }
    }

    pub fn fact(self) -> &'static str {
        match self {
            Self::CustomerInvoice => "fact_invoice_sales",
            Self::VendorBill => "fact_purchases",
        }
    }
}

/// One extracted invoice line in source shape.
#[derive(Debug, Clone)]
pub struct RawInvoiceLine {
    pub move_id: i64,
    pub move_name: Option<String>,
    pub move_date: Option<String>,
    pub partner_id: Option<i64>,
    pub partner_name: Option<String>,
    pub move_line_id: i64,
    pub product_id: Option<i64>,
    pub price_unit: Option<f64>,
    pub quantity: Option<f64>,
    pub tax_id: Option<i64>,
    pub tax_ids_json: String,
}

/// Validated line with typed defaults; purchase-only enrichments are
/// defaulted for customer invoices.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanInvoiceLine {
    pub move_date: NaiveDate,
    pub move_id: i64,
    pub move_name: String,
    pub partner_id: i64,
    pub partner_name: String,
    pub move_line_id: i64,
    pub product_id: i64,
    pub price_unit: f64,
    pub quantity: f64,
    pub tax_id: i64,
    pub tax_name: String,
    pub tax_ids_json: String,
    pub is_free_item: bool,
}

fn make_row_schema(role: &str) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("move_date", DataType::Utf8, true),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_name", DataType::Utf8, true),
        Field::new(format!("{role}_id"), DataType::Int64, true),
        Field::new(format!("{role}_name"), DataType::Utf8, true),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, true),
        Field::new("price_unit", DataType::Float64, true),
        Field::new("quantity", DataType::Float64, true),
        Field::new("tax_id", DataType::Int64, true),
        Field::new("tax_ids_json", DataType::Utf8, false),
    ]))
}

fn make_clean_schema(role: &str) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("move_date", DataType::Utf8, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_name", DataType::Utf8, false),
        Field::new(format!("{role}_id"), DataType::Int64, false),
        Field::new(format!("{role}_name"), DataType::Utf8, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("price_unit", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("tax_id", DataType::Int64, false),
        Field::new("tax_name", DataType::Utf8, false),
        Field::new("tax_ids_json", DataType::Utf8, false),
        Field::new("is_free_item", DataType::Boolean, false),
    ]))
}

static SALES_RAW: LazyLock<Arc<Schema>> = LazyLock::new(|| make_row_schema("customer"));
static PURCHASE_RAW: LazyLock<Arc<Schema>> = LazyLock::new(|| make_row_schema("vendor"));
static SALES_CLEAN: LazyLock<Arc<Schema>> = LazyLock::new(|| make_clean_schema("customer"));
static PURCHASE_CLEAN: LazyLock<Arc<Schema>> = LazyLock::new(|| make_clean_schema("vendor"));

static SALES_FACT: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_name", DataType::Utf8, false),
        Field::new("customer_id", DataType::Int64, false),
        Field::new("customer_name", DataType::Utf8, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("price_unit", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("tax_id", DataType::Int64, false),
        Field::new("tax_ids_json", DataType::Utf8, false),
    ]))
});

static PURCHASE_FACT: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_name", DataType::Utf8, false),
        Field::new("vendor_id", DataType::Int64, false),
        Field::new("vendor_name", DataType::Utf8, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("actual_price", DataType::Float64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("tax_id", DataType::Int64, false),
        Field::new("tax_name", DataType::Utf8, false),
        Field::new("tax_ids_json", DataType::Utf8, false),
        Field::new("is_free_item", DataType::Boolean, false),
    ]))
});

fn raw_schema(kind: MoveKind) -> Arc<Schema> {
    match kind {
        MoveKind::CustomerInvoice => SALES_RAW.clone(),
        MoveKind::VendorBill => PURCHASE_RAW.clone(),
    }
}

fn clean_schema(kind: MoveKind) -> Arc<Schema> {
    match kind {
        MoveKind::CustomerInvoice => SALES_CLEAN.clone(),
        MoveKind::VendorBill => PURCHASE_CLEAN.clone(),
    }
}

/// Pull one day of posted invoice lines for `kind`.
pub fn extract(
    client: &mut dyn SourceClient,
    kind: MoveKind,
    date: NaiveDate,
) -> Result<Vec<RawInvoiceLine>, SourceError> {
    let domain = vec![
        Condition::gte("date", date.to_string()),
        Condition::lte("date", date.to_string()),
        Condition::eq("move_type", kind.move_type()),
        Condition::eq("state", "posted"),
    ];
    let move_fields = ["id", "date", "name", "partner_id", "invoice_line_ids"];
    let moves = match client.search_read("account.move", &domain, &move_fields) {
        Ok(moves) => moves,
        Err(SourceError::MissingModel(model)) => {
            log::warn!("source does not expose {model}, skipping invoice extraction");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    if moves.is_empty() {
        log::info!("no account.move ({}) found for {date}", kind.move_type());
        return Ok(Vec::new());
    }

    struct MoveHead {
        date: Option<String>,
        name: Option<String>,
        partner_id: Option<i64>,
        partner_name: Option<String>,
    }

    let mut line_ids: FxHashSet<i64> = FxHashSet::default();
    let mut heads: FxHashMap<i64, MoveHead> = FxHashMap::default();
    for mv in &moves {
        let Some(move_id) = mv.id() else { continue };
        heads.insert(
            move_id,
            MoveHead {
                date: mv.as_str("date").map(str::to_string),
                name: mv.as_str("name").map(str::to_string),
                partner_id: mv.m2o_id("partner_id"),
                partner_name: mv.m2o_name("partner_id").map(str::to_string),
            },
        );
        line_ids.extend(mv.o2m_ids("invoice_line_ids"));
    }
    if line_ids.is_empty() {
        log::info!("no invoice lines found for {date} ({})", kind.move_type());
        return Ok(Vec::new());
    }

    let candidates = ["move_id", "product_id", "price_unit", "quantity", "tax_ids"];
    let available = client.available_fields("account.move.line", &candidates)?;
    let fields: Vec<&str> = available.iter().map(String::as_str).collect();

    let mut rows = Vec::new();
    for batch in batch_ids(line_ids) {
        for line in client.read("account.move.line", &batch, &fields)? {
            let Some(move_id) = line.m2o_id("move_id") else {
                continue;
            };
            let Some(head) = heads.get(&move_id) else {
                continue;
            };

            let mut tax_ids: Vec<i64> = line.o2m_ids("tax_ids");
            tax_ids.sort_unstable();
            tax_ids.dedup();

            rows.push(RawInvoiceLine {
                move_id,
                move_name: head.name.clone(),
                move_date: head.date.clone(),
                partner_id: head.partner_id,
                partner_name: head.partner_name.clone(),
                move_line_id: line.id().unwrap_or(0),
                product_id: line.m2o_id("product_id"),
                price_unit: line.as_f64("price_unit"),
                quantity: line.as_f64("quantity"),
                tax_id: tax_ids.first().copied(),
                tax_ids_json: serde_json::to_string(&tax_ids).unwrap_or_else(|_| "[]".to_string()),
            });
        }
    }
    log::info!("extracted {} {} lines for {date}", rows.len(), kind.move_type());
    Ok(rows)
}

/// Validate and null-fill raw lines.
///
/// Vendor bills additionally get `is_free_item`, a vendor name trimmed at
/// the first comma, and `tax_name` resolved from the tax dimension.
pub fn clean(
    rows: &[RawInvoiceLine],
    kind: MoveKind,
    tax_names: &FxHashMap<i64, String>,
) -> io::Result<Vec<CleanInvoiceLine>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_date = row.move_date.as_deref().unwrap_or_default();
        let move_date: NaiveDate = raw_date.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad move date {raw_date:?}: {e}"),
            )
        })?;
        let price_unit = row.price_unit.unwrap_or(0.0);
        let quantity = row.quantity.unwrap_or(0.0);
        let is_purchase = kind == MoveKind::VendorBill;

        let mut partner_name = row.partner_name.clone().unwrap_or_default();
        if is_purchase {
            if let Some(comma) = partner_name.find(',') {
                partner_name.truncate(comma);
            }
        }

        let tax_id = row.tax_id.unwrap_or(0);
        let tax_name = if is_purchase {
            tax_names.get(&tax_id).cloned().unwrap_or_default()
        } else {
            String::new()
        };

        out.push(CleanInvoiceLine {
            move_date,
            move_id: row.move_id,
            move_name: row.move_name.clone().unwrap_or_default(),
            partner_id: row.partner_id.unwrap_or(0),
            partner_name,
            move_line_id: row.move_line_id,
            product_id: row.product_id.unwrap_or(0),
            price_unit,
            quantity,
            tax_id,
            tax_name,
            tax_ids_json: row.tax_ids_json.clone(),
            is_free_item: is_purchase && (price_unit == 0.0 || quantity == 0.0),
        });
    }
    Ok(out)
}

pub fn raw_to_batch(rows: &[RawInvoiceLine], kind: MoveKind) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        raw_schema(kind),
        vec![
            Arc::new(rows.iter().map(|r| r.move_date.as_deref()).collect::<StringArray>()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
            Arc::new(rows.iter().map(|r| r.move_name.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.partner_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.partner_name.as_deref()).collect::<StringArray>()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
            Arc::new(rows.iter().map(|r| r.product_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.price_unit).collect::<Float64Array>()),
            Arc::new(rows.iter().map(|r| r.quantity).collect::<Float64Array>()),
            Arc::new(rows.iter().map(|r| r.tax_id).collect::<Int64Array>()),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_ids_json.as_str()))),
        ],
    )
}

pub fn raw_from_batch(batch: &RecordBatch, kind: MoveKind) -> io::Result<Vec<RawInvoiceLine>> {
    let role = kind.partner_role();
    let move_date = str_col(batch, "move_date")?;
    let move_id = i64_col(batch, "move_id")?;
    let move_name = str_col(batch, "move_name")?;
    let partner_id = i64_col(batch, &format!("{role}_id"))?;
    let partner_name = str_col(batch, &format!("{role}_name"))?;
    let move_line_id = i64_col(batch, "move_line_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let price_unit = f64_col(batch, "price_unit")?;
    let quantity = f64_col(batch, "quantity")?;
    let tax_id = i64_col(batch, "tax_id")?;
    let tax_ids_json = str_col(batch, "tax_ids_json")?;

    Ok((0..batch.num_rows())
        .map(|i| RawInvoiceLine {
            move_id: move_id.value(i),
            move_name: margo_core::column::opt_str(move_name, i),
            move_date: margo_core::column::opt_str(move_date, i),
            partner_id: opt_i64(partner_id, i),
            partner_name: margo_core::column::opt_str(partner_name, i),
            move_line_id: move_line_id.value(i),
            product_id: opt_i64(product_id, i),
            price_unit: margo_core::column::opt_f64(price_unit, i),
            quantity: margo_core::column::opt_f64(quantity, i),
            tax_id: opt_i64(tax_id, i),
            tax_ids_json: tax_ids_json.value(i).to_string(),
        })
        .collect())
}

pub fn clean_to_batch(rows: &[CleanInvoiceLine], kind: MoveKind) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        clean_schema(kind),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.move_date.to_string()),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.move_name.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.partner_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.partner_name.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price_unit))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.tax_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_ids_json.as_str()))),
            Arc::new(rows.iter().map(|r| Some(r.is_free_item)).collect::<BooleanArray>()),
        ],
    )
}

pub fn clean_from_batch(batch: &RecordBatch, kind: MoveKind) -> io::Result<Vec<CleanInvoiceLine>> {
    let role = kind.partner_role();
    let move_date = str_col(batch, "move_date")?;
    let move_id = i64_col(batch, "move_id")?;
    let move_name = str_col(batch, "move_name")?;
    let partner_id = i64_col(batch, &format!("{role}_id"))?;
    let partner_name = str_col(batch, &format!("{role}_name"))?;
    let move_line_id = i64_col(batch, "move_line_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let price_unit = f64_col(batch, "price_unit")?;
    let quantity = f64_col(batch, "quantity")?;
    let tax_id = i64_col(batch, "tax_id")?;
    let tax_name = str_col(batch, "tax_name")?;
    let tax_ids_json = str_col(batch, "tax_ids_json")?;
    let is_free_item = bool_col(batch, "is_free_item")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let raw = move_date.value(i);
        let parsed: NaiveDate = raw.parse().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("bad move date {raw:?}: {e}"))
        })?;
        rows.push(CleanInvoiceLine {
            move_date: parsed,
            move_id: move_id.value(i),
            move_name: move_name.value(i).to_string(),
            partner_id: partner_id.value(i),
            partner_name: partner_name.value(i).to_string(),
            move_line_id: move_line_id.value(i),
            product_id: product_id.value(i),
            price_unit: price_unit.value(i),
            quantity: quantity.value(i),
            tax_id: tax_id.value(i),
            tax_name: tax_name.value(i).to_string(),
            tax_ids_json: tax_ids_json.value(i).to_string(),
            is_free_item: is_free_item.value(i),
        });
    }
    Ok(rows)
}

pub fn fact_to_batch(rows: &[CleanInvoiceLine], kind: MoveKind) -> Result<RecordBatch, ArrowError> {
    let dates = Date32Array::from_iter_values(rows.iter().map(|r| date_to_days(r.move_date)));
    match kind {
        MoveKind::CustomerInvoice => RecordBatch::try_new(
            SALES_FACT.clone(),
            vec![
                Arc::new(dates),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.move_name.as_str()))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.partner_id))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.partner_name.as_str()))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
                Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price_unit))),
                Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.tax_id))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_ids_json.as_str()))),
            ],
        ),
        MoveKind::VendorBill => RecordBatch::try_new(
            PURCHASE_FACT.clone(),
            vec![
                Arc::new(dates),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.move_name.as_str()))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.partner_id))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.partner_name.as_str()))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
                Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price_unit))),
                Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.quantity))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.tax_id))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_name.as_str()))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_ids_json.as_str()))),
                Arc::new(rows.iter().map(|r| Some(r.is_free_item)).collect::<BooleanArray>()),
            ],
        ),
    }
}

pub fn save_raw(
    layout: &LakeLayout,
    kind: MoveKind,
    date: NaiveDate,
    rows: &[RawInvoiceLine],
) -> io::Result<PathBuf> {
    let path = layout.raw_file(kind.dataset(), date);
    let batch = raw_to_batch(rows, kind).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("saved {} raw {} rows to {}", rows.len(), kind.dataset(), path.display());
    Ok(path)
}

/// Tax id → name mapping from the tax dimension. Missing file is fine;
/// names then stay empty.
fn load_tax_names(layout: &LakeLayout) -> io::Result<FxHashMap<i64, String>> {
    let path = layout.dimension_file("taxes");
    if !path.exists() {
        return Ok(FxHashMap::default());
    }
    let mut names = FxHashMap::default();
    for batch in read_batches(&path)? {
        let ids = i64_col(&batch, "tax_id")?;
        let batch_names = str_col(&batch, "tax_name")?;
        for i in 0..batch.num_rows() {
            if let Some(id) = opt_i64(ids, i) {
                // last writer wins, matching merge order
                names.insert(id, batch_names.value(i).to_string());
            }
        }
    }
    Ok(names)
}

pub fn clean_partition(layout: &LakeLayout, kind: MoveKind, date: NaiveDate) -> io::Result<PathBuf> {
    let raw_path = layout.raw_file(kind.dataset(), date);
    let mut rows = Vec::new();
    for batch in read_batches(&raw_path)? {
        rows.extend(raw_from_batch(&batch, kind)?);
    }
    let tax_names = if kind == MoveKind::VendorBill {
        load_tax_names(layout)?
    } else {
        FxHashMap::default()
    };
    let cleaned = clean(&rows, kind, &tax_names)?;
    let path = layout.clean_file(kind.dataset(), date);
    let batch = clean_to_batch(&cleaned, kind).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("cleaned {} {} rows for {date}", cleaned.len(), kind.dataset());
    Ok(path)
}

pub fn merge_fact(layout: &LakeLayout, kind: MoveKind, date: NaiveDate) -> io::Result<PathBuf> {
    let clean_path = layout.clean_file(kind.dataset(), date);
    let mut rows = Vec::new();
    for batch in read_batches(&clean_path)? {
        rows.extend(clean_from_batch(&batch, kind)?);
    }
    let path = layout.fact_file(kind.fact(), date);
    let batch = fact_to_batch(&rows, kind).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use margo_source::MemoryClient;
    use serde_json::json;

    fn raw(price: Option<f64>, qty: Option<f64>) -> RawInvoiceLine {
        RawInvoiceLine {
            move_id: 500,
            move_name: Some("BILL/001".to_string()),
            move_date: Some("2025-03-15".to_string()),
            partner_id: Some(77),
            partner_name: Some("Acme Foods, Ltd".to_string()),
            move_line_id: 9000,
            product_id: Some(42),
            price_unit: price,
            quantity: qty,
            tax_id: Some(7),
            tax_ids_json: "[7]".to_string(),
        }
    }

    #[test]
    fn extract_joins_moves_and_lines() {
        let mut client = MemoryClient::new();
        client.insert(
            "account.move",
            json!({
                "id": 500,
                "date": "2025-03-15",
                "name": "INV/001",
                "move_type": "out_invoice",
                "state": "posted",
                "partner_id": [30, "Big Customer"],
                "invoice_line_ids": [9000],
            }),
        );
        client.insert(
            "account.move",
            json!({
                "id": 501,
                "date": "2025-03-15",
                "name": "INV/002",
                "move_type": "out_invoice",
                "state": "draft",
                "partner_id": false,
                "invoice_line_ids": [9001],
            }),
        );
        client.insert(
            "account.move.line",
            json!({
                "id": 9000,
                "move_id": [500, "INV/001"],
                "product_id": [42, "Widget A"],
                "price_unit": 12.5,
                "quantity": 2.0,
                "tax_ids": [7, 5, 7],
            }),
        );

        let rows = extract(&mut client, MoveKind::CustomerInvoice, "2025-03-15".parse().unwrap())
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.move_id, 500);
        assert_eq!(row.partner_name.as_deref(), Some("Big Customer"));
        // first of the sorted deduped tax list
        assert_eq!(row.tax_id, Some(5));
        assert_eq!(row.tax_ids_json, "[5,7]");
    }

    #[test]
    fn clean_flags_free_purchase_items() {
        let rows = vec![raw(Some(10.0), Some(3.0)), raw(Some(0.0), Some(3.0)), raw(Some(10.0), Some(0.0))];
        let cleaned = clean(&rows, MoveKind::VendorBill, &FxHashMap::default()).unwrap();
        assert!(!cleaned[0].is_free_item);
        assert!(cleaned[1].is_free_item);
        assert!(cleaned[2].is_free_item);
    }

    #[test]
    fn clean_trims_vendor_name_at_comma() {
        let cleaned = clean(&[raw(Some(1.0), Some(1.0))], MoveKind::VendorBill, &FxHashMap::default())
            .unwrap();
        assert_eq!(cleaned[0].partner_name, "Acme Foods");

        // customer names are untouched
        let cleaned = clean(&[raw(Some(1.0), Some(1.0))], MoveKind::CustomerInvoice, &FxHashMap::default())
            .unwrap();
        assert_eq!(cleaned[0].partner_name, "Acme Foods, Ltd");
    }

    #[test]
    fn clean_resolves_tax_name_for_purchases() {
        let mut tax_names = FxHashMap::default();
        tax_names.insert(7, "VAT 11%".to_string());
        let cleaned = clean(&[raw(Some(1.0), Some(1.0))], MoveKind::VendorBill, &tax_names).unwrap();
        assert_eq!(cleaned[0].tax_name, "VAT 11%");
    }

    #[test]
    fn clean_rejects_bad_date() {
        let mut row = raw(Some(1.0), Some(1.0));
        row.move_date = None;
        assert!(clean(&[row], MoveKind::VendorBill, &FxHashMap::default()).is_err());
    }

    #[test]
    fn purchase_partition_flow_writes_actual_price() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let date: NaiveDate = "2025-03-15".parse().unwrap();

        save_raw(&layout, MoveKind::VendorBill, date, &[raw(Some(10.0), Some(3.0))]).unwrap();
        clean_partition(&layout, MoveKind::VendorBill, date).unwrap();
        let fact_path = merge_fact(&layout, MoveKind::VendorBill, date).unwrap();

        let batches = read_batches(&fact_path).unwrap();
        let price = f64_col(&batches[0], "actual_price").unwrap();
        assert_eq!(price.value(0), 10.0);
        let vendor = str_col(&batches[0], "vendor_name").unwrap();
        assert_eq!(vendor.value(0), "Acme Foods");
    }
}
