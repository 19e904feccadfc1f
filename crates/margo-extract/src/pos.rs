//! POS order line extraction, cleaning, and fact merge

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{Date32Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::{NaiveDate, NaiveDateTime};
use rustc_hash::{FxHashMap, FxHashSet};

use margo_core::column::{date_to_days, f64_col, i64_col, opt_f64, opt_i64, opt_str, str_col};
use margo_core::{Cache, LakeLayout, read_batches, write_batch};
use margo_source::{Record, SourceClient, SourceError, batch_ids, day_window};

pub const DATASET: &str = "pos_order_lines";

/// Product attributes joined onto sales lines, cached across a run.
#[derive(Debug, Clone, Default)]
pub struct ProductInfo {
    pub name: Option<String>,
    pub category: Option<String>,
    pub parent_category: Option<String>,
    pub brand_id: Option<i64>,
    pub brand_name: Option<String>,
}

/// One extracted line, still carrying source field shapes.
#[derive(Debug, Clone)]
pub struct RawPosLine {
    pub order_date: Option<String>,
    pub order_id: i64,
    pub order_ref: Option<String>,
    pub pos_config_id: Option<i64>,
    pub cashier_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub amount_total: f64,
    pub payment_method_ids: String,
    pub line_id: i64,
    pub product_id: Option<i64>,
    pub qty: Option<f64>,
    pub price_subtotal_incl: Option<f64>,
    pub discount_amount: f64,
    pub product_brand: Option<String>,
    pub product_brand_id: Option<i64>,
    pub product_name: Option<String>,
    pub product_category: Option<String>,
    pub product_parent_category: Option<String>,
}

/// Validated line with the fact contract's typed defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanPosLine {
    pub order_date: NaiveDateTime,
    pub order_id: i64,
    pub order_ref: String,
    pub pos_config_id: i64,
    pub cashier_id: i64,
    pub customer_id: i64,
    pub amount_total: f64,
    pub payment_method_ids: String,
    pub line_id: i64,
    pub product_id: i64,
    pub qty: f64,
    pub price_subtotal_incl: f64,
    pub discount_amount: f64,
    pub product_brand: String,
    pub product_brand_id: i64,
    pub product_name: String,
    pub product_category: String,
    pub product_parent_category: String,
}

static RAW_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("order_date", DataType::Utf8, true),
        Field::new("order_id", DataType::Int64, false),
        Field::new("order_ref", DataType::Utf8, true),
        Field::new("pos_config_id", DataType::Int64, true),
        Field::new("cashier_id", DataType::Int64, true),
        Field::new("customer_id", DataType::Int64, true),
        Field::new("amount_total", DataType::Float64, false),
        Field::new("payment_method_ids", DataType::Utf8, false),
        Field::new("line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, true),
        Field::new("qty", DataType::Float64, true),
        Field::new("price_subtotal_incl", DataType::Float64, true),
        Field::new("discount_amount", DataType::Float64, false),
        Field::new("product_brand", DataType::Utf8, true),
        Field::new("product_brand_id", DataType::Int64, true),
        Field::new("product_name", DataType::Utf8, true),
        Field::new("product_category", DataType::Utf8, true),
        Field::new("product_parent_category", DataType::Utf8, true),
    ]))
});

static CLEAN_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("order_date", DataType::Utf8, false),
        Field::new("order_id", DataType::Int64, false),
        Field::new("order_ref", DataType::Utf8, false),
        Field::new("pos_config_id", DataType::Int64, false),
        Field::new("cashier_id", DataType::Int64, false),
        Field::new("customer_id", DataType::Int64, false),
        Field::new("amount_total", DataType::Float64, false),
        Field::new("payment_method_ids", DataType::Utf8, false),
        Field::new("line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("qty", DataType::Float64, false),
        Field::new("price_subtotal_incl", DataType::Float64, false),
        Field::new("discount_amount", DataType::Float64, false),
        Field::new("product_brand", DataType::Utf8, false),
        Field::new("product_brand_id", DataType::Int64, false),
        Field::new("product_name", DataType::Utf8, false),
        Field::new("product_category", DataType::Utf8, false),
        Field::new("product_parent_category", DataType::Utf8, false),
    ]))
});

static FACT_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("order_id", DataType::Int64, false),
        Field::new("order_ref", DataType::Utf8, false),
        Field::new("pos_config_id", DataType::Int64, false),
        Field::new("cashier_id", DataType::Int64, false),
        Field::new("customer_id", DataType::Int64, false),
        Field::new("payment_method_ids", DataType::Utf8, false),
        Field::new("line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("quantity", DataType::Float64, false),
        Field::new("revenue", DataType::Float64, false),
    ]))
});

pub fn raw_schema() -> Arc<Schema> {
    RAW_SCHEMA.clone()
}

/// Pull one day of POS order lines, payments, and product enrichment.
///
/// Returns an empty set when the POS models are not installed on the
/// source; that is a warning, not a failure.
pub fn extract(
    client: &mut dyn SourceClient,
    products: &dyn Cache<i64, ProductInfo>,
    date: NaiveDate,
) -> Result<Vec<RawPosLine>, SourceError> {
    let order_fields = [
        "date_order",
        "config_id",
        "employee_id",
        "partner_id",
        "name",
        "amount_total",
        "lines",
        "payment_ids",
    ];
    let orders = match client.search_read("pos.order", &day_window("date_order", date), &order_fields)
    {
        Ok(orders) => orders,
        Err(SourceError::MissingModel(model)) => {
            log::warn!("source does not expose {model}, skipping POS extraction");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    if orders.is_empty() {
        log::info!("no pos.order found for {date}");
        return Ok(Vec::new());
    }

    let mut line_ids: FxHashSet<i64> = FxHashSet::default();
    let mut payment_to_order: FxHashMap<i64, i64> = FxHashMap::default();
    for order in &orders {
        let Some(order_id) = order.id() else { continue };
        line_ids.extend(order.o2m_ids("lines"));
        for pid in order.o2m_ids("payment_ids") {
            payment_to_order.insert(pid, order_id);
        }
    }
    if line_ids.is_empty() {
        log::info!("no pos.order.line ids found for {date}");
        return Ok(Vec::new());
    }

    let line_fields = ["id", "order_id", "product_id", "qty", "price_subtotal_incl", "x_studio_discount_amount"];
    let mut lines_by_order: FxHashMap<i64, Vec<Record>> = FxHashMap::default();
    let mut product_ids: FxHashSet<i64> = FxHashSet::default();
    for batch in batch_ids(line_ids) {
        for line in client.read("pos.order.line", &batch, &line_fields)? {
            let Some(order_id) = line.m2o_id("order_id") else {
                continue;
            };
            if let Some(product_id) = line.m2o_id("product_id") {
                product_ids.insert(product_id);
            }
            lines_by_order.entry(order_id).or_default().push(line);
        }
    }

    let methods_by_order = read_payment_methods(client, payment_to_order)?;
    let product_data = read_products(client, products, product_ids)?;

    let mut rows = Vec::new();
    for order in &orders {
        let Some(order_id) = order.id() else { continue };
        let Some(order_lines) = lines_by_order.get(&order_id) else {
            continue;
        };
        let payment_method_ids = methods_by_order
            .get(&order_id)
            .cloned()
            .unwrap_or_else(|| "[]".to_string());

        for line in order_lines {
            let Some(product_id) = line.m2o_id("product_id") else {
                continue;
            };
            let product = product_data.get(&product_id).cloned().unwrap_or_default();
            rows.push(RawPosLine {
                order_date: order.as_str("date_order").map(str::to_string),
                order_id,
                order_ref: order.as_str("name").map(str::to_string),
                pos_config_id: order.m2o_id("config_id"),
                cashier_id: order.m2o_id("employee_id"),
                customer_id: order.m2o_id("partner_id"),
                amount_total: order.as_f64("amount_total").unwrap_or(0.0),
                payment_method_ids: payment_method_ids.clone(),
                line_id: line.id().unwrap_or(0),
                product_id: Some(product_id),
                qty: line.as_f64("qty"),
                price_subtotal_incl: line.as_f64("price_subtotal_incl"),
                discount_amount: line.as_f64("x_studio_discount_amount").unwrap_or(0.0),
                product_brand: Some(product.brand_name.unwrap_or_else(|| "Unknown".to_string())),
                product_brand_id: product.brand_id,
                product_name: product.name,
                product_category: product.category,
                product_parent_category: product.parent_category,
            });
        }
    }
    log::info!("extracted {} POS lines for {date}", rows.len());
    Ok(rows)
}

/// Positive payments per order, reduced to a sorted JSON id list.
fn read_payment_methods(
    client: &mut dyn SourceClient,
    payment_to_order: FxHashMap<i64, i64>,
) -> Result<FxHashMap<i64, String>, SourceError> {
    let mut methods_by_order: FxHashMap<i64, FxHashSet<i64>> = FxHashMap::default();
    let payment_fields = ["id", "amount", "payment_method_id"];
    for batch in batch_ids(payment_to_order.keys().copied()) {
        let payments = match client.read("pos.payment", &batch, &payment_fields) {
            Ok(payments) => payments,
            Err(SourceError::MissingModel(model)) => {
                log::warn!("source does not expose {model}, payment methods omitted");
                break;
            }
            Err(e) => return Err(e),
        };
        for payment in payments {
            let Some(pay_id) = payment.id() else { continue };
            let Some(&order_id) = payment_to_order.get(&pay_id) else {
                continue;
            };
            if payment.as_f64("amount").unwrap_or(0.0) <= 0.0 {
                continue;
            }
            if let Some(method_id) = payment.m2o_id("payment_method_id") {
                methods_by_order.entry(order_id).or_default().insert(method_id);
            }
        }
    }

    Ok(methods_by_order
        .into_iter()
        .map(|(order_id, methods)| {
            let mut sorted: Vec<i64> = methods.into_iter().collect();
            sorted.sort_unstable();
            (order_id, serde_json::to_string(&sorted).unwrap_or_else(|_| "[]".to_string()))
        })
        .collect())
}

/// Bulk product enrichment through the injected cache.
fn read_products(
    client: &mut dyn SourceClient,
    cache: &dyn Cache<i64, ProductInfo>,
    product_ids: FxHashSet<i64>,
) -> Result<FxHashMap<i64, ProductInfo>, SourceError> {
    let mut found: FxHashMap<i64, ProductInfo> = FxHashMap::default();
    let mut uncached: FxHashSet<i64> = FxHashSet::default();
    for pid in product_ids {
        match cache.get(&pid) {
            Some(info) => {
                found.insert(pid, info);
            }
            None => {
                uncached.insert(pid);
            }
        }
    }

    let fields = ["id", "name", "categ_id", "x_studio_brand_id"];
    for batch in batch_ids(uncached) {
        for product in client.read("product.product", &batch, &fields)? {
            let Some(pid) = product.id() else { continue };
            let info = product_info(&product);
            cache.put(pid, info.clone());
            found.insert(pid, info);
        }
    }
    Ok(found)
}

pub(crate) fn product_info(product: &Record) -> ProductInfo {
    // Category paths come back as "Parent / ... / Leaf"
    let (parent_category, category) = match product.m2o_name("categ_id") {
        Some(path) => {
            let segments: Vec<&str> = path
                .split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            (
                segments.first().map(|s| (*s).to_string()),
                segments.last().map(|s| (*s).to_string()),
            )
        }
        None => (None, None),
    };
    ProductInfo {
        name: product.as_str("name").map(str::to_string),
        category,
        parent_category,
        brand_id: product.m2o_id("x_studio_brand_id"),
        brand_name: product.m2o_name("x_studio_brand_id").map(str::to_string),
    }
}

/// Validate and null-fill raw lines.
///
/// Rows with no product, zero/absent quantity, or absent revenue are
/// dropped; a malformed order timestamp is a hard validation error.
pub fn clean(rows: &[RawPosLine]) -> io::Result<Vec<CleanPosLine>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(product_id), Some(qty), Some(price)) =
            (row.product_id, row.qty, row.price_subtotal_incl)
        else {
            continue;
        };
        if qty == 0.0 {
            continue;
        }
        let raw_date = row.order_date.as_deref().unwrap_or_default();
        let order_date = NaiveDateTime::parse_from_str(raw_date, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad order timestamp {raw_date:?}: {e}"),
                )
            })?;
        out.push(CleanPosLine {
            order_date,
            order_id: row.order_id,
            order_ref: row.order_ref.clone().unwrap_or_default(),
            pos_config_id: row.pos_config_id.unwrap_or(0),
            cashier_id: row.cashier_id.unwrap_or(0),
            customer_id: row.customer_id.unwrap_or(0),
            amount_total: row.amount_total,
            payment_method_ids: row.payment_method_ids.clone(),
            line_id: row.line_id,
            product_id,
            qty,
            price_subtotal_incl: price,
            discount_amount: row.discount_amount,
            product_brand: row.product_brand.clone().unwrap_or_else(|| "Unknown".to_string()),
            product_brand_id: row.product_brand_id.unwrap_or(0),
            product_name: row.product_name.clone().unwrap_or_default(),
            product_category: row.product_category.clone().unwrap_or_else(|| "Unknown".to_string()),
            product_parent_category: row
                .product_parent_category
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        });
    }
    Ok(out)
}

pub fn raw_to_batch(rows: &[RawPosLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        RAW_SCHEMA.clone(),
        vec![
            Arc::new(rows.iter().map(|r| r.order_date.as_deref()).collect::<StringArray>()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.order_id))),
            Arc::new(rows.iter().map(|r| r.order_ref.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.pos_config_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.cashier_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.customer_id).collect::<Int64Array>()),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.amount_total))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.payment_method_ids.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.line_id))),
            Arc::new(rows.iter().map(|r| r.product_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.qty).collect::<Float64Array>()),
            Arc::new(rows.iter().map(|r| r.price_subtotal_incl).collect::<Float64Array>()),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.discount_amount))),
            Arc::new(rows.iter().map(|r| r.product_brand.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.product_brand_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.product_name.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.product_category.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.product_parent_category.as_deref()).collect::<StringArray>()),
        ],
    )
}

pub fn raw_from_batch(batch: &RecordBatch) -> io::Result<Vec<RawPosLine>> {
    let order_date = str_col(batch, "order_date")?;
    let order_id = i64_col(batch, "order_id")?;
    let order_ref = str_col(batch, "order_ref")?;
    let pos_config_id = i64_col(batch, "pos_config_id")?;
    let cashier_id = i64_col(batch, "cashier_id")?;
    let customer_id = i64_col(batch, "customer_id")?;
    let amount_total = f64_col(batch, "amount_total")?;
    let payment_method_ids = str_col(batch, "payment_method_ids")?;
    let line_id = i64_col(batch, "line_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let qty = f64_col(batch, "qty")?;
    let price = f64_col(batch, "price_subtotal_incl")?;
    let discount = f64_col(batch, "discount_amount")?;
    let brand = str_col(batch, "product_brand")?;
    let brand_id = i64_col(batch, "product_brand_id")?;
    let name = str_col(batch, "product_name")?;
    let category = str_col(batch, "product_category")?;
    let parent_category = str_col(batch, "product_parent_category")?;

    Ok((0..batch.num_rows())
        .map(|i| RawPosLine {
            order_date: opt_str(order_date, i),
            order_id: order_id.value(i),
            order_ref: opt_str(order_ref, i),
            pos_config_id: opt_i64(pos_config_id, i),
            cashier_id: opt_i64(cashier_id, i),
            customer_id: opt_i64(customer_id, i),
            amount_total: amount_total.value(i),
            payment_method_ids: payment_method_ids.value(i).to_string(),
            line_id: line_id.value(i),
            product_id: opt_i64(product_id, i),
            qty: opt_f64(qty, i),
            price_subtotal_incl: opt_f64(price, i),
            discount_amount: discount.value(i),
            product_brand: opt_str(brand, i),
            product_brand_id: opt_i64(brand_id, i),
            product_name: opt_str(name, i),
            product_category: opt_str(category, i),
            product_parent_category: opt_str(parent_category, i),
        })
        .collect())
}

pub fn clean_to_batch(rows: &[CleanPosLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        CLEAN_SCHEMA.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.order_date.format("%Y-%m-%d %H:%M:%S").to_string()),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.order_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.order_ref.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.pos_config_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.cashier_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.customer_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.amount_total))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.payment_method_ids.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.line_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.qty))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price_subtotal_incl))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.discount_amount))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.product_brand.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_brand_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.product_name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.product_category.as_str()))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.product_parent_category.as_str()),
            )),
        ],
    )
}

pub fn clean_from_batch(batch: &RecordBatch) -> io::Result<Vec<CleanPosLine>> {
    let order_date = str_col(batch, "order_date")?;
    let order_id = i64_col(batch, "order_id")?;
    let order_ref = str_col(batch, "order_ref")?;
    let pos_config_id = i64_col(batch, "pos_config_id")?;
    let cashier_id = i64_col(batch, "cashier_id")?;
    let customer_id = i64_col(batch, "customer_id")?;
    let amount_total = f64_col(batch, "amount_total")?;
    let payment_method_ids = str_col(batch, "payment_method_ids")?;
    let line_id = i64_col(batch, "line_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let qty = f64_col(batch, "qty")?;
    let price = f64_col(batch, "price_subtotal_incl")?;
    let discount = f64_col(batch, "discount_amount")?;
    let brand = str_col(batch, "product_brand")?;
    let brand_id = i64_col(batch, "product_brand_id")?;
    let name = str_col(batch, "product_name")?;
    let category = str_col(batch, "product_category")?;
    let parent_category = str_col(batch, "product_parent_category")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let ts = order_date.value(i);
        let parsed = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("bad order timestamp {ts:?}: {e}"))
        })?;
        rows.push(CleanPosLine {
            order_date: parsed,
            order_id: order_id.value(i),
            order_ref: order_ref.value(i).to_string(),
            pos_config_id: pos_config_id.value(i),
            cashier_id: cashier_id.value(i),
            customer_id: customer_id.value(i),
            amount_total: amount_total.value(i),
            payment_method_ids: payment_method_ids.value(i).to_string(),
            line_id: line_id.value(i),
            product_id: product_id.value(i),
            qty: qty.value(i),
            price_subtotal_incl: price.value(i),
            discount_amount: discount.value(i),
            product_brand: brand.value(i).to_string(),
            product_brand_id: brand_id.value(i),
            product_name: name.value(i).to_string(),
            product_category: category.value(i).to_string(),
            product_parent_category: parent_category.value(i).to_string(),
        });
    }
    Ok(rows)
}

pub fn fact_to_batch(rows: &[CleanPosLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        FACT_SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date_to_days(r.order_date.date())),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.order_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.order_ref.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.pos_config_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.cashier_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.customer_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.payment_method_ids.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.line_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.qty))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price_subtotal_incl))),
        ],
    )
}

/// Write the raw partition for a date, replacing any previous run.
pub fn save_raw(layout: &LakeLayout, date: NaiveDate, rows: &[RawPosLine]) -> io::Result<PathBuf> {
    let path = layout.raw_file(DATASET, date);
    let batch = raw_to_batch(rows).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("saved {} raw POS rows to {}", rows.len(), path.display());
    Ok(path)
}

/// Read the raw partition, clean it, and write the clean partition.
pub fn clean_partition(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let raw_path = layout.raw_file(DATASET, date);
    let mut rows = Vec::new();
    for batch in read_batches(&raw_path)? {
        rows.extend(raw_from_batch(&batch)?);
    }
    let cleaned = clean(&rows)?;
    let path = layout.clean_file(DATASET, date);
    let batch = clean_to_batch(&cleaned).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("cleaned {} of {} POS rows for {date}", cleaned.len(), rows.len());
    Ok(path)
}

/// Project the clean partition into the `fact_sales` partition.
pub fn merge_fact(layout: &LakeLayout, date: NaiveDate) -> io::Result<PathBuf> {
    let clean_path = layout.clean_file(DATASET, date);
    let mut rows = Vec::new();
    for batch in read_batches(&clean_path)? {
        rows.extend(clean_from_batch(&batch)?);
    }
    let path = layout.fact_file("fact_sales", date);
    let batch = fact_to_batch(&rows).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use margo_core::MemoryCache;
    use margo_source::MemoryClient;
    use serde_json::json;
    use std::time::Duration;

    fn raw_line(product_id: Option<i64>, qty: Option<f64>, price: Option<f64>) -> RawPosLine {
        RawPosLine {
            order_date: Some("2025-03-15 09:30:00".to_string()),
            order_id: 1,
            order_ref: Some("POS/001".to_string()),
            pos_config_id: Some(1),
            cashier_id: Some(7),
            customer_id: None,
            amount_total: 25.0,
            payment_method_ids: "[2]".to_string(),
            line_id: 10,
            product_id,
            qty,
            price_subtotal_incl: price,
            discount_amount: 0.0,
            product_brand: None,
            product_brand_id: None,
            product_name: Some("Widget".to_string()),
            product_category: None,
            product_parent_category: None,
        }
    }

    fn seeded_client() -> MemoryClient {
        let mut client = MemoryClient::new();
        client.insert(
            "pos.order",
            json!({
                "id": 1,
                "date_order": "2025-03-15 09:30:00",
                "config_id": [1, "Shop"],
                "employee_id": [7, "Dana"],
                "partner_id": false,
                "name": "POS/001",
                "amount_total": 25.0,
                "lines": [10, 11],
                "payment_ids": [100, 101],
            }),
        );
        client.insert(
            "pos.order.line",
            json!({
                "id": 10,
                "order_id": [1, "POS/001"],
                "product_id": [42, "Widget A"],
                "qty": 2.0,
                "price_subtotal_incl": 25.0,
                "x_studio_discount_amount": 0.0,
            }),
        );
        client.insert(
            "pos.order.line",
            json!({
                "id": 11,
                "order_id": [1, "POS/001"],
                "product_id": false,
                "qty": 1.0,
                "price_subtotal_incl": 5.0,
                "x_studio_discount_amount": 0.0,
            }),
        );
        client.insert(
            "pos.payment",
            json!({"id": 100, "amount": 20.0, "payment_method_id": [2, "Cash"]}),
        );
        client.insert(
            "pos.payment",
            json!({"id": 101, "amount": -20.0, "payment_method_id": [3, "Refund"]}),
        );
        client.insert(
            "product.product",
            json!({
                "id": 42,
                "name": "Widget A",
                "categ_id": [5, "All / Food / Snacks"],
                "x_studio_brand_id": [9, "Acme"],
            }),
        );
        client
    }

    #[test]
    fn extract_assembles_line_grain_rows() {
        let mut client = seeded_client();
        let cache: MemoryCache<i64, ProductInfo> = MemoryCache::new(Duration::from_secs(60));
        let date = "2025-03-15".parse().unwrap();

        let rows = extract(&mut client, &cache, date).unwrap();
        // Line 11 has no product and is skipped at extraction
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.order_id, 1);
        assert_eq!(row.product_id, Some(42));
        assert_eq!(row.cashier_id, Some(7));
        assert_eq!(row.product_name.as_deref(), Some("Widget A"));
        assert_eq!(row.product_parent_category.as_deref(), Some("All"));
        assert_eq!(row.product_category.as_deref(), Some("Snacks"));
        assert_eq!(row.product_brand.as_deref(), Some("Acme"));
        // Negative payment 101 excluded
        assert_eq!(row.payment_method_ids, "[2]");
        // Product landed in the cache
        assert!(cache.get(&42).is_some());
    }

    #[test]
    fn extract_missing_model_degrades_to_empty() {
        let mut client = MemoryClient::new();
        let cache: MemoryCache<i64, ProductInfo> = MemoryCache::new(Duration::from_secs(60));
        let rows = extract(&mut client, &cache, "2025-03-15".parse().unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn clean_drops_invalid_rows() {
        let rows = vec![
            raw_line(Some(42), Some(2.0), Some(25.0)),
            raw_line(None, Some(1.0), Some(5.0)),
            raw_line(Some(42), Some(0.0), Some(5.0)),
            raw_line(Some(42), None, Some(5.0)),
            raw_line(Some(42), Some(1.0), None),
        ];
        let cleaned = clean(&rows).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].product_id, 42);
        assert_eq!(cleaned[0].product_brand, "Unknown");
    }

    #[test]
    fn clean_rejects_bad_timestamp() {
        let mut row = raw_line(Some(42), Some(2.0), Some(25.0));
        row.order_date = Some("not a date".to_string());
        assert!(clean(&[row]).is_err());
    }

    #[test]
    fn raw_roundtrip_through_batch() {
        let rows = vec![raw_line(Some(42), Some(2.0), Some(25.0)), raw_line(None, None, None)];
        let batch = raw_to_batch(&rows).unwrap();
        let back = raw_from_batch(&batch).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].product_id, Some(42));
        assert_eq!(back[1].product_id, None);
        assert_eq!(back[1].qty, None);
    }

    #[test]
    fn partition_flow_raw_clean_fact() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let date: NaiveDate = "2025-03-15".parse().unwrap();

        let rows = vec![raw_line(Some(42), Some(2.0), Some(25.0)), raw_line(None, Some(1.0), Some(5.0))];
        save_raw(&layout, date, &rows).unwrap();
        clean_partition(&layout, date).unwrap();
        let fact_path = merge_fact(&layout, date).unwrap();

        let batches = read_batches(&fact_path).unwrap();
        assert_eq!(batches[0].num_rows(), 1);
        let revenue = f64_col(&batches[0], "revenue").unwrap();
        assert_eq!(revenue.value(0), 25.0);
    }
}
