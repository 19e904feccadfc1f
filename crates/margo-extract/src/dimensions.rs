//! Incremental dimension refresh
//!
//! Each dimension lives in a single parquet file under star-schema.
//! Refreshes pull rows whose `write_date` moved past the recorded sync
//! point, merge them into the file, then advance the sync point. A force
//! refresh ignores the sync point and replaces the file outright.

use std::io;
use std::sync::{Arc, LazyLock};

use arrow::array::{Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::{Local, NaiveDateTime};
use rustc_hash::FxHashMap;

use margo_core::column::{i64_col, str_col};
use margo_core::watermark::WatermarkStore;
use margo_core::{LakeLayout, merge_dimension, replace_dimension};
use margo_source::{Condition, Domain, SourceClient, SourceError, batch_ids};

use crate::pos::product_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Products,
    Taxes,
    Cashiers,
    Vendors,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Products,
        Dimension::Taxes,
        Dimension::Cashiers,
        Dimension::Vendors,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Taxes => "taxes",
            Self::Cashiers => "cashiers",
            Self::Vendors => "vendors",
        }
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(Self::Products),
            "taxes" => Ok(Self::Taxes),
            "cashiers" => Ok(Self::Cashiers),
            "vendors" => Ok(Self::Vendors),
            other => Err(format!("unknown dimension {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductDim {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub parent_category: String,
    pub brand_id: i64,
    pub brand_name: String,
    pub write_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxDim {
    pub tax_id: i64,
    pub tax_name: String,
    pub write_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CashierDim {
    pub cashier_id: i64,
    pub name: String,
    pub job: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VendorDim {
    pub vendor_id: i64,
    pub name: String,
    pub contact_ids_json: String,
    pub contact_names_json: String,
    pub salesperson_id: i64,
    pub salesperson_name: String,
    pub write_date: String,
}

static PRODUCT_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("product_id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("parent_category", DataType::Utf8, false),
        Field::new("brand_id", DataType::Int64, false),
        Field::new("brand_name", DataType::Utf8, false),
        Field::new("write_date", DataType::Utf8, false),
    ]))
});

static TAX_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("tax_id", DataType::Int64, false),
        Field::new("tax_name", DataType::Utf8, false),
        Field::new("write_date", DataType::Utf8, false),
    ]))
});

static CASHIER_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("cashier_id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("job", DataType::Utf8, false),
    ]))
});

static VENDOR_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("vendor_id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("contact_ids_json", DataType::Utf8, false),
        Field::new("contact_names_json", DataType::Utf8, false),
        Field::new("salesperson_id", DataType::Int64, false),
        Field::new("salesperson_name", DataType::Utf8, false),
        Field::new("write_date", DataType::Utf8, false),
    ]))
});

fn sync_domain(last_sync: Option<NaiveDateTime>) -> Domain {
    match last_sync {
        Some(ts) => vec![Condition::gt(
            "write_date",
            ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        )],
        None => Vec::new(),
    }
}

fn missing_model_ok(result: Result<Vec<margo_source::Record>, SourceError>)
    -> Result<Vec<margo_source::Record>, SourceError>
{
    match result {
        Err(SourceError::MissingModel(model)) => {
            log::warn!("source does not expose {model}, skipping dimension refresh");
            Ok(Vec::new())
        }
        other => other,
    }
}

pub fn fetch_products(
    client: &mut dyn SourceClient,
    last_sync: Option<NaiveDateTime>,
) -> Result<Vec<ProductDim>, SourceError> {
    let domain = sync_domain(last_sync);
    let fields = ["name", "categ_id", "x_studio_brand_id", "write_date"];
    let records = missing_model_ok(client.search_read("product.product", &domain, &fields))?;

    Ok(records
        .iter()
        .filter_map(|rec| {
            let product_id = rec.id()?;
            let info = product_info(rec);
            Some(ProductDim {
                product_id,
                name: info.name.unwrap_or_default(),
                category: info.category.unwrap_or_else(|| "Unknown".to_string()),
                parent_category: info.parent_category.unwrap_or_else(|| "Unknown".to_string()),
                brand_id: info.brand_id.unwrap_or(0),
                brand_name: info.brand_name.unwrap_or_else(|| "Unknown".to_string()),
                write_date: rec.as_str("write_date").unwrap_or_default().to_string(),
            })
        })
        .collect())
}

pub fn fetch_taxes(
    client: &mut dyn SourceClient,
    last_sync: Option<NaiveDateTime>,
) -> Result<Vec<TaxDim>, SourceError> {
    let domain = sync_domain(last_sync);
    let records = missing_model_ok(client.search_read(
        "account.tax",
        &domain,
        &["name", "write_date"],
    ))?;

    Ok(records
        .iter()
        .filter_map(|rec| {
            Some(TaxDim {
                tax_id: rec.id()?,
                tax_name: rec.as_str("name").unwrap_or_default().to_string(),
                write_date: rec.as_str("write_date").unwrap_or_default().to_string(),
            })
        })
        .collect())
}

/// Cashiers are the subset of employees working the registers.
pub fn fetch_cashiers(
    client: &mut dyn SourceClient,
    last_sync: Option<NaiveDateTime>,
) -> Result<Vec<CashierDim>, SourceError> {
    let mut domain = vec![
        Condition::in_names("job_id", &["Cashier", "Team Leader"]),
        Condition::eq("active", true),
    ];
    domain.extend(sync_domain(last_sync));

    let records = missing_model_ok(client.search_read(
        "hr.employee",
        &domain,
        &["name", "job_id"],
    ))?;

    Ok(records
        .iter()
        .filter_map(|rec| {
            Some(CashierDim {
                cashier_id: rec.id()?,
                name: rec.as_str("name").unwrap_or_default().to_string(),
                job: rec
                    .m2o_name("job_id")
                    .or_else(|| rec.as_str("job_id"))
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect())
}

/// Vendors are companies or partners with a supplier rank; child contact
/// names are resolved in bulk and stored as JSON lists.
pub fn fetch_vendors(
    client: &mut dyn SourceClient,
    last_sync: Option<NaiveDateTime>,
) -> Result<Vec<VendorDim>, SourceError> {
    let fields = ["complete_name", "child_ids", "user_id", "write_date"];
    let sync = sync_domain(last_sync);

    let mut companies: Domain = vec![Condition::eq("is_company", true)];
    companies.extend(sync.clone());
    let mut suppliers: Domain = vec![Condition::gt("supplier_rank", 0)];
    suppliers.extend(sync);

    let mut records = missing_model_ok(client.search_read("res.partner", &companies, &fields))?;
    records.extend(missing_model_ok(client.search_read(
        "res.partner",
        &suppliers,
        &fields,
    ))?);

    let mut by_id: FxHashMap<i64, &margo_source::Record> = FxHashMap::default();
    for rec in &records {
        if let Some(id) = rec.id() {
            by_id.entry(id).or_insert(rec);
        }
    }

    let child_ids: Vec<i64> = by_id
        .values()
        .flat_map(|rec| rec.o2m_ids("child_ids"))
        .collect();
    let mut contact_names: FxHashMap<i64, String> = FxHashMap::default();
    for batch in batch_ids(child_ids) {
        for child in client.read("res.partner", &batch, &["name"])? {
            if let Some(id) = child.id() {
                contact_names.insert(id, child.as_str("name").unwrap_or_default().to_string());
            }
        }
    }

    let mut vendors: Vec<VendorDim> = by_id
        .iter()
        .map(|(&vendor_id, rec)| {
            let ids = rec.o2m_ids("child_ids");
            let names: Vec<&str> = ids
                .iter()
                .map(|id| contact_names.get(id).map(String::as_str).unwrap_or(""))
                .collect();
            VendorDim {
                vendor_id,
                name: rec.as_str("complete_name").unwrap_or_default().to_string(),
                contact_ids_json: serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string()),
                contact_names_json: serde_json::to_string(&names)
                    .unwrap_or_else(|_| "[]".to_string()),
                salesperson_id: rec.m2o_id("user_id").unwrap_or(0),
                salesperson_name: rec.m2o_name("user_id").unwrap_or_default().to_string(),
                write_date: rec.as_str("write_date").unwrap_or_default().to_string(),
            }
        })
        .collect();
    vendors.sort_by_key(|v| v.vendor_id);
    Ok(vendors)
}

pub fn products_to_batch(rows: &[ProductDim]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        PRODUCT_SCHEMA.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.category.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.parent_category.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.brand_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.brand_name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.write_date.as_str()))),
        ],
    )
}

pub fn products_from_batch(batch: &RecordBatch) -> io::Result<Vec<ProductDim>> {
    let product_id = i64_col(batch, "product_id")?;
    let name = str_col(batch, "name")?;
    let category = str_col(batch, "category")?;
    let parent_category = str_col(batch, "parent_category")?;
    let brand_id = i64_col(batch, "brand_id")?;
    let brand_name = str_col(batch, "brand_name")?;
    let write_date = str_col(batch, "write_date")?;
    Ok((0..batch.num_rows())
        .map(|i| ProductDim {
            product_id: product_id.value(i),
            name: name.value(i).to_string(),
            category: category.value(i).to_string(),
            parent_category: parent_category.value(i).to_string(),
            brand_id: brand_id.value(i),
            brand_name: brand_name.value(i).to_string(),
            write_date: write_date.value(i).to_string(),
        })
        .collect())
}

pub fn taxes_to_batch(rows: &[TaxDim]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        TAX_SCHEMA.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.tax_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.tax_name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.write_date.as_str()))),
        ],
    )
}

pub fn taxes_from_batch(batch: &RecordBatch) -> io::Result<Vec<TaxDim>> {
    let tax_id = i64_col(batch, "tax_id")?;
    let tax_name = str_col(batch, "tax_name")?;
    let write_date = str_col(batch, "write_date")?;
    Ok((0..batch.num_rows())
        .map(|i| TaxDim {
            tax_id: tax_id.value(i),
            tax_name: tax_name.value(i).to_string(),
            write_date: write_date.value(i).to_string(),
        })
        .collect())
}

pub fn cashiers_to_batch(rows: &[CashierDim]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        CASHIER_SCHEMA.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.cashier_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.job.as_str()))),
        ],
    )
}

pub fn cashiers_from_batch(batch: &RecordBatch) -> io::Result<Vec<CashierDim>> {
    let cashier_id = i64_col(batch, "cashier_id")?;
    let name = str_col(batch, "name")?;
    let job = str_col(batch, "job")?;
    Ok((0..batch.num_rows())
        .map(|i| CashierDim {
            cashier_id: cashier_id.value(i),
            name: name.value(i).to_string(),
            job: job.value(i).to_string(),
        })
        .collect())
}

pub fn vendors_to_batch(rows: &[VendorDim]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        VENDOR_SCHEMA.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.vendor_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.contact_ids_json.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.contact_names_json.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.salesperson_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.salesperson_name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.write_date.as_str()))),
        ],
    )
}

pub fn vendors_from_batch(batch: &RecordBatch) -> io::Result<Vec<VendorDim>> {
    let vendor_id = i64_col(batch, "vendor_id")?;
    let name = str_col(batch, "name")?;
    let contact_ids_json = str_col(batch, "contact_ids_json")?;
    let contact_names_json = str_col(batch, "contact_names_json")?;
    let salesperson_id = i64_col(batch, "salesperson_id")?;
    let salesperson_name = str_col(batch, "salesperson_name")?;
    let write_date = str_col(batch, "write_date")?;
    Ok((0..batch.num_rows())
        .map(|i| VendorDim {
            vendor_id: vendor_id.value(i),
            name: name.value(i).to_string(),
            contact_ids_json: contact_ids_json.value(i).to_string(),
            contact_names_json: contact_names_json.value(i).to_string(),
            salesperson_id: salesperson_id.value(i),
            salesperson_name: salesperson_name.value(i).to_string(),
            write_date: write_date.value(i).to_string(),
        })
        .collect())
}

fn source_io(e: SourceError) -> io::Error {
    io::Error::other(e.to_string())
}

fn apply<T>(
    layout: &LakeLayout,
    dim: Dimension,
    rows: Vec<T>,
    force: bool,
    decode: impl Fn(&RecordBatch) -> io::Result<Vec<T>>,
    encode: impl Fn(&[T]) -> Result<RecordBatch, ArrowError>,
) -> io::Result<usize>
where
    T: Eq + std::hash::Hash + Clone,
{
    let path = layout.dimension_file(dim.name());
    if force {
        replace_dimension(&path, &rows, encode)
    } else {
        merge_dimension(&path, rows, decode, encode)
    }
}

/// Refresh one dimension. With `force` the file is replaced from a full
/// fetch; otherwise only rows changed since the last sync are merged.
/// Returns the number of fetched rows.
pub fn refresh(
    client: &mut dyn SourceClient,
    layout: &LakeLayout,
    marks: &WatermarkStore,
    dim: Dimension,
    force: bool,
) -> io::Result<usize> {
    let last_sync = if force {
        None
    } else {
        marks.dimension_last_sync(dim.name())
    };

    let fetched = match dim {
        Dimension::Products => {
            let rows = fetch_products(client, last_sync).map_err(source_io)?;
            if rows.is_empty() && !force {
                log::info!("no {} changes to sync", dim.name());
                return Ok(0);
            }
            apply(layout, dim, rows.clone(), force, products_from_batch, products_to_batch)?;
            rows.len()
        }
        Dimension::Taxes => {
            let rows = fetch_taxes(client, last_sync).map_err(source_io)?;
            if rows.is_empty() && !force {
                log::info!("no {} changes to sync", dim.name());
                return Ok(0);
            }
            apply(layout, dim, rows.clone(), force, taxes_from_batch, taxes_to_batch)?;
            rows.len()
        }
        Dimension::Cashiers => {
            let rows = fetch_cashiers(client, last_sync).map_err(source_io)?;
            if rows.is_empty() && !force {
                log::info!("no {} changes to sync", dim.name());
                return Ok(0);
            }
            apply(layout, dim, rows.clone(), force, cashiers_from_batch, cashiers_to_batch)?;
            rows.len()
        }
        Dimension::Vendors => {
            let rows = fetch_vendors(client, last_sync).map_err(source_io)?;
            if rows.is_empty() && !force {
                log::info!("no {} changes to sync", dim.name());
                return Ok(0);
            }
            apply(layout, dim, rows.clone(), force, vendors_from_batch, vendors_to_batch)?;
            rows.len()
        }
    };

    marks.set_dimension_last_sync(dim.name(), Local::now().naive_local())?;
    log::info!("synced {fetched} {} rows", dim.name());
    Ok(fetched)
}

/// Refresh several dimensions, returning per-dimension fetched counts.
/// A failing dimension is logged and skipped so one bad model does not
/// block the rest.
pub fn refresh_all(
    client: &mut dyn SourceClient,
    layout: &LakeLayout,
    marks: &WatermarkStore,
    dims: &[Dimension],
    force: bool,
) -> FxHashMap<&'static str, usize> {
    let mut counts = FxHashMap::default();
    for &dim in dims {
        match refresh(client, layout, marks, dim, force) {
            Ok(n) => {
                counts.insert(dim.name(), n);
            }
            Err(e) => {
                log::error!("failed to refresh dimension {}: {e}", dim.name());
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use margo_core::read_batches;
    use margo_source::MemoryClient;
    use serde_json::json;
    use tempfile::TempDir;

    fn seeded() -> MemoryClient {
        let mut client = MemoryClient::new();
        client.insert(
            "product.product",
            json!({
                "id": 42,
                "name": "Widget A",
                "categ_id": [9, "All / Food / Snacks"],
                "x_studio_brand_id": [3, "Acme"],
                "write_date": "2025-03-10 08:00:00",
            }),
        );
        client.insert(
            "account.tax",
            json!({"id": 7, "name": "VAT 11%", "write_date": "2025-03-01 09:00:00"}),
        );
        client.insert(
            "hr.employee",
            json!({"id": 5, "name": "Dana", "job_id": "Cashier", "active": true, "write_date": "2025-03-02 09:00:00"}),
        );
        client.insert(
            "hr.employee",
            json!({"id": 6, "name": "Sam", "job_id": "Manager", "active": true, "write_date": "2025-03-02 09:00:00"}),
        );
        client.insert(
            "res.partner",
            json!({
                "id": 77,
                "complete_name": "Acme Foods",
                "is_company": true,
                "supplier_rank": 2,
                "child_ids": [78],
                "user_id": [4, "Riley"],
                "write_date": "2025-03-03 09:00:00",
            }),
        );
        client.insert(
            "res.partner",
            json!({"id": 78, "name": "Acme Warehouse", "is_company": false, "supplier_rank": 0, "child_ids": [], "write_date": "2025-03-03 09:00:00"}),
        );
        client
    }

    #[test]
    fn product_fetch_splits_category_path() {
        let mut client = seeded();
        let rows = fetch_products(&mut client, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].parent_category, "All");
        assert_eq!(rows[0].category, "Snacks");
        assert_eq!(rows[0].brand_name, "Acme");
    }

    #[test]
    fn cashier_fetch_filters_jobs() {
        let mut client = seeded();
        let rows = fetch_cashiers(&mut client, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Dana");
        assert_eq!(rows[0].job, "Cashier");
    }

    #[test]
    fn vendor_fetch_dedupes_union_and_resolves_contacts() {
        let mut client = seeded();
        let rows = fetch_vendors(&mut client, None).unwrap();
        // partner 77 matches both arms once, partner 78 matches neither
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vendor_id, 77);
        assert_eq!(rows[0].contact_names_json, "[\"Acme Warehouse\"]");
        assert_eq!(rows[0].salesperson_name, "Riley");
    }

    #[test]
    fn incremental_fetch_honors_last_sync() {
        let mut client = seeded();
        let after: NaiveDateTime = "2025-03-05T00:00:00".parse().unwrap();
        let rows = fetch_taxes(&mut client, Some(after)).unwrap();
        assert!(rows.is_empty());

        let before: NaiveDateTime = "2025-02-01T00:00:00".parse().unwrap();
        let rows = fetch_taxes(&mut client, Some(before)).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn refresh_merges_and_advances_sync_point() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let marks = WatermarkStore::new(layout.metadata_dir());
        let mut client = seeded();

        let n = refresh(&mut client, &layout, &marks, Dimension::Taxes, false).unwrap();
        assert_eq!(n, 1);
        assert!(marks.dimension_last_sync("taxes").is_some());

        // nothing changed since the sync point, so nothing is fetched
        let n = refresh(&mut client, &layout, &marks, Dimension::Taxes, false).unwrap();
        assert_eq!(n, 0);

        let batches = read_batches(&layout.dimension_file("taxes")).unwrap();
        assert_eq!(batches[0].num_rows(), 1);
    }

    #[test]
    fn force_refresh_replaces_file() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let marks = WatermarkStore::new(layout.metadata_dir());
        let mut client = seeded();

        refresh(&mut client, &layout, &marks, Dimension::Taxes, false).unwrap();
        // force ignores the sync point and still rewrites the file
        let n = refresh(&mut client, &layout, &marks, Dimension::Taxes, true).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn missing_model_refreshes_to_zero() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let marks = WatermarkStore::new(layout.metadata_dir());
        let mut client = MemoryClient::new();

        let n = refresh(&mut client, &layout, &marks, Dimension::Products, false).unwrap();
        assert_eq!(n, 0);
    }
}
