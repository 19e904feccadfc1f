//! Per-date pipelines: Extract → SaveRaw → Clean → Merge

use std::time::Duration;

use chrono::NaiveDate;

use margo_core::cache::MemoryCache;
use margo_core::watermark::WatermarkStore;
use margo_core::{LakeLayout, MAX_RETRIES, retry_with_backoff};
use margo_extract::dimensions::{self, Dimension};
use margo_extract::pos::ProductInfo;
use margo_extract::{MoveKind, inventory, invoices, pos, stock};
use margo_source::{ConnectionFactory, WorkerContext};

use crate::dataset::Dataset;
use crate::error::PipelineError;

/// Shared state for every pipeline run: the lake layout, the source
/// connection factory, the cross-run product cache, and the watermarks.
pub struct PipelineEnv {
    pub layout: LakeLayout,
    pub factory: Box<dyn ConnectionFactory>,
    pub products: MemoryCache<i64, ProductInfo>,
    pub marks: WatermarkStore,
}

const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(3600);

impl PipelineEnv {
    pub fn new(layout: LakeLayout, factory: Box<dyn ConnectionFactory>) -> Self {
        let marks = WatermarkStore::new(layout.metadata_dir());
        Self {
            layout,
            factory,
            products: MemoryCache::new(PRODUCT_CACHE_TTL),
            marks,
        }
    }
}

fn refresh_dimensions(
    env: &PipelineEnv,
    ctx: &mut WorkerContext,
    dims: &[Dimension],
) -> Result<(), PipelineError> {
    let client = ctx.client()?;
    dimensions::refresh_all(client, &env.layout, &env.marks, dims, false);
    Ok(())
}

/// Run one dataset's pipeline for one date. Extraction is retried with
/// exponential backoff on transient source errors; validation and storage
/// failures propagate immediately. The POS merge is the step that advances
/// `last_processed_date`.
pub fn run_dataset(
    env: &PipelineEnv,
    dataset: Dataset,
    date: NaiveDate,
) -> Result<(), PipelineError> {
    let spec = dataset.spec();
    log::info!("starting {} pipeline for {date}", spec.label);
    let mut ctx = WorkerContext::new(&*env.factory);

    match dataset {
        Dataset::PosSales => {
            let rows = retry_with_backoff(spec.dataset, MAX_RETRIES, || {
                let client = ctx.client()?;
                pos::extract(client, &env.products, date)
            })?;
            pos::save_raw(&env.layout, date, &rows)?;
            pos::clean_partition(&env.layout, date)?;
            pos::merge_fact(&env.layout, date)?;
            env.marks.set_last_processed_date(date)?;
        }
        Dataset::InvoiceSales | Dataset::Purchases => {
            let kind = if dataset == Dataset::Purchases {
                MoveKind::VendorBill
            } else {
                MoveKind::CustomerInvoice
            };
            let rows = retry_with_backoff(spec.dataset, MAX_RETRIES, || {
                let client = ctx.client()?;
                invoices::extract(client, kind, date)
            })?;
            invoices::save_raw(&env.layout, kind, date, &rows)?;
            invoices::clean_partition(&env.layout, kind, date)?;
            invoices::merge_fact(&env.layout, kind, date)?;
        }
        Dataset::InventoryMoves => {
            // moves join against the product dimension, refresh it first
            refresh_dimensions(env, &mut ctx, &[Dimension::Products])?;
            let rows = retry_with_backoff(spec.dataset, MAX_RETRIES, || {
                let client = ctx.client()?;
                inventory::extract(client, date)
            })?;
            inventory::save_raw(&env.layout, date, &rows)?;
            inventory::clean_partition(&env.layout, date)?;
            inventory::merge_fact(&env.layout, date)?;
        }
        Dataset::StockQuants => {
            refresh_dimensions(env, &mut ctx, &[Dimension::Products])?;
            let rows = retry_with_backoff(spec.dataset, MAX_RETRIES, || {
                let client = ctx.client()?;
                stock::extract(client, date)
            })?;
            stock::save_raw(&env.layout, date, &rows)?;
            stock::clean_partition(&env.layout, date)?;
            stock::merge_fact(&env.layout, date)?;
        }
    }
    log::info!("finished {} pipeline for {date}", spec.label);
    Ok(())
}

/// The four cost-attribution stages in order.
pub fn run_profit(env: &PipelineEnv, date: NaiveDate) -> Result<(), PipelineError> {
    margo_profit::engine::run(&env.layout, date)?;
    Ok(())
}

/// Full daily run: refresh all dimensions, then every dataset, then the
/// profit engine. Purchases run before the profit stages so the day's cost
/// events are visible to its own sales.
pub fn run_all(env: &PipelineEnv, date: NaiveDate) -> Result<(), PipelineError> {
    let mut ctx = WorkerContext::new(&*env.factory);
    refresh_dimensions(env, &mut ctx, &Dimension::ALL)?;
    drop(ctx);

    for dataset in Dataset::ALL {
        run_dataset(env, dataset, date)?;
    }
    run_profit(env, date)
}
