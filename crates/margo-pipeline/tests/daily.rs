//! Full daily run against an in-memory source

use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;

use margo_core::LakeLayout;
use margo_pipeline::status::{self, PartitionState};
use margo_pipeline::{Dataset, PipelineEnv, daily};
use margo_source::{ConnectionFactory, MemoryClient, SourceClient, SourceError};

struct SeededFactory;

impl ConnectionFactory for SeededFactory {
    fn open(&self) -> Result<Box<dyn SourceClient>, SourceError> {
        Ok(Box::new(seeded()))
    }
}

fn seeded() -> MemoryClient {
    let mut client = MemoryClient::new();
    client.insert(
        "pos.order",
        json!({
            "id": 501,
            "date_order": "2025-03-15 09:30:00",
            "name": "POS/0001",
            "config_id": [2, "Main Register"],
            "employee_id": [5, "Dana"],
            "partner_id": false,
            "amount_total": 25.0,
            "lines": [2001],
            "payment_ids": [7001],
        }),
    );
    client.insert(
        "pos.order.line",
        json!({
            "id": 2001,
            "order_id": [501, "POS/0001"],
            "product_id": [42, "Widget A"],
            "qty": 2.0,
            "price_subtotal_incl": 25.0,
        }),
    );
    client.insert(
        "pos.payment",
        json!({"id": 7001, "amount": 25.0, "payment_method_id": [1, "Cash"]}),
    );
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
        "account.move",
        json!({
            "id": 700,
            "date": "2025-03-15",
            "name": "BILL/001",
            "move_type": "in_invoice",
            "state": "posted",
            "partner_id": [77, "Acme Foods, Ltd"],
            "invoice_line_ids": [9000],
        }),
    );
    client.insert(
        "account.move.line",
        json!({
            "id": 9000,
            "move_id": [700, "BILL/001"],
            "product_id": [42, "Widget A"],
            "price_unit": 10.0,
            "quantity": 5.0,
            "tax_ids": [5],
        }),
    );
    client
}

fn env() -> (TempDir, PipelineEnv) {
    let dir = TempDir::new().unwrap();
    let layout = LakeLayout::new(dir.path());
    let env = PipelineEnv::new(layout, Box::new(SeededFactory));
    (dir, env)
}

#[test]
fn pos_pipeline_advances_watermark() {
    let (_dir, env) = env();
    let date: NaiveDate = "2025-03-15".parse().unwrap();

    assert_eq!(env.marks.last_processed_date(), None);
    daily::run_dataset(&env, Dataset::PosSales, date).unwrap();
    assert_eq!(env.marks.last_processed_date(), Some(date));

    let st = status::dataset_status(&env.layout, Dataset::PosSales, date);
    assert_eq!(st.raw, PartitionState::Ok(1));
    assert_eq!(st.clean, PartitionState::Ok(1));
    assert_eq!(st.fact, PartitionState::Ok(1));
}

#[test]
fn non_pos_pipelines_leave_watermark_alone() {
    let (_dir, env) = env();
    let date: NaiveDate = "2025-03-15".parse().unwrap();

    daily::run_dataset(&env, Dataset::Purchases, date).unwrap();
    assert_eq!(env.marks.last_processed_date(), None);

    let st = status::dataset_status(&env.layout, Dataset::Purchases, date);
    assert_eq!(st.fact, PartitionState::Ok(1));
}

#[test]
fn full_run_feeds_the_profit_engine() {
    let (_dir, env) = env();
    let date: NaiveDate = "2025-03-15".parse().unwrap();

    daily::run_all(&env, date).unwrap();

    // purchase at 10.0 (zero-rated), POS sale qty 2 revenue 25.0
    let path = env.layout.fact_file(margo_profit::profit_lines::FACT, date);
    let batches = margo_core::read_batches(&path).unwrap();
    let lines = margo_profit::profit_lines::from_batch(&batches[0]).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].cogs_tax_in, 20.0);
    assert_eq!(lines[0].gross_profit, 5.0);

    // the product dimension was refreshed as part of the run
    let dims = status::dimension_inventory(&env.layout);
    let products = dims.iter().find(|d| d.name == "products").unwrap();
    assert_eq!(products.state, PartitionState::Ok(1));

    // datasets with no source data still produce (empty) partitions
    let st = status::dataset_status(&env.layout, Dataset::StockQuants, date);
    assert_eq!(st.fact, PartitionState::Empty);
}
