//! Inventory move extraction and the movement-type classifier

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use arrow::array::{BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use chrono::{NaiveDate, NaiveDateTime};
use rustc_hash::{FxHashMap, FxHashSet};

use margo_core::column::{bool_col, date_to_days, f64_col, i64_col, opt_i64, opt_str, str_col};
use margo_core::{LakeLayout, read_batches, write_batch};
use margo_source::{Condition, Record, SourceClient, SourceError, batch_ids, day_window};

pub const DATASET: &str = "inventory_moves";
pub const FACT: &str = "fact_inventory_moves";

/// Everything the classifier needs to know about one executed move line.
#[derive(Debug, Clone, Default)]
pub struct MoveFacts<'a> {
    pub src_usage: Option<&'a str>,
    pub dst_usage: Option<&'a str>,
    pub src_scrap: bool,
    pub dst_scrap: bool,
    pub picking_code: Option<&'a str>,
    pub picking_type_name: Option<&'a str>,
    pub raw_material_production_id: Option<i64>,
    pub production_id: Option<i64>,
    pub qty_done: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub movement_type: Option<&'static str>,
    pub qty_moved: f64,
    pub inventory_adjustment: bool,
    pub manufacturing_order_id: Option<i64>,
}

fn base_movement_type(code: Option<&str>) -> Option<&'static str> {
    match code {
        Some("incoming") => Some("receipt"),
        Some("outgoing") => Some("delivery"),
        Some("internal") => Some("internal_transfer"),
        _ => None,
    }
}

/// Classify a move line.
///
/// Quantity is signed by flow direction: internal source to external
/// destination counts negative, the reverse positive. Type precedence, last
/// rule wins: picking code, manufacturing linkage, inventory-usage
/// adjustment (unless manufacturing), scrap at either endpoint. A "return"
/// picking-type name renames receipts and deliveries afterwards.
pub fn classify(facts: &MoveFacts) -> Classification {
    let src_internal = facts.src_usage == Some("internal");
    let dst_internal = facts.dst_usage == Some("internal");

    let mut qty_moved = facts.qty_done;
    if src_internal && !dst_internal {
        qty_moved = -qty_moved.abs();
    } else if !src_internal && dst_internal {
        qty_moved = qty_moved.abs();
    }

    let mut movement_type = base_movement_type(facts.picking_code);
    let mut manufacturing_order_id = None;
    if let Some(id) = facts.raw_material_production_id {
        movement_type = Some("manufacturing_consumption");
        manufacturing_order_id = Some(id);
    } else if let Some(id) = facts.production_id {
        movement_type = Some("manufacturing_output");
        manufacturing_order_id = Some(id);
    }

    let mut inventory_adjustment = false;
    if facts.src_scrap || facts.dst_scrap {
        movement_type = Some("scrap");
    } else if (facts.src_usage == Some("inventory") || facts.dst_usage == Some("inventory"))
        && manufacturing_order_id.is_none()
    {
        movement_type = Some("adjustment");
        inventory_adjustment = true;
    }

    if let Some(name) = facts.picking_type_name {
        if name.to_lowercase().contains("return") {
            movement_type = match movement_type {
                Some("receipt") => Some("return_from_customer"),
                Some("delivery") => Some("return_to_vendor"),
                other => other,
            };
        }
    }

    Classification {
        movement_type,
        qty_moved,
        inventory_adjustment,
        manufacturing_order_id,
    }
}

#[derive(Debug, Clone)]
pub struct RawMoveLine {
    pub move_id: i64,
    pub move_line_id: i64,
    pub movement_date: Option<String>,
    pub product_id: Option<i64>,
    pub location_src_id: Option<i64>,
    pub location_dest_id: Option<i64>,
    pub qty_moved: f64,
    pub uom_id: Option<i64>,
    pub movement_type: Option<String>,
    pub picking_id: Option<i64>,
    pub picking_type_code: Option<String>,
    pub reference: Option<String>,
    pub origin_reference: Option<String>,
    pub company_id: Option<i64>,
    pub lot_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub source_partner_id: Option<i64>,
    pub destination_partner_id: Option<i64>,
    pub inventory_adjustment: bool,
    pub manufacturing_order_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanMoveLine {
    pub movement_date: NaiveDateTime,
    pub move_id: i64,
    pub move_line_id: i64,
    pub product_id: i64,
    pub location_src_id: i64,
    pub location_dest_id: i64,
    pub qty_moved: f64,
    pub uom_id: i64,
    pub movement_type: String,
    pub picking_id: i64,
    pub picking_type_code: String,
    pub reference: String,
    pub origin_reference: String,
    pub company_id: i64,
    pub lot_id: i64,
    pub owner_id: i64,
    pub source_partner_id: i64,
    pub destination_partner_id: i64,
    pub inventory_adjustment: bool,
    pub manufacturing_order_id: i64,
}

static RAW_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("movement_date", DataType::Utf8, true),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, true),
        Field::new("location_src_id", DataType::Int64, true),
        Field::new("location_dest_id", DataType::Int64, true),
        Field::new("qty_moved", DataType::Float64, false),
        Field::new("uom_id", DataType::Int64, true),
        Field::new("movement_type", DataType::Utf8, true),
        Field::new("picking_id", DataType::Int64, true),
        Field::new("picking_type_code", DataType::Utf8, true),
        Field::new("reference", DataType::Utf8, true),
        Field::new("origin_reference", DataType::Utf8, true),
        Field::new("company_id", DataType::Int64, true),
        Field::new("lot_id", DataType::Int64, true),
        Field::new("owner_id", DataType::Int64, true),
        Field::new("source_partner_id", DataType::Int64, true),
        Field::new("destination_partner_id", DataType::Int64, true),
        Field::new("inventory_adjustment", DataType::Boolean, false),
        Field::new("manufacturing_order_id", DataType::Int64, true),
    ]))
});

static CLEAN_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("movement_date", DataType::Utf8, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("location_src_id", DataType::Int64, false),
        Field::new("location_dest_id", DataType::Int64, false),
        Field::new("qty_moved", DataType::Float64, false),
        Field::new("uom_id", DataType::Int64, false),
        Field::new("movement_type", DataType::Utf8, false),
        Field::new("picking_id", DataType::Int64, false),
        Field::new("picking_type_code", DataType::Utf8, false),
        Field::new("reference", DataType::Utf8, false),
        Field::new("origin_reference", DataType::Utf8, false),
        Field::new("company_id", DataType::Int64, false),
        Field::new("lot_id", DataType::Int64, false),
        Field::new("owner_id", DataType::Int64, false),
        Field::new("source_partner_id", DataType::Int64, false),
        Field::new("destination_partner_id", DataType::Int64, false),
        Field::new("inventory_adjustment", DataType::Boolean, false),
        Field::new("manufacturing_order_id", DataType::Int64, false),
    ]))
});

static FACT_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("move_id", DataType::Int64, false),
        Field::new("move_line_id", DataType::Int64, false),
        Field::new("product_id", DataType::Int64, false),
        Field::new("location_src_id", DataType::Int64, false),
        Field::new("location_dest_id", DataType::Int64, false),
        Field::new("qty_moved", DataType::Float64, false),
        Field::new("movement_type", DataType::Utf8, false),
        Field::new("picking_id", DataType::Int64, false),
        Field::new("reference", DataType::Utf8, false),
        Field::new("origin_reference", DataType::Utf8, false),
        Field::new("company_id", DataType::Int64, false),
        Field::new("lot_id", DataType::Int64, false),
        Field::new("owner_id", DataType::Int64, false),
        Field::new("source_partner_id", DataType::Int64, false),
        Field::new("destination_partner_id", DataType::Int64, false),
        Field::new("inventory_adjustment", DataType::Boolean, false),
        Field::new("manufacturing_order_id", DataType::Int64, false),
    ]))
});

#[derive(Default)]
struct MoveHead {
    name: Option<String>,
    reference: Option<String>,
    picking_id: Option<i64>,
    picking_type_id: Option<i64>,
    origin: Option<String>,
    company_id: Option<i64>,
    raw_material_production_id: Option<i64>,
    production_id: Option<i64>,
}

#[derive(Default)]
struct PickingHead {
    name: Option<String>,
    partner_id: Option<i64>,
    picking_type_id: Option<i64>,
    origin: Option<String>,
    company_id: Option<i64>,
}

#[derive(Default)]
struct PickingType {
    code: Option<String>,
    name: Option<String>,
}

#[derive(Default)]
struct LocationInfo {
    usage: Option<String>,
    scrap: bool,
}

fn read_map<T: Default>(
    client: &mut dyn SourceClient,
    model: &str,
    ids: FxHashSet<i64>,
    candidates: &[&str],
    decode: impl Fn(&Record) -> T,
) -> Result<FxHashMap<i64, T>, SourceError> {
    if ids.is_empty() {
        return Ok(FxHashMap::default());
    }
    let available = match client.available_fields(model, candidates) {
        Ok(fields) => fields,
        Err(SourceError::MissingModel(model)) => {
            log::warn!("source does not expose {model}, continuing without it");
            return Ok(FxHashMap::default());
        }
        Err(e) => return Err(e),
    };
    let fields: Vec<&str> = available.iter().map(String::as_str).collect();

    let mut out = FxHashMap::default();
    for batch in batch_ids(ids) {
        for rec in client.read(model, &batch, &fields)? {
            if let Some(id) = rec.id() {
                out.insert(id, decode(&rec));
            }
        }
    }
    Ok(out)
}

/// Pull and classify one day of executed move lines.
pub fn extract(
    client: &mut dyn SourceClient,
    date: NaiveDate,
) -> Result<Vec<RawMoveLine>, SourceError> {
    let date_field = match client.available_fields("stock.move.line", &["date", "date_done"]) {
        Ok(fields) => fields.first().cloned().unwrap_or_else(|| "date".to_string()),
        Err(SourceError::MissingModel(model)) => {
            log::warn!("source does not expose {model}, skipping inventory extraction");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut domain = day_window(&date_field, date);
    domain.push(Condition::ne("qty_done", 0));
    domain.push(Condition::eq("move_id.state", "done"));

    let line_candidates = [
        date_field.as_str(),
        "move_id",
        "product_id",
        "location_id",
        "location_dest_id",
        "qty_done",
        "product_uom_id",
        "lot_id",
        "owner_id",
        "picking_id",
    ];
    let available = client.available_fields("stock.move.line", &line_candidates)?;
    let line_fields: Vec<&str> = available.iter().map(String::as_str).collect();

    let lines = client.search_read("stock.move.line", &domain, &line_fields)?;
    if lines.is_empty() {
        log::info!("no stock.move.line found for {date}");
        return Ok(Vec::new());
    }

    let mut move_ids = FxHashSet::default();
    let mut picking_ids = FxHashSet::default();
    let mut location_ids = FxHashSet::default();
    for line in &lines {
        move_ids.extend(line.m2o_id("move_id"));
        picking_ids.extend(line.m2o_id("picking_id"));
        location_ids.extend(line.m2o_id("location_id"));
        location_ids.extend(line.m2o_id("location_dest_id"));
    }

    let moves = read_map(
        client,
        "stock.move",
        move_ids,
        &[
            "name",
            "reference",
            "picking_id",
            "picking_type_id",
            "origin",
            "company_id",
            "raw_material_production_id",
            "production_id",
        ],
        |rec| MoveHead {
            name: rec.as_str("name").map(str::to_string),
            reference: rec.as_str("reference").map(str::to_string),
            picking_id: rec.m2o_id("picking_id"),
            picking_type_id: rec.m2o_id("picking_type_id"),
            origin: rec.as_str("origin").map(str::to_string),
            company_id: rec.m2o_id("company_id"),
            raw_material_production_id: rec.m2o_id("raw_material_production_id"),
            production_id: rec.m2o_id("production_id"),
        },
    )?;

    let pickings = read_map(
        client,
        "stock.picking",
        picking_ids,
        &["name", "partner_id", "picking_type_id", "origin", "company_id"],
        |rec| PickingHead {
            name: rec.as_str("name").map(str::to_string),
            partner_id: rec.m2o_id("partner_id"),
            picking_type_id: rec.m2o_id("picking_type_id"),
            origin: rec.as_str("origin").map(str::to_string),
            company_id: rec.m2o_id("company_id"),
        },
    )?;

    let mut picking_type_ids = FxHashSet::default();
    for head in moves.values() {
        picking_type_ids.extend(head.picking_type_id);
    }
    for head in pickings.values() {
        picking_type_ids.extend(head.picking_type_id);
    }
    let picking_types = read_map(
        client,
        "stock.picking.type",
        picking_type_ids,
        &["code", "name"],
        |rec| PickingType {
            code: rec.as_str("code").map(str::to_string),
            name: rec.as_str("name").map(str::to_string),
        },
    )?;

    let locations = read_map(
        client,
        "stock.location",
        location_ids,
        &["usage", "scrap_location", "name"],
        |rec| LocationInfo {
            usage: rec.as_str("usage").map(str::to_string),
            scrap: rec.as_bool("scrap_location").unwrap_or(false),
        },
    )?;

    let empty_move = MoveHead::default();
    let empty_picking = PickingHead::default();
    let mut rows = Vec::with_capacity(lines.len());
    for line in &lines {
        let Some(move_line_id) = line.id() else { continue };
        let Some(move_id) = line.m2o_id("move_id") else {
            continue;
        };
        let qty_done = line.as_f64("qty_done").unwrap_or(0.0);
        if qty_done == 0.0 {
            continue;
        }

        let mv = moves.get(&move_id).unwrap_or(&empty_move);
        let picking_id = line.m2o_id("picking_id").or(mv.picking_id);
        let picking = picking_id
            .and_then(|id| pickings.get(&id))
            .unwrap_or(&empty_picking);

        let src_id = line.m2o_id("location_id");
        let dst_id = line.m2o_id("location_dest_id");
        let src = src_id.and_then(|id| locations.get(&id));
        let dst = dst_id.and_then(|id| locations.get(&id));

        let picking_type = picking
            .picking_type_id
            .or(mv.picking_type_id)
            .and_then(|id| picking_types.get(&id));

        let facts = MoveFacts {
            src_usage: src.and_then(|l| l.usage.as_deref()),
            dst_usage: dst.and_then(|l| l.usage.as_deref()),
            src_scrap: src.is_some_and(|l| l.scrap),
            dst_scrap: dst.is_some_and(|l| l.scrap),
            picking_code: picking_type.and_then(|t| t.code.as_deref()),
            picking_type_name: picking_type.and_then(|t| t.name.as_deref()),
            raw_material_production_id: mv.raw_material_production_id,
            production_id: mv.production_id,
            qty_done,
        };
        let class = classify(&facts);

        let src_internal = facts.src_usage == Some("internal");
        let dst_internal = facts.dst_usage == Some("internal");
        let mut source_partner_id = None;
        let mut destination_partner_id = None;
        if let Some(partner) = picking.partner_id {
            if !src_internal && dst_internal {
                source_partner_id = Some(partner);
            } else if src_internal && !dst_internal {
                destination_partner_id = Some(partner);
            }
        }

        let origin_reference = picking.origin.clone().or_else(|| mv.origin.clone());
        let reference = picking
            .name
            .clone()
            .or_else(|| mv.reference.clone())
            .or_else(|| mv.name.clone())
            .or_else(|| origin_reference.clone());

        rows.push(RawMoveLine {
            move_id,
            move_line_id,
            movement_date: line.as_str(&date_field).map(str::to_string),
            product_id: line.m2o_id("product_id"),
            location_src_id: src_id,
            location_dest_id: dst_id,
            qty_moved: class.qty_moved,
            uom_id: line.m2o_id("product_uom_id"),
            movement_type: class.movement_type.map(str::to_string),
            picking_id,
            picking_type_code: picking_type.and_then(|t| t.code.clone()),
            reference,
            origin_reference,
            company_id: picking.company_id.or(mv.company_id),
            lot_id: line.m2o_id("lot_id"),
            owner_id: line.m2o_id("owner_id"),
            source_partner_id,
            destination_partner_id,
            inventory_adjustment: class.inventory_adjustment,
            manufacturing_order_id: class.manufacturing_order_id,
        });
    }
    log::info!("extracted {} inventory move lines for {date}", rows.len());
    Ok(rows)
}

fn parse_timestamp(raw: &str) -> io::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad movement date {raw:?}: {e}"),
        )
    })
}

/// Validate and null-fill raw move lines.
pub fn clean(rows: &[RawMoveLine]) -> io::Result<Vec<CleanMoveLine>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let movement_date = parse_timestamp(row.movement_date.as_deref().unwrap_or_default())?;
        out.push(CleanMoveLine {
            movement_date,
            move_id: row.move_id,
            move_line_id: row.move_line_id,
            product_id: row.product_id.unwrap_or(0),
            location_src_id: row.location_src_id.unwrap_or(0),
            location_dest_id: row.location_dest_id.unwrap_or(0),
            qty_moved: row.qty_moved,
            uom_id: row.uom_id.unwrap_or(0),
            movement_type: row.movement_type.clone().unwrap_or_default(),
            picking_id: row.picking_id.unwrap_or(0),
            picking_type_code: row.picking_type_code.clone().unwrap_or_default(),
            reference: row.reference.clone().unwrap_or_default(),
            origin_reference: row.origin_reference.clone().unwrap_or_default(),
            company_id: row.company_id.unwrap_or(0),
            lot_id: row.lot_id.unwrap_or(0),
            owner_id: row.owner_id.unwrap_or(0),
            source_partner_id: row.source_partner_id.unwrap_or(0),
            destination_partner_id: row.destination_partner_id.unwrap_or(0),
            inventory_adjustment: row.inventory_adjustment,
            manufacturing_order_id: row.manufacturing_order_id.unwrap_or(0),
        });
    }
    Ok(out)
}

pub fn raw_to_batch(rows: &[RawMoveLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        RAW_SCHEMA.clone(),
        vec![
            Arc::new(rows.iter().map(|r| r.movement_date.as_deref()).collect::<StringArray>()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
            Arc::new(rows.iter().map(|r| r.product_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.location_src_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.location_dest_id).collect::<Int64Array>()),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.qty_moved))),
            Arc::new(rows.iter().map(|r| r.uom_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.movement_type.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.picking_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.picking_type_code.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.reference.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.origin_reference.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.company_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.lot_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.owner_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.source_partner_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| r.destination_partner_id).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| Some(r.inventory_adjustment)).collect::<BooleanArray>()),
            Arc::new(rows.iter().map(|r| r.manufacturing_order_id).collect::<Int64Array>()),
        ],
    )
}

pub fn raw_from_batch(batch: &RecordBatch) -> io::Result<Vec<RawMoveLine>> {
    let movement_date = str_col(batch, "movement_date")?;
    let move_id = i64_col(batch, "move_id")?;
    let move_line_id = i64_col(batch, "move_line_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let location_src_id = i64_col(batch, "location_src_id")?;
    let location_dest_id = i64_col(batch, "location_dest_id")?;
    let qty_moved = f64_col(batch, "qty_moved")?;
    let uom_id = i64_col(batch, "uom_id")?;
    let movement_type = str_col(batch, "movement_type")?;
    let picking_id = i64_col(batch, "picking_id")?;
    let picking_type_code = str_col(batch, "picking_type_code")?;
    let reference = str_col(batch, "reference")?;
    let origin_reference = str_col(batch, "origin_reference")?;
    let company_id = i64_col(batch, "company_id")?;
    let lot_id = i64_col(batch, "lot_id")?;
    let owner_id = i64_col(batch, "owner_id")?;
    let source_partner_id = i64_col(batch, "source_partner_id")?;
    let destination_partner_id = i64_col(batch, "destination_partner_id")?;
    let inventory_adjustment = bool_col(batch, "inventory_adjustment")?;
    let manufacturing_order_id = i64_col(batch, "manufacturing_order_id")?;

    Ok((0..batch.num_rows())
        .map(|i| RawMoveLine {
            move_id: move_id.value(i),
            move_line_id: move_line_id.value(i),
            movement_date: opt_str(movement_date, i),
            product_id: opt_i64(product_id, i),
            location_src_id: opt_i64(location_src_id, i),
            location_dest_id: opt_i64(location_dest_id, i),
            qty_moved: qty_moved.value(i),
            uom_id: opt_i64(uom_id, i),
            movement_type: opt_str(movement_type, i),
            picking_id: opt_i64(picking_id, i),
            picking_type_code: opt_str(picking_type_code, i),
            reference: opt_str(reference, i),
            origin_reference: opt_str(origin_reference, i),
            company_id: opt_i64(company_id, i),
            lot_id: opt_i64(lot_id, i),
            owner_id: opt_i64(owner_id, i),
            source_partner_id: opt_i64(source_partner_id, i),
            destination_partner_id: opt_i64(destination_partner_id, i),
            inventory_adjustment: inventory_adjustment.value(i),
            manufacturing_order_id: opt_i64(manufacturing_order_id, i),
        })
        .collect())
}

pub fn clean_to_batch(rows: &[CleanMoveLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        CLEAN_SCHEMA.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.movement_date.format("%Y-%m-%d %H:%M:%S").to_string()),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.location_src_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.location_dest_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.qty_moved))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.uom_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.movement_type.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.picking_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.picking_type_code.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.reference.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.origin_reference.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.company_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.lot_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.owner_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.source_partner_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.destination_partner_id))),
            Arc::new(rows.iter().map(|r| Some(r.inventory_adjustment)).collect::<BooleanArray>()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.manufacturing_order_id))),
        ],
    )
}

pub fn clean_from_batch(batch: &RecordBatch) -> io::Result<Vec<CleanMoveLine>> {
    let movement_date = str_col(batch, "movement_date")?;
    let move_id = i64_col(batch, "move_id")?;
    let move_line_id = i64_col(batch, "move_line_id")?;
    let product_id = i64_col(batch, "product_id")?;
    let location_src_id = i64_col(batch, "location_src_id")?;
    let location_dest_id = i64_col(batch, "location_dest_id")?;
    let qty_moved = f64_col(batch, "qty_moved")?;
    let uom_id = i64_col(batch, "uom_id")?;
    let movement_type = str_col(batch, "movement_type")?;
    let picking_id = i64_col(batch, "picking_id")?;
    let picking_type_code = str_col(batch, "picking_type_code")?;
    let reference = str_col(batch, "reference")?;
    let origin_reference = str_col(batch, "origin_reference")?;
    let company_id = i64_col(batch, "company_id")?;
    let lot_id = i64_col(batch, "lot_id")?;
    let owner_id = i64_col(batch, "owner_id")?;
    let source_partner_id = i64_col(batch, "source_partner_id")?;
    let destination_partner_id = i64_col(batch, "destination_partner_id")?;
    let inventory_adjustment = bool_col(batch, "inventory_adjustment")?;
    let manufacturing_order_id = i64_col(batch, "manufacturing_order_id")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(CleanMoveLine {
            movement_date: parse_timestamp(movement_date.value(i))?,
            move_id: move_id.value(i),
            move_line_id: move_line_id.value(i),
            product_id: product_id.value(i),
            location_src_id: location_src_id.value(i),
            location_dest_id: location_dest_id.value(i),
            qty_moved: qty_moved.value(i),
            uom_id: uom_id.value(i),
            movement_type: movement_type.value(i).to_string(),
            picking_id: picking_id.value(i),
            picking_type_code: picking_type_code.value(i).to_string(),
            reference: reference.value(i).to_string(),
            origin_reference: origin_reference.value(i).to_string(),
            company_id: company_id.value(i),
            lot_id: lot_id.value(i),
            owner_id: owner_id.value(i),
            source_partner_id: source_partner_id.value(i),
            destination_partner_id: destination_partner_id.value(i),
            inventory_adjustment: inventory_adjustment.value(i),
            manufacturing_order_id: manufacturing_order_id.value(i),
        });
    }
    Ok(rows)
}

pub fn fact_to_batch(rows: &[CleanMoveLine]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        FACT_SCHEMA.clone(),
        vec![
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date_to_days(r.movement_date.date())),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.move_line_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.product_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.location_src_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.location_dest_id))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.qty_moved))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.movement_type.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.picking_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.reference.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.origin_reference.as_str()))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.company_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.lot_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.owner_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.source_partner_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.destination_partner_id))),
            Arc::new(rows.iter().map(|r| Some(r.inventory_adjustment)).collect::<BooleanArray>()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.manufacturing_order_id))),
        ],
    )
}

pub fn save_raw(layout: &LakeLayout, date: NaiveDate, rows: &[RawMoveLine]) -> io::Result<PathBuf> {
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
    let cleaned = clean(&rows)?;
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
