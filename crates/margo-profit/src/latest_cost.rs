//! Stage 2: latest known cost per product as of a date

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use margo_core::{LakeLayout, read_batches, write_batch};

use crate::cost_events::{self, CostEvent};

pub const FACT: &str = "fact_product_cost_latest_daily";

fn partition_component(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.parse().ok()
}

/// Dates of all partitions present under a fact base directory.
pub(crate) fn partition_dates(base: &Path) -> io::Result<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    if !base.exists() {
        return Ok(dates);
    }
    for year_entry in fs::read_dir(base)? {
        let year_entry = year_entry?;
        let year_name = year_entry.file_name().to_string_lossy().to_string();
        let Some(year) = partition_component(&year_name, "year=") else {
            continue;
        };
        for month_entry in fs::read_dir(year_entry.path())? {
            let month_entry = month_entry?;
            let month_name = month_entry.file_name().to_string_lossy().to_string();
            let Some(month) = partition_component(&month_name, "month=") else {
                continue;
            };
            for day_entry in fs::read_dir(month_entry.path())? {
                let day_name = day_entry?.file_name().to_string_lossy().to_string();
                let Some(day) = partition_component(&day_name, "day=") else {
                    continue;
                };
                if let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day) {
                    dates.push(date);
                }
            }
        }
    }
    dates.sort_unstable();
    Ok(dates)
}

/// Latest cost per product as of `as_of`: the cost event with the greatest
/// date ≤ `as_of`, ties broken by highest source_move_id. Scans every
/// cost-event partition up to the target date so costs carry forward
/// across days with no purchases.
pub fn build(layout: &LakeLayout, as_of: NaiveDate) -> io::Result<Vec<CostEvent>> {
    let base = layout.fact_base(cost_events::FACT);
    let mut latest: FxHashMap<i64, CostEvent> = FxHashMap::default();

    for date in partition_dates(&base)? {
        if date > as_of {
            break;
        }
        let path = layout.fact_file(cost_events::FACT, date);
        if !path.exists() {
            continue;
        }
        for batch in read_batches(&path)? {
            for event in cost_events::from_batch(&batch)? {
                let entry = latest.entry(event.product_id);
                match entry {
                    std::collections::hash_map::Entry::Occupied(mut slot) => {
                        let current = slot.get();
                        if (event.date, event.source_move_id)
                            > (current.date, current.source_move_id)
                        {
                            slot.insert(event);
                        }
                    }
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(event);
                    }
                }
            }
        }
    }

    let mut rows: Vec<CostEvent> = latest
        .into_values()
        .map(|event| CostEvent {
            // the snapshot row is stamped with the as-of date; the event
            // date is no longer meaningful once carried forward
            date: as_of,
            ..event
        })
        .collect();
    rows.sort_by_key(|r| r.product_id);
    Ok(rows)
}

/// Build and persist the latest-cost snapshot for `as_of`.
pub fn update(layout: &LakeLayout, as_of: NaiveDate) -> io::Result<PathBuf> {
    let rows = build(layout, as_of)?;
    let path = layout.fact_file(FACT, as_of);
    let batch = cost_events::to_batch(&rows).map_err(io::Error::other)?;
    write_batch(&batch, &path)?;
    log::info!("latest-cost snapshot for {as_of}: {} products", rows.len());
    Ok(path)
}

/// Read a persisted snapshot back as a product → cost map.
pub fn load(layout: &LakeLayout, as_of: NaiveDate) -> io::Result<FxHashMap<i64, f64>> {
    let path = layout.fact_file(FACT, as_of);
    let mut costs = FxHashMap::default();
    if !path.exists() {
        log::warn!("no latest-cost snapshot for {as_of}");
        return Ok(costs);
    }
    for batch in read_batches(&path)? {
        for event in cost_events::from_batch(&batch)? {
            costs.insert(event.product_id, event.cost_unit_tax_in);
        }
    }
    Ok(costs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_purchases;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn carries_cost_forward_and_prefers_newer_events() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());

        write_purchases(&layout, day("2025-03-10"), &[(101, 1, 10.0, 5.0, 5)]);
        write_purchases(&layout, day("2025-03-12"), &[(102, 1, 11.0, 5.0, 5)]);
        cost_events::update(&layout, day("2025-03-10")).unwrap();
        cost_events::update(&layout, day("2025-03-12")).unwrap();

        // no purchases on the 15th, the cost of the 12th carries forward
        let rows = build(&layout, day("2025-03-15")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cost_unit_tax_in, 11.0);
        assert_eq!(rows[0].date, day("2025-03-15"));

        // as of the 11th only the older event is visible
        let rows = build(&layout, day("2025-03-11")).unwrap();
        assert_eq!(rows[0].cost_unit_tax_in, 10.0);
    }

    #[test]
    fn same_day_tie_breaks_on_highest_move_id() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let date = day("2025-03-15");

        write_purchases(
            &layout,
            date,
            &[(101, 1, 10.0, 5.0, 5), (103, 1, 12.0, 2.0, 5), (102, 1, 11.0, 1.0, 5)],
        );
        cost_events::update(&layout, date).unwrap();

        let rows = build(&layout, date).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_move_id, 103);
        assert_eq!(rows[0].cost_unit_tax_in, 12.0);
    }

    #[test]
    fn snapshot_roundtrips_through_load() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let date = day("2025-03-15");

        write_purchases(&layout, date, &[(101, 1, 10.0, 5.0, 5), (102, 2, 20.0, 3.0, 7)]);
        cost_events::update(&layout, date).unwrap();
        update(&layout, date).unwrap();

        let costs = load(&layout, date).unwrap();
        assert_eq!(costs.get(&1), Some(&10.0));
        assert!((costs[&2] - 22.2).abs() < 1e-9);
    }
}
