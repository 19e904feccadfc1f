//! `margo status` - partition and dimension inventory

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use margo_core::LakeLayout;
use margo_pipeline::status::{dimension_inventory, scan};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Date to inspect (default: today)
    pub date: Option<NaiveDate>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let layout = LakeLayout::new(&config.lake.root);
    let date = args.date.unwrap_or_else(|| chrono::Local::now().date_naive());

    let mut datasets = Table::new();
    datasets
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Dataset").fg(Color::Cyan),
            Cell::new("Raw").fg(Color::Cyan),
            Cell::new("Clean").fg(Color::Cyan),
            Cell::new("Fact").fg(Color::Cyan),
        ]);
    for status in scan(&layout, date) {
        datasets.add_row(vec![
            status.dataset.spec().label.to_string(),
            status.raw.describe(),
            status.clean.describe(),
            status.fact.describe(),
        ]);
    }

    let mut dims = Table::new();
    dims.load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Dimension").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
        ]);
    for dim in dimension_inventory(&layout) {
        dims.add_row(vec![dim.name.to_string(), dim.state.describe()]);
    }

    eprintln!("\nPartitions for {date}\n{datasets}");
    eprintln!("\nDimensions\n{dims}");
    Ok(())
}
