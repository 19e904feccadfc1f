//! `margo profit` - run the profit engine for one date

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use margo_core::LakeLayout;
use margo_profit::{Stage, engine};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ProfitArgs {
    /// Date to process (default: today)
    pub date: Option<NaiveDate>,

    /// Run a single stage (cost_events, latest_cost, profit_lines, aggregates)
    #[arg(long)]
    pub stage: Option<String>,
}

pub fn run(args: ProfitArgs, config: &Config) -> Result<()> {
    let layout = LakeLayout::new(&config.lake.root);
    let date = args.date.unwrap_or_else(|| chrono::Local::now().date_naive());

    match args.stage.as_deref() {
        Some(name) => {
            let stage = parse_stage(name)?;
            engine::run_stage(&layout, date, stage)?;
        }
        None => engine::run(&layout, date)?,
    }
    log::info!("profit engine done for {date}");
    Ok(())
}

fn parse_stage(name: &str) -> Result<Stage> {
    Stage::ALL
        .into_iter()
        .find(|s| s.name() == name)
        .ok_or_else(|| anyhow::anyhow!("unknown stage {name:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_parse() {
        assert_eq!(parse_stage("latest_cost").unwrap(), Stage::LatestCost);
        assert!(parse_stage("bogus").is_err());
    }
}
