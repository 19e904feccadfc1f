//! `margo daily` - full pipeline for one date

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use margo_pipeline::{Dataset, daily};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DailyArgs {
    /// Date to process (default: today)
    pub date: Option<NaiveDate>,

    /// Run a single dataset's pipeline instead of the full day
    #[arg(long)]
    pub dataset: Option<Dataset>,
}

pub fn run(args: DailyArgs, config: &Config) -> Result<()> {
    let env = super::pipeline_env(config)?;
    let date = args.date.unwrap_or_else(|| chrono::Local::now().date_naive());

    match args.dataset {
        Some(dataset) => {
            daily::run_dataset(&env, dataset, date)?;
            log::info!("{} done for {date}", dataset.spec().label);
        }
        None => {
            daily::run_all(&env, date)?;
            log::info!("daily run done for {date}");
        }
    }
    Ok(())
}
