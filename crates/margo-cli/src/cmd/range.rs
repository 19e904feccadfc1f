//! `margo range` - parallel daily runs over a date range

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use margo_pipeline::{Dataset, Job, Scheduler};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RangeArgs {
    /// First date to process (inclusive)
    pub start: NaiveDate,

    /// Last date to process (inclusive)
    pub end: NaiveDate,

    /// Re-run a single dataset over the range instead of full daily runs
    #[arg(long)]
    pub dataset: Option<Dataset>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,
}

pub fn run(args: RangeArgs, config: &Config) -> Result<()> {
    if args.end < args.start {
        anyhow::bail!("end date {} is before start date {}", args.end, args.start);
    }

    let workers = args
        .workers
        .unwrap_or(config.workers.default)
        .min(config.workers.max);

    let env = Arc::new(super::pipeline_env(config)?);
    let sched = Scheduler::new(env, workers)?;

    if let Some(dataset) = args.dataset {
        let dates: Vec<NaiveDate> = args
            .start
            .iter_days()
            .take_while(|d| *d <= args.end)
            .collect();
        for date in &dates {
            sched.submit(Job::Dataset(dataset, *date));
        }
        sched.wait_idle();
        log::info!("{} re-run finished for {} dates", dataset, dates.len());
        return Ok(());
    }

    let batch = sched.submit_range(args.start, args.end);
    let pb = ProgressBar::new(batch.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:<10.cyan.bold} {bar:30.green/dim} {pos:>4}/{len:4} {wide_msg:.dim}",
        )
        .expect("valid progress template"),
    );
    pb.set_prefix("range");

    let report = batch.wait_with(|date, ok| {
        pb.set_message(if ok {
            format!("{date} done")
        } else {
            format!("{date} failed")
        });
        pb.inc(1);
    });
    pb.finish_and_clear();

    log::info!(
        "{}: {} succeeded, {} failed",
        report.id,
        report.succeeded,
        report.failed.len()
    );
    for (date, reason) in &report.failed {
        log::error!("{date}: {reason}");
    }

    if !report.all_succeeded() {
        anyhow::bail!("{} of {} dates failed", report.failed.len(), batch_len(&report));
    }
    Ok(())
}

fn batch_len(report: &margo_pipeline::BatchReport) -> usize {
    report.succeeded + report.failed.len()
}
