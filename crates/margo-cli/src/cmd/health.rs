//! `margo health` - freshness report with automatic catch-up

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use margo_pipeline::{CatchUpStatus, Health, Scheduler, health_check};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Number of parallel workers for catch-up runs
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Report only; do not wait for a queued catch-up to finish
    #[arg(long)]
    pub no_wait: bool,
}

pub fn run(args: HealthArgs, config: &Config) -> Result<()> {
    let workers = args
        .workers
        .unwrap_or(config.workers.default)
        .min(config.workers.max);

    let env = Arc::new(super::pipeline_env(config)?);
    let sched = Scheduler::new(Arc::clone(&env), workers)?;

    let today = chrono::Local::now().date_naive();
    let health = health_check(&sched, &env.marks, today);
    println!("status: {}", health.status());

    match &health {
        Health::Unknown => {
            println!("no processing watermark yet; run `margo daily` first");
        }
        Health::Healthy { last_processed } => {
            println!("last processed: {last_processed}");
        }
        Health::Unhealthy {
            days_behind,
            catch_up,
        } => {
            println!("days behind: {days_behind}");
            if let CatchUpStatus::Queued {
                batch,
                start,
                end,
                total_days,
            } = catch_up
            {
                println!("catch-up {batch}: {total_days} days queued ({start}..={end})");
                if !args.no_wait {
                    sched.wait_idle();
                    println!("catch-up finished");
                }
            }
        }
    }

    if health.status() == "unhealthy" {
        std::process::exit(1);
    }
    Ok(())
}
