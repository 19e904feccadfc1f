//! Range fan-out and pool draining

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use tempfile::TempDir;

use margo_core::LakeLayout;
use margo_pipeline::{Dataset, Job, PipelineEnv, Scheduler};
use margo_source::{ConnectionFactory, MemoryClient, SourceClient, SourceError};

struct EmptyFactory;

impl ConnectionFactory for EmptyFactory {
    fn open(&self) -> Result<Box<dyn SourceClient>, SourceError> {
        Ok(Box::new(MemoryClient::new()))
    }
}

fn fixture(workers: usize) -> (TempDir, Scheduler) {
    let dir = TempDir::new().unwrap();
    let layout = LakeLayout::new(dir.path());
    let env = PipelineEnv::new(layout, Box::new(EmptyFactory));
    let sched = Scheduler::new(Arc::new(env), workers).unwrap();
    (dir, sched)
}

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[test]
fn range_fans_out_one_job_per_date_inclusive() {
    let (_dir, sched) = fixture(2);

    let batch = sched.submit_range(day("2025-03-13"), day("2025-03-15"));
    assert_eq!(batch.len(), 3);

    // The empty source has no models, so every daily run fails; each date
    // must still report exactly once.
    let seen = AtomicUsize::new(0);
    let report = batch.wait_with(|_, _| {
        seen.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(seen.load(Ordering::Relaxed), 3);
    assert_eq!(report.succeeded + report.failed.len(), 3);
    assert!(!report.all_succeeded());

    let failed: Vec<NaiveDate> = report.failed.iter().map(|(d, _)| *d).collect();
    assert_eq!(
        failed,
        vec![day("2025-03-13"), day("2025-03-14"), day("2025-03-15")]
    );
}

#[test]
fn single_date_range_is_one_job() {
    let (_dir, sched) = fixture(1);
    let batch = sched.submit_range(day("2025-03-15"), day("2025-03-15"));
    assert_eq!(batch.len(), 1);
    let report = batch.wait();
    assert_eq!(report.succeeded + report.failed.len(), 1);
}

#[test]
fn wait_idle_drains_submitted_jobs() {
    let (_dir, sched) = fixture(2);
    for _ in 0..4 {
        sched.submit(Job::Dataset(Dataset::StockQuants, day("2025-03-15")));
    }
    // Returns only once all four jobs have run.
    sched.wait_idle();
    sched.wait_idle(); // idempotent when already idle
}
