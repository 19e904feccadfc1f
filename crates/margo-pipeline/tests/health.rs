//! Catch-up and health reporting

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use margo_core::LakeLayout;
use margo_core::watermark::WatermarkStore;
use margo_pipeline::{CatchUpStatus, Health, PipelineEnv, Scheduler, catch_up, health_check};
use margo_source::{ConnectionFactory, MemoryClient, SourceClient, SourceError};

struct EmptyFactory;

impl ConnectionFactory for EmptyFactory {
    fn open(&self) -> Result<Box<dyn SourceClient>, SourceError> {
        Ok(Box::new(MemoryClient::new()))
    }
}

fn fixture() -> (TempDir, Scheduler, WatermarkStore) {
    let dir = TempDir::new().unwrap();
    let layout = LakeLayout::new(dir.path());
    let marks = WatermarkStore::new(layout.metadata_dir());
    let env = PipelineEnv::new(layout, Box::new(EmptyFactory));
    let sched = Scheduler::new(Arc::new(env), 2).unwrap();
    (dir, sched, marks)
}

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[test]
fn no_watermark_reports_no_baseline() {
    let (_dir, sched, marks) = fixture();
    assert_eq!(catch_up(&sched, &marks, day("2025-03-15")), CatchUpStatus::NoBaseline);
    assert_eq!(health_check(&sched, &marks, day("2025-03-15")), Health::Unknown);
}

#[test]
fn one_day_behind_is_up_to_date_and_healthy() {
    let (_dir, sched, marks) = fixture();
    marks.set_last_processed_date(day("2025-03-14")).unwrap();

    assert_eq!(catch_up(&sched, &marks, day("2025-03-15")), CatchUpStatus::UpToDate);
    assert_eq!(
        health_check(&sched, &marks, day("2025-03-15")),
        Health::Healthy {
            last_processed: day("2025-03-14")
        }
    );
}

#[test]
fn three_days_behind_queues_exactly_two_dates() {
    let (_dir, sched, marks) = fixture();
    marks.set_last_processed_date(day("2025-03-12")).unwrap();

    match catch_up(&sched, &marks, day("2025-03-15")) {
        CatchUpStatus::Queued {
            start,
            end,
            total_days,
            ..
        } => {
            assert_eq!(start, day("2025-03-13"));
            assert_eq!(end, day("2025-03-14"));
            assert_eq!(total_days, 2);
        }
        other => panic!("expected queued catch-up, got {other:?}"),
    }
}

#[test]
fn unhealthy_reports_days_behind() {
    let (_dir, sched, marks) = fixture();
    marks.set_last_processed_date(day("2025-03-10")).unwrap();

    match health_check(&sched, &marks, day("2025-03-15")) {
        Health::Unhealthy {
            days_behind,
            catch_up: CatchUpStatus::Queued { total_days, .. },
        } => {
            assert_eq!(days_behind, 5);
            assert_eq!(total_days, 4);
        }
        other => panic!("expected unhealthy, got {other:?}"),
    }
}
