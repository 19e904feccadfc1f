//! Job submission onto a shared worker pool

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

use chrono::NaiveDate;

use margo_core::is_shutdown_requested;

use crate::daily::{self, PipelineEnv};
use crate::dataset::Dataset;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// One schedulable unit of work.
#[derive(Debug, Clone, Copy)]
pub enum Job {
    /// Full daily run: dimensions, all datasets, profit stages.
    Daily(NaiveDate),
    /// One dataset's pipeline for one date.
    Dataset(Dataset, NaiveDate),
    /// The four profit stages for one date.
    Profit(NaiveDate),
}

impl Job {
    fn run(self, env: &PipelineEnv) -> Result<(), PipelineError> {
        if is_shutdown_requested() {
            return Err(PipelineError::Interrupted);
        }
        match self {
            Job::Daily(date) => daily::run_all(env, date),
            Job::Dataset(dataset, date) => daily::run_dataset(env, dataset, date),
            Job::Profit(date) => daily::run_profit(env, date),
        }
    }

    fn describe(self) -> String {
        match self {
            Job::Daily(date) => format!("daily {date}"),
            Job::Dataset(dataset, date) => format!("{dataset} {date}"),
            Job::Profit(date) => format!("profit {date}"),
        }
    }
}

/// Fan-out scheduler over a rayon pool. `submit` is fire-and-forget;
/// `submit_range` returns a handle that can block on the whole range.
pub struct Scheduler {
    env: Arc<PipelineEnv>,
    pool: rayon::ThreadPool,
    next_job: AtomicU64,
    next_batch: AtomicU64,
    in_flight: Arc<Inflight>,
}

#[derive(Default)]
struct Inflight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Inflight {
    fn enter(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

impl Scheduler {
    pub fn new(env: Arc<PipelineEnv>, workers: usize) -> io::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("margo-worker-{i}"))
            .build()
            .map_err(io::Error::other)?;
        Ok(Self {
            env,
            pool,
            next_job: AtomicU64::new(1),
            next_batch: AtomicU64::new(1),
            in_flight: Arc::new(Inflight::default()),
        })
    }

    fn job_id(&self) -> JobId {
        JobId(self.next_job.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue a job and return immediately. The outcome is only logged.
    pub fn submit(&self, job: Job) -> JobId {
        let id = self.job_id();
        let env = Arc::clone(&self.env);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.enter();
        log::info!("{id}: queued {}", job.describe());
        self.pool.spawn(move || {
            match job.run(&env) {
                Ok(()) => log::info!("{id}: finished {}", job.describe()),
                Err(e) => log::error!("{id}: {} failed: {e}", job.describe()),
            }
            in_flight.leave();
        });
        id
    }

    /// Block until every queued job has finished. Fire-and-forget jobs
    /// would otherwise be abandoned when the caller exits.
    pub fn wait_idle(&self) {
        let mut count = self.in_flight.count.lock().unwrap();
        while *count > 0 {
            count = self.in_flight.idle.wait(count).unwrap();
        }
    }

    /// Fan out one daily job per date in `[start, end]` and return a handle
    /// collecting per-date results.
    pub fn submit_range(&self, start: NaiveDate, end: NaiveDate) -> Batch {
        let id = BatchId(self.next_batch.fetch_add(1, Ordering::Relaxed));
        let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        log::info!("{id}: queued {} daily runs {start}..={end}", dates.len());

        let (tx, rx) = mpsc::channel();
        for date in &dates {
            let job = Job::Daily(*date);
            let job_id = self.job_id();
            let env = Arc::clone(&self.env);
            let tx = tx.clone();
            let date = *date;
            let in_flight = Arc::clone(&self.in_flight);
            in_flight.enter();
            self.pool.spawn(move || {
                let result = job.run(&env);
                if let Err(e) = &result {
                    log::error!("{job_id}: daily {date} failed: {e}");
                }
                // the batch handle may already be dropped
                let _ = tx.send((date, result));
                in_flight.leave();
            });
        }

        Batch {
            id,
            expected: dates.len(),
            rx,
        }
    }
}

/// Handle for an in-flight range run.
pub struct Batch {
    id: BatchId,
    expected: usize,
    rx: mpsc::Receiver<(NaiveDate, Result<(), PipelineError>)>,
}

impl Batch {
    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.expected
    }

    pub fn is_empty(&self) -> bool {
        self.expected == 0
    }

    /// Block until every date in the range has reported.
    pub fn wait(self) -> BatchReport {
        self.wait_with(|_, _| {})
    }

    /// Like `wait`, but invokes `on_done(date, succeeded)` as each date
    /// finishes. Used by the CLI to drive progress output.
    pub fn wait_with(self, mut on_done: impl FnMut(NaiveDate, bool)) -> BatchReport {
        let mut report = BatchReport {
            id: self.id,
            succeeded: 0,
            failed: Vec::new(),
        };
        for _ in 0..self.expected {
            match self.rx.recv() {
                Ok((date, Ok(()))) => {
                    report.succeeded += 1;
                    on_done(date, true);
                }
                Ok((date, Err(e))) => {
                    report.failed.push((date, e.to_string()));
                    on_done(date, false);
                }
                Err(_) => break,
            }
        }
        report.failed.sort_by_key(|(date, _)| *date);
        report
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub id: BatchId,
    pub succeeded: usize,
    pub failed: Vec<(NaiveDate, String)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_formatted() {
        assert_eq!(JobId(7).to_string(), "job-7");
        assert_eq!(BatchId(3).to_string(), "batch-3");
    }
}
