//! Catch-up and health reporting

use chrono::{Days, NaiveDate};

use margo_core::watermark::WatermarkStore;

use crate::scheduler::{BatchId, Scheduler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpStatus {
    /// No watermark exists yet; nothing to catch up from.
    NoBaseline,
    UpToDate,
    /// A range run was submitted for the gap.
    Queued {
        batch: BatchId,
        start: NaiveDate,
        end: NaiveDate,
        total_days: u64,
    },
}

/// Submit daily runs for every date strictly between the watermark and
/// `today`. Today's partial day is left for the regular daily run.
pub fn catch_up(sched: &Scheduler, marks: &WatermarkStore, today: NaiveDate) -> CatchUpStatus {
    let Some(last_processed) = marks.last_processed_date() else {
        log::warn!("no last processed date found");
        return CatchUpStatus::NoBaseline;
    };

    let days_behind = (today - last_processed).num_days();
    if days_behind <= 1 {
        log::info!("up to date, last processed {last_processed}");
        return CatchUpStatus::UpToDate;
    }

    let start = last_processed + Days::new(1);
    let end = today - Days::new(1);
    let total_days = (days_behind - 1) as u64;
    log::info!("catching up {total_days} days: {start}..={end}");
    let batch = sched.submit_range(start, end);
    CatchUpStatus::Queued {
        batch: batch.id(),
        start,
        end,
        total_days,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// No watermark yet.
    Unknown,
    Healthy {
        last_processed: NaiveDate,
    },
    /// More than one day behind; a catch-up has been triggered.
    Unhealthy {
        days_behind: i64,
        catch_up: CatchUpStatus,
    },
}

impl Health {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy { .. } => "healthy",
            Self::Unhealthy { .. } => "unhealthy",
        }
    }
}

/// Report pipeline health, triggering a catch-up when behind.
pub fn health_check(sched: &Scheduler, marks: &WatermarkStore, today: NaiveDate) -> Health {
    let Some(last_processed) = marks.last_processed_date() else {
        return Health::Unknown;
    };

    let days_behind = (today - last_processed).num_days();
    if days_behind <= 1 {
        return Health::Healthy { last_processed };
    }

    log::warn!("pipeline is {days_behind} days behind, triggering catch-up");
    Health::Unhealthy {
        days_behind,
        catch_up: catch_up(sched, marks, today),
    }
}
