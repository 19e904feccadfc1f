//! Stage sequencing for one date

use std::io;

use chrono::NaiveDate;

use margo_core::LakeLayout;

use crate::{aggregates, cost_events, latest_cost, profit_lines};

/// The four engine stages, in dependency order. Each writes its own
/// partition, so a failed stage can be rerun without touching the
/// partitions written before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CostEvents,
    LatestCost,
    ProfitLines,
    Aggregates,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::CostEvents,
        Stage::LatestCost,
        Stage::ProfitLines,
        Stage::Aggregates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CostEvents => "cost_events",
            Self::LatestCost => "latest_cost",
            Self::ProfitLines => "profit_lines",
            Self::Aggregates => "aggregates",
        }
    }
}

pub fn run_stage(layout: &LakeLayout, date: NaiveDate, stage: Stage) -> io::Result<()> {
    log::info!("profit stage {} for {date}", stage.name());
    match stage {
        Stage::CostEvents => cost_events::update(layout, date)?,
        Stage::LatestCost => latest_cost::update(layout, date)?,
        Stage::ProfitLines => profit_lines::update(layout, date)?,
        Stage::Aggregates => aggregates::update(layout, date)?,
    };
    Ok(())
}

/// Run all four stages for `date`, stopping at the first failure so stale
/// downstream partitions are never rewritten from bad inputs.
pub fn run(layout: &LakeLayout, date: NaiveDate) -> io::Result<()> {
    for stage in Stage::ALL {
        run_stage(layout, date, stage)?;
    }
    Ok(())
}
