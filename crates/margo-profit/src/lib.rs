//! Point-in-time cost attribution
//!
//! Four stages per date, each persisted as its own star-schema partition:
//! purchase lines become cost events, cost events fold into a latest-cost
//! snapshot, the snapshot joins against the day's sales to price each sold
//! line, and the priced lines roll up into daily aggregates.

pub mod aggregates;
pub mod cost_events;
pub mod engine;
pub mod latest_cost;
pub mod profit_lines;
pub mod tax;

#[doc(hidden)]
pub mod testutil;

pub use cost_events::CostEvent;
pub use engine::Stage;
pub use profit_lines::ProfitLine;
pub use tax::tax_multiplier;
