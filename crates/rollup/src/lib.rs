//! Agency rollups: per-day totals and the live "current" counters.
//!
//! Every change to a rollup goes through one pure fold over [`AgencyEvent`].
//! The infra layer applies it inside the transaction that writes the detail
//! document; replay applies it through [`RollupProjection`].

pub mod event;
pub mod fold;
pub mod projection;
pub mod stats;

pub use event::{AgencyEvent, EventDecodeError};
pub use fold::{apply_to_daily, apply_to_live};
pub use projection::RollupProjection;
pub use stats::{AgencyLiveState, DailyStats};
