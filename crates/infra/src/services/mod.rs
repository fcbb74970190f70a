//! Component services: each one turns UI actions into store transactions.

pub mod boarding;
pub mod rollup;
pub mod shifts;

pub use boarding::BoardingCounter;
pub use rollup::{RollupAggregator, apply_delta, apply_event};
pub use shifts::ShiftLifecycle;
