//! Manager alert derivation.
//!
//! [`compute_alerts`] is a pure function over explicit snapshots: no store, no
//! clock. The live engine in the infra crate feeds it on every upstream change.

pub mod alert;
pub mod format;
pub mod rules;
pub mod snapshot;

pub use alert::{AlertModule, ManagerAlert, Severity};
pub use format::list_with_overflow;
pub use rules::{AlertInputs, AlertThresholds, compute_alerts};
pub use snapshot::{DepartureSnapshot, ShiftSnapshot};
