//! Live engines: push-driven recomputation over store subscriptions.

pub mod alerts;
pub mod revenue;

pub use alerts::LiveAlertEngine;
pub use revenue::SessionRevenueWatcher;
