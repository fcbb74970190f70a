//! Infrastructure layer: the document store boundary and everything that
//! runs the domain crates against it.
//!
//! - [`store`]: transactional document store, subscriptions, agency event log
//! - [`dispatcher`]: command pipeline for document-backed aggregates
//! - [`services`]: boarding counter, shift lifecycle, rollup aggregator
//! - [`live`]: push-driven alert and session revenue engines
//! - [`workers`]: subscription consumer threads, deferred rollup consumer
//! - [`replay`]: async rollup rebuild from the event log
//! - [`config`]: engine configuration from the environment

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod finance;
pub mod live;
pub mod replay;
pub mod services;
pub mod store;
pub mod workers;


pub use config::{ConfigError, EngineConfig, RollupMode};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::EngineError;
pub use finance::{CashAccount, Expense};
pub use live::{LiveAlertEngine, SessionRevenueWatcher};
pub use replay::{DriftReport, ReplayError, ReplayHandle, ReplayPhase, ReplayProgress};
pub use services::{BoardingCounter, RollupAggregator, ShiftLifecycle};
pub use store::{DocumentStore, InMemoryDocumentStore, StoreError};
pub use workers::{RollupConsumer, SubscriptionWorker, WorkerHandle};
