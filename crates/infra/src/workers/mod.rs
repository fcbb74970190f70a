//! Background workers: subscription consumers on named threads.

pub mod rollup_consumer;
pub mod subscription_worker;

pub use rollup_consumer::{RollupConsumer, RollupCursor};
pub use subscription_worker::{SubscriptionWorker, WorkerHandle};
