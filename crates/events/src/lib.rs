//! Agency events: envelopes, pub/sub mechanics and projection runners.
//!
//! Nothing in here knows about boarding or shifts; the component crates define
//! their own event enums and implement [`Event`] for them.

pub mod agency;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use agency::AgencyScoped;
pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{Applied, ProjectionCursor, ProjectionError, ProjectionRunner};
