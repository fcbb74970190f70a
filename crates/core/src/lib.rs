//! `agencyops-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every agency
//! component (no storage, no threads, no IO).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, DocumentAggregate, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AgencyId, ReservationId, ShiftId, UserId};
