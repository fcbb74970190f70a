use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Agency rollups (daily stats, live state) are projections: the hot path applies
/// the same fold inside the mutating transaction, and disaster recovery rebuilds
/// them from scratch by replaying the agency log through this trait.
///
/// ## Idempotency
///
/// Delivery is at-least-once. [`crate::ProjectionRunner`] tracks the agency
/// sequence number and skips anything at or below its cursor, so `apply` itself
/// only sees each event once per runner.
///
/// ## Agency isolation
///
/// The envelope carries `agency_id`; a projection must only touch that agency's
/// read model.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the read model.
    ///
    /// Events a projection does not care about are ignored.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
