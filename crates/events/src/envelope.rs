use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agencyops_core::AgencyId;

/// Envelope for an event, containing agency + stream metadata.
///
/// This is the unit appended to an agency's event log and fanned out to consumers.
///
/// Notes:
/// - **Multi-tenancy** is enforced here via `agency_id`.
/// - **Append-only**: `sequence_number` is gap-free and monotonically increasing
///   per agency, so a single cursor orders every stream of that agency.
/// - `stream_key` is the document key of the aggregate that emitted the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    agency_id: AgencyId,

    stream_key: String,
    aggregate_type: String,

    /// Position in the agency log.
    sequence_number: u64,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        agency_id: AgencyId,
        stream_key: impl Into<String>,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            agency_id,
            stream_key: stream_key.into(),
            aggregate_type: aggregate_type.into(),
            sequence_number,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn agency_id(&self) -> AgencyId {
        self.agency_id
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Re-wrap the payload (e.g. after decoding JSON into a typed event).
    pub fn map_payload<F, T>(self, f: F) -> EventEnvelope<T>
    where
        F: FnOnce(E) -> T,
    {
        EventEnvelope {
            event_id: self.event_id,
            agency_id: self.agency_id,
            stream_key: self.stream_key,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            occurred_at: self.occurred_at,
            payload: f(self.payload),
        }
    }
}
