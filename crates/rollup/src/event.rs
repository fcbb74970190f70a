use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agencyops_boarding::{BoardingEvent, BoardingSlot};
use agencyops_core::{AgencyId, DocumentAggregate};
use agencyops_events::{AgencyScoped, Event};
use agencyops_reservations::ReservationEvent;
use agencyops_shifts::{Shift, ShiftEvent};

/// Every event in an agency log, whichever component produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgencyEvent {
    Boarding(BoardingEvent),
    Shift(ShiftEvent),
    Reservation(ReservationEvent),
}

/// A stored payload that does not decode as its declared aggregate type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {aggregate_type} event: {reason}")]
pub struct EventDecodeError {
    pub aggregate_type: String,
    pub reason: String,
}

impl AgencyEvent {
    /// Decode a stored payload using the aggregate type recorded next to it.
    pub fn decode(
        aggregate_type: &str,
        payload: serde_json::Value,
    ) -> Result<Self, EventDecodeError> {
        let err = |reason: String| EventDecodeError {
            aggregate_type: aggregate_type.to_string(),
            reason,
        };

        if aggregate_type == BoardingSlot::aggregate_type() {
            serde_json::from_value(payload)
                .map(AgencyEvent::Boarding)
                .map_err(|e| err(e.to_string()))
        } else if aggregate_type == Shift::aggregate_type() {
            serde_json::from_value(payload)
                .map(AgencyEvent::Shift)
                .map_err(|e| err(e.to_string()))
        } else if aggregate_type == ReservationEvent::aggregate_type() {
            serde_json::from_value(payload)
                .map(AgencyEvent::Reservation)
                .map_err(|e| err(e.to_string()))
        } else {
            Err(err("unknown aggregate type".to_string()))
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            AgencyEvent::Boarding(_) => BoardingSlot::aggregate_type(),
            AgencyEvent::Shift(_) => Shift::aggregate_type(),
            AgencyEvent::Reservation(_) => ReservationEvent::aggregate_type(),
        }
    }

    /// Payload as stored: the component event alone, without the union tag.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            AgencyEvent::Boarding(e) => serde_json::to_value(e),
            AgencyEvent::Shift(e) => serde_json::to_value(e),
            AgencyEvent::Reservation(e) => serde_json::to_value(e),
        }
    }

    /// Days whose [`crate::DailyStats`] this event changes.
    pub fn daily_dates(&self) -> Vec<NaiveDate> {
        match self {
            AgencyEvent::Boarding(BoardingEvent::SlotOpened(_))
            | AgencyEvent::Boarding(BoardingEvent::VehicleArrived(_)) => vec![],
            AgencyEvent::Boarding(BoardingEvent::SeatsEmbarked(e)) => vec![e.date],
            AgencyEvent::Boarding(BoardingEvent::EmbarkCanceled(e)) => vec![e.date],
            AgencyEvent::Boarding(BoardingEvent::SlotClosed(e)) => vec![e.date],
            AgencyEvent::Shift(ShiftEvent::ShiftOpened(e)) => vec![e.business_date],
            AgencyEvent::Shift(ShiftEvent::ShiftClosed(e)) => vec![e.business_date],
            AgencyEvent::Shift(ShiftEvent::ChiefApproved(e)) => vec![e.business_date],
            AgencyEvent::Shift(_) => vec![],
            AgencyEvent::Reservation(ReservationEvent::Recorded(e)) => {
                let mut dates: Vec<NaiveDate> = e
                    .previous
                    .iter()
                    .chain(e.current.iter())
                    .map(|c| c.date)
                    .collect();
                dates.sort();
                dates.dedup();
                dates
            }
        }
    }

    /// Whether this event changes the live `current` counters.
    pub fn touches_live(&self) -> bool {
        match self {
            AgencyEvent::Boarding(BoardingEvent::SeatsEmbarked(_))
            | AgencyEvent::Boarding(BoardingEvent::EmbarkCanceled(_)) => false,
            AgencyEvent::Boarding(_) => true,
            AgencyEvent::Shift(ShiftEvent::AccountantValidated(_)) => false,
            AgencyEvent::Shift(_) => true,
            AgencyEvent::Reservation(_) => false,
        }
    }
}

impl AgencyScoped for AgencyEvent {
    fn agency_id(&self) -> AgencyId {
        match self {
            AgencyEvent::Boarding(e) => e.agency_id(),
            AgencyEvent::Shift(e) => e.agency_id(),
            AgencyEvent::Reservation(e) => e.agency_id(),
        }
    }
}

impl Event for AgencyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AgencyEvent::Boarding(e) => e.event_type(),
            AgencyEvent::Shift(e) => e.event_type(),
            AgencyEvent::Reservation(e) => e.event_type(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            AgencyEvent::Boarding(e) => e.version(),
            AgencyEvent::Shift(e) => e.version(),
            AgencyEvent::Reservation(e) => e.version(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AgencyEvent::Boarding(e) => e.occurred_at(),
            AgencyEvent::Shift(e) => e.occurred_at(),
            AgencyEvent::Reservation(e) => e.occurred_at(),
        }
    }
}

impl From<BoardingEvent> for AgencyEvent {
    fn from(e: BoardingEvent) -> Self {
        AgencyEvent::Boarding(e)
    }
}

impl From<ShiftEvent> for AgencyEvent {
    fn from(e: ShiftEvent) -> Self {
        AgencyEvent::Shift(e)
    }
}

impl From<ReservationEvent> for AgencyEvent {
    fn from(e: ReservationEvent) -> Self {
        AgencyEvent::Reservation(e)
    }
}
