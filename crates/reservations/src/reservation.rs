use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyops_boarding::TripSlotKey;
use agencyops_core::{AgencyId, DomainError, DomainResult, ReservationId, ShiftId};
use agencyops_events::Event;

/// Boarding outcome of a reservation, as marked at the boarding desk.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardingMark {
    Embarked,
    Absent,
    #[default]
    Pending,
}

/// Reservation document. Field names follow the sales collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_id: Option<ShiftId>,
    /// Amount paid, in the agency currency's minor unit.
    pub montant: i64,
    pub seats_go: u32,
    #[serde(default)]
    pub statut_embarquement: BoardingMark,
    pub depart: String,
    pub arrivee: String,
    /// Departure time as sold, `HH:MM`.
    pub heure: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub canceled: bool,
}

impl Reservation {
    pub fn validate(&self) -> DomainResult<()> {
        if self.montant < 0 {
            return Err(DomainError::validation(format!(
                "reservation {} has a negative amount",
                self.id
            )));
        }
        if self.seats_go == 0 {
            return Err(DomainError::validation(format!(
                "reservation {} books no seat",
                self.id
            )));
        }
        Ok(())
    }

    /// Key of the departure this reservation was sold for.
    pub fn slot_key(&self) -> DomainResult<TripSlotKey> {
        TripSlotKey::compose(
            &self.depart,
            &self.arrivee,
            &self.heure,
            &self.date.format("%Y-%m-%d").to_string(),
        )
    }

    /// What this reservation adds to its day's totals; canceled ones add nothing.
    pub fn contribution(&self) -> Option<Contribution> {
        if self.canceled {
            return None;
        }
        Some(Contribution {
            date: self.date,
            amount: self.montant,
            seats: i64::from(self.seats_go),
        })
    }
}

/// Revenue and seats a reservation contributes to one day.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub date: NaiveDate,
    pub amount: i64,
    pub seats: i64,
}

/// Event: a reservation was recorded (first time or re-recorded).
///
/// Carries both the previous and the new contribution so the rollup can
/// retract the old one, including when the date moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecorded {
    pub agency_id: AgencyId,
    pub reservation_id: ReservationId,
    pub shift_id: Option<ShiftId>,
    pub previous: Option<Contribution>,
    pub current: Option<Contribution>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    Recorded(ReservationRecorded),
}

impl ReservationEvent {
    pub fn agency_id(&self) -> AgencyId {
        match self {
            ReservationEvent::Recorded(e) => e.agency_id,
        }
    }

    /// Build the event for recording `next` over an optional stored version.
    /// `None` means nothing changed as far as totals go.
    pub fn recorded(
        agency_id: AgencyId,
        previous: Option<&Reservation>,
        next: &Reservation,
        occurred_at: DateTime<Utc>,
    ) -> Option<Self> {
        let previous = previous.and_then(Reservation::contribution);
        let current = next.contribution();
        if previous == current {
            return None;
        }
        Some(ReservationEvent::Recorded(ReservationRecorded {
            agency_id,
            reservation_id: next.id,
            shift_id: next.shift_id,
            previous,
            current,
            occurred_at,
        }))
    }

    pub const fn aggregate_type() -> &'static str {
        "sales.reservation"
    }
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::Recorded(_) => "sales.reservation.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::Recorded(e) => e.occurred_at,
        }
    }
}
