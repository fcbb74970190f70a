use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use agencyops_core::{
    Aggregate, AggregateRoot, AgencyId, DocumentAggregate, DomainError, DomainResult,
};
use agencyops_events::Event;

use crate::trip_slot::{ScheduleInfo, TripSlotKey};

/// Boarding state of a trip slot. Monotonic: `open → closed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Open,
    Closed,
}

/// Persisted boarding counter for one trip slot (the stored document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardingStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    pub departure: String,
    pub arrival: String,
    pub date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub vehicle_capacity: u32,
    pub embarked_seats: u32,
    pub absent_seats: u32,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<DateTime<Utc>>,
}

impl BoardingStats {
    pub fn schedule(&self) -> ScheduleInfo {
        ScheduleInfo {
            trip_id: self.trip_id.clone(),
            departure: self.departure.clone(),
            arrival: self.arrival.clone(),
            date: self.date,
            scheduled_time: self.scheduled_time,
        }
    }

    pub fn remaining_seats(&self) -> u32 {
        self.vehicle_capacity.saturating_sub(self.embarked_seats)
    }

    pub fn is_open(&self) -> bool {
        self.status == SlotStatus::Open
    }

    fn validate(&self) -> DomainResult<()> {
        if self.vehicle_capacity == 0 {
            return Err(DomainError::invariant("vehicle capacity must be positive"));
        }
        if self.embarked_seats > self.vehicle_capacity {
            return Err(DomainError::invariant(format!(
                "embarked seats {} exceed vehicle capacity {}",
                self.embarked_seats, self.vehicle_capacity
            )));
        }
        if self.absent_seats > self.vehicle_capacity {
            return Err(DomainError::invariant("absent seats exceed vehicle capacity"));
        }
        if self.arrived_at.is_some() && self.status != SlotStatus::Closed {
            return Err(DomainError::invariant("an open slot cannot have arrived"));
        }
        Ok(())
    }
}

/// Aggregate root: BoardingSlot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardingSlot {
    key: TripSlotKey,
    stats: Option<BoardingStats>,
    version: u64,
}

impl BoardingSlot {
    pub fn stats(&self) -> Option<&BoardingStats> {
        self.stats.as_ref()
    }

    pub fn key(&self) -> &TripSlotKey {
        &self.key
    }

    fn require(&self) -> DomainResult<&BoardingStats> {
        self.stats.as_ref().ok_or_else(DomainError::not_found)
    }

    fn require_open(&self) -> DomainResult<&BoardingStats> {
        let stats = self.require()?;
        if !stats.is_open() {
            return Err(DomainError::SlotAlreadyClosed);
        }
        Ok(stats)
    }

    fn ensure_key(&self, key: &TripSlotKey) -> DomainResult<()> {
        if &self.key != key {
            return Err(DomainError::invariant("trip slot key mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for BoardingSlot {
    type Id = TripSlotKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: EnsureSlot (idempotent creation on first use).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureSlot {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub schedule: ScheduleInfo,
    pub vehicle_capacity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Embark (all-or-nothing seat admission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embark {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub seats: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelEmbark (boarding desk correction on an open slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelEmbark {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub seats: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseSlot (finalize the manifest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSlot {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub absent_seats: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkArrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkArrived {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardingCommand {
    EnsureSlot(EnsureSlot),
    Embark(Embark),
    CancelEmbark(CancelEmbark),
    CloseSlot(CloseSlot),
    MarkArrived(MarkArrived),
}

/// Event: SlotOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOpened {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub schedule: ScheduleInfo,
    pub vehicle_capacity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SeatsEmbarked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatsEmbarked {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub date: NaiveDate,
    pub seats: u32,
    pub embarked_total: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EmbarkCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbarkCanceled {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub date: NaiveDate,
    pub seats: u32,
    pub embarked_total: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotClosed {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub date: NaiveDate,
    pub embarked_seats: u32,
    pub absent_seats: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VehicleArrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleArrived {
    pub agency_id: AgencyId,
    pub key: TripSlotKey,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardingEvent {
    SlotOpened(SlotOpened),
    SeatsEmbarked(SeatsEmbarked),
    EmbarkCanceled(EmbarkCanceled),
    SlotClosed(SlotClosed),
    VehicleArrived(VehicleArrived),
}

impl BoardingEvent {
    pub fn agency_id(&self) -> AgencyId {
        match self {
            BoardingEvent::SlotOpened(e) => e.agency_id,
            BoardingEvent::SeatsEmbarked(e) => e.agency_id,
            BoardingEvent::EmbarkCanceled(e) => e.agency_id,
            BoardingEvent::SlotClosed(e) => e.agency_id,
            BoardingEvent::VehicleArrived(e) => e.agency_id,
        }
    }
}

impl Event for BoardingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BoardingEvent::SlotOpened(_) => "boarding.slot.opened",
            BoardingEvent::SeatsEmbarked(_) => "boarding.slot.seats_embarked",
            BoardingEvent::EmbarkCanceled(_) => "boarding.slot.embark_canceled",
            BoardingEvent::SlotClosed(_) => "boarding.slot.closed",
            BoardingEvent::VehicleArrived(_) => "boarding.slot.vehicle_arrived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BoardingEvent::SlotOpened(e) => e.occurred_at,
            BoardingEvent::SeatsEmbarked(e) => e.occurred_at,
            BoardingEvent::EmbarkCanceled(e) => e.occurred_at,
            BoardingEvent::SlotClosed(e) => e.occurred_at,
            BoardingEvent::VehicleArrived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BoardingSlot {
    type Command = BoardingCommand;
    type Event = BoardingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BoardingEvent::SlotOpened(e) => {
                self.key = e.key.clone();
                self.stats = Some(BoardingStats {
                    trip_id: e.schedule.trip_id.clone(),
                    departure: e.schedule.departure.clone(),
                    arrival: e.schedule.arrival.clone(),
                    date: e.schedule.date,
                    scheduled_time: e.schedule.scheduled_time,
                    vehicle_capacity: e.vehicle_capacity,
                    embarked_seats: 0,
                    absent_seats: 0,
                    status: SlotStatus::Open,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                    arrived_at: None,
                });
            }
            BoardingEvent::SeatsEmbarked(e) => {
                if let Some(stats) = self.stats.as_mut() {
                    stats.embarked_seats = e.embarked_total;
                    stats.updated_at = e.occurred_at;
                }
            }
            BoardingEvent::EmbarkCanceled(e) => {
                if let Some(stats) = self.stats.as_mut() {
                    stats.embarked_seats = e.embarked_total;
                    stats.updated_at = e.occurred_at;
                }
            }
            BoardingEvent::SlotClosed(e) => {
                if let Some(stats) = self.stats.as_mut() {
                    stats.status = SlotStatus::Closed;
                    stats.absent_seats = e.absent_seats;
                    stats.updated_at = e.occurred_at;
                }
            }
            BoardingEvent::VehicleArrived(e) => {
                if let Some(stats) = self.stats.as_mut() {
                    stats.arrived_at = Some(e.occurred_at);
                    stats.updated_at = e.occurred_at;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BoardingCommand::EnsureSlot(cmd) => self.handle_ensure(cmd),
            BoardingCommand::Embark(cmd) => self.handle_embark(cmd),
            BoardingCommand::CancelEmbark(cmd) => self.handle_cancel(cmd),
            BoardingCommand::CloseSlot(cmd) => self.handle_close(cmd),
            BoardingCommand::MarkArrived(cmd) => self.handle_arrived(cmd),
        }
    }
}

impl BoardingSlot {
    fn handle_ensure(&self, cmd: &EnsureSlot) -> DomainResult<Vec<BoardingEvent>> {
        self.ensure_key(&cmd.key)?;
        if self.stats.is_some() {
            return Ok(vec![]);
        }
        if cmd.vehicle_capacity == 0 {
            return Err(DomainError::validation("vehicle capacity must be positive"));
        }
        if cmd.schedule.slot_key()? != cmd.key {
            return Err(DomainError::validation(
                "schedule does not match the trip slot key",
            ));
        }

        Ok(vec![BoardingEvent::SlotOpened(SlotOpened {
            agency_id: cmd.agency_id,
            key: cmd.key.clone(),
            schedule: cmd.schedule.clone(),
            vehicle_capacity: cmd.vehicle_capacity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_embark(&self, cmd: &Embark) -> DomainResult<Vec<BoardingEvent>> {
        self.ensure_key(&cmd.key)?;
        let stats = self.require_open()?;
        if cmd.seats == 0 {
            return Err(DomainError::validation("seats to embark must be positive"));
        }

        let embarked_total = stats
            .embarked_seats
            .checked_add(cmd.seats)
            .filter(|total| *total <= stats.vehicle_capacity)
            .ok_or(DomainError::CapacityExceeded {
                requested: cmd.seats,
                embarked: stats.embarked_seats,
                capacity: stats.vehicle_capacity,
            })?;

        Ok(vec![BoardingEvent::SeatsEmbarked(SeatsEmbarked {
            agency_id: cmd.agency_id,
            key: cmd.key.clone(),
            date: stats.date,
            seats: cmd.seats,
            embarked_total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelEmbark) -> DomainResult<Vec<BoardingEvent>> {
        self.ensure_key(&cmd.key)?;
        let stats = self.require_open()?;
        if cmd.seats == 0 {
            return Err(DomainError::validation("seats to cancel must be positive"));
        }
        let embarked_total = stats.embarked_seats.checked_sub(cmd.seats).ok_or_else(|| {
            DomainError::validation(format!(
                "cannot cancel {} seat(s), only {} embarked",
                cmd.seats, stats.embarked_seats
            ))
        })?;

        Ok(vec![BoardingEvent::EmbarkCanceled(EmbarkCanceled {
            agency_id: cmd.agency_id,
            key: cmd.key.clone(),
            date: stats.date,
            seats: cmd.seats,
            embarked_total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseSlot) -> DomainResult<Vec<BoardingEvent>> {
        self.ensure_key(&cmd.key)?;
        let stats = self.require()?;

        if !stats.is_open() {
            // Replayed closure with the same manifest: nothing to do.
            if stats.absent_seats == cmd.absent_seats {
                return Ok(vec![]);
            }
            return Err(DomainError::SlotAlreadyClosed);
        }
        if cmd.absent_seats > stats.vehicle_capacity {
            return Err(DomainError::validation("absent seats exceed vehicle capacity"));
        }

        Ok(vec![BoardingEvent::SlotClosed(SlotClosed {
            agency_id: cmd.agency_id,
            key: cmd.key.clone(),
            date: stats.date,
            embarked_seats: stats.embarked_seats,
            absent_seats: cmd.absent_seats,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_arrived(&self, cmd: &MarkArrived) -> DomainResult<Vec<BoardingEvent>> {
        self.ensure_key(&cmd.key)?;
        let stats = self.require()?;
        if stats.is_open() {
            return Err(DomainError::conflict(
                "boarding must be closed before the vehicle can arrive",
            ));
        }
        if stats.arrived_at.is_some() {
            return Ok(vec![]);
        }

        Ok(vec![BoardingEvent::VehicleArrived(VehicleArrived {
            agency_id: cmd.agency_id,
            key: cmd.key.clone(),
            date: stats.date,
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl DocumentAggregate for BoardingSlot {
    type Document = BoardingStats;

    fn aggregate_type() -> &'static str {
        "boarding.slot"
    }

    fn empty(id: TripSlotKey) -> Self {
        Self {
            key: id,
            stats: None,
            version: 0,
        }
    }

    fn exists(&self) -> bool {
        self.stats.is_some()
    }

    fn to_document(&self) -> BoardingStats {
        // Only called on created slots; an empty one has nothing to persist.
        self.stats.clone().unwrap_or_else(|| BoardingStats {
            trip_id: None,
            departure: String::new(),
            arrival: String::new(),
            date: NaiveDate::MIN,
            scheduled_time: NaiveTime::MIN,
            vehicle_capacity: 0,
            embarked_seats: 0,
            absent_seats: 0,
            status: SlotStatus::Open,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            arrived_at: None,
        })
    }

    fn from_document(id: TripSlotKey, document: BoardingStats) -> DomainResult<Self> {
        document.validate()?;
        Ok(Self {
            key: id,
            stats: Some(document),
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyops_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule() -> ScheduleInfo {
        ScheduleInfo {
            trip_id: Some("trip-1".into()),
            departure: "Dakar".into(),
            arrival: "Thiès".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        }
    }

    fn open_slot(agency_id: AgencyId, capacity: u32) -> BoardingSlot {
        let schedule = schedule();
        let key = schedule.slot_key().unwrap();
        let mut slot = BoardingSlot::empty(key.clone());
        execute(
            &mut slot,
            &BoardingCommand::EnsureSlot(EnsureSlot {
                agency_id,
                key,
                schedule,
                vehicle_capacity: capacity,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        slot
    }

    fn key() -> TripSlotKey {
        schedule().slot_key().unwrap()
    }

    fn embark(agency_id: AgencyId, seats: u32) -> BoardingCommand {
        BoardingCommand::Embark(Embark {
            agency_id,
            key: key(),
            seats,
            occurred_at: test_time(),
        })
    }

    fn close(agency_id: AgencyId, absent_seats: u32) -> BoardingCommand {
        BoardingCommand::CloseSlot(CloseSlot {
            agency_id,
            key: key(),
            absent_seats,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn ensure_slot_is_idempotent() {
        let agency_id = AgencyId::new();
        let slot = open_slot(agency_id, 50);
        let again = BoardingCommand::EnsureSlot(EnsureSlot {
            agency_id,
            key: slot.key().clone(),
            schedule: schedule(),
            vehicle_capacity: 70,
            occurred_at: test_time(),
        });
        assert!(slot.handle(&again).unwrap().is_empty());
        assert_eq!(slot.stats().unwrap().vehicle_capacity, 50);
    }

    #[test]
    fn embark_past_capacity_is_rejected_whole() {
        let agency_id = AgencyId::new();
        let mut slot = open_slot(agency_id, 10);
        execute(&mut slot, &embark(agency_id, 8)).unwrap();

        let err = slot.handle(&embark(agency_id, 3)).unwrap_err();
        assert_eq!(
            err,
            DomainError::CapacityExceeded {
                requested: 3,
                embarked: 8,
                capacity: 10
            }
        );
        assert_eq!(slot.stats().unwrap().embarked_seats, 8);

        execute(&mut slot, &embark(agency_id, 2)).unwrap();
        assert_eq!(slot.stats().unwrap().remaining_seats(), 0);
    }

    #[test]
    fn embark_on_unknown_slot_is_not_found() {
        let slot = BoardingSlot::empty(key());
        let err = slot.handle(&embark(AgencyId::new(), 1)).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn closed_slot_rejects_boarding() {
        let agency_id = AgencyId::new();
        let mut slot = open_slot(agency_id, 10);
        execute(&mut slot, &close(agency_id, 2)).unwrap();

        assert_eq!(
            slot.handle(&embark(agency_id, 1)).unwrap_err(),
            DomainError::SlotAlreadyClosed
        );
    }

    #[test]
    fn second_identical_close_is_a_no_op() {
        let agency_id = AgencyId::new();
        let mut slot = open_slot(agency_id, 10);
        execute(&mut slot, &close(agency_id, 2)).unwrap();
        let snapshot = slot.clone();

        assert!(execute(&mut slot, &close(agency_id, 2)).unwrap().is_empty());
        assert_eq!(slot, snapshot);

        assert_eq!(
            slot.handle(&close(agency_id, 3)).unwrap_err(),
            DomainError::SlotAlreadyClosed
        );
    }

    #[test]
    fn arrival_requires_closure() {
        let agency_id = AgencyId::new();
        let mut slot = open_slot(agency_id, 10);
        let arrived = BoardingCommand::MarkArrived(MarkArrived {
            agency_id,
            key: key(),
            occurred_at: test_time(),
        });
        assert!(matches!(slot.handle(&arrived), Err(DomainError::Conflict(_))));

        execute(&mut slot, &close(agency_id, 0)).unwrap();
        assert_eq!(execute(&mut slot, &arrived).unwrap().len(), 1);
        assert!(execute(&mut slot, &arrived).unwrap().is_empty());
    }

    #[test]
    fn document_decode_rejects_overbooked_counters() {
        let mut stats = open_slot(AgencyId::new(), 10).to_document();
        stats.embarked_seats = 11;
        let err = BoardingSlot::from_document(key(), stats).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn document_uses_camel_case_wire_names() {
        let json = serde_json::to_value(open_slot(AgencyId::new(), 10).to_document()).unwrap();
        assert_eq!(json["vehicleCapacity"], 10);
        assert_eq!(json["embarkedSeats"], 0);
        assert_eq!(json["status"], "open");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever mix of admissions and corrections is requested,
        /// embarked seats never exceed capacity and every offered seat is either
        /// embarked or rejected.
        #[test]
        fn embarked_never_exceeds_capacity(
            capacity in 1u32..80,
            requests in prop::collection::vec((1u32..12, any::<bool>()), 1..40)
        ) {
            let agency_id = AgencyId::new();
            let mut slot = open_slot(agency_id, capacity);
            let mut offered = 0u32;
            let mut rejected = 0u32;
            let mut canceled = 0u32;

            for (seats, is_cancel) in requests {
                if is_cancel {
                    let cmd = BoardingCommand::CancelEmbark(CancelEmbark {
                        agency_id,
                        key: key(),
                        seats,
                        occurred_at: test_time(),
                    });
                    if execute(&mut slot, &cmd).is_ok() {
                        canceled += seats;
                    }
                } else {
                    offered += seats;
                    if execute(&mut slot, &embark(agency_id, seats)).is_err() {
                        rejected += seats;
                    }
                }
                prop_assert!(slot.stats().unwrap().embarked_seats <= capacity);
            }

            prop_assert_eq!(slot.stats().unwrap().embarked_seats + rejected + canceled, offered);
        }
    }
}
