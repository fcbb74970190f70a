//! Boarding capacity counter.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use agencyops_boarding::{
    BoardingCommand, BoardingSlot, BoardingStats, CancelEmbark, CloseSlot, Embark, EnsureSlot,
    MarkArrived, ScheduleInfo, TripSlotKey,
};
use agencyops_core::{AgencyId, DomainError};
use agencyops_events::{EventBus, EventEnvelope};

use crate::dispatcher::{Dispatched, Dispatcher};
use crate::error::EngineError;
use crate::store::{DocKey, DocumentStore};

/// Seat counter per agency and trip slot, bounded by the vehicle capacity.
///
/// Every mutation is one store transaction over the slot document and the
/// rollups it touches: the capacity check and the increment commit together
/// or not at all, and concurrent embarkations on one slot are ordered by
/// commit.
#[derive(Debug, Clone)]
pub struct BoardingCounter<S, B> {
    dispatcher: Dispatcher<S, B>,
}

impl<S, B> BoardingCounter<S, B>
where
    S: DocumentStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Dispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    /// Create the slot on first use; no-op when it already exists.
    pub fn ensure_slot(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
        vehicle_capacity: u32,
        schedule: &ScheduleInfo,
    ) -> Result<BoardingStats, EngineError> {
        let dispatched = self.run(agency_id, key, &[], |occurred_at| {
            BoardingCommand::EnsureSlot(EnsureSlot {
                agency_id,
                key: key.clone(),
                schedule: schedule.clone(),
                vehicle_capacity,
                occurred_at,
            })
        })?;
        stats_of(dispatched)
    }

    /// Embark `seats` passengers; returns the new embarked total.
    pub fn try_embark(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
        seats: u32,
    ) -> Result<u32, EngineError> {
        let date = self.existing(agency_id, key)?.date;
        let dispatched = self.run(agency_id, key, &[date], |occurred_at| {
            BoardingCommand::Embark(Embark {
                agency_id,
                key: key.clone(),
                seats,
                occurred_at,
            })
        })?;
        Ok(stats_of(dispatched)?.embarked_seats)
    }

    /// Boarding-desk correction; returns the new embarked total.
    pub fn cancel_embark(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
        seats: u32,
    ) -> Result<u32, EngineError> {
        let date = self.existing(agency_id, key)?.date;
        let dispatched = self.run(agency_id, key, &[date], |occurred_at| {
            BoardingCommand::CancelEmbark(CancelEmbark {
                agency_id,
                key: key.clone(),
                seats,
                occurred_at,
            })
        })?;
        Ok(stats_of(dispatched)?.embarked_seats)
    }

    /// Close boarding. Replaying the same closure changes nothing.
    pub fn close_slot(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
        absent_seats: u32,
    ) -> Result<BoardingStats, EngineError> {
        let date = self.existing(agency_id, key)?.date;
        let dispatched = self.run(agency_id, key, &[date], |occurred_at| {
            BoardingCommand::CloseSlot(CloseSlot {
                agency_id,
                key: key.clone(),
                absent_seats,
                occurred_at,
            })
        })?;

        let closed_now = !dispatched.events.is_empty();
        let stats = stats_of(dispatched)?;
        if closed_now {
            info!(
                %agency_id,
                slot = %key,
                embarked = stats.embarked_seats,
                absent = stats.absent_seats,
                "boarding closed"
            );
        }
        Ok(stats)
    }

    pub fn mark_arrived(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
    ) -> Result<BoardingStats, EngineError> {
        let dispatched = self.run(agency_id, key, &[], |occurred_at| {
            BoardingCommand::MarkArrived(MarkArrived {
                agency_id,
                key: key.clone(),
                occurred_at,
            })
        })?;
        stats_of(dispatched)
    }

    pub fn slot(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
    ) -> Result<Option<BoardingStats>, EngineError> {
        match self.dispatcher.store().get(&DocKey::boarding(agency_id, key))? {
            Some(document) => Ok(Some(document.decode()?)),
            None => Ok(None),
        }
    }

    fn existing(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
    ) -> Result<BoardingStats, EngineError> {
        self.slot(agency_id, key)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    fn run<F>(
        &self,
        agency_id: AgencyId,
        key: &TripSlotKey,
        dates: &[NaiveDate],
        make_command: F,
    ) -> Result<Dispatched<BoardingSlot>, EngineError>
    where
        F: Fn(DateTime<Utc>) -> BoardingCommand,
    {
        self.dispatcher.dispatch::<BoardingSlot, _>(
            agency_id,
            key.clone(),
            &DocKey::boarding(agency_id, key),
            dates,
            make_command,
        )
    }
}

fn stats_of(dispatched: Dispatched<BoardingSlot>) -> Result<BoardingStats, EngineError> {
    dispatched
        .aggregate
        .stats()
        .cloned()
        .ok_or_else(|| DomainError::not_found().into())
}
