//! Rollup aggregator: per-day totals and the live `current` counters.
//!
//! In [`RollupMode::Transactional`] every delta is folded inside the
//! transaction that writes the detail document, through [`apply_event`]. In
//! [`RollupMode::Deferred`] the detail transaction only appends the event and
//! the [`RollupConsumer`](crate::workers::RollupConsumer) folds it later.

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use agencyops_core::{AgencyId, DomainError};
use agencyops_events::{EventBus, EventEnvelope};
use agencyops_reservations::{Reservation, ReservationEvent};
use agencyops_rollup::{AgencyEvent, AgencyLiveState, DailyStats, apply_to_daily, apply_to_live};
use agencyops_shifts::{ShiftDocument, ShiftStatus};

use crate::config::RollupMode;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::replay::{ReplayError, ReplayHandle, rebuild_rollups};
use crate::store::{DocKey, DocumentStore, EventLogReader, StoreError, StoredEvent, Transaction};

pub(crate) fn daily_keys(agency_id: AgencyId, dates: &[NaiveDate]) -> Vec<DocKey> {
    dates
        .iter()
        .map(|date| DocKey::daily_stats(agency_id, *date))
        .collect()
}

/// Daily documents for `dates` plus the live singleton.
pub(crate) fn rollup_keys(agency_id: AgencyId, dates: &[NaiveDate]) -> Vec<DocKey> {
    let mut keys = daily_keys(agency_id, dates);
    keys.push(DocKey::live_state(agency_id));
    keys
}

/// Read-modify-write one aggregate document inside a transaction. A missing
/// document starts from `default`.
pub fn apply_delta<T, D, F>(
    tx: &mut Transaction,
    key: &DocKey,
    default: D,
    delta: F,
) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
    D: FnOnce() -> T,
    F: FnOnce(&mut T),
{
    let mut document = tx.get::<T>(key)?.unwrap_or_else(default);
    delta(&mut document);
    tx.put(key, &document)?;
    Ok(document)
}

/// Fold one event into every rollup document it touches. The documents must
/// be among the transaction's declared keys.
pub fn apply_event(
    tx: &mut Transaction,
    agency_id: AgencyId,
    event: &AgencyEvent,
) -> Result<(), StoreError> {
    for date in event.daily_dates() {
        apply_delta(
            tx,
            &DocKey::daily_stats(agency_id, date),
            || DailyStats::empty(date),
            |stats| apply_to_daily(stats, event),
        )?;
    }
    if event.touches_live() {
        apply_delta(
            tx,
            &DocKey::live_state(agency_id),
            AgencyLiveState::default,
            |live| apply_to_live(live, event),
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RollupAggregator<S, B> {
    dispatcher: Dispatcher<S, B>,
}

impl<S, B> RollupAggregator<S, B>
where
    S: DocumentStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Dispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    /// Point read; a day without activity reads as zeroed totals.
    pub fn daily_stats(
        &self,
        agency_id: AgencyId,
        date: NaiveDate,
    ) -> Result<DailyStats, EngineError> {
        let key = DocKey::daily_stats(agency_id, date);
        match self.dispatcher.store().get(&key)? {
            Some(document) => Ok(document.decode()?),
            None => Ok(DailyStats::empty(date)),
        }
    }

    pub fn live_state(&self, agency_id: AgencyId) -> Result<AgencyLiveState, EngineError> {
        let key = DocKey::live_state(agency_id);
        match self.dispatcher.store().get(&key)? {
            Some(document) => Ok(document.decode()?),
            None => Ok(AgencyLiveState::default()),
        }
    }

    /// Write a reservation on behalf of the sales flow, together with the
    /// revenue and seat delta it causes.
    ///
    /// Re-recording the same reservation only applies the difference. A
    /// reservation attributed to a validated shift is rejected; any earlier
    /// state, closed included, still accepts it.
    pub fn record_reservation(
        &self,
        agency_id: AgencyId,
        reservation: &Reservation,
    ) -> Result<Option<StoredEvent>, EngineError> {
        reservation.validate()?;

        let store = self.dispatcher.store();
        let key = DocKey::reservation(agency_id, reservation.id);
        let shift_key = reservation
            .shift_id
            .map(|shift_id| DocKey::shift(agency_id, shift_id));

        let transactional = self.dispatcher.config().rollup_mode == RollupMode::Transactional;

        let mut keys = vec![key.clone()];
        keys.extend(shift_key.clone());
        if transactional {
            // The stored version decides which day the previous contribution
            // is retracted from, so its date must be declared up front.
            let previous_date = match store.get(&key)? {
                Some(document) => Some(document.decode::<Reservation>()?.date),
                None => None,
            };
            let mut dates: Vec<NaiveDate> =
                previous_date.into_iter().chain([reservation.date]).collect();
            dates.sort();
            dates.dedup();
            keys.extend(daily_keys(agency_id, &dates));
        }

        let options = self.dispatcher.config().tx_options();
        let committed = store.transact(&keys, &options, |tx| -> Result<(), EngineError> {
            if let Some(shift_key) = &shift_key {
                let shift = tx.get::<ShiftDocument>(shift_key)?;
                if shift.is_some_and(|s| s.status == ShiftStatus::Validated) {
                    return Err(DomainError::AlreadyValidated.into());
                }
            }

            let previous = tx.get::<Reservation>(&key)?;
            tx.put(&key, reservation)?;

            let Some(event) =
                ReservationEvent::recorded(agency_id, previous.as_ref(), reservation, tx.now())
            else {
                return Ok(());
            };
            tx.append_event(
                agency_id,
                key.to_string(),
                ReservationEvent::aggregate_type(),
                &event,
            )?;
            if transactional {
                apply_event(tx, agency_id, &event.into())?;
            }
            Ok(())
        });

        let committed = committed.inspect_err(|err| {
            if err.is_business_outcome() {
                debug!(%agency_id, reservation_id = %reservation.id, error = %err, "reservation rejected");
            } else {
                warn!(%agency_id, reservation_id = %reservation.id, error = %err, "reservation not recorded");
            }
        })?;

        self.dispatcher.publish(&committed.events);
        Ok(committed.events.into_iter().next())
    }
}

impl<S, B> RollupAggregator<S, B>
where
    S: DocumentStore + EventLogReader + Clone + 'static,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Start an async rebuild of the agency's rollups from its event log.
    /// Must be called from within a tokio runtime.
    pub fn rebuild_rollups(
        &self,
        agency_id: AgencyId,
        dry_run: bool,
    ) -> Result<ReplayHandle, ReplayError> {
        rebuild_rollups(
            self.dispatcher.store().clone(),
            agency_id,
            self.dispatcher.config().tx_options(),
            dry_run,
        )
    }
}
