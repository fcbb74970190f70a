//! Deferred rollup application.
//!
//! In [`RollupMode::Deferred`](crate::config::RollupMode::Deferred) detail
//! transactions only append events. The consumer folds them into the rollups
//! afterwards, in log order, with the per-agency sequence number as the
//! idempotency key: a persisted cursor records the last applied sequence and
//! anything at or below it is skipped. Bus deliveries are only wake-ups; the
//! log is the source of truth, so lost or duplicated deliveries are harmless.
//!
//! Consistency window: bus latency plus one catch-up transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error};

use agencyops_core::AgencyId;
use agencyops_events::{EventBus, EventEnvelope};
use agencyops_rollup::AgencyEvent;

use crate::error::EngineError;
use crate::services::rollup::{apply_event, rollup_keys};
use crate::store::{DocKey, DocumentStore, StoredEvent, TxOptions};
use crate::workers::{SubscriptionWorker, WorkerHandle};

const BATCH_SIZE: usize = 256;

/// Persisted progress of the rollup consumer for one agency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupCursor {
    pub last_sequence_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RollupConsumer<S> {
    store: S,
    options: TxOptions,
}

impl<S> RollupConsumer<S>
where
    S: DocumentStore,
{
    pub fn new(store: S, options: TxOptions) -> Self {
        Self { store, options }
    }

    pub fn cursor(&self, agency_id: AgencyId) -> Result<RollupCursor, EngineError> {
        match self.store.get(&DocKey::rollup_cursor(agency_id))? {
            Some(document) => Ok(document.decode()?),
            None => Ok(RollupCursor::default()),
        }
    }

    /// Bus delivery: skip it if already covered, otherwise catch up.
    pub fn handle(&self, envelope: &EventEnvelope<JsonValue>) -> Result<usize, EngineError> {
        let agency_id = envelope.agency_id();
        if envelope.sequence_number() <= self.cursor(agency_id)?.last_sequence_number {
            debug!(%agency_id, sequence = envelope.sequence_number(), "rollup delivery already applied");
            return Ok(0);
        }
        self.catch_up(agency_id)
    }

    /// Apply every logged event past the cursor. Returns how many were
    /// applied.
    pub fn catch_up(&self, agency_id: AgencyId) -> Result<usize, EngineError> {
        let mut applied = 0;
        loop {
            let after = self.cursor(agency_id)?.last_sequence_number;
            let batch = self.store.read_events(agency_id, after, BATCH_SIZE)?;
            if batch.is_empty() {
                return Ok(applied);
            }
            applied += self.apply_batch(agency_id, &batch)?;
        }
    }

    fn apply_batch(
        &self,
        agency_id: AgencyId,
        batch: &[StoredEvent],
    ) -> Result<usize, EngineError> {
        let decoded: Vec<(u64, Option<AgencyEvent>)> = batch
            .iter()
            .map(|stored| {
                let event = AgencyEvent::decode(&stored.aggregate_type, stored.payload.clone())
                    .inspect_err(|err| {
                        error!(
                            %agency_id,
                            sequence = stored.sequence_number,
                            error = %err,
                            "skipping undecodable event in rollup consumer"
                        );
                    })
                    .ok();
                (stored.sequence_number, event)
            })
            .collect();

        let dates: BTreeSet<NaiveDate> = decoded
            .iter()
            .filter_map(|(_, event)| event.as_ref())
            .flat_map(AgencyEvent::daily_dates)
            .collect();
        let dates: Vec<NaiveDate> = dates.into_iter().collect();

        let cursor_key = DocKey::rollup_cursor(agency_id);
        let mut keys = rollup_keys(agency_id, &dates);
        keys.push(cursor_key.clone());

        let committed = self.store.transact(&keys, &self.options, |tx| -> Result<usize, EngineError> {
            let mut cursor = tx.get::<RollupCursor>(&cursor_key)?.unwrap_or_default();
            let mut applied = 0;
            for (sequence, event) in &decoded {
                if *sequence <= cursor.last_sequence_number {
                    continue;
                }
                if let Some(event) = event {
                    apply_event(tx, agency_id, event)?;
                    applied += 1;
                }
                cursor.last_sequence_number = *sequence;
            }
            cursor.updated_at = Some(tx.now());
            tx.put(&cursor_key, &cursor)?;
            Ok(applied)
        })?;

        Ok(committed.value)
    }
}

impl<S> RollupConsumer<S>
where
    S: DocumentStore + 'static,
{
    /// Consume the event bus on a background thread.
    pub fn spawn<B>(self, bus: &B, agency_id: Option<AgencyId>) -> Result<WorkerHandle, EngineError>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        SubscriptionWorker::spawn_on_bus("rollup-consumer", bus, agency_id, move |envelope| {
            self.handle(&envelope).map(|_| ())
        })
    }
}
