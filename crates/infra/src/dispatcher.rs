//! Command execution pipeline for document-backed aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Read the aggregate document inside a store transaction
//!   ↓
//! 2. Decode it (strict schema; invalid documents are rejected)
//!   ↓
//! 3. Handle the command (pure decision logic, produces events)
//!   ↓
//! 4. Write the new document, append the events to the agency log and, in
//!    transactional rollup mode, fold them into the rollups; one commit
//!   ↓
//! 5. Publish the committed events on the bus
//! ```
//!
//! Concurrency is the store's job: a conflicting commit re-runs steps 1-4
//! against fresh documents, so a capacity check and its increment can never
//! be split.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use agencyops_core::{AgencyId, DocumentAggregate, DomainError};
use agencyops_events::{Event, EventBus, EventEnvelope, execute};
use agencyops_rollup::AgencyEvent;

use crate::config::{EngineConfig, RollupMode};
use crate::error::EngineError;
use crate::services::rollup::{apply_event, rollup_keys};
use crate::store::{DocKey, DocumentStore, StoredEvent};

/// Outcome of a dispatched command.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    /// Aggregate state after the command.
    pub aggregate: A,
    /// Events committed by the command; empty for idempotent no-ops.
    pub events: Vec<StoredEvent>,
}

#[derive(Debug, Clone)]
pub struct Dispatcher<S, B> {
    store: S,
    bus: B,
    config: EngineConfig,
}

impl<S, B> Dispatcher<S, B> {
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S, B> Dispatcher<S, B>
where
    S: DocumentStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one command against the aggregate stored at `doc_key`.
    ///
    /// `rollup_dates` are the days whose [`DailyStats`](agencyops_rollup::DailyStats)
    /// the resulting events may touch; their documents are declared in the
    /// transaction so the rollup deltas commit together with the detail write.
    /// `make_command` receives the server timestamp of the attempt.
    pub fn dispatch<A, F>(
        &self,
        agency_id: AgencyId,
        id: A::Id,
        doc_key: &DocKey,
        rollup_dates: &[NaiveDate],
        make_command: F,
    ) -> Result<Dispatched<A>, EngineError>
    where
        A: DocumentAggregate<Error = DomainError>,
        A::Document: Serialize + DeserializeOwned,
        A::Event: Event + Serialize + Into<AgencyEvent>,
        F: Fn(DateTime<Utc>) -> A::Command,
    {
        let transactional = self.config.rollup_mode == RollupMode::Transactional;

        let mut keys = vec![doc_key.clone()];
        if transactional {
            keys.extend(rollup_keys(agency_id, rollup_dates));
        }

        let options = self.config.tx_options();
        let result = self.store.transact(&keys, &options, |tx| -> Result<A, EngineError> {
            let mut aggregate = match tx.get::<A::Document>(doc_key)? {
                Some(document) => A::from_document(id.clone(), document)?,
                None => A::empty(id.clone()),
            };

            let command = make_command(tx.now());
            let events = execute(&mut aggregate, &command)?;
            if events.is_empty() {
                return Ok(aggregate);
            }

            tx.put(doc_key, &aggregate.to_document())?;
            for event in &events {
                tx.append_event(agency_id, doc_key.to_string(), A::aggregate_type(), event)?;
                if transactional {
                    apply_event(tx, agency_id, &event.clone().into())?;
                }
            }
            Ok(aggregate)
        });

        let committed = match result {
            Ok(committed) => committed,
            Err(err) => {
                if err.is_business_outcome() {
                    debug!(%agency_id, key = %doc_key, error = %err, "command rejected");
                } else {
                    warn!(%agency_id, key = %doc_key, error = %err, "command failed");
                }
                return Err(err);
            }
        };

        self.publish(&committed.events);

        Ok(Dispatched {
            aggregate: committed.value,
            events: committed.events,
        })
    }

    /// Publish committed events. The log already holds them, so a failed
    /// publication only delays consumers until the next wake-up.
    pub(crate) fn publish(&self, events: &[StoredEvent]) {
        for event in events {
            if let Err(err) = self.bus.publish(event.to_envelope()) {
                warn!(
                    agency_id = %event.agency_id,
                    sequence = event.sequence_number,
                    error = ?err,
                    "event publication failed after commit"
                );
            }
        }
    }
}
