use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use agencyops_core::{AgencyId, ExpectedVersion};
use agencyops_events::{AgencyScoped, Event, EventEnvelope, Subscription};

use super::error::StoreError;
use super::keys::{DocKey, Query};

/// A document as stored, with its optimistic concurrency version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub key: DocKey,
    /// Starts at 1 on creation; +1 per committed write.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub body: JsonValue,
}

impl StoredDocument {
    /// Decode boundary: a document that does not match its schema is an error,
    /// never a silently defaulted value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|e| StoreError::decode(&self.key, e))
    }
}

/// Full result set of a query, pushed on subscribe and after every commit
/// that touches the queried collection.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub query: Query,
    pub documents: Vec<StoredDocument>,
    pub at: DateTime<Utc>,
}

impl QuerySnapshot {
    pub fn decode_all<T: DeserializeOwned>(&self) -> Result<Vec<(DocKey, T)>, StoreError> {
        self.documents
            .iter()
            .map(|doc| doc.decode().map(|body| (doc.key.clone(), body)))
            .collect()
    }
}

impl AgencyScoped for QuerySnapshot {
    fn agency_id(&self) -> AgencyId {
        self.query.agency_id
    }
}

/// An entry of the per-agency event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub agency_id: AgencyId,
    /// Document key of the aggregate that emitted the event.
    pub stream_key: String,
    pub aggregate_type: String,
    /// Gap-free, starting at 1, per agency.
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl StoredEvent {
    /// Convert into an agency-scoped envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.agency_id,
            self.stream_key.clone(),
            self.aggregate_type.clone(),
            self.sequence_number,
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

/// An event recorded by a transaction, not yet sequenced.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub agency_id: AgencyId,
    pub stream_key: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

/// Shared cancellation flag for transactions and replay jobs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TxOptions {
    /// Overall deadline, measured from the first attempt.
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    pub cancel: Option<CancelToken>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(2000)),
            max_attempts: 16,
            cancel: None,
        }
    }
}

impl TxOptions {
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Result of a committed transaction.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    /// Events appended by this transaction, sequenced.
    pub events: Vec<StoredEvent>,
    pub committed_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Unit of work handed to a transaction's work closure.
///
/// Reads come from a snapshot of the declared keys taken at the start of the
/// attempt; writes and events are buffered and only become visible on commit.
#[derive(Debug)]
pub struct Transaction {
    snapshot: BTreeMap<DocKey, Option<StoredDocument>>,
    writes: BTreeMap<DocKey, JsonValue>,
    events: Vec<NewEvent>,
    now: DateTime<Utc>,
}

/// Buffered changes of a finished attempt.
#[derive(Debug)]
pub struct TxChanges {
    pub writes: BTreeMap<DocKey, JsonValue>,
    pub events: Vec<NewEvent>,
}

impl Transaction {
    pub fn new(snapshot: BTreeMap<DocKey, Option<StoredDocument>>, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            writes: BTreeMap::new(),
            events: Vec::new(),
            now,
        }
    }

    /// Provisional server timestamp of this attempt. Unique per attempt; every
    /// copy of it in written documents and events is re-stamped with the
    /// commit timestamp. The work closure's own return value is not.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Version each declared key must still have at commit.
    pub fn read_versions(&self) -> impl Iterator<Item = (&DocKey, ExpectedVersion)> {
        self.snapshot.iter().map(|(key, doc)| {
            let expected = match doc {
                Some(d) => ExpectedVersion::Exact(d.version),
                None => ExpectedVersion::Absent,
            };
            (key, expected)
        })
    }

    /// Buffered changes, re-stamped from the provisional timestamp to
    /// `committed_at`.
    pub fn into_changes(self, committed_at: DateTime<Utc>) -> TxChanges {
        let Self {
            mut writes,
            mut events,
            now,
            ..
        } = self;
        if committed_at != now {
            if let (Ok(from), Ok(to)) =
                (serde_json::to_value(now), serde_json::to_value(committed_at))
            {
                for body in writes.values_mut() {
                    restamp(body, &from, &to);
                }
                for event in &mut events {
                    restamp(&mut event.payload, &from, &to);
                }
            }
            for event in &mut events {
                event.occurred_at = committed_at;
            }
        }
        TxChanges { writes, events }
    }

    fn declared(&self, key: &DocKey) -> Result<(), StoreError> {
        if self.snapshot.contains_key(key) {
            Ok(())
        } else {
            Err(StoreError::UndeclaredKey(key.to_string()))
        }
    }

    /// Raw read; sees this transaction's own writes.
    pub fn read(&self, key: &DocKey) -> Result<Option<&JsonValue>, StoreError> {
        self.declared(key)?;
        if let Some(pending) = self.writes.get(key) {
            return Ok(Some(pending));
        }
        Ok(self
            .snapshot
            .get(key)
            .and_then(|doc| doc.as_ref())
            .map(|doc| &doc.body))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &DocKey) -> Result<Option<T>, StoreError> {
        match self.read(key)? {
            Some(body) => serde_json::from_value(body.clone())
                .map(Some)
                .map_err(|e| StoreError::decode(key, e)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&mut self, key: &DocKey, document: &T) -> Result<(), StoreError> {
        self.declared(key)?;
        let body = serde_json::to_value(document).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.writes.insert(key.clone(), body);
        Ok(())
    }

    /// Record an event; it is sequenced and appended to the agency log in the
    /// same commit as the document writes.
    pub fn append_event<E>(
        &mut self,
        agency_id: AgencyId,
        stream_key: impl Into<String>,
        aggregate_type: impl Into<String>,
        event: &E,
    ) -> Result<(), StoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.events.push(NewEvent {
            event_id: Uuid::now_v7(),
            agency_id,
            stream_key: stream_key.into(),
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: self.now,
            payload,
        });
        Ok(())
    }
}

fn restamp(value: &mut JsonValue, from: &JsonValue, to: &JsonValue) {
    if *value == *from {
        *value = to.clone();
        return;
    }
    match value {
        JsonValue::Array(items) => items.iter_mut().for_each(|item| restamp(item, from, to)),
        JsonValue::Object(fields) => fields.values_mut().for_each(|field| restamp(field, from, to)),
        _ => {}
    }
}

/// Transactional document store boundary.
///
/// ## Transactions
///
/// `transact` runs `work` against a snapshot of `keys`, then commits its
/// buffered writes and events atomically if none of the declared keys changed
/// in between. On conflict the work is re-run against a fresh snapshot, up to
/// `options.max_attempts`. An `Err` from `work` aborts without retry and
/// without committing anything.
///
/// The deadline and cancellation flag are checked before each attempt and
/// again immediately before commit.
///
/// ## Subscriptions
///
/// `subscribe` pushes the full current result set immediately, then again
/// after every commit that writes into the queried collection.
pub trait DocumentStore: Send + Sync {
    /// Current server time.
    fn now(&self) -> DateTime<Utc>;

    fn transact<T, E, F>(
        &self,
        keys: &[DocKey],
        options: &TxOptions,
        work: F,
    ) -> Result<Committed<T>, E>
    where
        F: FnMut(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>;

    fn get(&self, key: &DocKey) -> Result<Option<StoredDocument>, StoreError>;

    fn get_once(&self, query: &Query) -> Result<Vec<StoredDocument>, StoreError>;

    fn subscribe(&self, query: Query) -> Result<Subscription<QuerySnapshot>, StoreError>;

    /// Events of one agency with `sequence_number > after_sequence`, in order.
    fn read_events(
        &self,
        agency_id: AgencyId,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError>;
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn transact<T, E, F>(
        &self,
        keys: &[DocKey],
        options: &TxOptions,
        work: F,
    ) -> Result<Committed<T>, E>
    where
        F: FnMut(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transact(keys, options, work)
    }

    fn get(&self, key: &DocKey) -> Result<Option<StoredDocument>, StoreError> {
        (**self).get(key)
    }

    fn get_once(&self, query: &Query) -> Result<Vec<StoredDocument>, StoreError> {
        (**self).get_once(query)
    }

    fn subscribe(&self, query: Query) -> Result<Subscription<QuerySnapshot>, StoreError> {
        (**self).subscribe(query)
    }

    fn read_events(
        &self,
        agency_id: AgencyId,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).read_events(agency_id, after_sequence, limit)
    }
}

/// One page of an agency log.
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<StoredEvent>,
    pub has_more: bool,
}

/// Async, paged reader over the agency event log (disaster recovery replay).
#[async_trait::async_trait]
pub trait EventLogReader: Send + Sync {
    async fn read_page(
        &self,
        agency_id: AgencyId,
        after_sequence: u64,
        limit: u32,
    ) -> Result<EventPage, StoreError>;
}

#[async_trait::async_trait]
impl<S> EventLogReader for Arc<S>
where
    S: EventLogReader + ?Sized,
{
    async fn read_page(
        &self,
        agency_id: AgencyId,
        after_sequence: u64,
        limit: u32,
    ) -> Result<EventPage, StoreError> {
        (**self).read_page(agency_id, after_sequence, limit).await
    }
}
