use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, mpsc};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use agencyops_core::AgencyId;
use agencyops_events::Subscription;

use super::clock::{Clock, SystemClock};
use super::error::StoreError;
use super::keys::{DocKey, Query};
use super::r#trait::{
    Committed, DocumentStore, EventLogReader, EventPage, QuerySnapshot, StoredDocument,
    StoredEvent, Transaction, TxOptions,
};

#[derive(Debug)]
struct Watcher {
    query: Query,
    sender: mpsc::Sender<QuerySnapshot>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<DocKey, StoredDocument>,
    logs: HashMap<AgencyId, Vec<StoredEvent>>,
    watchers: Vec<Watcher>,
    last_issued: Option<DateTime<Utc>>,
}

impl Inner {
    /// Server timestamps strictly increase in issuance order, even if the
    /// clock stalls or steps back.
    fn issue_timestamp(&mut self, clock_now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last_issued {
            Some(last) if clock_now <= last => last + Duration::microseconds(1),
            _ => clock_now,
        };
        self.last_issued = Some(ts);
        ts
    }

    fn query(&self, query: &Query) -> Vec<StoredDocument> {
        self.documents
            .iter()
            .filter(|(key, doc)| query.matches(key, &doc.body))
            .map(|(_, doc)| doc.clone())
            .collect()
    }
}

/// In-memory transactional document store.
///
/// Single process, no durability. Intended for tests, benchmarks and the
/// simulator.
#[derive(Debug)]
pub struct InMemoryDocumentStore<C = SystemClock> {
    inner: Mutex<Inner>,
    clock: C,
    available: AtomicBool,
}

impl InMemoryDocumentStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryDocumentStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryDocumentStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Simulate an outage: every operation fails with `Unavailable` until
    /// switched back on.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn check_deadline(options: &TxOptions, deadline: Option<Instant>) -> Result<(), StoreError> {
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(StoreError::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }

    /// Validate, apply and notify. Called with the lock held.
    /// Validate and apply under the store lock. The commit timestamp is issued
    /// here, so timestamps follow commit order.
    fn commit(
        inner: &mut Inner,
        tx: Transaction,
        clock_now: DateTime<Utc>,
    ) -> Result<(Vec<StoredEvent>, DateTime<Utc>), Transaction> {
        let stale = tx.read_versions().any(|(key, expected)| {
            !expected.matches(inner.documents.get(key).map(|doc| doc.version))
        });
        if stale {
            return Err(tx);
        }

        let committed_at = inner.issue_timestamp(clock_now);
        let changes = tx.into_changes(committed_at);
        let touched: Vec<DocKey> = changes.writes.keys().cloned().collect();

        for (key, body) in changes.writes {
            let version = inner.documents.get(&key).map(|d| d.version).unwrap_or(0) + 1;
            inner.documents.insert(
                key.clone(),
                StoredDocument {
                    key,
                    version,
                    updated_at: committed_at,
                    body,
                },
            );
        }

        let mut sequenced = Vec::with_capacity(changes.events.len());
        for event in changes.events {
            let log = inner.logs.entry(event.agency_id).or_default();
            let stored = StoredEvent {
                event_id: event.event_id,
                agency_id: event.agency_id,
                stream_key: event.stream_key,
                aggregate_type: event.aggregate_type,
                sequence_number: log.len() as u64 + 1,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            };
            log.push(stored.clone());
            sequenced.push(stored);
        }

        if !touched.is_empty() {
            Self::notify(inner, &touched, committed_at);
        }

        Ok((sequenced, committed_at))
    }

    fn notify(inner: &mut Inner, touched: &[DocKey], at: DateTime<Utc>) {
        let mut watchers = std::mem::take(&mut inner.watchers);
        watchers.retain(|w| {
            if !touched.iter().any(|key| w.query.covers(key)) {
                return true;
            }
            let snapshot = QuerySnapshot {
                query: w.query.clone(),
                documents: inner.query(&w.query),
                at,
            };
            // A failed send means the subscriber is gone.
            w.sender.send(snapshot).is_ok()
        });
        inner.watchers = watchers;
    }
}

impl<C: Clock> DocumentStore for InMemoryDocumentStore<C> {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn transact<T, E, F>(
        &self,
        keys: &[DocKey],
        options: &TxOptions,
        mut work: F,
    ) -> Result<Committed<T>, E>
    where
        F: FnMut(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let max_attempts = options.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            Self::check_deadline(options, deadline)?;

            let mut tx = {
                let mut inner = self.lock()?;
                let snapshot = keys
                    .iter()
                    .map(|key| (key.clone(), inner.documents.get(key).cloned()))
                    .collect();
                let now = inner.issue_timestamp(self.clock.now());
                Transaction::new(snapshot, now)
            };

            let value = work(&mut tx)?;

            let mut inner = self.lock()?;
            Self::check_deadline(options, deadline)?;
            match Self::commit(&mut inner, tx, self.clock.now()) {
                Ok((events, committed_at)) => {
                    return Ok(Committed {
                        value,
                        events,
                        committed_at,
                        attempts: attempt,
                    });
                }
                Err(_) => {
                    debug!(attempt, "transaction conflict, retrying");
                }
            }
        }

        Err(StoreError::Contention {
            attempts: max_attempts,
        }
        .into())
    }

    fn get(&self, key: &DocKey) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.lock()?.documents.get(key).cloned())
    }

    fn get_once(&self, query: &Query) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.lock()?.query(query))
    }

    fn subscribe(&self, query: Query) -> Result<Subscription<QuerySnapshot>, StoreError> {
        let mut inner = self.lock()?;
        let (sender, receiver) = mpsc::channel();
        let initial = QuerySnapshot {
            query: query.clone(),
            documents: inner.query(&query),
            at: self.clock.now(),
        };
        // The receiver is alive here, so this cannot fail.
        let _ = sender.send(initial);
        inner.watchers.push(Watcher { query, sender });
        Ok(Subscription::new(receiver))
    }

    fn read_events(
        &self,
        agency_id: AgencyId,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let inner = self.lock()?;
        let Some(log) = inner.logs.get(&agency_id) else {
            return Ok(vec![]);
        };
        // Sequence numbers are gap-free from 1, so they double as indexes.
        let start = usize::try_from(after_sequence).unwrap_or(usize::MAX).min(log.len());
        Ok(log[start..].iter().take(limit).cloned().collect())
    }
}

#[async_trait::async_trait]
impl<C: Clock> EventLogReader for InMemoryDocumentStore<C> {
    async fn read_page(
        &self,
        agency_id: AgencyId,
        after_sequence: u64,
        limit: u32,
    ) -> Result<EventPage, StoreError> {
        let limit = limit.clamp(1, 1000) as usize;
        let mut events = self.read_events(agency_id, after_sequence, limit + 1)?;
        let has_more = events.len() > limit;
        events.truncate(limit);
        Ok(EventPage { events, has_more })
    }
}

impl<R: EventLogReader + ?Sized> EventLogReaderExt for R {}

/// Convenience for draining a whole log through [`EventLogReader`].
#[async_trait::async_trait]
pub trait EventLogReaderExt: EventLogReader {
    async fn read_all(&self, agency_id: AgencyId) -> Result<Vec<StoredEvent>, StoreError> {
        let mut all = Vec::new();
        let mut after = 0;
        loop {
            let page = self.read_page(agency_id, after, 1000).await?;
            if let Some(last) = page.events.last() {
                after = last.sequence_number;
            }
            all.extend(page.events);
            if !page.has_more {
                return Ok(all);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::clock::ManualClock;
    use crate::store::keys::Collection;
    use crate::store::r#trait::CancelToken;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    fn key(agency: AgencyId, id: &str) -> DocKey {
        DocKey::new(agency, Collection::Expenses, id)
    }

    #[test]
    fn conflicting_write_triggers_a_retry() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let agency = AgencyId::new();
        let k = key(agency, "e1");
        let runs = AtomicU32::new(0);

        let committed = store
            .transact(&[k.clone()], &TxOptions::default(), |tx| {
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    // Another writer commits between our snapshot and commit.
                    store.transact(&[k.clone()], &TxOptions::default(), |inner| {
                        inner.put(&k, &json!({"amount": 1}))
                    })?;
                }
                tx.put(&k, &json!({"amount": 2}))
            })
            .unwrap();

        assert_eq!(committed.attempts, 2);
        let doc = store.get(&k).unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body, json!({"amount": 2}));
    }

    #[test]
    fn exhausted_attempts_fail_with_contention() {
        let store = InMemoryDocumentStore::new();
        let k = key(AgencyId::new(), "e1");
        let options = TxOptions {
            max_attempts: 3,
            ..TxOptions::default()
        };

        let result: Result<Committed<()>, StoreError> = store.transact(&[k.clone()], &options, |tx| {
            store.transact(&[k.clone()], &TxOptions::default(), |inner| {
                inner.put(&k, &json!({}))
            })?;
            tx.put(&k, &json!({"lost": true}))
        });

        assert_eq!(result.unwrap_err(), StoreError::Contention { attempts: 3 });
        assert_eq!(store.get(&k).unwrap().unwrap().body, json!({}));
    }

    #[test]
    fn expired_deadline_commits_nothing() {
        let store = InMemoryDocumentStore::new();
        let agency = AgencyId::new();
        let k = key(agency, "e1");
        let options = TxOptions {
            timeout: Some(std::time::Duration::from_millis(20)),
            ..TxOptions::default()
        };

        let result: Result<Committed<()>, StoreError> = store.transact(&[k.clone()], &options, |tx| {
            std::thread::sleep(std::time::Duration::from_millis(40));
            tx.put(&k, &json!({}))
        });

        assert_eq!(result.unwrap_err(), StoreError::Timeout);
        assert!(store.get(&k).unwrap().is_none());
        assert!(store.read_events(agency, 0, 10).unwrap().is_empty());
    }

    #[test]
    fn cancelled_transaction_never_runs() {
        let store = InMemoryDocumentStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let options = TxOptions::default().with_cancel(cancel);

        let result: Result<Committed<()>, StoreError> =
            store.transact(&[], &options, |_| panic!("work must not run"));
        assert_eq!(result.unwrap_err(), StoreError::Cancelled);
    }

    #[test]
    fn offline_store_is_unavailable() {
        let store = InMemoryDocumentStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get(&key(AgencyId::new(), "x")),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn subscription_pushes_initial_and_changed_result_sets() {
        let store = InMemoryDocumentStore::new();
        let agency = AgencyId::new();
        let k = key(agency, "e1");
        let sub = store
            .subscribe(Query::collection(agency, Collection::Expenses))
            .unwrap();

        assert!(sub.recv().unwrap().documents.is_empty());

        store
            .transact(&[k.clone()], &TxOptions::default(), |tx| tx.put(&k, &json!({"amount": 3})))
            .unwrap();
        let snapshot = sub.recv().unwrap();
        assert_eq!(snapshot.documents.len(), 1);

        // Writes to another agency do not wake this subscriber.
        let other = key(AgencyId::new(), "e1");
        store
            .transact(&[other.clone()], &TxOptions::default(), |tx| tx.put(&other, &json!({})))
            .unwrap();
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = InMemoryDocumentStore::new();
        let agency = AgencyId::new();
        let k = key(agency, "e1");
        let sub = store
            .subscribe(Query::collection(agency, Collection::Expenses))
            .unwrap();
        sub.unsubscribe();

        store
            .transact(&[k.clone()], &TxOptions::default(), |tx| tx.put(&k, &json!({})))
            .unwrap();
        assert!(store.lock().unwrap().watchers.is_empty());
    }

    #[test]
    fn timestamps_stay_monotonic_when_the_clock_stalls() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = InMemoryDocumentStore::with_clock(clock.clone());
        let k = key(AgencyId::new(), "e1");

        let first = store
            .transact(&[k.clone()], &TxOptions::default(), |tx| tx.put(&k, &json!({})))
            .unwrap();
        clock.advance(Duration::seconds(-5));
        let second = store
            .transact(&[k.clone()], &TxOptions::default(), |tx| tx.put(&k, &json!({})))
            .unwrap();

        assert!(second.committed_at > first.committed_at);
    }

    #[test]
    fn timestamps_follow_commit_order() {
        let store = InMemoryDocumentStore::with_clock(Arc::new(ManualClock::new(Utc::now())));
        let agency = AgencyId::new();
        let (outer_key, inner_key) = (key(agency, "outer"), key(agency, "inner"));

        let mut inner = None;
        let outer = store
            .transact(&[outer_key.clone()], &TxOptions::default(), |tx| {
                let started = tx.now();
                if inner.is_none() {
                    inner = Some(
                        store
                            .transact(&[inner_key.clone()], &TxOptions::default(), |tx| {
                                let now = tx.now();
                                tx.put(&inner_key, &json!({ "at": now }))
                            })
                            .unwrap(),
                    );
                }
                tx.put(&outer_key, &json!({ "at": started, "nested": [started] }))
            })
            .unwrap();
        let inner = inner.unwrap();

        assert!(outer.committed_at > inner.committed_at);
        let stored = store.get(&outer_key).unwrap().unwrap();
        assert_eq!(stored.updated_at, outer.committed_at);
        let stamped = serde_json::to_value(outer.committed_at).unwrap();
        assert_eq!(stored.body["at"], stamped);
        assert_eq!(stored.body["nested"][0], stamped);
        let inner_doc = store.get(&inner_key).unwrap().unwrap();
        assert_eq!(inner_doc.body["at"], serde_json::to_value(inner.committed_at).unwrap());
    }

    #[tokio::test]
    async fn paged_reader_walks_the_whole_log() {
        let store = InMemoryDocumentStore::new();
        let agency = AgencyId::new();
        let k = key(agency, "e1");

        #[derive(Debug, Clone, serde::Serialize)]
        struct Ping;
        impl agencyops_events::Event for Ping {
            fn event_type(&self) -> &'static str {
                "test.ping"
            }
            fn version(&self) -> u32 {
                1
            }
            fn occurred_at(&self) -> DateTime<Utc> {
                DateTime::<Utc>::UNIX_EPOCH
            }
        }

        for _ in 0..5 {
            store
                .transact(&[k.clone()], &TxOptions::default(), |tx| {
                    tx.put(&k, &json!({}))?;
                    tx.append_event(agency, k.to_string(), "test", &Ping)
                })
                .unwrap();
        }

        let page = store.read_page(agency, 0, 2).await.unwrap();
        assert_eq!(page.events.len(), 2);
        assert!(page.has_more);

        let all = store.read_all(agency).await.unwrap();
        let seqs: Vec<u64> = all.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }
}
