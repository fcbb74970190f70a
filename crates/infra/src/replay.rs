//! Rollup rebuild from the agency event log.
//!
//! Disaster-recovery tooling: pages the log through [`EventLogReader`],
//! folds it into a fresh [`RollupProjection`] and compares the result with
//! the stored rollups. A dry run stops at the comparison and returns a
//! [`DriftReport`]; otherwise every rebuilt document and the deferred
//! consumer's cursor are written in one transaction.
//!
//! Rebuild against a quiescent agency: the write aborts if the log moved on
//! while the job was running.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use agencyops_core::AgencyId;
use agencyops_events::{EventEnvelope, ProjectionError, ProjectionRunner};
use agencyops_rollup::{AgencyEvent, AgencyLiveState, DailyStats, EventDecodeError, RollupProjection};

use crate::store::{
    CancelToken, Collection, DocKey, DocumentStore, EventLogReader, Query, StoreError, TxOptions,
};
use crate::workers::RollupCursor;

const PAGE_SIZE: u32 = 500;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event {sequence} does not decode: {source}")]
    Decode {
        sequence: u64,
        #[source]
        source: EventDecodeError,
    },

    #[error("event log is not replayable: {0}")]
    Projection(#[from] ProjectionError),

    #[error("event log advanced during rebuild (replayed up to {replayed}, head is past it)")]
    LogAdvanced { replayed: u64 },

    #[error("replay cancelled")]
    Cancelled,

    #[error("replay task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPhase {
    Loading,
    Replaying,
    Comparing,
    Writing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayProgress {
    pub phase: ReplayPhase,
    pub loaded_events: u64,
    pub pages: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDrift {
    pub date: NaiveDate,
    pub stored: Option<DailyStats>,
    pub rebuilt: DailyStats,
}

/// Stored rollups that disagree with a fresh fold of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub agency_id: AgencyId,
    pub events_replayed: u64,
    pub last_sequence_number: u64,
    pub daily: Vec<DailyDrift>,
    /// `(stored, rebuilt)` when the live counters differ.
    pub live: Option<(AgencyLiveState, AgencyLiveState)>,
    /// Whether the rebuilt documents were written.
    pub applied: bool,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.daily.is_empty() && self.live.is_none()
    }
}

/// Monitor and control a running rebuild.
#[derive(Debug)]
pub struct ReplayHandle {
    progress: Arc<RwLock<ReplayProgress>>,
    cancel: CancelToken,
    join: JoinHandle<Result<DriftReport, ReplayError>>,
}

impl ReplayHandle {
    pub async fn progress(&self) -> ReplayProgress {
        self.progress.read().await.clone()
    }

    /// Stop at the next page boundary; nothing is written once cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn wait(self) -> Result<DriftReport, ReplayError> {
        self.join
            .await
            .map_err(|e| ReplayError::Task(e.to_string()))?
    }
}

/// Spawn a rebuild on the current tokio runtime.
pub fn rebuild_rollups<S>(
    store: S,
    agency_id: AgencyId,
    options: TxOptions,
    dry_run: bool,
) -> Result<ReplayHandle, ReplayError>
where
    S: DocumentStore + EventLogReader + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| ReplayError::Task(e.to_string()))?;

    let progress = Arc::new(RwLock::new(ReplayProgress {
        phase: ReplayPhase::Loading,
        loaded_events: 0,
        pages: 0,
        error: None,
    }));
    let cancel = CancelToken::new();

    let join = {
        let progress = progress.clone();
        let cancel = cancel.clone();
        runtime.spawn(async move {
            let result = run_rebuild(&store, agency_id, options, dry_run, &progress, &cancel).await;

            let mut prog = progress.write().await;
            match &result {
                Ok(report) => {
                    prog.phase = ReplayPhase::Complete;
                    if !report.is_clean() {
                        warn!(
                            %agency_id,
                            days = report.daily.len(),
                            live = report.live.is_some(),
                            applied = report.applied,
                            "rollup drift detected"
                        );
                    }
                }
                Err(err) => {
                    prog.phase = ReplayPhase::Failed;
                    prog.error = Some(err.to_string());
                }
            }
            result
        })
    };

    Ok(ReplayHandle {
        progress,
        cancel,
        join,
    })
}

async fn set_phase(progress: &RwLock<ReplayProgress>, phase: ReplayPhase) {
    progress.write().await.phase = phase;
}

fn check(cancel: &CancelToken) -> Result<(), ReplayError> {
    if cancel.is_cancelled() {
        return Err(ReplayError::Cancelled);
    }
    Ok(())
}

async fn run_rebuild<S>(
    store: &S,
    agency_id: AgencyId,
    options: TxOptions,
    dry_run: bool,
    progress: &RwLock<ReplayProgress>,
    cancel: &CancelToken,
) -> Result<DriftReport, ReplayError>
where
    S: DocumentStore + EventLogReader,
{
    // Phase 1: load and decode the whole log.
    let mut envelopes: Vec<EventEnvelope<AgencyEvent>> = Vec::new();
    let mut after = 0;
    loop {
        check(cancel)?;
        let page = store.read_page(agency_id, after, PAGE_SIZE).await?;
        for stored in page.events {
            let event = AgencyEvent::decode(&stored.aggregate_type, stored.payload.clone())
                .map_err(|source| ReplayError::Decode {
                    sequence: stored.sequence_number,
                    source,
                })?;
            after = stored.sequence_number;
            envelopes.push(stored.to_envelope().map_payload(|_| event));
        }
        {
            let mut prog = progress.write().await;
            prog.loaded_events = envelopes.len() as u64;
            prog.pages += 1;
        }
        if !page.has_more {
            break;
        }
        tokio::task::yield_now().await;
    }

    // Phase 2: fold from scratch.
    check(cancel)?;
    set_phase(progress, ReplayPhase::Replaying).await;
    let (rebuilt, cursor) = ProjectionRunner::rebuild_from_scratch(RollupProjection::new, &envelopes)?;
    let last_sequence_number = cursor.map_or(0, |c| c.last_sequence_number());

    // Phase 3: compare with what is stored.
    check(cancel)?;
    set_phase(progress, ReplayPhase::Comparing).await;
    let stored_days = store
        .get_once(&Query::collection(agency_id, Collection::DailyStats))?
        .into_iter()
        .map(|document| document.decode::<DailyStats>())
        .collect::<Result<Vec<_>, _>>()?;
    let stored_live = match store.get(&DocKey::live_state(agency_id))? {
        Some(document) => document.decode::<AgencyLiveState>()?,
        None => AgencyLiveState::default(),
    };

    let dates: BTreeSet<NaiveDate> = rebuilt
        .days()
        .map(|d| d.date)
        .chain(stored_days.iter().map(|d| d.date))
        .collect();

    let mut daily = Vec::new();
    for date in &dates {
        let fresh = rebuilt.daily(*date);
        let stored = stored_days.iter().find(|d| d.date == *date).cloned();
        let matches = stored
            .as_ref()
            .map_or(fresh.same_totals(&DailyStats::empty(*date)), |s| s.same_totals(&fresh));
        if !matches {
            daily.push(DailyDrift {
                date: *date,
                stored,
                rebuilt: fresh,
            });
        }
    }

    let live = (!stored_live.same_totals(rebuilt.live()))
        .then(|| (stored_live, rebuilt.live().clone()));

    let mut report = DriftReport {
        agency_id,
        events_replayed: envelopes.len() as u64,
        last_sequence_number,
        daily,
        live,
        applied: false,
    };
    if dry_run {
        return Ok(report);
    }

    // Phase 4: write everything in one commit.
    check(cancel)?;
    set_phase(progress, ReplayPhase::Writing).await;

    let cursor_key = DocKey::rollup_cursor(agency_id);
    let mut keys: Vec<DocKey> = dates
        .iter()
        .map(|date| DocKey::daily_stats(agency_id, *date))
        .collect();
    keys.push(DocKey::live_state(agency_id));
    keys.push(cursor_key.clone());

    let options = options.with_cancel(cancel.clone());
    store
        .transact(&keys, &options, |tx| -> Result<(), ReplayError> {
            if !store.read_events(agency_id, last_sequence_number, 1)?.is_empty() {
                return Err(ReplayError::LogAdvanced {
                    replayed: last_sequence_number,
                });
            }
            for date in &dates {
                tx.put(&DocKey::daily_stats(agency_id, *date), &rebuilt.daily(*date))?;
            }
            tx.put(&DocKey::live_state(agency_id), rebuilt.live())?;
            tx.put(
                &cursor_key,
                &RollupCursor {
                    last_sequence_number,
                    updated_at: Some(tx.now()),
                },
            )?;
            Ok(())
        })
        .map_err(|err| match err {
            ReplayError::Store(StoreError::Cancelled) => ReplayError::Cancelled,
            other => other,
        })?;

    report.applied = true;
    info!(
        %agency_id,
        events = report.events_replayed,
        last_sequence = last_sequence_number,
        "rollups rebuilt"
    );
    Ok(report)
}
