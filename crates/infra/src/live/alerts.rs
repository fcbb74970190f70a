//! Live manager alerts.
//!
//! One store subscription per input stream, each consumed on its own worker
//! thread. Every delivered snapshot replaces that stream's input and triggers
//! a full recompute through [`compute_alerts`]; the result is kept as the
//! latest value and broadcast on an in-memory bus. A snapshot that fails to
//! decode is dropped with a warning and the stream keeps its last good value.
//!
//! The engine watches a single business day, fixed at start.

use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{error, warn};

use agencyops_alerts::{
    AlertInputs, AlertThresholds, DepartureSnapshot, ManagerAlert, ShiftSnapshot, compute_alerts,
};
use agencyops_boarding::{BoardingStats, TripSlotKey};
use agencyops_core::{AgencyId, DocumentAggregate, ShiftId};
use agencyops_events::{EventBus, InMemoryEventBus, Subscription};
use agencyops_reservations::Reservation;
use agencyops_rollup::DailyStats;
use agencyops_shifts::{Shift, ShiftDocument};

use crate::error::EngineError;
use crate::finance::{CashAccount, Expense, total_expenses};
use crate::store::{Collection, DocKey, DocumentStore, Query, QuerySnapshot, StoreError};
use crate::workers::{SubscriptionWorker, WorkerHandle};

#[derive(Debug, Clone, Default)]
struct Inputs {
    shifts: Vec<ShiftSnapshot>,
    departures: Vec<DepartureSnapshot>,
    daily: Option<DailyStats>,
    cash: CashAccount,
    expenses: Vec<Expense>,
    reservations: Vec<Reservation>,
}

type Now = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Shared {
    agency_id: AgencyId,
    offset: FixedOffset,
    thresholds: AlertThresholds,
    now: Now,
    inputs: Mutex<Inputs>,
    latest: RwLock<Vec<ManagerAlert>>,
    bus: InMemoryEventBus<Vec<ManagerAlert>>,
}

impl Shared {
    /// Replace one input and recompute.
    fn update(&self, assign: impl FnOnce(&mut Inputs)) {
        let Ok(mut inputs) = self.inputs.lock() else {
            error!(agency_id = %self.agency_id, "alert inputs lock poisoned, recompute skipped");
            return;
        };
        assign(&mut inputs);

        let alerts = self.compute(&inputs);
        match self.latest.write() {
            Ok(mut latest) => *latest = alerts.clone(),
            Err(_) => {
                error!(agency_id = %self.agency_id, "alert output lock poisoned");
                return;
            }
        }
        if let Err(err) = self.bus.publish(alerts) {
            error!(agency_id = %self.agency_id, error = ?err, "alert publication failed");
        }
    }

    fn compute(&self, inputs: &Inputs) -> Vec<ManagerAlert> {
        let today_revenue = inputs.daily.as_ref().map_or(0, |d| d.total_revenue);
        compute_alerts(
            &AlertInputs {
                now: (self.now)().with_timezone(&self.offset),
                shifts: &inputs.shifts,
                departures: &inputs.departures,
                cash_position: inputs.cash.balance,
                today_revenue,
                today_expenses: total_expenses(&inputs.expenses),
                reservations: &inputs.reservations,
            },
            &self.thresholds,
        )
    }
}

/// Push-driven alert feed for one agency.
pub struct LiveAlertEngine {
    shared: Arc<Shared>,
    today: NaiveDate,
    workers: Vec<WorkerHandle>,
}

impl core::fmt::Debug for LiveAlertEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LiveAlertEngine")
            .field("agency_id", &self.shared.agency_id)
            .field("today", &self.today)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl LiveAlertEngine {
    /// Subscribe to every input stream and compute the initial alert list
    /// before returning. `offset` is the agency's UTC offset; it fixes the
    /// business day and the wall-clock departures are compared against.
    pub fn start<S>(
        store: S,
        agency_id: AgencyId,
        offset: FixedOffset,
        thresholds: AlertThresholds,
    ) -> Result<Self, EngineError>
    where
        S: DocumentStore + 'static,
    {
        let today = store.now().with_timezone(&offset).date_naive();
        let day = today.format("%Y-%m-%d").to_string();

        let shifts = store.subscribe(Query::collection(agency_id, Collection::Shifts))?;
        let departures = store.subscribe(
            Query::collection(agency_id, Collection::BoardingStats).where_eq("date", day.clone()),
        )?;
        let daily = store.subscribe(Query::document(&DocKey::daily_stats(agency_id, today)))?;
        let cash = store.subscribe(Query::document(&DocKey::cash_account(agency_id)))?;
        let expenses = store.subscribe(
            Query::collection(agency_id, Collection::Expenses).where_eq("date", day.clone()),
        )?;
        let reservations = store.subscribe(
            Query::collection(agency_id, Collection::Reservations).where_eq("date", day),
        )?;

        let shared = Arc::new(Shared {
            agency_id,
            offset,
            thresholds,
            now: Box::new(move || store.now()),
            inputs: Mutex::new(Inputs::default()),
            latest: RwLock::new(Vec::new()),
            bus: InMemoryEventBus::new(),
        });

        let mut engine = Self {
            shared,
            today,
            workers: Vec::with_capacity(6),
        };

        engine.watch("alerts-shifts", shifts, decode_shifts, |i, v| i.shifts = v)?;
        engine.watch("alerts-boarding", departures, decode_departures, |i, v| i.departures = v)?;
        engine.watch("alerts-daily", daily, decode_single::<DailyStats>, |i, v| i.daily = v)?;
        engine.watch(
            "alerts-cash",
            cash,
            |s| decode_single::<CashAccount>(s).map(Option::unwrap_or_default),
            |i, v| i.cash = v,
        )?;
        engine.watch("alerts-expenses", expenses, decode_rows::<Expense>, |i, v| i.expenses = v)?;
        engine.watch(
            "alerts-reservations",
            reservations,
            decode_rows::<Reservation>,
            |i, v| i.reservations = v,
        )?;

        // Initial snapshots were folded without publishing; compute once now
        // that every stream has reported.
        engine.shared.update(|_| {});
        Ok(engine)
    }

    pub fn agency_id(&self) -> AgencyId {
        self.shared.agency_id
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Latest computed alert list.
    pub fn alerts(&self) -> Vec<ManagerAlert> {
        self.shared
            .latest
            .read()
            .map(|latest| latest.clone())
            .unwrap_or_default()
    }

    /// Every recompute from now on.
    pub fn subscribe(&self) -> Subscription<Vec<ManagerAlert>> {
        self.shared.bus.subscribe()
    }

    /// Recompute against the current time without new data; time-based
    /// rules (delays, overlong sessions) change as the clock moves.
    pub fn refresh(&self) {
        self.shared.update(|_| {});
    }

    /// Stop every stream worker. No recompute happens after this returns.
    pub fn shutdown(self) -> Result<(), EngineError> {
        let mut first_error = None;
        for worker in self.workers {
            if let Err(err) = worker.shutdown() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn watch<T, D, A>(
        &mut self,
        name: &'static str,
        subscription: Subscription<QuerySnapshot>,
        decode: D,
        assign: A,
    ) -> Result<(), EngineError>
    where
        T: Send + 'static,
        D: Fn(&QuerySnapshot) -> Result<T, StoreError> + Send + 'static,
        A: Fn(&mut Inputs, T) + Send + 'static,
    {
        // The store pushes the current result set on subscribe.
        if let Some(initial) = subscription.latest() {
            match decode(&initial) {
                Ok(value) => match self.shared.inputs.lock() {
                    Ok(mut inputs) => assign(&mut inputs, value),
                    Err(_) => error!(stream = name, "alert inputs lock poisoned"),
                },
                Err(err) => warn!(stream = name, error = %err, "initial snapshot failed to decode"),
            }
        }

        let shared = self.shared.clone();
        let worker = SubscriptionWorker::spawn(
            name,
            subscription,
            Some(self.shared.agency_id),
            move |snapshot: QuerySnapshot| {
                match decode(&snapshot) {
                    Ok(value) => shared.update(|inputs| assign(inputs, value)),
                    Err(err) => {
                        warn!(stream = name, error = %err, "snapshot failed to decode, keeping last known good");
                    }
                }
                Ok::<(), EngineError>(())
            },
        )?;
        self.workers.push(worker);
        Ok(())
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(
    snapshot: &QuerySnapshot,
) -> Result<Vec<T>, StoreError> {
    snapshot
        .documents
        .iter()
        .map(|document| document.decode())
        .collect()
}

fn decode_single<T: serde::de::DeserializeOwned>(
    snapshot: &QuerySnapshot,
) -> Result<Option<T>, StoreError> {
    snapshot
        .documents
        .first()
        .map(|document| document.decode())
        .transpose()
}

/// Shift documents go through the same validation as the lifecycle service,
/// so impossible approval flags fail the whole snapshot.
fn decode_shifts(snapshot: &QuerySnapshot) -> Result<Vec<ShiftSnapshot>, StoreError> {
    let mut shifts = Vec::with_capacity(snapshot.documents.len());
    for document in &snapshot.documents {
        let shift_id =
            ShiftId::from_str(&document.key.id).map_err(|e| StoreError::decode(&document.key, e))?;
        let body: ShiftDocument = document.decode()?;
        let shift =
            Shift::from_document(shift_id, body).map_err(|e| StoreError::decode(&document.key, e))?;
        shifts.extend(ShiftSnapshot::from_shift(&shift));
    }
    Ok(shifts)
}

fn decode_departures(snapshot: &QuerySnapshot) -> Result<Vec<DepartureSnapshot>, StoreError> {
    snapshot
        .documents
        .iter()
        .map(|document| {
            let stats: BoardingStats = document.decode()?;
            let key = TripSlotKey::from_normalized(document.key.id.clone());
            Ok(DepartureSnapshot::from_stats(key, &stats))
        })
        .collect()
}
