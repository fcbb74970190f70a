use std::sync::{Arc, RwLock};

use tracing::warn;

use agencyops_core::{AgencyId, ShiftId};
use agencyops_events::{EventBus, InMemoryEventBus, Subscription};
use agencyops_reservations::{Reservation, SessionRevenue, fold_session_revenue};

use crate::error::EngineError;
use crate::store::{Collection, DocumentStore, Query, QuerySnapshot};
use crate::workers::{SubscriptionWorker, WorkerHandle};

/// Live revenue of one cashier session, refolded from its reservations on
/// every change. Reservations recorded after the shift closed are included.
#[derive(Debug)]
pub struct SessionRevenueWatcher {
    shift_id: ShiftId,
    latest: Arc<RwLock<SessionRevenue>>,
    bus: Arc<InMemoryEventBus<SessionRevenue>>,
    worker: WorkerHandle,
}

impl SessionRevenueWatcher {
    pub fn start<S: DocumentStore>(
        store: &S,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<Self, EngineError> {
        let subscription = store.subscribe(
            Query::collection(agency_id, Collection::Reservations)
                .where_eq("shiftId", shift_id.to_string()),
        )?;

        let initial = match subscription.latest() {
            Some(snapshot) => fold(shift_id, &snapshot)?,
            None => SessionRevenue::default(),
        };
        let latest = Arc::new(RwLock::new(initial));
        let bus = Arc::new(InMemoryEventBus::new());

        let worker = {
            let latest = latest.clone();
            let bus = bus.clone();
            SubscriptionWorker::spawn(
                "session-revenue",
                subscription,
                Some(agency_id),
                move |snapshot: QuerySnapshot| {
                    let revenue = match fold(shift_id, &snapshot) {
                        Ok(revenue) => revenue,
                        Err(err) => {
                            warn!(%shift_id, error = %err, "reservation snapshot failed to decode, keeping last total");
                            return Ok(());
                        }
                    };
                    if let Ok(mut current) = latest.write() {
                        *current = revenue;
                    }
                    bus.publish(revenue).map_err(|e| EngineError::Worker {
                        name: "session-revenue",
                        reason: format!("{e:?}"),
                    })
                },
            )?
        };

        Ok(Self {
            shift_id,
            latest,
            bus,
            worker,
        })
    }

    pub fn shift_id(&self) -> ShiftId {
        self.shift_id
    }

    pub fn revenue(&self) -> SessionRevenue {
        self.latest.read().map(|r| *r).unwrap_or_default()
    }

    pub fn subscribe(&self) -> Subscription<SessionRevenue> {
        self.bus.subscribe()
    }

    pub fn shutdown(self) -> Result<(), EngineError> {
        self.worker.shutdown()
    }
}

fn fold(shift_id: ShiftId, snapshot: &QuerySnapshot) -> Result<SessionRevenue, EngineError> {
    let reservations = snapshot
        .documents
        .iter()
        .map(|document| document.decode::<Reservation>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fold_session_revenue(shift_id, &reservations))
}
