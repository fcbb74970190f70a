//! Simulated operating day for one agency, driving every engine component
//! against the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use anyhow::Context;
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use agencyops_boarding::{ScheduleInfo, TripSlotKey};
use agencyops_core::{AgencyId, DomainError, ReservationId, ShiftId, UserId};
use agencyops_events::{EventEnvelope, InMemoryEventBus};
use agencyops_infra::store::{DocKey, DocumentStore, TxOptions};
use agencyops_infra::{
    BoardingCounter, CashAccount, Dispatcher, EngineConfig, EngineError, Expense,
    InMemoryDocumentStore, LiveAlertEngine, RollupAggregator, RollupConsumer, RollupMode,
    SessionRevenueWatcher, ShiftLifecycle,
};
use agencyops_reservations::{BoardingMark, Reservation};

type Store = Arc<InMemoryDocumentStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

const COUNTERS: usize = 4;

struct Agency {
    id: AgencyId,
    store: Store,
    boarding: BoardingCounter<Store, Bus>,
    shifts: ShiftLifecycle<Store, Bus>,
    rollups: RollupAggregator<Store, Bus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agencyops_observability::init();

    let config = EngineConfig::from_env().context("loading engine configuration")?;
    info!(?config, "starting simulated day");

    let store: Store = Arc::new(InMemoryDocumentStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Dispatcher::new(store.clone(), bus.clone(), config.clone());
    let agency = Agency {
        id: AgencyId::new(),
        store: store.clone(),
        boarding: BoardingCounter::new(dispatcher.clone()),
        shifts: ShiftLifecycle::new(dispatcher.clone()),
        rollups: RollupAggregator::new(dispatcher),
    };

    let consumer = match config.rollup_mode {
        RollupMode::Deferred => Some(
            RollupConsumer::new(store.clone(), config.tx_options()).spawn(&bus, Some(agency.id))?,
        ),
        RollupMode::Transactional => None,
    };

    // Dakar runs on UTC.
    let offset = FixedOffset::east_opt(0).context("agency offset")?;
    let alerts = LiveAlertEngine::start(store.clone(), agency.id, offset, config.thresholds)?;
    let today = alerts.today();

    let departures = [(7, 30), (10, 45), (15, 18)];
    let mut slots = Vec::with_capacity(departures.len());
    for (hour, capacity) in departures {
        let schedule = schedule(today, "Thiès", hour)?;
        let key = schedule.slot_key()?;
        agency.boarding.ensure_slot(agency.id, &key, capacity, &schedule)?;
        slots.push(key);
    }

    let morning = ShiftId::new();
    let evening = ShiftId::new();
    agency.shifts.open_shift(agency.id, morning, UserId::new())?;
    agency.shifts.open_shift(agency.id, evening, UserId::new())?;
    let revenue = SessionRevenueWatcher::start(&store, agency.id, morning)?;

    for n in 0..12u32 {
        let shift = if n % 3 == 0 { evening } else { morning };
        agency
            .rollups
            .record_reservation(agency.id, &reservation(today, shift, 5000, 1 + n % 2))?;
    }

    board_concurrently(&agency, &slots[0])?;
    agency.boarding.try_embark(agency.id, &slots[1], 9)?;
    agency.boarding.cancel_embark(agency.id, &slots[1], 1)?;

    let closed = agency.boarding.close_slot(agency.id, &slots[0], 2)?;
    info!(embarked = closed.embarked_seats, absent = closed.absent_seats, "first departure closed");
    agency.boarding.mark_arrived(agency.id, &slots[0])?;

    record_finances(&agency, today)?;

    agency.shifts.pause_shift(agency.id, evening)?;
    agency.shifts.close_shift(agency.id, morning)?;
    match agency.shifts.chef_approve_shift(agency.id, morning, UserId::new()) {
        Err(EngineError::Domain(DomainError::OutOfOrderApproval)) => {
            info!("chief approval refused before accountant review")
        }
        other => warn!(?other, "unexpected approval outcome"),
    }

    // Sold at the counter after close; still belongs to the session.
    agency
        .rollups
        .record_reservation(agency.id, &reservation(today, morning, 2500, 1))?;
    info!(revenue = ?revenue.revenue(), "morning session after close");

    agency.shifts.accountant_validate(agency.id, morning, UserId::new())?;
    agency.shifts.chef_approve_shift(agency.id, morning, UserId::new())?;

    if let Err(err) = agency
        .rollups
        .record_reservation(agency.id, &reservation(today, morning, 1000, 1))
    {
        info!(error = %err, message = %err.user_message(), "validated session is sealed");
    }

    alerts.refresh();
    for alert in alerts.alerts() {
        info!(
            id = alert.id,
            severity = ?alert.severity,
            module = ?alert.module,
            "{}: {}",
            alert.title,
            alert.description
        );
    }

    if let Some(consumer) = consumer {
        consumer.shutdown()?;
        // Anything published after the last wake-up.
        RollupConsumer::new(store.clone(), config.tx_options()).catch_up(agency.id)?;
    }

    let daily = agency.rollups.daily_stats(agency.id, today)?;
    let live = agency.rollups.live_state(agency.id)?;
    info!(daily = %serde_json::to_string(&daily)?, "daily rollup");
    info!(live = %serde_json::to_string(&live)?, "live counters");

    let report = agency.rollups.rebuild_rollups(agency.id, true)?.wait().await?;
    if report.is_clean() {
        info!(events = report.events_replayed, "rollups match the event log");
    } else {
        warn!(?report, "rollups drifted from the event log");
    }

    revenue.shutdown()?;
    alerts.shutdown()?;
    Ok(())
}

fn schedule(date: NaiveDate, arrival: &str, hour: u32) -> anyhow::Result<ScheduleInfo> {
    Ok(ScheduleInfo {
        trip_id: None,
        departure: "Dakar".to_string(),
        arrival: arrival.to_string(),
        date,
        scheduled_time: NaiveTime::from_hms_opt(hour, 0, 0).context("departure time")?,
    })
}

fn reservation(date: NaiveDate, shift_id: ShiftId, montant: i64, seats: u32) -> Reservation {
    Reservation {
        id: ReservationId::new(),
        shift_id: Some(shift_id),
        montant,
        seats_go: seats,
        statut_embarquement: BoardingMark::Pending,
        depart: "Dakar".to_string(),
        arrivee: "Thiès".to_string(),
        heure: "07:00".to_string(),
        date,
        canceled: false,
    }
}

/// Several boarding agents scan passengers onto the same vehicle until it
/// reports full.
fn board_concurrently(agency: &Agency, key: &TripSlotKey) -> anyhow::Result<()> {
    let accepted = AtomicU32::new(0);
    let refused = AtomicU32::new(0);

    thread::scope(|scope| -> anyhow::Result<()> {
        let agents: Vec<_> = (0..COUNTERS)
            .map(|_| {
                scope.spawn(|| -> Result<(), EngineError> {
                    loop {
                        match agency.boarding.try_embark(agency.id, key, 1) {
                            Ok(_) => {
                                accepted.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(EngineError::Domain(DomainError::CapacityExceeded { .. })) => {
                                refused.fetch_add(1, Ordering::Relaxed);
                                return Ok(());
                            }
                            Err(err @ EngineError::StoreUnavailable(_)) => {
                                warn!(error = %err, "scan not recorded, rescanning");
                            }
                            Err(err) => return Err(err),
                        }
                    }
                })
            })
            .collect();
        for agent in agents {
            agent
                .join()
                .map_err(|_| anyhow::anyhow!("boarding agent panicked"))??;
        }
        Ok(())
    })?;

    info!(
        accepted = accepted.load(Ordering::Relaxed),
        refused = refused.load(Ordering::Relaxed),
        "concurrent boarding finished"
    );
    Ok(())
}

/// Treasury writes the engine only reads: the cash position and one expense.
fn record_finances(agency: &Agency, today: NaiveDate) -> anyhow::Result<()> {
    let cash = DocKey::cash_account(agency.id);
    let fuel = DocKey::expense(agency.id, "fuel");
    agency.store.transact(&[cash.clone(), fuel.clone()], &TxOptions::default(), |tx| {
        let now = tx.now();
        tx.put(
            &fuel,
            &Expense {
                date: today,
                amount: 15_000,
                label: Some("Carburant".to_string()),
            },
        )?;
        tx.put(
            &cash,
            &CashAccount {
                balance: 20_000,
                updated_at: Some(now),
            },
        )
    })?;
    Ok(())
}
