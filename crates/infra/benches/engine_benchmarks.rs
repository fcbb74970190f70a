use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use agencyops_alerts::{
    AlertInputs, AlertThresholds, DepartureSnapshot, ShiftSnapshot, compute_alerts,
};
use agencyops_boarding::{ScheduleInfo, SlotStatus, TripSlotKey};
use agencyops_core::{AgencyId, ReservationId, ShiftId, UserId};
use agencyops_events::{EventEnvelope, InMemoryEventBus};
use agencyops_infra::store::DocumentStore;
use agencyops_infra::{
    BoardingCounter, Dispatcher, EngineConfig, InMemoryDocumentStore, RollupAggregator,
    ShiftLifecycle,
};
use agencyops_reservations::{BoardingMark, Reservation};
use agencyops_rollup::{AgencyEvent, RollupProjection};
use agencyops_shifts::ShiftStatus;

type Store = Arc<InMemoryDocumentStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn dispatcher() -> Dispatcher<Store, Bus> {
    Dispatcher::new(
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(InMemoryEventBus::new()),
        EngineConfig::default(),
    )
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn schedule(hour: u32) -> ScheduleInfo {
    ScheduleInfo {
        trip_id: None,
        departure: "Dakar".to_string(),
        arrival: "Thiès".to_string(),
        date: day(),
        scheduled_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
    }
}

fn reservation(shift_id: ShiftId, montant: i64) -> Reservation {
    Reservation {
        id: ReservationId::new(),
        shift_id: Some(shift_id),
        montant,
        seats_go: 1,
        statut_embarquement: BoardingMark::Pending,
        depart: "Dakar".to_string(),
        arrivee: "Thiès".to_string(),
        heure: "08:00".to_string(),
        date: day(),
        canceled: false,
    }
}

fn bench_embarkation(c: &mut Criterion) {
    let mut group = c.benchmark_group("embarkation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("try_embark_with_rollups", |b| {
        let boarding = BoardingCounter::new(dispatcher());
        let agency = AgencyId::new();
        let schedule = schedule(8);
        let key = schedule.slot_key().unwrap();
        boarding.ensure_slot(agency, &key, u32::MAX, &schedule).unwrap();

        b.iter(|| {
            boarding.try_embark(black_box(agency), black_box(&key), 1).unwrap();
        });
    });

    group.bench_function("try_embark_rejected_at_capacity", |b| {
        let boarding = BoardingCounter::new(dispatcher());
        let agency = AgencyId::new();
        let schedule = schedule(9);
        let key = schedule.slot_key().unwrap();
        boarding.ensure_slot(agency, &key, 1, &schedule).unwrap();
        boarding.try_embark(agency, &key, 1).unwrap();

        b.iter(|| {
            let _ = black_box(boarding.try_embark(agency, &key, 1));
        });
    });

    group.finish();
}

fn bench_reservation_recording(c: &mut Criterion) {
    let mut group = c.benchmark_group("reservations");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_new_reservation", |b| {
        let dispatcher = dispatcher();
        let shifts = ShiftLifecycle::new(dispatcher.clone());
        let rollups = RollupAggregator::new(dispatcher);
        let agency = AgencyId::new();
        let shift_id = ShiftId::new();
        shifts.open_shift(agency, shift_id, UserId::new()).unwrap();

        b.iter(|| {
            rollups
                .record_reservation(agency, &reservation(shift_id, black_box(5000)))
                .unwrap();
        });
    });

    group.finish();
}

/// Log of a busy agency: slots boarded and closed, shifts through approval,
/// reservations sold.
fn agency_log(departures: u32) -> Vec<AgencyEvent> {
    let dispatcher = dispatcher();
    let boarding = BoardingCounter::new(dispatcher.clone());
    let shifts = ShiftLifecycle::new(dispatcher.clone());
    let rollups = RollupAggregator::new(dispatcher.clone());
    let agency = AgencyId::new();

    let shift_id = ShiftId::new();
    shifts.open_shift(agency, shift_id, UserId::new()).unwrap();
    for n in 0..departures {
        let mut schedule = schedule(6 + n % 16);
        schedule.trip_id = Some(format!("trip-{n}"));
        schedule.arrival = format!("Arrêt {n}");
        let key = schedule.slot_key().unwrap();
        boarding.ensure_slot(agency, &key, 60, &schedule).unwrap();
        boarding.try_embark(agency, &key, 40).unwrap();
        boarding.close_slot(agency, &key, 2).unwrap();
        rollups.record_reservation(agency, &reservation(shift_id, 2500)).unwrap();
    }
    shifts.close_shift(agency, shift_id).unwrap();

    dispatcher
        .store()
        .read_events(agency, 0, usize::MAX)
        .unwrap()
        .into_iter()
        .map(|stored| AgencyEvent::decode(&stored.aggregate_type, stored.payload).unwrap())
        .collect()
}

fn bench_rollup_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollup_fold");

    for departures in [10u32, 100, 1000] {
        let events = agency_log(departures);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(departures), &events, |b, events| {
            b.iter(|| {
                let mut projection = RollupProjection::new();
                for event in events {
                    projection.fold(black_box(event));
                }
                black_box(projection.daily(day()));
            });
        });
    }

    group.finish();
}

fn bench_alert_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("alerts");
    let offset = FixedOffset::east_opt(0).unwrap();
    let now = offset.from_utc_datetime(&day().and_hms_opt(14, 0, 0).unwrap());
    let thresholds = AlertThresholds::default();

    for size in [10usize, 100, 1000] {
        let shifts: Vec<ShiftSnapshot> = (0..size)
            .map(|n| ShiftSnapshot {
                shift_id: ShiftId::new(),
                status: match n % 4 {
                    0 => ShiftStatus::Active,
                    1 => ShiftStatus::Paused,
                    _ => ShiftStatus::Closed,
                },
                locked_comptable: n % 4 == 3,
                locked_chef: false,
                started_at: Utc::now() - Duration::hours((n % 12) as i64),
            })
            .collect();
        let departures: Vec<DepartureSnapshot> = (0..size)
            .map(|n| {
                let time = format!("{:02}:{:02}", 6 + n % 12, n % 60);
                DepartureSnapshot {
                    key: TripSlotKey::compose("Dakar", &format!("Arrêt {n}"), &time, "2026-10-19")
                        .unwrap(),
                    label: format!("Dakar → Arrêt {n} {time}"),
                    date: day(),
                    scheduled_at: day()
                        .and_hms_opt(6 + (n % 12) as u32, (n % 60) as u32, 0)
                        .unwrap(),
                    status: if n % 3 == 0 { SlotStatus::Closed } else { SlotStatus::Open },
                    embarked_seats: (n % 50) as u32,
                    vehicle_capacity: 50,
                }
            })
            .collect();
        let reservations: Vec<Reservation> =
            (0..size).map(|_| reservation(ShiftId::new(), 2500)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let inputs = AlertInputs {
                    now,
                    shifts: &shifts,
                    departures: &departures,
                    cash_position: 1_000_000,
                    today_revenue: 2500 * size as i64,
                    today_expenses: 0,
                    reservations: &reservations,
                };
                black_box(compute_alerts(&inputs, &thresholds))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_embarkation,
    bench_reservation_recording,
    bench_rollup_fold,
    bench_alert_recompute
);
criterion_main!(benches);
