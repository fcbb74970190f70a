//! The rollup delta fold.
//!
//! Both functions are pure and total: applying an event that does not concern
//! the given document leaves it unchanged (timestamps included).

use agencyops_boarding::BoardingEvent;
use agencyops_events::Event;
use agencyops_reservations::ReservationEvent;
use agencyops_shifts::{ShiftEvent, ShiftStatus};

use crate::{AgencyEvent, AgencyLiveState, DailyStats};

/// Fold one event into the totals of `stats.date`.
pub fn apply_to_daily(stats: &mut DailyStats, event: &AgencyEvent) {
    if !event.daily_dates().contains(&stats.date) {
        return;
    }

    match event {
        AgencyEvent::Boarding(BoardingEvent::SeatsEmbarked(e)) => {
            stats.total_passengers += i64::from(e.seats);
        }
        AgencyEvent::Boarding(BoardingEvent::EmbarkCanceled(e)) => {
            stats.total_passengers -= i64::from(e.seats);
        }
        AgencyEvent::Boarding(BoardingEvent::SlotClosed(_)) => {
            stats.boarding_closed_count += 1;
        }
        AgencyEvent::Boarding(_) => {}
        AgencyEvent::Shift(ShiftEvent::ShiftOpened(_)) => {
            stats.active_sessions += 1;
        }
        AgencyEvent::Shift(ShiftEvent::ShiftClosed(_)) => {
            stats.active_sessions -= 1;
            stats.closed_sessions += 1;
        }
        AgencyEvent::Shift(ShiftEvent::ChiefApproved(_)) => {
            stats.closed_sessions -= 1;
            stats.validated_sessions += 1;
        }
        AgencyEvent::Shift(_) => {}
        AgencyEvent::Reservation(ReservationEvent::Recorded(e)) => {
            if let Some(prev) = e.previous.filter(|c| c.date == stats.date) {
                stats.total_revenue -= prev.amount;
                stats.total_seats -= prev.seats;
            }
            if let Some(cur) = e.current.filter(|c| c.date == stats.date) {
                stats.total_revenue += cur.amount;
                stats.total_seats += cur.seats;
            }
        }
    }

    stats.touch(event.occurred_at());
}

/// Fold one event into the agency's live counters.
pub fn apply_to_live(live: &mut AgencyLiveState, event: &AgencyEvent) {
    if !event.touches_live() {
        return;
    }

    match event {
        AgencyEvent::Boarding(BoardingEvent::SlotOpened(_)) => {
            live.boarding_open_count += 1;
        }
        AgencyEvent::Boarding(BoardingEvent::SlotClosed(_)) => {
            live.boarding_open_count -= 1;
            live.vehicles_in_transit_count += 1;
        }
        AgencyEvent::Boarding(BoardingEvent::VehicleArrived(_)) => {
            live.vehicles_in_transit_count -= 1;
        }
        AgencyEvent::Boarding(_) => {}
        AgencyEvent::Shift(ShiftEvent::ShiftOpened(_))
        | AgencyEvent::Shift(ShiftEvent::ShiftResumed(_)) => {
            live.active_sessions_count += 1;
        }
        AgencyEvent::Shift(ShiftEvent::ShiftPaused(_)) => {
            live.active_sessions_count -= 1;
        }
        AgencyEvent::Shift(ShiftEvent::ShiftClosed(e)) => {
            if e.from == ShiftStatus::Active {
                live.active_sessions_count -= 1;
            }
            live.closed_pending_validation_count += 1;
        }
        AgencyEvent::Shift(ShiftEvent::ChiefApproved(_)) => {
            live.closed_pending_validation_count -= 1;
        }
        AgencyEvent::Shift(ShiftEvent::AccountantValidated(_)) => {}
        AgencyEvent::Reservation(_) => {}
    }

    live.last_updated_at = Some(event.occurred_at());
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyops_core::{AgencyId, ReservationId, ShiftId, UserId};
    use agencyops_reservations::{Contribution, ReservationRecorded};
    use agencyops_shifts::{ShiftClosed, ShiftOpened, ShiftPaused};
    use chrono::{NaiveDate, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn recorded(previous: Option<Contribution>, current: Option<Contribution>) -> AgencyEvent {
        AgencyEvent::Reservation(ReservationEvent::Recorded(ReservationRecorded {
            agency_id: AgencyId::new(),
            reservation_id: ReservationId::new(),
            shift_id: None,
            previous,
            current,
            occurred_at: Utc::now(),
        }))
    }

    #[test]
    fn moving_a_reservation_retracts_it_from_the_old_day() {
        let mut old_day = DailyStats::empty(day(19));
        let mut new_day = DailyStats::empty(day(20));
        let first = Contribution {
            date: day(19),
            amount: 5000,
            seats: 2,
        };
        let moved = Contribution {
            date: day(20),
            ..first
        };

        apply_to_daily(&mut old_day, &recorded(None, Some(first)));
        let change = recorded(Some(first), Some(moved));
        apply_to_daily(&mut old_day, &change);
        apply_to_daily(&mut new_day, &change);

        assert_eq!(old_day.total_revenue, 0);
        assert_eq!(old_day.total_seats, 0);
        assert_eq!(new_day.total_revenue, 5000);
        assert_eq!(new_day.total_seats, 2);
    }

    #[test]
    fn events_for_other_days_leave_stats_untouched() {
        let mut stats = DailyStats::empty(day(18));
        let before = stats.clone();
        apply_to_daily(
            &mut stats,
            &recorded(
                None,
                Some(Contribution {
                    date: day(19),
                    amount: 1,
                    seats: 1,
                }),
            ),
        );
        assert_eq!(stats, before);
    }

    #[test]
    fn only_active_shifts_count_as_live_sessions() {
        let agency_id = AgencyId::new();
        let shift_id = ShiftId::new();
        let at = Utc::now();
        let mut live = AgencyLiveState::default();

        let events = [
            AgencyEvent::Shift(ShiftEvent::ShiftOpened(ShiftOpened {
                agency_id,
                shift_id,
                user_id: UserId::new(),
                business_date: day(19),
                occurred_at: at,
            })),
            AgencyEvent::Shift(ShiftEvent::ShiftPaused(ShiftPaused {
                agency_id,
                shift_id,
                business_date: day(19),
                occurred_at: at,
            })),
            AgencyEvent::Shift(ShiftEvent::ShiftClosed(ShiftClosed {
                agency_id,
                shift_id,
                business_date: day(19),
                from: ShiftStatus::Paused,
                occurred_at: at,
            })),
        ];
        for e in &events {
            apply_to_live(&mut live, e);
        }

        assert_eq!(live.active_sessions_count, 0);
        assert_eq!(live.closed_pending_validation_count, 1);
        assert_eq!(live.last_updated_at, Some(at));
    }
}
