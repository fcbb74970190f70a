use std::collections::BTreeMap;

use chrono::NaiveDate;

use agencyops_events::{EventEnvelope, Projection};

use crate::{AgencyEvent, AgencyLiveState, DailyStats, apply_to_daily, apply_to_live};

/// Rollups of one agency, rebuilt by folding its event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupProjection {
    daily: BTreeMap<NaiveDate, DailyStats>,
    live: AgencyLiveState,
}

impl RollupProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Daily totals; a day without events reads as zeroed.
    pub fn daily(&self, date: NaiveDate) -> DailyStats {
        self.daily
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailyStats::empty(date))
    }

    pub fn days(&self) -> impl Iterator<Item = &DailyStats> {
        self.daily.values()
    }

    pub fn live(&self) -> &AgencyLiveState {
        &self.live
    }

    /// Fold a bare event; same logic the transactional path applies.
    pub fn fold(&mut self, event: &AgencyEvent) {
        for date in event.daily_dates() {
            let stats = self
                .daily
                .entry(date)
                .or_insert_with(|| DailyStats::empty(date));
            apply_to_daily(stats, event);
        }
        apply_to_live(&mut self.live, event);
    }
}

impl Projection for RollupProjection {
    type Ev = AgencyEvent;

    fn apply(&mut self, envelope: &EventEnvelope<AgencyEvent>) {
        self.fold(envelope.payload());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyops_core::{AgencyId, AggregateRoot, ShiftId, UserId};
    use agencyops_events::{Event, ProjectionRunner, execute};
    use agencyops_shifts::{
        OpenShift, Shift, ShiftCommand, ShiftStatus, ShiftTransition, SignShift,
    };
    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn command(agency_id: AgencyId, shift_id: ShiftId, pick: usize) -> ShiftCommand {
        let occurred_at = Utc::now();
        let transition = ShiftTransition {
            agency_id,
            shift_id,
            occurred_at,
        };
        match pick {
            0 => ShiftCommand::Pause(transition),
            1 => ShiftCommand::Resume(transition),
            2 => ShiftCommand::Close(transition),
            3 => ShiftCommand::AccountantValidate(SignShift {
                agency_id,
                shift_id,
                by: UserId::new(),
                occurred_at,
            }),
            _ => ShiftCommand::ChefApprove(SignShift {
                agency_id,
                shift_id,
                by: UserId::new(),
                occurred_at,
            }),
        }
    }

    #[test]
    fn runner_folds_enveloped_events() {
        let agency_id = AgencyId::new();
        let shift_id = ShiftId::new();
        let mut shift = Shift::empty(shift_id);
        let events = execute(
            &mut shift,
            &ShiftCommand::Open(OpenShift {
                agency_id,
                shift_id,
                user_id: UserId::new(),
                business_date: today(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let log: Vec<_> = events
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    agency_id,
                    shift_id.to_string(),
                    "cashier.shift",
                    i as u64 + 1,
                    e.occurred_at(),
                    AgencyEvent::Shift(e),
                )
            })
            .collect();

        let (projection, cursor) =
            ProjectionRunner::rebuild_from_scratch(RollupProjection::new, &log).unwrap();
        assert_eq!(projection.daily(today()).active_sessions, 1);
        assert_eq!(projection.live().active_sessions_count, 1);
        assert_eq!(cursor.unwrap().last_sequence_number(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any mix of shift transitions, the folded counters
        /// equal what a scan of the shifts' final states gives.
        #[test]
        fn session_counters_match_a_full_scan(
            script in prop::collection::vec((0usize..4, 0usize..5), 0..60)
        ) {
            let agency_id = AgencyId::new();
            let mut shifts: Vec<Shift> = (0..4).map(|_| Shift::empty(ShiftId::new())).collect();
            let mut rollup = RollupProjection::new();

            for shift in shifts.iter_mut() {
                let shift_id = *shift.id();
                let open = ShiftCommand::Open(OpenShift {
                    agency_id,
                    shift_id,
                    user_id: UserId::new(),
                    business_date: today(),
                    occurred_at: Utc::now(),
                });
                for e in execute(shift, &open).unwrap() {
                    rollup.fold(&AgencyEvent::Shift(e));
                }
            }

            for (target, pick) in script {
                let shift = &mut shifts[target];
                let cmd = command(agency_id, *shift.id(), pick);
                if let Ok(events) = execute(shift, &cmd) {
                    for e in events {
                        rollup.fold(&AgencyEvent::Shift(e));
                    }
                }
            }

            let count = |pred: fn(ShiftStatus) -> bool| {
                shifts.iter().filter(|s| s.status().is_some_and(pred)).count() as i64
            };
            let daily = rollup.daily(today());
            prop_assert_eq!(daily.active_sessions, count(|s| s.is_open()));
            prop_assert_eq!(daily.closed_sessions, count(|s| s == ShiftStatus::Closed));
            prop_assert_eq!(daily.validated_sessions, count(|s| s == ShiftStatus::Validated));
            prop_assert_eq!(rollup.live().active_sessions_count, count(|s| s == ShiftStatus::Active));
            prop_assert_eq!(
                rollup.live().closed_pending_validation_count,
                count(|s| s == ShiftStatus::Closed)
            );
        }
    }
}
