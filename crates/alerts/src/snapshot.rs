//! Alert inputs, narrowed to what the rules read.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use agencyops_boarding::{BoardingStats, SlotStatus, TripSlotKey};
use agencyops_core::ShiftId;
use agencyops_shifts::{Shift, ShiftStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSnapshot {
    pub shift_id: ShiftId,
    pub status: ShiftStatus,
    pub locked_comptable: bool,
    pub locked_chef: bool,
    /// `startTime`, or the creation time when the shift never recorded one.
    pub started_at: DateTime<Utc>,
}

impl ShiftSnapshot {
    /// `None` for a shift that was never opened.
    pub fn from_shift(shift: &Shift) -> Option<Self> {
        Some(Self {
            shift_id: shift.id_typed(),
            status: shift.status()?,
            locked_comptable: shift.locked_comptable(),
            locked_chef: shift.locked_chef(),
            started_at: shift.started_at()?,
        })
    }

    /// Short display name: `session 0192a6f0`.
    pub fn label(&self) -> String {
        let id = self.shift_id.to_string();
        format!("session {}", &id[..8.min(id.len())])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartureSnapshot {
    pub key: TripSlotKey,
    /// `Dakar → Thiès 08:00`.
    pub label: String,
    pub date: NaiveDate,
    /// Scheduled departure, agency wall-clock.
    pub scheduled_at: NaiveDateTime,
    pub status: SlotStatus,
    pub embarked_seats: u32,
    pub vehicle_capacity: u32,
}

impl DepartureSnapshot {
    pub fn from_stats(key: TripSlotKey, stats: &BoardingStats) -> Self {
        Self {
            key,
            label: stats.schedule().label(),
            date: stats.date,
            scheduled_at: stats.date.and_time(stats.scheduled_time),
            status: stats.status,
            embarked_seats: stats.embarked_seats,
            vehicle_capacity: stats.vehicle_capacity,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == SlotStatus::Closed
    }
}
