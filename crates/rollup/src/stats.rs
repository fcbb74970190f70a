use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-agency, per-day totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_revenue: i64,
    pub total_passengers: i64,
    pub total_seats: i64,
    pub validated_sessions: i64,
    pub active_sessions: i64,
    pub closed_sessions: i64,
    pub boarding_closed_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DailyStats {
    /// Zeroed totals; what a read returns when the day has no document yet.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_revenue: 0,
            total_passengers: 0,
            total_seats: 0,
            validated_sessions: 0,
            active_sessions: 0,
            closed_sessions: 0,
            boarding_closed_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(at);
        }
        self.updated_at = Some(at);
    }

    /// Whether the counters match, ignoring timestamps.
    pub fn same_totals(&self, other: &DailyStats) -> bool {
        Self {
            created_at: None,
            updated_at: None,
            ..self.clone()
        } == Self {
            created_at: None,
            updated_at: None,
            ..other.clone()
        }
    }
}

/// Per-agency live counters (the `current` singleton).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyLiveState {
    pub active_sessions_count: i64,
    pub closed_pending_validation_count: i64,
    pub vehicles_in_transit_count: i64,
    pub boarding_open_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl AgencyLiveState {
    pub const DOCUMENT_ID: &'static str = "current";

    /// Whether the counters match, ignoring the timestamp.
    pub fn same_totals(&self, other: &AgencyLiveState) -> bool {
        Self {
            last_updated_at: None,
            ..self.clone()
        } == Self {
            last_updated_at: None,
            ..other.clone()
        }
    }
}
