//! Persisted layout: `{collection}/{agencyId}/{documentId}`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use agencyops_boarding::TripSlotKey;
use agencyops_core::{AgencyId, ReservationId, ShiftId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    BoardingStats,
    Shifts,
    Reservations,
    DailyStats,
    LiveState,
    CashAccount,
    Expenses,
    /// Deferred rollup consumer progress, one document per agency.
    RollupCursor,
}

impl Collection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::BoardingStats => "boardingStats",
            Collection::Shifts => "shifts",
            Collection::Reservations => "reservations",
            Collection::DailyStats => "dailyStats",
            Collection::LiveState => "liveState",
            Collection::CashAccount => "cashAccount",
            Collection::Expenses => "expenses",
            Collection::RollupCursor => "rollupCursor",
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub agency_id: AgencyId,
    pub collection: Collection,
    pub id: String,
}

impl DocKey {
    pub fn new(agency_id: AgencyId, collection: Collection, id: impl Into<String>) -> Self {
        Self {
            agency_id,
            collection,
            id: id.into(),
        }
    }

    pub fn boarding(agency_id: AgencyId, key: &TripSlotKey) -> Self {
        Self::new(agency_id, Collection::BoardingStats, key.as_str())
    }

    pub fn shift(agency_id: AgencyId, shift_id: ShiftId) -> Self {
        Self::new(agency_id, Collection::Shifts, shift_id.to_string())
    }

    pub fn reservation(agency_id: AgencyId, reservation_id: ReservationId) -> Self {
        Self::new(agency_id, Collection::Reservations, reservation_id.to_string())
    }

    pub fn daily_stats(agency_id: AgencyId, date: NaiveDate) -> Self {
        Self::new(
            agency_id,
            Collection::DailyStats,
            date.format("%Y-%m-%d").to_string(),
        )
    }

    pub fn live_state(agency_id: AgencyId) -> Self {
        Self::new(agency_id, Collection::LiveState, "current")
    }

    pub fn cash_account(agency_id: AgencyId) -> Self {
        Self::new(agency_id, Collection::CashAccount, "current")
    }

    pub fn expense(agency_id: AgencyId, expense_id: impl Into<String>) -> Self {
        Self::new(agency_id, Collection::Expenses, expense_id)
    }

    pub fn rollup_cursor(agency_id: AgencyId) -> Self {
        Self::new(agency_id, Collection::RollupCursor, "current")
    }
}

impl core::fmt::Display for DocKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.collection, self.agency_id, self.id)
    }
}

/// One agency collection, optionally narrowed by top-level field equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub agency_id: AgencyId,
    pub collection: Collection,
    pub filters: Vec<(String, JsonValue)>,
}

impl Query {
    pub fn collection(agency_id: AgencyId, collection: Collection) -> Self {
        Self {
            agency_id,
            collection,
            filters: Vec::new(),
        }
    }

    pub fn document(key: &DocKey) -> Self {
        Self::collection(key.agency_id, key.collection)
            .where_eq("__id", JsonValue::String(key.id.clone()))
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Whether a stored document belongs to this result set.
    ///
    /// The pseudo-field `__id` matches the document id.
    pub fn matches(&self, key: &DocKey, body: &JsonValue) -> bool {
        if key.agency_id != self.agency_id || key.collection != self.collection {
            return false;
        }
        self.filters.iter().all(|(field, expected)| {
            if field == "__id" {
                return expected.as_str() == Some(key.id.as_str());
            }
            body.get(field) == Some(expected)
        })
    }

    /// Whether a write to `key` can change this result set.
    pub fn covers(&self, key: &DocKey) -> bool {
        key.agency_id == self.agency_id && key.collection == self.collection
    }
}
