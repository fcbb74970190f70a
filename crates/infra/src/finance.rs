//! Finance documents read by the alert engine. Written by the external
//! treasury flow; the engine only reads them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Agency cash position (the `current` singleton).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashAccount {
    pub balance: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub date: NaiveDate,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Total of a day's expenses.
pub fn total_expenses<'a>(expenses: impl IntoIterator<Item = &'a Expense>) -> i64 {
    expenses.into_iter().map(|e| e.amount).sum()
}
