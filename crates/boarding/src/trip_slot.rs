use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use agencyops_core::{DomainError, DomainResult};

/// Key of one departure: `departure_arrival_time_date`.
///
/// Each part is trimmed and internal whitespace runs become a single hyphen, so
/// `" Saint  Louis "` and `"Saint Louis"` address the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripSlotKey(String);

impl TripSlotKey {
    pub fn compose(departure: &str, arrival: &str, time: &str, date: &str) -> DomainResult<Self> {
        let parts = [
            ("departure", departure),
            ("arrival", arrival),
            ("time", time),
            ("date", date),
        ];

        let mut normalized = Vec::with_capacity(parts.len());
        for (name, raw) in parts {
            let part = normalize_part(raw);
            if part.is_empty() {
                return Err(DomainError::validation(format!("trip slot {name} cannot be empty")));
            }
            normalized.push(part);
        }

        Ok(Self(normalized.join("_")))
    }

    /// Wrap an already-normalized key read back from storage.
    pub fn from_normalized(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TripSlotKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_part(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Schedule of a departure, as known by the boarding UI when it first touches a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    pub departure: String,
    pub arrival: String,
    pub date: NaiveDate,
    pub scheduled_time: NaiveTime,
}

impl ScheduleInfo {
    pub fn slot_key(&self) -> DomainResult<TripSlotKey> {
        TripSlotKey::compose(
            &self.departure,
            &self.arrival,
            &self.scheduled_time.format("%H:%M").to_string(),
            &self.date.format("%Y-%m-%d").to_string(),
        )
    }

    /// Human label used in alerts: `Dakar → Thiès 08:00`.
    pub fn label(&self) -> String {
        format!(
            "{} → {} {}",
            self.departure.trim(),
            self.arrival.trim(),
            self.scheduled_time.format("%H:%M")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_are_trimmed_and_spaces_become_hyphens() {
        let key = TripSlotKey::compose(" Dakar ", "Saint  Louis", "08:00", " 2026-10-19").unwrap();
        assert_eq!(key.as_str(), "Dakar_Saint-Louis_08:00_2026-10-19");
    }

    #[test]
    fn blank_parts_are_rejected() {
        let err = TripSlotKey::compose("Dakar", "   ", "08:00", "2026-10-19").unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("arrival")));
    }

    #[test]
    fn schedule_key_formats_time_and_date() {
        let schedule = ScheduleInfo {
            trip_id: None,
            departure: "Dakar".into(),
            arrival: "Thiès".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(8, 5, 0).unwrap(),
        };
        assert_eq!(schedule.slot_key().unwrap().as_str(), "Dakar_Thiès_08:05_2026-10-19");
        assert_eq!(schedule.label(), "Dakar → Thiès 08:05");
    }
}
