use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use agencyops_reservations::{Reservation, reserved_seats_by_slot};
use agencyops_shifts::ShiftStatus;

use crate::{
    AlertModule, DepartureSnapshot, ManagerAlert, Severity, ShiftSnapshot, list_with_overflow,
};

/// Per-agency rule thresholds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub delay_threshold_minutes: i64,
    pub overlong_session_hours: i64,
    pub low_occupancy_percent: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            delay_threshold_minutes: 30,
            overlong_session_hours: 8,
            low_occupancy_percent: 30,
        }
    }
}

/// Everything one evaluation looks at.
#[derive(Debug, Clone, Copy)]
pub struct AlertInputs<'a> {
    /// Current time in the agency's offset; departures are compared on its
    /// wall-clock, sessions on the absolute instant.
    pub now: DateTime<FixedOffset>,
    pub shifts: &'a [ShiftSnapshot],
    /// Today's departures.
    pub departures: &'a [DepartureSnapshot],
    pub cash_position: i64,
    pub today_revenue: i64,
    pub today_expenses: i64,
    pub reservations: &'a [Reservation],
}

/// Recompute the full alert list. Output order is rule order, one alert per
/// rule at most.
pub fn compute_alerts(inputs: &AlertInputs<'_>, thresholds: &AlertThresholds) -> Vec<ManagerAlert> {
    [
        pending_accountant(inputs),
        pending_chief(inputs),
        cash_variance(inputs),
        unstaffed_counter(inputs),
        delayed_departures(inputs, thresholds),
        low_occupancy(inputs, thresholds),
        overlong_sessions(inputs, thresholds),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn pending_accountant(inputs: &AlertInputs<'_>) -> Option<ManagerAlert> {
    let pending = inputs
        .shifts
        .iter()
        .filter(|s| s.status == ShiftStatus::Closed)
        .count();
    (pending > 0).then(|| {
        ManagerAlert::new(
            "pending-accountant",
            Severity::Warning,
            AlertModule::Shifts,
            "Sessions en attente du comptable",
            format!("{pending} session(s) clôturée(s) en attente de validation"),
        )
    })
}

fn pending_chief(inputs: &AlertInputs<'_>) -> Option<ManagerAlert> {
    let pending = inputs
        .shifts
        .iter()
        .filter(|s| s.locked_comptable && !s.locked_chef)
        .count();
    (pending > 0).then(|| {
        ManagerAlert::new(
            "pending-chief",
            Severity::Critical,
            AlertModule::Shifts,
            "Approbations en attente du chef d'agence",
            format!(
                "{pending} session(s) contrôlée(s) par le comptable attendent l'approbation du chef d'agence"
            ),
        )
    })
}

fn cash_variance(inputs: &AlertInputs<'_>) -> Option<ManagerAlert> {
    let variance = inputs.cash_position - inputs.today_revenue + inputs.today_expenses;
    (variance != 0).then(|| {
        ManagerAlert::new(
            "cash-variance",
            Severity::Critical,
            AlertModule::Finance,
            "Écart de caisse",
            format!(
                "Caisse {}, recettes du jour {}, dépenses du jour {} : écart de {variance}",
                inputs.cash_position, inputs.today_revenue, inputs.today_expenses
            ),
        )
    })
}

fn unstaffed_counter(inputs: &AlertInputs<'_>) -> Option<ManagerAlert> {
    if inputs.shifts.iter().any(|s| s.status == ShiftStatus::Active) {
        return None;
    }
    let today = inputs.now.date_naive();
    let open = inputs
        .departures
        .iter()
        .filter(|d| d.date == today && !d.is_closed())
        .count();
    (open > 0).then(|| {
        ManagerAlert::new(
            "unstaffed-counter",
            Severity::Critical,
            AlertModule::Shifts,
            "Guichet sans caissier",
            format!("Aucune session active alors que {open} départ(s) du jour restent ouverts"),
        )
    })
}

fn delayed_departures(
    inputs: &AlertInputs<'_>,
    thresholds: &AlertThresholds,
) -> Option<ManagerAlert> {
    let now = inputs.now.naive_local();
    let grace = Duration::minutes(thresholds.delay_threshold_minutes);
    let mut late: Vec<&DepartureSnapshot> = inputs
        .departures
        .iter()
        .filter(|d| !d.is_closed() && now > d.scheduled_at + grace)
        .collect();
    if late.is_empty() {
        return None;
    }
    late.sort_by_key(|d| d.scheduled_at);

    let labels: Vec<&str> = late.iter().map(|d| d.label.as_str()).collect();
    Some(ManagerAlert::new(
        "delayed-departures",
        Severity::Warning,
        AlertModule::Boarding,
        "Départs en retard",
        format!(
            "{} départ(s) non clôturé(s) plus de {} min après l'heure prévue : {}",
            late.len(),
            thresholds.delay_threshold_minutes,
            list_with_overflow(&labels)
        ),
    ))
}

fn low_occupancy(inputs: &AlertInputs<'_>, thresholds: &AlertThresholds) -> Option<ManagerAlert> {
    let reserved = reserved_seats_by_slot(inputs.reservations);
    let mut low: Vec<&DepartureSnapshot> = inputs
        .departures
        .iter()
        .filter(|d| !d.is_closed() && d.vehicle_capacity > 0)
        .filter(|d| {
            let sold = reserved.get(&d.key).copied().unwrap_or(0);
            let occupied = u64::from(d.embarked_seats.max(sold));
            occupied * 100 < u64::from(thresholds.low_occupancy_percent) * u64::from(d.vehicle_capacity)
        })
        .collect();
    if low.is_empty() {
        return None;
    }
    low.sort_by_key(|d| d.scheduled_at);

    let labels: Vec<&str> = low.iter().map(|d| d.label.as_str()).collect();
    Some(ManagerAlert::new(
        "low-occupancy",
        Severity::Warning,
        AlertModule::Boarding,
        "Faible remplissage",
        format!(
            "{} départ(s) remplis à moins de {} % : {}",
            low.len(),
            thresholds.low_occupancy_percent,
            list_with_overflow(&labels)
        ),
    ))
}

fn overlong_sessions(
    inputs: &AlertInputs<'_>,
    thresholds: &AlertThresholds,
) -> Option<ManagerAlert> {
    let now = inputs.now.with_timezone(&Utc);
    let limit = Duration::hours(thresholds.overlong_session_hours);
    let mut overlong: Vec<&ShiftSnapshot> = inputs
        .shifts
        .iter()
        .filter(|s| s.status.is_open() && now - s.started_at > limit)
        .collect();
    if overlong.is_empty() {
        return None;
    }
    overlong.sort_by_key(|s| s.started_at);

    let labels: Vec<String> = overlong.iter().map(|s| s.label()).collect();
    Some(ManagerAlert::new(
        "overlong-sessions",
        Severity::Warning,
        AlertModule::Shifts,
        "Sessions trop longues",
        format!(
            "{} session(s) ouverte(s) depuis plus de {} h : {}",
            overlong.len(),
            thresholds.overlong_session_hours,
            list_with_overflow(&labels)
        ),
    ))
}
