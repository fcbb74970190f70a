use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use agencyops_boarding::TripSlotKey;
use agencyops_core::ShiftId;

use crate::Reservation;

/// Live revenue attributed to one cashier session.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRevenue {
    pub amount: i64,
    pub tickets: u32,
    pub seats: u32,
}

/// Fold the reservation stream into a session total.
///
/// Always recomputed from the reservations themselves, so a reservation that
/// arrives after the shift closed is still counted.
pub fn fold_session_revenue<'a>(
    shift_id: ShiftId,
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> SessionRevenue {
    reservations
        .into_iter()
        .filter(|r| r.shift_id == Some(shift_id) && !r.canceled)
        .fold(SessionRevenue::default(), |mut acc, r| {
            acc.amount += r.montant;
            acc.tickets += 1;
            acc.seats += r.seats_go;
            acc
        })
}

/// Seats sold per departure, skipping canceled reservations and ones whose
/// route cannot form a slot key.
pub fn reserved_seats_by_slot<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> HashMap<TripSlotKey, u32> {
    let mut seats = HashMap::new();
    for r in reservations.into_iter().filter(|r| !r.canceled) {
        if let Ok(key) = r.slot_key() {
            *seats.entry(key).or_insert(0) += r.seats_go;
        }
    }
    seats
}
