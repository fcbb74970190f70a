//! Reservations as seen by the engine: written by the external sales flow,
//! read here for revenue attribution and rollups.

pub mod reservation;
pub mod revenue;

pub use reservation::{
    BoardingMark, Contribution, Reservation, ReservationEvent, ReservationRecorded,
};
pub use revenue::{SessionRevenue, fold_session_revenue, reserved_seats_by_slot};
