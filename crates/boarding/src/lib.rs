//! Boarding capacity domain module.
//!
//! One [`BoardingSlot`] per agency + trip slot: a seat counter bounded by the
//! vehicle capacity, opened lazily and closed exactly once. Pure domain logic;
//! the infra layer runs it inside store transactions.

pub mod slot;
pub mod trip_slot;

pub use slot::{
    BoardingCommand, BoardingEvent, BoardingSlot, BoardingStats, CancelEmbark, CloseSlot, Embark,
    EmbarkCanceled, EnsureSlot, MarkArrived, SeatsEmbarked, SlotClosed, SlotOpened, SlotStatus,
    VehicleArrived,
};
pub use trip_slot::{ScheduleInfo, TripSlotKey};
