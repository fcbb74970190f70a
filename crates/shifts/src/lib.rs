//! Cashier shift lifecycle (event-sourced state machine).
//!
//! `active ⇄ paused → closed → validated`, where reaching `validated` takes two
//! signatures in strict order: the accountant reviews a closed shift, then the
//! agency chief approves it. `validated` is terminal.

pub mod document;
pub mod shift;

pub use document::{ShiftDocument, SignatureField};
pub use shift::{
    AccountantValidated, ChiefApproved, OpenShift, Shift, ShiftClosed, ShiftCommand, ShiftEvent,
    ShiftOpened, ShiftPaused, ShiftResumed, ShiftState, ShiftStatus, ShiftTransition, SignOff,
    SignShift,
};
