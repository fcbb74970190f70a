//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (validation, capacity,
/// approval ordering). Store and transport failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflicting state was found (e.g. a slot re-closed with different numbers).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Boarding admission would push the slot past its vehicle capacity.
    #[error(
        "capacity exceeded: {requested} seat(s) requested, {embarked} of {capacity} already embarked"
    )]
    CapacityExceeded {
        requested: u32,
        embarked: u32,
        capacity: u32,
    },

    /// Boarding mutation attempted on a slot whose manifest is finalized.
    #[error("boarding is already closed for this trip slot")]
    SlotAlreadyClosed,

    /// Accountant review attempted on a shift that is not closed yet.
    #[error("shift is not closed (current status: {status})")]
    NotClosed { status: String },

    /// Chief approval attempted before the accountant signed.
    #[error("accountant must validate the shift before the chief can approve it")]
    OutOfOrderApproval,

    /// Any mutation attempted on a validated (terminal) shift.
    #[error("shift is already validated")]
    AlreadyValidated,

    /// A lifecycle transition that is not allowed from the current state.
    #[error("cannot {action} a shift that is {from}")]
    InvalidTransition { from: String, action: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_transition(from: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            action: action.into(),
        }
    }

    /// Whether this error is an expected business outcome (a rejected request)
    /// rather than a sign of corrupted state.
    pub fn is_business_outcome(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }
}
