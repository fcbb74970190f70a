use thiserror::Error;

use agencyops_core::DomainError;

use crate::store::StoreError;

/// Error surfaced by every engine entry point.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Business rejection from a component; never retried.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store could not commit: offline or lost every concurrency retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("worker {name} failed: {reason}")]
    Worker { name: &'static str, reason: String },
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(_) | StoreError::Contention { .. } => {
                EngineError::StoreUnavailable(value)
            }
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Expected outcomes of user actions, logged at `debug`.
    pub fn is_business_outcome(&self) -> bool {
        match self {
            EngineError::Domain(e) => e.is_business_outcome(),
            _ => false,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Text shown to agency staff.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Domain(DomainError::CapacityExceeded {
                requested,
                embarked,
                capacity,
            }) => {
                let remaining = capacity.saturating_sub(*embarked);
                format!(
                    "Capacité dépassée : {requested} place(s) demandée(s), {remaining} restante(s) sur {capacity}."
                )
            }
            EngineError::Domain(DomainError::SlotAlreadyClosed) => {
                "L'embarquement de ce départ est déjà clôturé.".to_string()
            }
            EngineError::Domain(DomainError::NotClosed { status }) => {
                format!("La session doit être clôturée avant validation (statut actuel : {status}).")
            }
            EngineError::Domain(DomainError::OutOfOrderApproval) => {
                "Le comptable doit valider la session avant l'approbation du chef d'agence."
                    .to_string()
            }
            EngineError::Domain(DomainError::AlreadyValidated) => {
                "Cette session est déjà validée et ne peut plus être modifiée.".to_string()
            }
            EngineError::Domain(DomainError::InvalidTransition { from, action }) => {
                format!("Action impossible ({action}) sur une session {from}.")
            }
            EngineError::Domain(DomainError::NotFound) => "Élément introuvable.".to_string(),
            EngineError::Domain(DomainError::Validation(msg)) => format!("Données invalides : {msg}"),
            EngineError::Domain(other) => format!("Opération refusée : {other}"),
            EngineError::StoreUnavailable(_) => {
                "Service momentanément indisponible, veuillez réessayer.".to_string()
            }
            EngineError::Store(StoreError::Timeout) | EngineError::Store(StoreError::Cancelled) => {
                "L'opération n'a pas abouti, rien n'a été enregistré.".to_string()
            }
            EngineError::Store(_) | EngineError::Worker { .. } => {
                "Erreur interne, contactez le support.".to_string()
            }
        }
    }
}
