//! Stored shape of a shift and the decode boundary back into [`Shift`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyops_core::{DocumentAggregate, DomainError, DomainResult, ShiftId, UserId};

use crate::shift::{Shift, ShiftRecord, ShiftState, ShiftStatus, SignOff};

/// One approval block as stored (`comptable` or `chef`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureField {
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<UserId>,
}

impl SignatureField {
    fn from_sign_off(sign_off: Option<SignOff>) -> Self {
        match sign_off {
            Some(s) => Self {
                validated: true,
                at: Some(s.at),
                by: Some(s.by),
            },
            None => Self::default(),
        }
    }

    fn to_sign_off(&self, who: &str) -> DomainResult<Option<SignOff>> {
        if !self.validated {
            return Ok(None);
        }
        match (self.by, self.at) {
            (Some(by), Some(at)) => Ok(Some(SignOff { by, at })),
            _ => Err(DomainError::invariant(format!(
                "{who} signature is marked validated but has no author or timestamp"
            ))),
        }
    }
}

/// Persisted shift document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDocument {
    pub status: ShiftStatus,
    pub user_id: UserId,
    pub business_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comptable: SignatureField,
    #[serde(default)]
    pub chef: SignatureField,
    #[serde(default)]
    pub locked_comptable: bool,
    #[serde(default)]
    pub locked_chef: bool,
}

impl ShiftDocument {
    /// Rebuild the lifecycle state, rejecting flag combinations the state
    /// machine can never produce.
    fn state(&self) -> DomainResult<ShiftState> {
        if self.locked_chef && !self.locked_comptable {
            return Err(DomainError::invariant(
                "lockedChef is set while lockedComptable is not",
            ));
        }
        if (self.status == ShiftStatus::Validated) != self.locked_chef {
            return Err(DomainError::invariant(format!(
                "status {} disagrees with lockedChef={}",
                self.status, self.locked_chef
            )));
        }
        if self.locked_comptable != self.comptable.validated {
            return Err(DomainError::invariant(
                "lockedComptable disagrees with the accountant signature",
            ));
        }
        if self.locked_chef != self.chef.validated {
            return Err(DomainError::invariant(
                "lockedChef disagrees with the chief signature",
            ));
        }

        let accountant = self.comptable.to_sign_off("accountant")?;
        let chief = self.chef.to_sign_off("chief")?;

        match (self.status, accountant, chief) {
            (ShiftStatus::Active, None, None) => Ok(ShiftState::Active),
            (ShiftStatus::Paused, None, None) => Ok(ShiftState::Paused),
            (ShiftStatus::Closed, accountant, None) => Ok(ShiftState::Closed { accountant }),
            (ShiftStatus::Validated, Some(accountant), Some(chief)) => {
                Ok(ShiftState::Validated { accountant, chief })
            }
            (status, _, _) => Err(DomainError::invariant(format!(
                "a {status} shift cannot carry approval locks"
            ))),
        }
    }
}

impl DocumentAggregate for Shift {
    type Document = ShiftDocument;

    fn aggregate_type() -> &'static str {
        "cashier.shift"
    }

    fn empty(id: ShiftId) -> Self {
        Shift::empty(id)
    }

    fn exists(&self) -> bool {
        Shift::exists(self)
    }

    fn to_document(&self) -> ShiftDocument {
        match &self.record {
            Some(record) => ShiftDocument {
                status: record.state.status(),
                user_id: record.user_id,
                business_date: record.business_date,
                start_time: record.start_time,
                end_time: record.end_time,
                created_at: record.created_at,
                updated_at: record.updated_at,
                comptable: SignatureField::from_sign_off(record.state.accountant()),
                chef: SignatureField::from_sign_off(record.state.chief()),
                locked_comptable: record.state.accountant().is_some(),
                locked_chef: record.state.chief().is_some(),
            },
            // Only called on created shifts; an empty one has nothing to persist.
            None => ShiftDocument {
                status: ShiftStatus::Active,
                user_id: UserId::default(),
                business_date: NaiveDate::MIN,
                start_time: None,
                end_time: None,
                created_at: DateTime::<Utc>::UNIX_EPOCH,
                updated_at: DateTime::<Utc>::UNIX_EPOCH,
                comptable: SignatureField::default(),
                chef: SignatureField::default(),
                locked_comptable: false,
                locked_chef: false,
            },
        }
    }

    fn from_document(id: ShiftId, document: ShiftDocument) -> DomainResult<Self> {
        let state = document.state()?;
        Ok(Self {
            id,
            record: Some(ShiftRecord {
                user_id: document.user_id,
                business_date: document.business_date,
                start_time: document.start_time,
                end_time: document.end_time,
                created_at: document.created_at,
                updated_at: document.updated_at,
                state,
            }),
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shift::{OpenShift, ShiftCommand, ShiftTransition, SignShift};
    use agencyops_core::AgencyId;
    use agencyops_events::execute;

    fn validated_shift() -> Shift {
        let agency_id = AgencyId::new();
        let shift_id = ShiftId::new();
        let now = Utc::now();
        let mut shift = Shift::empty(shift_id);
        execute(
            &mut shift,
            &ShiftCommand::Open(OpenShift {
                agency_id,
                shift_id,
                user_id: UserId::new(),
                business_date: now.date_naive(),
                occurred_at: now,
            }),
        )
        .unwrap();
        execute(
            &mut shift,
            &ShiftCommand::Close(ShiftTransition {
                agency_id,
                shift_id,
                occurred_at: now,
            }),
        )
        .unwrap();
        for by in [UserId::new(), UserId::new()] {
            let sign = SignShift {
                agency_id,
                shift_id,
                by,
                occurred_at: now,
            };
            let cmd = if shift.locked_comptable() {
                ShiftCommand::ChefApprove(sign)
            } else {
                ShiftCommand::AccountantValidate(sign)
            };
            execute(&mut shift, &cmd).unwrap();
        }
        shift
    }

    #[test]
    fn document_uses_the_stored_field_names() {
        let shift = validated_shift();
        let json = serde_json::to_value(shift.to_document()).unwrap();
        assert_eq!(json["status"], "validated");
        assert_eq!(json["lockedComptable"], true);
        assert_eq!(json["lockedChef"], true);
        assert_eq!(json["chef"]["validated"], true);
        assert!(json["businessDate"].is_string());
    }

    #[test]
    fn document_decodes_back_into_the_same_state() {
        let shift = validated_shift();
        let decoded = Shift::from_document(shift.id_typed(), shift.to_document()).unwrap();
        assert_eq!(decoded.state(), shift.state());
    }

    #[test]
    fn chief_lock_without_accountant_lock_is_rejected() {
        let mut doc = validated_shift().to_document();
        doc.locked_comptable = false;
        doc.comptable = SignatureField::default();
        let err = Shift::from_document(ShiftId::new(), doc).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn validated_status_requires_the_chief_lock() {
        let mut doc = validated_shift().to_document();
        doc.status = ShiftStatus::Closed;
        assert!(Shift::from_document(ShiftId::new(), doc).is_err());
    }

    #[test]
    fn locks_on_an_open_shift_are_rejected() {
        let mut doc = validated_shift().to_document();
        doc.status = ShiftStatus::Active;
        doc.locked_chef = false;
        doc.chef = SignatureField::default();
        assert!(Shift::from_document(ShiftId::new(), doc).is_err());
    }
}
