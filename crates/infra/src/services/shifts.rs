//! Shift lifecycle engine and session revenue.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use agencyops_core::{AgencyId, DocumentAggregate, DomainError, ShiftId, UserId};
use agencyops_events::{EventBus, EventEnvelope};
use agencyops_reservations::{Reservation, SessionRevenue, fold_session_revenue};
use agencyops_shifts::{OpenShift, Shift, ShiftCommand, ShiftDocument, ShiftTransition, SignShift};

use crate::dispatcher::{Dispatched, Dispatcher};
use crate::error::EngineError;
use crate::store::{Collection, DocKey, DocumentStore, Query};

/// Cashier sessions from open to dual approval.
///
/// Approval is two ordered steps: the accountant reviews a closed shift,
/// then the agency chief approves it, which makes it `validated` and
/// immutable. Each step is one transaction on the shift document.
#[derive(Debug, Clone)]
pub struct ShiftLifecycle<S, B> {
    dispatcher: Dispatcher<S, B>,
}

impl<S, B> ShiftLifecycle<S, B>
where
    S: DocumentStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Dispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    /// Open a new session; its business date is today's server date.
    pub fn open_shift(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
        user_id: UserId,
    ) -> Result<Shift, EngineError> {
        let business_date = self.dispatcher.store().now().date_naive();
        self.run(agency_id, shift_id, business_date, |occurred_at| {
            ShiftCommand::Open(OpenShift {
                agency_id,
                shift_id,
                user_id,
                business_date,
                occurred_at,
            })
        })
        .map(|dispatched| dispatched.aggregate)
    }

    pub fn pause_shift(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<Shift, EngineError> {
        self.transition(agency_id, shift_id, ShiftCommand::Pause)
    }

    pub fn resume_shift(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<Shift, EngineError> {
        self.transition(agency_id, shift_id, ShiftCommand::Resume)
    }

    pub fn close_shift(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<Shift, EngineError> {
        self.transition(agency_id, shift_id, ShiftCommand::Close)
    }

    /// Accountant review of a closed shift. Reviewing twice is a no-op.
    pub fn accountant_validate(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
        accountant_id: UserId,
    ) -> Result<Shift, EngineError> {
        self.sign(agency_id, shift_id, accountant_id, ShiftCommand::AccountantValidate)
            .map(|dispatched| dispatched.aggregate)
    }

    /// Final approval by the agency chief. The same chief approving again is
    /// a no-op.
    pub fn chef_approve_shift(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
        approver_id: UserId,
    ) -> Result<Shift, EngineError> {
        let dispatched = self.sign(agency_id, shift_id, approver_id, ShiftCommand::ChefApprove)?;
        if !dispatched.events.is_empty() {
            info!(%agency_id, %shift_id, approver = %approver_id, "shift validated");
        }
        Ok(dispatched.aggregate)
    }

    pub fn shift(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<Option<Shift>, EngineError> {
        match self.dispatcher.store().get(&DocKey::shift(agency_id, shift_id))? {
            Some(document) => {
                let document: ShiftDocument = document.decode()?;
                Ok(Some(Shift::from_document(shift_id, document)?))
            }
            None => Ok(None),
        }
    }

    /// Revenue of a session, folded from its reservations at read time.
    pub fn session_revenue(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<SessionRevenue, EngineError> {
        let query = Query::collection(agency_id, Collection::Reservations)
            .where_eq("shiftId", shift_id.to_string());
        let documents = self.dispatcher.store().get_once(&query)?;
        let reservations = documents
            .iter()
            .map(|d| d.decode::<Reservation>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fold_session_revenue(shift_id, &reservations))
    }

    fn transition(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
        command: fn(ShiftTransition) -> ShiftCommand,
    ) -> Result<Shift, EngineError> {
        let business_date = self.business_date(agency_id, shift_id)?;
        self.run(agency_id, shift_id, business_date, |occurred_at| {
            command(ShiftTransition {
                agency_id,
                shift_id,
                occurred_at,
            })
        })
        .map(|dispatched| dispatched.aggregate)
    }

    fn sign(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
        by: UserId,
        command: fn(SignShift) -> ShiftCommand,
    ) -> Result<Dispatched<Shift>, EngineError> {
        let business_date = self.business_date(agency_id, shift_id)?;
        self.run(agency_id, shift_id, business_date, |occurred_at| {
            command(SignShift {
                agency_id,
                shift_id,
                by,
                occurred_at,
            })
        })
    }

    /// Business dates never change after opening, so one pre-read is enough
    /// to declare the right daily rollup key.
    fn business_date(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
    ) -> Result<NaiveDate, EngineError> {
        match self.dispatcher.store().get(&DocKey::shift(agency_id, shift_id))? {
            Some(document) => Ok(document.decode::<ShiftDocument>()?.business_date),
            None => Err(DomainError::not_found().into()),
        }
    }

    fn run<F>(
        &self,
        agency_id: AgencyId,
        shift_id: ShiftId,
        business_date: NaiveDate,
        make_command: F,
    ) -> Result<Dispatched<Shift>, EngineError>
    where
        F: Fn(DateTime<Utc>) -> ShiftCommand,
    {
        self.dispatcher.dispatch::<Shift, _>(
            agency_id,
            shift_id,
            &DocKey::shift(agency_id, shift_id),
            &[business_date],
            make_command,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agencyops_events::InMemoryEventBus;
    use agencyops_shifts::ShiftStatus;

    use crate::config::EngineConfig;
    use crate::store::InMemoryDocumentStore;

    type Lifecycle =
        ShiftLifecycle<Arc<InMemoryDocumentStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn lifecycle() -> Lifecycle {
        ShiftLifecycle::new(Dispatcher::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryEventBus::new()),
            EngineConfig::default(),
        ))
    }

    #[test]
    fn full_pipeline_reaches_validated() {
        let shifts = lifecycle();
        let agency = AgencyId::new();
        let shift_id = ShiftId::new();

        shifts.open_shift(agency, shift_id, UserId::new()).unwrap();
        shifts.pause_shift(agency, shift_id).unwrap();
        shifts.resume_shift(agency, shift_id).unwrap();
        shifts.close_shift(agency, shift_id).unwrap();
        shifts.accountant_validate(agency, shift_id, UserId::new()).unwrap();
        let validated = shifts.chef_approve_shift(agency, shift_id, UserId::new()).unwrap();

        assert_eq!(validated.status(), Some(ShiftStatus::Validated));
        assert!(validated.locked_comptable() && validated.locked_chef());

        let stored = shifts.shift(agency, shift_id).unwrap().unwrap();
        assert_eq!(stored.status(), Some(ShiftStatus::Validated));
    }

    #[test]
    fn chief_before_accountant_is_out_of_order_and_leaves_the_shift_closed() {
        let shifts = lifecycle();
        let agency = AgencyId::new();
        let shift_id = ShiftId::new();
        shifts.open_shift(agency, shift_id, UserId::new()).unwrap();
        shifts.close_shift(agency, shift_id).unwrap();

        let err = shifts
            .chef_approve_shift(agency, shift_id, UserId::new())
            .unwrap_err();
        assert_eq!(err, EngineError::Domain(DomainError::OutOfOrderApproval));

        let stored = shifts.shift(agency, shift_id).unwrap().unwrap();
        assert_eq!(stored.status(), Some(ShiftStatus::Closed));
        assert!(!stored.locked_comptable());
    }

    #[test]
    fn validated_shift_rejects_every_mutation() {
        let shifts = lifecycle();
        let agency = AgencyId::new();
        let shift_id = ShiftId::new();
        shifts.open_shift(agency, shift_id, UserId::new()).unwrap();
        shifts.close_shift(agency, shift_id).unwrap();
        shifts.accountant_validate(agency, shift_id, UserId::new()).unwrap();
        shifts.chef_approve_shift(agency, shift_id, UserId::new()).unwrap();

        let already = EngineError::Domain(DomainError::AlreadyValidated);
        assert_eq!(shifts.pause_shift(agency, shift_id).unwrap_err(), already);
        assert_eq!(shifts.close_shift(agency, shift_id).unwrap_err(), already);
        assert_eq!(
            shifts.accountant_validate(agency, shift_id, UserId::new()).unwrap_err(),
            already
        );
        assert_eq!(
            shifts.chef_approve_shift(agency, shift_id, UserId::new()).unwrap_err(),
            already
        );
    }

    #[test]
    fn accountant_review_requires_a_closed_shift() {
        let shifts = lifecycle();
        let agency = AgencyId::new();
        let shift_id = ShiftId::new();
        shifts.open_shift(agency, shift_id, UserId::new()).unwrap();

        let err = shifts
            .accountant_validate(agency, shift_id, UserId::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::NotClosed { .. })));
    }

    #[test]
    fn unknown_shift_is_not_found() {
        let shifts = lifecycle();
        assert_eq!(
            shifts.close_shift(AgencyId::new(), ShiftId::new()).unwrap_err(),
            EngineError::Domain(DomainError::NotFound)
        );
    }
}
