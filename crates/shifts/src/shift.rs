use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyops_core::{Aggregate, AggregateRoot, AgencyId, DomainError, DomainResult, ShiftId, UserId};
use agencyops_events::Event;

/// Persisted status of a shift.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Active,
    Paused,
    Closed,
    Validated,
}

impl ShiftStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Closed => "closed",
            Self::Validated => "validated",
        }
    }

    /// Open sessions are the ones a cashier can still sell on.
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

impl core::fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approval signature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOff {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

/// Lifecycle state. The approval signatures live inside the states that can
/// carry them, so "chief signed without accountant" is unrepresentable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShiftState {
    Active,
    Paused,
    Closed { accountant: Option<SignOff> },
    Validated { accountant: SignOff, chief: SignOff },
}

impl ShiftState {
    pub fn status(&self) -> ShiftStatus {
        match self {
            ShiftState::Active => ShiftStatus::Active,
            ShiftState::Paused => ShiftStatus::Paused,
            ShiftState::Closed { .. } => ShiftStatus::Closed,
            ShiftState::Validated { .. } => ShiftStatus::Validated,
        }
    }

    pub fn accountant(&self) -> Option<SignOff> {
        match self {
            ShiftState::Closed { accountant } => *accountant,
            ShiftState::Validated { accountant, .. } => Some(*accountant),
            _ => None,
        }
    }

    pub fn chief(&self) -> Option<SignOff> {
        match self {
            ShiftState::Validated { chief, .. } => Some(*chief),
            _ => None,
        }
    }
}

/// Everything known about a created shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShiftRecord {
    pub(crate) user_id: UserId,
    pub(crate) business_date: NaiveDate,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) state: ShiftState,
}

/// Aggregate root: Shift (one cashier session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    pub(crate) id: ShiftId,
    pub(crate) record: Option<ShiftRecord>,
    pub(crate) version: u64,
}

impl Shift {
    pub fn empty(id: ShiftId) -> Self {
        Self {
            id,
            record: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ShiftId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.record.is_some()
    }

    pub fn state(&self) -> Option<ShiftState> {
        self.record.as_ref().map(|r| r.state)
    }

    pub fn status(&self) -> Option<ShiftStatus> {
        self.state().map(|s| s.status())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.record.as_ref().map(|r| r.user_id)
    }

    pub fn business_date(&self) -> Option<NaiveDate> {
        self.record.as_ref().map(|r| r.business_date)
    }

    /// Session start, falling back to document creation time.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.record.as_ref().map(|r| r.start_time.unwrap_or(r.created_at))
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.record.as_ref().and_then(|r| r.end_time)
    }

    pub fn locked_comptable(&self) -> bool {
        self.state().and_then(|s| s.accountant()).is_some()
    }

    pub fn locked_chef(&self) -> bool {
        self.state().and_then(|s| s.chief()).is_some()
    }

    fn require(&self) -> DomainResult<&ShiftRecord> {
        let record = self.record.as_ref().ok_or_else(DomainError::not_found)?;
        if matches!(record.state, ShiftState::Validated { .. }) {
            return Err(DomainError::AlreadyValidated);
        }
        Ok(record)
    }

    fn ensure_shift_id(&self, shift_id: ShiftId) -> DomainResult<()> {
        if self.id != shift_id {
            return Err(DomainError::invariant("shift_id mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Shift {
    type Id = ShiftId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenShift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenShift {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub user_id: UserId,
    pub business_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command payload shared by pause, resume and close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTransition {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub occurred_at: DateTime<Utc>,
}

/// Command payload shared by both approval steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignShift {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftCommand {
    Open(OpenShift),
    Pause(ShiftTransition),
    Resume(ShiftTransition),
    Close(ShiftTransition),
    AccountantValidate(SignShift),
    ChefApprove(SignShift),
}

/// Event: ShiftOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftOpened {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub user_id: UserId,
    pub business_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShiftPaused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPaused {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub business_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShiftResumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftResumed {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub business_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShiftClosed. `from` is the status the shift was closed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftClosed {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub business_date: NaiveDate,
    pub from: ShiftStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AccountantValidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountantValidated {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub business_date: NaiveDate,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ChiefApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChiefApproved {
    pub agency_id: AgencyId,
    pub shift_id: ShiftId,
    pub business_date: NaiveDate,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftEvent {
    ShiftOpened(ShiftOpened),
    ShiftPaused(ShiftPaused),
    ShiftResumed(ShiftResumed),
    ShiftClosed(ShiftClosed),
    AccountantValidated(AccountantValidated),
    ChiefApproved(ChiefApproved),
}

impl ShiftEvent {
    pub fn agency_id(&self) -> AgencyId {
        match self {
            ShiftEvent::ShiftOpened(e) => e.agency_id,
            ShiftEvent::ShiftPaused(e) => e.agency_id,
            ShiftEvent::ShiftResumed(e) => e.agency_id,
            ShiftEvent::ShiftClosed(e) => e.agency_id,
            ShiftEvent::AccountantValidated(e) => e.agency_id,
            ShiftEvent::ChiefApproved(e) => e.agency_id,
        }
    }
}

impl Event for ShiftEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShiftEvent::ShiftOpened(_) => "shifts.shift.opened",
            ShiftEvent::ShiftPaused(_) => "shifts.shift.paused",
            ShiftEvent::ShiftResumed(_) => "shifts.shift.resumed",
            ShiftEvent::ShiftClosed(_) => "shifts.shift.closed",
            ShiftEvent::AccountantValidated(_) => "shifts.shift.accountant_validated",
            ShiftEvent::ChiefApproved(_) => "shifts.shift.chief_approved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShiftEvent::ShiftOpened(e) => e.occurred_at,
            ShiftEvent::ShiftPaused(e) => e.occurred_at,
            ShiftEvent::ShiftResumed(e) => e.occurred_at,
            ShiftEvent::ShiftClosed(e) => e.occurred_at,
            ShiftEvent::AccountantValidated(e) => e.occurred_at,
            ShiftEvent::ChiefApproved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Shift {
    type Command = ShiftCommand;
    type Event = ShiftEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShiftEvent::ShiftOpened(e) => {
                self.id = e.shift_id;
                self.record = Some(ShiftRecord {
                    user_id: e.user_id,
                    business_date: e.business_date,
                    start_time: Some(e.occurred_at),
                    end_time: None,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                    state: ShiftState::Active,
                });
            }
            ShiftEvent::ShiftPaused(e) => self.transition(e.occurred_at, |_| ShiftState::Paused),
            ShiftEvent::ShiftResumed(e) => self.transition(e.occurred_at, |_| ShiftState::Active),
            ShiftEvent::ShiftClosed(e) => {
                self.transition(e.occurred_at, |_| ShiftState::Closed { accountant: None });
                if let Some(record) = self.record.as_mut() {
                    record.end_time = Some(e.occurred_at);
                }
            }
            ShiftEvent::AccountantValidated(e) => {
                let signature = SignOff {
                    by: e.by,
                    at: e.occurred_at,
                };
                self.transition(e.occurred_at, |_| ShiftState::Closed {
                    accountant: Some(signature),
                });
            }
            ShiftEvent::ChiefApproved(e) => {
                let chief = SignOff {
                    by: e.by,
                    at: e.occurred_at,
                };
                self.transition(e.occurred_at, |state| match state.accountant() {
                    Some(accountant) => ShiftState::Validated { accountant, chief },
                    // `handle` never emits this event without an accountant signature.
                    None => state,
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShiftCommand::Open(cmd) => self.handle_open(cmd),
            ShiftCommand::Pause(cmd) => self.handle_pause(cmd),
            ShiftCommand::Resume(cmd) => self.handle_resume(cmd),
            ShiftCommand::Close(cmd) => self.handle_close(cmd),
            ShiftCommand::AccountantValidate(cmd) => self.handle_accountant(cmd),
            ShiftCommand::ChefApprove(cmd) => self.handle_chief(cmd),
        }
    }
}

impl Shift {
    fn transition(&mut self, at: DateTime<Utc>, next: impl FnOnce(ShiftState) -> ShiftState) {
        if let Some(record) = self.record.as_mut() {
            record.state = next(record.state);
            record.updated_at = at;
        }
    }

    fn handle_open(&self, cmd: &OpenShift) -> DomainResult<Vec<ShiftEvent>> {
        self.ensure_shift_id(cmd.shift_id)?;
        if self.record.is_some() {
            return Err(DomainError::conflict("shift already opened"));
        }
        Ok(vec![ShiftEvent::ShiftOpened(ShiftOpened {
            agency_id: cmd.agency_id,
            shift_id: cmd.shift_id,
            user_id: cmd.user_id,
            business_date: cmd.business_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pause(&self, cmd: &ShiftTransition) -> DomainResult<Vec<ShiftEvent>> {
        self.ensure_shift_id(cmd.shift_id)?;
        let record = self.require()?;
        if record.state != ShiftState::Active {
            return Err(DomainError::invalid_transition(record.state.status().as_str(), "pause"));
        }
        Ok(vec![ShiftEvent::ShiftPaused(ShiftPaused {
            agency_id: cmd.agency_id,
            shift_id: cmd.shift_id,
            business_date: record.business_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resume(&self, cmd: &ShiftTransition) -> DomainResult<Vec<ShiftEvent>> {
        self.ensure_shift_id(cmd.shift_id)?;
        let record = self.require()?;
        if record.state != ShiftState::Paused {
            return Err(DomainError::invalid_transition(record.state.status().as_str(), "resume"));
        }
        Ok(vec![ShiftEvent::ShiftResumed(ShiftResumed {
            agency_id: cmd.agency_id,
            shift_id: cmd.shift_id,
            business_date: record.business_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &ShiftTransition) -> DomainResult<Vec<ShiftEvent>> {
        self.ensure_shift_id(cmd.shift_id)?;
        let record = self.require()?;
        let from = record.state.status();
        if !from.is_open() {
            return Err(DomainError::invalid_transition(from.as_str(), "close"));
        }
        Ok(vec![ShiftEvent::ShiftClosed(ShiftClosed {
            agency_id: cmd.agency_id,
            shift_id: cmd.shift_id,
            business_date: record.business_date,
            from,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accountant(&self, cmd: &SignShift) -> DomainResult<Vec<ShiftEvent>> {
        self.ensure_shift_id(cmd.shift_id)?;
        let record = self.require()?;
        match record.state {
            ShiftState::Closed { accountant: None } => {
                Ok(vec![ShiftEvent::AccountantValidated(AccountantValidated {
                    agency_id: cmd.agency_id,
                    shift_id: cmd.shift_id,
                    business_date: record.business_date,
                    by: cmd.by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            // Already reviewed; the first signature stands.
            ShiftState::Closed { accountant: Some(_) } => Ok(vec![]),
            other => Err(DomainError::NotClosed {
                status: other.status().to_string(),
            }),
        }
    }

    fn handle_chief(&self, cmd: &SignShift) -> DomainResult<Vec<ShiftEvent>> {
        self.ensure_shift_id(cmd.shift_id)?;
        // The same chief repeating the approval is a no-op.
        if self
            .state()
            .and_then(|s| s.chief())
            .is_some_and(|chief| chief.by == cmd.by)
        {
            return Ok(vec![]);
        }
        let record = self.require()?;
        let accountant = record
            .state
            .accountant()
            .ok_or(DomainError::OutOfOrderApproval)?;
        if accountant.by == cmd.by {
            return Err(DomainError::validation(
                "the agency chief approval must come from someone other than the accountant",
            ));
        }
        Ok(vec![ShiftEvent::ChiefApproved(ChiefApproved {
            agency_id: cmd.agency_id,
            shift_id: cmd.shift_id,
            business_date: record.business_date,
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyops_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    struct Fixture {
        agency_id: AgencyId,
        shift_id: ShiftId,
        accountant: UserId,
        chief: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                agency_id: AgencyId::new(),
                shift_id: ShiftId::new(),
                accountant: UserId::new(),
                chief: UserId::new(),
            }
        }

        fn transition(&self) -> ShiftTransition {
            ShiftTransition {
                agency_id: self.agency_id,
                shift_id: self.shift_id,
                occurred_at: test_time(),
            }
        }

        fn sign(&self, by: UserId) -> SignShift {
            SignShift {
                agency_id: self.agency_id,
                shift_id: self.shift_id,
                by,
                occurred_at: test_time(),
            }
        }

        fn open(&self) -> Shift {
            let mut shift = Shift::empty(self.shift_id);
            execute(
                &mut shift,
                &ShiftCommand::Open(OpenShift {
                    agency_id: self.agency_id,
                    shift_id: self.shift_id,
                    user_id: UserId::new(),
                    business_date: test_time().date_naive(),
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            shift
        }

        fn closed(&self) -> Shift {
            let mut shift = self.open();
            execute(&mut shift, &ShiftCommand::Close(self.transition())).unwrap();
            shift
        }

        fn validated(&self) -> Shift {
            let mut shift = self.closed();
            execute(&mut shift, &ShiftCommand::AccountantValidate(self.sign(self.accountant)))
                .unwrap();
            execute(&mut shift, &ShiftCommand::ChefApprove(self.sign(self.chief))).unwrap();
            shift
        }

        fn all_commands(&self) -> Vec<ShiftCommand> {
            vec![
                ShiftCommand::Pause(self.transition()),
                ShiftCommand::Resume(self.transition()),
                ShiftCommand::Close(self.transition()),
                ShiftCommand::AccountantValidate(self.sign(self.accountant)),
                ShiftCommand::ChefApprove(self.sign(self.chief)),
            ]
        }
    }

    #[test]
    fn pause_and_resume_are_mutually_reachable() {
        let f = Fixture::new();
        let mut shift = f.open();
        execute(&mut shift, &ShiftCommand::Pause(f.transition())).unwrap();
        assert_eq!(shift.status(), Some(ShiftStatus::Paused));
        execute(&mut shift, &ShiftCommand::Resume(f.transition())).unwrap();
        assert_eq!(shift.status(), Some(ShiftStatus::Active));

        let err = shift.handle(&ShiftCommand::Resume(f.transition())).unwrap_err();
        assert_eq!(err, DomainError::invalid_transition("active", "resume"));
    }

    #[test]
    fn paused_shift_can_be_closed() {
        let f = Fixture::new();
        let mut shift = f.open();
        execute(&mut shift, &ShiftCommand::Pause(f.transition())).unwrap();
        let events = execute(&mut shift, &ShiftCommand::Close(f.transition())).unwrap();
        match &events[0] {
            ShiftEvent::ShiftClosed(e) => assert_eq!(e.from, ShiftStatus::Paused),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(shift.ended_at().is_some());
    }

    #[test]
    fn accountant_review_requires_a_closed_shift() {
        let f = Fixture::new();
        let shift = f.open();
        let err = shift
            .handle(&ShiftCommand::AccountantValidate(f.sign(f.accountant)))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::NotClosed {
                status: "active".to_string()
            }
        );
    }

    #[test]
    fn accountant_review_locks_without_changing_status() {
        let f = Fixture::new();
        let mut shift = f.closed();
        execute(&mut shift, &ShiftCommand::AccountantValidate(f.sign(f.accountant))).unwrap();
        assert_eq!(shift.status(), Some(ShiftStatus::Closed));
        assert!(shift.locked_comptable());
        assert!(!shift.locked_chef());

        // A second review is a no-op and keeps the first signature.
        let again = execute(&mut shift, &ShiftCommand::AccountantValidate(f.sign(UserId::new())))
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(shift.state().unwrap().accountant().unwrap().by, f.accountant);
    }

    #[test]
    fn chief_before_accountant_is_out_of_order() {
        let f = Fixture::new();
        for shift in [f.open(), f.closed()] {
            let before = shift.clone();
            let err = shift.handle(&ShiftCommand::ChefApprove(f.sign(f.chief))).unwrap_err();
            assert_eq!(err, DomainError::OutOfOrderApproval);
            assert_eq!(shift, before);
        }
    }

    #[test]
    fn chief_approval_validates_the_shift() {
        let f = Fixture::new();
        let shift = f.validated();
        assert_eq!(shift.status(), Some(ShiftStatus::Validated));
        assert!(shift.locked_comptable());
        assert!(shift.locked_chef());
    }

    #[test]
    fn chief_cannot_be_the_accountant() {
        let f = Fixture::new();
        let mut shift = f.closed();
        execute(&mut shift, &ShiftCommand::AccountantValidate(f.sign(f.accountant))).unwrap();
        let err = shift
            .handle(&ShiftCommand::ChefApprove(f.sign(f.accountant)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn validated_shift_rejects_every_command() {
        let f = Fixture::new();
        let shift = f.validated();
        for cmd in f.all_commands() {
            if matches!(cmd, ShiftCommand::ChefApprove(_)) {
                continue;
            }
            assert_eq!(shift.handle(&cmd).unwrap_err(), DomainError::AlreadyValidated);
        }
        let other_chief = ShiftCommand::ChefApprove(f.sign(UserId::new()));
        assert_eq!(shift.handle(&other_chief).unwrap_err(), DomainError::AlreadyValidated);
    }

    #[test]
    fn repeated_approval_by_the_same_chief_is_a_no_op() {
        let f = Fixture::new();
        let mut shift = f.validated();
        let before = shift.clone();
        let events = execute(&mut shift, &ShiftCommand::ChefApprove(f.sign(f.chief))).unwrap();
        assert!(events.is_empty());
        assert_eq!(shift, before);
    }

    #[test]
    fn commands_on_unknown_shift_are_not_found() {
        let f = Fixture::new();
        let shift = Shift::empty(f.shift_id);
        assert_eq!(
            shift.handle(&ShiftCommand::Close(f.transition())).unwrap_err(),
            DomainError::NotFound
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of commands, the chief flag implies the
        /// accountant flag, and once validated nothing changes anymore.
        #[test]
        fn sign_off_ordering_holds_for_any_command_sequence(
            picks in prop::collection::vec(0usize..5, 1..30)
        ) {
            let f = Fixture::new();
            let commands = f.all_commands();
            let mut shift = f.open();

            for pick in picks {
                let before = shift.clone();
                let result = execute(&mut shift, &commands[pick]);

                prop_assert!(!shift.locked_chef() || shift.locked_comptable());
                if before.status() == Some(ShiftStatus::Validated) {
                    if matches!(commands[pick], ShiftCommand::ChefApprove(_)) {
                        prop_assert!(result.as_ref().is_ok_and(|events| events.is_empty()));
                    } else {
                        prop_assert_eq!(&result, &Err(DomainError::AlreadyValidated));
                    }
                    prop_assert_eq!(&shift, &before);
                }
                if result.is_err() {
                    prop_assert_eq!(&shift, &before);
                }
            }
        }
    }
}
