//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; the agency event log is the source of truth.
//! This module provides deterministic replay and cursor tracking without making
//! storage assumptions.

use agencyops_core::AgencyId;
use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single agency.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    agency_id: AgencyId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn agency_id(&self) -> AgencyId {
        self.agency_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("agency mismatch (expected {expected}, found {found})")]
    AgencyMismatch { expected: AgencyId, found: AgencyId },
    #[error("non-monotonic sequence (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Whether an envelope was folded into the projection or skipped as a duplicate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    Applied,
    Duplicate,
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific agency.
    ///
    /// This prevents accidentally starting a projection with an event from the
    /// wrong agency.
    pub fn new_for_agency(agency_id: AgencyId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                agency_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor (if any envelope was applied or the runner was pinned).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing agency consistency and strictly
    /// increasing sequence numbers. Used for replay, where a duplicate means
    /// the log itself is broken.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        match self.advance(envelope)? {
            Applied::Applied => Ok(()),
            Applied::Duplicate => Err(ProjectionError::NonMonotonicSequence {
                last: self.cursor.map(|c| c.last_sequence_number).unwrap_or(0),
                found: envelope.sequence_number(),
            }),
        }
    }

    /// Apply an envelope delivered at-least-once: anything at or below the
    /// cursor is skipped instead of rejected.
    pub fn apply_at_least_once(
        &mut self,
        envelope: &EventEnvelope<P::Ev>,
    ) -> Result<Applied, ProjectionError> {
        self.advance(envelope)
    }

    fn advance(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<Applied, ProjectionError> {
        let found_agency = envelope.agency_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    agency_id: found_agency,
                    last_sequence_number: found_seq,
                });
                Ok(Applied::Applied)
            }
            Some(mut c) => {
                if c.agency_id != found_agency {
                    return Err(ProjectionError::AgencyMismatch {
                        expected: c.agency_id,
                        found: found_agency,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Ok(Applied::Duplicate);
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(Applied::Applied)
            }
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    ///
    /// The factory is used to create a fresh projection instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct Counted(i64);

    impl Event for Counted {
        fn event_type(&self) -> &'static str {
            "test.counted"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    #[derive(Debug, Default)]
    struct Sum(i64);

    impl Projection for Sum {
        type Ev = Counted;

        fn apply(&mut self, envelope: &EventEnvelope<Counted>) {
            self.0 += envelope.payload().0;
        }
    }

    fn env(agency: AgencyId, seq: u64, value: i64) -> EventEnvelope<Counted> {
        EventEnvelope::new(
            Uuid::now_v7(),
            agency,
            "stream",
            "test",
            seq,
            DateTime::<Utc>::UNIX_EPOCH,
            Counted(value),
        )
    }

    #[test]
    fn at_least_once_skips_redelivered_envelopes() {
        let agency = AgencyId::new();
        let mut runner = ProjectionRunner::new_for_agency(agency, Sum::default());

        assert_eq!(runner.apply_at_least_once(&env(agency, 1, 5)).unwrap(), Applied::Applied);
        assert_eq!(runner.apply_at_least_once(&env(agency, 2, 7)).unwrap(), Applied::Applied);
        assert_eq!(runner.apply_at_least_once(&env(agency, 2, 7)).unwrap(), Applied::Duplicate);

        assert_eq!(runner.projection().0, 12);
    }

    #[test]
    fn strict_replay_rejects_duplicates_and_foreign_agencies() {
        let agency = AgencyId::new();
        let mut runner = ProjectionRunner::new(Sum::default());
        runner.apply(&env(agency, 1, 1)).unwrap();

        let duplicate = runner.apply(&env(agency, 1, 1)).unwrap_err();
        assert_eq!(duplicate, ProjectionError::NonMonotonicSequence { last: 1, found: 1 });
        assert_eq!(duplicate.to_string(), "non-monotonic sequence (last=1, found=1)");
        assert!(matches!(
            runner.apply(&env(AgencyId::new(), 2, 1)),
            Err(ProjectionError::AgencyMismatch { .. })
        ));
    }

    #[test]
    fn rebuild_from_scratch_folds_everything() {
        let agency = AgencyId::new();
        let log: Vec<_> = (1..=4).map(|seq| env(agency, seq, seq as i64)).collect();
        let (sum, cursor) = ProjectionRunner::rebuild_from_scratch(Sum::default, &log).unwrap();
        assert_eq!(sum.0, 10);
        assert_eq!(cursor.unwrap().last_sequence_number(), 4);
    }
}
